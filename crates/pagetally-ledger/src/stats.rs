// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rolling document statistics.
//
// Each statistic family has its own named read/write lock.  Writers hold the
// write lock for a short transaction of their own, separate from the
// transaction that created the underlying job and ledger records.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use pagetally_core::error::{PageTallyError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::store::LedgerStore;

/// A family of rolling counters, each guarded by its own lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatFamily {
    /// Jobs printed out (released, completed).
    DocOut,
    /// Jobs received into a queue.
    DocIn,
}

impl StatFamily {
    pub const ALL: [StatFamily; 2] = [StatFamily::DocOut, StatFamily::DocIn];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocOut => "doc-out",
            Self::DocIn => "doc-in",
        }
    }
}

/// Aggregate counters of one family.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocStats {
    pub jobs: u64,
    pub pages: u64,
    pub copies: u64,
    pub amount: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DocStats {
    /// Counters for one job.
    pub fn job(pages: u32, copies: u32, amount: Decimal) -> Self {
        Self {
            jobs: 1,
            pages: u64::from(pages) * u64::from(copies.max(1)),
            copies: u64::from(copies),
            amount,
            updated_at: None,
        }
    }

    fn add(&mut self, delta: &DocStats) {
        self.jobs += delta.jobs;
        self.pages += delta.pages;
        self.copies += delta.copies;
        self.amount += delta.amount;
    }
}

/// Named locks around the statistic families.
#[derive(Debug)]
pub struct StatsRegistry {
    locks: HashMap<StatFamily, RwLock<()>>,
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self {
            locks: StatFamily::ALL
                .into_iter()
                .map(|family| (family, RwLock::new(())))
                .collect(),
        }
    }

    fn lock(&self, family: StatFamily) -> Result<&RwLock<()>> {
        self.locks
            .get(&family)
            .ok_or_else(|| PageTallyError::LockFailed(format!("{} stats", family.as_str())))
    }

    /// Fold `delta` into the family's counters in a dedicated transaction.
    ///
    /// Must not be called while the calling thread has an open transaction
    /// on `store`.
    #[instrument(skip(self, store, delta), fields(family = family.as_str()))]
    pub fn record(&self, store: &dyn LedgerStore, family: StatFamily, delta: &DocStats) -> Result<DocStats> {
        let _write = self
            .lock(family)?
            .write()
            .map_err(|_| PageTallyError::LockFailed(format!("{} stats poisoned", family.as_str())))?;

        let mut tx = store.begin()?;
        let mut stats = tx.load_stats(family)?;
        stats.add(delta);
        stats.updated_at = Some(Utc::now());
        tx.save_stats(family, &stats)?;
        tx.commit()?;

        debug!(jobs = stats.jobs, amount = %stats.amount, "stats updated");
        Ok(stats)
    }

    /// Read the family's counters.
    pub fn snapshot(&self, store: &dyn LedgerStore, family: StatFamily) -> Result<DocStats> {
        let _read = self
            .lock(family)?
            .read()
            .map_err(|_| PageTallyError::LockFailed(format!("{} stats poisoned", family.as_str())))?;

        let mut tx = store.begin()?;
        let stats = tx.load_stats(family)?;
        tx.rollback()?;
        Ok(stats)
    }
}
