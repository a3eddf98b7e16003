// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PageTally ledger: accounts, append-only transactions, credit limits and
// the persistence contract they are stored through.

pub mod accounts;
pub mod ledger;
pub mod locks;
pub mod sqlite;
pub mod stats;
pub mod store;

pub use accounts::{BatchReport, aggregate_group_templates};
pub use ledger::{JobCharge, Ledger, TrxDetails, balance_sufficient};
pub use locks::{EntityGuard, EntityKey, EntityLocks};
pub use sqlite::SqliteLedgerStore;
pub use stats::{DocStats, StatFamily, StatsRegistry};
pub use store::{LedgerStore, LedgerTx};
