// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-owner hold queue ("outbox") of proxy-print jobs awaiting release.
//
// Layout: `{root}/{owner}/outbox.json` holds the job index, each job's
// document lives next to it as `{file}.pdf`.  A document is written before
// the index; replacing `outbox.json` is the commit point of every change.
// Ledger work of a change runs in one transaction that commits only after
// the index was written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use pagetally_core::error::{PageTallyError, Result};
use pagetally_core::merge::{MergeStep, merge_sorted};
use pagetally_core::types::{AccountTrx, AccountTrxInfoSet, AccountType, OutboxJob, TrxType};
use pagetally_ledger::{DocStats, JobCharge, Ledger, LedgerTx, StatFamily};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::integrity::hash_bytes;
use crate::store::{
    DOCUMENT_EXT, list_stems, read_json, remove_if_exists, validate_name, write_bytes_atomic,
    write_json_atomic,
};

/// Name of the per-owner index file.
pub const OUTBOX_FILE: &str = "outbox.json";

/// The jobs one owner holds, keyed by job file name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutboxInfo {
    jobs: BTreeMap<String, OutboxJob>,
}

/// Aggregate figures of an outbox.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutboxSummary {
    pub jobs: usize,
    pub pages: u64,
    pub cost: Decimal,
    pub earliest_expiry: Option<DateTime<Utc>>,
}

/// Result of `OutboxInfo::prune`.
#[derive(Debug, Clone)]
pub struct PruneOutcome {
    /// The pruned outbox; the input `Arc` itself when nothing changed.
    pub info: Arc<OutboxInfo>,
    /// Jobs removed because they expired.
    pub expired: Vec<String>,
    /// Jobs removed because their document is missing.
    pub orphaned: Vec<String>,
    /// Documents with no job in the index.
    pub stray_files: Vec<String>,
}

impl PruneOutcome {
    /// Whether the index changed and must be persisted.
    pub fn changed(&self) -> bool {
        !self.expired.is_empty() || !self.orphaned.is_empty()
    }
}

impl OutboxInfo {
    pub fn get(&self, file: &str) -> Option<&OutboxJob> {
        self.jobs.get(file)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs ordered by submit time.
    pub fn jobs(&self) -> Vec<&OutboxJob> {
        let mut jobs: Vec<&OutboxJob> = self.jobs.values().collect();
        jobs.sort_by(|a, b| a.submit_time.cmp(&b.submit_time).then(a.file.cmp(&b.file)));
        jobs
    }

    pub fn summary(&self) -> OutboxSummary {
        OutboxSummary {
            jobs: self.jobs.len(),
            pages: self
                .jobs
                .values()
                .map(|j| u64::from(j.pages) * u64::from(j.copies.max(1)))
                .sum(),
            cost: self.jobs.values().map(OutboxJob::cost).sum(),
            earliest_expiry: self.jobs.values().map(|j| j.expiry_time).min(),
        }
    }

    fn insert(&mut self, job: OutboxJob) {
        self.jobs.insert(job.file.clone(), job);
    }

    fn remove(&mut self, file: &str) -> Option<OutboxJob> {
        self.jobs.remove(file)
    }

    /// Drop expired jobs and reconcile the index against the document
    /// files present on disk (`files`: sorted stems).
    ///
    /// Returns `self` unchanged, same allocation, when nothing was dropped.
    pub fn prune(self: Arc<Self>, now: DateTime<Utc>, files: &[String]) -> PruneOutcome {
        let keys: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        let files: Vec<&str> = files.iter().map(String::as_str).collect();
        let mut expired = Vec::new();
        let mut orphaned = Vec::new();
        let mut stray_files = Vec::new();

        for step in merge_sorted(&keys, &files, |k| *k, |f| *f) {
            match step {
                MergeStep::Left(file) => orphaned.push(file.to_string()),
                MergeStep::Right(file) => stray_files.push(file.to_string()),
                MergeStep::Both(file, _) => {
                    if self.jobs.get(*file).is_some_and(|j| j.is_expired(now)) {
                        expired.push(file.to_string());
                    }
                }
            }
        }

        let info = if expired.is_empty() && orphaned.is_empty() {
            self
        } else {
            let mut pruned = (*self).clone();
            for file in expired.iter().chain(&orphaned) {
                pruned.remove(file);
            }
            Arc::new(pruned)
        };

        PruneOutcome {
            info,
            expired,
            orphaned,
            stray_files,
        }
    }

    /// Push every expiry sooner than `now + minutes` out to `now + minutes`.
    /// Returns how many jobs were extended.
    pub fn extend_expiry(&mut self, minutes: i64, now: DateTime<Utc>) -> usize {
        let horizon = now + Duration::minutes(minutes);
        let mut extended = 0;
        for job in self.jobs.values_mut() {
            if job.expiry_time < horizon {
                job.expiry_time = horizon;
                extended += 1;
            }
        }
        extended
    }
}

/// Check that `owner` can afford `job` before it is queued.
///
/// The owner's user account is created from `job.account_groups` when it
/// does not exist yet.
pub(crate) fn validate_job_cost(
    ledger: &Ledger,
    tx: &mut dyn LedgerTx,
    owner: &str,
    job: &OutboxJob,
) -> Result<()> {
    match &job.trx_info_set {
        Some(set) => ledger.validate_info_set_cost(tx, set, job.cost()),
        None => {
            let account = ledger.lazy_get_account(tx, owner, AccountType::User, &job.account_groups)?;
            ledger.validate_user_cost(&account, job.cost())
        }
    }
}

/// Charge `job` as printed: to its account split, or to the owner's user
/// account when it has none.
pub(crate) fn charge_job(
    ledger: &Ledger,
    tx: &mut dyn LedgerTx,
    owner: &str,
    job: &OutboxJob,
    charge: &JobCharge,
) -> Result<Vec<AccountTrx>> {
    let set = match &job.trx_info_set {
        Some(set) => set.clone(),
        None => {
            let account = ledger.lazy_get_account(tx, owner, AccountType::User, &job.account_groups)?;
            AccountTrxInfoSet::single(account.id)
        }
    };
    ledger.create_account_trxs(tx, &set, charge, TrxType::PrintOut)
}

/// Remove a document no index refers to; a failure is logged and left to
/// pruning.
pub(crate) fn discard_document(path: &Path) {
    if let Err(e) = remove_if_exists(path) {
        warn!(path = %path.display(), error = %e, "document not removed");
    }
}

/// Per-owner outboxes under a root directory.
pub struct OutboxQueue {
    root: PathBuf,
    ledger: Arc<Ledger>,
    cache: DashMap<String, Arc<OutboxInfo>>,
    owner_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OutboxQueue {
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>, ledger: Arc<Ledger>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        debug!("outbox root ready");
        Ok(Self {
            root,
            ledger,
            cache: DashMap::new(),
            owner_locks: DashMap::new(),
        })
    }

    fn owner_dir(&self, owner: &str) -> PathBuf {
        self.root.join(owner)
    }

    /// Path of a held job's document.
    pub fn document_path(&self, owner: &str, file: &str) -> PathBuf {
        self.owner_dir(owner).join(format!("{file}.{DOCUMENT_EXT}"))
    }

    fn owner_lock(&self, owner: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.owner_locks
                .entry(owner.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Run `f` with the owner's outbox lock held.
    fn with_owner<T>(&self, owner: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        validate_name("owner", owner)?;
        let lock = self.owner_lock(owner);
        let _guard = lock
            .lock()
            .map_err(|_| PageTallyError::LockFailed(format!("outbox of {owner}")))?;
        f()
    }

    /// The owner's outbox, loading it from disk on first use.
    fn load(&self, owner: &str) -> Result<Arc<OutboxInfo>> {
        if let Some(info) = self.cache.get(owner) {
            return Ok(Arc::clone(info.value()));
        }
        let path = self.owner_dir(owner).join(OUTBOX_FILE);
        let info = if path.exists() {
            Arc::new(read_json::<OutboxInfo>(&path)?)
        } else {
            Arc::new(OutboxInfo::default())
        };
        self.cache.insert(owner.to_string(), Arc::clone(&info));
        Ok(info)
    }

    fn persist(&self, owner: &str, info: Arc<OutboxInfo>) -> Result<()> {
        let dir = self.owner_dir(owner);
        std::fs::create_dir_all(&dir)?;
        write_json_atomic(&dir.join(OUTBOX_FILE), info.as_ref())?;
        self.cache.insert(owner.to_string(), info);
        Ok(())
    }

    /// Hold `job` for `owner` together with its rendered `document`.
    ///
    /// The cost is validated against the ledger before anything is written.
    /// When the job cannot be held, its document is removed again and a
    /// supplier job leaves no print-log record behind.
    #[instrument(skip(self, job, document), fields(file = %job.file, cost = %job.cost()))]
    pub fn submit(&self, owner: &str, mut job: OutboxJob, document: &[u8]) -> Result<OutboxJob> {
        validate_name("job file", &job.file)?;
        self.with_owner(owner, || {
            let current = self.load(owner)?;
            if current.get(&job.file).is_some() {
                return Err(PageTallyError::Validation(format!(
                    "job {} is already held",
                    job.file
                )));
            }

            job.owner = owner.to_string();
            job.document_hash = hash_bytes(document);
            let mut info = (*current).clone();
            info.insert(job.clone());
            let document_path = self.document_path(owner, &job.file);

            let held = self.ledger.in_transaction(|tx| {
                validate_job_cost(&self.ledger, tx, owner, &job)?;
                std::fs::create_dir_all(self.owner_dir(owner))?;
                write_bytes_atomic(&document_path, document)?;
                if job.ext_supplier.is_some() {
                    self.ledger.register_ext_job(tx, &JobCharge::from(&job))?;
                }
                self.persist(owner, Arc::new(info))
            });
            if held.is_err() {
                discard_document(&document_path);
            }
            held
        })?;

        self.record_stats(StatFamily::DocIn, &job);
        info!(pages = job.pages, copies = job.copies, "job held");
        Ok(job)
    }

    /// Prune one owner's outbox at `now`, deleting expired and stray
    /// documents.  The index is persisted only when it changed.
    #[instrument(skip(self))]
    pub fn prune(&self, owner: &str, now: DateTime<Utc>) -> Result<PruneOutcome> {
        self.with_owner(owner, || {
            let current = self.load(owner)?;
            let files = list_stems(&self.owner_dir(owner), DOCUMENT_EXT)?;
            let outcome = current.prune(now, &files);

            if outcome.changed() {
                self.persist(owner, Arc::clone(&outcome.info))?;
            }
            for file in outcome.expired.iter().chain(&outcome.stray_files) {
                remove_if_exists(&self.document_path(owner, file))?;
            }
            if outcome.changed() || !outcome.stray_files.is_empty() {
                info!(
                    expired = outcome.expired.len(),
                    orphaned = outcome.orphaned.len(),
                    stray = outcome.stray_files.len(),
                    "outbox pruned"
                );
            }
            Ok(outcome)
        })
    }

    /// Prune every owner's outbox. Returns the number of jobs removed.
    pub fn prune_all(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(owner) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.prune(&owner, now) {
                Ok(outcome) => removed += outcome.expired.len() + outcome.orphaned.len(),
                Err(e) => warn!(%owner, error = %e, "outbox prune failed"),
            }
        }
        Ok(removed)
    }

    /// Keep the owner's jobs alive for at least `minutes` from `now`.
    pub fn extend_expiry(&self, owner: &str, minutes: i64, now: DateTime<Utc>) -> Result<usize> {
        self.with_owner(owner, || {
            let current = self.load(owner)?;
            let mut info = (*current).clone();
            let extended = info.extend_expiry(minutes, now);
            if extended > 0 {
                self.persist(owner, Arc::new(info))?;
                debug!(%owner, extended, "outbox expiry extended");
            }
            Ok(extended)
        })
    }

    /// Remove a held job without charging it.
    ///
    /// A third-party supplier job has its print-log record flagged for
    /// cancellation with the supplier.
    #[instrument(skip(self))]
    pub fn cancel(&self, owner: &str, file: &str) -> Result<OutboxJob> {
        self.with_owner(owner, || {
            let current = self.load(owner)?;
            let job = current
                .get(file)
                .cloned()
                .ok_or_else(|| PageTallyError::JobNotFound(file.to_string()))?;

            let mut info = (*current).clone();
            info.remove(file);
            self.ledger.in_transaction(|tx| {
                if job.ext_supplier.is_some() {
                    self.ledger.mark_ext_pending_cancel(tx, file)?;
                }
                self.persist(owner, Arc::new(info))
            })?;
            discard_document(&self.document_path(owner, file));
            info!("job canceled");
            Ok(job)
        })
    }

    /// Cancel every job the owner holds. Returns how many were removed.
    pub fn cancel_all(&self, owner: &str) -> Result<usize> {
        let files: Vec<String> = self
            .jobs(owner)?
            .into_iter()
            .map(|j| j.file)
            .collect();
        for file in &files {
            self.cancel(owner, file)?;
        }
        Ok(files.len())
    }

    /// Charge a held job and take it out of the outbox.
    ///
    /// The job is charged to its account split, or to the owner's user
    /// account when it has none.  The charge commits only once the job has
    /// left the index; if the index cannot be written the charge is rolled
    /// back and the job stays held.
    #[instrument(skip(self))]
    pub fn release(&self, owner: &str, file: &str) -> Result<(OutboxJob, Vec<AccountTrx>)> {
        let (job, trxs) = self.with_owner(owner, || {
            let current = self.load(owner)?;
            let job = current
                .get(file)
                .cloned()
                .ok_or_else(|| PageTallyError::JobNotFound(file.to_string()))?;

            let mut info = (*current).clone();
            info.remove(file);
            let trxs = self.ledger.in_transaction(|tx| {
                let trxs = charge_job(&self.ledger, tx, owner, &job, &JobCharge::from(&job))?;
                self.persist(owner, Arc::new(info))?;
                Ok(trxs)
            })?;
            discard_document(&self.document_path(owner, file));
            Ok((job, trxs))
        })?;

        self.record_stats(StatFamily::DocOut, &job);
        info!(trxs = trxs.len(), "job released");
        Ok((job, trxs))
    }

    /// The owner's held jobs, oldest first.
    pub fn jobs(&self, owner: &str) -> Result<Vec<OutboxJob>> {
        validate_name("owner", owner)?;
        Ok(self.load(owner)?.jobs().into_iter().cloned().collect())
    }

    pub fn summary(&self, owner: &str) -> Result<OutboxSummary> {
        validate_name("owner", owner)?;
        Ok(self.load(owner)?.summary())
    }

    fn record_stats(&self, family: StatFamily, job: &OutboxJob) {
        let delta = DocStats::job(job.pages, job.copies, job.cost());
        if let Err(e) = self.ledger.record_stats(family, &delta) {
            warn!(family = family.as_str(), error = %e, "stats update failed");
        }
    }
}
