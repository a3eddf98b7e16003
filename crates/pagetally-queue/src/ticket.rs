// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process-wide queue of job tickets: deferred print jobs released by an
// operator.
//
// Each ticket is a `{file}.json` record plus its `{file}.pdf` document in a
// single flat directory.  The in-memory index is rebuilt from that
// directory at startup; the document is written before the record and a
// ticket exists on disk once its record does.  State changes of one ticket
// are serialised by a per-ticket lock; the index shard is never held across
// ledger or file work.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use pagetally_core::error::{PageTallyError, Result};
use pagetally_core::merge::{MergeStep, merge_sorted};
use pagetally_core::types::{
    AccountTrx, DispatchRecord, OutboxJob, Ticket, TicketScope, TicketStatus,
};
use pagetally_ledger::{DocStats, JobCharge, Ledger, StatFamily};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::integrity::{hash_bytes, verify_hash};
use crate::outbox::{charge_job, discard_document, validate_job_cost};
use crate::redirect::{RedirectMatcher, RedirectRequest, RedirectPrinter, RedirectSelection};
use crate::store::{
    DOCUMENT_EXT, RECORD_EXT, list_stems, new_job_file, read_json, remove_if_exists,
    validate_name, write_bytes_atomic, write_json_atomic,
};
use crate::ticket_number::TicketNumberGenerator;

/// Running aggregates over the tickets in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TicketStats {
    pub depth: usize,
    pub total_cost: Decimal,
    pub print_count: usize,
    pub copy_count: usize,
    pub total_pages: u64,
}

impl TicketStats {
    fn add(&mut self, ticket: &Ticket) {
        self.depth += 1;
        self.total_cost += ticket.job.cost();
        self.total_pages += job_pages(&ticket.job);
        match ticket.scope {
            TicketScope::Print => self.print_count += 1,
            TicketScope::Copy => self.copy_count += 1,
        }
    }

    fn remove(&mut self, ticket: &Ticket) {
        self.depth = self.depth.saturating_sub(1);
        self.total_cost -= ticket.job.cost();
        self.total_pages = self.total_pages.saturating_sub(job_pages(&ticket.job));
        match ticket.scope {
            TicketScope::Print => self.print_count = self.print_count.saturating_sub(1),
            TicketScope::Copy => self.copy_count = self.copy_count.saturating_sub(1),
        }
    }
}

fn job_pages(job: &OutboxJob) -> u64 {
    u64::from(job.pages) * u64::from(job.copies.max(1))
}

/// What `TicketQueue::open` found in the ticket directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub loaded: usize,
    /// Records that could not be parsed or did not match their file name.
    pub malformed: usize,
    /// Records or documents missing their counterpart.
    pub orphaned: usize,
    /// Documents whose fingerprint no longer matches the record.
    pub tampered: usize,
    /// Documents that could not be read.
    pub unreadable: usize,
}

impl RebuildReport {
    /// Records deleted during the rebuild.
    pub fn discarded(&self) -> usize {
        self.malformed + self.orphaned + self.tampered + self.unreadable
    }
}

/// Options for a new ticket.
#[derive(Debug, Clone, Default)]
pub struct TicketRequest {
    pub scope: Option<TicketScope>,
    pub tag: Option<String>,
    pub delivery_date: Option<DateTime<Utc>>,
}

/// The ticket queue.
pub struct TicketQueue {
    dir: PathBuf,
    ledger: Arc<Ledger>,
    tickets: DashMap<String, Ticket>,
    ticket_locks: DashMap<String, Arc<Mutex<()>>>,
    stats: Mutex<TicketStats>,
    numbers: TicketNumberGenerator,
    matcher: RedirectMatcher,
}

impl TicketQueue {
    /// Open the queue in `dir`, rebuilding the index from the records there.
    ///
    /// Unreadable, orphaned and tampered records are deleted and logged.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>, ledger: Arc<Ledger>) -> Result<(Self, RebuildReport)> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let queue = Self {
            dir,
            ledger,
            tickets: DashMap::new(),
            ticket_locks: DashMap::new(),
            stats: Mutex::new(TicketStats::default()),
            numbers: TicketNumberGenerator::new(),
            matcher: RedirectMatcher::new(),
        };
        let report = queue.rebuild()?;
        info!(
            loaded = report.loaded,
            malformed = report.malformed,
            orphaned = report.orphaned,
            tampered = report.tampered,
            unreadable = report.unreadable,
            "ticket queue rebuilt"
        );
        Ok((queue, report))
    }

    fn record_path(&self, file: &str) -> PathBuf {
        self.dir.join(format!("{file}.{RECORD_EXT}"))
    }

    /// Path of a ticket's document.
    pub fn document_path(&self, file: &str) -> PathBuf {
        self.dir.join(format!("{file}.{DOCUMENT_EXT}"))
    }

    /// Delete both files of a ticket dropped during the rebuild.
    fn discard(&self, file: &str) {
        for path in [self.record_path(file), self.document_path(file)] {
            if let Err(e) = remove_if_exists(&path) {
                warn!(path = %path.display(), error = %e, "ticket file not removed");
            }
        }
    }

    fn rebuild(&self) -> Result<RebuildReport> {
        let records = list_stems(&self.dir, RECORD_EXT)?;
        let documents = list_stems(&self.dir, DOCUMENT_EXT)?;
        let records: Vec<&str> = records.iter().map(String::as_str).collect();
        let documents: Vec<&str> = documents.iter().map(String::as_str).collect();
        let mut report = RebuildReport::default();
        let mut stats = TicketStats::default();

        for step in merge_sorted(&records, &documents, |r| *r, |d| *d) {
            let file = match step {
                MergeStep::Left(file) | MergeStep::Right(file) => {
                    warn!(%file, "ticket file without counterpart deleted");
                    self.discard(file);
                    report.orphaned += 1;
                    continue;
                }
                MergeStep::Both(file, _) => *file,
            };

            let ticket = match read_json::<Ticket>(&self.record_path(file)) {
                Ok(ticket) if ticket.job.file == file && !ticket.status.is_terminal() => ticket,
                Ok(_) => {
                    warn!(%file, "ticket record does not match its file");
                    self.discard(file);
                    report.malformed += 1;
                    continue;
                }
                Err(e) => {
                    warn!(%file, error = %e, "malformed ticket record deleted");
                    self.discard(file);
                    report.malformed += 1;
                    continue;
                }
            };

            let document = match std::fs::read(self.document_path(file)) {
                Ok(document) => document,
                Err(e) => {
                    warn!(%file, error = %e, "unreadable ticket document deleted");
                    self.discard(file);
                    report.unreadable += 1;
                    continue;
                }
            };
            if let Err(e) = verify_hash(&document, &ticket.job.document_hash) {
                warn!(%file, error = %e, "tampered ticket deleted");
                self.discard(file);
                report.tampered += 1;
                continue;
            }

            match self.tickets.entry(ticket.number.clone()) {
                Entry::Occupied(_) => {
                    warn!(%file, number = %ticket.number, "duplicate ticket number deleted");
                    self.discard(file);
                    report.malformed += 1;
                }
                Entry::Vacant(slot) => {
                    stats.add(&ticket);
                    slot.insert(ticket);
                    report.loaded += 1;
                }
            }
        }

        *self.lock_stats() = stats;
        Ok(report)
    }

    fn lock_stats(&self) -> MutexGuard<'_, TicketStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the aggregates and return the result, under one lock.
    fn update_stats(&self, f: impl FnOnce(&mut TicketStats)) -> TicketStats {
        let mut stats = self.lock_stats();
        f(&mut stats);
        stats.clone()
    }

    /// Queue `job` as a ticket awaiting release.
    ///
    /// The cost is validated against the ledger first.  A fresh ticket
    /// number is drawn until one is free.
    #[instrument(skip(self, job, document, request), fields(owner = %job.owner, cost = %job.cost()))]
    pub fn submit(
        &self,
        mut job: OutboxJob,
        document: &[u8],
        request: TicketRequest,
    ) -> Result<Ticket> {
        validate_name("owner", &job.owner)?;
        if job.file.is_empty() {
            job.file = new_job_file();
        }
        validate_name("job file", &job.file)?;
        if self.tickets.iter().any(|t| t.job.file == job.file) {
            return Err(PageTallyError::Validation(format!(
                "job {} is already queued",
                job.file
            )));
        }
        self.ledger
            .in_transaction(|tx| validate_job_cost(&self.ledger, tx, &job.owner, &job))?;

        job.document_hash = hash_bytes(document);
        let file = job.file.clone();
        write_bytes_atomic(&self.document_path(&file), document)?;

        let mut ticket = Ticket {
            number: String::new(),
            job,
            status: TicketStatus::Created,
            scope: request.scope.unwrap_or(TicketScope::Print),
            printer_redirect: None,
            delivery_date: request.delivery_date,
            tag: request.tag,
            dispatch: None,
        };
        transition(&mut ticket, TicketStatus::WaitingForRelease)?;

        let ticket = loop {
            ticket.number = match self.numbers.generate(ticket.tag.as_deref()) {
                Ok(number) => number,
                Err(e) => {
                    discard_document(&self.document_path(&file));
                    return Err(e);
                }
            };
            match self.tickets.entry(ticket.number.clone()) {
                Entry::Occupied(_) => debug!(number = %ticket.number, "ticket number taken"),
                Entry::Vacant(slot) => {
                    slot.insert(ticket.clone());
                    break ticket;
                }
            }
        };

        if let Err(e) = self.persist_new(&ticket) {
            self.tickets.remove(&ticket.number);
            discard_document(&self.document_path(&file));
            return Err(e);
        }

        let stats = self.update_stats(|s| s.add(&ticket));
        self.record_stats(StatFamily::DocIn, &ticket.job);
        info!(number = %ticket.number, depth = stats.depth, "ticket queued");
        Ok(ticket)
    }

    /// Write the record of a new ticket; a supplier job's print-log record
    /// commits with it.
    fn persist_new(&self, ticket: &Ticket) -> Result<()> {
        self.ledger.in_transaction(|tx| {
            if ticket.job.ext_supplier.is_some() {
                let charge = JobCharge::for_job(ticket.number.clone(), &ticket.job);
                self.ledger.register_ext_job(tx, &charge)?;
            }
            write_json_atomic(&self.record_path(&ticket.job.file), ticket)
        })
    }

    /// Run `f` on the current state of ticket `number` with its lock held.
    fn with_ticket<T>(&self, number: &str, f: impl FnOnce(Ticket) -> Result<T>) -> Result<T> {
        if !self.tickets.contains_key(number) {
            return Err(PageTallyError::JobNotFound(number.to_string()));
        }
        let lock = Arc::clone(
            self.ticket_locks
                .entry(number.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let _guard = lock
            .lock()
            .map_err(|_| PageTallyError::LockFailed(format!("ticket {number}")))?;
        let ticket = self
            .get(number)
            .ok_or_else(|| PageTallyError::JobNotFound(number.to_string()))?;
        f(ticket)
    }

    pub fn get(&self, number: &str) -> Option<Ticket> {
        self.tickets.get(number).map(|t| t.value().clone())
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// All tickets, oldest first.
    pub fn tickets(&self) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self.tickets.iter().map(|t| t.value().clone()).collect();
        tickets.sort_by(|a, b| {
            a.job
                .submit_time
                .cmp(&b.job.submit_time)
                .then_with(|| a.number.cmp(&b.number))
        });
        tickets
    }

    /// Snapshot of the running aggregates.
    pub fn stats(&self) -> TicketStats {
        self.lock_stats().clone()
    }

    /// Hand a waiting ticket to `printer`.
    ///
    /// A ticket is dispatched at most once; a second attempt fails with
    /// `TicketAlreadyDispatched`.
    #[instrument(skip(self))]
    pub fn start_print(&self, number: &str, printer: &str) -> Result<Ticket> {
        let updated = self.with_ticket(number, |mut ticket| {
            if ticket.dispatch.is_some() {
                return Err(PageTallyError::TicketAlreadyDispatched(number.to_string()));
            }
            transition(&mut ticket, TicketStatus::Printing)?;
            if printer != ticket.job.printer_name {
                ticket.printer_redirect = Some(printer.to_string());
            }
            ticket.dispatch = Some(DispatchRecord {
                printer_name: printer.to_string(),
                dispatched_at: Utc::now(),
            });
            write_json_atomic(&self.record_path(&ticket.job.file), &ticket)?;
            self.tickets.insert(number.to_string(), ticket.clone());
            Ok(ticket)
        })?;

        info!(redirected = updated.printer_redirect.is_some(), "ticket dispatched");
        Ok(updated)
    }

    /// Printers of `group` able to fulfil the ticket.
    pub fn redirect_candidates(
        &self,
        number: &str,
        group: &[RedirectPrinter],
    ) -> Result<RedirectSelection> {
        let ticket = self
            .get(number)
            .ok_or_else(|| PageTallyError::JobNotFound(number.to_string()))?;
        Ok(self
            .matcher
            .select_candidates(&RedirectRequest::from(&ticket), group))
    }

    /// Dispatch the ticket to a randomly chosen capable member of `group`.
    #[instrument(skip(self, group), fields(group = group.len()))]
    pub fn print_redirected(&self, number: &str, group: &[RedirectPrinter]) -> Result<Ticket> {
        let selection = self.redirect_candidates(number, group)?;
        let printer = self
            .matcher
            .choose_printer(&selection)
            .ok_or_else(|| {
                PageTallyError::Validation(format!("no printer can fulfil ticket {number}"))
            })?
            .printer_name
            .clone();
        self.start_print(number, &printer)
    }

    /// Charge a printing ticket and remove it from the queue.
    ///
    /// The charge is referenced by the ticket number and commits only once
    /// the ticket's record is gone; if the record cannot be deleted the
    /// charge is rolled back and the ticket keeps printing.
    #[instrument(skip(self))]
    pub fn complete(&self, number: &str) -> Result<(Ticket, Vec<AccountTrx>)> {
        let (ticket, trxs) = self.with_ticket(number, |mut ticket| {
            transition(&mut ticket, TicketStatus::Completed)?;
            let charge = JobCharge::for_job(number, &ticket.job);
            let trxs = self.ledger.in_transaction(|tx| {
                let trxs = charge_job(&self.ledger, tx, &ticket.job.owner, &ticket.job, &charge)?;
                remove_if_exists(&self.record_path(&ticket.job.file))?;
                Ok(trxs)
            })?;
            self.finish(&ticket);
            Ok((ticket, trxs))
        })?;

        self.record_stats(StatFamily::DocOut, &ticket.job);
        info!(trxs = trxs.len(), "ticket completed");
        Ok((ticket, trxs))
    }

    /// Cancel a waiting or printing ticket without charging it.
    #[instrument(skip(self))]
    pub fn cancel(&self, number: &str) -> Result<Ticket> {
        let ticket = self.with_ticket(number, |mut ticket| {
            transition(&mut ticket, TicketStatus::Canceled)?;
            self.ledger.in_transaction(|tx| {
                if ticket.job.ext_supplier.is_some() {
                    self.ledger.mark_ext_pending_cancel(tx, number)?;
                }
                remove_if_exists(&self.record_path(&ticket.job.file))
            })?;
            self.finish(&ticket);
            Ok(ticket)
        })?;

        info!("ticket canceled");
        Ok(ticket)
    }

    /// Drop a ticket whose record is already deleted.
    fn finish(&self, ticket: &Ticket) {
        self.tickets.remove(&ticket.number);
        self.ticket_locks.remove(&ticket.number);
        self.update_stats(|s| s.remove(ticket));
        discard_document(&self.document_path(&ticket.job.file));
    }

    /// Cancel every ticket still waiting for release whose expiry lies
    /// before `now`.  Returns the canceled ticket numbers.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let expired: Vec<String> = self
            .tickets
            .iter()
            .filter(|t| t.status == TicketStatus::WaitingForRelease && t.job.is_expired(now))
            .map(|t| t.number.clone())
            .collect();

        let mut canceled = Vec::with_capacity(expired.len());
        for number in expired {
            match self.cancel(&number) {
                Ok(_) => canceled.push(number),
                Err(PageTallyError::JobNotFound(_) | PageTallyError::IllegalTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if !canceled.is_empty() {
            info!(expired = canceled.len(), "expired tickets pruned");
        }
        Ok(canceled)
    }

    fn record_stats(&self, family: StatFamily, job: &OutboxJob) {
        let delta = DocStats::job(job.pages, job.copies, job.cost());
        if let Err(e) = self.ledger.record_stats(family, &delta) {
            warn!(family = family.as_str(), error = %e, "stats update failed");
        }
    }
}

fn transition(ticket: &mut Ticket, next: TicketStatus) -> Result<()> {
    if !ticket.status.can_transition_to(next) {
        return Err(PageTallyError::IllegalTransition {
            ticket: ticket.number.clone(),
            from: ticket.status.to_string(),
            to: next.to_string(),
        });
    }
    ticket.status = next;
    Ok(())
}
