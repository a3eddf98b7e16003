// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: opens the ledger and both queues once at startup
// and provides the operations request handlers call.
//
// Every backend object is `Send + Sync` and Arc-wrapped, so `AppServices`
// is cheap to clone into blocking tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pagetally_core::config::{AppConfig, ConfigSource, FileConfigSource, persist_config};
use pagetally_core::error::{PageTallyError, Result};
use pagetally_core::human_errors::{HumanError, humanize_error};
use pagetally_core::types::{
    AccountTrx, AccountTrxInfoSet, CostResult, ExtSupplierInfo, GroupTemplate, JobOptions,
    OutboxJob, Ticket,
};
use pagetally_cost::{CostParms, PrinterCostProfile, calc_proxy_print_cost};
use pagetally_ledger::{DocStats, Ledger, LedgerStore, SqliteLedgerStore, StatFamily};
use pagetally_queue::store::new_job_file;
use pagetally_queue::{OutboxQueue, TicketQueue, TicketRequest, TicketStats};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::data_dir;

const CONFIG_FILE: &str = "config.json";
const LEDGER_FILE: &str = "ledger.db";

/// A proxy-print request as it arrives from the front end.
#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub owner: String,
    pub printer: PrinterCostProfile,
    /// Pricing parameters; duplex, colour and media are taken from `options`.
    pub parms: CostParms,
    pub options: JobOptions,
    pub trx_info_set: Option<AccountTrxInfoSet>,
    pub ext_supplier: Option<ExtSupplierInfo>,
    /// The owner's groups; their templates seed a new user account.
    pub groups: Vec<GroupTemplate>,
}

/// Outcome of one maintenance run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub outbox_jobs_removed: usize,
    pub tickets_expired: usize,
}

/// Shared application services.
#[derive(Clone)]
pub struct AppServices {
    data_dir: PathBuf,
    config: Arc<FileConfigSource>,
    ledger: Arc<Ledger>,
    outbox: Arc<OutboxQueue>,
    tickets: Arc<TicketQueue>,
}

impl AppServices {
    /// Initialise all services in the default data directory.
    pub fn init() -> Result<Self> {
        Self::open(&data_dir::data_dir())
    }

    /// Initialise all services under `dir`.
    ///
    /// Opens the ledger database and rebuilds the ticket index from disk.
    pub fn open(dir: &Path) -> Result<Self> {
        info!(path = %dir.display(), "initialising app services");
        std::fs::create_dir_all(dir)?;

        let config = Arc::new(FileConfigSource::new(dir.join(CONFIG_FILE)));
        let lock_timeout = Duration::from_millis(config.current().lock_timeout_ms);
        let store = SqliteLedgerStore::open(dir.join(LEDGER_FILE))?.with_lock_timeout(lock_timeout);
        let ledger = Arc::new(Ledger::new(
            Arc::new(store),
            Arc::clone(&config) as Arc<dyn ConfigSource>,
        ));

        let outbox = OutboxQueue::open(data_dir::data_subdir(dir, "outbox"), Arc::clone(&ledger))?;
        let (tickets, report) =
            TicketQueue::open(data_dir::data_subdir(dir, "tickets"), Arc::clone(&ledger))?;
        if report.discarded() > 0 {
            warn!(?report, "ticket queue rebuilt with discarded records");
        }

        info!(tickets = tickets.len(), "app services initialised");
        Ok(Self {
            data_dir: dir.to_path_buf(),
            config,
            ledger,
            outbox: Arc::new(outbox),
            tickets: Arc::new(tickets),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn outbox(&self) -> &Arc<OutboxQueue> {
        &self.outbox
    }

    pub fn tickets(&self) -> &Arc<TicketQueue> {
        &self.tickets
    }

    // -- Config ---------------------------------------------------------------

    pub fn config(&self) -> AppConfig {
        self.config.current()
    }

    /// Persist `config`; it takes effect on the next operation.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        persist_config(self.config.path(), config)?;
        info!("config saved");
        Ok(())
    }

    // -- Jobs -----------------------------------------------------------------

    /// Price a request without queueing it.
    pub fn quote(&self, request: &PrintRequest) -> Result<CostResult> {
        let parms = effective_parms(request);
        calc_proxy_print_cost(&request.printer, &parms, &self.config())
    }

    /// Price `request` and build the job record for it.
    fn build_job(&self, request: &PrintRequest, expiry_minutes: i64) -> Result<OutboxJob> {
        let cost_result = self.quote(request)?;
        let now = Utc::now();
        Ok(OutboxJob {
            file: new_job_file(),
            owner: request.owner.clone(),
            printer_name: request.printer.printer_name.clone(),
            copies: request.parms.copies,
            pages: request.parms.pages,
            submit_time: now,
            expiry_time: now + ChronoDuration::minutes(expiry_minutes),
            cost_result,
            document_hash: String::new(),
            options: request.options.clone(),
            trx_info_set: request.trx_info_set.clone(),
            ext_supplier: request.ext_supplier.clone(),
            account_groups: request.groups.clone(),
        })
    }

    /// Price and hold a job in the owner's outbox.
    pub fn hold_job(&self, request: &PrintRequest, document: &[u8]) -> Result<OutboxJob> {
        let job = self.build_job(request, self.config().outbox_expiry_minutes)?;
        self.outbox.submit(&request.owner, job, document)
    }

    /// Charge and release a held job.
    pub fn release_job(&self, owner: &str, file: &str) -> Result<(OutboxJob, Vec<AccountTrx>)> {
        self.outbox.release(owner, file)
    }

    /// Price a job and queue it as a ticket.
    pub fn queue_ticket(
        &self,
        request: &PrintRequest,
        document: &[u8],
        ticket: TicketRequest,
    ) -> Result<Ticket> {
        let job = self.build_job(request, self.config().ticket_expiry_minutes)?;
        self.tickets.submit(job, document, ticket)
    }

    /// Display-ready form of an error returned by any operation.
    pub fn describe_error(&self, err: &PageTallyError) -> HumanError {
        let human = humanize_error(err);
        debug!(code = human.code, severity = ?human.severity, "error described");
        human
    }

    // -- Maintenance ----------------------------------------------------------

    /// Prune expired outbox jobs and tickets.
    pub fn run_maintenance(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let report = MaintenanceReport {
            outbox_jobs_removed: self.outbox.prune_all(now)?,
            tickets_expired: self.tickets.prune_expired(now)?.len(),
        };
        if report != MaintenanceReport::default() {
            info!(
                outbox = report.outbox_jobs_removed,
                tickets = report.tickets_expired,
                "maintenance pruned expired work"
            );
        }
        Ok(report)
    }

    /// Document statistics of both families plus the ticket aggregates.
    pub fn statistics(&self) -> Result<(DocStats, DocStats, TicketStats)> {
        Ok((
            self.ledger.stats(StatFamily::DocIn)?,
            self.ledger.stats(StatFamily::DocOut)?,
            self.tickets.stats(),
        ))
    }

    /// Flush step at process exit: queue state is already durable, so this
    /// checks for an open ledger transaction and logs the final figures.
    pub fn shutdown(&self) {
        if self.ledger.store().is_transaction_active() {
            warn!("ledger transaction still open at shutdown");
        }
        match self.statistics() {
            Ok((doc_in, doc_out, tickets)) => info!(
                jobs_in = doc_in.jobs,
                jobs_out = doc_out.jobs,
                amount_out = %doc_out.amount,
                tickets = tickets.depth,
                "services shut down"
            ),
            Err(e) => warn!(error = %e, "statistics unavailable at shutdown"),
        }
    }
}

/// Pricing parameters with the job's output options applied.
fn effective_parms(request: &PrintRequest) -> CostParms {
    let mut parms = request.parms.clone();
    parms.duplex = request.options.duplex.is_duplex();
    parms.grayscale = !request.options.color;
    parms.media = request.options.media.clone();
    parms
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetally_core::config::AccountTemplate;
    use pagetally_core::human_errors::Severity;
    use pagetally_cost::{MediaCost, PageRate};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn services(initial_balance: rust_decimal::Decimal) -> (TempDir, AppServices) {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            user_account_defaults: AccountTemplate::prepaid(initial_balance),
            ..AppConfig::default()
        };
        persist_config(&dir.path().join(CONFIG_FILE), &config).unwrap();
        let svc = AppServices::open(dir.path()).unwrap();
        (dir, svc)
    }

    fn request(owner: &str, pages: u32) -> PrintRequest {
        let rate = PageRate {
            grayscale: dec!(0.10),
            color: dec!(0.50),
        };
        PrintRequest {
            owner: owner.into(),
            printer: PrinterCostProfile::simple(
                "library",
                MediaCost {
                    one_sided: rate,
                    two_sided: rate,
                },
            ),
            parms: CostParms::new(pages, 1),
            options: JobOptions::default(),
            trx_info_set: None,
            ext_supplier: None,
            groups: Vec::new(),
        }
    }

    #[test]
    fn quote_applies_job_options() {
        let (_dir, svc) = services(dec!(10));
        let mut req = request("alice", 4);
        assert_eq!(svc.quote(&req).unwrap().total(), dec!(0.40));
        req.options.color = true;
        assert_eq!(svc.quote(&req).unwrap().total(), dec!(2.00));
    }

    #[test]
    fn hold_then_release_charges_the_owner() {
        let (_dir, svc) = services(dec!(10));
        let job = svc.hold_job(&request("alice", 10), b"%PDF").unwrap();
        assert_eq!(job.cost(), dec!(1.00));

        let (_, trxs) = svc.release_job("alice", &job.file).unwrap();
        assert_eq!(trxs[0].balance_after, dec!(9.00));

        let (doc_in, doc_out, _) = svc.statistics().unwrap();
        assert_eq!(doc_in.jobs, 1);
        assert_eq!(doc_out.pages, 10);
    }

    #[test]
    fn group_templates_fund_a_first_time_user() {
        let (_dir, svc) = services(dec!(0));
        let mut req = request("olga", 10);
        req.groups = vec![GroupTemplate {
            group_name: "staff".into(),
            apply_initial_settings: true,
            template: AccountTemplate::prepaid(dec!(5.00)),
        }];
        let job = svc.hold_job(&req, b"%PDF").unwrap();
        let (_, trxs) = svc.release_job("olga", &job.file).unwrap();
        assert_eq!(trxs[0].balance_after, dec!(4.00));
    }

    #[test]
    fn denied_hold_is_described_for_the_user() {
        let (_dir, svc) = services(dec!(0));
        let err = svc.hold_job(&request("paul", 10), b"%PDF").unwrap_err();
        let human = svc.describe_error(&err);
        assert!(human.code.starts_with("PRINT_DENIED"));
        assert_eq!(human.severity, Severity::Denied);
        assert!(!human.retriable);
    }

    #[test]
    fn tickets_survive_a_restart() {
        let (dir, svc) = services(dec!(10));
        let ticket = svc
            .queue_ticket(&request("bob", 2), b"doc", TicketRequest::default())
            .unwrap();
        svc.shutdown();
        drop(svc);

        let reopened = AppServices::open(dir.path()).unwrap();
        assert_eq!(reopened.tickets().get(&ticket.number), Some(ticket));
    }

    #[test]
    fn maintenance_prunes_expired_work() {
        let (_dir, svc) = services(dec!(10));
        svc.hold_job(&request("carol", 1), b"doc").unwrap();
        svc.queue_ticket(&request("carol", 1), b"doc", TicketRequest::default())
            .unwrap();

        let later = Utc::now() + ChronoDuration::days(30);
        let report = svc.run_maintenance(later).unwrap();
        assert_eq!(
            report,
            MaintenanceReport {
                outbox_jobs_removed: 1,
                tickets_expired: 1,
            }
        );
        assert_eq!(svc.run_maintenance(later).unwrap(), MaintenanceReport::default());
    }

    #[test]
    fn saved_config_applies_to_the_next_operation() {
        let (_dir, svc) = services(dec!(10));
        let mut config = svc.config();
        config.currency_code = "CHF".into();
        svc.save_config(&config).unwrap();
        assert_eq!(svc.config().currency_code, "CHF");
    }
}
