// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The ledger service.
//
// Every balance change goes through `charge_account`, which locks the account
// for the rest of the enclosing transaction, applies the signed amount and
// appends exactly one transaction snapshotting the new balance.  Operations
// take a caller-managed `&mut dyn LedgerTx`; `Ledger::in_transaction` wraps an
// ad-hoc one around a closure.

use std::sync::Arc;

use pagetally_core::config::{AppConfig, ConfigSource};
use pagetally_core::error::{DenialKind, PageTallyError, PrintDenied, Result};
use pagetally_core::money::format_amount;
use pagetally_core::types::{
    Account, AccountId, AccountTrx, AccountTrxInfoSet, DocLog, DocLogId, ExtStatus,
    ExtSupplierInfo, NewAccountTrx, NewDocLog, OutboxJob, TrxId, TrxState, TrxType,
};
use pagetally_cost::split_weighted;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::stats::{DocStats, StatFamily, StatsRegistry};
use crate::store::{LedgerStore, LedgerTx};

/// Whether `account` can pay `cost` without breaching its credit limit.
///
/// Unrestricted accounts always can.
pub fn balance_sufficient(account: &Account, cost: Decimal, global_credit_limit: Decimal) -> bool {
    !account.restricted || account.balance - cost >= -account.credit_limit(global_credit_limit)
}

/// Per-transaction attributes of a charge.
#[derive(Debug, Clone, PartialEq)]
pub struct TrxDetails {
    pub weight: u32,
    pub weight_unit: u32,
    pub doc_log_id: Option<DocLogId>,
    pub comment: Option<String>,
}

impl Default for TrxDetails {
    fn default() -> Self {
        Self {
            weight: 1,
            weight_unit: 1,
            doc_log_id: None,
            comment: None,
        }
    }
}

impl TrxDetails {
    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }
}

/// What the ledger needs to know about a job to charge it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCharge {
    /// Outbox file name or ticket number.
    pub job_ref: String,
    pub printer_name: String,
    pub pages: u32,
    pub copies: u32,
    pub cost: Decimal,
    pub ext_supplier: Option<ExtSupplierInfo>,
}

impl JobCharge {
    /// Charge for `job` under a reference other than its file name.
    pub fn for_job(job_ref: impl Into<String>, job: &OutboxJob) -> Self {
        Self {
            job_ref: job_ref.into(),
            printer_name: job.printer_name.clone(),
            pages: job.pages,
            copies: job.copies,
            cost: job.cost(),
            ext_supplier: job.ext_supplier.clone(),
        }
    }
}

impl From<&OutboxJob> for JobCharge {
    fn from(job: &OutboxJob) -> Self {
        Self::for_job(job.file.clone(), job)
    }
}

/// Account and transaction service over a `LedgerStore`.
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    config: Arc<dyn ConfigSource>,
    stats: StatsRegistry,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, config: Arc<dyn ConfigSource>) -> Self {
        Self {
            store,
            config,
            stats: StatsRegistry::new(),
        }
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    /// Settings for the current operation (re-read on every call).
    pub fn config(&self) -> AppConfig {
        self.config.current()
    }

    /// Run `f` in a new transaction, committing on `Ok` and rolling back on
    /// `Err`.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&mut dyn LedgerTx) -> Result<T>) -> Result<T> {
        let mut tx = self.store.begin()?;
        match f(&mut *tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "ledger rollback failed");
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cost validation
    // -----------------------------------------------------------------------

    pub fn is_balance_sufficient(&self, account: &Account, cost: Decimal) -> bool {
        balance_sufficient(account, cost, self.config().global_credit_limit)
    }

    /// Refuse `cost` if it would push `account` past its credit limit.
    pub fn validate_user_cost(&self, account: &Account, cost: Decimal) -> Result<()> {
        let config = self.config();
        let limit = account.credit_limit(config.global_credit_limit);
        if balance_sufficient(account, cost, config.global_credit_limit) {
            return Ok(());
        }

        let kind = if limit.is_zero() {
            DenialKind::NoBalance
        } else {
            DenialKind::CreditExceeded
        };
        let show = |amount: Decimal| format_amount(amount, config.display_scale, &account.currency_code);
        debug!(account = %account.id, ?kind, "print denied");
        Err(PageTallyError::PrintDenied(PrintDenied {
            kind,
            balance: show(account.balance),
            cost: show(cost),
            credit_limit: show(limit),
        }))
    }

    /// Validate every weighted share of `cost` against its account.
    pub fn validate_info_set_cost(
        &self,
        tx: &mut dyn LedgerTx,
        set: &AccountTrxInfoSet,
        cost: Decimal,
    ) -> Result<()> {
        set.validate()?;
        let shares = split_weighted(cost, set, self.config().balance_scale)?;
        for (info, share) in set.infos.iter().zip(shares) {
            let account = tx
                .find_account(info.account_id)?
                .ok_or_else(|| PageTallyError::UnknownAccount(info.account_id.to_string()))?;
            self.validate_user_cost(&account, share)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Charging
    // -----------------------------------------------------------------------

    /// Apply the signed `amount` to the account and append the transaction.
    ///
    /// Debits other than `ADJUST` are checked against the credit limit on the
    /// locked balance.
    #[instrument(skip(self, tx, details), fields(account = %account_id, %amount, %trx_type))]
    pub fn charge_account(
        &self,
        tx: &mut dyn LedgerTx,
        account_id: AccountId,
        amount: Decimal,
        trx_type: TrxType,
        details: &TrxDetails,
    ) -> Result<AccountTrx> {
        let mut account = tx.lock_account(account_id)?;
        if !account.is_active() {
            return Err(PageTallyError::Validation(format!(
                "account {account_id} is disabled or deleted"
            )));
        }
        if amount.is_sign_negative() && trx_type != TrxType::Adjust {
            self.validate_user_cost(&account, -amount)?;
        }

        account.balance += amount;
        tx.update_account(&account)?;
        let trx = tx.create_trx(&NewAccountTrx {
            account_id,
            amount,
            balance_after: account.balance,
            trx_type,
            weight: details.weight,
            weight_unit: details.weight_unit,
            currency_code: account.currency_code.clone(),
            doc_log_id: details.doc_log_id,
            comment: details.comment.clone(),
            state: TrxState::Settled,
        })?;

        debug!(trx = %trx.id, balance = %trx.balance_after, "account charged");
        Ok(trx)
    }

    /// Charge a job's cost over the weighted accounts of `set`.
    ///
    /// Links every transaction to the job's print-log record.  Accounts are
    /// locked in ascending id order; the returned transactions follow the
    /// order of `set`.  A second call for the same job and type fails with
    /// `DoubleCharge`; a non-print `trx_type` with `Validation`.
    #[instrument(skip(self, tx, set, job), fields(job_ref = %job.job_ref, %trx_type, cost = %job.cost))]
    pub fn create_account_trxs(
        &self,
        tx: &mut dyn LedgerTx,
        set: &AccountTrxInfoSet,
        job: &JobCharge,
        trx_type: TrxType,
    ) -> Result<Vec<AccountTrx>> {
        if !trx_type.is_print() {
            return Err(PageTallyError::Validation(format!(
                "{trx_type} is not a print charge"
            )));
        }
        set.validate()?;
        if !tx.trxs_for_job(&job.job_ref, trx_type)?.is_empty() {
            return Err(PageTallyError::DoubleCharge {
                job_ref: job.job_ref.clone(),
                trx_type: trx_type.to_string(),
            });
        }

        let doc_log = self.doc_log_for_charge(tx, job)?;
        let shares = split_weighted(job.cost, set, self.config().balance_scale)?;

        let mut lock_order: Vec<AccountId> = set.infos.iter().map(|i| i.account_id).collect();
        lock_order.sort();
        lock_order.dedup();
        for id in lock_order {
            tx.lock_account(id)?;
        }

        let mut trxs = Vec::with_capacity(set.infos.len());
        for (info, share) in set.infos.iter().zip(shares) {
            let details = TrxDetails {
                weight: info.weight,
                weight_unit: info.weight_unit,
                doc_log_id: Some(doc_log.id),
                comment: info.ext_details.clone(),
            };
            trxs.push(self.charge_account(tx, info.account_id, -share, trx_type, &details)?);
        }

        info!(accounts = trxs.len(), doc_log = %doc_log.id, "job charged");
        Ok(trxs)
    }

    /// Reuse the job's supplier record (completing it) or log a new one.
    fn doc_log_for_charge(&self, tx: &mut dyn LedgerTx, job: &JobCharge) -> Result<DocLog> {
        if let Some(mut existing) = tx.find_doc_log_by_ref(&job.job_ref)? {
            if existing.ext_status == Some(ExtStatus::Pending) {
                existing.ext_status = Some(ExtStatus::Completed);
                existing.cost = job.cost;
                tx.update_doc_log(&existing)?;
            }
            return Ok(existing);
        }
        tx.create_doc_log(&NewDocLog {
            job_ref: job.job_ref.clone(),
            printer_name: job.printer_name.clone(),
            pages: job.pages,
            copies: job.copies,
            cost: job.cost,
            ext_supplier: job.ext_supplier.clone(),
            ext_status: job.ext_supplier.as_ref().map(|_| ExtStatus::Completed),
        })
    }

    // -----------------------------------------------------------------------
    // Shadow transactions
    // -----------------------------------------------------------------------

    /// Record a zero-amount placeholder to be settled once the cost is known.
    #[instrument(skip(self, tx, details), fields(account = %account_id, %trx_type))]
    pub fn create_shadow_trx(
        &self,
        tx: &mut dyn LedgerTx,
        account_id: AccountId,
        trx_type: TrxType,
        details: &TrxDetails,
    ) -> Result<AccountTrx> {
        let account = tx.lock_account(account_id)?;
        let trx = tx.create_trx(&NewAccountTrx {
            account_id,
            amount: Decimal::ZERO,
            balance_after: account.balance,
            trx_type,
            weight: details.weight,
            weight_unit: details.weight_unit,
            currency_code: account.currency_code.clone(),
            doc_log_id: details.doc_log_id,
            comment: details.comment.clone(),
            state: TrxState::Pending,
        })?;
        debug!(trx = %trx.id, "shadow transaction created");
        Ok(trx)
    }

    /// Fill in the final signed `amount` of a pending shadow transaction.
    ///
    /// The settlement is applied regardless of the credit limit: the job
    /// has already been printed.
    #[instrument(skip(self, tx), fields(trx = %trx_id, %amount))]
    pub fn settle_shadow_trx(
        &self,
        tx: &mut dyn LedgerTx,
        trx_id: TrxId,
        amount: Decimal,
    ) -> Result<AccountTrx> {
        let mut trx = tx
            .find_trx(trx_id)?
            .ok_or_else(|| PageTallyError::Validation(format!("transaction {trx_id} not found")))?;
        if trx.state == TrxState::Settled {
            return Err(PageTallyError::TrxAlreadySettled(trx_id.0));
        }

        let mut account = tx.lock_account(trx.account_id)?;
        account.balance += amount;
        tx.update_account(&account)?;

        trx.amount = amount;
        trx.balance_after = account.balance;
        trx.state = TrxState::Settled;
        tx.update_trx(&trx)?;

        info!(account = %account.id, balance = %account.balance, "shadow transaction settled");
        Ok(trx)
    }

    // -----------------------------------------------------------------------
    // Manual postings
    // -----------------------------------------------------------------------

    pub fn deposit(
        &self,
        tx: &mut dyn LedgerTx,
        account_id: AccountId,
        amount: Decimal,
        comment: Option<String>,
    ) -> Result<AccountTrx> {
        if amount <= Decimal::ZERO {
            return Err(PageTallyError::InvalidAmount(format!(
                "deposit must be positive, got {amount}"
            )));
        }
        let details = TrxDetails {
            comment,
            ..TrxDetails::default()
        };
        self.charge_account(tx, account_id, amount, TrxType::Deposit, &details)
    }

    /// Correct a balance by a signed amount. May breach the credit limit.
    pub fn adjust(
        &self,
        tx: &mut dyn LedgerTx,
        account_id: AccountId,
        amount: Decimal,
        comment: Option<String>,
    ) -> Result<AccountTrx> {
        if amount.is_zero() {
            return Err(PageTallyError::InvalidAmount("adjustment of zero".into()));
        }
        let details = TrxDetails {
            comment,
            ..TrxDetails::default()
        };
        self.charge_account(tx, account_id, amount, TrxType::Adjust, &details)
    }

    /// Move `amount` between accounts of the same currency.
    ///
    /// Returns the debit and the credit transaction.
    #[instrument(skip(self, tx, comment), fields(%from, %to, %amount))]
    pub fn transfer(
        &self,
        tx: &mut dyn LedgerTx,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        comment: Option<String>,
    ) -> Result<(AccountTrx, AccountTrx)> {
        if amount <= Decimal::ZERO {
            return Err(PageTallyError::InvalidAmount(format!(
                "transfer must be positive, got {amount}"
            )));
        }
        if from == to {
            return Err(PageTallyError::Validation("transfer to the same account".into()));
        }

        let (first, second) = if from < to { (from, to) } else { (to, from) };
        let first = tx.lock_account(first)?;
        let second = tx.lock_account(second)?;
        if first.currency_code != second.currency_code {
            return Err(PageTallyError::Validation(format!(
                "currency mismatch: {} vs {}",
                first.currency_code, second.currency_code
            )));
        }

        let details = TrxDetails {
            comment,
            ..TrxDetails::default()
        };
        let debit = self.charge_account(tx, from, -amount, TrxType::Transfer, &details)?;
        let credit = self.charge_account(tx, to, amount, TrxType::Transfer, &details)?;
        info!("transfer booked");
        Ok((debit, credit))
    }

    // -----------------------------------------------------------------------
    // Third-party supplier jobs
    // -----------------------------------------------------------------------

    /// Log a job received from a third-party supplier as pending.
    pub fn register_ext_job(&self, tx: &mut dyn LedgerTx, job: &JobCharge) -> Result<DocLog> {
        let Some(ext) = job.ext_supplier.clone() else {
            return Err(PageTallyError::Validation(format!(
                "job {} has no supplier",
                job.job_ref
            )));
        };
        let log = tx.create_doc_log(&NewDocLog {
            job_ref: job.job_ref.clone(),
            printer_name: job.printer_name.clone(),
            pages: job.pages,
            copies: job.copies,
            cost: job.cost,
            ext_supplier: Some(ext),
            ext_status: Some(ExtStatus::Pending),
        })?;
        debug!(job_ref = %job.job_ref, doc_log = %log.id, "supplier job registered");
        Ok(log)
    }

    /// Flag a supplier job's print-log record for cancellation.
    ///
    /// Returns the updated record, or `None` when the job has no open
    /// supplier record.
    #[instrument(skip(self, tx))]
    pub fn mark_ext_pending_cancel(
        &self,
        tx: &mut dyn LedgerTx,
        job_ref: &str,
    ) -> Result<Option<DocLog>> {
        let Some(mut log) = tx.find_doc_log_by_ref(job_ref)? else {
            return Ok(None);
        };
        if log.ext_supplier.is_none() || log.ext_status != Some(ExtStatus::Pending) {
            return Ok(None);
        }
        log.ext_status = Some(ExtStatus::PendingCancel);
        tx.update_doc_log(&log)?;
        info!(doc_log = %log.id, "supplier job marked pending cancel");
        Ok(Some(log))
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    /// Fold `delta` into a statistic family. Call after the job's own
    /// transaction has committed.
    pub fn record_stats(&self, family: StatFamily, delta: &DocStats) -> Result<DocStats> {
        self.stats.record(self.store.as_ref(), family, delta)
    }

    pub fn stats(&self, family: StatFamily) -> Result<DocStats> {
        self.stats.snapshot(self.store.as_ref(), family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteLedgerStore;
    use pagetally_core::config::StaticConfig;
    use pagetally_core::types::{AccountTrxInfo, AccountType, NewAccount};
    use rust_decimal_macros::dec;
    use std::thread;
    use tempfile::TempDir;

    fn ledger_with(config: AppConfig) -> (TempDir, Ledger) {
        let dir = TempDir::new().unwrap();
        let store = SqliteLedgerStore::open(dir.path().join("ledger.db")).unwrap();
        let ledger = Ledger::new(Arc::new(store), Arc::new(StaticConfig(config)));
        (dir, ledger)
    }

    fn ledger() -> (TempDir, Ledger) {
        ledger_with(AppConfig::default())
    }

    fn open_account(ledger: &Ledger, name: &str, balance: Decimal, overdraft: Decimal) -> Account {
        ledger
            .in_transaction(|tx| {
                tx.create_account(&NewAccount {
                    name: name.into(),
                    account_type: AccountType::User,
                    balance,
                    restricted: true,
                    overdraft,
                    use_global_overdraft: false,
                    parent: None,
                    currency_code: "EUR".into(),
                })
            })
            .unwrap()
    }

    fn balance_of(ledger: &Ledger, id: AccountId) -> Decimal {
        ledger
            .in_transaction(|tx| Ok(tx.find_account(id)?.unwrap().balance))
            .unwrap()
    }

    fn job(job_ref: &str, cost: Decimal) -> JobCharge {
        JobCharge {
            job_ref: job_ref.into(),
            printer_name: "library".into(),
            pages: 10,
            copies: 1,
            cost,
            ext_supplier: None,
        }
    }

    #[test]
    fn charging_exactly_the_overdraft_reaches_the_boundary() {
        let (_dir, ledger) = ledger();
        let account = open_account(&ledger, "alice", dec!(0), dec!(5.00));
        assert!(ledger.is_balance_sufficient(&account, dec!(5.00)));
        assert!(!ledger.is_balance_sufficient(&account, dec!(5.01)));

        let trx = ledger
            .in_transaction(|tx| {
                ledger.charge_account(tx, account.id, dec!(-5.00), TrxType::PrintOut, &TrxDetails::default())
            })
            .unwrap();
        assert_eq!(trx.balance_after, dec!(-5.00));
        assert_eq!(balance_of(&ledger, account.id), dec!(-5.00));

        let err = ledger
            .in_transaction(|tx| {
                ledger.charge_account(tx, account.id, dec!(-0.01), TrxType::PrintOut, &TrxDetails::default())
            })
            .unwrap_err();
        assert_eq!(err.code(), "PRINT_DENIED_CREDIT_EXCEEDED");
        assert_eq!(balance_of(&ledger, account.id), dec!(-5.00));
    }

    #[test]
    fn no_overdraft_denies_with_no_balance() {
        let (_dir, ledger) = ledger();
        let account = open_account(&ledger, "bob", dec!(10.00), dec!(0));
        match ledger.validate_user_cost(&account, dec!(15.00)) {
            Err(PageTallyError::PrintDenied(denied)) => {
                assert_eq!(denied.kind, DenialKind::NoBalance);
                assert_eq!(denied.balance, "EUR 10.00");
                assert_eq!(denied.cost, "EUR 15.00");
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn sufficient_overdraft_allows_the_job() {
        let (_dir, ledger) = ledger();
        let account = open_account(&ledger, "carol", dec!(10.00), dec!(5.00));
        assert!(ledger.validate_user_cost(&account, dec!(15.00)).is_ok());
        let account = open_account(&ledger, "dave", dec!(10.00), dec!(4.99));
        let err = ledger.validate_user_cost(&account, dec!(15.00)).unwrap_err();
        assert_eq!(err.code(), "PRINT_DENIED_CREDIT_EXCEEDED");
    }

    #[test]
    fn global_overdraft_applies_when_selected() {
        let mut config = AppConfig::default();
        config.global_credit_limit = dec!(20);
        let (_dir, ledger) = ledger_with(config);
        let mut account = open_account(&ledger, "erin", dec!(0), dec!(0));
        account.use_global_overdraft = true;
        assert!(ledger.is_balance_sufficient(&account, dec!(20)));
        assert!(!ledger.is_balance_sufficient(&account, dec!(20.01)));
    }

    #[test]
    fn unrestricted_accounts_always_pass() {
        let (_dir, ledger) = ledger();
        let mut account = open_account(&ledger, "frank", dec!(0), dec!(0));
        account.restricted = false;
        assert!(ledger.validate_user_cost(&account, dec!(1000)).is_ok());
    }

    #[test]
    fn adjust_may_breach_the_limit() {
        let (_dir, ledger) = ledger();
        let account = open_account(&ledger, "gina", dec!(1.00), dec!(0));
        let trx = ledger
            .in_transaction(|tx| ledger.adjust(tx, account.id, dec!(-3.00), Some("correction".into())))
            .unwrap();
        assert_eq!(trx.balance_after, dec!(-2.00));
        assert_eq!(trx.trx_type, TrxType::Adjust);
    }

    #[test]
    fn concurrent_charges_are_serialized() {
        let (_dir, ledger) = ledger();
        let ledger = Arc::new(ledger);
        let id = open_account(&ledger, "hank", dec!(100.00), dec!(0)).id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    ledger
                        .in_transaction(|tx| {
                            ledger.charge_account(
                                tx,
                                id,
                                dec!(-1.00),
                                TrxType::PrintOut,
                                &TrxDetails::default(),
                            )
                        })
                        .unwrap()
                })
            })
            .collect();
        let mut after: Vec<Decimal> = handles.into_iter().map(|h| h.join().unwrap().balance_after).collect();
        after.sort();
        after.dedup();

        assert_eq!(after.len(), 8);
        assert_eq!(balance_of(&ledger, id), dec!(92.00));
    }

    #[test]
    fn weighted_job_charge_splits_and_links_print_log() {
        let (_dir, ledger) = ledger();
        let ids: Vec<AccountId> = ["a", "b", "c"]
            .iter()
            .map(|n| open_account(&ledger, n, dec!(20.00), dec!(0)).id)
            .collect();
        let set = AccountTrxInfoSet {
            weight_total: 3,
            infos: ids
                .iter()
                .map(|id| AccountTrxInfo {
                    account_id: *id,
                    weight: 1,
                    weight_unit: 1,
                    ext_details: None,
                })
                .collect(),
        };

        let trxs = ledger
            .in_transaction(|tx| ledger.create_account_trxs(tx, &set, &job("job-7", dec!(10.00)), TrxType::PrintOut))
            .unwrap();
        let amounts: Vec<Decimal> = trxs.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![dec!(-3.34), dec!(-3.33), dec!(-3.33)]);
        assert!(trxs.iter().all(|t| t.doc_log_id == trxs[0].doc_log_id && t.doc_log_id.is_some()));
        assert_eq!(balance_of(&ledger, ids[0]), dec!(16.66));
    }

    #[test]
    fn second_charge_of_a_job_is_rejected() {
        let (_dir, ledger) = ledger();
        let account = open_account(&ledger, "ivy", dec!(10.00), dec!(0));
        let set = AccountTrxInfoSet::single(account.id);
        let charge = job("job-9", dec!(2.00));

        ledger
            .in_transaction(|tx| ledger.create_account_trxs(tx, &set, &charge, TrxType::PrintOut))
            .unwrap();
        let err = ledger
            .in_transaction(|tx| ledger.create_account_trxs(tx, &set, &charge, TrxType::PrintOut))
            .unwrap_err();
        assert!(matches!(err, PageTallyError::DoubleCharge { .. }));
        assert!(err.is_invariant_violation());
        assert_eq!(balance_of(&ledger, account.id), dec!(8.00));

        // A different trx type for the same job is a separate charge.
        ledger
            .in_transaction(|tx| ledger.create_account_trxs(tx, &set, &charge, TrxType::PrintIn))
            .unwrap();
        assert_eq!(balance_of(&ledger, account.id), dec!(6.00));
    }

    #[test]
    fn job_charges_are_print_transactions_only() {
        let (_dir, ledger) = ledger();
        let account = open_account(&ledger, "kim", dec!(10.00), dec!(0));
        let set = AccountTrxInfoSet::single(account.id);
        let err = ledger
            .in_transaction(|tx| ledger.create_account_trxs(tx, &set, &job("job-4", dec!(1.00)), TrxType::Deposit))
            .unwrap_err();
        assert!(matches!(err, PageTallyError::Validation(_)));
        assert_eq!(balance_of(&ledger, account.id), dec!(10.00));
    }

    #[test]
    fn failed_share_rolls_back_the_whole_job() {
        let (_dir, ledger) = ledger();
        let rich = open_account(&ledger, "rich", dec!(50.00), dec!(0));
        let poor = open_account(&ledger, "poor", dec!(1.00), dec!(0));
        let set = AccountTrxInfoSet {
            weight_total: 2,
            infos: [rich.id, poor.id]
                .iter()
                .map(|id| AccountTrxInfo {
                    account_id: *id,
                    weight: 1,
                    weight_unit: 1,
                    ext_details: None,
                })
                .collect(),
        };

        let err = ledger
            .in_transaction(|tx| ledger.create_account_trxs(tx, &set, &job("job-3", dec!(6.00)), TrxType::PrintOut))
            .unwrap_err();
        assert!(matches!(err, PageTallyError::PrintDenied(_)));
        assert_eq!(balance_of(&ledger, rich.id), dec!(50.00));
        assert_eq!(balance_of(&ledger, poor.id), dec!(1.00));
    }

    #[test]
    fn shadow_trx_settles_exactly_once() {
        let (_dir, ledger) = ledger();
        let account = open_account(&ledger, "jack", dec!(10.00), dec!(0));
        let shadow = ledger
            .in_transaction(|tx| ledger.create_shadow_trx(tx, account.id, TrxType::PrintOut, &TrxDetails::default()))
            .unwrap();
        assert_eq!(shadow.state, TrxState::Pending);
        assert_eq!(shadow.amount, Decimal::ZERO);

        let settled = ledger
            .in_transaction(|tx| ledger.settle_shadow_trx(tx, shadow.id, dec!(-1.50)))
            .unwrap();
        assert_eq!(settled.state, TrxState::Settled);
        assert_eq!(settled.balance_after, dec!(8.50));

        let err = ledger
            .in_transaction(|tx| ledger.settle_shadow_trx(tx, shadow.id, dec!(-1.50)))
            .unwrap_err();
        assert!(matches!(err, PageTallyError::TrxAlreadySettled(_)));
        assert_eq!(balance_of(&ledger, account.id), dec!(8.50));
    }

    #[test]
    fn zero_cost_charge_is_settled_not_shadow() {
        let (_dir, ledger) = ledger();
        let account = open_account(&ledger, "kate", dec!(1.00), dec!(0));
        let trx = ledger
            .in_transaction(|tx| {
                ledger.charge_account(tx, account.id, Decimal::ZERO, TrxType::PrintOut, &TrxDetails::default())
            })
            .unwrap();
        assert_eq!(trx.state, TrxState::Settled);
    }

    #[test]
    fn transfer_respects_source_limit() {
        let (_dir, ledger) = ledger();
        let from = open_account(&ledger, "from", dec!(5.00), dec!(0));
        let to = open_account(&ledger, "to", dec!(0), dec!(0));

        let (debit, credit) = ledger
            .in_transaction(|tx| ledger.transfer(tx, from.id, to.id, dec!(4.00), None))
            .unwrap();
        assert_eq!(debit.balance_after, dec!(1.00));
        assert_eq!(credit.balance_after, dec!(4.00));

        let err = ledger
            .in_transaction(|tx| ledger.transfer(tx, from.id, to.id, dec!(2.00), None))
            .unwrap_err();
        assert!(matches!(err, PageTallyError::PrintDenied(_)));
        assert!(matches!(
            ledger.in_transaction(|tx| ledger.transfer(tx, from.id, from.id, dec!(1), None)),
            Err(PageTallyError::Validation(_))
        ));
    }

    #[test]
    fn deposit_rejects_non_positive_amounts() {
        let (_dir, ledger) = ledger();
        let account = open_account(&ledger, "lee", dec!(0), dec!(0));
        let err = ledger
            .in_transaction(|tx| ledger.deposit(tx, account.id, dec!(-1), None))
            .unwrap_err();
        assert!(matches!(err, PageTallyError::InvalidAmount(_)));
        let trx = ledger
            .in_transaction(|tx| ledger.deposit(tx, account.id, dec!(12.50), None))
            .unwrap();
        assert_eq!(trx.trx_type, TrxType::Deposit);
        assert_eq!(trx.balance_after, dec!(12.50));
    }

    #[test]
    fn supplier_job_lifecycle() {
        let (_dir, ledger) = ledger();
        let account = open_account(&ledger, "mia", dec!(10.00), dec!(0));
        let mut charge = job("ext-1", dec!(1.00));
        charge.ext_supplier = Some(ExtSupplierInfo {
            supplier: "mailprint".into(),
            ext_id: "M-42".into(),
        });

        let log = ledger
            .in_transaction(|tx| ledger.register_ext_job(tx, &charge))
            .unwrap();
        assert_eq!(log.ext_status, Some(ExtStatus::Pending));

        let flagged = ledger
            .in_transaction(|tx| ledger.mark_ext_pending_cancel(tx, "ext-1"))
            .unwrap()
            .unwrap();
        assert_eq!(flagged.ext_status, Some(ExtStatus::PendingCancel));
        assert!(ledger
            .in_transaction(|tx| ledger.mark_ext_pending_cancel(tx, "ext-1"))
            .unwrap()
            .is_none());

        let mut other = job("ext-2", dec!(1.00));
        other.ext_supplier = charge.ext_supplier.clone();
        ledger.in_transaction(|tx| ledger.register_ext_job(tx, &other)).unwrap();
        let trxs = ledger
            .in_transaction(|tx| {
                ledger.create_account_trxs(tx, &AccountTrxInfoSet::single(account.id), &other, TrxType::PrintOut)
            })
            .unwrap();
        let status = ledger
            .in_transaction(|tx| Ok(tx.find_doc_log_by_ref("ext-2")?.unwrap()))
            .unwrap();
        assert_eq!(Some(status.id), trxs[0].doc_log_id);
        assert_eq!(status.ext_status, Some(ExtStatus::Completed));
    }

    #[test]
    fn stats_accumulate_outside_job_transactions() {
        let (_dir, ledger) = ledger();
        ledger
            .record_stats(StatFamily::DocOut, &DocStats::job(4, 2, dec!(0.80)))
            .unwrap();
        let total = ledger
            .record_stats(StatFamily::DocOut, &DocStats::job(1, 1, dec!(0.10)))
            .unwrap();
        assert_eq!(total.jobs, 2);
        assert_eq!(total.pages, 9);
        assert_eq!(ledger.stats(StatFamily::DocOut).unwrap().amount, dec!(0.90));
        assert_eq!(ledger.stats(StatFamily::DocIn).unwrap().jobs, 0);
    }
}
