// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistence contract consumed by the ledger.
//
// Every read and write happens inside a `LedgerTx`.  A transaction ends with
// `commit` or `rollback`; dropping it unfinished rolls back.  Entity locks
// taken with `lock_account` are released when the transaction ends.

use pagetally_core::error::Result;
use pagetally_core::types::{
    Account, AccountId, AccountTrx, AccountType, DocLog, NewAccount, NewAccountTrx, NewDocLog,
    TrxId, TrxType,
};

use crate::stats::{DocStats, StatFamily};

/// A unit of work against the ledger store.
pub trait LedgerTx {
    /// `true` until the transaction has been committed or rolled back.
    fn is_active(&self) -> bool;

    // -- Accounts --

    fn find_account(&mut self, id: AccountId) -> Result<Option<Account>>;

    /// Live (not deleted) account by name and type.
    fn find_account_by_name(&mut self, name: &str, account_type: AccountType) -> Result<Option<Account>>;

    /// Take the account's entity lock for the rest of the transaction and
    /// return its current state.  Fails with `UnknownAccount` if missing.
    fn lock_account(&mut self, id: AccountId) -> Result<Account>;

    fn create_account(&mut self, account: &NewAccount) -> Result<Account>;

    fn update_account(&mut self, account: &Account) -> Result<()>;

    fn list_accounts(&mut self) -> Result<Vec<Account>>;

    // -- Transactions --

    fn create_trx(&mut self, trx: &NewAccountTrx) -> Result<AccountTrx>;

    fn find_trx(&mut self, id: TrxId) -> Result<Option<AccountTrx>>;

    /// Only used to settle shadow transactions and migrate currencies.
    fn update_trx(&mut self, trx: &AccountTrx) -> Result<()>;

    fn trxs_for_account(&mut self, account_id: AccountId) -> Result<Vec<AccountTrx>>;

    /// Transactions of `trx_type` linked to any print-log record of `job_ref`.
    fn trxs_for_job(&mut self, job_ref: &str, trx_type: TrxType) -> Result<Vec<AccountTrx>>;

    // -- Print log --

    fn create_doc_log(&mut self, log: &NewDocLog) -> Result<DocLog>;

    /// Most recent print-log record for `job_ref`.
    fn find_doc_log_by_ref(&mut self, job_ref: &str) -> Result<Option<DocLog>>;

    fn update_doc_log(&mut self, log: &DocLog) -> Result<()>;

    // -- Statistics --

    fn load_stats(&mut self, family: StatFamily) -> Result<DocStats>;

    fn save_stats(&mut self, family: StatFamily, stats: &DocStats) -> Result<()>;

    // -- Completion --

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Factory for ledger transactions.
pub trait LedgerStore: Send + Sync {
    /// Begin a new transaction.  A thread may hold at most one open
    /// transaction per store; a nested `begin` fails with `Validation`.
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>>;

    /// Whether the calling thread has an open transaction on this store.
    fn is_transaction_active(&self) -> bool;
}
