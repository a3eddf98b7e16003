// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite implementation of the ledger persistence contract.
//
// Schema:
//   account(id, name, account_type, balance, restricted, overdraft,
//           use_global_overdraft, parent_id, currency_code, deleted, disabled,
//           created_at, updated_at)
//   doc_log(id, job_ref, printer_name, pages, copies, cost, ext_supplier,
//           ext_id, ext_status, created_at)
//   account_trx(id, account_id, amount, balance_after, trx_type, weight,
//               weight_unit, currency_code, doc_log_id, comment, state,
//               created_at)
//   doc_stats(family, jobs, pages, copies, amount, updated_at)
//
// Amounts are stored as decimal TEXT, timestamps as RFC 3339 TEXT.  Every
// transaction opens its own connection and starts with `BEGIN IMMEDIATE`, so
// writers are serialised by SQLite as well as by the entity locks.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::thread::{self, ThreadId};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pagetally_core::error::{PageTallyError, Result};
use pagetally_core::types::{
    Account, AccountId, AccountTrx, AccountType, DocLog, DocLogId, ExtStatus, ExtSupplierInfo,
    NewAccount, NewAccountTrx, NewDocLog, TrxId, TrxState, TrxType,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use crate::locks::{EntityGuard, EntityKey, EntityLocks};
use crate::stats::{DocStats, StatFamily};
use crate::store::{LedgerStore, LedgerTx};

/// Default bound on waiting for an entity lock or the database write lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS account (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    name                 TEXT    NOT NULL,
    account_type         TEXT    NOT NULL,
    balance              TEXT    NOT NULL,
    restricted           INTEGER NOT NULL,
    overdraft            TEXT    NOT NULL,
    use_global_overdraft INTEGER NOT NULL,
    parent_id            INTEGER REFERENCES account(id),
    currency_code        TEXT    NOT NULL,
    deleted              INTEGER NOT NULL DEFAULT 0,
    disabled             INTEGER NOT NULL DEFAULT 0,
    created_at           TEXT    NOT NULL,
    updated_at           TEXT    NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_account_live_name
    ON account(name, account_type, IFNULL(parent_id, 0)) WHERE deleted = 0;

CREATE TABLE IF NOT EXISTS doc_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    job_ref      TEXT    NOT NULL,
    printer_name TEXT    NOT NULL,
    pages        INTEGER NOT NULL,
    copies       INTEGER NOT NULL,
    cost         TEXT    NOT NULL,
    ext_supplier TEXT,
    ext_id       TEXT,
    ext_status   TEXT,
    created_at   TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_doc_log_job_ref ON doc_log(job_ref);

CREATE TABLE IF NOT EXISTS account_trx (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id    INTEGER NOT NULL REFERENCES account(id),
    amount        TEXT    NOT NULL,
    balance_after TEXT    NOT NULL,
    trx_type      TEXT    NOT NULL,
    weight        INTEGER NOT NULL,
    weight_unit   INTEGER NOT NULL,
    currency_code TEXT    NOT NULL,
    doc_log_id    INTEGER REFERENCES doc_log(id),
    comment       TEXT,
    state         TEXT    NOT NULL,
    created_at    TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_account_trx_account ON account_trx(account_id);
CREATE INDEX IF NOT EXISTS idx_account_trx_doc_log ON account_trx(doc_log_id);

CREATE TABLE IF NOT EXISTS doc_stats (
    family     TEXT    PRIMARY KEY,
    jobs       INTEGER NOT NULL,
    pages      INTEGER NOT NULL,
    copies     INTEGER NOT NULL,
    amount     TEXT    NOT NULL,
    updated_at TEXT
);
";

const ACCOUNT_COLUMNS: &str = "id, name, account_type, balance, restricted, overdraft, \
     use_global_overdraft, parent_id, currency_code, deleted, disabled, created_at, updated_at";

const TRX_COLUMNS: &str = "t.id, t.account_id, t.amount, t.balance_after, t.trx_type, t.weight, \
     t.weight_unit, t.currency_code, t.doc_log_id, t.comment, t.state, t.created_at";

const DOC_LOG_COLUMNS: &str =
    "id, job_ref, printer_name, pages, copies, cost, ext_supplier, ext_id, ext_status, created_at";

// ---------------------------------------------------------------------------
// Local error helpers
// ---------------------------------------------------------------------------

/// Convert a `rusqlite::Error` into a `PageTallyError::Database`.
fn db_err(e: rusqlite::Error) -> PageTallyError {
    PageTallyError::Database(e.to_string())
}

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text).map_err(|e| conversion(idx, e))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    let account_type: String = row.get(2)?;
    Ok(Account {
        id: AccountId(row.get(0)?),
        name: row.get(1)?,
        account_type: AccountType::parse(&account_type).map_err(|e| conversion(2, e))?,
        balance: decimal_at(row, 3)?,
        restricted: row.get(4)?,
        overdraft: decimal_at(row, 5)?,
        use_global_overdraft: row.get(6)?,
        parent: row.get::<_, Option<i64>>(7)?.map(AccountId),
        currency_code: row.get(8)?,
        deleted: row.get(9)?,
        disabled: row.get(10)?,
        created_at: time_at(row, 11)?,
        updated_at: time_at(row, 12)?,
    })
}

fn row_to_trx(row: &Row<'_>) -> rusqlite::Result<AccountTrx> {
    let trx_type: String = row.get(4)?;
    let state: String = row.get(10)?;
    Ok(AccountTrx {
        id: TrxId(row.get(0)?),
        account_id: AccountId(row.get(1)?),
        amount: decimal_at(row, 2)?,
        balance_after: decimal_at(row, 3)?,
        trx_type: TrxType::parse(&trx_type).map_err(|e| conversion(4, e))?,
        weight: row.get(5)?,
        weight_unit: row.get(6)?,
        currency_code: row.get(7)?,
        doc_log_id: row.get::<_, Option<i64>>(8)?.map(DocLogId),
        comment: row.get(9)?,
        state: TrxState::parse(&state).map_err(|e| conversion(10, e))?,
        created_at: time_at(row, 11)?,
    })
}

fn row_to_doc_log(row: &Row<'_>) -> rusqlite::Result<DocLog> {
    let supplier: Option<String> = row.get(6)?;
    let ext_id: Option<String> = row.get(7)?;
    let ext_status = match row.get::<_, Option<String>>(8)? {
        Some(s) => Some(ExtStatus::parse(&s).map_err(|e| conversion(8, e))?),
        None => None,
    };
    Ok(DocLog {
        id: DocLogId(row.get(0)?),
        job_ref: row.get(1)?,
        printer_name: row.get(2)?,
        pages: row.get(3)?,
        copies: row.get(4)?,
        cost: decimal_at(row, 5)?,
        ext_supplier: supplier.map(|supplier| ExtSupplierInfo {
            supplier,
            ext_id: ext_id.unwrap_or_default(),
        }),
        ext_status,
        created_at: time_at(row, 9)?,
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Ledger store backed by a SQLite database file.
#[derive(Debug)]
pub struct SqliteLedgerStore {
    path: PathBuf,
    locks: EntityLocks,
    active: Mutex<HashSet<ThreadId>>,
    lock_timeout: Duration,
}

impl SqliteLedgerStore {
    /// Open (or create) the ledger database at `path`.
    ///
    /// Tables are created if missing and WAL mode is enabled.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| PageTallyError::Database(format!("WAL pragma: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| PageTallyError::Database(format!("create schema: {e}")))?;

        debug!("ledger database opened");
        Ok(Self {
            path,
            locks: EntityLocks::new(),
            active: Mutex::new(HashSet::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// Bound waiting on entity locks and the database write lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entity locks handed out by this store's transactions.
    pub fn locks(&self) -> &EntityLocks {
        &self.locks
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(db_err)?;
        conn.busy_timeout(self.lock_timeout).map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; BEGIN IMMEDIATE;")
            .map_err(|e| PageTallyError::LockFailed(format!("database write lock: {e}")))?;
        Ok(conn)
    }

    fn release_thread(&self, owner: ThreadId) {
        let mut active = match self.active.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.remove(&owner);
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>> {
        let owner = thread::current().id();
        {
            let mut active = self
                .active
                .lock()
                .map_err(|_| PageTallyError::LockFailed("transaction registry poisoned".into()))?;
            if !active.insert(owner) {
                return Err(PageTallyError::Validation(
                    "a ledger transaction is already active on this thread".into(),
                ));
            }
        }

        match self.connect() {
            Ok(conn) => Ok(Box::new(SqliteTx {
                store: self,
                conn,
                owner,
                guards: Vec::new(),
                finished: false,
            })),
            Err(e) => {
                self.release_thread(owner);
                Err(e)
            }
        }
    }

    fn is_transaction_active(&self) -> bool {
        let owner = thread::current().id();
        self.active
            .lock()
            .map(|active| active.contains(&owner))
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// One open `BEGIN IMMEDIATE` transaction plus the entity locks it holds.
pub struct SqliteTx<'a> {
    store: &'a SqliteLedgerStore,
    conn: Connection,
    owner: ThreadId,
    guards: Vec<EntityGuard>,
    finished: bool,
}

impl SqliteTx<'_> {
    fn holds(&self, key: EntityKey) -> bool {
        self.guards.iter().any(|g| g.key() == key)
    }

    fn finish(&mut self, statement: &str) -> Result<()> {
        self.conn.execute_batch(statement).map_err(db_err)?;
        self.finished = true;
        self.guards.clear();
        Ok(())
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback of abandoned ledger transaction failed");
            } else {
                debug!("abandoned ledger transaction rolled back");
            }
            self.guards.clear();
        }
        self.store.release_thread(self.owner);
    }
}

impl LedgerTx for SqliteTx<'_> {
    fn is_active(&self) -> bool {
        !self.finished
    }

    fn find_account(&mut self, id: AccountId) -> Result<Option<Account>> {
        self.conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = ?1"),
                params![id.0],
                row_to_account,
            )
            .optional()
            .map_err(db_err)
    }

    fn find_account_by_name(
        &mut self,
        name: &str,
        account_type: AccountType,
    ) -> Result<Option<Account>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM account
                     WHERE name = ?1 AND account_type = ?2 AND parent_id IS NULL AND deleted = 0"
                ),
                params![name, account_type.as_str()],
                row_to_account,
            )
            .optional()
            .map_err(db_err)
    }

    #[instrument(skip(self), fields(account = %id))]
    fn lock_account(&mut self, id: AccountId) -> Result<Account> {
        let key = EntityKey {
            kind: "account",
            id: id.0,
        };
        if !self.holds(key) {
            let guard = self.store.locks.acquire(key, self.store.lock_timeout)?;
            self.guards.push(guard);
        }
        self.find_account(id)?
            .ok_or_else(|| PageTallyError::UnknownAccount(id.to_string()))
    }

    #[instrument(skip(self, account), fields(name = %account.name, account_type = %account.account_type))]
    fn create_account(&mut self, account: &NewAccount) -> Result<Account> {
        let now = Utc::now();
        let stamp = now.to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO account (name, account_type, balance, restricted, overdraft,
                     use_global_overdraft, parent_id, currency_code, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    account.name,
                    account.account_type.as_str(),
                    account.balance.to_string(),
                    account.restricted,
                    account.overdraft.to_string(),
                    account.use_global_overdraft,
                    account.parent.map(|p| p.0),
                    account.currency_code,
                    stamp,
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    PageTallyError::NameCollision(format!(
                        "{} account {}",
                        account.account_type, account.name
                    ))
                }
                other => db_err(other),
            })?;

        let id = AccountId(self.conn.last_insert_rowid());
        debug!(%id, "account created");
        Ok(Account {
            id,
            name: account.name.clone(),
            account_type: account.account_type,
            balance: account.balance,
            restricted: account.restricted,
            overdraft: account.overdraft,
            use_global_overdraft: account.use_global_overdraft,
            parent: account.parent,
            currency_code: account.currency_code.clone(),
            deleted: false,
            disabled: false,
            created_at: now,
            updated_at: now,
        })
    }

    fn update_account(&mut self, account: &Account) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE account SET name = ?1, balance = ?2, restricted = ?3, overdraft = ?4,
                     use_global_overdraft = ?5, currency_code = ?6, deleted = ?7, disabled = ?8,
                     updated_at = ?9
                 WHERE id = ?10",
                params![
                    account.name,
                    account.balance.to_string(),
                    account.restricted,
                    account.overdraft.to_string(),
                    account.use_global_overdraft,
                    account.currency_code,
                    account.deleted,
                    account.disabled,
                    Utc::now().to_rfc3339(),
                    account.id.0,
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(PageTallyError::UnknownAccount(account.id.to_string()));
        }
        Ok(())
    }

    fn list_accounts(&mut self) -> Result<Vec<Account>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM account WHERE deleted = 0 ORDER BY id ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_account).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn create_trx(&mut self, trx: &NewAccountTrx) -> Result<AccountTrx> {
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO account_trx (account_id, amount, balance_after, trx_type, weight,
                     weight_unit, currency_code, doc_log_id, comment, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    trx.account_id.0,
                    trx.amount.to_string(),
                    trx.balance_after.to_string(),
                    trx.trx_type.as_str(),
                    trx.weight,
                    trx.weight_unit,
                    trx.currency_code,
                    trx.doc_log_id.map(|d| d.0),
                    trx.comment,
                    trx.state.as_str(),
                    now.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;

        Ok(AccountTrx {
            id: TrxId(self.conn.last_insert_rowid()),
            account_id: trx.account_id,
            amount: trx.amount,
            balance_after: trx.balance_after,
            trx_type: trx.trx_type,
            weight: trx.weight,
            weight_unit: trx.weight_unit,
            currency_code: trx.currency_code.clone(),
            doc_log_id: trx.doc_log_id,
            comment: trx.comment.clone(),
            state: trx.state,
            created_at: now,
        })
    }

    fn find_trx(&mut self, id: TrxId) -> Result<Option<AccountTrx>> {
        self.conn
            .query_row(
                &format!("SELECT {TRX_COLUMNS} FROM account_trx t WHERE t.id = ?1"),
                params![id.0],
                row_to_trx,
            )
            .optional()
            .map_err(db_err)
    }

    fn update_trx(&mut self, trx: &AccountTrx) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE account_trx SET amount = ?1, balance_after = ?2, currency_code = ?3,
                     comment = ?4, state = ?5
                 WHERE id = ?6",
                params![
                    trx.amount.to_string(),
                    trx.balance_after.to_string(),
                    trx.currency_code,
                    trx.comment,
                    trx.state.as_str(),
                    trx.id.0,
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(PageTallyError::Validation(format!(
                "transaction {} not found",
                trx.id
            )));
        }
        Ok(())
    }

    fn trxs_for_account(&mut self, account_id: AccountId) -> Result<Vec<AccountTrx>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {TRX_COLUMNS} FROM account_trx t WHERE t.account_id = ?1 ORDER BY t.id ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![account_id.0], row_to_trx)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn trxs_for_job(&mut self, job_ref: &str, trx_type: TrxType) -> Result<Vec<AccountTrx>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {TRX_COLUMNS} FROM account_trx t
                 JOIN doc_log d ON d.id = t.doc_log_id
                 WHERE d.job_ref = ?1 AND t.trx_type = ?2
                 ORDER BY t.id ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![job_ref, trx_type.as_str()], row_to_trx)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    #[instrument(skip(self, log), fields(job_ref = %log.job_ref))]
    fn create_doc_log(&mut self, log: &NewDocLog) -> Result<DocLog> {
        let now = Utc::now();
        let (supplier, ext_id) = match &log.ext_supplier {
            Some(ext) => (Some(ext.supplier.as_str()), Some(ext.ext_id.as_str())),
            None => (None, None),
        };
        self.conn
            .execute(
                "INSERT INTO doc_log (job_ref, printer_name, pages, copies, cost,
                     ext_supplier, ext_id, ext_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    log.job_ref,
                    log.printer_name,
                    log.pages,
                    log.copies,
                    log.cost.to_string(),
                    supplier,
                    ext_id,
                    log.ext_status.map(|s| s.as_str()),
                    now.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;

        Ok(DocLog {
            id: DocLogId(self.conn.last_insert_rowid()),
            job_ref: log.job_ref.clone(),
            printer_name: log.printer_name.clone(),
            pages: log.pages,
            copies: log.copies,
            cost: log.cost,
            ext_supplier: log.ext_supplier.clone(),
            ext_status: log.ext_status,
            created_at: now,
        })
    }

    fn find_doc_log_by_ref(&mut self, job_ref: &str) -> Result<Option<DocLog>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {DOC_LOG_COLUMNS} FROM doc_log WHERE job_ref = ?1
                     ORDER BY id DESC LIMIT 1"
                ),
                params![job_ref],
                row_to_doc_log,
            )
            .optional()
            .map_err(db_err)
    }

    fn update_doc_log(&mut self, log: &DocLog) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE doc_log SET printer_name = ?1, pages = ?2, copies = ?3, cost = ?4,
                     ext_status = ?5
                 WHERE id = ?6",
                params![
                    log.printer_name,
                    log.pages,
                    log.copies,
                    log.cost.to_string(),
                    log.ext_status.map(|s| s.as_str()),
                    log.id.0,
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(PageTallyError::Validation(format!(
                "print log record {} not found",
                log.id
            )));
        }
        Ok(())
    }

    fn load_stats(&mut self, family: StatFamily) -> Result<DocStats> {
        let stats = self
            .conn
            .query_row(
                "SELECT jobs, pages, copies, amount, updated_at FROM doc_stats WHERE family = ?1",
                params![family.as_str()],
                |row| {
                    let updated_at = match row.get::<_, Option<String>>(4)? {
                        Some(_) => Some(time_at(row, 4)?),
                        None => None,
                    };
                    Ok(DocStats {
                        jobs: row.get::<_, i64>(0)?.max(0) as u64,
                        pages: row.get::<_, i64>(1)?.max(0) as u64,
                        copies: row.get::<_, i64>(2)?.max(0) as u64,
                        amount: decimal_at(row, 3)?,
                        updated_at,
                    })
                },
            )
            .optional()
            .map_err(db_err)?;
        Ok(stats.unwrap_or_default())
    }

    fn save_stats(&mut self, family: StatFamily, stats: &DocStats) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO doc_stats (family, jobs, pages, copies, amount, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(family) DO UPDATE SET
                     jobs = excluded.jobs, pages = excluded.pages, copies = excluded.copies,
                     amount = excluded.amount, updated_at = excluded.updated_at",
                params![
                    family.as_str(),
                    stats.jobs as i64,
                    stats.pages as i64,
                    stats.copies as i64,
                    stats.amount.to_string(),
                    stats.updated_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish("COMMIT")?;
        debug!("ledger transaction committed");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK")?;
        debug!("ledger transaction rolled back");
        Ok(())
    }
}
