// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the PageTally print accounting engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::AccountTemplate;
use crate::error::{PageTallyError, Result};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Database identifier of an account.
    AccountId
);
id_type!(
    /// Database identifier of a ledger transaction.
    TrxId
);
id_type!(
    /// Database identifier of a print-log record.
    DocLogId
);

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Who an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    User,
    Group,
    Shared,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Group => "GROUP",
            Self::Shared => "SHARED",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "USER" => Ok(Self::User),
            "GROUP" => Ok(Self::Group),
            "SHARED" => Ok(Self::Shared),
            other => Err(PageTallyError::Validation(format!(
                "unknown account type {other}"
            ))),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger account holding a balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    /// Restricted accounts may not go below `-credit_limit`.
    pub restricted: bool,
    /// Per-account credit limit, used unless `use_global_overdraft`.
    pub overdraft: Decimal,
    pub use_global_overdraft: bool,
    /// Parent of a shared child account. Top accounts have none.
    pub parent: Option<AccountId>,
    pub currency_code: String,
    pub deleted: bool,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Credit limit in effect, given the system-wide limit.
    pub fn credit_limit(&self, global_credit_limit: Decimal) -> Decimal {
        if self.use_global_overdraft {
            global_credit_limit
        } else {
            self.overdraft
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether the account may take part in new transactions.
    pub fn is_active(&self) -> bool {
        !self.deleted && !self.disabled
    }
}

/// Input for creating an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub restricted: bool,
    pub overdraft: Decimal,
    pub use_global_overdraft: bool,
    pub parent: Option<AccountId>,
    pub currency_code: String,
}

impl NewAccount {
    /// A new account initialised from a template.
    pub fn from_template(
        name: impl Into<String>,
        account_type: AccountType,
        template: &AccountTemplate,
        currency_code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            account_type,
            balance: template.initial_balance,
            restricted: template.restricted,
            overdraft: template.overdraft,
            use_global_overdraft: template.use_global_overdraft,
            parent: None,
            currency_code: currency_code.into(),
        }
    }
}

/// Account settings a group passes on to its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTemplate {
    pub group_name: String,
    /// Whether new members inherit `template`.
    pub apply_initial_settings: bool,
    pub template: AccountTemplate,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Kind of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrxType {
    PrintIn,
    PrintOut,
    Adjust,
    Transfer,
    Voucher,
    Deposit,
    Purchase,
    Gateway,
    Initial,
}

impl TrxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrintIn => "PRINT_IN",
            Self::PrintOut => "PRINT_OUT",
            Self::Adjust => "ADJUST",
            Self::Transfer => "TRANSFER",
            Self::Voucher => "VOUCHER",
            Self::Deposit => "DEPOSIT",
            Self::Purchase => "PURCHASE",
            Self::Gateway => "GATEWAY",
            Self::Initial => "INITIAL",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        Ok(match value {
            "PRINT_IN" => Self::PrintIn,
            "PRINT_OUT" => Self::PrintOut,
            "ADJUST" => Self::Adjust,
            "TRANSFER" => Self::Transfer,
            "VOUCHER" => Self::Voucher,
            "DEPOSIT" => Self::Deposit,
            "PURCHASE" => Self::Purchase,
            "GATEWAY" => Self::Gateway,
            "INITIAL" => Self::Initial,
            other => {
                return Err(PageTallyError::Validation(format!(
                    "unknown transaction type {other}"
                )));
            }
        })
    }

    /// Whether this transaction charges for printing.
    pub fn is_print(&self) -> bool {
        matches!(self, Self::PrintIn | Self::PrintOut)
    }
}

impl std::fmt::Display for TrxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a transaction's amount is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrxState {
    /// Shadow placeholder: amount not yet known, settled exactly once.
    Pending,
    /// Final and immutable.
    Settled,
}

impl TrxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Settled => "SETTLED",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "SETTLED" => Ok(Self::Settled),
            other => Err(PageTallyError::Validation(format!(
                "unknown transaction state {other}"
            ))),
        }
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTrx {
    pub id: TrxId,
    pub account_id: AccountId,
    /// Signed change applied to the balance.
    pub amount: Decimal,
    /// Account balance right after this transaction.
    pub balance_after: Decimal,
    pub trx_type: TrxType,
    pub weight: u32,
    pub weight_unit: u32,
    pub currency_code: String,
    pub doc_log_id: Option<DocLogId>,
    pub comment: Option<String>,
    pub state: TrxState,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccountTrx {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub trx_type: TrxType,
    pub weight: u32,
    pub weight_unit: u32,
    pub currency_code: String,
    pub doc_log_id: Option<DocLogId>,
    pub comment: Option<String>,
    pub state: TrxState,
}

/// One account's weighted share of a job cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTrxInfo {
    pub account_id: AccountId,
    pub weight: u32,
    pub weight_unit: u32,
    /// Free-form details (e.g. the delegator), stored as the trx comment.
    pub ext_details: Option<String>,
}

/// How a job's cost is split over accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTrxInfoSet {
    pub weight_total: u32,
    pub infos: Vec<AccountTrxInfo>,
}

impl AccountTrxInfoSet {
    /// A set charging the whole cost to a single account.
    pub fn single(account_id: AccountId) -> Self {
        Self {
            weight_total: 1,
            infos: vec![AccountTrxInfo {
                account_id,
                weight: 1,
                weight_unit: 1,
                ext_details: None,
            }],
        }
    }

    /// Reject sets that cannot produce a sane split.
    pub fn validate(&self) -> Result<()> {
        if self.infos.is_empty() {
            return Err(PageTallyError::Validation("empty account split".into()));
        }
        if self.weight_total == 0 {
            return Err(PageTallyError::Validation("zero weight total".into()));
        }
        if self.infos.iter().any(|i| i.weight_unit == 0) {
            return Err(PageTallyError::Validation("zero weight unit".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Print log
// ---------------------------------------------------------------------------

/// Reconciliation state of a job printed through a third-party supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtStatus {
    Pending,
    PendingCancel,
    Completed,
    Canceled,
}

impl ExtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::PendingCancel => "PENDING_CANCEL",
            Self::Completed => "COMPLETED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "PENDING_CANCEL" => Ok(Self::PendingCancel),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(PageTallyError::Validation(format!(
                "unknown supplier status {other}"
            ))),
        }
    }
}

/// Third-party supplier a job came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtSupplierInfo {
    pub supplier: String,
    pub ext_id: String,
}

/// Print-log record every print charge links to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocLog {
    pub id: DocLogId,
    /// Outbox file name or ticket number of the job.
    pub job_ref: String,
    pub printer_name: String,
    pub pages: u32,
    pub copies: u32,
    pub cost: Decimal,
    pub ext_supplier: Option<ExtSupplierInfo>,
    pub ext_status: Option<ExtStatus>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a print-log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocLog {
    pub job_ref: String,
    pub printer_name: String,
    pub pages: u32,
    pub copies: u32,
    pub cost: Decimal,
    pub ext_supplier: Option<ExtSupplierInfo>,
    pub ext_status: Option<ExtStatus>,
}

// ---------------------------------------------------------------------------
// Print jobs
// ---------------------------------------------------------------------------

/// Duplex printing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplexMode {
    #[default]
    Simplex,
    LongEdge,
    ShortEdge,
}

impl DuplexMode {
    pub fn is_duplex(&self) -> bool {
        !matches!(self, Self::Simplex)
    }

    /// IPP `sides` keyword (RFC 8011 §5.2.8).
    pub fn ipp_sides_keyword(&self) -> &'static str {
        match self {
            Self::Simplex => "one-sided",
            Self::LongEdge => "two-sided-long-edge",
            Self::ShortEdge => "two-sided-short-edge",
        }
    }
}

/// Component costs of a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CostResult {
    pub media: Decimal,
    pub sheet: Decimal,
    pub copy: Decimal,
    pub set: Decimal,
}

impl CostResult {
    pub fn total(&self) -> Decimal {
        self.media + self.sheet + self.copy + self.set
    }
}

/// Requested output characteristics of a held job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub duplex: DuplexMode,
    pub color: bool,
    /// Requested media keyword (e.g. "iso_a4_210x297mm").
    pub media: Option<String>,
    /// Requested media for banner/job sheets.
    pub job_sheet_media: Option<String>,
    pub output_bin: Option<String>,
    /// IPP finishing and other options (keyword -> choice).
    pub ipp_options: BTreeMap<String, String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            duplex: DuplexMode::Simplex,
            color: false,
            media: None,
            job_sheet_media: None,
            output_bin: None,
            ipp_options: BTreeMap::new(),
        }
    }
}

/// A proxy-print job held in an outbox or ticket queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxJob {
    /// Unique base name of the job's document and record files.
    pub file: String,
    /// Owning principal (user id).
    pub owner: String,
    pub printer_name: String,
    pub copies: u32,
    pub pages: u32,
    pub submit_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    pub cost_result: CostResult,
    /// SHA-256 of the rendered document.
    pub document_hash: String,
    pub options: JobOptions,
    pub trx_info_set: Option<AccountTrxInfoSet>,
    pub ext_supplier: Option<ExtSupplierInfo>,
    /// Owner's group templates, used when the owner's account is created
    /// on first charge.
    #[serde(default)]
    pub account_groups: Vec<GroupTemplate>,
}

impl OutboxJob {
    pub fn cost(&self) -> Decimal {
        self.cost_result.total()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time < now
    }
}

/// Lifecycle of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Created,
    WaitingForRelease,
    Printing,
    Completed,
    Canceled,
}

impl TicketStatus {
    /// Whether `self -> next` is an allowed transition.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Created, WaitingForRelease)
                | (WaitingForRelease, Printing)
                | (WaitingForRelease, Canceled)
                | (Printing, Completed)
                | (Printing, Canceled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::WaitingForRelease => "WAITING_FOR_RELEASE",
            Self::Printing => "PRINTING",
            Self::Completed => "COMPLETED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// Whether a ticket is a print or a copy job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketScope {
    Print,
    Copy,
}

/// Record of a ticket being handed to a printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub printer_name: String,
    pub dispatched_at: DateTime<Utc>,
}

/// A deferred, operator-released print job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub number: String,
    pub job: OutboxJob,
    pub status: TicketStatus,
    pub scope: TicketScope,
    /// Printer chosen to fulfil the ticket instead of the nominal one.
    pub printer_redirect: Option<String>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub tag: Option<String>,
    pub dispatch: Option<DispatchRecord>,
}
