// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for PageTally.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a print request was refused by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialKind {
    /// The account has no credit limit and not enough balance.
    NoBalance,
    /// The charge would push the account past its credit limit.
    CreditExceeded,
}

/// A "print denied" outcome carrying display-ready amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintDenied {
    pub kind: DenialKind,
    /// Formatted balance before the charge.
    pub balance: String,
    /// Formatted cost of the job.
    pub cost: String,
    /// Formatted credit limit (zero for `NoBalance`).
    pub credit_limit: String,
}

impl std::fmt::Display for PrintDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            DenialKind::NoBalance => write!(
                f,
                "print denied: cost {} exceeds balance {}",
                self.cost, self.balance
            ),
            DenialKind::CreditExceeded => write!(
                f,
                "print denied: cost {} exceeds balance {} plus credit limit {}",
                self.cost, self.balance, self.credit_limit
            ),
        }
    }
}

/// Top-level error type for all PageTally operations.
#[derive(Debug, Error)]
pub enum PageTallyError {
    // -- Validation errors --
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("name already in use: {0}")]
    NameCollision(String),

    #[error("invalid request: {0}")]
    Validation(String),

    // -- Business denial --
    #[error("{0}")]
    PrintDenied(PrintDenied),

    // -- Invariant violations --
    #[error("job {job_ref} already charged as {trx_type}")]
    DoubleCharge { job_ref: String, trx_type: String },

    #[error("unsupported charge type: {0}")]
    UnsupportedChargeType(String),

    #[error("ticket {0} already dispatched")]
    TicketAlreadyDispatched(String),

    #[error("account type mismatch: expected {expected}, got {actual}")]
    AccountTypeMismatch { expected: String, actual: String },

    #[error("transaction {0} already settled")]
    TrxAlreadySettled(i64),

    #[error("ticket {ticket} cannot move from {from} to {to}")]
    IllegalTransition {
        ticket: String,
        from: String,
        to: String,
    },

    // -- Queue errors --
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("document fingerprint mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("lock on {0} could not be acquired")]
    LockFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PageTallyError {
    /// Machine-readable code for request/response contracts.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            Self::NameCollision(_) => "NAME_COLLISION",
            Self::Validation(_) => "VALIDATION",
            Self::PrintDenied(d) => match d.kind {
                DenialKind::NoBalance => "PRINT_DENIED_NO_BALANCE",
                DenialKind::CreditExceeded => "PRINT_DENIED_CREDIT_EXCEEDED",
            },
            Self::DoubleCharge { .. } => "DOUBLE_CHARGE",
            Self::UnsupportedChargeType(_) => "UNSUPPORTED_CHARGE_TYPE",
            Self::TicketAlreadyDispatched(_) => "TICKET_ALREADY_DISPATCHED",
            Self::AccountTypeMismatch { .. } => "ACCOUNT_TYPE_MISMATCH",
            Self::TrxAlreadySettled(_) => "TRX_ALREADY_SETTLED",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::JobNotFound(_) => "JOB_NOT_FOUND",
            Self::Queue(_) => "QUEUE",
            Self::IntegrityMismatch { .. } => "INTEGRITY_MISMATCH",
            Self::Database(_) => "DATABASE",
            Self::LockFailed(_) => "LOCK_FAILED",
            Self::Config(_) => "CONFIG",
            Self::Io(_) => "IO",
            Self::Serialization(_) => "SERIALIZATION",
        }
    }

    /// Caller-contract breaches. These abort the enclosing transaction and
    /// are never retried.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::DoubleCharge { .. }
                | Self::UnsupportedChargeType(_)
                | Self::TicketAlreadyDispatched(_)
                | Self::AccountTypeMismatch { .. }
                | Self::TrxAlreadySettled(_)
                | Self::IllegalTransition { .. }
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PageTallyError>;
