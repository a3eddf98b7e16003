// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the people at the print release station.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity drives how the front end presents it.

use serde::Serialize;

use crate::error::{DenialKind, PageTallyError};

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Retrying shortly may succeed (busy lock, disk hiccup).
    Transient,
    /// The user must change something (top up, fix input).
    ActionRequired,
    /// Printing was refused by the account rules.
    Denied,
    /// Configuration or program fault, needs an administrator.
    Fatal,
}

/// A structured, display-ready error.
#[derive(Debug, Clone, Serialize)]
pub struct HumanError {
    /// Machine-readable code (see [`PageTallyError::code`]).
    pub code: &'static str,
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether the front end may offer a retry button.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `PageTallyError` into a `HumanError`.
pub fn humanize_error(err: &PageTallyError) -> HumanError {
    let code = err.code();
    let (message, suggestion, retriable, severity) = match err {
        PageTallyError::PrintDenied(denied) => match denied.kind {
            DenialKind::NoBalance => (
                format!(
                    "Your balance of {} is not enough for this job ({}).",
                    denied.balance, denied.cost
                ),
                "Top up your account or print fewer pages.".to_string(),
                false,
                Severity::Denied,
            ),
            DenialKind::CreditExceeded => (
                format!(
                    "This job ({}) would exceed your credit limit of {}.",
                    denied.cost, denied.credit_limit
                ),
                format!(
                    "Your current balance is {}. Top up your account to continue.",
                    denied.balance
                ),
                false,
                Severity::Denied,
            ),
        },

        PageTallyError::InvalidAmount(detail) => (
            "That amount doesn't look right.".to_string(),
            format!("Enter a number like 12.50. ({detail})"),
            false,
            Severity::ActionRequired,
        ),

        PageTallyError::UnknownAccount(name) => (
            format!("We couldn't find the account \"{name}\"."),
            "Check the spelling or ask an administrator to create it.".to_string(),
            false,
            Severity::ActionRequired,
        ),

        PageTallyError::NameCollision(name) => (
            format!("The name \"{name}\" is already taken."),
            "Choose a different name.".to_string(),
            false,
            Severity::ActionRequired,
        ),

        PageTallyError::Validation(detail) => (
            "Some of the details are not valid.".to_string(),
            detail.clone(),
            false,
            Severity::ActionRequired,
        ),

        PageTallyError::JobNotFound(_) => (
            "That print job is no longer waiting.".to_string(),
            "It may have expired or been released already. Refresh the list.".to_string(),
            false,
            Severity::ActionRequired,
        ),

        PageTallyError::LockFailed(_) => (
            "The account is busy right now.".to_string(),
            "Wait a moment, then try again.".to_string(),
            true,
            Severity::Transient,
        ),

        PageTallyError::IntegrityMismatch { .. } => (
            "The stored document no longer matches the print job.".to_string(),
            "Submit the document again.".to_string(),
            false,
            Severity::ActionRequired,
        ),

        PageTallyError::Io(_) | PageTallyError::Queue(_) | PageTallyError::Database(_) => (
            "We couldn't save your print job.".to_string(),
            "Try again. If it keeps happening, tell an administrator.".to_string(),
            true,
            Severity::Transient,
        ),

        PageTallyError::DoubleCharge { .. }
        | PageTallyError::UnsupportedChargeType(_)
        | PageTallyError::TicketAlreadyDispatched(_)
        | PageTallyError::AccountTypeMismatch { .. }
        | PageTallyError::TrxAlreadySettled(_)
        | PageTallyError::IllegalTransition { .. }
        | PageTallyError::Config(_)
        | PageTallyError::Serialization(_) => (
            "Something is wrong with the print setup.".to_string(),
            format!("Ask an administrator to check the configuration. ({err})"),
            false,
            Severity::Fatal,
        ),
    };

    HumanError {
        code,
        message,
        suggestion,
        retriable,
        severity,
    }
}
