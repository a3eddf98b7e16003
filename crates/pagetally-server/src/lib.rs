// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PageTally server: process-level wiring of the ledger and queues.

pub mod services;

pub use services::app_services::{AppServices, MaintenanceReport, PrintRequest};
