// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: owns the ledger and queues for the lifetime of the process
// and hands them to request handlers.

pub mod app_services;
pub mod data_dir;
