// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PageTally Cost — pure, rounding-exact pricing of print jobs.  Nothing in
// this crate performs I/O or holds state; the ledger and queues call into it
// with the parameters they already have.

pub mod media;
pub mod proxy;
pub mod weighted;

pub use media::{CoverPages, calc_media_cost, sheets_per_copy};
pub use proxy::{ChargeType, CostParms, MediaCost, PageRate, PrinterCostProfile, calc_proxy_print_cost};
pub use weighted::{calc_weighted_amount, split_weighted};
