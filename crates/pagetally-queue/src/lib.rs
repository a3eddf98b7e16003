// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagetally-queue: durable job queues for PageTally.
//
// Per-owner hold queues (outboxes), the operator-released ticket queue,
// ticket numbering, and capability-based printer redirection.

pub mod integrity;
pub mod outbox;
pub mod redirect;
pub mod store;
pub mod ticket;
pub mod ticket_number;

pub use outbox::{OutboxInfo, OutboxQueue, OutboxSummary, PruneOutcome};
pub use redirect::{
    MediaSource, PrinterCapabilities, RedirectCandidate, RedirectMatcher, RedirectPrinter,
    RedirectRequest, RedirectSelection,
};
pub use ticket::{RebuildReport, TicketQueue, TicketRequest, TicketStats};
pub use ticket_number::TicketNumberGenerator;
