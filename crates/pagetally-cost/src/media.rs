// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Media cost: what the paper sides of a job cost at per-side rates.

use rust_decimal::Decimal;

/// Printed sides per copy: `ceil(pages / pages_per_side)`.
fn sides_per_copy(pages: u32, pages_per_side: u32) -> u32 {
    pages.div_ceil(pages_per_side.max(1))
}

/// Physical sheets per copy, folding sides onto sheets when duplex.
pub fn sheets_per_copy(pages: u32, pages_per_side: u32, duplex: bool) -> u32 {
    let sides = sides_per_copy(pages, pages_per_side);
    if duplex { sides.div_ceil(2) } else { sides }
}

/// Media cost of `copies` copies of a `pages`-page document.
///
/// With duplex, sides are paired onto two-sided sheets charged at
/// `rate_two_sided` per side; an odd trailing side is charged at
/// `rate_one_sided`.  Without duplex every side is one-sided.
/// `discount` is a fraction in `[0, 1]`.
pub fn calc_media_cost(
    pages: u32,
    pages_per_side: u32,
    copies: u32,
    duplex: bool,
    rate_one_sided: Decimal,
    rate_two_sided: Decimal,
    discount: Decimal,
) -> Decimal {
    let sides = sides_per_copy(pages, pages_per_side);

    let (one_sided, two_sided) = if duplex {
        let paired = sides / 2 * 2;
        (sides - paired, paired)
    } else {
        (sides, 0)
    };

    let per_copy =
        Decimal::from(one_sided) * rate_one_sided + Decimal::from(two_sided) * rate_two_sided;

    per_copy * Decimal::from(copies) * (Decimal::ONE - discount)
}

/// Running count of cover pages still to be excluded from media cost.
///
/// Covers are the first pages of the logical job; when a job is assembled
/// from several documents the count carries over from one chunk to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverPages {
    remaining: u32,
    consumed: u32,
}

impl CoverPages {
    pub fn new(cover_pages: u32) -> Self {
        Self {
            remaining: cover_pages,
            consumed: 0,
        }
    }

    /// Take covers from a chunk of `chunk_pages` pages and return the pages
    /// left to price at media rates.
    pub fn take(&mut self, chunk_pages: u32) -> u32 {
        let covers = self.remaining.min(chunk_pages);
        self.remaining -= covers;
        self.consumed += covers;
        chunk_pages - covers
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Cover pages excluded so far.
    pub fn consumed(&self) -> u32 {
        self.consumed
    }
}
