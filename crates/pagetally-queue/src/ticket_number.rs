// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ticket numbers.
//
// A strictly increasing microsecond timestamp is hex-encoded, its digits are
// shuffled so that numbers do not reveal submission order, and the result is
// cut into fixed-width groups, e.g. `3A0F-6E11-C8D2-7B40`.  An optional tag
// is prepended as `TAG/3A0F-...`.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use pagetally_core::error::{PageTallyError, Result};
use rand::Rng;
use rand::seq::SliceRandom;

/// Joins the digit groups of a number.
pub const NUMBER_SEPARATOR: char = '-';
/// Separates the optional tag from the number.
pub const TAG_SEPARATOR: char = '/';
/// Hex digits per group.
pub const GROUP_WIDTH: usize = 4;
/// Hex digits per number.
pub const NUMBER_DIGITS: usize = 16;

/// Hand out ticket numbers derived from unique timestamps.
#[derive(Debug, Default)]
pub struct TicketNumberGenerator {
    last: AtomicU64,
}

impl TicketNumberGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in microseconds, bumped past the last value handed out.
    fn next_value(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// A new ticket number, optionally prefixed with `tag`.
    pub fn generate(&self, tag: Option<&str>) -> Result<String> {
        format_number(self.next_value(), tag, &mut rand::thread_rng())
    }
}

/// Shuffle and group the hex digits of `value`.
pub fn format_number<R: Rng + ?Sized>(value: u64, tag: Option<&str>, rng: &mut R) -> Result<String> {
    if let Some(tag) = tag {
        if tag.is_empty() || tag.contains(TAG_SEPARATOR) {
            return Err(PageTallyError::Validation(format!("invalid ticket tag {tag:?}")));
        }
    }

    let mut digits: Vec<char> = format!("{value:0width$X}", width = NUMBER_DIGITS)
        .chars()
        .collect();
    digits.shuffle(rng);

    let groups: Vec<String> = digits
        .chunks(GROUP_WIDTH)
        .map(|group| group.iter().collect())
        .collect();
    let number = groups.join(NUMBER_SEPARATOR.to_string().as_str());

    Ok(match tag {
        Some(tag) => format!("{tag}{TAG_SEPARATOR}{number}"),
        None => number,
    })
}

/// Whether `number` has the shape produced by `format_number`.
pub fn is_well_formed(number: &str) -> bool {
    let code = match number.rsplit_once(TAG_SEPARATOR) {
        Some((tag, code)) => {
            if tag.is_empty() || tag.contains(TAG_SEPARATOR) {
                return false;
            }
            code
        }
        None => number,
    };
    let groups: Vec<&str> = code.split(NUMBER_SEPARATOR).collect();
    groups.len() == NUMBER_DIGITS / GROUP_WIDTH
        && groups.iter().all(|g| {
            g.len() == GROUP_WIDTH
                && g.chars()
                    .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ten_thousand_numbers_are_unique_and_well_formed() {
        let generator = TicketNumberGenerator::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let number = generator.generate(None).unwrap();
            assert!(is_well_formed(&number), "{number}");
            assert!(seen.insert(number));
        }
    }

    #[test]
    fn tagged_numbers_start_with_the_tag() {
        let generator = TicketNumberGenerator::new();
        for _ in 0..100 {
            let number = generator.generate(Some("TAG")).unwrap();
            assert!(number.starts_with("TAG/"), "{number}");
            assert!(is_well_formed(&number));
        }
    }

    #[test]
    fn tag_may_not_contain_the_separator() {
        let generator = TicketNumberGenerator::new();
        assert!(generator.generate(Some("A/B")).is_err());
        assert!(generator.generate(Some("")).is_err());
    }

    #[test]
    fn values_are_strictly_increasing() {
        let generator = TicketNumberGenerator::new();
        let values: Vec<u64> = (0..1000).map(|_| generator.next_value()).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn shuffle_keeps_the_digits() {
        let number = format_number(0x0123_4567_89AB_CDEF, None, &mut rand::thread_rng()).unwrap();
        let mut digits: Vec<char> = number.chars().filter(|c| *c != NUMBER_SEPARATOR).collect();
        digits.sort();
        assert_eq!(digits.into_iter().collect::<String>(), "0123456789ABCDEF");
    }
}
