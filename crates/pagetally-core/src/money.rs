// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Money helpers: rounding, parsing and display formatting.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{PageTallyError, Result};

/// Round half-to-even at `scale` decimal places.
pub fn round_half_even(amount: Decimal, scale: u32) -> Decimal {
    amount.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven)
}

/// The smallest representable amount at `scale` (0.01 for scale 2).
pub fn min_unit(scale: u32) -> Decimal {
    Decimal::new(1, scale)
}

/// Format an amount for display, e.g. `EUR 10.00`.
pub fn format_amount(amount: Decimal, scale: u32, currency_code: &str) -> String {
    let rounded = round_half_even(amount, scale);
    format!("{currency_code} {rounded:.prec$}", prec = scale as usize)
}

/// Parse a user-entered amount. Accepts `,` as decimal separator.
pub fn parse_amount(input: &str) -> Result<Decimal> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(PageTallyError::InvalidAmount("empty amount".into()));
    }
    let normalized = trimmed.replace(',', ".");
    Decimal::from_str(&normalized)
        .map_err(|e| PageTallyError::InvalidAmount(format!("{trimmed}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn half_even_rounds_to_even_neighbour() {
        assert_eq!(round_half_even(dec!(2.345), 2), dec!(2.34));
        assert_eq!(round_half_even(dec!(2.355), 2), dec!(2.36));
        assert_eq!(round_half_even(dec!(2.3451), 2), dec!(2.35));
    }

    #[test]
    fn min_unit_matches_scale() {
        assert_eq!(min_unit(0), dec!(1));
        assert_eq!(min_unit(2), dec!(0.01));
        assert_eq!(min_unit(4), dec!(0.0001));
    }

    #[test]
    fn format_pads_to_scale() {
        assert_eq!(format_amount(dec!(10), 2, "EUR"), "EUR 10.00");
        assert_eq!(format_amount(dec!(-5.5), 2, "USD"), "USD -5.50");
        assert_eq!(format_amount(dec!(1.005), 2, "EUR"), "EUR 1.00");
    }

    #[test]
    fn parse_accepts_comma_separator() {
        assert_eq!(parse_amount("12,50").unwrap(), dec!(12.50));
        assert_eq!(parse_amount(" 3.1 ").unwrap(), dec!(3.1));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_amount("ten euros"),
            Err(PageTallyError::InvalidAmount(_))
        ));
        assert!(parse_amount("  ").is_err());
    }
}
