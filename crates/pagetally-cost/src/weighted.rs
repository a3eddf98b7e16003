// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Weighted cost splits across accounts.
//
// Shares are rounded half-to-even so repeated splits do not drift in one
// direction.  When the weights partition the whole total, the rounding
// residual is handed out one minimum unit at a time in share order, so the
// shares always add up to the rounded total.

use pagetally_core::error::{PageTallyError, Result};
use pagetally_core::money::{min_unit, round_half_even};
use pagetally_core::types::AccountTrxInfoSet;
use rust_decimal::Decimal;
use tracing::debug;

/// `total * weight / (weight_total * weight_unit)`, rounded half-to-even at
/// `scale` decimal places.
pub fn calc_weighted_amount(
    total: Decimal,
    weight_total: u32,
    weight: u32,
    weight_unit: u32,
    scale: u32,
) -> Result<Decimal> {
    let denominator = Decimal::from(weight_total) * Decimal::from(weight_unit);
    if denominator.is_zero() {
        return Err(PageTallyError::Validation(
            "weighted amount with zero weight total or unit".into(),
        ));
    }
    let share = total * Decimal::from(weight) / denominator;
    Ok(round_half_even(share, scale))
}

/// Split `total` over every entry of `set`, in entry order.
pub fn split_weighted(total: Decimal, set: &AccountTrxInfoSet, scale: u32) -> Result<Vec<Decimal>> {
    set.validate()?;

    let mut shares = set
        .infos
        .iter()
        .map(|info| calc_weighted_amount(total, set.weight_total, info.weight, info.weight_unit, scale))
        .collect::<Result<Vec<_>>>()?;

    let covered: Decimal = set
        .infos
        .iter()
        .map(|info| Decimal::from(info.weight) / Decimal::from(info.weight_unit))
        .sum();

    if covered == Decimal::from(set.weight_total) {
        let target = round_half_even(total, scale);
        let residual = target - shares.iter().copied().sum::<Decimal>();
        if !residual.is_zero() {
            distribute_residual(&mut shares, residual, scale);
            debug!(%residual, shares = shares.len(), "rounding residual distributed");
        }
    }

    Ok(shares)
}

fn distribute_residual(shares: &mut [Decimal], residual: Decimal, scale: u32) {
    let unit = min_unit(scale);
    let step = if residual.is_sign_negative() { -unit } else { unit };
    let mut left = residual;
    let mut i = 0;
    while !left.is_zero() && !shares.is_empty() {
        shares[i % shares.len()] += step;
        left -= step;
        i += 1;
    }
}
