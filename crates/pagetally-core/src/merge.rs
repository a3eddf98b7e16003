// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Two-pointer merge over two sequences sorted by the same key.
//
// Used wherever two views of the same set must be reconciled: queue index
// entries vs. document files on disk, stored records vs. an incoming list.

use std::cmp::Ordering;

/// One comparison step of a sorted merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStep<'a, L, R> {
    /// Key present only on the left side.
    Left(&'a L),
    /// Key present only on the right side.
    Right(&'a R),
    /// Key present on both sides.
    Both(&'a L, &'a R),
}

/// Merge two slices that are each sorted ascending by their key.
///
/// Emits exactly one step per distinct key. Duplicate keys within one side
/// are emitted as separate one-sided steps.
pub fn merge_sorted<'a, L, R, K, FL, FR>(
    left: &'a [L],
    right: &'a [R],
    left_key: FL,
    right_key: FR,
) -> Vec<MergeStep<'a, L, R>>
where
    K: Ord,
    FL: Fn(&L) -> K,
    FR: Fn(&R) -> K,
{
    debug_assert!(left.windows(2).all(|w| left_key(&w[0]) <= left_key(&w[1])));
    debug_assert!(right.windows(2).all(|w| right_key(&w[0]) <= right_key(&w[1])));

    let mut steps = Vec::with_capacity(left.len().max(right.len()));
    let (mut i, mut j) = (0, 0);

    while i < left.len() && j < right.len() {
        match left_key(&left[i]).cmp(&right_key(&right[j])) {
            Ordering::Less => {
                steps.push(MergeStep::Left(&left[i]));
                i += 1;
            }
            Ordering::Greater => {
                steps.push(MergeStep::Right(&right[j]));
                j += 1;
            }
            Ordering::Equal => {
                steps.push(MergeStep::Both(&left[i], &right[j]));
                i += 1;
                j += 1;
            }
        }
    }
    steps.extend(left[i..].iter().map(MergeStep::Left));
    steps.extend(right[j..].iter().map(MergeStep::Right));
    steps
}
