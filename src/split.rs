// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Share computation for a bill.
//!
//! [`compute_shares`] partitions a bill's total among its debtors. It is a
//! pure function: callers persist the resulting debts.
//!
//! - **Equal**: every debtor owes `floor(total / n)`. The remainder
//!   (`total mod n`, always `< n`) is dropped, not assigned to anyone, and is
//!   reported in [`Split::remainder`] so it can be stored and redisplayed.
//! - **Custom**: one amount per debtor, summing to the total exactly.
//! - **Dutch**: reserved, always rejected.

use crate::error::SplitError;
use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SplitKind {
    Equal,
    Custom,
    Dutch,
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SplitKind::Equal => "EQUAL",
            SplitKind::Custom => "CUSTOM",
            SplitKind::Dutch => "DUTCH",
        };
        f.write_str(s)
    }
}

/// Result of a split: one share per debtor, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub shares: Vec<Money>,
    /// Part of the total assigned to nobody (equal splits only).
    pub remainder: Money,
}

/// Computes each debtor's share of `total`.
///
/// `custom` is required for [`SplitKind::Custom`] and ignored otherwise.
/// Custom amounts are signed so that negative inputs can be rejected
/// explicitly rather than failing to parse upstream.
///
/// # Errors
///
/// Returns a [`SplitError`] when there are no debtors or more than
/// `max_participants`, when the total is zero, when a custom amount is
/// missing, negative or zero, when custom amounts do not sum to the total,
/// or when an equal share would be less than one unit.
pub fn compute_shares(
    total: Money,
    participants: usize,
    kind: SplitKind,
    custom: Option<&[i64]>,
    max_participants: usize,
) -> Result<Split, SplitError> {
    if participants == 0 {
        return Err(SplitError::NoParticipants);
    }
    if participants > max_participants {
        return Err(SplitError::TooManyParticipants {
            count: participants,
            max: max_participants,
        });
    }
    if total.is_zero() {
        return Err(SplitError::NonPositiveTotal);
    }

    match kind {
        SplitKind::Equal => equal_shares(total, participants),
        SplitKind::Custom => custom_shares(total, participants, custom.unwrap_or(&[])),
        SplitKind::Dutch => Err(SplitError::DutchUnsupported),
    }
}

fn equal_shares(total: Money, participants: usize) -> Result<Split, SplitError> {
    let n = participants as u64;
    let share = total.units() / n;
    if share == 0 {
        return Err(SplitError::ShareBelowOneUnit {
            total,
            participants,
        });
    }
    Ok(Split {
        shares: vec![Money::new(share); participants],
        remainder: Money::new(total.units() % n),
    })
}

fn custom_shares(total: Money, participants: usize, amounts: &[i64]) -> Result<Split, SplitError> {
    if amounts.len() != participants {
        return Err(SplitError::MissingCustomAmount {
            expected: participants,
            provided: amounts.len(),
        });
    }

    let mut shares = Vec::with_capacity(participants);
    let mut sum: u128 = 0;
    for (index, &amount) in amounts.iter().enumerate() {
        if amount < 0 {
            return Err(SplitError::NegativeCustomAmount { index });
        }
        if amount == 0 {
            return Err(SplitError::ZeroCustomAmount { index });
        }
        let amount = amount as u64;
        sum += u128::from(amount);
        shares.push(Money::new(amount));
    }

    if sum != u128::from(total.units()) {
        return Err(SplitError::SumMismatch {
            expected: total,
            actual: Money::new(u64::try_from(sum).unwrap_or(u64::MAX)),
        });
    }

    Ok(Split {
        shares,
        remainder: Money::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 20;

    fn units(split: &Split) -> Vec<u64> {
        split.shares.iter().map(|m| m.units()).collect()
    }

    #[test]
    fn equal_split_drops_remainder() {
        let split = compute_shares(Money::new(100), 3, SplitKind::Equal, None, MAX).unwrap();
        assert_eq!(units(&split), vec![33, 33, 33]);
        assert_eq!(split.remainder, Money::new(1));
    }

    #[test]
    fn equal_split_exact_division() {
        let split = compute_shares(Money::new(90), 3, SplitKind::Equal, None, MAX).unwrap();
        assert_eq!(units(&split), vec![30, 30, 30]);
        assert_eq!(split.remainder, Money::ZERO);
    }

    #[test]
    fn equal_split_ignores_custom_amounts() {
        let split =
            compute_shares(Money::new(10), 2, SplitKind::Equal, Some(&[1, 9]), MAX).unwrap();
        assert_eq!(units(&split), vec![5, 5]);
    }

    #[test]
    fn equal_split_share_below_one_unit() {
        let result = compute_shares(Money::new(2), 3, SplitKind::Equal, None, MAX);
        assert_eq!(
            result,
            Err(SplitError::ShareBelowOneUnit {
                total: Money::new(2),
                participants: 3
            })
        );
    }

    #[test]
    fn no_participants_rejected() {
        let result = compute_shares(Money::new(100), 0, SplitKind::Equal, None, MAX);
        assert_eq!(result, Err(SplitError::NoParticipants));
    }

    #[test]
    fn too_many_participants_rejected() {
        let result = compute_shares(Money::new(1000), 21, SplitKind::Equal, None, MAX);
        assert_eq!(
            result,
            Err(SplitError::TooManyParticipants { count: 21, max: 20 })
        );
        assert!(compute_shares(Money::new(1000), 20, SplitKind::Equal, None, MAX).is_ok());
    }

    #[test]
    fn zero_total_rejected() {
        let result = compute_shares(Money::ZERO, 2, SplitKind::Equal, None, MAX);
        assert_eq!(result, Err(SplitError::NonPositiveTotal));
    }

    #[test]
    fn custom_split_exact_sum() {
        let split =
            compute_shares(Money::new(100), 3, SplitKind::Custom, Some(&[50, 30, 20]), MAX)
                .unwrap();
        assert_eq!(units(&split), vec![50, 30, 20]);
        assert_eq!(split.remainder, Money::ZERO);
    }

    #[test]
    fn custom_split_off_by_one_rejected() {
        let result =
            compute_shares(Money::new(100), 3, SplitKind::Custom, Some(&[50, 30, 19]), MAX);
        assert_eq!(
            result,
            Err(SplitError::SumMismatch {
                expected: Money::new(100),
                actual: Money::new(99)
            })
        );
    }

    #[test]
    fn custom_split_missing_amounts() {
        let result = compute_shares(Money::new(100), 3, SplitKind::Custom, None, MAX);
        assert_eq!(
            result,
            Err(SplitError::MissingCustomAmount {
                expected: 3,
                provided: 0
            })
        );

        let result = compute_shares(Money::new(100), 3, SplitKind::Custom, Some(&[100]), MAX);
        assert!(matches!(result, Err(SplitError::MissingCustomAmount { .. })));
    }

    #[test]
    fn custom_split_negative_amount() {
        let result =
            compute_shares(Money::new(100), 2, SplitKind::Custom, Some(&[110, -10]), MAX);
        assert_eq!(result, Err(SplitError::NegativeCustomAmount { index: 1 }));
    }

    #[test]
    fn custom_split_zero_amount() {
        let result = compute_shares(Money::new(100), 2, SplitKind::Custom, Some(&[0, 100]), MAX);
        assert_eq!(result, Err(SplitError::ZeroCustomAmount { index: 0 }));
    }

    #[test]
    fn dutch_split_rejected() {
        let result = compute_shares(Money::new(100), 2, SplitKind::Dutch, None, MAX);
        assert_eq!(result, Err(SplitError::DutchUnsupported));
    }

    #[test]
    fn split_kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&SplitKind::Custom).unwrap(), "\"CUSTOM\"");
        let kind: SplitKind = serde_json::from_str("\"EQUAL\"").unwrap();
        assert_eq!(kind, SplitKind::Equal);
    }
}
