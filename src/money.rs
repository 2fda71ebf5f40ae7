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

//! Exact monetary amounts in the ledger's smallest unit.
//!
//! Every financial path uses [`Money`], a `u64` count of the smallest unit
//! (MIST on Sui, 10^-9 SUI). Arithmetic is checked and reports
//! [`LedgerError::AmountOverflow`] instead of wrapping. Decimal conversion
//! exists only for the user-facing edges.
//!
//! # Example
//!
//! ```
//! use rust_decimal::Decimal;
//! use split_ledger::Money;
//!
//! let fee = Money::from_decimal(Decimal::new(125, 2), 9).unwrap(); // 1.25 SUI
//! assert_eq!(fee, Money::new(1_250_000_000));
//! assert_eq!(fee.to_decimal(9).to_string(), "1.250000000");
//! ```

use crate::error::LedgerError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in the ledger's smallest unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn new(units: u64) -> Self {
        Money(units)
    }

    pub const fn units(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Result<Money, LedgerError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(LedgerError::AmountOverflow)
    }

    pub fn checked_sub(self, other: Money) -> Result<Money, LedgerError> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or(LedgerError::AmountOverflow)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Sums amounts, failing on overflow.
    pub fn checked_sum<I>(amounts: I) -> Result<Money, LedgerError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// Converts a decimal amount in whole coins to the smallest unit.
    ///
    /// `decimals` is the number of smallest units per coin as a power of ten
    /// (9 for SUI). Negative values and values finer than one unit are
    /// rejected rather than rounded.
    pub fn from_decimal(value: Decimal, decimals: u32) -> Result<Money, LedgerError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "{value} is negative"
            )));
        }
        let scale = 10u64
            .checked_pow(decimals)
            .map(Decimal::from)
            .ok_or(LedgerError::AmountOverflow)?;
        let units = value
            .checked_mul(scale)
            .ok_or(LedgerError::AmountOverflow)?;
        if !units.fract().is_zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "{value} has more than {decimals} decimal places"
            )));
        }
        units.to_u64().map(Money).ok_or(LedgerError::AmountOverflow)
    }

    /// Converts to whole coins for display.
    pub fn to_decimal(self, decimals: u32) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.0), decimals)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Money {
    fn from(units: u64) -> Self {
        Money(units)
    }
}
