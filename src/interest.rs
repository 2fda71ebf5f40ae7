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

//! Interest accrual on unpaid debts.
//!
//! Interest is simple and non-compounding: after the grace period each
//! elapsed whole day adds `daily_rate_bps` basis points of the *remaining*
//! principal. The quote is recomputed from scratch on every call, so the read
//! path (status queries) and the payment path (amount to charge) always agree.
//!
//! ```text
//! remaining    = max(principal - paid, 0)
//! days_overdue = floor((now - created_at - grace) / 1 day), at least 0
//! interest     = remaining * days_overdue * daily_rate_bps / 10_000
//! total        = remaining + interest
//! ```

use crate::error::LedgerError;
use crate::money::Money;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

const BPS_DENOMINATOR: u128 = 10_000;

/// Grace period and rate applied to every debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestPolicy {
    pub grace_period: Duration,
    pub daily_rate_bps: u32,
}

impl Default for InterestPolicy {
    fn default() -> Self {
        Self {
            grace_period: Duration::days(3),
            daily_rate_bps: 100,
        }
    }
}

/// A point-in-time quote for a debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AmountDue {
    /// Principal still outstanding.
    pub principal: Money,
    pub interest: Money,
    /// `principal + interest`.
    pub total: Money,
    pub days_overdue: u32,
    /// Paid beyond the principal on a settled debt, i.e. interest received.
    pub interest_collected: Money,
}

impl AmountDue {
    pub const SETTLED: AmountDue = AmountDue {
        principal: Money::ZERO,
        interest: Money::ZERO,
        total: Money::ZERO,
        days_overdue: 0,
        interest_collected: Money::ZERO,
    };
}

impl InterestPolicy {
    /// Whole days past the grace period. Zero inside the grace period and
    /// when `now` precedes `created_at` (clock skew).
    pub fn days_overdue(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
        let Some(overdue) = now
            .signed_duration_since(created_at)
            .checked_sub(&self.grace_period)
        else {
            return 0;
        };
        if overdue <= Duration::zero() {
            return 0;
        }
        u32::try_from(overdue.num_days()).unwrap_or(u32::MAX)
    }

    /// Quotes the amount currently due on a debt.
    ///
    /// Pure and stateless: identical inputs always give identical output.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AmountOverflow`] if the interest does not fit in
    /// [`Money`].
    pub fn calculate_due(
        &self,
        principal: Money,
        paid: Money,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<AmountDue, LedgerError> {
        if paid >= principal {
            return Ok(AmountDue {
                interest_collected: paid.saturating_sub(principal),
                ..AmountDue::SETTLED
            });
        }

        let remaining = principal.checked_sub(paid)?;
        let days_overdue = self.days_overdue(created_at, now);
        let interest = u128::from(remaining.units())
            * u128::from(days_overdue)
            * u128::from(self.daily_rate_bps)
            / BPS_DENOMINATOR;
        let interest = u64::try_from(interest)
            .map(Money::new)
            .map_err(|_| LedgerError::AmountOverflow)?;

        Ok(AmountDue {
            principal: remaining,
            interest,
            total: remaining.checked_add(interest)?,
            days_overdue,
            interest_collected: Money::ZERO,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn five_days_after_creation() {
        let policy = InterestPolicy::default();
        let now = created() + Duration::days(5);
        let due = policy
            .calculate_due(Money::new(1000), Money::ZERO, created(), now)
            .unwrap();
        assert_eq!(due.days_overdue, 2);
        assert_eq!(due.interest, Money::new(20));
        assert_eq!(due.total, Money::new(1020));
        assert_eq!(due.principal, Money::new(1000));
    }

    #[test]
    fn no_interest_within_grace_period() {
        let policy = InterestPolicy::default();
        for hours in [0, 1, 24, 71, 72] {
            let now = created() + Duration::hours(hours);
            let due = policy
                .calculate_due(Money::new(1000), Money::ZERO, created(), now)
                .unwrap();
            assert_eq!(due.interest, Money::ZERO, "hours={hours}");
            assert_eq!(due.total, Money::new(1000));
        }
    }

    #[test]
    fn partial_days_round_down() {
        let policy = InterestPolicy::default();
        let now = created() + Duration::days(4) + Duration::hours(23);
        assert_eq!(policy.days_overdue(created(), now), 1);
    }

    #[test]
    fn clock_skew_counts_as_zero_days() {
        let policy = InterestPolicy::default();
        let now = created() - Duration::days(10);
        let due = policy
            .calculate_due(Money::new(1000), Money::ZERO, created(), now)
            .unwrap();
        assert_eq!(due.days_overdue, 0);
        assert_eq!(due.interest, Money::ZERO);
    }

    #[test]
    fn interest_accrues_on_remaining_only() {
        let policy = InterestPolicy::default();
        let now = created() + Duration::days(13);
        let due = policy
            .calculate_due(Money::new(1000), Money::new(400), created(), now)
            .unwrap();
        assert_eq!(due.principal, Money::new(600));
        assert_eq!(due.days_overdue, 10);
        assert_eq!(due.interest, Money::new(60));
        assert_eq!(due.total, Money::new(660));
    }

    #[test]
    fn fully_paid_owes_nothing() {
        let policy = InterestPolicy::default();
        let now = created() + Duration::days(30);
        let due = policy
            .calculate_due(Money::new(1000), Money::new(1000), created(), now)
            .unwrap();
        assert_eq!(due, AmountDue::SETTLED);
    }

    #[test]
    fn settled_with_interest_reports_collected_interest() {
        let policy = InterestPolicy::default();
        let due = policy
            .calculate_due(Money::new(1000), Money::new(1020), created(), created())
            .unwrap();
        assert_eq!(due.principal, Money::ZERO);
        assert_eq!(due.total, Money::ZERO);
        assert_eq!(due.interest_collected, Money::new(20));
    }

    #[test]
    fn open_debt_has_collected_nothing() {
        let policy = InterestPolicy::default();
        let now = created() + Duration::days(5);
        let due = policy
            .calculate_due(Money::new(1000), Money::new(999), created(), now)
            .unwrap();
        assert_eq!(due.interest_collected, Money::ZERO);
    }

    #[test]
    fn extreme_timestamps_do_not_panic() {
        let policy = InterestPolicy::default();
        let due = policy
            .calculate_due(
                Money::new(1000),
                Money::ZERO,
                DateTime::<Utc>::MIN_UTC,
                DateTime::<Utc>::MAX_UTC,
            )
            .unwrap();
        assert!(due.days_overdue > 0);
        assert!(due.total > Money::new(1000));
    }

    #[test]
    fn overflowing_interest_is_an_error() {
        let policy = InterestPolicy {
            grace_period: Duration::zero(),
            daily_rate_bps: u32::MAX,
        };
        let now = created() + Duration::days(100_000);
        let result = policy.calculate_due(Money::new(u64::MAX), Money::ZERO, created(), now);
        assert_eq!(result, Err(LedgerError::AmountOverflow));
    }

    #[test]
    fn repeated_quotes_are_identical() {
        let policy = InterestPolicy::default();
        let now = created() + Duration::days(9);
        let first = policy
            .calculate_due(Money::new(777), Money::new(7), created(), now)
            .unwrap();
        let second = policy
            .calculate_due(Money::new(777), Money::new(7), created(), now)
            .unwrap();
        assert_eq!(first, second);
    }
}
