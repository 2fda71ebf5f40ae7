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

//! Ledger configuration.
//!
//! Built once by the process entry point and handed to the reconciler by
//! value; nothing in the crate reads configuration from globals.

use crate::error::LedgerError;
use crate::interest::InterestPolicy;
use chrono::Duration;

/// Tunables for split validation, interest accrual and transaction building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Interest-free window after a debt is created.
    pub grace_period_days: i64,
    /// Simple daily interest rate in basis points (100 = 1%/day).
    pub daily_rate_bps: u32,
    /// Upper bound on debtors per bill.
    pub max_participants: usize,
    /// Smallest units per coin as a power of ten (SUI uses 9).
    pub coin_decimals: u32,
    /// Ticker shown in human-readable summaries.
    pub coin_symbol: String,
    /// On-chain package that owns the bill/debt entry points.
    pub package_id: String,
    /// Shared registry object passed to bill creation calls.
    pub registry_object: String,
    /// Explorer prefix for transaction links in notices.
    pub explorer_base: String,
}

impl LedgerConfig {
    pub const DEFAULT_GRACE_PERIOD_DAYS: i64 = 3;
    pub const DEFAULT_DAILY_RATE_BPS: u32 = 100;
    pub const DEFAULT_MAX_PARTICIPANTS: usize = 20;
    /// Longest accepted grace period, one hundred years.
    pub const MAX_GRACE_PERIOD_DAYS: i64 = 36_500;

    /// Rejects settings the interest model cannot work with.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !(0..=Self::MAX_GRACE_PERIOD_DAYS).contains(&self.grace_period_days) {
            return Err(LedgerError::InvalidRequest(format!(
                "grace period of {} days is outside 0..={}",
                self.grace_period_days,
                Self::MAX_GRACE_PERIOD_DAYS
            )));
        }
        if self.max_participants == 0 {
            return Err(LedgerError::InvalidRequest(
                "max participants must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Out-of-range grace periods are clamped; see [`validate`](Self::validate).
    pub fn interest_policy(&self) -> InterestPolicy {
        let days = self
            .grace_period_days
            .clamp(0, Self::MAX_GRACE_PERIOD_DAYS);
        InterestPolicy {
            grace_period: Duration::days(days),
            daily_rate_bps: self.daily_rate_bps,
        }
    }

    pub fn explorer_link(&self, digest: &str) -> String {
        format!("{}/{}", self.explorer_base.trim_end_matches('/'), digest)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            grace_period_days: Self::DEFAULT_GRACE_PERIOD_DAYS,
            daily_rate_bps: Self::DEFAULT_DAILY_RATE_BPS,
            max_participants: Self::DEFAULT_MAX_PARTICIPANTS,
            coin_decimals: 9,
            coin_symbol: "SUI".to_string(),
            package_id: "0x0".to_string(),
            registry_object: "0x0".to_string(),
            explorer_base: "https://suiscan.xyz/testnet/tx".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_published_terms() {
        let config = LedgerConfig::default();
        assert_eq!(config.grace_period_days, 3);
        assert_eq!(config.daily_rate_bps, 100);
        assert_eq!(config.max_participants, 20);
        assert_eq!(config.coin_decimals, 9);
    }

    #[test]
    fn interest_policy_uses_days() {
        let policy = LedgerConfig::default().interest_policy();
        assert_eq!(policy.grace_period, Duration::days(3));
        assert_eq!(policy.daily_rate_bps, 100);
    }

    #[test]
    fn validate_rejects_out_of_range_grace() {
        assert!(LedgerConfig::default().validate().is_ok());
        for days in [-1, LedgerConfig::MAX_GRACE_PERIOD_DAYS + 1, i64::MAX] {
            let config = LedgerConfig {
                grace_period_days: days,
                ..LedgerConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(LedgerError::InvalidRequest(_))),
                "days={days}"
            );
            // still usable without panicking
            let _ = config.interest_policy();
        }
    }

    #[test]
    fn explorer_link_joins_without_double_slash() {
        let config = LedgerConfig {
            explorer_base: "https://example.test/tx/".to_string(),
            ..LedgerConfig::default()
        };
        assert_eq!(config.explorer_link("abc"), "https://example.test/tx/abc");
    }
}
