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

//! Error types for the ledger mirror.

use crate::base::{BillId, DebtId, TxDigest, UserId};
use crate::money::Money;
use std::fmt;
use thiserror::Error;

/// Names the record a [`LedgerError::NotFound`] refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Bill(BillId),
    Debt(DebtId),
    User(String),
    UserId(UserId),
    Group(String),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Bill(id) => write!(f, "bill {id}"),
            EntityRef::Debt(id) => write!(f, "debt {id}"),
            EntityRef::User(handle) => write!(f, "user \"{handle}\""),
            EntityRef::UserId(id) => write!(f, "user #{id}"),
            EntityRef::Group(handle) => write!(f, "group {handle}"),
        }
    }
}

/// Reasons a split request is rejected before anything is persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    #[error("a bill needs at least one debtor")]
    NoParticipants,

    #[error("{count} debtors exceeds the maximum of {max}")]
    TooManyParticipants { count: usize, max: usize },

    #[error("total amount must be positive")]
    NonPositiveTotal,

    /// Custom split without one amount per debtor
    #[error("custom split requires an amount for each debtor ({provided} given for {expected})")]
    MissingCustomAmount { expected: usize, provided: usize },

    #[error("custom split has no amount for debtor #{index}")]
    CustomAmountMissing { index: usize },

    #[error("custom amount for debtor #{index} is negative")]
    NegativeCustomAmount { index: usize },

    #[error("custom amount for debtor #{index} is zero")]
    ZeroCustomAmount { index: usize },

    /// Custom amounts must add up to the total exactly
    #[error("custom amounts sum to {actual}, expected {expected}")]
    SumMismatch { expected: Money, actual: Money },

    /// Equal split would give some debtor nothing
    #[error("total {total} is too small to split between {participants} debtors")]
    ShareBelowOneUnit { total: Money, participants: usize },

    #[error("debtor {handle} is listed more than once")]
    DuplicateDebtor { handle: String },

    #[error("bill creator {handle} cannot also be a debtor")]
    CreatorIsDebtor { handle: String },

    #[error("dutch split is not supported")]
    DutchUnsupported,
}

/// Ledger processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid split: {0}")]
    InvalidSplit(#[from] SplitError),

    /// Some participants have no linked wallet; the bill exists but stays pending
    #[error("bill {bill} is blocked: no linked wallet for {}", .participants.join(", "))]
    MissingWalletLink {
        bill: BillId,
        participants: Vec<String>,
    },

    #[error("{0} not found")]
    NotFound(EntityRef),

    #[error("bill {0} is already confirmed on-chain")]
    AlreadyConfirmed(BillId),

    #[error("debt {0} is already settled")]
    AlreadySettled(DebtId),

    #[error("bill {0} is not confirmed on-chain yet")]
    NotConfirmed(BillId),

    #[error("transaction adapter failure: {0}")]
    AdapterFailure(String),

    /// External confirmation does not match local state; needs an operator
    #[error("reconciliation mismatch for {subject}: {reason}")]
    ReconciliationMismatch { subject: String, reason: String },

    #[error("transaction {0} has already been applied")]
    DuplicateTransaction(TxDigest),

    #[error("bill {0} has recorded payments and cannot be deleted")]
    BillHasPayments(BillId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount overflow")]
    AmountOverflow,
}

impl LedgerError {
    pub(crate) fn mismatch(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        LedgerError::ReconciliationMismatch {
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}
