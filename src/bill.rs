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

//! Bill and debt records and their lifecycle.
//!
//! A bill and its debts form one mutation unit guarded by a single mutex, so
//! every transition below observes a consistent view of all sibling debts.
//!
//! ```text
//! Bill:  Pending ──confirm──► Confirmed ──last debt settled──► Settled
//! Debt:  Pending ──confirm──► Confirmed ──paid >= principal──► Settled
//! ```
//!
//! Transitions only move forward. A debt can settle only from `Confirmed`,
//! that is, only through a payment recorded against an on-chain object.

use crate::base::{BillId, ChatId, DebtId, ObjectRef, TxDigest, UserId};
use crate::error::LedgerError;
use crate::interest::{AmountDue, InterestPolicy};
use crate::money::Money;
use crate::split::SplitKind;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Pending,
    Confirmed,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtStatus {
    Pending,
    Confirmed,
    Settled,
}

impl fmt::Display for DebtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DebtStatus::Pending => "pending",
            DebtStatus::Confirmed => "confirmed",
            DebtStatus::Settled => "settled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bill {
    pub id: BillId,
    pub group: Option<ChatId>,
    pub creator: UserId,
    pub title: String,
    pub description: String,
    pub total: Money,
    pub kind: SplitKind,
    /// Equal-split remainder assigned to nobody.
    pub remainder: Money,
    pub status: BillStatus,
    pub object: Option<ObjectRef>,
    pub digest: Option<TxDigest>,
    pub created_at: DateTime<Utc>,
}

impl Bill {
    pub fn is_settled(&self) -> bool {
        self.status == BillStatus::Settled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Debt {
    pub id: DebtId,
    pub bill: BillId,
    pub debtor: UserId,
    /// Always the bill's creator.
    pub creditor: UserId,
    pub principal: Money,
    pub paid: Money,
    pub status: DebtStatus,
    pub object: Option<ObjectRef>,
    /// Interest clock start.
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Debt {
    pub fn is_settled(&self) -> bool {
        self.status == DebtStatus::Settled
    }

    pub fn quote(
        &self,
        policy: &InterestPolicy,
        now: DateTime<Utc>,
    ) -> Result<AmountDue, LedgerError> {
        policy.calculate_due(self.principal, self.paid, self.created_at, now)
    }
}

/// Point-in-time copy of a bill and all of its debts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillSnapshot {
    pub bill: Bill,
    pub debts: Vec<Debt>,
}

/// Effect of one confirmed payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub debt: Debt,
    pub amount: Money,
    pub debt_settled: bool,
    pub bill_settled: bool,
}

#[derive(Debug)]
pub(crate) struct BillData {
    pub(crate) bill: Bill,
    pub(crate) debts: Vec<Debt>,
    /// Set when the bill is removed so late callbacks holding the record fail.
    pub(crate) deleted: bool,
}

impl BillData {
    /// Checks that debts add up to the total before accepting a new bill.
    pub(crate) fn new(bill: Bill, debts: Vec<Debt>) -> Result<Self, LedgerError> {
        let principal_sum = Money::checked_sum(debts.iter().map(|d| d.principal))?;
        if principal_sum.checked_add(bill.remainder)? != bill.total {
            return Err(LedgerError::InvalidAmount(format!(
                "debts sum to {principal_sum} with remainder {} but bill total is {}",
                bill.remainder, bill.total
            )));
        }
        let data = Self {
            bill,
            debts,
            deleted: false,
        };
        data.assert_invariants();
        Ok(data)
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.debts.iter().all(|d| d.creditor == self.bill.creator),
            "Invariant violated: debt creditor differs from bill creator"
        );
        debug_assert!(
            self.debts.iter().all(|d| {
                d.is_settled() == (d.paid >= d.principal && d.status != DebtStatus::Pending)
            }),
            "Invariant violated: settlement flag disagrees with amount paid"
        );
        debug_assert!(
            self.bill.is_settled()
                == (!self.debts.is_empty() && self.debts.iter().all(Debt::is_settled)),
            "Invariant violated: bill settlement disagrees with its debts"
        );
        debug_assert!(
            self.bill.object.is_some() == (self.bill.status != BillStatus::Pending),
            "Invariant violated: bill status disagrees with external reference"
        );
    }

    pub(crate) fn snapshot(&self) -> BillSnapshot {
        BillSnapshot {
            bill: self.bill.clone(),
            debts: self.debts.clone(),
        }
    }

    pub(crate) fn has_payments(&self) -> bool {
        self.debts.iter().any(|d| !d.paid.is_zero())
    }

    /// Title edits are only allowed before the bill exists on-chain.
    pub(crate) fn rename(&mut self, title: String) -> Result<(), LedgerError> {
        if self.bill.object.is_some() {
            return Err(LedgerError::AlreadyConfirmed(self.bill.id));
        }
        self.bill.title = title;
        Ok(())
    }

    /// Attaches external references and moves the bill and its debts to
    /// `Confirmed`.
    ///
    /// `debt_objects` is either empty or one reference per debt in creation
    /// order. Nothing is modified on error.
    pub(crate) fn confirm(
        &mut self,
        digest: TxDigest,
        bill_object: ObjectRef,
        debt_objects: Vec<ObjectRef>,
    ) -> Result<(), LedgerError> {
        if self.bill.object.is_some() {
            return Err(LedgerError::AlreadyConfirmed(self.bill.id));
        }
        if !debt_objects.is_empty() && debt_objects.len() != self.debts.len() {
            return Err(LedgerError::mismatch(
                format!("bill {}", self.bill.id),
                format!(
                    "confirmation lists {} debt objects for {} debts",
                    debt_objects.len(),
                    self.debts.len()
                ),
            ));
        }

        let mut objects = debt_objects.into_iter();
        for debt in &mut self.debts {
            debt.status = DebtStatus::Confirmed;
            debt.object = objects.next();
        }
        self.bill.object = Some(bill_object);
        self.bill.digest = Some(digest);
        self.bill.status = BillStatus::Confirmed;
        self.assert_invariants();
        Ok(())
    }

    /// Applies a payment attested by the external ledger.
    ///
    /// The debt settles once `paid >= principal`; the bill settles in the
    /// same step when that was its last open debt. A payment larger than the
    /// current quote, against an unconfirmed or settled debt, or of zero is a
    /// reconciliation mismatch and changes nothing.
    pub(crate) fn record_payment(
        &mut self,
        debt_id: DebtId,
        amount: Money,
        policy: &InterestPolicy,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome, LedgerError> {
        let subject = format!("debt {debt_id}");
        if self.deleted {
            return Err(LedgerError::mismatch(subject, "bill was deleted"));
        }
        let index = self
            .debts
            .iter()
            .position(|d| d.id == debt_id)
            .ok_or_else(|| LedgerError::mismatch(subject.clone(), "debt not part of its bill"))?;

        let debt = &self.debts[index];
        match debt.status {
            DebtStatus::Pending => {
                return Err(LedgerError::mismatch(subject, "debt is not confirmed on-chain"));
            }
            DebtStatus::Settled => {
                return Err(LedgerError::mismatch(subject, "debt is already settled"));
            }
            DebtStatus::Confirmed => {}
        }
        if amount.is_zero() {
            return Err(LedgerError::mismatch(subject, "payment amount is zero"));
        }
        let quote = debt.quote(policy, now)?;
        if amount > quote.total {
            return Err(LedgerError::mismatch(
                subject,
                format!("payment of {amount} exceeds amount due {}", quote.total),
            ));
        }
        let paid = debt.paid.checked_add(amount)?;

        let debt = &mut self.debts[index];
        debt.paid = paid;
        let debt_settled = debt.paid >= debt.principal;
        if debt_settled {
            debt.status = DebtStatus::Settled;
            debt.settled_at = Some(now);
        }
        let debt = debt.clone();

        let bill_settled = self.debts.iter().all(Debt::is_settled);
        if bill_settled {
            self.bill.status = BillStatus::Settled;
        }
        self.assert_invariants();

        Ok(PaymentOutcome {
            debt,
            amount,
            debt_settled,
            bill_settled,
        })
    }
}

/// A bill and its debts behind one lock.
#[derive(Debug)]
pub(crate) struct BillRecord {
    inner: Mutex<BillData>,
}

impl BillRecord {
    pub(crate) fn new(data: BillData) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BillData> {
        self.inner.lock()
    }

    pub(crate) fn snapshot(&self) -> BillSnapshot {
        self.inner.lock().snapshot()
    }
}
