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

//! Confirmation events arriving from the external ledger.
//!
//! Callbacks are decoded into [`LedgerEvent`] and handed to
//! [`Reconciler::reconcile`](crate::Reconciler::reconcile), which dispatches
//! on the variant.
//!
//! ```json
//! {"type": "bill_confirmed", "bill": 3, "digest": "9xQ...", "bill_object": "0xab..."}
//! {"type": "payment_confirmed", "debt": 7, "digest": "4Fz...", "amount": 1020}
//! ```

use crate::base::{BillId, DebtId, ObjectRef, TxDigest};
use crate::bill::{BillSnapshot, PaymentOutcome};
use crate::money::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// The bill creation transaction landed.
    BillConfirmed {
        bill: BillId,
        digest: TxDigest,
        /// Falls back to the digest when the chain did not report an object.
        #[serde(default)]
        bill_object: Option<ObjectRef>,
        /// One per debt in creation order, or empty.
        #[serde(default)]
        debt_objects: Vec<ObjectRef>,
    },
    /// A payment transaction landed; `amount` is what the chain moved.
    PaymentConfirmed {
        debt: DebtId,
        digest: TxDigest,
        amount: Money,
    },
}

impl LedgerEvent {
    pub fn digest(&self) -> &TxDigest {
        match self {
            Self::BillConfirmed { digest, .. } => digest,
            Self::PaymentConfirmed { digest, .. } => digest,
        }
    }

    /// Short description used in logs and operator alerts.
    pub fn subject(&self) -> String {
        match self {
            Self::BillConfirmed { bill, .. } => format!("bill {bill}"),
            Self::PaymentConfirmed { debt, .. } => format!("debt {debt}"),
        }
    }
}

/// State after an event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Bill(BillSnapshot),
    Payment(PaymentOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_bill_confirmed_without_objects() {
        let json = r#"{"type":"bill_confirmed","bill":3,"digest":"abc"}"#;
        let event: LedgerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            LedgerEvent::BillConfirmed {
                bill: BillId(3),
                digest: TxDigest("abc".to_string()),
                bill_object: None,
                debt_objects: Vec::new(),
            }
        );
        assert_eq!(event.subject(), "bill 3");
    }

    #[test]
    fn decode_payment_confirmed() {
        let json = r#"{"type":"payment_confirmed","debt":7,"digest":"d1","amount":1020}"#;
        let event: LedgerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            LedgerEvent::PaymentConfirmed {
                debt: DebtId(7),
                digest: TxDigest("d1".to_string()),
                amount: Money::new(1020),
            }
        );
        assert_eq!(event.digest().0, "d1");
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let json = r#"{"type":"bill_cancelled","bill":1}"#;
        assert!(serde_json::from_str::<LedgerEvent>(json).is_err());
    }
}
