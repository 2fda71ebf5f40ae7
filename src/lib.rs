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

//! # Split Ledger
//!
//! Off-chain mirror of split bills whose authoritative state lives on an
//! external chain. The crate computes shares, accrues overdue interest,
//! builds unsigned transactions and reconciles on-chain confirmations back
//! into local bill and debt records.
//!
//! ## Core Components
//!
//! - [`Reconciler`]: owns bills and debts and applies confirmations
//! - [`compute_shares`]: equal and custom split calculation
//! - [`InterestPolicy`]: grace period and simple daily interest
//! - [`TransactionBuilder`]: boundary to the chain's transaction format
//! - [`UserDirectory`]: chat identities, wallet links and groups
//! - [`LedgerError`]: error taxonomy shared by every operation
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use split_ledger::{
//!     ChatId, CreateBillRequest, DebtorRequest, LedgerConfig, Money, MoveCallBuilder,
//!     Reconciler, SplitKind, SystemClock, TracingNotifier, TxDigest, UserDirectory,
//!     WalletAddress,
//! };
//!
//! let clock = Arc::new(SystemClock);
//! let directory = Arc::new(UserDirectory::new(clock.clone()));
//! let wallet = |c: char| WalletAddress(format!("0x{}", c.to_string().repeat(64)));
//! directory.link_wallet(ChatId(1), wallet('a'), Some("alice".into())).unwrap();
//! directory.link_wallet(ChatId(2), wallet('b'), Some("bob".into())).unwrap();
//!
//! let config = LedgerConfig::default();
//! let builder = Arc::new(MoveCallBuilder::from_config(&config));
//! let reconciler = Reconciler::new(config, directory, builder, Arc::new(TracingNotifier), clock);
//!
//! let created = reconciler
//!     .create_bill(CreateBillRequest {
//!         creator: "@alice".into(),
//!         group: None,
//!         title: "Dinner".into(),
//!         description: String::new(),
//!         total: Money::new(1_000),
//!         kind: SplitKind::Equal,
//!         debtors: vec![DebtorRequest { handle: "@bob".into(), amount: None }],
//!     })
//!     .unwrap();
//!
//! let bill = created.bill.bill.id;
//! let confirmed = reconciler
//!     .confirm_bill(bill, TxDigest("tx-1".into()), None, Vec::new())
//!     .unwrap();
//! let debt = confirmed.debts[0].id;
//!
//! let outcome = reconciler
//!     .confirm_payment(debt, TxDigest("tx-2".into()), Money::new(1_000))
//!     .unwrap();
//! assert!(outcome.bill_settled);
//! ```

mod base;
pub mod bill;
pub mod builder;
mod clock;
mod config;
pub mod directory;
pub mod error;
pub mod event;
pub mod interest;
pub mod journal;
mod money;
pub mod notify;
pub mod reconciler;
pub mod split;

pub use base::{BillId, ChatId, DebtId, ObjectRef, TxDigest, UserId, WalletAddress};
pub use bill::{Bill, BillSnapshot, BillStatus, Debt, DebtStatus, PaymentOutcome};
pub use builder::{BuiltTransaction, DebtTarget, MoveCallBuilder, TransactionBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use directory::{IdentityResolver, User, UserDirectory};
pub use error::{EntityRef, LedgerError, SplitError};
pub use event::{LedgerEvent, Reconciled};
pub use interest::{AmountDue, InterestPolicy};
pub use journal::OperatorAlert;
pub use money::Money;
pub use notify::{MemoryNotifier, Notice, Notifier, TracingNotifier};
pub use reconciler::{
    AmountDueOracle, BillCreated, BillDetail, CreateBillRequest, DebtView, DebtorRequest,
    PaymentHistory, PaymentQuote, Reconciler,
};
pub use split::{Split, SplitKind, compute_shares};
