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

//! Outbound notices to chat.
//!
//! Notices are sent after the state change they describe has been
//! committed. Delivery is best-effort: a failed send is logged and never
//! affects the ledger.

use crate::base::{BillId, ChatId, DebtId, TxDigest};
use crate::config::LedgerConfig;
use crate::money::Money;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    BillConfirmed {
        bill: BillId,
        title: String,
        total: Money,
        debtors: usize,
        digest: TxDigest,
    },
    PaymentRecorded {
        bill: BillId,
        debt: DebtId,
        title: String,
        amount: Money,
        paid: Money,
        principal: Money,
        settled: bool,
    },
    BillSettled {
        bill: BillId,
        title: String,
    },
}

impl Notice {
    /// Plain-text rendering for chat.
    pub fn render(&self, config: &LedgerConfig) -> String {
        let coins = |m: &Money| {
            format!(
                "{} {}",
                m.to_decimal(config.coin_decimals).normalize(),
                config.coin_symbol
            )
        };
        match self {
            Notice::BillConfirmed {
                title,
                total,
                debtors,
                digest,
                ..
            } => format!(
                "Bill signed on-chain!\n\n{title}\nAmount: {}\nDebtors: {debtors}\n\n{}\nTx: {}...",
                coins(total),
                config.explorer_link(&digest.0),
                digest.short()
            ),
            Notice::PaymentRecorded {
                title,
                amount,
                paid,
                principal,
                settled,
                ..
            } => {
                let status = if *settled { "Debt fully settled!" } else { "Payment recorded" };
                format!(
                    "{status}\n\n{title}\nPaid now: {}\nPaid so far: {} of {}",
                    coins(amount),
                    coins(paid),
                    coins(principal)
                )
            }
            Notice::BillSettled { title, .. } => {
                format!("All debts for \"{title}\" are settled.")
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification to {recipient} failed: {reason}")]
pub struct NotifyError {
    pub recipient: ChatId,
    pub reason: String,
}

/// Messaging collaborator.
pub trait Notifier: Send + Sync {
    fn notify(&self, recipient: ChatId, notice: &Notice, text: &str) -> Result<(), NotifyError>;
}

/// Writes notices to the log instead of a chat.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, recipient: ChatId, _notice: &Notice, text: &str) -> Result<(), NotifyError> {
        info!(recipient = %recipient, "{}", text.replace('\n', " | "));
        Ok(())
    }
}

/// Keeps every notice in memory; handy for inspecting what was sent.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<(ChatId, Notice)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(ChatId, Notice)> {
        self.sent.lock().clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, recipient: ChatId, notice: &Notice, _text: &str) -> Result<(), NotifyError> {
        self.sent.lock().push((recipient, notice.clone()));
        Ok(())
    }
}
