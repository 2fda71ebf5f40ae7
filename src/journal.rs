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

//! Applied-transaction journal and operator alert queue.
//!
//! The journal makes confirmation callbacks idempotent per transaction
//! digest: a digest is claimed before its effect is applied and released if
//! the effect is refused, so a retried or replayed callback can never be
//! counted twice.

use crate::base::{BillId, DebtId, TxDigest};
use crate::error::LedgerError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// What a journaled transaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    BillCreated { bill: BillId },
    Payment { debt: DebtId, amount: Money },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalRecord {
    pub sequence: u64,
    pub digest: TxDigest,
    pub entry: JournalEntry,
    pub applied_at: DateTime<Utc>,
}

/// Transaction digests that have been applied.
#[derive(Debug)]
pub struct TransactionJournal {
    entries: DashMap<TxDigest, JournalRecord>,
    next_sequence: AtomicU64,
}

impl TransactionJournal {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Claims `digest` for `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateTransaction`] if the digest was
    /// already claimed.
    pub fn record(
        &self,
        digest: &TxDigest,
        entry: JournalEntry,
        applied_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        match self.entries.entry(digest.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateTransaction(digest.clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(JournalRecord {
                    sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
                    digest: digest.clone(),
                    entry,
                    applied_at,
                });
                Ok(())
            }
        }
    }

    /// Releases a claim whose effect was refused.
    pub fn forget(&self, digest: &TxDigest) {
        self.entries.remove(digest);
    }

    pub fn contains(&self, digest: &TxDigest) -> bool {
        self.entries.contains_key(digest)
    }

    pub fn get(&self, digest: &TxDigest) -> Option<JournalRecord> {
        self.entries.get(digest).map(|r| r.clone())
    }

    /// Every journaled transaction in the order it was claimed.
    pub fn records(&self) -> Vec<JournalRecord> {
        let mut records: Vec<JournalRecord> = self.entries.iter().map(|r| r.clone()).collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TransactionJournal {
    fn default() -> Self {
        Self::new()
    }
}

/// A reconciliation problem an operator has to look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorAlert {
    pub subject: String,
    pub reason: String,
    pub digest: Option<TxDigest>,
    pub raised_at: DateTime<Utc>,
}

/// FIFO queue of operator alerts.
#[derive(Debug, Default)]
pub struct OperatorAlerts {
    queue: SegQueue<OperatorAlert>,
}

impl OperatorAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, alert: OperatorAlert) {
        self.queue.push(alert);
    }

    /// Removes and returns every pending alert, oldest first.
    pub fn drain(&self) -> Vec<OperatorAlert> {
        std::iter::from_fn(|| self.queue.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
