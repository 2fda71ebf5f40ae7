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

//! Settlement reconciler.
//!
//! The [`Reconciler`] owns the off-chain mirror of every bill and debt and
//! drives them through their lifecycle:
//!
//! 1. [`create_bill`](Reconciler::create_bill) validates the split, persists
//!    the bill as `Pending` and returns the unsigned creation transaction.
//! 2. The external ledger confirms the transaction;
//!    [`confirm_bill`](Reconciler::confirm_bill) attaches object references.
//! 3. [`request_payment`](Reconciler::request_payment) quotes a debt and
//!    returns the unsigned payment transaction.
//! 4. [`confirm_payment`](Reconciler::confirm_payment) applies the attested
//!    amount, settling the debt and then the bill.
//!
//! # Concurrency
//!
//! Bills live in a [`DashMap`] of per-bill records, each a bill and its debts
//! behind one mutex. Every callback locks exactly one record, and no
//! collaborator is called while a record is locked, so callbacks for
//! sibling debts serialize while unrelated bills proceed in parallel.
//!
//! # Idempotency
//!
//! Confirmations are keyed by transaction digest in a
//! [`TransactionJournal`]. A replayed callback is refused with
//! [`LedgerError::DuplicateTransaction`] and never double counts.
//! Confirmations that disagree with local state are refused with
//! [`LedgerError::ReconciliationMismatch`], logged at error level and queued
//! as [`OperatorAlert`]s.

use crate::base::{BillId, ChatId, DebtId, ObjectRef, TxDigest, UserId, WalletAddress};
use crate::bill::{
    Bill, BillData, BillRecord, BillSnapshot, BillStatus, Debt, DebtStatus, PaymentOutcome,
};
use crate::builder::{
    BuiltTransaction, CreateBillIntent, DebtTarget, PaymentIntent, TransactionBuilder,
};
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::directory::{IdentityResolver, User};
use crate::error::{EntityRef, LedgerError, SplitError};
use crate::event::{LedgerEvent, Reconciled};
use crate::interest::{AmountDue, InterestPolicy};
use crate::journal::{JournalEntry, OperatorAlert, OperatorAlerts, TransactionJournal};
use crate::money::Money;
use crate::notify::{Notice, Notifier};
use crate::split::{SplitKind, compute_shares};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;
/// Entries per side returned by [`Reconciler::payment_history`].
pub const PAYMENT_HISTORY_LIMIT: usize = 50;

/// One debtor of a new bill.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DebtorRequest {
    /// Chat id or `@username`.
    pub handle: String,
    /// Smallest units; required for custom splits, ignored otherwise.
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateBillRequest {
    pub creator: String,
    #[serde(default)]
    pub group: Option<ChatId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub total: Money,
    pub kind: SplitKind,
    pub debtors: Vec<DebtorRequest>,
}

#[derive(Debug, Clone)]
pub struct BillCreated {
    pub bill: BillSnapshot,
    /// Unsigned creation transaction for the creator to sign.
    pub transaction: BuiltTransaction,
}

#[derive(Debug, Clone)]
pub struct PaymentQuote {
    pub debt: DebtId,
    pub due: AmountDue,
    pub transaction: BuiltTransaction,
}

/// A debt together with its bill's title and its current quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtView {
    pub debt: Debt,
    pub title: String,
    pub group: Option<ChatId>,
    pub due: AmountDue,
}

/// A bill with every debt quoted at the current time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillDetail {
    pub bill: Bill,
    pub debts: Vec<DebtView>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentHistory {
    pub paid: Vec<DebtView>,
    pub received: Vec<DebtView>,
}

/// Authoritative amount-due reader on the external ledger.
pub trait AmountDueOracle: Send + Sync {
    fn amount_due(&self, bill: &ObjectRef, debt: &ObjectRef) -> Result<AmountDue, LedgerError>;
}

pub struct Reconciler {
    config: LedgerConfig,
    policy: InterestPolicy,
    bills: DashMap<BillId, Arc<BillRecord>>,
    debt_index: DashMap<DebtId, BillId>,
    next_bill: AtomicU64,
    next_debt: AtomicU64,
    journal: TransactionJournal,
    alerts: OperatorAlerts,
    identity: Arc<dyn IdentityResolver>,
    builder: Arc<dyn TransactionBuilder>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    oracle: Option<Arc<dyn AmountDueOracle>>,
}

impl Reconciler {
    pub fn new(
        config: LedgerConfig,
        identity: Arc<dyn IdentityResolver>,
        builder: Arc<dyn TransactionBuilder>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy: config.interest_policy(),
            config,
            bills: DashMap::new(),
            debt_index: DashMap::new(),
            next_bill: AtomicU64::new(1),
            next_debt: AtomicU64::new(1),
            journal: TransactionJournal::new(),
            alerts: OperatorAlerts::new(),
            identity,
            builder,
            notifier,
            clock,
            oracle: None,
        }
    }

    /// Prefers `oracle` over the local interest model when quoting confirmed
    /// debts. The local model is still used when the oracle fails.
    pub fn with_amount_due_oracle(mut self, oracle: Arc<dyn AmountDueOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Validates and persists a new bill, then builds its creation
    /// transaction.
    ///
    /// Validation failures persist nothing. When any participant has not
    /// linked a wallet the bill is still persisted as `Pending` and
    /// [`LedgerError::MissingWalletLink`] names who is blocking it; once they
    /// link, [`bill_transaction`](Self::bill_transaction) builds the
    /// transaction.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidRequest`] - empty or oversized title or description,
    ///   or a creator outside the group.
    /// - [`LedgerError::NotFound`] - unknown creator, debtor or group.
    /// - [`LedgerError::InvalidSplit`] - the amounts cannot be split as asked.
    /// - [`LedgerError::MissingWalletLink`] - persisted but blocked.
    /// - [`LedgerError::AdapterFailure`] / [`LedgerError::InvalidAddress`] - the
    ///   transaction could not be built; the bill stays `Pending`.
    pub fn create_bill(&self, request: CreateBillRequest) -> Result<BillCreated, LedgerError> {
        validate_text(&request.title, &request.description)?;

        let creator = self.identity.resolve(&request.creator)?;
        if let Some(chat) = request.group {
            let group = self.identity.group(chat)?;
            if !group.is_member(creator.id) {
                return Err(LedgerError::InvalidRequest(format!(
                    "{} is not a member of {}",
                    creator.handle(),
                    group.name
                )));
            }
        }

        let mut debtors: Vec<User> = Vec::with_capacity(request.debtors.len());
        for entry in &request.debtors {
            let user = self.identity.resolve(&entry.handle)?;
            if user.id == creator.id {
                return Err(SplitError::CreatorIsDebtor {
                    handle: user.handle(),
                }
                .into());
            }
            if debtors.iter().any(|d| d.id == user.id) {
                return Err(SplitError::DuplicateDebtor {
                    handle: user.handle(),
                }
                .into());
            }
            debtors.push(user);
        }

        let custom: Option<Vec<i64>> = match request.kind {
            SplitKind::Custom => Some(custom_amounts(&request.debtors)?),
            SplitKind::Equal | SplitKind::Dutch => None,
        };
        let split = compute_shares(
            request.total,
            debtors.len(),
            request.kind,
            custom.as_deref(),
            self.config.max_participants,
        )?;

        let now = self.clock.now();
        let bill_id = BillId(self.next_bill.fetch_add(1, Ordering::Relaxed));
        let bill = Bill {
            id: bill_id,
            group: request.group,
            creator: creator.id,
            title: request.title.trim().to_string(),
            description: request.description.trim().to_string(),
            total: request.total,
            kind: request.kind,
            remainder: split.remainder,
            status: BillStatus::Pending,
            object: None,
            digest: None,
            created_at: now,
        };
        let debts = debtors
            .iter()
            .zip(&split.shares)
            .map(|(user, &principal)| Debt {
                id: DebtId(self.next_debt.fetch_add(1, Ordering::Relaxed)),
                bill: bill_id,
                debtor: user.id,
                creditor: creator.id,
                principal,
                paid: Money::ZERO,
                status: DebtStatus::Pending,
                object: None,
                created_at: now,
                settled_at: None,
            })
            .collect();
        let data = BillData::new(bill, debts)?;
        let snapshot = data.snapshot();

        self.bills.insert(bill_id, Arc::new(BillRecord::new(data)));
        for debt in &snapshot.debts {
            self.debt_index.insert(debt.id, bill_id);
        }
        info!(
            bill = %bill_id,
            kind = %request.kind,
            total = %request.total,
            debtors = snapshot.debts.len(),
            remainder = %split.remainder,
            "bill created"
        );

        let transaction =
            self.creation_transaction(&snapshot.bill, &creator, &debtors, &split.shares)?;
        Ok(BillCreated {
            bill: snapshot,
            transaction,
        })
    }

    /// Rebuilds the creation transaction of a pending bill, for example
    /// after a blocked participant linked their wallet.
    pub fn bill_transaction(&self, bill_id: BillId) -> Result<BuiltTransaction, LedgerError> {
        let snapshot = self.record(bill_id)?.snapshot();
        if snapshot.bill.status != BillStatus::Pending {
            return Err(LedgerError::AlreadyConfirmed(bill_id));
        }
        let creator = self.identity.user(snapshot.bill.creator)?;
        let debtors = snapshot
            .debts
            .iter()
            .map(|d| self.identity.user(d.debtor))
            .collect::<Result<Vec<_>, _>>()?;
        let shares: Vec<Money> = snapshot.debts.iter().map(|d| d.principal).collect();
        self.creation_transaction(&snapshot.bill, &creator, &debtors, &shares)
    }

    fn creation_transaction(
        &self,
        bill: &Bill,
        creator: &User,
        debtors: &[User],
        shares: &[Money],
    ) -> Result<BuiltTransaction, LedgerError> {
        let participants: Vec<&User> = std::iter::once(creator).chain(debtors).collect();
        let wallets = linked_wallets(bill.id, &participants)?;
        let Some((creator_wallet, debtor_wallets)) = wallets.split_first() else {
            return Err(LedgerError::AdapterFailure(format!(
                "bill {} has no participants",
                bill.id
            )));
        };

        let amounts = match bill.kind {
            SplitKind::Custom => Some(shares),
            SplitKind::Equal | SplitKind::Dutch => None,
        };
        let intent = CreateBillIntent {
            creator: creator_wallet,
            title: &bill.title,
            description: &bill.description,
            total: bill.total,
            kind: bill.kind,
            debtors: debtor_wallets,
            amounts,
        };
        let transaction = self
            .builder
            .build_create_bill(&intent)
            .inspect_err(|e| warn!(bill = %bill.id, error = %e, "cannot build bill transaction"))?;
        debug!(bill = %bill.id, summary = %transaction.summary, "bill transaction built");
        Ok(transaction)
    }

    /// Applies the external confirmation of a bill creation transaction.
    ///
    /// Without a reported bill object the digest stands in as the bill's
    /// reference. `debt_objects` are matched to debts in creation order.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AlreadyConfirmed`] - the bill already has a reference;
    ///   the first confirmation is kept.
    /// - [`LedgerError::DuplicateTransaction`] - the digest was already applied.
    /// - [`LedgerError::ReconciliationMismatch`] - unknown or deleted bill, or
    ///   the debt object count disagrees. Raises an operator alert.
    pub fn confirm_bill(
        &self,
        bill_id: BillId,
        digest: TxDigest,
        bill_object: Option<ObjectRef>,
        debt_objects: Vec<ObjectRef>,
    ) -> Result<BillSnapshot, LedgerError> {
        let subject = format!("bill {bill_id}");
        let Ok(record) = self.record(bill_id) else {
            let reason = "confirmed bill is unknown or was deleted";
            return Err(self.refuse(LedgerError::mismatch(subject, reason), &digest));
        };
        let now = self.clock.now();

        let applied = {
            let mut data = record.lock();
            if data.deleted {
                Err(LedgerError::mismatch(subject, "confirmed bill was deleted"))
            } else if data.bill.object.is_some() {
                Err(LedgerError::AlreadyConfirmed(bill_id))
            } else {
                let object = bill_object.unwrap_or_else(|| ObjectRef(digest.0.clone()));
                self.journal
                    .record(&digest, JournalEntry::BillCreated { bill: bill_id }, now)
                    .and_then(|()| {
                        data.confirm(digest.clone(), object, debt_objects)
                            .inspect_err(|_| self.journal.forget(&digest))
                    })
                    .map(|()| data.snapshot())
            }
        };

        let snapshot = match applied {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.refuse(e, &digest)),
        };
        info!(bill = %bill_id, digest = %digest, "bill confirmed");

        let notice = Notice::BillConfirmed {
            bill: bill_id,
            title: snapshot.bill.title.clone(),
            total: snapshot.bill.total,
            debtors: snapshot.debts.len(),
            digest,
        };
        self.announce(&self.bill_audience(&snapshot.bill), &notice);
        Ok(snapshot)
    }

    /// Quotes a debt and builds the payment transaction for its debtor.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AlreadySettled`] - nothing left to pay.
    /// - [`LedgerError::NotConfirmed`] - the bill is not on-chain yet.
    /// - [`LedgerError::InvalidRequest`] - `payer` is not the debtor.
    /// - [`LedgerError::MissingWalletLink`] - payer or creditor has no wallet.
    pub fn request_payment(
        &self,
        debt_id: DebtId,
        payer: &str,
    ) -> Result<PaymentQuote, LedgerError> {
        let (snapshot, debt) = self.find_debt(debt_id)?;
        if debt.is_settled() {
            return Err(LedgerError::AlreadySettled(debt_id));
        }
        let Some(bill_object) = snapshot.bill.object.as_ref() else {
            return Err(LedgerError::NotConfirmed(snapshot.bill.id));
        };
        let target = match debt.object.as_ref() {
            Some(object) => DebtTarget::Object(object),
            None => {
                let position = snapshot
                    .debts
                    .iter()
                    .position(|d| d.id == debt_id)
                    .ok_or(LedgerError::NotFound(EntityRef::Debt(debt_id)))?;
                DebtTarget::Position(position as u64)
            }
        };

        let payer = self.identity.resolve(payer)?;
        if payer.id != debt.debtor {
            return Err(LedgerError::InvalidRequest(format!(
                "{} does not owe debt {debt_id}",
                payer.handle()
            )));
        }
        let creditor = self.identity.user(debt.creditor)?;
        let wallets = linked_wallets(snapshot.bill.id, &[&payer, &creditor])?;

        let due = self.quote(&snapshot.bill, &debt)?;
        let transaction = self.builder.build_payment(&PaymentIntent {
            payer: &wallets[0],
            creditor: &wallets[1],
            bill_object,
            debt: target,
            quote: due,
        })?;
        info!(
            debt = %debt_id,
            total = %due.total,
            days_overdue = due.days_overdue,
            "payment requested"
        );
        Ok(PaymentQuote {
            debt: debt_id,
            due,
            transaction,
        })
    }

    /// Applies a payment attested by the external ledger.
    ///
    /// The amount is validated against the local interest model at
    /// confirmation time; anything above the quote is refused.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::DuplicateTransaction`] - the digest was already applied.
    /// - [`LedgerError::ReconciliationMismatch`] - unknown debt, unconfirmed
    ///   or settled debt, zero amount or overpayment. Raises an operator alert.
    pub fn confirm_payment(
        &self,
        debt_id: DebtId,
        digest: TxDigest,
        amount: Money,
    ) -> Result<PaymentOutcome, LedgerError> {
        let subject = format!("debt {debt_id}");
        let Some(bill_id) = self.debt_index.get(&debt_id).map(|r| *r) else {
            return Err(self.refuse(LedgerError::mismatch(subject, "unknown debt"), &digest));
        };
        let Ok(record) = self.record(bill_id) else {
            let error = LedgerError::mismatch(subject, "bill no longer exists");
            return Err(self.refuse(error, &digest));
        };
        let now = self.clock.now();

        let applied = {
            let mut data = record.lock();
            self.journal
                .record(&digest, JournalEntry::Payment { debt: debt_id, amount }, now)
                .and_then(|()| {
                    data.record_payment(debt_id, amount, &self.policy, now)
                        .inspect_err(|_| self.journal.forget(&digest))
                })
                .map(|outcome| (outcome, data.bill.clone()))
        };

        let (outcome, bill) = match applied {
            Ok(applied) => applied,
            Err(e) => return Err(self.refuse(e, &digest)),
        };
        info!(
            debt = %debt_id,
            digest = %digest,
            amount = %amount,
            paid = %outcome.debt.paid,
            debt_settled = outcome.debt_settled,
            bill_settled = outcome.bill_settled,
            "payment confirmed"
        );

        let mut audience = self.chats_of(&[outcome.debt.creditor, outcome.debt.debtor]);
        audience.extend(bill.group);
        let notice = Notice::PaymentRecorded {
            bill: bill.id,
            debt: debt_id,
            title: bill.title.clone(),
            amount,
            paid: outcome.debt.paid,
            principal: outcome.debt.principal,
            settled: outcome.debt_settled,
        };
        self.announce(&audience, &notice);
        if outcome.bill_settled {
            let notice = Notice::BillSettled {
                bill: bill.id,
                title: bill.title.clone(),
            };
            self.announce(&self.bill_audience(&bill), &notice);
        }
        Ok(outcome)
    }

    /// Dispatches an external confirmation.
    pub fn reconcile(&self, event: LedgerEvent) -> Result<Reconciled, LedgerError> {
        match event {
            LedgerEvent::BillConfirmed {
                bill,
                digest,
                bill_object,
                debt_objects,
            } => self
                .confirm_bill(bill, digest, bill_object, debt_objects)
                .map(Reconciled::Bill),
            LedgerEvent::PaymentConfirmed { debt, digest, amount } => self
                .confirm_payment(debt, digest, amount)
                .map(Reconciled::Payment),
        }
    }

    /// Current amount due on a debt. Never mutates state.
    pub fn amount_due(&self, debt_id: DebtId) -> Result<AmountDue, LedgerError> {
        let (snapshot, debt) = self.find_debt(debt_id)?;
        self.quote(&snapshot.bill, &debt)
    }

    fn quote(&self, bill: &Bill, debt: &Debt) -> Result<AmountDue, LedgerError> {
        if let (Some(oracle), Some(bill_object), Some(debt_object), false) =
            (&self.oracle, &bill.object, &debt.object, debt.is_settled())
        {
            match oracle.amount_due(bill_object, debt_object) {
                Ok(due) => return Ok(due),
                Err(e) => {
                    warn!(debt = %debt.id, error = %e, "oracle failed, using local quote")
                }
            }
        }
        debt.quote(&self.policy, self.clock.now())
    }

    /// Changes the title of a bill that is not on-chain yet.
    pub fn rename_bill(&self, bill_id: BillId, title: &str) -> Result<BillSnapshot, LedgerError> {
        validate_text(title, "")?;
        let record = self.record(bill_id)?;
        let mut data = record.lock();
        if data.deleted {
            return Err(LedgerError::NotFound(EntityRef::Bill(bill_id)));
        }
        data.rename(title.trim().to_string())?;
        info!(bill = %bill_id, "bill renamed");
        Ok(data.snapshot())
    }

    /// Removes a bill and its debts. Refused once any payment was recorded.
    ///
    /// Confirmations that arrive later for the removed debts are treated as
    /// mismatches.
    pub fn delete_bill(&self, bill_id: BillId) -> Result<BillSnapshot, LedgerError> {
        let record = self.record(bill_id)?;
        let snapshot = {
            let mut data = record.lock();
            if data.deleted {
                return Err(LedgerError::NotFound(EntityRef::Bill(bill_id)));
            }
            if data.has_payments() {
                return Err(LedgerError::BillHasPayments(bill_id));
            }
            data.deleted = true;
            data.snapshot()
        };
        self.bills.remove(&bill_id);
        for debt in &snapshot.debts {
            self.debt_index.remove(&debt.id);
        }
        info!(bill = %bill_id, status = ?snapshot.bill.status, "bill deleted");
        Ok(snapshot)
    }

    pub fn bill(&self, bill_id: BillId) -> Result<BillSnapshot, LedgerError> {
        Ok(self.record(bill_id)?.snapshot())
    }

    /// Bill, debts and current quotes for display.
    pub fn bill_detail(&self, bill_id: BillId) -> Result<BillDetail, LedgerError> {
        let snapshot = self.bill(bill_id)?;
        let debts = snapshot
            .debts
            .iter()
            .map(|debt| self.debt_view(&snapshot.bill, debt))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BillDetail {
            bill: snapshot.bill,
            debts,
        })
    }

    /// Every bill, oldest first.
    pub fn bills(&self) -> Vec<BillSnapshot> {
        let mut bills: Vec<BillSnapshot> = self.records().iter().map(|r| r.snapshot()).collect();
        bills.sort_by_key(|s| s.bill.id);
        bills
    }

    /// Bills created in a group chat, newest first.
    pub fn bills_in_group(&self, group: ChatId) -> Vec<BillSnapshot> {
        let mut bills: Vec<BillSnapshot> = self
            .bills()
            .into_iter()
            .filter(|s| s.bill.group == Some(group))
            .collect();
        bills.sort_by(|a, b| (b.bill.created_at, b.bill.id).cmp(&(a.bill.created_at, a.bill.id)));
        bills
    }

    /// Open debts `user` has to pay.
    pub fn debts_owed_by(&self, user: UserId) -> Result<Vec<DebtView>, LedgerError> {
        self.debt_views(|d| d.debtor == user && !d.is_settled())
    }

    /// Open debts owed to `user`.
    pub fn debts_owed_to(&self, user: UserId) -> Result<Vec<DebtView>, LedgerError> {
        self.debt_views(|d| d.creditor == user && !d.is_settled())
    }

    /// Settled debts on both sides, most recent first, capped at
    /// [`PAYMENT_HISTORY_LIMIT`] per side.
    pub fn payment_history(&self, user: UserId) -> Result<PaymentHistory, LedgerError> {
        let recent = |mut views: Vec<DebtView>| {
            views.sort_by(|a, b| b.debt.settled_at.cmp(&a.debt.settled_at));
            views.truncate(PAYMENT_HISTORY_LIMIT);
            views
        };
        Ok(PaymentHistory {
            paid: recent(self.debt_views(|d| d.debtor == user && d.is_settled())?),
            received: recent(self.debt_views(|d| d.creditor == user && d.is_settled())?),
        })
    }

    fn debt_views(&self, keep: impl Fn(&Debt) -> bool) -> Result<Vec<DebtView>, LedgerError> {
        let mut views = Vec::new();
        for snapshot in self.bills().into_iter().rev() {
            for debt in snapshot.debts.iter().filter(|d| keep(*d)) {
                views.push(self.debt_view(&snapshot.bill, debt)?);
            }
        }
        Ok(views)
    }

    fn debt_view(&self, bill: &Bill, debt: &Debt) -> Result<DebtView, LedgerError> {
        Ok(DebtView {
            due: self.quote(bill, debt)?,
            debt: debt.clone(),
            title: bill.title.clone(),
            group: bill.group,
        })
    }

    pub fn journal(&self) -> &TransactionJournal {
        &self.journal
    }

    /// Takes every pending operator alert, oldest first.
    pub fn drain_alerts(&self) -> Vec<OperatorAlert> {
        self.alerts.drain()
    }

    fn record(&self, bill_id: BillId) -> Result<Arc<BillRecord>, LedgerError> {
        self.bills
            .get(&bill_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(LedgerError::NotFound(EntityRef::Bill(bill_id)))
    }

    // Clones the handles out first so no map shard is held while a bill is locked.
    fn records(&self) -> Vec<Arc<BillRecord>> {
        self.bills.iter().map(|r| Arc::clone(r.value())).collect()
    }

    fn find_debt(&self, debt_id: DebtId) -> Result<(BillSnapshot, Debt), LedgerError> {
        let not_found = || LedgerError::NotFound(EntityRef::Debt(debt_id));
        let bill_id = self.debt_index.get(&debt_id).map(|r| *r).ok_or_else(not_found)?;
        let snapshot = self.record(bill_id).map_err(|_| not_found())?.snapshot();
        let debt = snapshot
            .debts
            .iter()
            .find(|d| d.id == debt_id)
            .cloned()
            .ok_or_else(not_found)?;
        Ok((snapshot, debt))
    }

    /// Logs a refused confirmation. Mismatches also raise an operator alert.
    fn refuse(&self, error: LedgerError, digest: &TxDigest) -> LedgerError {
        match &error {
            LedgerError::ReconciliationMismatch { subject, reason } => {
                error!(
                    subject = %subject,
                    reason = %reason,
                    digest = %digest,
                    "reconciliation mismatch"
                );
                self.alerts.push(OperatorAlert {
                    subject: subject.clone(),
                    reason: reason.clone(),
                    digest: Some(digest.clone()),
                    raised_at: self.clock.now(),
                });
            }
            LedgerError::DuplicateTransaction(_) => {
                debug!(digest = %digest, "duplicate confirmation ignored");
            }
            other => warn!(digest = %digest, error = %other, "confirmation refused"),
        }
        error
    }

    fn chats_of(&self, users: &[UserId]) -> Vec<ChatId> {
        users
            .iter()
            .filter_map(|&id| match self.identity.user(id) {
                Ok(user) => Some(user.chat_id),
                Err(e) => {
                    warn!(user = %id, error = %e, "no chat for notice recipient");
                    None
                }
            })
            .collect()
    }

    fn bill_audience(&self, bill: &Bill) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = bill.group.into_iter().collect();
        chats.extend(self.chats_of(&[bill.creator]));
        chats
    }

    fn announce(&self, recipients: &[ChatId], notice: &Notice) {
        let text = notice.render(&self.config);
        let mut sent: Vec<ChatId> = Vec::with_capacity(recipients.len());
        for &chat in recipients {
            if sent.contains(&chat) {
                continue;
            }
            sent.push(chat);
            if let Err(e) = self.notifier.notify(chat, notice, &text) {
                warn!(error = %e, "notification dropped");
            }
        }
    }
}

fn validate_text(title: &str, description: &str) -> Result<(), LedgerError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(LedgerError::InvalidRequest("title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(LedgerError::InvalidRequest(format!(
            "title is longer than {MAX_TITLE_LEN} characters"
        )));
    }
    if description.trim().chars().count() > MAX_DESCRIPTION_LEN {
        return Err(LedgerError::InvalidRequest(format!(
            "description is longer than {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

/// One amount per debtor, in request order.
fn custom_amounts(debtors: &[DebtorRequest]) -> Result<Vec<i64>, SplitError> {
    debtors
        .iter()
        .enumerate()
        .map(|(index, d)| d.amount.ok_or(SplitError::CustomAmountMissing { index }))
        .collect()
}

/// Wallets of `users` in order, or every handle that has none linked.
fn linked_wallets(bill: BillId, users: &[&User]) -> Result<Vec<WalletAddress>, LedgerError> {
    let mut wallets = Vec::with_capacity(users.len());
    let mut missing = Vec::new();
    for user in users {
        match &user.wallet {
            Some(wallet) => wallets.push(wallet.clone()),
            None => missing.push(user.handle()),
        }
    }
    if missing.is_empty() {
        Ok(wallets)
    } else {
        warn!(bill = %bill, missing = ?missing, "participants without linked wallet");
        Err(LedgerError::MissingWalletLink {
            bill,
            participants: missing,
        })
    }
}
