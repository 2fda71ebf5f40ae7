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

//! Concurrency tests for the reconciler, run under parking_lot's deadlock
//! detector.
//!
//! Confirmation callbacks may arrive concurrently for sibling debts of one
//! bill. These tests check that such callbacks serialize per bill, that a
//! bill settles exactly once and that readers never deadlock with writers.

use chrono::{TimeZone, Utc};
use parking_lot::deadlock;
use split_ledger::{
    BillId, BillStatus, ChatId, CreateBillRequest, DebtId, DebtStatus, DebtorRequest,
    LedgerConfig, LedgerError, ManualClock, MemoryNotifier, Money, MoveCallBuilder, Notice,
    Reconciler, SplitKind, TxDigest, UserDirectory, WalletAddress,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const DEBTORS: usize = 16;

// === Fixtures ===

struct Fixture {
    directory: Arc<UserDirectory>,
    notifier: Arc<MemoryNotifier>,
    reconciler: Arc<Reconciler>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()));
    let directory = Arc::new(UserDirectory::new(clock.clone()));
    for chat in 0..=DEBTORS as i64 {
        directory
            .link_wallet(
                ChatId(chat + 1),
                WalletAddress(format!("0x{:064x}", chat + 1)),
                Some(format!("user{chat}")),
            )
            .unwrap();
    }
    let notifier = Arc::new(MemoryNotifier::new());
    let config = LedgerConfig::default();
    let builder = Arc::new(MoveCallBuilder::from_config(&config));
    let reconciler = Arc::new(Reconciler::new(
        config,
        directory.clone(),
        builder,
        notifier.clone(),
        clock,
    ));
    Fixture {
        directory,
        notifier,
        reconciler,
    }
}

/// Creates and confirms an equal bill of `DEBTORS` debts of 1000 units each.
fn confirmed_bill(reconciler: &Reconciler, tag: &str) -> (BillId, Vec<DebtId>) {
    let request = CreateBillRequest {
        creator: "@user0".to_string(),
        group: None,
        title: format!("Bill {tag}"),
        description: String::new(),
        total: Money::new(1000 * DEBTORS as u64),
        kind: SplitKind::Equal,
        debtors: (1..=DEBTORS)
            .map(|i| DebtorRequest {
                handle: format!("@user{i}"),
                amount: None,
            })
            .collect(),
    };
    let created = reconciler.create_bill(request).unwrap();
    let bill = created.bill.bill.id;
    let snapshot = reconciler
        .confirm_bill(bill, TxDigest(format!("create-{tag}")), None, Vec::new())
        .unwrap();
    (bill, snapshot.debts.iter().map(|d| d.id).collect())
}

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

// === Tests ===

/// Every sibling debt is paid from its own thread; the bill settles once.
#[test]
fn sibling_payments_settle_bill_exactly_once() {
    let detector = start_deadlock_detector();
    let f = fixture();
    let (bill, debts) = confirmed_bill(&f.reconciler, "siblings");
    let barrier = Arc::new(Barrier::new(debts.len()));

    let handles: Vec<_> = debts
        .iter()
        .map(|&debt| {
            let reconciler = Arc::clone(&f.reconciler);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reconciler
                    .confirm_payment(debt, TxDigest(format!("pay-{debt}")), Money::new(1000))
                    .unwrap()
                    .bill_settled
            })
        })
        .collect();
    let settled_by: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|settled| *settled)
        .count();

    assert_eq!(settled_by, 1);
    let snapshot = f.reconciler.bill(bill).unwrap();
    assert_eq!(snapshot.bill.status, BillStatus::Settled);
    assert!(snapshot.debts.iter().all(|d| d.status == DebtStatus::Settled));
    let settled_notices = f
        .notifier
        .sent()
        .into_iter()
        .filter(|(_, n)| matches!(n, Notice::BillSettled { .. }))
        .count();
    assert_eq!(settled_notices, 1);

    stop_deadlock_detector(detector);
}

/// The same callback delivered by many threads is applied once.
#[test]
fn concurrent_replays_apply_once() {
    let detector = start_deadlock_detector();
    let f = fixture();
    let (bill, debts) = confirmed_bill(&f.reconciler, "replay");
    let applied = Arc::new(AtomicUsize::new(0));
    let duplicates = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let reconciler = Arc::clone(&f.reconciler);
            let applied = Arc::clone(&applied);
            let duplicates = Arc::clone(&duplicates);
            let debt = debts[0];
            thread::spawn(move || {
                let digest = TxDigest("same".to_string());
                match reconciler.confirm_payment(debt, digest, Money::new(250)) {
                    Ok(_) => applied.fetch_add(1, Ordering::SeqCst),
                    Err(LedgerError::DuplicateTransaction(_)) => {
                        duplicates.fetch_add(1, Ordering::SeqCst)
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                };
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(applied.load(Ordering::SeqCst), 1);
    assert_eq!(duplicates.load(Ordering::SeqCst), 31);
    assert_eq!(f.reconciler.bill(bill).unwrap().debts[0].paid, Money::new(250));

    stop_deadlock_detector(detector);
}

/// Readers iterate bills and debts while writers create and settle them.
#[test]
fn queries_during_mutation() {
    let detector = start_deadlock_detector();
    let f = fixture();
    let running = Arc::new(AtomicBool::new(true));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let reconciler = Arc::clone(&f.reconciler);
            let directory = Arc::clone(&f.directory);
            let running = Arc::clone(&running);
            thread::spawn(move || {
                let creditor = directory.register(ChatId(1), None).id;
                let mut reads = 0usize;
                while running.load(Ordering::SeqCst) {
                    let bills = reconciler.bills();
                    for snapshot in &bills {
                        let open = snapshot.debts.iter().filter(|d| !d.is_settled()).count();
                        assert_eq!(snapshot.bill.is_settled(), open == 0);
                    }
                    reconciler.debts_owed_to(creditor).unwrap();
                    reconciler.payment_history(creditor).unwrap();
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let reconciler = Arc::clone(&f.reconciler);
            thread::spawn(move || {
                for round in 0..5 {
                    let (_, debts) = confirmed_bill(&reconciler, &format!("{w}-{round}"));
                    for debt in debts {
                        let digest = TxDigest(format!("pay-{w}-{round}-{debt}"));
                        reconciler
                            .confirm_payment(debt, digest, Money::new(1000))
                            .unwrap();
                    }
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    running.store(false, Ordering::SeqCst);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }

    let bills = f.reconciler.bills();
    assert_eq!(bills.len(), 20);
    assert!(bills.iter().all(|s| s.bill.status == BillStatus::Settled));

    stop_deadlock_detector(detector);
}

/// Deletion racing with a payment: exactly one of them wins.
#[test]
fn delete_races_with_payment() {
    let detector = start_deadlock_detector();

    for round in 0..50 {
        let f = fixture();
        let (bill, debts) = confirmed_bill(&f.reconciler, &round.to_string());
        let barrier = Arc::new(Barrier::new(2));

        let payer = {
            let reconciler = Arc::clone(&f.reconciler);
            let barrier = Arc::clone(&barrier);
            let debt = debts[0];
            thread::spawn(move || {
                barrier.wait();
                reconciler.confirm_payment(debt, TxDigest("race".to_string()), Money::new(10))
            })
        };
        let deleter = {
            let reconciler = Arc::clone(&f.reconciler);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reconciler.delete_bill(bill)
            })
        };

        let paid = payer.join().unwrap();
        let deleted = deleter.join().unwrap();
        match (paid, deleted) {
            (Ok(_), Err(LedgerError::BillHasPayments(_))) => {
                assert_eq!(f.reconciler.bill(bill).unwrap().debts[0].paid, Money::new(10));
            }
            (Err(LedgerError::ReconciliationMismatch { .. }), Ok(_)) => {
                assert!(f.reconciler.bill(bill).is_err());
                assert_eq!(f.reconciler.drain_alerts().len(), 1);
            }
            other => panic!("inconsistent race outcome: {other:?}"),
        }
    }

    stop_deadlock_detector(detector);
}
