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

//! Benchmarks for the split calculator, interest model and reconciler.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Share computation for equal and custom splits
//! - Amount-due quotes
//! - Bill creation and confirmation
//! - Concurrent payment confirmation across many bills

use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use split_ledger::{
    BillId, ChatId, CreateBillRequest, DebtId, DebtorRequest, InterestPolicy, LedgerConfig,
    ManualClock, MemoryNotifier, Money, MoveCallBuilder, Reconciler, SplitKind, TxDigest,
    UserDirectory, WalletAddress, compute_shares,
};
use std::sync::Arc;

const DEBTORS: usize = 10;

// =============================================================================
// Helper Functions
// =============================================================================

fn reconciler() -> Reconciler {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
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
    let config = LedgerConfig::default();
    let builder = Arc::new(MoveCallBuilder::from_config(&config));
    Reconciler::new(
        config,
        directory,
        builder,
        Arc::new(MemoryNotifier::new()),
        clock,
    )
}

fn make_request() -> CreateBillRequest {
    CreateBillRequest {
        creator: "@user0".to_string(),
        group: None,
        title: "Dinner".to_string(),
        description: String::new(),
        total: Money::new(1_000 * DEBTORS as u64),
        kind: SplitKind::Equal,
        debtors: (1..=DEBTORS)
            .map(|i| DebtorRequest {
                handle: format!("@user{i}"),
                amount: None,
            })
            .collect(),
    }
}

fn make_confirmed_bill(reconciler: &Reconciler, tag: usize) -> (BillId, Vec<DebtId>) {
    let created = reconciler.create_bill(make_request()).unwrap();
    let bill = created.bill.bill.id;
    let snapshot = reconciler
        .confirm_bill(bill, TxDigest(format!("create-{tag}")), None, Vec::new())
        .unwrap();
    (bill, snapshot.debts.iter().map(|d| d.id).collect())
}

// =============================================================================
// Pure Calculations
// =============================================================================

fn bench_compute_shares(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_shares");
    let custom: Vec<i64> = vec![1_000; 20];

    group.bench_function("equal_20", |b| {
        b.iter(|| {
            compute_shares(black_box(Money::new(20_001)), 20, SplitKind::Equal, None, 20).unwrap()
        })
    });
    group.bench_function("custom_20", |b| {
        b.iter(|| {
            compute_shares(black_box(Money::new(20_000)), 20, SplitKind::Custom, Some(&custom), 20)
                .unwrap()
        })
    });
    group.finish();
}

fn bench_calculate_due(c: &mut Criterion) {
    let policy = InterestPolicy::default();
    let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let now = created + Duration::days(30);

    c.bench_function("calculate_due", |b| {
        b.iter(|| {
            policy
                .calculate_due(black_box(Money::new(1_000_000)), Money::new(250_000), created, now)
                .unwrap()
        })
    });
}

// =============================================================================
// Reconciler Benchmarks
// =============================================================================

fn bench_create_and_confirm(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_and_confirm");

    for count in [10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let reconciler = reconciler();
                for i in 0..count {
                    make_confirmed_bill(&reconciler, i);
                }
                black_box(&reconciler);
            })
        });
    }
    group.finish();
}

fn bench_settle_sequential(c: &mut Criterion) {
    c.bench_function("settle_bill_sequential", |b| {
        b.iter(|| {
            let reconciler = reconciler();
            let (bill, debts) = make_confirmed_bill(&reconciler, 0);
            for debt in debts {
                reconciler
                    .confirm_payment(debt, TxDigest(format!("pay-{debt}")), Money::new(1_000))
                    .unwrap();
            }
            black_box(reconciler.bill(bill).unwrap());
        })
    });
}

// =============================================================================
// Concurrent Benchmarks
// =============================================================================

fn bench_concurrent_payments(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_payments");

    for bills in [10, 100].iter() {
        group.throughput(Throughput::Elements((*bills * DEBTORS) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(bills), bills, |b, &bills| {
            b.iter_batched(
                || {
                    let reconciler = reconciler();
                    let debts: Vec<DebtId> = (0..bills)
                        .flat_map(|i| make_confirmed_bill(&reconciler, i).1)
                        .collect();
                    (reconciler, debts)
                },
                |(reconciler, debts)| {
                    debts.into_par_iter().for_each(|debt| {
                        let digest = TxDigest(format!("pay-{debt}"));
                        reconciler
                            .confirm_payment(debt, digest, Money::new(1_000))
                            .unwrap();
                    });
                    black_box(&reconciler);
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_compute_shares,
    bench_calculate_due,
    bench_create_and_confirm,
    bench_settle_sequential,
    bench_concurrent_payments,
);
criterion_main!(benches);
