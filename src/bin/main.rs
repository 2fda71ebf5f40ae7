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

use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use csv::Writer;
use serde::{Deserialize, Serialize};
use split_ledger::{
    BillId, ChatId, CreateBillRequest, DebtId, DebtStatus, IdentityResolver, LedgerConfig,
    LedgerError, LedgerEvent, ManualClock, Money, MoveCallBuilder, ObjectRef, Reconciler,
    TracingNotifier, TxDigest, UserDirectory, UserId, WalletAddress,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Split Ledger - Replay a bill command log
///
/// Reads JSON-lines commands (wallet links, bills, confirmations, payments)
/// and writes the resulting debt table as CSV to stdout. Logs go to stderr
/// and are filtered with `RUST_LOG`.
#[derive(Parser, Debug)]
#[command(name = "split-ledger")]
#[command(about = "Replays bill-splitting commands and reports debts as CSV", long_about = None)]
struct Args {
    /// Path to a JSON-lines command file
    ///
    /// Example: cargo run -- commands.jsonl > debts.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Interest-free days after a debt is created
    #[arg(long, default_value_t = LedgerConfig::DEFAULT_GRACE_PERIOD_DAYS)]
    grace_days: i64,

    /// Daily interest in basis points
    #[arg(long, default_value_t = LedgerConfig::DEFAULT_DAILY_RATE_BPS)]
    daily_rate_bps: u32,

    /// Maximum debtors per bill
    #[arg(long, default_value_t = LedgerConfig::DEFAULT_MAX_PARTICIPANTS)]
    max_participants: usize,

    /// Clock value the replay starts from (RFC 3339)
    #[arg(long, default_value = "2025-01-01T00:00:00Z")]
    start: DateTime<Utc>,
}

impl Args {
    fn config(&self) -> Result<LedgerConfig, LedgerError> {
        let config = LedgerConfig {
            grace_period_days: self.grace_days,
            daily_rate_bps: self.daily_rate_bps,
            max_participants: self.max_participants,
            ..LedgerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = match args.config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error in arguments: {}", e);
            process::exit(2);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let ledger = match process_commands(BufReader::new(file), config, args.start) {
        Ok(ledger) => ledger,
        Err(e) => {
            eprintln!("Error reading commands: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_debts(&ledger.reconciler, io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// One line of the command log, tagged by `op`.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    LinkWallet {
        chat: ChatId,
        wallet: WalletAddress,
        #[serde(default)]
        username: Option<String>,
    },
    Register {
        chat: ChatId,
        #[serde(default)]
        username: Option<String>,
    },
    Group {
        chat: ChatId,
        name: String,
    },
    JoinGroup {
        group: ChatId,
        user: String,
        #[serde(default)]
        admin: bool,
    },
    CreateBill(CreateBillRequest),
    BillTransaction {
        bill: BillId,
    },
    ConfirmBill {
        bill: BillId,
        digest: TxDigest,
        #[serde(default)]
        bill_object: Option<ObjectRef>,
        #[serde(default)]
        debt_objects: Vec<ObjectRef>,
    },
    RequestPayment {
        debt: DebtId,
        payer: String,
    },
    ConfirmPayment {
        debt: DebtId,
        digest: TxDigest,
        amount: Money,
    },
    Rename {
        bill: BillId,
        title: String,
    },
    Delete {
        bill: BillId,
    },
    /// Moves the replay clock forward.
    Advance {
        #[serde(default)]
        days: i64,
        #[serde(default)]
        hours: i64,
    },
}

struct Ledger {
    directory: Arc<UserDirectory>,
    clock: Arc<ManualClock>,
    reconciler: Reconciler,
}

impl Ledger {
    fn new(config: LedgerConfig, start: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let directory = Arc::new(UserDirectory::new(clock.clone()));
        let builder = Arc::new(MoveCallBuilder::from_config(&config));
        let reconciler = Reconciler::new(
            config,
            directory.clone(),
            builder,
            Arc::new(TracingNotifier),
            clock.clone(),
        );
        Self {
            directory,
            clock,
            reconciler,
        }
    }

    fn apply(&self, command: Command) -> Result<(), LedgerError> {
        match command {
            Command::LinkWallet {
                chat,
                wallet,
                username,
            } => {
                self.directory.link_wallet(chat, wallet, username)?;
            }
            Command::Register { chat, username } => {
                self.directory.register(chat, username);
            }
            Command::Group { chat, name } => {
                self.directory.upsert_group(chat, name);
            }
            Command::JoinGroup { group, user, admin } => {
                let user = self.directory.resolve(&user)?;
                self.directory.add_member(group, user.id, admin)?;
            }
            Command::CreateBill(request) => {
                let created = self.reconciler.create_bill(request)?;
                info!(bill = %created.bill.bill.id, "{}", created.transaction.summary);
            }
            Command::BillTransaction { bill } => {
                let transaction = self.reconciler.bill_transaction(bill)?;
                info!(bill = %bill, "{}", transaction.summary);
            }
            Command::ConfirmBill {
                bill,
                digest,
                bill_object,
                debt_objects,
            } => {
                self.reconciler.reconcile(LedgerEvent::BillConfirmed {
                    bill,
                    digest,
                    bill_object,
                    debt_objects,
                })?;
            }
            Command::RequestPayment { debt, payer } => {
                let quote = self.reconciler.request_payment(debt, &payer)?;
                info!(debt = %debt, "{}", quote.transaction.summary);
            }
            Command::ConfirmPayment {
                debt,
                digest,
                amount,
            } => {
                self.reconciler.reconcile(LedgerEvent::PaymentConfirmed {
                    debt,
                    digest,
                    amount,
                })?;
            }
            Command::Rename { bill, title } => {
                self.reconciler.rename_bill(bill, &title)?;
            }
            Command::Delete { bill } => {
                self.reconciler.delete_bill(bill)?;
            }
            Command::Advance { days, hours } => {
                let by = Duration::try_days(days)
                    .zip(Duration::try_hours(hours))
                    .and_then(|(d, h)| d.checked_add(&h))
                    .ok_or_else(|| {
                        LedgerError::InvalidRequest(format!(
                            "cannot advance by {days} days and {hours} hours"
                        ))
                    })?;
                let now = self.clock.advance(by)?;
                info!(%now, "clock advanced");
            }
        }
        Ok(())
    }
}

/// Replays a JSON-lines command log.
///
/// Blank lines and lines starting with `#` are ignored. Malformed lines and
/// refused commands are logged and skipped; only read failures abort.
///
/// # Example
///
/// ```text
/// {"op":"link_wallet","chat":1,"wallet":"0xaa..aa","username":"alice"}
/// {"op":"create_bill","creator":"@alice","title":"Dinner","total":900,"kind":"EQUAL","debtors":[{"handle":"@bob"}]}
/// {"op":"confirm_bill","bill":1,"digest":"tx1"}
/// {"op":"advance","days":5}
/// {"op":"confirm_payment","debt":1,"digest":"tx2","amount":918}
/// ```
fn process_commands<R: BufRead>(
    reader: R,
    config: LedgerConfig,
    start: DateTime<Utc>,
) -> io::Result<Ledger> {
    let ledger = Ledger::new(config, start);

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let number = index + 1;
        match serde_json::from_str::<Command>(line) {
            Ok(command) => {
                if let Err(e) = ledger.apply(command) {
                    warn!(line = number, error = %e, "command refused");
                }
            }
            Err(e) => warn!(line = number, error = %e, "skipping malformed command"),
        }
    }

    let alerts = ledger.reconciler.drain_alerts();
    if !alerts.is_empty() {
        warn!(count = alerts.len(), "replay raised operator alerts");
    }
    Ok(ledger)
}

/// Row of the debt report.
#[derive(Debug, Serialize)]
struct DebtRow {
    bill: BillId,
    debt: DebtId,
    debtor: UserId,
    creditor: UserId,
    principal: Money,
    paid: Money,
    interest: Money,
    due: Money,
    status: DebtStatus,
}

/// Writes every debt with its current quote.
///
/// Columns: `bill, debt, debtor, creditor, principal, paid, interest, due, status`
fn write_debts<W: Write>(reconciler: &Reconciler, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for snapshot in reconciler.bills() {
        for debt in &snapshot.debts {
            let due = reconciler
                .amount_due(debt.id)
                .map_err(|e| csv::Error::from(io::Error::other(e.to_string())))?;
            wtr.serialize(DebtRow {
                bill: snapshot.bill.id,
                debt: debt.id,
                debtor: debt.debtor,
                creditor: debt.creditor,
                principal: debt.principal,
                paid: debt.paid,
                interest: due.interest,
                due: due.total,
                status: debt.status,
            })?;
        }
    }

    wtr.flush()?;
    Ok(())
}
