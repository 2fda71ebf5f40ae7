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

//! Transaction description builder for the external ledger.
//!
//! Translates a fully-resolved bill or payment intent into an unsigned,
//! serializable move-call description plus a one-line summary for the
//! signer. Building never touches ledger state and can be repeated freely;
//! only a confirmation callback mutates the mirror.

use crate::base::{ObjectRef, WalletAddress};
use crate::error::LedgerError;
use crate::interest::AmountDue;
use crate::money::Money;
use crate::split::SplitKind;
use serde::{Deserialize, Serialize};

/// Shared clock object every time-aware entry point takes.
pub const CLOCK_OBJECT: &str = "0x6";

const ADDRESS_HEX_LEN: usize = 64;

/// Checks the `0x` + 64 hex digit address format.
pub fn validate_address(address: &str) -> Result<(), LedgerError> {
    let hex = address
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::InvalidAddress(format!("{address} lacks 0x prefix")))?;
    if hex.len() != ADDRESS_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LedgerError::InvalidAddress(format!(
            "{address} is not {ADDRESS_HEX_LEN} hex digits"
        )));
    }
    Ok(())
}

/// Inputs for creating a bill on-chain.
#[derive(Debug, Clone)]
pub struct CreateBillIntent<'a> {
    pub creator: &'a WalletAddress,
    pub title: &'a str,
    pub description: &'a str,
    pub total: Money,
    pub kind: SplitKind,
    /// Debtor addresses in debt creation order.
    pub debtors: &'a [WalletAddress],
    /// Per-debtor amounts; required for custom splits.
    pub amounts: Option<&'a [Money]>,
}

/// How a payment call addresses the debt being paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebtTarget<'a> {
    /// The debt's own object, when the confirmation reported one.
    Object(&'a ObjectRef),
    /// Position of the debt within its bill, in creation order.
    Position(u64),
}

/// Inputs for paying a debt on-chain.
#[derive(Debug, Clone)]
pub struct PaymentIntent<'a> {
    pub payer: &'a WalletAddress,
    pub creditor: &'a WalletAddress,
    pub bill_object: &'a ObjectRef,
    pub debt: DebtTarget<'a>,
    pub quote: AmountDue,
}

/// One argument of a move call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CallArg {
    Object(String),
    Bytes(Vec<u8>),
    U64(u64),
    Addresses(Vec<String>),
    U64s(Vec<u64>),
    None,
}

/// Unsigned transaction handed to the signing surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDescription {
    pub sender: String,
    pub target: String,
    pub arguments: Vec<CallArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTransaction {
    pub description: TransactionDescription,
    pub summary: String,
}

impl BuiltTransaction {
    /// Serialized form handed to the signer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        serde_json::to_vec(&self.description)
            .map_err(|e| LedgerError::AdapterFailure(format!("cannot serialize transaction: {e}")))
    }
}

/// Boundary to the external ledger's transaction format.
pub trait TransactionBuilder: Send + Sync {
    fn build_create_bill(&self, intent: &CreateBillIntent<'_>)
    -> Result<BuiltTransaction, LedgerError>;

    fn build_payment(&self, intent: &PaymentIntent<'_>) -> Result<BuiltTransaction, LedgerError>;
}

/// Builds calls against the bill-splitting move package.
#[derive(Debug, Clone)]
pub struct MoveCallBuilder {
    package_id: String,
    registry_object: String,
    coin_decimals: u32,
    coin_symbol: String,
}

impl MoveCallBuilder {
    const MODULE: &'static str = "layersplit";

    pub fn new(
        package_id: impl Into<String>,
        registry_object: impl Into<String>,
        coin_decimals: u32,
        coin_symbol: impl Into<String>,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            registry_object: registry_object.into(),
            coin_decimals,
            coin_symbol: coin_symbol.into(),
        }
    }

    pub fn from_config(config: &crate::config::LedgerConfig) -> Self {
        Self::new(
            config.package_id.clone(),
            config.registry_object.clone(),
            config.coin_decimals,
            config.coin_symbol.clone(),
        )
    }

    fn target(&self, function: &str) -> String {
        format!("{}::{}::{}", self.package_id, Self::MODULE, function)
    }

    fn coins(&self, amount: Money) -> String {
        format!("{} {}", amount.to_decimal(self.coin_decimals), self.coin_symbol)
    }
}

impl TransactionBuilder for MoveCallBuilder {
    fn build_create_bill(
        &self,
        intent: &CreateBillIntent<'_>,
    ) -> Result<BuiltTransaction, LedgerError> {
        validate_address(&intent.creator.0)?;
        if intent.debtors.is_empty() {
            return Err(LedgerError::AdapterFailure(
                "bill has no debtor addresses".to_string(),
            ));
        }
        for debtor in intent.debtors {
            validate_address(&debtor.0)?;
        }

        let mut arguments = vec![
            CallArg::Object(self.registry_object.clone()),
            CallArg::Object(CLOCK_OBJECT.to_string()),
            CallArg::Bytes(intent.title.as_bytes().to_vec()),
            CallArg::Bytes(intent.description.as_bytes().to_vec()),
            CallArg::U64(intent.total.units()),
            CallArg::Addresses(intent.debtors.iter().map(|a| a.0.clone()).collect()),
        ];

        let function = match intent.kind {
            SplitKind::Equal => "create_bill_equal_split",
            SplitKind::Custom => {
                let amounts = intent.amounts.ok_or_else(|| {
                    LedgerError::AdapterFailure("custom split without amounts".to_string())
                })?;
                if amounts.len() != intent.debtors.len() {
                    return Err(LedgerError::AdapterFailure(format!(
                        "{} amounts for {} debtors",
                        amounts.len(),
                        intent.debtors.len()
                    )));
                }
                arguments.push(CallArg::U64s(amounts.iter().map(|m| m.units()).collect()));
                "create_bill_custom_split"
            }
            SplitKind::Dutch => {
                return Err(LedgerError::AdapterFailure(
                    "dutch split has no on-chain entry point".to_string(),
                ));
            }
        };
        // receipt hash
        arguments.push(CallArg::None);

        let summary = format!(
            "Create {} bill \"{}\": {} across {} debtor(s)",
            intent.kind,
            intent.title,
            self.coins(intent.total),
            intent.debtors.len()
        );

        Ok(BuiltTransaction {
            description: TransactionDescription {
                sender: intent.creator.0.clone(),
                target: self.target(function),
                arguments,
            },
            summary,
        })
    }

    fn build_payment(&self, intent: &PaymentIntent<'_>) -> Result<BuiltTransaction, LedgerError> {
        validate_address(&intent.payer.0)?;
        validate_address(&intent.creditor.0)?;
        if intent.quote.total.is_zero() {
            return Err(LedgerError::AdapterFailure(
                "nothing due on this debt".to_string(),
            ));
        }

        let bill = CallArg::Object(intent.bill_object.0.clone());
        let (function, mut arguments) = match intent.debt {
            DebtTarget::Object(debt) => ("pay_debt", vec![CallArg::Object(debt.0.clone()), bill]),
            DebtTarget::Position(index) => ("pay_debt_at", vec![bill, CallArg::U64(index)]),
        };
        arguments.push(CallArg::Object(CLOCK_OBJECT.to_string()));
        arguments.push(CallArg::U64(intent.quote.total.units()));

        let description = TransactionDescription {
            sender: intent.payer.0.clone(),
            target: self.target(function),
            arguments,
        };
        let summary = format!(
            "Pay {} ({} principal + {} interest) to {}",
            self.coins(intent.quote.total),
            self.coins(intent.quote.principal),
            self.coins(intent.quote.interest),
            intent.creditor
        );

        Ok(BuiltTransaction {
            description,
            summary,
        })
    }
}
