use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{AddressFormatError, AddressId, TxId, TxIdFormatError};

/// A value moved by a transaction leg. `owner` is `None` when the ledger does
/// not attribute the value to a standard address (e.g. non-standard scripts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub value: Decimal,
    pub owner: Option<AddressId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Decimal,
    pub owner: Option<AddressId>,
}

/// A validated ledger transaction. Inputs carry the value and owner of the
/// prior output they spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: TxId,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Validated transactions keep both totals within `Decimal` range, so the
    /// sums below and every per-address subset of them cannot overflow.
    pub fn total_in(&self) -> Decimal {
        self.inputs.iter().map(|input| input.value).sum()
    }

    pub fn total_out(&self) -> Decimal {
        self.outputs.iter().map(|output| output.value).sum()
    }

    /// Miner fee. Never attributed to any address.
    pub fn fee(&self) -> Decimal {
        self.total_in() - self.total_out()
    }

    /// Returns `true` if any leg is owned by `address`.
    pub fn touches(&self, address: &AddressId) -> bool {
        self.inputs
            .iter()
            .any(|input| input.owner.as_ref() == Some(address))
            || self
                .outputs
                .iter()
                .any(|output| output.owner.as_ref() == Some(address))
    }
}

/// Unvalidated leg as handed over by a ledger source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLeg {
    pub value: Decimal,
    pub owner_address: Option<String>,
}

/// Unvalidated transaction as handed over by a ledger source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub identifier: String,
    pub inputs: Vec<RawLeg>,
    pub outputs: Vec<RawLeg>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionFormatError {
    #[error("invalid transaction id `{identifier}`: {source}")]
    InvalidId {
        identifier: String,
        #[source]
        source: TxIdFormatError,
    },
    #[error("transaction {txid} has no outputs")]
    NoOutputs { txid: String },
    #[error("transaction {txid} has a negative value at {leg} {index}")]
    NegativeValue {
        txid: String,
        leg: &'static str,
        index: usize,
    },
    #[error("transaction {txid} has an invalid owner address at {leg} {index}: {source}")]
    InvalidOwner {
        txid: String,
        leg: &'static str,
        index: usize,
        #[source]
        source: AddressFormatError,
    },
    #[error("transaction {txid} {leg} values overflow when summed")]
    ValueOverflow { txid: String, leg: &'static str },
}

impl TryFrom<RawTransaction> for Transaction {
    type Error = TransactionFormatError;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        let txid =
            TxId::parse(&raw.identifier).map_err(|source| TransactionFormatError::InvalidId {
                identifier: raw.identifier.clone(),
                source,
            })?;

        if raw.outputs.is_empty() {
            return Err(TransactionFormatError::NoOutputs {
                txid: txid.into_inner(),
            });
        }

        let inputs = raw
            .inputs
            .into_iter()
            .enumerate()
            .map(|(index, leg)| {
                let (value, owner) = validate_leg(&txid, "input", index, leg)?;
                Ok(TxInput { value, owner })
            })
            .collect::<Result<Vec<_>, TransactionFormatError>>()?;

        let outputs = raw
            .outputs
            .into_iter()
            .enumerate()
            .map(|(index, leg)| {
                let (value, owner) = validate_leg(&txid, "output", index, leg)?;
                Ok(TxOutput { value, owner })
            })
            .collect::<Result<Vec<_>, TransactionFormatError>>()?;

        // fee and payment netting add these up later
        ensure_summable(&txid, "input", inputs.iter().map(|input| input.value))?;
        ensure_summable(&txid, "output", outputs.iter().map(|output| output.value))?;

        Ok(Transaction {
            txid,
            inputs,
            outputs,
        })
    }
}

fn validate_leg(
    txid: &TxId,
    leg: &'static str,
    index: usize,
    raw: RawLeg,
) -> Result<(Decimal, Option<AddressId>), TransactionFormatError> {
    if raw.value.is_sign_negative() && !raw.value.is_zero() {
        return Err(TransactionFormatError::NegativeValue {
            txid: txid.as_str().to_owned(),
            leg,
            index,
        });
    }

    let owner = raw
        .owner_address
        .as_deref()
        .map(AddressId::parse)
        .transpose()
        .map_err(|source| TransactionFormatError::InvalidOwner {
            txid: txid.as_str().to_owned(),
            leg,
            index,
            source,
        })?;

    Ok((raw.value.normalize(), owner))
}

fn ensure_summable(
    txid: &TxId,
    leg: &'static str,
    mut values: impl Iterator<Item = Decimal>,
) -> Result<(), TransactionFormatError> {
    values
        .try_fold(Decimal::ZERO, |total, value| total.checked_add(value))
        .map(|_| ())
        .ok_or_else(|| TransactionFormatError::ValueOverflow {
            txid: txid.as_str().to_owned(),
            leg,
        })
}

/// A transaction as persisted by the transaction store. `seq` reflects
/// insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub seq: i64,
    pub transaction: Transaction,
    pub imported_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn txid(&self) -> &TxId {
        &self.transaction.txid
    }
}
