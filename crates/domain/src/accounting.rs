//! Netting rules that turn a transaction into per-address payment amounts.
//!
//! Everything here is pure: the same transaction and address always produce
//! the same amount, which is what lets the persister treat an existing
//! payment row as the final answer.

use rust_decimal::Decimal;

use crate::model::{AddressId, Transaction, TxId};

/// Credit and debit of one address within one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressLegs {
    /// Sum of outputs paying the address.
    pub credit: Decimal,
    /// Sum of inputs spending outputs previously owned by the address.
    pub debit: Decimal,
}

impl AddressLegs {
    pub fn is_uninvolved(&self) -> bool {
        self.credit.is_zero() && self.debit.is_zero()
    }

    pub fn net(&self) -> Decimal {
        (self.credit - self.debit).normalize()
    }
}

pub fn address_legs(transaction: &Transaction, address: &AddressId) -> AddressLegs {
    let credit = transaction
        .outputs
        .iter()
        .filter(|output| output.owner.as_ref() == Some(address))
        .map(|output| output.value)
        .sum();
    let debit = transaction
        .inputs
        .iter()
        .filter(|input| input.owner.as_ref() == Some(address))
        .map(|input| input.value)
        .sum();
    AddressLegs { credit, debit }
}

/// Signed net amount of `transaction` for `address`, or `None` when the
/// address neither pays nor receives anything in it.
pub fn compute_payment(transaction: &Transaction, address: &AddressId) -> Option<Decimal> {
    let legs = address_legs(transaction, address);
    if legs.is_uninvolved() {
        None
    } else {
        Some(legs.net())
    }
}

/// Human-readable description stored alongside a payment.
pub fn describe_payment(txid: &TxId, amount: Decimal) -> String {
    if amount.is_zero() {
        format!("net zero in {txid}")
    } else if amount.is_sign_negative() {
        format!("sent {} in {txid}", amount.abs())
    } else {
        format!("received {amount} in {txid}")
    }
}
