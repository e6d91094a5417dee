use super::account::AccountNo;
use super::money;
use chrono::{Local, NaiveDateTime, Timelike};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionKind {
    /// Cash paid into the account. Increases the balance.
    Deposit,

    /// Cash taken out of the account. Decreases the balance, and is refused
    /// when the balance does not cover it.
    Withdraw,

    /// Credit side of a transfer, recorded on the receiving account.
    TransferIn { from: AccountNo },

    /// Debit side of a transfer, recorded on the sending account.
    TransferOut { to: AccountNo },
}

impl TransactionKind {
    pub fn label(&self) -> &'static str {
        use TransactionKind::*;

        match self {
            Deposit => "deposit",
            Withdraw => "withdraw",
            TransferIn { .. } => "transfer_in",
            TransferOut { .. } => "transfer_out",
        }
    }

    pub fn counterparty(&self) -> Option<&AccountNo> {
        match self {
            TransactionKind::TransferIn { from } => Some(from),
            TransactionKind::TransferOut { to } => Some(to),
            _ => None,
        }
    }

    fn default_note(&self) -> String {
        use TransactionKind::*;

        match self {
            Deposit => "Cash deposit".to_owned(),
            Withdraw => "Cash withdraw".to_owned(),
            TransferIn { from } => format!("From {from}"),
            TransferOut { to } => format!("To {to}"),
        }
    }
}

/// One entry in an account's history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Local time, whole seconds
    timestamp: NaiveDateTime,

    #[serde(flatten)]
    kind: TransactionKind,

    #[serde(with = "money::two_places")]
    amount: Decimal,

    /// Balance of the owning account right after this entry was applied
    #[serde(rename = "balance", with = "money::two_places")]
    resulting_balance: Decimal,

    note: String,
}

impl Transaction {
    pub(crate) fn record(
        kind: TransactionKind,
        amount: Decimal,
        resulting_balance: Decimal,
    ) -> Self {
        Self::record_at(now(), kind, amount, resulting_balance)
    }

    pub(crate) fn record_at(
        timestamp: NaiveDateTime,
        kind: TransactionKind,
        amount: Decimal,
        resulting_balance: Decimal,
    ) -> Self {
        let note = kind.default_note();
        Self {
            timestamp,
            kind,
            amount,
            resulting_balance,
            note,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn kind(&self) -> &TransactionKind {
        &self.kind
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn resulting_balance(&self) -> Decimal {
        self.resulting_balance
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    /// Amounts read back from disk must still be whole, positive cents.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.amount > Decimal::ZERO
            && self.resulting_balance >= Decimal::ZERO
            && money::is_whole_cents(self.amount)
            && money::is_whole_cents(self.resulting_balance)
    }
}

pub(crate) fn now() -> NaiveDateTime {
    let local = Local::now().naive_local();
    local.with_nanosecond(0).unwrap_or(local)
}
