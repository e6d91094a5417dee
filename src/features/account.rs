use super::money;
use super::transaction::{Transaction, TransactionKind};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

/// Account number as shown to the customer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, PartialOrd, Eq, Ord, Hash)]
#[serde(transparent)]
pub struct AccountNo(String);

impl AccountNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountNo {
    fn from(raw: &str) -> Self {
        Self(raw.trim().to_owned())
    }
}

impl From<u32> for AccountNo {
    fn from(raw: u32) -> Self {
        Self(raw.to_string())
    }
}

impl Borrow<str> for AccountNo {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AccountError {
    #[error("Invalid amount {0}: must be positive and in whole cents")]
    InvalidAmount(Decimal),

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Cannot transfer to the same account ({0})")]
    SameAccount(AccountNo),

    #[error("Crediting {amount} would overflow the balance of account {account_no}")]
    BalanceOverflow {
        account_no: AccountNo,
        amount: Decimal,
    },
}

type AccountResult<T> = Result<T, AccountError>;

/// Customer account: balance plus the append-only log that explains it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Account {
    account_no: AccountNo,

    name: String,

    /// Compared verbatim at login
    secret: String,

    /// Never negative, always two decimals
    #[serde(with = "money::two_places")]
    balance: Decimal,

    /// Chronological; only ever appended to
    #[serde(default)]
    history: Vec<Transaction>,
}

impl Account {
    pub(crate) fn new(account_no: AccountNo, name: &str, secret: &str) -> Self {
        Self::with_balance(account_no, name, secret, dec!(0))
    }

    pub(crate) fn with_balance(
        account_no: AccountNo,
        name: &str,
        secret: &str,
        balance: Decimal,
    ) -> Self {
        Self {
            account_no,
            name: name.to_owned(),
            secret: secret.to_owned(),
            balance: money::normalize(balance),
            history: Vec::new(),
        }
    }

    pub fn account_no(&self) -> &AccountNo {
        &self.account_no
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn secret_matches(&self, secret: &str) -> bool {
        self.secret == secret
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// The most recent `limit` entries, oldest first.
    pub fn history(&self, limit: usize) -> &[Transaction] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn full_history(&self) -> &[Transaction] {
        &self.history
    }

    pub(crate) fn deposit(&mut self, amount: Decimal) -> AccountResult<Transaction> {
        check_amount(amount)?;
        let amount = money::normalize(amount);

        self.balance = self.credited(amount)?;
        Ok(self.append(TransactionKind::Deposit, amount))
    }

    pub(crate) fn withdraw(&mut self, amount: Decimal) -> AccountResult<Transaction> {
        check_amount(amount)?;
        self.check_covers(amount)?;
        let amount = money::normalize(amount);

        self.balance = money::normalize(self.balance - amount);
        Ok(self.append(TransactionKind::Withdraw, amount))
    }

    /// Every reason a transfer to `target` could be refused. Nothing is
    /// touched until this passes.
    pub(crate) fn validate_transfer(&self, target: &str, amount: Decimal) -> AccountResult<()> {
        check_amount(amount)?;
        if self.account_no.as_str() == target {
            return Err(AccountError::SameAccount(self.account_no.clone()));
        }
        self.check_covers(amount)
    }

    pub(crate) fn transfer(
        &mut self,
        target: &mut Account,
        amount: Decimal,
    ) -> AccountResult<Transaction> {
        self.validate_transfer(target.account_no.as_str(), amount)?;
        let amount = money::normalize(amount);
        let target_balance = target.credited(amount)?;

        self.balance = money::normalize(self.balance - amount);
        target.balance = target_balance;

        let timestamp = super::transaction::now();
        target.history.push(Transaction::record_at(
            timestamp,
            TransactionKind::TransferIn {
                from: self.account_no.clone(),
            },
            amount,
            target.balance,
        ));
        let outgoing = Transaction::record_at(
            timestamp,
            TransactionKind::TransferOut {
                to: target.account_no.clone(),
            },
            amount,
            self.balance,
        );
        self.history.push(outgoing.clone());
        Ok(outgoing)
    }

    /// Checks done on accounts read back from disk.
    pub(crate) fn is_consistent(&self) -> bool {
        self.balance >= dec!(0)
            && money::is_whole_cents(self.balance)
            && self.history.iter().all(Transaction::is_well_formed)
    }

    fn check_covers(&self, amount: Decimal) -> AccountResult<()> {
        if amount > self.balance {
            return Err(AccountError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            });
        }
        Ok(())
    }

    /// Balance after adding `amount`, or an error if it does not fit.
    fn credited(&self, amount: Decimal) -> AccountResult<Decimal> {
        self.balance
            .checked_add(amount)
            .map(money::normalize)
            .ok_or_else(|| AccountError::BalanceOverflow {
                account_no: self.account_no.clone(),
                amount,
            })
    }

    fn append(&mut self, kind: TransactionKind, amount: Decimal) -> Transaction {
        let tx = Transaction::record(kind, amount, self.balance);
        self.history.push(tx.clone());
        tx
    }
}

fn check_amount(amount: Decimal) -> AccountResult<()> {
    if amount <= dec!(0) || !money::is_whole_cents(amount) {
        return Err(AccountError::InvalidAmount(amount));
    }
    Ok(())
}
