use std::io;

use serde::Serialize;

use super::{account::Account, money, transaction::Transaction};

/// Flat CSV row; csv cannot serialize the tagged record directly.
#[derive(Serialize, Debug)]
struct StatementRow<'a> {
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'static str,
    amount: String,
    balance: String,
    counterparty: &'a str,
    note: &'a str,
}

impl<'a> From<&'a Transaction> for StatementRow<'a> {
    fn from(tx: &'a Transaction) -> Self {
        Self {
            timestamp: tx.timestamp().format("%Y-%m-%d %H:%M:%S").to_string(),
            kind: tx.kind().label(),
            amount: money::normalize(tx.amount()).to_string(),
            balance: money::normalize(tx.resulting_balance()).to_string(),
            counterparty: tx.kind().counterparty().map_or("", |no| no.as_str()),
            note: tx.note(),
        }
    }
}

/// Write the account's full history as CSV, oldest entry first. Returns the
/// number of rows written.
pub fn write_statement<W: io::Write>(writer: W, account: &Account) -> csv::Result<usize> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(writer);

    let history = account.full_history();
    if history.is_empty() {
        // serde-driven headers only appear with the first record
        wtr.write_record([
            "timestamp",
            "type",
            "amount",
            "balance",
            "counterparty",
            "note",
        ])?;
    }
    for tx in history {
        wtr.serialize(StatementRow::from(tx))?;
    }
    wtr.flush()?;
    Ok(history.len())
}
