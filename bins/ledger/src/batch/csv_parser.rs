//! Parses ledger operations from CSV.
//!
//! Expected header: `op,account,currency,amount,actor,description`. Only
//! `op` and `account` are required on every row; the runner checks the rest
//! per operation.

use std::io::Read;

use csv::{DeserializeRecordsIntoIter, Trim};
use serde::Deserialize;

/// Operation named in the `op` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Register the account with the directory.
    Open,
    /// Credit a balance.
    Deposit,
    /// Debit a balance.
    Withdraw,
    /// Delete a balance record.
    Delete,
    /// Log the current balance.
    Balance,
}

/// One input row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Row {
    /// Operation to perform.
    pub op: Op,
    /// Target account.
    pub account: i64,
    /// Currency code, required for everything but `open`.
    pub currency: Option<String>,
    /// Decimal amount, required for deposits and withdrawals. Kept as text
    /// so the ledger's scale rules decide what is valid.
    pub amount: Option<String>,
    /// `account:<id>` or `employee:<id>`; defaults to the row's account.
    pub actor: Option<String>,
    /// Free text carried into the audit entry.
    pub description: Option<String>,
}

/// Iterator over `(line, row)` pairs.
pub struct CsvRowParser<R> {
    iter: DeserializeRecordsIntoIter<R, Row>,
}

impl<R: Read> CsvRowParser<R> {
    /// Creates a parser reading from `source`.
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            iter: reader.into_deserialize(),
        }
    }
}

impl<R: Read> Iterator for CsvRowParser<R> {
    type Item = (u64, Result<Row, csv::Error>);

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.iter.reader().position().line();
        self.iter.next().map(|row| (line, row))
    }
}
