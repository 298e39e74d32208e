//! Writes final balances as CSV.

use std::io::Write;

use anyhow::Context;
use csv::WriterBuilder;
use sarraf_core::ledger::BalanceRecord;
use sarraf_shared::Money;
use serde::Serialize;

/// One output row.
#[derive(Debug, Serialize)]
pub struct BalanceRow {
    /// Account ID.
    pub account: i64,
    /// Currency code.
    pub currency: String,
    /// Current balance.
    pub balance: Money,
    /// Sum of deposits.
    pub total_deposits: Money,
    /// Sum of withdrawals.
    pub total_withdrawals: Money,
    /// Number of successful mutations.
    pub mutations: u64,
}

impl From<&BalanceRecord> for BalanceRow {
    fn from(record: &BalanceRecord) -> Self {
        Self {
            account: record.account_id.get(),
            currency: record.currency.to_string(),
            balance: record.balance,
            total_deposits: record.total_deposits,
            total_withdrawals: record.total_withdrawals,
            mutations: record.mutation_count,
        }
    }
}

/// Column names, in output order.
pub const HEADER: [&str; 6] = [
    "account",
    "currency",
    "balance",
    "total_deposits",
    "total_withdrawals",
    "mutations",
];

/// Writes the header followed by one line per row.
///
/// The header is written even when there are no rows.
pub fn print_balances<W: Write>(
    output: W,
    rows: impl IntoIterator<Item = BalanceRow>,
) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(output);
    writer
        .write_record(HEADER)
        .context("Failed to write CSV header")?;
    for row in rows {
        writer
            .serialize(&row)
            .with_context(|| format!("Failed to write balance of account {}", row.account))?;
    }
    writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}
