//! Replays a CSV of ledger operations through [`LedgerService`].
//!
//! Rows the ledger rejects are logged with their line number and the run
//! continues; a row that cannot be parsed at all aborts the run.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::Arc;

use anyhow::Context;
use sarraf_core::ledger::{
    AccountDirectory, AuditSink, BalanceKey, BalanceStore, InMemoryAccountDirectory,
    InMemoryTransactionHistory, LedgerError, LedgerService, MutationInput, StaticCurrencyCatalog,
    TransactionHistory,
};
use sarraf_shared::{AccountId, Actor, CurrencyCode, Money, MoneyError};
use thiserror::Error;
use tracing::{info, warn};

use csv_parser::{CsvRowParser, Op, Row};
use csv_printer::{BalanceRow, print_balances};

pub mod csv_parser;
pub mod csv_printer;

/// Why a single row was not applied.
#[derive(Debug, Error)]
pub enum RowError {
    /// The row is missing a column its operation needs, or a value is malformed.
    #[error("invalid row: {0}")]
    Invalid(String),

    /// The ledger refused the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Rows applied successfully.
    pub applied: usize,
    /// Rows rejected and skipped.
    pub rejected: usize,
}

/// Batch runner owning a ledger service and its in-memory collaborators.
pub struct Batch {
    service: LedgerService,
    accounts: Arc<InMemoryAccountDirectory>,
    history: Arc<InMemoryTransactionHistory>,
    seen: BTreeSet<AccountId>,
}

impl Batch {
    /// Creates a runner over `store` with the given active currencies.
    pub fn new(
        store: Arc<dyn BalanceStore>,
        currencies: impl IntoIterator<Item = CurrencyCode>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let accounts = Arc::new(InMemoryAccountDirectory::default());
        let history = Arc::new(InMemoryTransactionHistory::new());
        let service = LedgerService::new(
            store,
            Arc::new(StaticCurrencyCatalog::new(currencies)),
            Arc::clone(&accounts) as Arc<dyn AccountDirectory>,
            Arc::clone(&history) as Arc<dyn TransactionHistory>,
            audit,
        );
        Self {
            service,
            accounts,
            history,
            seen: BTreeSet::new(),
        }
    }

    /// Applies every row of `input`, then writes the final balances of every
    /// account mentioned to `output`.
    pub async fn run<R: Read, W: Write>(&mut self, input: R, output: W) -> anyhow::Result<Summary> {
        let mut summary = Summary::default();

        for (line, row) in CsvRowParser::new(input) {
            let row = row.with_context(|| format!("Malformed CSV at line {line}"))?;
            match self.apply(row).await {
                Ok(()) => summary.applied += 1,
                Err(err) => {
                    warn!(line, error = %err, "row rejected");
                    summary.rejected += 1;
                }
            }
        }

        let mut rows = Vec::new();
        for account in &self.seen {
            let balances = self
                .service
                .list_balances_for_account(*account)
                .await
                .with_context(|| format!("Failed to list balances of account {account}"))?;
            rows.extend(balances.iter().map(BalanceRow::from));
        }
        print_balances(output, rows)?;

        Ok(summary)
    }

    async fn apply(&mut self, row: Row) -> Result<(), RowError> {
        let account = AccountId::new(row.account);
        self.seen.insert(account);

        match row.op {
            Op::Open => {
                self.accounts.register(account);
                info!(%account, "account opened");
            }
            Op::Deposit | Op::Withdraw => {
                let (key, actor) = target(&row, account)?;
                let amount: Money = required(row.amount.as_deref(), "amount")?
                    .parse()
                    .map_err(LedgerError::from)?;
                let mut input = MutationInput::new(account, key.currency, amount, actor);
                if let Some(description) = row.description {
                    input = input.with_description(description);
                }
                if row.op == Op::Deposit {
                    self.service.deposit(input).await?;
                } else {
                    self.service.withdraw(input).await?;
                }
                self.history.record(key);
            }
            Op::Delete => {
                let (key, actor) = target(&row, account)?;
                self.service.delete_balance(key, actor).await?;
            }
            Op::Balance => {
                let (key, _) = target(&row, account)?;
                let record = self.service.get_balance(key).await?;
                info!(
                    %key,
                    balance = %record.balance,
                    mutations = record.mutation_count,
                    "balance"
                );
            }
        }
        Ok(())
    }
}

/// Resolves the balance key and actor a row refers to.
fn target(row: &Row, account: AccountId) -> Result<(BalanceKey, Actor), RowError> {
    let currency: CurrencyCode = required(row.currency.as_deref(), "currency")?
        .parse()
        .map_err(|err: MoneyError| RowError::Invalid(err.to_string()))?;
    let actor = match row.actor.as_deref() {
        Some(actor) if !actor.is_empty() => actor.parse::<Actor>().map_err(RowError::Invalid)?,
        _ => Actor::Account(account),
    };
    Ok((BalanceKey::new(account, currency), actor))
}

fn required<'a>(value: Option<&'a str>, column: &str) -> Result<&'a str, RowError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RowError::Invalid(format!("missing {column}")))
}
