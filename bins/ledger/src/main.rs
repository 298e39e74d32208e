//! Sarraf batch ledger
//!
//! Replays a CSV of ledger operations and prints the resulting balances.
//!
//! Usage:
//!   sarraf-ledger <operations.csv>
//!
//! Balances live in memory unless a `[database]` section (or
//! `SARRAF__DATABASE__URL`) is configured, in which case they are kept in
//! Postgres.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::Context;
use sarraf_core::ledger::{BalanceStore, MemoryBalanceStore, TracingAuditSink};
use sarraf_db::{PgBalanceStore, connect_with};
use sarraf_shared::config::LogConfig;
use sarraf_shared::{AppConfig, CurrencyCode};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod batch;

use batch::Batch;

fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries the CSV report
    if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.log);

    let filename = std::env::args()
        .nth(1)
        .context("Expected a file name as the first argument")?;
    let file = File::open(&filename).with_context(|| format!("Failed to open `{filename}`"))?;

    let lock_timeout = config.ledger.lock_timeout();
    let store: Arc<dyn BalanceStore> = match &config.database {
        Some(database) => {
            let db = connect_with(database)
                .await
                .context("Failed to connect to database")?;
            info!("Connected to database");
            Arc::new(PgBalanceStore::new(db).with_lock_timeout(lock_timeout))
        }
        None => {
            info!("Using in-memory balance store");
            Arc::new(MemoryBalanceStore::with_lock_timeout(lock_timeout))
        }
    };

    let currencies = config
        .ledger
        .currencies
        .iter()
        .map(|code| code.parse::<CurrencyCode>())
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid code in ledger.currencies")?;

    let mut batch = Batch::new(store, currencies, Arc::new(TracingAuditSink));
    let summary = batch
        .run(BufReader::new(file), std::io::stdout().lock())
        .await?;

    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        "Batch complete"
    );
    Ok(())
}
