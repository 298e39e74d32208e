//! Balances migration.
//!
//! Creates the per-(account, currency) balances table. The CHECK constraints
//! mirror the ledger rules so a faulty writer cannot commit a negative or
//! unbalanced record.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(BALANCES_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS balances CASCADE;")
            .await?;
        Ok(())
    }
}

const BALANCES_SQL: &str = r"
-- One row per account and currency
CREATE TABLE balances (
    account_id BIGINT NOT NULL,
    currency_code VARCHAR(3) NOT NULL,
    balance NUMERIC(20, 2) NOT NULL DEFAULT 0,
    total_deposits NUMERIC(20, 2) NOT NULL DEFAULT 0,
    total_withdrawals NUMERIC(20, 2) NOT NULL DEFAULT 0,
    mutation_count BIGINT NOT NULL DEFAULT 0,
    last_updated TIMESTAMPTZ NOT NULL DEFAULT now(),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (account_id, currency_code),
    CONSTRAINT chk_balance_non_negative CHECK (balance >= 0),
    CONSTRAINT chk_balance_identity CHECK (balance = total_deposits - total_withdrawals),
    CONSTRAINT chk_totals_non_negative CHECK (total_deposits >= 0 AND total_withdrawals >= 0),
    CONSTRAINT chk_mutation_count CHECK (mutation_count >= 0),
    CONSTRAINT chk_balance_currency_format CHECK (currency_code ~ '^[A-Z]{3}$')
);

COMMENT ON TABLE balances IS 'Running balance per account and currency; the primary key index also serves per-account listing';
";
