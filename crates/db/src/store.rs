//! Postgres-backed balance store.
//!
//! A [`BalanceGuard`] here is an open database transaction holding a
//! `SELECT ... FOR UPDATE` row lock on the key's row. First access to a key
//! inserts a placeholder row with `ON CONFLICT DO NOTHING`: the unique
//! primary key makes concurrent first callers queue behind whichever insert
//! won, so the key is serialized even before any record exists. Dropping a
//! guard without committing rolls the transaction back, placeholder included.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sarraf_core::ledger::{BalanceGuard, BalanceKey, BalanceRecord, BalanceStore, StoreError, Write};
use sarraf_shared::{AccountId, CurrencyCode, Money};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, RuntimeErr, Set, TransactionTrait,
};
use tracing::debug;

use crate::entities::balances;

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// How often `lock` retries when the row vanishes between insert and select.
const MAX_LOCK_ATTEMPTS: usize = 3;

/// Balance store persisting records in the `balances` table.
#[derive(Debug, Clone)]
pub struct PgBalanceStore {
    db: DatabaseConnection,
    lock_timeout: Option<Duration>,
}

impl PgBalanceStore {
    /// Creates a store whose lock waits are unbounded.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            lock_timeout: None,
        }
    }

    /// Sets how long `lock` may wait for another holder of the same key.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        let txn = self.db.begin().await?;
        if let Some(timeout) = self.lock_timeout {
            txn.execute_unprepared(&format!(
                "SET LOCAL lock_timeout = '{}ms'",
                timeout.as_millis()
            ))
            .await?;
        }
        Ok(txn)
    }

    /// Takes the row lock for `key`, inserting a placeholder row if needed.
    async fn acquire(txn: &DatabaseTransaction, key: BalanceKey) -> Result<Acquired, DbErr> {
        let now = Utc::now();
        let placeholder = balances::ActiveModel {
            account_id: Set(key.account_id.get()),
            currency_code: Set(key.currency.to_string()),
            balance: Set(Decimal::ZERO),
            total_deposits: Set(Decimal::ZERO),
            total_withdrawals: Set(Decimal::ZERO),
            mutation_count: Set(0),
            last_updated: Set(now.into()),
            created_at: Set(now.into()),
        };

        let inserted = balances::Entity::insert(placeholder)
            .on_conflict(
                OnConflict::columns([balances::Column::AccountId, balances::Column::CurrencyCode])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(txn)
            .await?;
        if inserted > 0 {
            return Ok(Acquired::Placeholder);
        }

        let row = balances::Entity::find_by_id((key.account_id.get(), key.currency.to_string()))
            .lock_exclusive()
            .one(txn)
            .await?;
        Ok(row.map_or(Acquired::Vanished, Acquired::Existing))
    }
}

/// Outcome of taking the row lock for a key.
enum Acquired {
    /// No record existed; the locked row is our uncommitted placeholder.
    Placeholder,
    /// The stored row, now locked.
    Existing(balances::Model),
    /// The row was deleted between our insert and our select.
    Vanished,
}

fn store_error(err: DbErr, lock_timeout: Option<Duration>) -> StoreError {
    match lock_timeout {
        Some(timeout) if is_lock_timeout(&err) => StoreError::LockTimeout(timeout),
        _ => StoreError::Persistence(err.to_string()),
    }
}

fn is_lock_timeout(err: &DbErr) -> bool {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db)))
        | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(db))) => {
            db.code().as_deref() == Some(LOCK_NOT_AVAILABLE)
        }
        _ => false,
    }
}

fn persistence(err: impl std::fmt::Display) -> StoreError {
    StoreError::Persistence(err.to_string())
}

fn to_record(model: balances::Model) -> Result<BalanceRecord, StoreError> {
    Ok(BalanceRecord {
        account_id: AccountId::new(model.account_id),
        currency: model.currency_code.parse::<CurrencyCode>().map_err(persistence)?,
        balance: Money::try_from(model.balance).map_err(persistence)?,
        total_deposits: Money::try_from(model.total_deposits).map_err(persistence)?,
        total_withdrawals: Money::try_from(model.total_withdrawals).map_err(persistence)?,
        mutation_count: u64::try_from(model.mutation_count).map_err(persistence)?,
        last_updated: model.last_updated.with_timezone(&Utc),
        created_at: model.created_at.with_timezone(&Utc),
    })
}

fn to_active_model(record: &BalanceRecord) -> Result<balances::ActiveModel, StoreError> {
    Ok(balances::ActiveModel {
        account_id: Set(record.account_id.get()),
        currency_code: Set(record.currency.to_string()),
        balance: Set(record.balance.into()),
        total_deposits: Set(record.total_deposits.into()),
        total_withdrawals: Set(record.total_withdrawals.into()),
        mutation_count: Set(i64::try_from(record.mutation_count).map_err(persistence)?),
        last_updated: Set(record.last_updated.into()),
        created_at: Set(record.created_at.into()),
    })
}

struct PgGuard {
    lock_timeout: Option<Duration>,
    key: BalanceKey,
    txn: Option<DatabaseTransaction>,
    current: Option<BalanceRecord>,
    placeholder: bool,
}

impl PgGuard {
    async fn write(&self, txn: &DatabaseTransaction, write: Write) -> Result<bool, DbErr> {
        match write {
            Write::Put(record) => {
                let active = to_active_model(&record).map_err(|e| DbErr::Custom(e.to_string()))?;
                active.update(txn).await?;
                Ok(true)
            }
            Write::Remove if !self.placeholder => {
                balances::Entity::delete_by_id((self.key.account_id.get(), self.key.currency.to_string()))
                    .exec(txn)
                    .await?;
                Ok(true)
            }
            Write::Remove | Write::Keep => Ok(false),
        }
    }
}

#[async_trait]
impl BalanceGuard for PgGuard {
    fn current(&self) -> Option<&BalanceRecord> {
        self.current.as_ref()
    }

    async fn commit(&mut self, write: Write) -> Result<(), StoreError> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| StoreError::Persistence(format!("guard for {} already released", self.key)))?;

        let next = match &write {
            Write::Put(record) => Some(record.clone()),
            Write::Remove => None,
            Write::Keep => self.current.clone(),
        };

        let changed = match self.write(&txn, write).await {
            Ok(changed) => changed,
            Err(err) => {
                let _ = txn.rollback().await;
                return Err(store_error(err, self.lock_timeout));
            }
        };
        let closed = if changed {
            txn.commit().await
        } else {
            txn.rollback().await
        };
        closed.map_err(|err| store_error(err, self.lock_timeout))?;

        debug!(key = %self.key, changed, "balance transaction closed");
        self.current = next;
        self.placeholder = false;
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn lock(&self, key: BalanceKey) -> Result<Box<dyn BalanceGuard>, StoreError> {
        let to_store_error = |err| store_error(err, self.lock_timeout);

        for _ in 0..MAX_LOCK_ATTEMPTS {
            let txn = self.begin().await.map_err(to_store_error)?;
            let (current, placeholder) = match Self::acquire(&txn, key).await {
                Ok(Acquired::Placeholder) => (None, true),
                Ok(Acquired::Existing(model)) => (Some(to_record(model)?), false),
                Ok(Acquired::Vanished) => {
                    debug!(%key, "balance row deleted while locking, retrying");
                    txn.rollback().await.map_err(to_store_error)?;
                    continue;
                }
                Err(err) => {
                    let _ = txn.rollback().await;
                    return Err(to_store_error(err));
                }
            };
            return Ok(Box::new(PgGuard {
                lock_timeout: self.lock_timeout,
                key,
                txn: Some(txn),
                current,
                placeholder,
            }));
        }
        Err(StoreError::Persistence(format!(
            "could not lock {key} after {MAX_LOCK_ATTEMPTS} attempts"
        )))
    }

    async fn get(&self, key: BalanceKey) -> Result<Option<BalanceRecord>, StoreError> {
        balances::Entity::find_by_id((key.account_id.get(), key.currency.to_string()))
            .one(&self.db)
            .await
            .map_err(|err| store_error(err, self.lock_timeout))?
            .map(to_record)
            .transpose()
    }

    async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<BalanceRecord>, StoreError> {
        balances::Entity::find()
            .filter(balances::Column::AccountId.eq(account_id.get()))
            .order_by_asc(balances::Column::CurrencyCode)
            .all(&self.db)
            .await
            .map_err(|err| store_error(err, self.lock_timeout))?
            .into_iter()
            .map(to_record)
            .collect()
    }
}
