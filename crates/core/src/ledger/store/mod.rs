//! Authoritative keyed storage of balance records.
//!
//! Correctness under concurrency rests on one rule: every read-modify-write
//! of a given (account, currency) key goes through that key's exclusive
//! [`BalanceGuard`]. Guards for different keys never block each other, and a
//! logical operation never holds two guards at once, so no lock ordering
//! exists that could deadlock.
//!
//! A guard releases its key when dropped, on every exit path. Changes become
//! visible only through [`BalanceGuard::commit`]; a guard dropped without a
//! commit leaves the stored record exactly as it was.

mod memory;

pub use memory::MemoryBalanceStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sarraf_shared::AccountId;
use thiserror::Error;

use super::balance::{BalanceKey, BalanceRecord};

/// Errors raised by a balance store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The key's lock was not acquired within the configured wait.
    #[error("Lock wait exceeded {0:?}")]
    LockTimeout(Duration),

    /// The backend failed to read or durably write.
    #[error("Storage failure: {0}")]
    Persistence(String),
}

/// Change to make when committing a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Leave the stored state as it is.
    Keep,
    /// Store this record (insert or replace).
    Put(BalanceRecord),
    /// Remove the stored record.
    Remove,
}

/// Exclusive access to a single balance key.
#[async_trait]
pub trait BalanceGuard: Send {
    /// Returns the committed record, or `None` if the key has no record.
    fn current(&self) -> Option<&BalanceRecord>;

    /// Durably applies `write` while the key is still held.
    ///
    /// On error nothing is changed. Callers commit at most once per guard;
    /// transactional backends end their transaction here.
    async fn commit(&mut self, write: Write) -> Result<(), StoreError>;
}

/// Keyed collection of balance records with per-key exclusion.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Acquires exclusive access to `key`, waiting while another caller holds it.
    ///
    /// Cancelling the returned future before it resolves leaves no trace.
    async fn lock(&self, key: BalanceKey) -> Result<Box<dyn BalanceGuard>, StoreError>;

    /// Returns the committed record for `key`, if any.
    async fn get(&self, key: BalanceKey) -> Result<Option<BalanceRecord>, StoreError>;

    /// Returns every record of `account_id`, ordered by currency code.
    async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<BalanceRecord>, StoreError>;
}

impl dyn BalanceStore + '_ {
    /// Runs `f` with exclusive access to `key` and commits the [`Write`] it
    /// returns.
    ///
    /// `f` sees the committed record (or `None`). If it fails, or the commit
    /// fails, the stored state is unchanged. The lock is released on every
    /// exit path.
    pub async fn with_lock<T, E, F>(&self, key: BalanceKey, f: F) -> Result<T, E>
    where
        F: FnOnce(Option<&BalanceRecord>) -> Result<(Write, T), E>,
        E: From<StoreError>,
    {
        let mut guard = self.lock(key).await?;
        let (write, value) = f(guard.current())?;
        guard.commit(write).await?;
        Ok(value)
    }

    /// Returns the record for `key`, creating a zeroed one if absent.
    ///
    /// Concurrent first calls for the same key create exactly one record and
    /// all observe it.
    pub async fn get_or_create(&self, key: BalanceKey) -> Result<BalanceRecord, StoreError> {
        self.with_lock(key, |current| {
            Ok(match current {
                Some(existing) => (Write::Keep, existing.clone()),
                None => {
                    let record = BalanceRecord::new(key, Utc::now());
                    (Write::Put(record.clone()), record)
                }
            })
        })
        .await
    }

    /// Removes the record for `key`, returning it if it existed.
    ///
    /// Deletion preconditions are the caller's responsibility.
    pub async fn delete(&self, key: BalanceKey) -> Result<Option<BalanceRecord>, StoreError> {
        self.with_lock(key, |current| {
            Ok(match current {
                Some(existing) => (Write::Remove, Some(existing.clone())),
                None => (Write::Keep, None),
            })
        })
        .await
    }
}
