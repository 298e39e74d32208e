//! In-memory balance store.
//!
//! Each key owns a slot: an `Arc<tokio::sync::Mutex<Option<BalanceRecord>>>`
//! kept in a `DashMap`. The map's entry API makes slot creation atomic, so two
//! first-time callers always share one slot; the slot mutex then serializes
//! every access to that key. When the last guard over an empty slot is
//! dropped and no one else holds the slot, it is pruned from the map, so
//! locking keys that never get a record does not grow the store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sarraf_shared::AccountId;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{BalanceGuard, BalanceStore, StoreError, Write};
use crate::ledger::balance::{BalanceKey, BalanceRecord};

type Slot = Arc<Mutex<Option<BalanceRecord>>>;
type Slots = Arc<DashMap<BalanceKey, Slot>>;

/// Balance store backed by a concurrent map with one async mutex per key.
#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    slots: Slots,
    lock_timeout: Option<Duration>,
}

impl MemoryBalanceStore {
    /// Creates an empty store whose lock waits are unbounded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that gives up waiting for a key after `timeout`.
    #[must_use]
    pub fn with_lock_timeout(timeout: Option<Duration>) -> Self {
        Self {
            slots: Slots::default(),
            lock_timeout: timeout,
        }
    }

    fn slot(&self, key: BalanceKey) -> Slot {
        // The map shard lock is released at the end of this statement,
        // before anyone awaits the slot.
        Arc::clone(self.slots.entry(key).or_default().value())
    }

    async fn bounded<T>(&self, acquire: impl Future<Output = T>) -> Result<T, StoreError> {
        match self.lock_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire)
                .await
                .map_err(|_| StoreError::LockTimeout(timeout)),
            None => Ok(acquire.await),
        }
    }
}

struct MemoryGuard {
    key: BalanceKey,
    slots: Slots,
    // `None` only while dropping.
    slot: Option<OwnedMutexGuard<Option<BalanceRecord>>>,
}

#[async_trait]
impl BalanceGuard for MemoryGuard {
    fn current(&self) -> Option<&BalanceRecord> {
        self.slot.as_ref().and_then(|slot| slot.as_ref())
    }

    async fn commit(&mut self, write: Write) -> Result<(), StoreError> {
        if let Some(slot) = self.slot.as_mut() {
            match write {
                Write::Keep => {}
                Write::Put(record) => **slot = Some(record),
                Write::Remove => **slot = None,
            }
        }
        Ok(())
    }
}

impl Drop for MemoryGuard {
    fn drop(&mut self) {
        self.slot = None;
        // Under the shard lock a count of one means no other guard, waiter or
        // reader holds the slot, and none can obtain it until we return.
        self.slots.remove_if(&self.key, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|record| record.is_none())
        });
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn lock(&self, key: BalanceKey) -> Result<Box<dyn BalanceGuard>, StoreError> {
        let slot = self.slot(key);
        let guard = self.bounded(slot.lock_owned()).await?;
        Ok(Box::new(MemoryGuard {
            key,
            slots: Arc::clone(&self.slots),
            slot: Some(guard),
        }))
    }

    async fn get(&self, key: BalanceKey) -> Result<Option<BalanceRecord>, StoreError> {
        let Some(slot) = self.slots.get(&key).map(|entry| Arc::clone(entry.value())) else {
            return Ok(None);
        };
        let guard = self.bounded(slot.lock()).await?;
        Ok(guard.clone())
    }

    async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<BalanceRecord>, StoreError> {
        let mut slots: Vec<(BalanceKey, Slot)> = self
            .slots
            .iter()
            .filter(|entry| entry.key().account_id == account_id)
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        slots.sort_by_key(|(key, _)| key.currency);

        let mut records = Vec::with_capacity(slots.len());
        for (_, slot) in slots {
            if let Some(record) = self.bounded(slot.lock()).await?.clone() {
                records.push(record);
            }
        }
        Ok(records)
    }
}
