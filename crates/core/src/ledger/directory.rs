//! Collaborator interfaces the ledger consults but does not own.
//!
//! The currency catalog, account directory, and transaction history live in
//! other parts of the back office. The ledger trusts their answers. In-memory
//! implementations are provided for tests and the batch tool.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use sarraf_shared::{AccountId, CurrencyCode};
use thiserror::Error;

use super::balance::BalanceKey;

/// Failure reported by a collaborator lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{collaborator} unavailable: {message}")]
pub struct CollaboratorError {
    /// Which collaborator failed.
    pub collaborator: &'static str,
    /// What went wrong.
    pub message: String,
}

impl CollaboratorError {
    /// Creates a new error.
    #[must_use]
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// Source of truth for which currencies may be traded.
#[async_trait]
pub trait CurrencyCatalog: Send + Sync {
    /// Returns true if `code` is known and active.
    async fn is_active(&self, code: CurrencyCode) -> Result<bool, CollaboratorError>;
}

/// Source of truth for account existence.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Returns true if the account exists.
    async fn exists(&self, account_id: AccountId) -> Result<bool, CollaboratorError>;
}

/// Exchange and hawala transaction history.
#[async_trait]
pub trait TransactionHistory: Send + Sync {
    /// Returns how many transactions reference the balance key.
    async fn count_for(&self, key: BalanceKey) -> Result<u64, CollaboratorError>;
}

/// Currency catalog backed by an in-memory set of active codes.
#[derive(Debug, Default)]
pub struct StaticCurrencyCatalog {
    active: DashSet<CurrencyCode>,
}

impl StaticCurrencyCatalog {
    /// Creates a catalog with the given active codes.
    #[must_use]
    pub fn new(codes: impl IntoIterator<Item = CurrencyCode>) -> Self {
        Self {
            active: codes.into_iter().collect(),
        }
    }

    /// Marks a currency as active.
    pub fn activate(&self, code: CurrencyCode) {
        self.active.insert(code);
    }

    /// Marks a currency as inactive.
    pub fn deactivate(&self, code: CurrencyCode) {
        self.active.remove(&code);
    }
}

#[async_trait]
impl CurrencyCatalog for StaticCurrencyCatalog {
    async fn is_active(&self, code: CurrencyCode) -> Result<bool, CollaboratorError> {
        Ok(self.active.contains(&code))
    }
}

/// Account directory backed by an in-memory set.
#[derive(Debug, Default)]
pub struct InMemoryAccountDirectory {
    accounts: DashSet<AccountId>,
}

impl InMemoryAccountDirectory {
    /// Creates a directory with the given accounts.
    #[must_use]
    pub fn new(accounts: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
        }
    }

    /// Registers an account.
    pub fn register(&self, account_id: AccountId) {
        self.accounts.insert(account_id);
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn exists(&self, account_id: AccountId) -> Result<bool, CollaboratorError> {
        Ok(self.accounts.contains(&account_id))
    }
}

/// Transaction history that only keeps per-key counts.
#[derive(Debug, Default)]
pub struct InMemoryTransactionHistory {
    counts: DashMap<BalanceKey, u64>,
}

impl InMemoryTransactionHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one transaction referencing `key`.
    pub fn record(&self, key: BalanceKey) {
        *self.counts.entry(key).or_insert(0) += 1;
    }
}

#[async_trait]
impl TransactionHistory for InMemoryTransactionHistory {
    async fn count_for(&self, key: BalanceKey) -> Result<u64, CollaboratorError> {
        Ok(self.counts.get(&key).map_or(0, |count| *count))
    }
}
