//! Ledger error types for validation, business-rule, and storage failures.
//!
//! Every error is returned to the immediate caller; the ledger never retries
//! internally. Use [`LedgerError::is_retryable`] to decide whether a retry of
//! the whole operation makes sense.

use std::time::Duration;

use sarraf_shared::{AccountId, CurrencyCode, Money, MoneyError};
use thiserror::Error;

use super::balance::BalanceKey;
use super::directory::CollaboratorError;
use super::store::StoreError;

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Amount is non-positive, mis-scaled, or would overflow a counter.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Currency is unknown or inactive in the currency catalog.
    #[error("Unknown or inactive currency: {0}")]
    UnknownCurrency(CurrencyCode),

    /// Account does not exist in the account directory.
    #[error("Unknown account: {0}")]
    UnknownAccount(AccountId),

    // ========== Business Rule Errors ==========
    /// Withdrawal exceeds the current balance.
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Balance at the time of the attempt.
        available: Money,
        /// Amount the caller tried to withdraw.
        requested: Money,
    },

    /// Balance cannot be deleted while transactions still reference it.
    #[error("Cannot delete balance: {count} dependent transactions exist")]
    DependentRecordsExist {
        /// Number of referencing transactions.
        count: u64,
    },

    /// No balance record exists for the key.
    #[error("Balance not found for {0}")]
    BalanceNotFound(BalanceKey),

    // ========== Runtime Errors ==========
    /// The backing store failed to durably commit the mutation.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// The per-key lock could not be acquired within the configured wait.
    #[error("Timed out after {waited:?} waiting for balance lock")]
    LockTimeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// A collaborator (currency catalog, account directory, history) failed.
    #[error("Collaborator failure: {0}")]
    Collaborator(String),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            Self::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::DependentRecordsExist { .. } => "DEPENDENT_RECORDS_EXIST",
            Self::BalanceNotFound(_) => "BALANCE_NOT_FOUND",
            Self::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::Collaborator(_) => "COLLABORATOR_FAILURE",
        }
    }

    /// Returns true if retrying the whole operation unchanged may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure(_) | Self::LockTimeout { .. } | Self::Collaborator(_)
        )
    }
}

impl From<MoneyError> for LedgerError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            MoneyError::InvalidCurrencyCode(code) => {
                Self::InvalidAmount(format!("invalid currency code '{code}'"))
            }
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout(waited) => Self::LockTimeout { waited },
            StoreError::Persistence(msg) => Self::PersistenceFailure(msg),
        }
    }
}

impl From<CollaboratorError> for LedgerError {
    fn from(err: CollaboratorError) -> Self {
        Self::Collaborator(err.to_string())
    }
}
