//! Multi-currency balance ledger.
//!
//! This module implements the balance core of the exchange back office:
//! - Balance records keyed by (account, currency)
//! - Per-key exclusive locking over a pluggable store
//! - Deposit, withdrawal, and deletion with invariant enforcement
//! - Audit entries for every committed change
//! - Collaborator interfaces for currencies, accounts, and history

pub mod audit;
pub mod balance;
pub mod directory;
pub mod error;
pub mod service;
pub mod store;

#[cfg(test)]
mod service_props;

pub use audit::{
    AuditEntry, AuditError, AuditSink, ChannelAuditSink, MemoryAuditSink, MutationKind,
    TracingAuditSink,
};
pub use balance::{BalanceKey, BalanceRecord, Mutation};
pub use directory::{
    AccountDirectory, CollaboratorError, CurrencyCatalog, InMemoryAccountDirectory,
    InMemoryTransactionHistory, StaticCurrencyCatalog, TransactionHistory,
};
pub use error::LedgerError;
pub use service::{LedgerService, MutationInput};
pub use store::{BalanceGuard, BalanceStore, MemoryBalanceStore, StoreError, Write};
