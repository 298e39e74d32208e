//! Audit entries emitted for every committed ledger change.
//!
//! The ledger produces one [`AuditEntry`] per successful deposit, withdrawal,
//! or deletion and hands it to an [`AuditSink`]. Delivery is fire-and-forget:
//! a sink failure is logged by the service but never rolls back the change.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use sarraf_shared::{AccountId, Actor, AuditEntryId, CurrencyCode, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::balance::{BalanceRecord, Mutation};

/// Kind of ledger change recorded in an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// Balance credited.
    Deposit,
    /// Balance debited.
    Withdrawal,
    /// Balance record removed.
    Delete,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "deposit"),
            Self::Withdrawal => write!(f, "withdrawal"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Immutable description of one committed ledger change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique, time-ordered entry ID.
    pub id: AuditEntryId,
    /// Account whose balance changed.
    pub account_id: AccountId,
    /// Currency of the balance.
    pub currency: CurrencyCode,
    /// What happened.
    pub kind: MutationKind,
    /// Amount moved (for deletions, the balance that was removed).
    pub amount: Money,
    /// Balance after the change (for deletions, the balance at deletion time).
    pub resulting_balance: Money,
    /// The record's mutation count after the change; orders entries per key.
    pub sequence: u64,
    /// Who requested the change.
    pub actor: Actor,
    /// When the change was committed.
    pub timestamp: DateTime<Utc>,
    /// Free-text description supplied by the caller.
    pub description: String,
}

impl AuditEntry {
    /// Builds the entry for a committed deposit or withdrawal.
    #[must_use]
    pub fn for_mutation(
        record: &BalanceRecord,
        mutation: Mutation,
        actor: Actor,
        description: String,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            account_id: record.account_id,
            currency: record.currency,
            kind: mutation.kind(),
            amount: mutation.amount(),
            resulting_balance: record.balance,
            sequence: record.mutation_count,
            actor,
            timestamp: record.last_updated,
            description,
        }
    }

    /// Builds the entry for a deleted record.
    #[must_use]
    pub fn for_deletion(record: &BalanceRecord, actor: Actor, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: AuditEntryId::new(),
            account_id: record.account_id,
            currency: record.currency,
            kind: MutationKind::Delete,
            amount: record.balance,
            resulting_balance: record.balance,
            sequence: record.mutation_count,
            actor,
            timestamp,
            description: format!("balance record {} deleted", record.key()),
        }
    }
}

/// Errors reported by audit sinks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// The sink no longer accepts entries.
    #[error("Audit sink is closed")]
    Closed,

    /// The sink failed to record the entry.
    #[error("Audit sink failure: {0}")]
    Sink(String),
}

/// Receives one entry per committed ledger change.
///
/// Implementations must not block: `record` runs on the mutation path,
/// before the per-key guard is dropped.
pub trait AuditSink: Send + Sync {
    /// Records an entry.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the entry could not be accepted.
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Sink that keeps every entry in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded entries.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Sink("audit buffer poisoned".to_string()))?
            .push(entry.clone());
        Ok(())
    }
}

/// Sink that writes entries to the `sarraf::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        tracing::info!(
            target: "sarraf::audit",
            audit_id = %entry.id,
            account_id = %entry.account_id,
            currency = %entry.currency,
            kind = %entry.kind,
            amount = %entry.amount,
            resulting_balance = %entry.resulting_balance,
            sequence = entry.sequence,
            actor = %entry.actor,
            description = %entry.description,
            "ledger change"
        );
        Ok(())
    }
}

/// Sink that forwards entries to an asynchronous consumer over a channel.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::UnboundedSender<AuditEntry>,
}

impl ChannelAuditSink {
    /// Creates a sink and the receiver its entries are delivered to.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AuditEntry>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.sender
            .send(entry.clone())
            .map_err(|_| AuditError::Closed)
    }
}
