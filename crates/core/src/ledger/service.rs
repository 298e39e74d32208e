//! Ledger service: the public mutation and query API over the balance store.
//!
//! Every mutation walks the same path: validate (pure checks and collaborator
//! lookups, no lock held) → lock the key → apply to a working copy → commit →
//! emit the audit entry → release. A failure before commit leaves the stored
//! record untouched; a failed commit aborts the request with
//! `PersistenceFailure` and likewise changes nothing.

use std::sync::Arc;

use chrono::Utc;
use sarraf_shared::{AccountId, Actor, CurrencyCode, Money};
use tracing::{debug, error, info, warn};

use super::audit::{AuditEntry, AuditSink};
use super::balance::{BalanceKey, BalanceRecord, Mutation};
use super::directory::{AccountDirectory, CurrencyCatalog, TransactionHistory};
use super::error::LedgerError;
use super::store::{BalanceStore, Write};

/// A deposit or withdrawal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationInput {
    /// Account whose balance changes.
    pub account_id: AccountId,
    /// Currency of the balance.
    pub currency: CurrencyCode,
    /// Amount to move; must be positive.
    pub amount: Money,
    /// Who requested the change.
    pub actor: Actor,
    /// Free-text description copied into the audit entry.
    pub description: String,
}

impl MutationInput {
    /// Creates an input with an empty description.
    #[must_use]
    pub fn new(account_id: AccountId, currency: CurrencyCode, amount: Money, actor: Actor) -> Self {
        Self {
            account_id,
            currency,
            amount,
            actor,
            description: String::new(),
        }
    }

    /// Sets the audit description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns the balance key targeted by this input.
    #[must_use]
    pub const fn key(&self) -> BalanceKey {
        BalanceKey::new(self.account_id, self.currency)
    }
}

/// Ledger service enforcing balance invariants for every caller.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn BalanceStore>,
    currencies: Arc<dyn CurrencyCatalog>,
    accounts: Arc<dyn AccountDirectory>,
    history: Arc<dyn TransactionHistory>,
    audit: Arc<dyn AuditSink>,
}

impl LedgerService {
    /// Creates a new ledger service.
    #[must_use]
    pub fn new(
        store: Arc<dyn BalanceStore>,
        currencies: Arc<dyn CurrencyCatalog>,
        accounts: Arc<dyn AccountDirectory>,
        history: Arc<dyn TransactionHistory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            currencies,
            accounts,
            history,
            audit,
        }
    }

    /// Credits `input.amount` to the balance, creating the record on first use.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if the amount is not positive
    /// - `UnknownCurrency` if the currency is unknown or inactive
    /// - `UnknownAccount` if the account does not exist
    /// - `LockTimeout` / `PersistenceFailure` on storage problems
    pub async fn deposit(&self, input: MutationInput) -> Result<BalanceRecord, LedgerError> {
        Self::validate_amount(input.amount)?;
        self.ensure_currency_active(input.currency).await?;
        self.ensure_account_exists(input.account_id).await?;

        let mutation = Mutation::Deposit(input.amount);
        self.apply(input, mutation).await
    }

    /// Debits `input.amount` from the balance.
    ///
    /// The sufficiency check and the debit happen under the same key lock,
    /// so concurrent withdrawals can never overdraw.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if the amount is not positive
    /// - `UnknownCurrency` if the currency is unknown or inactive
    /// - `InsufficientBalance` if the balance is below the amount
    /// - `LockTimeout` / `PersistenceFailure` on storage problems
    pub async fn withdraw(&self, input: MutationInput) -> Result<BalanceRecord, LedgerError> {
        Self::validate_amount(input.amount)?;
        self.ensure_currency_active(input.currency).await?;

        let mutation = Mutation::Withdrawal(input.amount);
        self.apply(input, mutation).await
    }

    /// Returns the balance for `key`, or a zeroed transient record if none
    /// exists. Never creates a record.
    pub async fn get_balance(&self, key: BalanceKey) -> Result<BalanceRecord, LedgerError> {
        let record = self.store.get(key).await?;
        Ok(record.unwrap_or_else(|| BalanceRecord::transient(key)))
    }

    /// Returns the balance for `key`, materializing a zeroed record if absent.
    ///
    /// # Errors
    ///
    /// - `UnknownCurrency` if the currency is unknown or inactive
    /// - `UnknownAccount` if the account does not exist
    pub async fn get_or_create_balance(
        &self,
        key: BalanceKey,
    ) -> Result<BalanceRecord, LedgerError> {
        self.ensure_currency_active(key.currency).await?;
        self.ensure_account_exists(key.account_id).await?;

        let record = self.store.get_or_create(key).await?;
        debug!(%key, created_at = %record.created_at, "balance materialized");
        Ok(record)
    }

    /// Deletes the record for `key` and returns it as it was at deletion.
    ///
    /// Authorization is the caller's concern; the ledger only enforces that
    /// no transaction history still references the balance.
    ///
    /// # Errors
    ///
    /// - `BalanceNotFound` if no record exists
    /// - `DependentRecordsExist` if transactions reference the balance
    pub async fn delete_balance(
        &self,
        key: BalanceKey,
        actor: Actor,
    ) -> Result<BalanceRecord, LedgerError> {
        let mut guard = self.store.lock(key).await?;
        let Some(record) = guard.current().cloned() else {
            return Err(LedgerError::BalanceNotFound(key));
        };

        let count = self.history.count_for(key).await?;
        if count > 0 {
            warn!(%key, %actor, dependents = count, "balance deletion refused");
            return Err(LedgerError::DependentRecordsExist { count });
        }

        guard.commit(Write::Remove).await.map_err(|err| {
            error!(%key, error = %err, "balance deletion aborted");
            LedgerError::from(err)
        })?;
        self.emit(&AuditEntry::for_deletion(&record, actor, Utc::now()));
        drop(guard);

        info!(%key, %actor, balance = %record.balance, "balance deleted");
        Ok(record)
    }

    /// Lists every balance of an account, ordered by currency code.
    pub async fn list_balances_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<BalanceRecord>, LedgerError> {
        Ok(self.store.list_for_account(account_id).await?)
    }

    async fn apply(
        &self,
        input: MutationInput,
        mutation: Mutation,
    ) -> Result<BalanceRecord, LedgerError> {
        let key = input.key();
        let mut guard = self.store.lock(key).await?;
        debug!(%key, kind = %mutation.kind(), "balance locked");

        let now = Utc::now();
        let mut record = guard
            .current()
            .cloned()
            .unwrap_or_else(|| BalanceRecord::new(key, now));
        if let Err(err) = record.apply(mutation, now) {
            warn!(%key, kind = %mutation.kind(), error = %err, "mutation rejected");
            return Err(err);
        }
        debug_assert!(record.is_consistent());

        guard.commit(Write::Put(record.clone())).await.map_err(|err| {
            error!(%key, kind = %mutation.kind(), error = %err, "mutation aborted");
            LedgerError::from(err)
        })?;
        // No await between commit and emit, so a cancelled caller cannot
        // leave a committed change unaudited.
        self.emit(&AuditEntry::for_mutation(
            &record,
            mutation,
            input.actor,
            input.description,
        ));
        drop(guard);

        info!(
            %key,
            kind = %mutation.kind(),
            amount = %mutation.amount(),
            balance = %record.balance,
            sequence = record.mutation_count,
            "mutation committed"
        );
        Ok(record)
    }

    fn validate_amount(amount: Money) -> Result<(), LedgerError> {
        if amount.is_positive() {
            Ok(())
        } else {
            Err(LedgerError::InvalidAmount(format!(
                "amount must be positive, got {amount}"
            )))
        }
    }

    async fn ensure_currency_active(&self, currency: CurrencyCode) -> Result<(), LedgerError> {
        if self.currencies.is_active(currency).await? {
            Ok(())
        } else {
            Err(LedgerError::UnknownCurrency(currency))
        }
    }

    async fn ensure_account_exists(&self, account_id: AccountId) -> Result<(), LedgerError> {
        if self.accounts.exists(account_id).await? {
            Ok(())
        } else {
            Err(LedgerError::UnknownAccount(account_id))
        }
    }

    fn emit(&self, entry: &AuditEntry) {
        if let Err(err) = self.audit.record(entry) {
            warn!(
                audit_id = %entry.id,
                account_id = %entry.account_id,
                currency = %entry.currency,
                kind = %entry.kind,
                error = %err,
                "audit entry not recorded"
            );
        }
    }
}
