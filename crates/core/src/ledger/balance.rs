//! Per-(account, currency) balance records.
//!
//! A record carries the running balance together with cumulative deposit
//! and withdrawal counters, so the ledger identity
//! `balance == total_deposits - total_withdrawals` can be checked at any
//! committed state.

use chrono::{DateTime, SubsecRound, Utc};
use sarraf_shared::{AccountId, CurrencyCode, Money};
use serde::{Deserialize, Serialize};

use super::audit::MutationKind;
use super::error::LedgerError;

/// Composite key identifying a balance: one record per account and currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    /// Owning account.
    pub account_id: AccountId,
    /// Currency of the balance.
    pub currency: CurrencyCode,
}

impl BalanceKey {
    /// Creates a new key.
    #[must_use]
    pub const fn new(account_id: AccountId, currency: CurrencyCode) -> Self {
        Self {
            account_id,
            currency,
        }
    }
}

impl std::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "account {} / {}", self.account_id, self.currency)
    }
}

/// A balance-changing operation applied to a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Credit the balance.
    Deposit(Money),
    /// Debit the balance; refused if it would go below zero.
    Withdrawal(Money),
}

impl Mutation {
    /// Returns the amount moved by this mutation.
    #[must_use]
    pub const fn amount(self) -> Money {
        match self {
            Self::Deposit(amount) | Self::Withdrawal(amount) => amount,
        }
    }

    /// Returns the audit kind for this mutation.
    #[must_use]
    pub const fn kind(self) -> MutationKind {
        match self {
            Self::Deposit(_) => MutationKind::Deposit,
            Self::Withdrawal(_) => MutationKind::Withdrawal,
        }
    }
}

/// Running balance of one account in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// Owning account.
    pub account_id: AccountId,
    /// Currency of the balance.
    pub currency: CurrencyCode,
    /// Current balance; never negative at a committed state.
    pub balance: Money,
    /// Sum of all successful deposits.
    pub total_deposits: Money,
    /// Sum of all successful withdrawals.
    pub total_withdrawals: Money,
    /// Number of successful deposits and withdrawals.
    pub mutation_count: u64,
    /// Time of the last successful mutation (or creation).
    pub last_updated: DateTime<Utc>,
    /// Creation time; never changes.
    pub created_at: DateTime<Utc>,
}

impl BalanceRecord {
    /// Creates a zeroed record for `key`.
    #[must_use]
    pub fn new(key: BalanceKey, now: DateTime<Utc>) -> Self {
        let now = stamp(now);
        Self {
            account_id: key.account_id,
            currency: key.currency,
            balance: Money::zero(),
            total_deposits: Money::zero(),
            total_withdrawals: Money::zero(),
            mutation_count: 0,
            last_updated: now,
            created_at: now,
        }
    }

    /// Zeroed placeholder for a key that has no stored record.
    ///
    /// Timestamps are pinned to the Unix epoch so repeated reads of a missing
    /// key compare equal.
    #[must_use]
    pub fn transient(key: BalanceKey) -> Self {
        Self::new(key, DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Returns the composite key of this record.
    #[must_use]
    pub const fn key(&self) -> BalanceKey {
        BalanceKey::new(self.account_id, self.currency)
    }

    /// Returns true if the record satisfies the non-negative balance rule
    /// and the ledger identity.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        !self.balance.is_negative()
            && self
                .total_deposits
                .checked_sub(self.total_withdrawals)
                .is_some_and(|net| net == self.balance)
    }

    /// Applies a mutation in place.
    ///
    /// On error the record is left untouched.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if the amount is not positive or a counter would overflow
    /// - `InsufficientBalance` if a withdrawal exceeds the current balance
    pub fn apply(&mut self, mutation: Mutation, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let amount = mutation.amount();
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "{} amount must be positive, got {amount}",
                mutation.kind()
            )));
        }

        let overflow = || LedgerError::InvalidAmount(format!("{amount} overflows balance counters"));

        match mutation {
            Mutation::Deposit(_) => {
                let balance = self.balance.checked_add(amount).ok_or_else(overflow)?;
                let total_deposits = self.total_deposits.checked_add(amount).ok_or_else(overflow)?;
                self.balance = balance;
                self.total_deposits = total_deposits;
            }
            Mutation::Withdrawal(_) => {
                if self.balance < amount {
                    return Err(LedgerError::InsufficientBalance {
                        available: self.balance,
                        requested: amount,
                    });
                }
                let total_withdrawals = self
                    .total_withdrawals
                    .checked_add(amount)
                    .ok_or_else(overflow)?;
                self.balance = self.balance - amount;
                self.total_withdrawals = total_withdrawals;
            }
        }

        self.mutation_count += 1;
        self.last_updated = stamp(now);
        Ok(())
    }
}

/// Timestamps are kept at microsecond precision, the resolution of `TIMESTAMPTZ`.
fn stamp(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(6)
}
