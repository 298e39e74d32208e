//! Property-based tests for LedgerService.
//!
//! Feature: balance-ledger
//! - Property 1: Balance Invariants Hold After Any Operation Sequence
//! - Property 2: Failed Operations Leave No Trace
//! - Property 3: Audit Trail Replays To The Stored Balance

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;
use sarraf_shared::{AccountId, Actor, CurrencyCode, Money};

use super::audit::{AuditSink, MemoryAuditSink, MutationKind};
use super::balance::BalanceKey;
use super::directory::{InMemoryAccountDirectory, InMemoryTransactionHistory, StaticCurrencyCatalog};
use super::error::LedgerError;
use super::service::{LedgerService, MutationInput};
use super::store::MemoryBalanceStore;

const ACCOUNT: AccountId = AccountId::new(42);

#[derive(Debug, Clone, Copy)]
enum Op {
    Deposit(usize, i64),
    Withdraw(usize, i64),
}

const CURRENCIES: [&str; 3] = ["AFN", "USD", "PKR"];

fn code(index: usize) -> CurrencyCode {
    CURRENCIES[index].parse().unwrap()
}

/// Strategy to generate amounts in minor units, including non-positive ones.
fn amount_minor() -> impl Strategy<Value = i64> {
    prop_oneof![
        8 => 1i64..500_000i64,
        1 => -1_000i64..=0i64,
    ]
}

/// Strategy to generate a single operation on one of the test currencies.
fn op_strategy() -> impl Strategy<Value = Op> {
    (0..CURRENCIES.len(), amount_minor(), any::<bool>()).prop_map(|(currency, amount, deposit)| {
        if deposit {
            Op::Deposit(currency, amount)
        } else {
            Op::Withdraw(currency, amount)
        }
    })
}

fn service(audit: Arc<MemoryAuditSink>) -> LedgerService {
    LedgerService::new(
        Arc::new(MemoryBalanceStore::new()),
        Arc::new(StaticCurrencyCatalog::new((0..CURRENCIES.len()).map(code))),
        Arc::new(InMemoryAccountDirectory::new([ACCOUNT])),
        Arc::new(InMemoryTransactionHistory::new()),
        audit as Arc<dyn AuditSink>,
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn run(service: &LedgerService, op: Op) -> Result<(), LedgerError> {
    let actor = Actor::Account(ACCOUNT);
    match op {
        Op::Deposit(currency, minor) => service
            .deposit(MutationInput::new(ACCOUNT, code(currency), Money::from_minor(minor), actor))
            .await
            .map(|_| ()),
        Op::Withdraw(currency, minor) => service
            .withdraw(MutationInput::new(ACCOUNT, code(currency), Money::from_minor(minor), actor))
            .await
            .map(|_| ()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property 1: Balance Invariants Hold After Any Operation Sequence**
    ///
    /// *For any* sequence of deposits and withdrawals, every stored record
    /// SHALL have a non-negative balance equal to deposits minus withdrawals,
    /// matching a simple reference model.
    #[test]
    fn prop_invariants_hold_after_any_sequence(
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let rt = runtime();
        let service = service(Arc::new(MemoryAuditSink::new()));
        let mut model: BTreeMap<usize, Decimal> = BTreeMap::new();

        rt.block_on(async {
            for op in &ops {
                let accepted = run(&service, *op).await.is_ok();
                let (currency, minor, sign) = match *op {
                    Op::Deposit(c, m) => (c, m, Decimal::ONE),
                    Op::Withdraw(c, m) => (c, m, Decimal::NEGATIVE_ONE),
                };
                let amount = Decimal::new(minor, 2);
                let balance = model.get(&currency).copied().unwrap_or(Decimal::ZERO);
                let expected_ok = minor > 0 && (sign.is_sign_positive() || balance >= amount);
                prop_assert_eq!(accepted, expected_ok, "op {:?} on balance {}", op, balance);
                if accepted {
                    *model.entry(currency).or_insert(Decimal::ZERO) += sign * amount;
                }
            }

            for (index, expected) in &model {
                let record = service
                    .get_balance(BalanceKey::new(ACCOUNT, code(*index)))
                    .await
                    .unwrap();
                prop_assert!(record.is_consistent(), "inconsistent: {:?}", record);
                prop_assert_eq!(Decimal::from(record.balance), *expected);
            }
            Ok(())
        })?;
    }

    /// **Property 2: Failed Operations Leave No Trace**
    ///
    /// *For any* rejected operation, the stored record and the audit trail
    /// SHALL be exactly as they were before the attempt.
    #[test]
    fn prop_failed_operations_leave_no_trace(
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let rt = runtime();
        let audit = Arc::new(MemoryAuditSink::new());
        let service = service(Arc::clone(&audit));

        rt.block_on(async {
            for op in ops {
                let currency = match op {
                    Op::Deposit(c, _) | Op::Withdraw(c, _) => c,
                };
                let key = BalanceKey::new(ACCOUNT, code(currency));
                let before = service.get_balance(key).await.unwrap();
                let audited = audit.len();

                if run(&service, op).await.is_err() {
                    prop_assert_eq!(service.get_balance(key).await.unwrap(), before);
                    prop_assert_eq!(audit.len(), audited);
                } else {
                    prop_assert_eq!(audit.len(), audited + 1);
                }
            }
            Ok(())
        })?;
    }

    /// **Property 3: Audit Trail Replays To The Stored Balance**
    ///
    /// *For any* sequence of operations, replaying each key's audit entries
    /// in sequence order SHALL reproduce the stored balance, and sequences
    /// SHALL run 1, 2, 3, ... without gaps.
    #[test]
    fn prop_audit_trail_replays_to_balance(
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let rt = runtime();
        let audit = Arc::new(MemoryAuditSink::new());
        let service = service(Arc::clone(&audit));

        rt.block_on(async {
            for op in ops {
                let _ = run(&service, op).await;
            }

            for index in 0..CURRENCIES.len() {
                let currency = code(index);
                let entries: Vec<_> = audit
                    .entries()
                    .into_iter()
                    .filter(|e| e.currency == currency)
                    .collect();

                let mut replayed = Money::zero();
                for (position, entry) in entries.iter().enumerate() {
                    prop_assert_eq!(entry.sequence, position as u64 + 1);
                    replayed = match entry.kind {
                        MutationKind::Deposit => replayed + entry.amount,
                        MutationKind::Withdrawal => replayed - entry.amount,
                        MutationKind::Delete => unreachable!("no deletions issued"),
                    };
                    prop_assert_eq!(replayed, entry.resulting_balance);
                }

                let record = service
                    .get_balance(BalanceKey::new(ACCOUNT, currency))
                    .await
                    .unwrap();
                prop_assert_eq!(record.balance, replayed);
                prop_assert_eq!(record.mutation_count, entries.len() as u64);
            }
            Ok(())
        })?;
    }
}
