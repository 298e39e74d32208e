//! Balance ledger core for Sarraf.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! It tracks, per account and per currency, a running balance that never goes
//! negative and stays consistent under concurrent deposits and withdrawals.
//!
//! # Modules
//!
//! - `ledger` - Balance records, the keyed balance store, and the ledger service

pub mod ledger;
