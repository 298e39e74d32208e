//! Shared types, errors, and configuration for Sarraf.
//!
//! This crate provides common types used across all other crates:
//! - Money type with fixed two-digit decimal precision
//! - Currency codes and typed IDs for type-safe references
//! - Actor identities recorded in audit entries
//! - Configuration management

pub mod config;
pub mod types;

pub use config::AppConfig;
pub use types::{AccountId, Actor, AuditEntryId, CurrencyCode, EmployeeId, Money, MoneyError};
