//! Identity of whoever requested a ledger operation.

use serde::{Deserialize, Serialize};

use super::id::{AccountId, EmployeeId};

/// The party on whose behalf a ledger operation is performed.
///
/// Customers act through their own account; cashiers and administrators
/// act as employees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Actor {
    /// An account holder acting on their own behalf.
    Account(AccountId),
    /// A back-office employee.
    Employee(EmployeeId),
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Account(id) => write!(f, "account:{id}"),
            Self::Employee(id) => write!(f, "employee:{id}"),
        }
    }
}

impl std::str::FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("Invalid actor: {s}"))?;
        match kind {
            "account" => id
                .parse()
                .map(Self::Account)
                .map_err(|_| format!("Invalid account id in actor: {s}")),
            "employee" => id
                .parse()
                .map(Self::Employee)
                .map_err(|_| format!("Invalid employee id in actor: {s}")),
            _ => Err(format!("Invalid actor: {s}")),
        }
    }
}
