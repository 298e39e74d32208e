//! `SeaORM` entity definitions.

pub mod balances;
