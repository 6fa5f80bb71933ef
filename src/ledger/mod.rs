//! Balance-affecting updates. Each one is a pure plan over the user's full
//! record, run inside [`TreeStore::transaction`](crate::store::TreeStore::transaction)
//! so that `balance` and the meal/deposit sub-records always move together.

use thiserror::Error;

use crate::store::StoreError;

pub mod deposits;
pub mod meals;

pub use deposits::{record_deposit, DepositReceipt};
pub use meals::{select_meals, toggle_meal, MealFlags, MealKind, Refusal, SelectionOutcome};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount must be a positive number")]
    InvalidAmount,

    #[error("user not found")]
    UserNotFound,

    #[error("cannot timestamp deposit: {0}")]
    Timestamp(#[from] time::error::Format),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Balances are kept to two decimal places.
pub fn round_money(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
