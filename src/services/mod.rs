//! Services backing the purchase flow

pub mod balance;

pub use balance::{BalanceService, BalanceSource};
