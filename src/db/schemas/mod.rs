//! Database schemas for Deposit Watch
//!
//! Defines MongoDB document structures for deposits and alerts.

mod alert;
mod deposit;
mod metadata;

pub use alert::{AlertDoc, ALERT_COLLECTION};
pub use deposit::{DepositDoc, DEPOSIT_COLLECTION};
pub use metadata::Metadata;
