//! Shared types for Deposit Watch

pub mod alert;
pub mod deposit;
pub mod error;

pub use alert::{Alert, AlertFilter, AlertPriority, AlertType, NewAlert, ResolutionPatch};
pub use deposit::{Deposit, LifecycleState};
pub use error::{Result, WatchError};
