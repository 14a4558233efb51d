//! Database layer for Deposit Watch
//!
//! MongoDB storage for deposits and alerts.

pub mod mongo;
pub mod schemas;

pub use mongo::{MongoClient, MongoCollection};
pub use schemas::{AlertDoc, DepositDoc, Metadata};
