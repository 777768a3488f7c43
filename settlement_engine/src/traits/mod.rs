//! # Backend contracts
//!
//! This module defines the behaviour a storage backend must expose to support the settlement engine. The API
//! structs in [`crate::api`] are generic over these traits, so an alternative backend only needs to implement them.
//!
//! * [`OrderManagement`] persists orders and the product sale records that guard against double selling.
//! * [`TransactionManagement`] writes confirmed payments and moves seller earnings through their payout states.
//! * [`PayoutManagement`] manages withdrawal requests, payout methods and derived balances.
//! * [`ReconciliationManagement`] is the dead-letter store for settlement events that could not be applied.
//! * [`SettlementDatabase`] ties them together.
//!
//! Exclusivity is provided by the backend, never by in-process locks. Every write that guards an invariant must be a
//! single conditional statement, or the first statement of its database transaction.
mod data_objects;
mod order_management;
mod payout_management;
mod reconciliation;
mod transaction_management;

pub use data_objects::{
    CancelEarningsResult,
    CommissionReport,
    EarningsSummary,
    InsertOrderResult,
    RecordSettlementResult,
};
pub use order_management::OrderManagement;
pub use payout_management::PayoutManagement;
pub use reconciliation::ReconciliationManagement;
use thiserror::Error;
pub use transaction_management::TransactionManagement;

/// Low-level storage failures. The API layer maps these onto [`crate::SettlementError`].
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The database was busy or locked, or a compare-and-swap lost a race. Retrying is safe.
    #[error("Storage conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Could not decode stored data: {0}")]
    DecodeError(String),
}

/// SQLite result codes for `SQLITE_BUSY`, `SQLITE_LOCKED` and their extended variants.
const BUSY_CODES: [&str; 4] = ["5", "6", "261", "517"];

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref db) if db.code().map(|c| BUSY_CODES.contains(&c.as_ref())).unwrap_or(false) => {
                StorageError::Conflict(db.message().to_string())
            },
            sqlx::Error::PoolTimedOut => StorageError::Conflict("Timed out waiting for a database connection".into()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StorageError::DecodeError(e.to_string()),
            _ => StorageError::DatabaseError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::DecodeError(e.to_string())
    }
}

/// The full set of behaviour a backend must provide to run the settlement engine.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase:
    Clone + OrderManagement + TransactionManagement + PayoutManagement + ReconciliationManagement
{
    /// The URL of the database
    fn url(&self) -> &str;

    async fn close(&mut self) -> Result<(), StorageError>;
}
