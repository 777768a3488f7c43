//! The public API of the settlement engine.
//!
//! The API structs are generic over the backend traits in [`crate::traits`], so they work against any storage that
//! implements them.
pub mod errors;
pub mod order_ledger;
pub mod order_objects;
pub mod payment_objects;
pub mod payout_api;
pub mod payout_objects;
pub mod reconciliation_api;
pub mod settlement_api;
pub mod transaction_ledger;
