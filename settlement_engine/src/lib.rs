//! Marketplace Settlement Engine
//!
//! The settlement engine sits between a marketplace's checkout and its payment gateway. It takes a buyer's checkout
//! intent, reconciles it against the gateway's asynchronous payment confirmation, changes the order's state exactly
//! once, computes the commission and earnings split, and drives every downstream side effect: product release, seller
//! payouts, notifications and disputes.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@traits`] and the SQLite backend). Backends implement the traits in [`mod@traits`]. The data types
//!    they persist live in [`mod@db_types`] and are public. Exclusivity between concurrent writers comes entirely from
//!    storage constraints and compare-and-swap updates, never from in-process locks.
//! 2. The public API. [`OrderLedger`] owns the order state machine, [`TransactionLedger`] owns the financial log,
//!    [`SettlementCoordinator`] applies gateway events and reacts to order transitions, [`PayoutProcessor`] manages
//!    seller withdrawals and [`ReconciliationApi`] exposes the events that could not be applied.
//! 3. Events ([`mod@events`]). Side effects are expressed as a closed set of domain events. Subscribers register
//!    hooks, which are called asynchronously and retried with backoff if they fail. A failing hook never affects the
//!    ledger.
mod api;

pub mod commission;
pub mod db_types;
pub mod events;
pub mod helpers;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    errors::SettlementError,
    order_ledger::OrderLedger,
    order_objects,
    payment_objects,
    payout_api::PayoutProcessor,
    payout_objects,
    reconciliation_api::ReconciliationApi,
    settlement_api::{SettlementConfig, SettlementCoordinator, DEFAULT_AMOUNT_TOLERANCE, DEFAULT_STORAGE_TIMEOUT},
    transaction_ledger::TransactionLedger,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    OrderManagement,
    PayoutManagement,
    ReconciliationManagement,
    SettlementDatabase,
    StorageError,
    TransactionManagement,
};
