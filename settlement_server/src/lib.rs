//! # Settlement server
//! This crate hosts the HTTP front end of the marketplace settlement engine. It is responsible for:
//! * Receiving the payment gateway's confirmation and failure webhooks and handing them to the settlement coordinator.
//! * Accepting checkouts and order transitions from buyers and sellers.
//! * Seller payout requests and earnings summaries.
//! * The admin endpoints for payouts, the reconciliation queue and commission reports.
//! * Running the background worker that releases matured earnings.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! See [routes](routes/index.html). `/health` returns a 200 OK response.
pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod middleware;
pub mod payout_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
