use chrono::{DateTime, Utc};
use mkt_common::{Cents, Currency};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, Transaction, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOrderResult {
    Inserted(Order),
    /// An order with the same `order_id` already exists. It is returned unchanged.
    AlreadyExists(Order),
    /// The product has already been sold to the given order.
    ProductSold(OrderId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSettlementResult {
    /// The transaction was written, and the order moved to `paid`, in one atomic step.
    Recorded { transaction: Transaction, order: Order },
    /// A transaction with the same gateway reference already exists.
    Duplicate(Transaction),
    /// Nothing was written because the order is no longer payable. The string describes why.
    StaleOrder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelEarningsResult {
    /// The earnings were withdrawn from the seller's balance.
    Cancelled(Transaction),
    /// The order has no transaction, i.e. it was never paid.
    NoTransaction,
    AlreadyCancelled(Transaction),
    /// The earnings are already committed to a payout. Nothing was changed.
    Committed(Transaction),
}

/// A seller's earnings, derived from the transaction and payout logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsSummary {
    pub seller_id: UserId,
    pub currency: Currency,
    /// Earnings from every order that has not been cancelled.
    pub total_earnings: Cents,
    /// Earnings that are not yet withdrawable (undelivered, or within the hold period).
    pub pending: Cents,
    pub withdrawable: Cents,
    /// Payouts that have been requested but are not complete.
    pub in_flight: Cents,
    pub total_paid_out: Cents,
    pub last_payout_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionReport {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub currency: Currency,
    pub transaction_count: i64,
    pub gross_volume: Cents,
    /// Service fees plus tax.
    pub total_commission: Cents,
    pub tax_collected: Cents,
    pub shipping_collected: Cents,
    pub seller_earnings: Cents,
}
