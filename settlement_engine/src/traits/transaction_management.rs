use chrono::{DateTime, Utc};
use mkt_common::Currency;

use crate::{
    db_types::{NewTransaction, OrderId, Transaction, UserId},
    traits::{CancelEarningsResult, CommissionReport, RecordSettlementResult, StorageError},
};

/// Persistence for confirmed payments and the payout state of the earnings they carry.
#[allow(async_fn_in_trait)]
pub trait TransactionManagement {
    /// Settles an order, atomically:
    /// * inserts the transaction (the gateway reference is unique, so this is the idempotency guard),
    /// * moves the order from `pending` to `paid`, setting `paid_at`,
    /// * records the product as sold to this order.
    ///
    /// If any step fails, nothing is written.
    async fn record_settlement(&self, transaction: NewTransaction) -> Result<RecordSettlementResult, StorageError>;

    async fn fetch_transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>, StorageError>;

    async fn fetch_transaction_for_order(&self, order_id: &OrderId) -> Result<Option<Transaction>, StorageError>;

    async fn fetch_transactions_for_seller(&self, seller_id: &UserId) -> Result<Vec<Transaction>, StorageError>;

    /// Moves the order's earnings from `none` to `pending`. Returns `None` if there was nothing to move.
    async fn mark_payout_eligible(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StorageError>;

    /// Cancels the order's earnings, unless doing so would leave the seller's payouts exceeding their earnings.
    async fn cancel_earnings(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<CancelEarningsResult, StorageError>;

    /// Moves `none` or `pending` earnings of orders delivered at or before `delivered_before` to `ready`.
    async fn release_matured_earnings(
        &self,
        delivered_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StorageError>;

    /// Summarises the platform's share of non-cancelled transactions created within the given window.
    async fn commission_report(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        currency: &Currency,
    ) -> Result<CommissionReport, StorageError>;
}
