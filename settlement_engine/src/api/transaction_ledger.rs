use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use mkt_common::{Cents, Currency};

use crate::{
    db_types::{
        NewPayout,
        NewTransaction,
        OrderId,
        Payout,
        PayoutMethod,
        PayoutStatus,
        PayoutUpdate,
        SellerPayoutMethod,
        Transaction,
        UserId,
    },
    traits::{
        CancelEarningsResult,
        CommissionReport,
        EarningsSummary,
        PayoutManagement,
        RecordSettlementResult,
        TransactionManagement,
    },
    SettlementError,
};

/// `TransactionLedger` is the financial log: confirmed payments and seller payouts.
///
/// Records are keyed by idempotency identifiers (the gateway reference for payments, the row id for payouts) and are
/// never deleted. Only the payout state of a transaction, and the status of a payout, ever change.
pub struct TransactionLedger<B> {
    db: B,
}

impl<B> Debug for TransactionLedger<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionLedger")
    }
}

impl<B> TransactionLedger<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> TransactionLedger<B>
where B: TransactionManagement
{
    /// Writes the transaction and marks its order as paid in one atomic step.
    ///
    /// The amounts must balance (`amount_total == commission_amount + seller_earnings + shipping_cost`, give or take a
    /// cent) or nothing is written.
    pub async fn record(&self, transaction: NewTransaction) -> Result<RecordSettlementResult, SettlementError> {
        let balanced = transaction.imbalance().is_ok_and(|d| d <= Cents::from(1));
        if !balanced {
            error!(
                "🔄️ Refusing to record payment {}. The total {} does not match commission {} + earnings {} + \
                 shipping {}",
                transaction.gateway_reference,
                transaction.amount_total,
                transaction.commission_amount,
                transaction.seller_earnings,
                transaction.shipping_cost
            );
            return Err(SettlementError::ValidationError(format!(
                "The transaction total {} does not equal commission + earnings + shipping",
                transaction.amount_total
            )));
        }
        let result = self.db.record_settlement(transaction).await?;
        Ok(result)
    }

    pub async fn fetch_by_reference(&self, reference: &str) -> Result<Option<Transaction>, SettlementError> {
        let tx = self.db.fetch_transaction_by_reference(reference).await?;
        Ok(tx)
    }

    pub async fn fetch_for_order(&self, order_id: &OrderId) -> Result<Option<Transaction>, SettlementError> {
        let tx = self.db.fetch_transaction_for_order(order_id).await?;
        Ok(tx)
    }

    pub async fn fetch_for_seller(&self, seller_id: &UserId) -> Result<Vec<Transaction>, SettlementError> {
        let txs = self.db.fetch_transactions_for_seller(seller_id).await?;
        Ok(txs)
    }

    /// Starts the payout hold period for the order's earnings.
    pub async fn mark_payout_eligible(&self, order_id: &OrderId) -> Result<Option<Transaction>, SettlementError> {
        let tx = self.db.mark_payout_eligible(order_id, Utc::now()).await?;
        match &tx {
            Some(t) => debug!("💸️ Earnings of {} for order [{order_id}] are now in their hold period", t.seller_earnings),
            None => debug!("💸️ Order [{order_id}] has no earnings awaiting delivery"),
        }
        Ok(tx)
    }

    pub async fn cancel_earnings(&self, order_id: &OrderId) -> Result<CancelEarningsResult, SettlementError> {
        let result = self.db.cancel_earnings(order_id, Utc::now()).await?;
        match &result {
            CancelEarningsResult::Cancelled(t) => {
                info!("💸️ Earnings of {} for order [{order_id}] have been cancelled", t.seller_earnings)
            },
            CancelEarningsResult::Committed(t) => warn!(
                "💸️ Earnings of {} for order [{order_id}] are committed to payouts ({}) and cannot be cancelled",
                t.seller_earnings, t.payout_status
            ),
            CancelEarningsResult::NoTransaction | CancelEarningsResult::AlreadyCancelled(_) => {},
        }
        Ok(result)
    }

    pub async fn release_matured(
        &self,
        delivered_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, SettlementError> {
        let released = self.db.release_matured_earnings(delivered_before, now).await?;
        Ok(released)
    }

    pub async fn commission_report(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        currency: &Currency,
    ) -> Result<CommissionReport, SettlementError> {
        let report = self.db.commission_report(since, until, currency).await?;
        Ok(report)
    }
}

impl<B> TransactionLedger<B>
where B: PayoutManagement
{
    pub async fn withdrawable_balance(&self, seller_id: &UserId, currency: &Currency) -> Result<Cents, SettlementError> {
        let balance = self.db.withdrawable_balance(seller_id, currency).await?;
        Ok(balance)
    }

    pub async fn insert_payout_if_funded(&self, payout: NewPayout) -> Result<Option<Payout>, SettlementError> {
        let payout = self.db.insert_payout_if_funded(payout).await?;
        Ok(payout)
    }

    pub async fn update_payout_status(
        &self,
        id: i64,
        expected: PayoutStatus,
        update: PayoutUpdate,
    ) -> Result<Option<Payout>, SettlementError> {
        let payout = self.db.update_payout_status(id, expected, update).await?;
        Ok(payout)
    }

    pub async fn fetch_payout(&self, id: i64) -> Result<Option<Payout>, SettlementError> {
        let payout = self.db.fetch_payout(id).await?;
        Ok(payout)
    }

    pub async fn fetch_payouts_for_seller(&self, seller_id: &UserId) -> Result<Vec<Payout>, SettlementError> {
        let payouts = self.db.fetch_payouts_for_seller(seller_id).await?;
        Ok(payouts)
    }

    pub async fn fetch_payouts_with_status(&self, status: PayoutStatus) -> Result<Vec<Payout>, SettlementError> {
        let payouts = self.db.fetch_payouts_with_status(status).await?;
        Ok(payouts)
    }

    pub async fn upsert_payout_method(
        &self,
        seller_id: &UserId,
        method: &PayoutMethod,
    ) -> Result<SellerPayoutMethod, SettlementError> {
        let method = self.db.upsert_payout_method(seller_id, method).await?;
        Ok(method)
    }

    pub async fn fetch_payout_method(&self, seller_id: &UserId) -> Result<Option<SellerPayoutMethod>, SettlementError> {
        let method = self.db.fetch_payout_method(seller_id).await?;
        Ok(method)
    }

    pub async fn fetch_payout_methods(&self) -> Result<Vec<SellerPayoutMethod>, SettlementError> {
        let methods = self.db.fetch_payout_methods().await?;
        Ok(methods)
    }

    pub async fn earnings_summary(
        &self,
        seller_id: &UserId,
        currency: &Currency,
    ) -> Result<EarningsSummary, SettlementError> {
        let summary = self.db.earnings_summary(seller_id, currency).await?;
        Ok(summary)
    }
}
