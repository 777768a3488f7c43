//! `SqliteDatabase` is the SQLite backend for the settlement engine.
//!
//! It implements all the traits defined in the [`crate::traits`] module. Multi-statement operations run inside a
//! database transaction whose first statement is the guarding write, so the write lock is held before anything is
//! read.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use mkt_common::{Cents, Currency};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};

use super::db::{db_url, new_pool, orders, payouts, reconciliation, transactions};
use crate::{
    commission::CommissionBreakdown,
    db_types::{
        EarningsStatus,
        NewOrder,
        NewPayout,
        NewReconciliationEntry,
        NewTransaction,
        Order,
        OrderId,
        OrderStatusType,
        Payout,
        PayoutMethod,
        PayoutStatus,
        PayoutUpdate,
        ProductId,
        ReconciliationEntry,
        SellerPayoutMethod,
        Transaction,
        UserId,
    },
    order_objects::{OrderQueryFilter, OrderStats, OrderStatusUpdate},
    traits::{
        CancelEarningsResult,
        CommissionReport,
        EarningsSummary,
        InsertOrderResult,
        OrderManagement,
        PayoutManagement,
        ReconciliationManagement,
        RecordSettlementResult,
        SettlementDatabase,
        StorageError,
        TransactionManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(
        &self,
        order: &NewOrder,
        breakdown: &CommissionBreakdown,
    ) -> Result<InsertOrderResult, StorageError> {
        let mut tx = self.pool.begin().await?;
        let inserted = orders::insert_if_absent(order, breakdown, Utc::now(), &mut tx).await?;
        let Some(inserted) = inserted else {
            let existing = orders::fetch_order_by_order_id(&order.order_id, &mut tx).await?.ok_or_else(|| {
                StorageError::DatabaseError(format!("Order {} exists, but could not be read back", order.order_id))
            })?;
            tx.rollback().await?;
            return Ok(InsertOrderResult::AlreadyExists(existing));
        };
        if let Some(owner) = orders::fetch_product_sale(&order.product_id, &mut tx).await? {
            tx.rollback().await?;
            debug!("🗃️ Product {} is already sold to order {owner}", order.product_id);
            return Ok(InsertOrderResult::ProductSold(owner));
        }
        tx.commit().await?;
        Ok(InsertOrderResult::Inserted(inserted))
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::search_orders(query, &mut conn).await?;
        Ok(result)
    }

    async fn order_stats(&self, user_id: &UserId) -> Result<OrderStats, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let stats = orders::order_stats(user_id, &mut conn).await?;
        Ok(stats)
    }

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        update: &OrderStatusUpdate,
    ) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::update_order_status(order_id, expected, update, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_product_sale(&self, product_id: &ProductId) -> Result<Option<OrderId>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let owner = orders::fetch_product_sale(product_id, &mut conn).await?;
        Ok(owner)
    }

    async fn release_product(&self, order_id: &OrderId) -> Result<Option<ProductId>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let product = orders::release_product(order_id, &mut conn).await?;
        Ok(product)
    }
}

impl TransactionManagement for SqliteDatabase {
    async fn record_settlement(&self, transaction: NewTransaction) -> Result<RecordSettlementResult, StorageError> {
        let mut tx = self.pool.begin().await?;
        let recorded = match transactions::insert_transaction(&transaction, &mut tx).await {
            Ok(t) => t,
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                let mut conn = self.pool.acquire().await?;
                return match transactions::fetch_by_reference(&transaction.gateway_reference, &mut conn).await? {
                    Some(existing) => {
                        debug!("🗃️ Payment {} has already been recorded", existing.gateway_reference);
                        Ok(RecordSettlementResult::Duplicate(existing))
                    },
                    None => Ok(RecordSettlementResult::StaleOrder(format!(
                        "Order {} has already been settled by another payment",
                        transaction.order_id
                    ))),
                };
            },
            Err(e) => return Err(e.into()),
        };
        let update = OrderStatusUpdate::new(OrderStatusType::Paid, transaction.created_at);
        let order =
            match orders::update_order_status(&transaction.order_id, OrderStatusType::Pending, &update, &mut tx).await? {
                Some(o) => o,
                None => {
                    tx.rollback().await?;
                    return Ok(RecordSettlementResult::StaleOrder(format!(
                        "Order {} is no longer awaiting payment",
                        transaction.order_id
                    )));
                },
            };
        match orders::insert_product_sale(&transaction.product_id, &order.order_id, transaction.created_at, &mut tx)
            .await
        {
            Ok(()) => {},
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Ok(RecordSettlementResult::StaleOrder(format!(
                    "Product {} has already been sold",
                    transaction.product_id
                )));
            },
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;
        debug!("🗃️ Payment {} recorded against order {}", recorded.gateway_reference, order.order_id);
        Ok(RecordSettlementResult::Recorded { transaction: recorded, order })
    }

    async fn fetch_transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::fetch_by_reference(reference, &mut conn).await?;
        Ok(tx)
    }

    async fn fetch_transaction_for_order(&self, order_id: &OrderId) -> Result<Option<Transaction>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::fetch_for_order(order_id, &mut conn).await?;
        Ok(tx)
    }

    async fn fetch_transactions_for_seller(&self, seller_id: &UserId) -> Result<Vec<Transaction>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let txs = transactions::fetch_for_seller(seller_id, &mut conn).await?;
        Ok(txs)
    }

    async fn mark_payout_eligible(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::mark_payout_eligible(order_id, now, &mut conn).await?;
        Ok(tx)
    }

    async fn cancel_earnings(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<CancelEarningsResult, StorageError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(tx) = transactions::cancel_earnings(order_id, now, &mut conn).await? {
            return Ok(CancelEarningsResult::Cancelled(tx));
        }
        let result = match transactions::fetch_for_order(order_id, &mut conn).await? {
            None => CancelEarningsResult::NoTransaction,
            Some(tx) if tx.payout_status == EarningsStatus::Cancelled => CancelEarningsResult::AlreadyCancelled(tx),
            Some(tx) => CancelEarningsResult::Committed(tx),
        };
        Ok(result)
    }

    async fn release_matured_earnings(
        &self,
        delivered_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let released = transactions::release_matured_earnings(delivered_before, now, &mut conn).await?;
        Ok(released)
    }

    async fn commission_report(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        currency: &Currency,
    ) -> Result<CommissionReport, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let report = transactions::commission_report(since, until, currency, &mut conn).await?;
        Ok(report)
    }
}

impl PayoutManagement for SqliteDatabase {
    async fn withdrawable_balance(&self, seller_id: &UserId, currency: &Currency) -> Result<Cents, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let balance = payouts::withdrawable_balance(seller_id, currency, &mut conn).await?;
        Ok(balance)
    }

    async fn insert_payout_if_funded(&self, payout: NewPayout) -> Result<Option<Payout>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::insert_if_funded(&payout, &mut conn).await?;
        Ok(payout)
    }

    async fn update_payout_status(
        &self,
        id: i64,
        expected: PayoutStatus,
        update: PayoutUpdate,
    ) -> Result<Option<Payout>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let Some(payout) = payouts::update_status(id, expected, &update, &mut tx).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        if payout.status == PayoutStatus::Completed {
            payouts::allocate_completed_payouts(&payout.seller_id, &payout.currency, update.timestamp, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(Some(payout))
    }

    async fn fetch_payout(&self, id: i64) -> Result<Option<Payout>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::fetch_payout(id, &mut conn).await?;
        Ok(payout)
    }

    async fn fetch_payouts_for_seller(&self, seller_id: &UserId) -> Result<Vec<Payout>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let result = payouts::fetch_payouts_for_seller(seller_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_payouts_with_status(&self, status: PayoutStatus) -> Result<Vec<Payout>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let result = payouts::fetch_payouts_with_status(status, &mut conn).await?;
        Ok(result)
    }

    async fn upsert_payout_method(
        &self,
        seller_id: &UserId,
        method: &PayoutMethod,
    ) -> Result<SellerPayoutMethod, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let result = payouts::upsert_payout_method(seller_id, method, Utc::now(), &mut conn).await?;
        Ok(result)
    }

    async fn fetch_payout_method(&self, seller_id: &UserId) -> Result<Option<SellerPayoutMethod>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let result = payouts::fetch_payout_method(seller_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_payout_methods(&self) -> Result<Vec<SellerPayoutMethod>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let result = payouts::fetch_payout_methods(&mut conn).await?;
        Ok(result)
    }

    async fn earnings_summary(&self, seller_id: &UserId, currency: &Currency) -> Result<EarningsSummary, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let summary = payouts::earnings_summary(seller_id, currency, &mut conn).await?;
        Ok(summary)
    }
}

impl ReconciliationManagement for SqliteDatabase {
    async fn dead_letter(&self, entry: NewReconciliationEntry) -> Result<ReconciliationEntry, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let entry = reconciliation::dead_letter(&entry, Utc::now(), &mut conn).await?;
        warn!(
            "🗃️ Settlement event {} for order {} is in the reconciliation queue ({} attempts): {}",
            entry.gateway_reference, entry.order_id, entry.attempts, entry.reason
        );
        Ok(entry)
    }

    async fn fetch_reconciliation_entries(
        &self,
        include_resolved: bool,
    ) -> Result<Vec<ReconciliationEntry>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let entries = reconciliation::fetch_entries(include_resolved, &mut conn).await?;
        Ok(entries)
    }

    async fn resolve_reconciliation_entry(
        &self,
        id: i64,
        resolution: &str,
    ) -> Result<Option<ReconciliationEntry>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let entry = reconciliation::resolve_entry(id, resolution, Utc::now(), &mut conn).await?;
        Ok(entry)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `MKT_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Creates the database file if it does not exist yet, and brings the schema up to date.
    pub async fn create_and_migrate(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        if !Sqlite::database_exists(url).await? {
            info!("🗃️ Creating database {url}");
            Sqlite::create_database(url).await?;
        }
        let db = Self::new_with_url(url, max_connections).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
