use chrono::{DateTime, Utc};
use log::trace;
use mkt_common::{Cents, Currency};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewTransaction, OrderId, Transaction, UserId},
    traits::CommissionReport,
};

/// Earnings in these states count towards a seller's withdrawable balance.
pub(crate) const EARNED_STATUSES: &str = "('ready', 'processing', 'completed')";

/// Inserts a new transaction. This fails with a unique violation if the gateway reference or the order has already
/// been recorded, and the caller is expected to handle that case.
pub async fn insert_transaction(
    transaction: &NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO transactions (
                order_id,
                gateway_reference,
                buyer_id,
                seller_id,
                amount_total,
                commission_amount,
                seller_earnings,
                shipping_cost,
                tax_amount,
                currency,
                payout_status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'none', $11, $11)
            RETURNING *;
        "#,
    )
    .bind(transaction.order_id.as_str())
    .bind(&transaction.gateway_reference)
    .bind(transaction.buyer_id.as_str())
    .bind(transaction.seller_id.as_str())
    .bind(transaction.amount_total)
    .bind(transaction.commission_amount)
    .bind(transaction.seller_earnings)
    .bind(transaction.shipping_cost)
    .bind(transaction.tax_amount)
    .bind(transaction.currency.as_str())
    .bind(transaction.created_at)
    .fetch_one(conn)
    .await
}

pub async fn fetch_by_reference(reference: &str, conn: &mut SqliteConnection) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transactions WHERE gateway_reference = $1").bind(reference).fetch_optional(conn).await
}

pub async fn fetch_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transactions WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await
}

pub async fn fetch_for_seller(seller_id: &UserId, conn: &mut SqliteConnection) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transactions WHERE seller_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(seller_id.as_str())
        .fetch_all(conn)
        .await
}

pub async fn mark_payout_eligible(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE transactions SET payout_status = 'pending', updated_at = $2 WHERE order_id = $1 AND payout_status = \
         'none' RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(now)
    .fetch_optional(conn)
    .await
}

/// Cancels the order's earnings in a single conditional statement.
///
/// Earnings that have not been released (`none`, `pending`) are always cancelled. Released earnings (`ready`,
/// `processing`) are cancelled only if the seller's withdrawable balance still covers them. Completed earnings are
/// never touched. Returns `None` if nothing was updated.
pub async fn cancel_earnings(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE transactions SET payout_status = 'cancelled', updated_at = $2
        WHERE order_id = $1 AND (
            payout_status IN ('none', 'pending') OR (
                payout_status IN ('ready', 'processing') AND seller_earnings <= (
                    (SELECT COALESCE(SUM(t.seller_earnings), 0) FROM transactions t
                        WHERE t.seller_id = transactions.seller_id AND t.currency = transactions.currency
                        AND t.payout_status IN {EARNED_STATUSES})
                    -
                    (SELECT COALESCE(SUM(p.amount), 0) FROM payouts p
                        WHERE p.seller_id = transactions.seller_id AND p.currency = transactions.currency
                        AND p.status IN ('pending', 'processing', 'completed'))
                )
            )
        )
        RETURNING *"#
    );
    sqlx::query_as(&sql).bind(order_id.as_str()).bind(now).fetch_optional(conn).await
}

/// Releases the earnings of orders delivered at or before `delivered_before`.
pub async fn release_matured_earnings(
    delivered_before: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let released = sqlx::query_as(
        r#"
        UPDATE transactions SET payout_status = 'ready', updated_at = $2
        WHERE payout_status IN ('none', 'pending') AND order_id IN (
            SELECT order_id FROM orders
            WHERE status = 'delivered' AND delivered_at IS NOT NULL AND delivered_at <= $1
        )
        RETURNING *"#,
    )
    .bind(delivered_before)
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(released)
}

/// The seller's `ready` earnings, oldest first.
pub async fn fetch_ready_for_seller(
    seller_id: &UserId,
    currency: &Currency,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM transactions WHERE seller_id = $1 AND currency = $2 AND payout_status = 'ready' ORDER BY \
         created_at ASC, id ASC",
    )
    .bind(seller_id.as_str())
    .bind(currency.as_str())
    .fetch_all(conn)
    .await
}

pub async fn completed_earnings(
    seller_id: &UserId,
    currency: &Currency,
    conn: &mut SqliteConnection,
) -> Result<Cents, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(seller_earnings), 0) FROM transactions WHERE seller_id = $1 AND currency = $2 AND \
         payout_status = 'completed'",
    )
    .bind(seller_id.as_str())
    .bind(currency.as_str())
    .fetch_one(conn)
    .await?;
    Ok(Cents::from(total))
}

pub async fn mark_completed(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE transactions SET payout_status = 'completed', updated_at = $2 WHERE id = $1")
        .bind(id)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

#[derive(FromRow)]
struct CommissionTotals {
    transaction_count: i64,
    gross_volume: i64,
    total_commission: i64,
    tax_collected: i64,
    shipping_collected: i64,
    seller_earnings: i64,
}

pub async fn commission_report(
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    currency: &Currency,
    conn: &mut SqliteConnection,
) -> Result<CommissionReport, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        r#"SELECT
            COUNT(*) AS transaction_count,
            COALESCE(SUM(amount_total), 0) AS gross_volume,
            COALESCE(SUM(commission_amount), 0) AS total_commission,
            COALESCE(SUM(tax_amount), 0) AS tax_collected,
            COALESCE(SUM(shipping_cost), 0) AS shipping_collected,
            COALESCE(SUM(seller_earnings), 0) AS seller_earnings
        FROM transactions WHERE payout_status <> 'cancelled' AND currency = "#,
    );
    builder.push_bind(currency.as_str());
    if let Some(since) = since {
        builder.push(" AND created_at >= ");
        builder.push_bind(since);
    }
    if let Some(until) = until {
        builder.push(" AND created_at <= ");
        builder.push_bind(until);
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let totals = builder.build_query_as::<CommissionTotals>().fetch_one(conn).await?;
    Ok(CommissionReport {
        since,
        until,
        currency: currency.clone(),
        transaction_count: totals.transaction_count,
        gross_volume: Cents::from(totals.gross_volume),
        total_commission: Cents::from(totals.total_commission),
        tax_collected: Cents::from(totals.tax_collected),
        shipping_collected: Cents::from(totals.shipping_collected),
        seller_earnings: Cents::from(totals.seller_earnings),
    })
}
