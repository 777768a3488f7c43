use chrono::{DateTime, Utc};
use log::{debug, trace};
use mkt_common::Cents;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::{
    commission::CommissionBreakdown,
    db_types::{NewOrder, Order, OrderId, OrderStatusType, ProductId, UserId},
    order_objects::{OrderQueryFilter, OrderStats, OrderStatusUpdate},
};

/// Inserts the order, unless one with the same `order_id` exists. Returns the inserted order, or `None` if it
/// already existed.
///
/// The insert is the first statement issued, so when this is called inside a transaction, the write lock is taken
/// before anything is read.
pub async fn insert_if_absent(
    order: &NewOrder,
    breakdown: &CommissionBreakdown,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                buyer_id,
                seller_id,
                product_id,
                product_price,
                total_amount,
                shipping_cost,
                service_fee,
                tax_amount,
                currency,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11, $11)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(order.buyer_id.as_str())
    .bind(order.seller_id.as_str())
    .bind(order.product_id.as_str())
    .bind(breakdown.product_price)
    .bind(breakdown.total_amount)
    .bind(breakdown.shipping_cost)
    .bind(breakdown.service_fee)
    .bind(breakdown.tax_amount)
    .bind(breakdown.currency.as_str())
    .bind(created_at)
    .fetch_optional(conn)
    .await?;
    if let Some(o) = &order {
        debug!("🗃️ Order [{}] inserted with id {}", o.order_id, o.id);
    }
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at`, newest first
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.0);
    }
    if let Some(buyer_id) = query.buyer_id {
        where_clause.push("buyer_id = ");
        where_clause.push_bind_unseparated(buyer_id.0);
    }
    if let Some(seller_id) = query.seller_id {
        where_clause.push("seller_id = ");
        where_clause.push_bind_unseparated(seller_id.0);
    }
    if let Some(party) = query.party {
        where_clause.push("(buyer_id = ");
        where_clause.push_bind_unseparated(party.0.clone());
        where_clause.push_unseparated(" OR seller_id = ");
        where_clause.push_bind_unseparated(party.0);
        where_clause.push_unseparated(")");
    }
    if let Some(product_id) = query.product_id {
        where_clause.push("product_id = ");
        where_clause.push_bind_unseparated(product_id.0);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        for (i, status) in statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at DESC, id DESC");
    if query.limit.is_some() || query.offset.is_some() {
        // SQLite only accepts OFFSET after a LIMIT. -1 means no limit.
        builder.push(" LIMIT ");
        builder.push_bind(query.limit.map(i64::from).unwrap_or(-1));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(query.offset.unwrap_or(0)));
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {}", orders.len());
    Ok(orders)
}

pub async fn order_stats(user_id: &UserId, conn: &mut SqliteConnection) -> Result<OrderStats, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT 'buyer' AS side, status, COUNT(*) AS orders, COALESCE(SUM(total_amount), 0) AS value
        FROM orders WHERE buyer_id = $1 GROUP BY status
        UNION ALL
        SELECT 'seller' AS side, status, COUNT(*) AS orders, COALESCE(SUM(total_amount), 0) AS value
        FROM orders WHERE seller_id = $1 GROUP BY status
        "#,
    )
    .bind(user_id.as_str())
    .fetch_all(conn)
    .await?;
    let mut stats = OrderStats::new(user_id.clone());
    for row in rows {
        let side: String = row.try_get("side")?;
        let status: OrderStatusType = row.try_get("status")?;
        let count: i64 = row.try_get("orders")?;
        let value: i64 = row.try_get("value")?;
        let counts = if side == "buyer" { &mut stats.purchases } else { &mut stats.sales };
        counts.add(status, u64::try_from(count).unwrap_or_default(), Cents::from(value));
    }
    trace!("🗃️ Order stats for {user_id}: {stats:?}");
    Ok(stats)
}

/// Moves the order from `expected` to `update.new_status` if, and only if, it is still in the `expected` state.
///
/// The timestamp column belonging to the new status is written only if it is empty, so a status that is entered more
/// than once (e.g. a second dispute) keeps its first timestamp.
pub async fn update_order_status(
    order_id: &OrderId,
    expected: OrderStatusType,
    update: &OrderStatusUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET status = ");
    builder.push_bind(update.new_status);
    builder.push(", updated_at = ");
    builder.push_bind(update.timestamp);
    let timestamp_column = match update.new_status {
        OrderStatusType::Pending => None,
        OrderStatusType::Paid => Some("paid_at"),
        OrderStatusType::Shipped => Some("shipped_at"),
        OrderStatusType::Delivered => Some("delivered_at"),
        OrderStatusType::Cancelled => Some("cancelled_at"),
        OrderStatusType::Disputed => Some("disputed_at"),
    };
    if let Some(column) = timestamp_column {
        builder.push(format!(", {column} = COALESCE({column}, "));
        builder.push_bind(update.timestamp);
        builder.push(")");
    }
    if let Some(tracking_number) = &update.tracking_number {
        builder.push(", tracking_number = ");
        builder.push_bind(tracking_number.clone());
    }
    if let Some(notes) = &update.notes {
        builder.push(", notes = ");
        builder.push_bind(notes.clone());
    }
    builder.push(" WHERE order_id = ");
    builder.push_bind(order_id.as_str());
    builder.push(" AND status = ");
    builder.push_bind(expected);
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_product_sale(
    product_id: &ProductId,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderId>, sqlx::Error> {
    let order_id: Option<String> = sqlx::query_scalar("SELECT order_id FROM product_sales WHERE product_id = $1")
        .bind(product_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order_id.map(OrderId::from))
}

/// Records the product as sold. Fails with a unique violation if it has already been sold.
pub async fn insert_product_sale(
    product_id: &ProductId,
    order_id: &OrderId,
    sold_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO product_sales (product_id, order_id, sold_at) VALUES ($1, $2, $3)")
        .bind(product_id.as_str())
        .bind(order_id.as_str())
        .bind(sold_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn release_product(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<ProductId>, sqlx::Error> {
    let product: Option<String> = sqlx::query_scalar("DELETE FROM product_sales WHERE order_id = $1 RETURNING product_id")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(product.map(ProductId::from))
}
