use chrono::{DateTime, Utc};
use log::{debug, trace};
use mkt_common::{Cents, Currency};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::transactions;
use crate::{
    db_types::{NewPayout, Payout, PayoutMethod, PayoutStatus, PayoutUpdate, SellerPayoutMethod, UserId},
    traits::EarningsSummary,
};

/// The seller's withdrawable balance as a scalar subquery. `seller` and `currency` are SQL expressions.
fn balance_subquery(seller: &str, currency: &str) -> String {
    format!(
        "((SELECT COALESCE(SUM(seller_earnings), 0) FROM transactions WHERE seller_id = {seller} AND currency = \
         {currency} AND payout_status IN {earned}) - (SELECT COALESCE(SUM(amount), 0) FROM payouts WHERE seller_id = \
         {seller} AND currency = {currency} AND status IN ('pending', 'processing', 'completed')))",
        earned = transactions::EARNED_STATUSES
    )
}

fn decode_method(index: &str, raw: &str) -> Result<PayoutMethod, sqlx::Error> {
    serde_json::from_str(raw).map_err(|e| sqlx::Error::ColumnDecode { index: index.to_string(), source: Box::new(e) })
}

fn encode_method(method: &PayoutMethod) -> Result<String, sqlx::Error> {
    serde_json::to_string(method).map_err(|e| sqlx::Error::Protocol(format!("Could not encode the payout method. {e}")))
}

impl<'r> FromRow<'r, SqliteRow> for Payout {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let method: String = row.try_get("method")?;
        Ok(Self {
            id: row.try_get("id")?,
            seller_id: row.try_get("seller_id")?,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            method: decode_method("method", &method)?,
            status: row.try_get("status")?,
            notes: row.try_get("notes")?,
            processed_by: row.try_get("processed_by")?,
            gateway_reference: row.try_get("gateway_reference")?,
            requested_at: row.try_get("requested_at")?,
            processed_at: row.try_get("processed_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for SellerPayoutMethod {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let method: String = row.try_get("method")?;
        Ok(Self {
            seller_id: row.try_get("seller_id")?,
            method: decode_method("method", &method)?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

pub async fn withdrawable_balance(
    seller_id: &UserId,
    currency: &Currency,
    conn: &mut SqliteConnection,
) -> Result<Cents, sqlx::Error> {
    let sql = format!("SELECT {}", balance_subquery("$1", "$2"));
    let balance: i64 = sqlx::query_scalar(&sql).bind(seller_id.as_str()).bind(currency.as_str()).fetch_one(conn).await?;
    Ok(Cents::from(balance))
}

/// Inserts the payout only if the seller's balance covers it. Returns `None` if it did not.
pub async fn insert_if_funded(payout: &NewPayout, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let method = encode_method(&payout.method)?;
    let sql = format!(
        r#"INSERT INTO payouts (seller_id, amount, currency, method, status, notes, requested_at)
        SELECT $1, $2, $3, $4, 'pending', $5, $6
        WHERE $2 <= {}
        RETURNING *"#,
        balance_subquery("$1", "$3")
    );
    trace!("🗃️ Executing query: {sql}");
    sqlx::query_as(&sql)
        .bind(payout.seller_id.as_str())
        .bind(payout.amount.amount)
        .bind(payout.amount.currency.as_str())
        .bind(method)
        .bind(payout.notes.as_deref())
        .bind(payout.requested_at)
        .fetch_optional(conn)
        .await
}

/// Compare-and-swap on the payout status. `processed_at` is set on the first move out of `pending`, and
/// `completed_at` when the payout reaches a terminal state.
pub async fn update_status(
    id: i64,
    expected: PayoutStatus,
    update: &PayoutUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, sqlx::Error> {
    sqlx::query_as(
        r#"UPDATE payouts SET
            status = $3,
            processed_by = COALESCE($4, processed_by),
            notes = COALESCE($5, notes),
            gateway_reference = COALESCE($6, gateway_reference),
            processed_at = COALESCE(processed_at, $7),
            completed_at = CASE WHEN $3 IN ('completed', 'failed') THEN $7 ELSE completed_at END
        WHERE id = $1 AND status = $2
        RETURNING *"#,
    )
    .bind(id)
    .bind(expected)
    .bind(update.status)
    .bind(update.processed_by.as_ref().map(|u| u.as_str()))
    .bind(update.notes.as_deref())
    .bind(update.gateway_reference.as_deref())
    .bind(update.timestamp)
    .fetch_optional(conn)
    .await
}

/// Marks the seller's oldest `ready` earnings as `completed` for as long as their completed payouts cover them.
pub async fn allocate_completed_payouts(
    seller_id: &UserId,
    currency: &Currency,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Cents, sqlx::Error> {
    let paid_out: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payouts WHERE seller_id = $1 AND currency = $2 AND status = 'completed'",
    )
    .bind(seller_id.as_str())
    .bind(currency.as_str())
    .fetch_one(&mut *conn)
    .await?;
    let paid_out = Cents::from(paid_out);
    let mut allocated = transactions::completed_earnings(seller_id, currency, conn).await?;
    let ready = transactions::fetch_ready_for_seller(seller_id, currency, conn).await?;
    let mut newly_allocated = Cents::default();
    for tx in ready {
        if allocated + tx.seller_earnings > paid_out {
            break;
        }
        transactions::mark_completed(tx.id, now, conn).await?;
        allocated += tx.seller_earnings;
        newly_allocated += tx.seller_earnings;
    }
    debug!("🗃️ Allocated {newly_allocated} of completed payouts against earnings for seller {seller_id}");
    Ok(newly_allocated)
}

pub async fn fetch_payout(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payouts WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_payouts_for_seller(seller_id: &UserId, conn: &mut SqliteConnection) -> Result<Vec<Payout>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payouts WHERE seller_id = $1 ORDER BY requested_at ASC, id ASC")
        .bind(seller_id.as_str())
        .fetch_all(conn)
        .await
}

pub async fn fetch_payouts_with_status(
    status: PayoutStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payout>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payouts WHERE status = $1 ORDER BY requested_at ASC, id ASC")
        .bind(status)
        .fetch_all(conn)
        .await
}

pub async fn upsert_payout_method(
    seller_id: &UserId,
    method: &PayoutMethod,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<SellerPayoutMethod, sqlx::Error> {
    let method = encode_method(method)?;
    sqlx::query_as(
        r#"INSERT INTO seller_payout_methods (seller_id, method, updated_at) VALUES ($1, $2, $3)
        ON CONFLICT (seller_id) DO UPDATE SET method = excluded.method, updated_at = excluded.updated_at
        RETURNING *"#,
    )
    .bind(seller_id.as_str())
    .bind(method)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_payout_method(
    seller_id: &UserId,
    conn: &mut SqliteConnection,
) -> Result<Option<SellerPayoutMethod>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM seller_payout_methods WHERE seller_id = $1")
        .bind(seller_id.as_str())
        .fetch_optional(conn)
        .await
}

pub async fn fetch_payout_methods(conn: &mut SqliteConnection) -> Result<Vec<SellerPayoutMethod>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM seller_payout_methods ORDER BY seller_id").fetch_all(conn).await
}

#[derive(FromRow)]
struct EarningsTotals {
    total_earnings: i64,
    pending: i64,
    earned: i64,
    committed: i64,
    in_flight: i64,
    total_paid_out: i64,
    last_payout_at: Option<DateTime<Utc>>,
}

pub async fn earnings_summary(
    seller_id: &UserId,
    currency: &Currency,
    conn: &mut SqliteConnection,
) -> Result<EarningsSummary, sqlx::Error> {
    let sql = format!(
        r#"SELECT
            (SELECT COALESCE(SUM(seller_earnings), 0) FROM transactions
                WHERE seller_id = $1 AND currency = $2 AND payout_status <> 'cancelled') AS total_earnings,
            (SELECT COALESCE(SUM(seller_earnings), 0) FROM transactions
                WHERE seller_id = $1 AND currency = $2 AND payout_status IN ('none', 'pending')) AS pending,
            (SELECT COALESCE(SUM(seller_earnings), 0) FROM transactions
                WHERE seller_id = $1 AND currency = $2 AND payout_status IN {earned}) AS earned,
            (SELECT COALESCE(SUM(amount), 0) FROM payouts
                WHERE seller_id = $1 AND currency = $2 AND status IN ('pending', 'processing', 'completed')) AS committed,
            (SELECT COALESCE(SUM(amount), 0) FROM payouts
                WHERE seller_id = $1 AND currency = $2 AND status IN ('pending', 'processing')) AS in_flight,
            (SELECT COALESCE(SUM(amount), 0) FROM payouts
                WHERE seller_id = $1 AND currency = $2 AND status = 'completed') AS total_paid_out,
            (SELECT MAX(completed_at) FROM payouts
                WHERE seller_id = $1 AND currency = $2 AND status = 'completed') AS last_payout_at"#,
        earned = transactions::EARNED_STATUSES
    );
    let totals: EarningsTotals =
        sqlx::query_as(&sql).bind(seller_id.as_str()).bind(currency.as_str()).fetch_one(conn).await?;
    Ok(EarningsSummary {
        seller_id: seller_id.clone(),
        currency: currency.clone(),
        total_earnings: Cents::from(totals.total_earnings),
        pending: Cents::from(totals.pending),
        withdrawable: Cents::from(totals.earned - totals.committed),
        in_flight: Cents::from(totals.in_flight),
        total_paid_out: Cents::from(totals.total_paid_out),
        last_payout_at: totals.last_payout_at,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn methods_are_stored_as_tagged_json() {
        let method = PayoutMethod::BankTransfer { iban: "DE89370400440532013000".into() };
        let stored = encode_method(&method).unwrap();
        assert!(stored.contains("DE89370400440532013000"));
        assert_eq!(decode_method("method", &stored).unwrap(), method);
        let err = decode_method("method", r#"{"Carrier":"pigeon"}"#).unwrap_err();
        assert!(matches!(err, sqlx::Error::ColumnDecode { .. }));
    }
}
