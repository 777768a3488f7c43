//! Request and response bodies.
//!
//! Amounts travel as decimal strings, e.g. `"110.70"`. The currency may be left out, in which case the server's
//! configured currency is assumed.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use mkt_common::{Cents, Currency, Money};
use serde::{Deserialize, Serialize};
use settlement_engine::{
    db_types::{NewOrder, OrderId, OrderStatusType, PayoutMethod, ProductId, Transaction, UserId},
    order_objects::OrderQueryFilter,
    payment_objects::{PaymentConfirmed, SettlementResult},
};

use crate::errors::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

fn to_money(amount: &str, currency: Option<&str>, default_currency: &Currency) -> Result<Money, ServerError> {
    let cents = amount.parse::<Cents>().map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let currency = match currency {
        Some(c) => Currency::new(c).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?,
        None => default_currency.clone(),
    };
    Ok(Money::new(cents, currency))
}

/// The gateway's payment confirmation, as posted to `/settlement/confirm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmationParams {
    pub gateway_reference: String,
    pub order_id: OrderId,
    pub amount: String,
    #[serde(default)]
    pub currency: Option<String>,
}

impl PaymentConfirmationParams {
    pub fn into_event(self, default_currency: &Currency) -> Result<PaymentConfirmed, ServerError> {
        let amount = to_money(&self.amount, self.currency.as_deref(), default_currency)?;
        Ok(PaymentConfirmed::new(self.gateway_reference, self.order_id, amount))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResponse {
    pub order_id: OrderId,
    pub status: String,
    pub duplicate: bool,
    pub transaction: Transaction,
}

impl From<SettlementResult> for SettlementResponse {
    fn from(result: SettlementResult) -> Self {
        Self {
            order_id: result.order.order_id,
            status: result.order.status.to_string(),
            duplicate: result.duplicate,
            transaction: result.transaction,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutParams {
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub product_id: ProductId,
    pub price: String,
    #[serde(default)]
    pub currency: Option<String>,
}

impl CheckoutParams {
    pub fn into_new_order(self, default_currency: &Currency) -> Result<NewOrder, ServerError> {
        let price = to_money(&self.price, self.currency.as_deref(), default_currency)?;
        Ok(NewOrder::new(self.order_id, self.buyer_id, self.seller_id, self.product_id, price))
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Which side of their orders a user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buyer,
    Seller,
}

/// Query string for `GET /orders`. Without a `role`, both purchases and sales are returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListQuery {
    pub role: Option<OrderSide>,
    pub status: Option<OrderStatusType>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl OrderListQuery {
    /// The search for `user`'s orders. Page sizes are capped at [`MAX_PAGE_SIZE`].
    pub fn into_filter(self, user: UserId) -> OrderQueryFilter {
        let filter = match self.role {
            Some(OrderSide::Buyer) => OrderQueryFilter::default().with_buyer_id(user),
            Some(OrderSide::Seller) => OrderQueryFilter::default().with_seller_id(user),
            None => OrderQueryFilter::default().with_party(user),
        };
        let filter = match self.status {
            Some(status) => filter.with_status(status),
            None => filter,
        };
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        filter.with_page(Some(limit), self.offset)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequestParams {
    pub amount: String,
    #[serde(default)]
    pub currency: Option<String>,
    /// Falls back to the seller's default payout method if left out.
    #[serde(default)]
    pub method: Option<PayoutMethod>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PayoutRequestParams {
    pub fn amount(&self, default_currency: &Currency) -> Result<Money, ServerError> {
        to_money(&self.amount, self.currency.as_deref(), default_currency)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveParams {
    pub resolution: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationQuery {
    #[serde(default)]
    pub include_resolved: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommissionQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}
