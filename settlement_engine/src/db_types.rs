//! Data types that are persisted by the settlement engine backends.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use mkt_common::{Cents, Currency, Money};
use mkt_common::MoneyError;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new<S: Into<String>>(value: S) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(OrderId, "The marketplace's identifier for a checkout. Opaque to the engine.");
string_id!(UserId, "A buyer, seller or administrator identifier supplied by the authentication layer.");
string_id!(ProductId, "A catalog product identifier.");

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusType {
    /// The checkout reached "awaiting payment". No confirmed payment has been recorded yet.
    Pending,
    /// The gateway confirmed the payment and the transaction has been written.
    Paid,
    /// The seller has dispatched the goods.
    Shipped,
    /// The buyer has confirmed receipt.
    Delivered,
    /// Terminal. The order will not be fulfilled.
    Cancelled,
    /// One of the parties has raised a dispute that an administrator needs to resolve.
    Disputed,
}

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 6] = [
        OrderStatusType::Pending,
        OrderStatusType::Paid,
        OrderStatusType::Shipped,
        OrderStatusType::Delivered,
        OrderStatusType::Cancelled,
        OrderStatusType::Disputed,
    ];

    /// The statuses that may directly follow this one.
    pub fn allowed_targets(&self) -> &'static [OrderStatusType] {
        use OrderStatusType::*;
        match self {
            Pending => &[Paid, Cancelled],
            Paid => &[Shipped, Cancelled, Disputed],
            Shipped => &[Delivered, Disputed],
            Delivered => &[Disputed],
            Disputed => &[Cancelled, Delivered],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatusType) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatusType::Pending => "pending",
            OrderStatusType::Paid => "paid",
            OrderStatusType::Shipped => "shipped",
            OrderStatusType::Delivered => "delivered",
            OrderStatusType::Cancelled => "cancelled",
            OrderStatusType::Disputed => "disputed",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatusType::ALL
            .iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| ConversionError(format!("Invalid order status: {s}")))
    }
}

//--------------------------------------    EarningsStatus     ---------------------------------------------------------
/// The payout state of the seller earnings attached to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EarningsStatus {
    /// Paid, but the goods have not been delivered yet.
    None,
    /// Delivered. Waiting out the hold period.
    Pending,
    /// Withdrawable.
    Ready,
    Processing,
    /// Covered by a completed payout.
    Completed,
    /// The order was cancelled before the earnings were paid out.
    Cancelled,
}

impl EarningsStatus {
    /// Earnings in these states count towards the seller's withdrawable balance.
    pub fn is_earned(&self) -> bool {
        matches!(self, EarningsStatus::Ready | EarningsStatus::Processing | EarningsStatus::Completed)
    }
}

impl Display for EarningsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EarningsStatus::None => "none",
            EarningsStatus::Pending => "pending",
            EarningsStatus::Ready => "ready",
            EarningsStatus::Processing => "processing",
            EarningsStatus::Completed => "completed",
            EarningsStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

//--------------------------------------     PayoutStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn can_transition_to(&self, target: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!((self, target), (Pending, Processing) | (Processing, Completed) | (Pending | Processing, Failed))
    }

    /// Payouts in these states reduce the seller's withdrawable balance.
    pub fn is_committed(&self) -> bool {
        !matches!(self, PayoutStatus::Failed)
    }
}

impl Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for PayoutStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ConversionError(format!("Invalid payout status: {s}"))),
        }
    }
}

//--------------------------------------     PayoutMethod      ---------------------------------------------------------
/// Where a seller wants their money sent. The payload format of each variant is checked by
/// [`crate::helpers::validate_payout_method`] before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutMethod {
    BankTransfer { iban: String },
    Wallet { handle: String },
    Card { reference: String },
}

impl PayoutMethod {
    pub fn kind(&self) -> &'static str {
        match self {
            PayoutMethod::BankTransfer { .. } => "bank_transfer",
            PayoutMethod::Wallet { .. } => "wallet",
            PayoutMethod::Card { .. } => "card",
        }
    }
}

impl Display for PayoutMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutMethod::BankTransfer { iban } => {
                let tail = iban.get(iban.len().saturating_sub(4)..).unwrap_or_default();
                write!(f, "bank transfer (…{tail})")
            },
            PayoutMethod::Wallet { handle } => write!(f, "wallet ({handle})"),
            PayoutMethod::Card { .. } => write!(f, "card"),
        }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub product_id: ProductId,
    /// The listed price of the product. The seller's earnings.
    pub product_price: Cents,
    pub total_amount: Cents,
    pub shipping_cost: Cents,
    pub service_fee: Cents,
    pub tax_amount: Cents,
    pub currency: Currency,
    pub status: OrderStatusType,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub buyer_rated: bool,
    pub seller_rated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn total(&self) -> Money {
        Money::new(self.total_amount, self.currency.clone())
    }

    pub fn price(&self) -> Money {
        Money::new(self.product_price, self.currency.clone())
    }

    pub fn is_party(&self, user: &UserId) -> bool {
        &self.buyer_id == user || &self.seller_id == user
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
/// A buyer's checkout intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub product_id: ProductId,
    /// The listed product price. Fees, shipping and tax are added by the engine.
    pub price: Money,
}

impl NewOrder {
    pub fn new<O, B, S, P>(order_id: O, buyer_id: B, seller_id: S, product_id: P, price: Money) -> Self
    where
        O: Into<OrderId>,
        B: Into<UserId>,
        S: Into<UserId>,
        P: Into<ProductId>,
    {
        Self {
            order_id: order_id.into(),
            buyer_id: buyer_id.into(),
            seller_id: seller_id.into(),
            product_id: product_id.into(),
            price,
        }
    }

    /// True if `order` was created from an identical checkout intent.
    pub fn is_equivalent(&self, order: &Order) -> bool {
        self.order_id == order.order_id &&
            self.buyer_id == order.buyer_id &&
            self.seller_id == order.seller_id &&
            self.product_id == order.product_id &&
            self.price == order.price()
    }
}

//--------------------------------------     Transaction       ---------------------------------------------------------
/// The ledger record of a confirmed payment. Everything except `payout_status` is immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub order_id: OrderId,
    /// The gateway's identifier for the payment. Unique, and the idempotency key for settlement.
    pub gateway_reference: String,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub amount_total: Cents,
    /// The platform's share: service fee plus tax.
    pub commission_amount: Cents,
    pub seller_earnings: Cents,
    pub shipping_cost: Cents,
    pub tax_amount: Cents,
    pub currency: Currency,
    pub payout_status: EarningsStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Checks `amount_total == commission_amount + seller_earnings + shipping_cost`, allowing a one cent difference.
    pub fn is_balanced(&self) -> bool {
        imbalance(self.amount_total, self.commission_amount, self.seller_earnings, self.shipping_cost)
            .is_ok_and(|d| d <= Cents::from(1))
    }
}

/// How far `total` is from `commission + earnings + shipping`.
pub(crate) fn imbalance(
    total: Cents,
    commission: Cents,
    earnings: Cents,
    shipping: Cents,
) -> Result<Cents, MoneyError> {
    commission.checked_add(earnings)?.checked_add(shipping)?.abs_diff(total)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub order_id: OrderId,
    pub gateway_reference: String,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub product_id: ProductId,
    pub amount_total: Cents,
    pub commission_amount: Cents,
    pub seller_earnings: Cents,
    pub shipping_cost: Cents,
    pub tax_amount: Cents,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    pub fn imbalance(&self) -> Result<Cents, MoneyError> {
        imbalance(self.amount_total, self.commission_amount, self.seller_earnings, self.shipping_cost)
    }
}

//--------------------------------------        Payout         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: i64,
    pub seller_id: UserId,
    pub amount: Cents,
    pub currency: Currency,
    pub method: PayoutMethod,
    pub status: PayoutStatus,
    pub notes: Option<String>,
    pub processed_by: Option<UserId>,
    pub gateway_reference: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayout {
    pub seller_id: UserId,
    pub amount: Money,
    pub method: PayoutMethod,
    pub notes: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// The changes applied when a payout moves to a new status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutUpdate {
    pub status: PayoutStatus,
    pub processed_by: Option<UserId>,
    pub notes: Option<String>,
    pub gateway_reference: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PayoutUpdate {
    pub fn new(status: PayoutStatus) -> Self {
        Self { status, processed_by: None, notes: None, gateway_reference: None, timestamp: Utc::now() }
    }

    pub fn with_processed_by(mut self, admin: UserId) -> Self {
        self.processed_by = Some(admin);
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_gateway_reference(mut self, reference: String) -> Self {
        self.gateway_reference = Some(reference);
        self
    }
}

//--------------------------------------  SellerPayoutMethod   ---------------------------------------------------------
/// The payout method used for a seller's scheduled payouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerPayoutMethod {
    pub seller_id: UserId,
    pub method: PayoutMethod,
    pub updated_at: DateTime<Utc>,
}

//-------------------------------------- ReconciliationEntry   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SettlementEventKind {
    PaymentConfirmed,
    PaymentFailed,
}

impl Display for SettlementEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementEventKind::PaymentConfirmed => f.write_str("payment_confirmed"),
            SettlementEventKind::PaymentFailed => f.write_str("payment_failed"),
        }
    }
}

/// A settlement event that could not be applied and is waiting for an operator.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    pub id: i64,
    pub gateway_reference: String,
    pub order_id: OrderId,
    pub event_kind: SettlementEventKind,
    /// The event as received, serialised to JSON.
    pub payload: String,
    pub reason: String,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReconciliationEntry {
    pub gateway_reference: String,
    pub order_id: OrderId,
    pub event_kind: SettlementEventKind,
    pub payload: String,
    pub reason: String,
}
