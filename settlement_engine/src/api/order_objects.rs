use std::fmt::Display;

use chrono::{DateTime, Utc};
use mkt_common::Cents;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Order, OrderId, OrderStatusType, ProductId, UserId},
    events::DomainEvent,
};

//--------------------------------------         Role          ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A marketplace user. Their rights on an order depend on whether they are its buyer or seller.
    User,
    /// Marketplace staff. Can resolve disputes and manage payouts.
    Admin,
    /// The engine itself, acting on gateway events.
    System,
}

/// Whoever is asking for a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn user<U: Into<UserId>>(id: U) -> Self {
        Self { id: id.into(), role: Role::User }
    }

    pub fn admin<U: Into<UserId>>(id: U) -> Self {
        Self { id: id.into(), role: Role::Admin }
    }

    pub fn system() -> Self {
        Self { id: UserId::from("system"), role: Role::System }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.role {
            Role::User => write!(f, "{}", self.id),
            Role::Admin => write!(f, "{} (admin)", self.id),
            Role::System => write!(f, "system"),
        }
    }
}

//--------------------------------------  TransitionRequest    ---------------------------------------------------------
/// A request to move an order to a new status, with the optional details that accompany some transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target_status: OrderStatusType,
    /// Accompanies `shipped`.
    #[serde(default)]
    pub tracking_number: Option<String>,
    /// The reason for a cancellation or dispute.
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransitionRequest {
    pub fn new(target_status: OrderStatusType) -> Self {
        Self { target_status, tracking_number: None, notes: None }
    }

    pub fn with_tracking_number<S: Into<String>>(mut self, tracking_number: S) -> Self {
        self.tracking_number = Some(tracking_number.into());
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// The columns written by a single status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatusUpdate {
    pub new_status: OrderStatusType,
    pub timestamp: DateTime<Utc>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
}

impl OrderStatusUpdate {
    pub fn new(new_status: OrderStatusType, timestamp: DateTime<Utc>) -> Self {
        Self { new_status, timestamp, tracking_number: None, notes: None }
    }

    pub fn from_request(request: &TransitionRequest, timestamp: DateTime<Utc>) -> Self {
        Self {
            new_status: request.target_status,
            timestamp,
            tracking_number: request.tracking_number.clone(),
            notes: request.notes.clone(),
        }
    }
}

/// The outcome of a successful transition: the order as stored, and the domain events the transition produced.
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub previous_status: OrderStatusType,
    pub order: Order,
    pub events: Vec<DomainEvent>,
}

//--------------------------------------  OrderQueryFilter     ---------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub buyer_id: Option<UserId>,
    pub seller_id: Option<UserId>,
    /// Matches orders where the user is either the buyer or the seller.
    pub party: Option<UserId>,
    pub product_id: Option<ProductId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl OrderQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_buyer_id(mut self, buyer_id: UserId) -> Self {
        self.buyer_id = Some(buyer_id);
        self
    }

    pub fn with_seller_id(mut self, seller_id: UserId) -> Self {
        self.seller_id = Some(seller_id);
        self
    }

    pub fn with_party(mut self, user: UserId) -> Self {
        self.party = Some(user);
        self
    }

    pub fn with_product_id(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_page(mut self, limit: Option<u32>, offset: Option<u32>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// True if the filter matches every order. Paging is not a filter.
    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() &&
            self.buyer_id.is_none() &&
            self.seller_id.is_none() &&
            self.party.is_none() &&
            self.product_id.is_none() &&
            self.since.is_none() &&
            self.until.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(order_id) = &self.order_id {
            write!(f, "order_id: {order_id}. ")?;
        }
        if let Some(buyer_id) = &self.buyer_id {
            write!(f, "buyer_id: {buyer_id}. ")?;
        }
        if let Some(seller_id) = &self.seller_id {
            write!(f, "seller_id: {seller_id}. ")?;
        }
        if let Some(party) = &self.party {
            write!(f, "party: {party}. ")?;
        }
        if let Some(product_id) = &self.product_id {
            write!(f, "product_id: {product_id}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        Ok(())
    }
}

//--------------------------------------      OrderStats       ---------------------------------------------------------
/// Order counts, by status, for one side of a user's trading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCounts {
    pub total: u64,
    pub pending: u64,
    pub paid: u64,
    pub shipped: u64,
    pub delivered: u64,
    pub cancelled: u64,
    pub disputed: u64,
    /// Sum of the order totals, leaving out cancelled orders.
    pub total_value: Cents,
}

impl OrderCounts {
    pub fn add(&mut self, status: OrderStatusType, count: u64, value: Cents) {
        self.total += count;
        let bucket = match status {
            OrderStatusType::Pending => &mut self.pending,
            OrderStatusType::Paid => &mut self.paid,
            OrderStatusType::Shipped => &mut self.shipped,
            OrderStatusType::Delivered => &mut self.delivered,
            OrderStatusType::Cancelled => &mut self.cancelled,
            OrderStatusType::Disputed => &mut self.disputed,
        };
        *bucket += count;
        if status != OrderStatusType::Cancelled {
            self.total_value += value;
        }
    }
}

/// A user's dashboard summary: what they bought and what they sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub user_id: UserId,
    pub purchases: OrderCounts,
    pub sales: OrderCounts,
}

impl OrderStats {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, purchases: OrderCounts::default(), sales: OrderCounts::default() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filter_display() {
        let filter = OrderQueryFilter::default();
        assert!(filter.is_empty());
        assert_eq!(filter.to_string(), "No filters.");
        let filter = OrderQueryFilter::default()
            .with_party(UserId::from("alice"))
            .with_status(OrderStatusType::Paid)
            .with_status(OrderStatusType::Shipped);
        assert!(!filter.is_empty());
        assert_eq!(filter.to_string(), "party: alice. statuses: [paid,shipped]. ");
        assert!(OrderQueryFilter::default().with_page(Some(10), None).is_empty());
    }

    #[test]
    fn cancelled_orders_do_not_count_towards_the_value() {
        let mut counts = OrderCounts::default();
        counts.add(OrderStatusType::Paid, 2, Cents::from(20_000));
        counts.add(OrderStatusType::Cancelled, 1, Cents::from(5_000));
        counts.add(OrderStatusType::Delivered, 1, Cents::from(1_000));
        assert_eq!(counts.total, 4);
        assert_eq!(counts.paid, 2);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.total_value, Cents::from(21_000));
    }

    #[test]
    fn transition_request_json() {
        let req: TransitionRequest = serde_json::from_str(r#"{"target_status":"shipped","tracking_number":"TRK1"}"#)
            .expect("valid request");
        assert_eq!(req, TransitionRequest::new(OrderStatusType::Shipped).with_tracking_number("TRK1"));
    }
}
