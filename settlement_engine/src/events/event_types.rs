use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, ProductId, Transaction, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}

/// Order lifecycle events. Notification subscribers deliver these to both parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    OrderPaid { order: Order, transaction: Transaction },
    OrderShipped { order: Order, tracking_number: Option<String> },
    OrderDelivered { order: Order },
    OrderCancelled { order: Order, reason: Option<String> },
    OrderDisputed { order: Order, reason: Option<String> },
}

impl OrderEvent {
    pub fn order(&self) -> &Order {
        match self {
            OrderEvent::OrderPaid { order, .. } |
            OrderEvent::OrderShipped { order, .. } |
            OrderEvent::OrderDelivered { order } |
            OrderEvent::OrderCancelled { order, .. } |
            OrderEvent::OrderDisputed { order, .. } => order,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::OrderPaid { .. } => "OrderPaid",
            OrderEvent::OrderShipped { .. } => "OrderShipped",
            OrderEvent::OrderDelivered { .. } => "OrderDelivered",
            OrderEvent::OrderCancelled { .. } => "OrderCancelled",
            OrderEvent::OrderDisputed { .. } => "OrderDisputed",
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            OrderEvent::OrderDisputed { .. } => Priority::High,
            _ => Priority::Normal,
        }
    }

    /// The users who should hear about this event.
    pub fn recipients(&self) -> [&UserId; 2] {
        let order = self.order();
        [&order.buyer_id, &order.seller_id]
    }
}

/// A product was sold (`reserved == true`) or made available again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationChangedEvent {
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub reserved: bool,
}

/// Something needs a human: a dispute, or a cancellation whose earnings were already paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminEscalationEvent {
    pub order_id: OrderId,
    pub reason: String,
    pub raised_at: DateTime<Utc>,
}

impl AdminEscalationEvent {
    pub fn new<S: Into<String>>(order_id: OrderId, reason: S) -> Self {
        Self { order_id, reason: reason.into(), raised_at: Utc::now() }
    }
}

/// The closed set of side effects the engine can request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    ProductReservationChanged(ReservationChangedEvent),
    AdminEscalation(AdminEscalationEvent),
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::Order(e) => e.name(),
            DomainEvent::ProductReservationChanged(_) => "ProductReservationChanged",
            DomainEvent::AdminEscalation(_) => "AdminEscalation",
        }
    }
}

impl From<OrderEvent> for DomainEvent {
    fn from(e: OrderEvent) -> Self {
        DomainEvent::Order(e)
    }
}

impl From<ReservationChangedEvent> for DomainEvent {
    fn from(e: ReservationChangedEvent) -> Self {
        DomainEvent::ProductReservationChanged(e)
    }
}

impl From<AdminEscalationEvent> for DomainEvent {
    fn from(e: AdminEscalationEvent) -> Self {
        DomainEvent::AdminEscalation(e)
    }
}
