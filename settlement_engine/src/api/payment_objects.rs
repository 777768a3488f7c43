use mkt_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, Transaction};

/// The gateway's confirmation that a payment succeeded. Its signature has already been checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    pub gateway_reference: String,
    pub order_id: OrderId,
    pub amount: Money,
}

impl PaymentConfirmed {
    pub fn new<S: Into<String>, O: Into<OrderId>>(gateway_reference: S, order_id: O, amount: Money) -> Self {
        Self { gateway_reference: gateway_reference.into(), order_id: order_id.into(), amount }
    }
}

/// The gateway's notice that a payment failed or was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub gateway_reference: String,
    pub order_id: OrderId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub transaction: Transaction,
    pub order: Order,
    /// True if the payment had already been settled by an earlier delivery of the same event.
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentFailedOutcome {
    /// The order was pending and has been cancelled.
    Cancelled(Order),
    /// The order had already been cancelled. Nothing changed.
    AlreadyCancelled(Order),
}

impl PaymentFailedOutcome {
    pub fn order(&self) -> &Order {
        match self {
            PaymentFailedOutcome::Cancelled(o) | PaymentFailedOutcome::AlreadyCancelled(o) => o,
        }
    }
}
