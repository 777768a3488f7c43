use std::time::Duration;

use mkt_common::MoneyError;
use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType},
    traits::StorageError,
};

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("{0} was not found")]
    NotFound(String),
    #[error("Cannot change the order status from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("{0}")]
    PermissionDenied(String),
    #[error("Payment amount mismatch. {0}")]
    AmountMismatch(String),
    #[error("Order {order_id} cannot be settled. {reason}")]
    StaleOrder { order_id: OrderId, reason: String },
    #[error("{0}")]
    ValidationError(String),
    #[error("The requested amount, {requested}, exceeds the withdrawable balance of {available}")]
    InsufficientBalance { requested: String, available: String },
    #[error("The requested amount, {requested}, is below the minimum payout of {minimum}")]
    BelowMinimum { requested: String, minimum: String },
    #[error("The payout gateway is unavailable. {0}")]
    GatewayUnavailable(String),
    #[error("The record was modified concurrently. {0}")]
    StorageConflict(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("The storage call did not complete within {0:?}. Its outcome is unknown.")]
    Timeout(Duration),
}

impl SettlementError {
    pub fn invalid_order_transition(from: OrderStatusType, to: OrderStatusType) -> Self {
        Self::InvalidTransition { from: from.to_string(), to: to.to_string() }
    }

    /// Transient errors may succeed if the same call is repeated.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SettlementError::StorageConflict(_) |
                SettlementError::Storage(_) |
                SettlementError::Timeout(_) |
                SettlementError::GatewayUnavailable(_)
        )
    }
}

impl From<StorageError> for SettlementError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict(s) => SettlementError::StorageConflict(s),
            StorageError::DatabaseError(s) | StorageError::DecodeError(s) => SettlementError::Storage(s),
        }
    }
}

impl From<MoneyError> for SettlementError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::CurrencyMismatch(_, _) => SettlementError::AmountMismatch(e.to_string()),
            _ => SettlementError::ValidationError(e.to_string()),
        }
    }
}
