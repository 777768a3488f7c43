use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    commission::CommissionCalculator,
    db_types::{NewOrder, Order, OrderId, OrderStatusType, UserId},
    events::{DomainEvent, OrderEvent},
    helpers::{retry_with_backoff, RetryConfig},
    order_objects::{Actor, OrderQueryFilter, OrderStats, OrderStatusUpdate, TransitionRequest, TransitionResult},
    traits::{InsertOrderResult, OrderManagement},
    SettlementError,
};

/// `OrderLedger` owns the order records and their state machine. It is the only component that changes an order's
/// status.
///
/// The ledger returns the domain events a transition produces, but never dispatches them. Reacting to them is the job
/// of the [`crate::SettlementCoordinator`].
pub struct OrderLedger<B> {
    db: B,
    calculator: CommissionCalculator,
    retry: RetryConfig,
}

impl<B> Debug for OrderLedger<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderLedger")
    }
}

impl<B> OrderLedger<B> {
    pub fn new(db: B, calculator: CommissionCalculator) -> Self {
        Self { db, calculator, retry: RetryConfig::default() }
    }

    /// Sets how compare-and-swap conflicts are retried.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn calculator(&self) -> &CommissionCalculator {
        &self.calculator
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderLedger<B>
where B: OrderManagement
{
    /// Records a checkout that has reached "awaiting payment".
    ///
    /// The commission breakdown is computed here, once, and frozen onto the order. Submitting the same checkout again
    /// returns the stored order; submitting a different checkout under an existing `order_id` is an error.
    pub async fn create(&self, order: NewOrder) -> Result<Order, SettlementError> {
        self.validate_new_order(&order)?;
        let breakdown = self.calculator.calculate(&order.price)?;
        match self.db.insert_order(&order, &breakdown).await? {
            InsertOrderResult::Inserted(o) => {
                info!("📦️ Order [{}] created. Total {} for product {}", o.order_id, o.total(), o.product_id);
                Ok(o)
            },
            InsertOrderResult::AlreadyExists(o) if order.is_equivalent(&o) => {
                debug!("📦️ Order [{}] was already created. Returning the stored order", o.order_id);
                Ok(o)
            },
            InsertOrderResult::AlreadyExists(o) => Err(SettlementError::ValidationError(format!(
                "Order {} already exists with different details",
                o.order_id
            ))),
            InsertOrderResult::ProductSold(owner) => Err(SettlementError::StaleOrder {
                order_id: order.order_id,
                reason: format!("Product {} has already been sold to order {owner}", order.product_id),
            }),
        }
    }

    fn validate_new_order(&self, order: &NewOrder) -> Result<(), SettlementError> {
        let invalid = |msg: String| Err(SettlementError::ValidationError(msg));
        if order.order_id.as_str().trim().is_empty() {
            return invalid("The order id cannot be empty".into());
        }
        if order.buyer_id.as_str().trim().is_empty() || order.seller_id.as_str().trim().is_empty() {
            return invalid("Both a buyer and a seller are required".into());
        }
        if order.product_id.as_str().trim().is_empty() {
            return invalid("The product id cannot be empty".into());
        }
        if order.buyer_id == order.seller_id {
            return invalid("You cannot buy your own product".into());
        }
        if !order.price.amount.is_positive() {
            return invalid(format!("The price must be positive, not {}", order.price));
        }
        if order.price.amount > self.calculator.max_price() {
            return invalid(format!("The price cannot be more than {}", self.calculator.max_price()));
        }
        if &order.price.currency != self.calculator.currency() {
            return invalid(format!(
                "Prices must be in {}, not {}",
                self.calculator.currency(),
                order.price.currency
            ));
        }
        Ok(())
    }

    pub async fn fetch(&self, order_id: &OrderId) -> Result<Order, SettlementError> {
        self.db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("Order {order_id}")))
    }

    /// Orders matching `query`, newest first.
    pub async fn search(&self, query: OrderQueryFilter) -> Result<Vec<Order>, SettlementError> {
        trace!("📦️ Searching orders. {query}");
        let orders = self.db.search_orders(query).await?;
        Ok(orders)
    }

    pub async fn stats(&self, user_id: &UserId) -> Result<OrderStats, SettlementError> {
        let stats = self.db.order_stats(user_id).await?;
        Ok(stats)
    }

    /// Moves the order to `request.target_status` on behalf of `actor`.
    ///
    /// The new status is written with a compare-and-swap against the status that was validated. If another writer got
    /// there first, the order is re-read and the whole transition validated again, up to the retry limit.
    pub async fn transition(
        &self,
        order_id: &OrderId,
        request: &TransitionRequest,
        actor: &Actor,
    ) -> Result<TransitionResult, SettlementError> {
        let label = format!("Transition of order {order_id} to {}", request.target_status);
        retry_with_backoff(
            &self.retry,
            &label,
            |e: &SettlementError| matches!(e, SettlementError::StorageConflict(_)),
            |_| self.try_transition(order_id, request, actor),
        )
        .await
    }

    async fn try_transition(
        &self,
        order_id: &OrderId,
        request: &TransitionRequest,
        actor: &Actor,
    ) -> Result<TransitionResult, SettlementError> {
        let order = self.fetch(order_id).await?;
        let from = order.status;
        let to = request.target_status;
        if !from.can_transition_to(to) {
            debug!("📦️ {actor} tried to move order [{order_id}] from {from} to {to}");
            return Err(SettlementError::invalid_order_transition(from, to));
        }
        check_permission(&order, to, actor)?;
        let update = OrderStatusUpdate::from_request(request, Utc::now());
        let updated = self.db.update_order_status(order_id, from, &update).await?.ok_or_else(|| {
            SettlementError::StorageConflict(format!("Order {order_id} changed status while it was being updated"))
        })?;
        info!("📦️ Order [{order_id}] moved from {from} to {to} by {actor}");
        let events = order_events(&updated, request);
        Ok(TransitionResult { previous_status: from, order: updated, events })
    }
}

/// Checks who may move an order into `to`.
///
/// * `paid` is only ever set by the settlement process.
/// * Only the seller ships, and only the buyer confirms delivery.
/// * Either party may cancel or dispute.
/// * Administrators may resolve a dispute either way.
pub fn check_permission(order: &Order, to: OrderStatusType, actor: &Actor) -> Result<(), SettlementError> {
    if actor.is_system() {
        return Ok(());
    }
    if to == OrderStatusType::Paid {
        return Err(SettlementError::PermissionDenied(
            "Orders are marked as paid by the settlement process only".into(),
        ));
    }
    if actor.is_admin() && order.status == OrderStatusType::Disputed {
        return Ok(());
    }
    if !order.is_party(&actor.id) {
        return Err(SettlementError::PermissionDenied(format!("You are not the buyer or seller of order {}", order.order_id)));
    }
    let is_buyer = order.buyer_id == actor.id;
    let is_seller = order.seller_id == actor.id;
    match to {
        OrderStatusType::Shipped if !is_seller => {
            Err(SettlementError::PermissionDenied("Only the seller can mark this order as shipped".into()))
        },
        OrderStatusType::Delivered if !is_buyer => {
            Err(SettlementError::PermissionDenied("Only the buyer can confirm delivery of this order".into()))
        },
        _ => Ok(()),
    }
}

fn order_events(order: &Order, request: &TransitionRequest) -> Vec<DomainEvent> {
    let order = order.clone();
    let event = match order.status {
        OrderStatusType::Shipped => {
            Some(OrderEvent::OrderShipped { order, tracking_number: request.tracking_number.clone() })
        },
        OrderStatusType::Delivered => Some(OrderEvent::OrderDelivered { order }),
        OrderStatusType::Cancelled => Some(OrderEvent::OrderCancelled { order, reason: request.notes.clone() }),
        OrderStatusType::Disputed => Some(OrderEvent::OrderDisputed { order, reason: request.notes.clone() }),
        // OrderPaid carries the transaction, so it is emitted by the settlement path
        OrderStatusType::Pending | OrderStatusType::Paid => None,
    };
    event.into_iter().map(DomainEvent::from).collect()
}
