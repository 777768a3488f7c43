use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;
use mkt_common::Cents;
use serde::Serialize;

use crate::{
    commission::{CommissionCalculator, CommissionConfig},
    db_types::{
        NewOrder,
        NewReconciliationEntry,
        NewTransaction,
        Order,
        OrderId,
        OrderStatusType,
        SettlementEventKind,
        Transaction,
        UserId,
    },
    events::{AdminEscalationEvent, DomainEvent, EventProducers, OrderEvent, ReservationChangedEvent},
    helpers::{retry_with_backoff, with_timeout, RetryConfig},
    order_objects::{Actor, OrderQueryFilter, OrderStats, TransitionRequest, TransitionResult},
    payment_objects::{PaymentConfirmed, PaymentFailed, PaymentFailedOutcome, SettlementResult},
    traits::{CancelEarningsResult, RecordSettlementResult, SettlementDatabase},
    OrderLedger,
    SettlementError,
    TransactionLedger,
};

pub const DEFAULT_AMOUNT_TOLERANCE: Cents = Cents::new(1);
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub commission: CommissionConfig,
    /// The largest difference between the charged and the expected total that is still accepted.
    pub amount_tolerance: Cents,
    /// Upper bound for each storage call.
    pub storage_timeout: Duration,
    /// Retry policy for compare-and-swap conflicts on order transitions.
    pub conflict_retry: RetryConfig,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            commission: CommissionConfig::default(),
            amount_tolerance: DEFAULT_AMOUNT_TOLERANCE,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            conflict_retry: RetryConfig::default(),
        }
    }
}

/// `SettlementCoordinator` is the entry point for checkout, gateway webhooks and order actions.
///
/// It validates gateway events against the [`OrderLedger`], writes the financial record through the
/// [`TransactionLedger`], and reacts to the events that order transitions produce (releasing products, cancelling
/// earnings, starting payout hold periods and escalating to administrators). Every resulting event is handed to the
/// dispatcher once the ledger write has committed.
///
/// Gateway events that cannot be applied are not dropped. They are written to the reconciliation queue.
pub struct SettlementCoordinator<B> {
    db: B,
    orders: OrderLedger<B>,
    ledger: TransactionLedger<B>,
    producers: EventProducers,
    config: SettlementConfig,
}

impl<B> Debug for SettlementCoordinator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementCoordinator")
    }
}

impl<B: Clone> SettlementCoordinator<B> {
    pub fn new(db: B, producers: EventProducers, config: SettlementConfig) -> Self {
        let calculator = CommissionCalculator::new(config.commission.clone());
        let orders = OrderLedger::new(db.clone(), calculator).with_retry(config.conflict_retry.clone());
        let ledger = TransactionLedger::new(db.clone());
        Self { db, orders, ledger, producers, config }
    }
}

impl<B> SettlementCoordinator<B> {
    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn orders(&self) -> &OrderLedger<B> {
        &self.orders
    }

    pub fn ledger(&self) -> &TransactionLedger<B> {
        &self.ledger
    }
}

impl<B> SettlementCoordinator<B>
where B: SettlementDatabase
{
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, SettlementError> {
        with_timeout(self.config.storage_timeout, self.orders.create(order)).await
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, SettlementError> {
        with_timeout(self.config.storage_timeout, self.orders.fetch(order_id)).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, SettlementError> {
        with_timeout(self.config.storage_timeout, self.orders.search(query)).await
    }

    /// The user's purchases and sales, counted by status.
    pub async fn order_stats(&self, user_id: &UserId) -> Result<OrderStats, SettlementError> {
        with_timeout(self.config.storage_timeout, self.orders.stats(user_id)).await
    }

    /// Applies a confirmed payment.
    ///
    /// Settlement is idempotent on the gateway reference: a redelivered confirmation returns the original result with
    /// `duplicate` set. Confirmations that cannot be applied (unknown or no longer pending orders, wrong amounts) fail
    /// and are recorded in the reconciliation queue. Transient failures are returned as-is and are safe to retry.
    pub async fn settle(&self, event: PaymentConfirmed) -> Result<SettlementResult, SettlementError> {
        let reference = event.gateway_reference.as_str();
        let order_id = &event.order_id;
        trace!("🔄️ Settling payment {reference} for order [{order_id}]");
        let timeout = self.config.storage_timeout;
        if let Some(existing) = with_timeout(timeout, self.ledger.fetch_by_reference(reference)).await? {
            return self.duplicate_result(&event, existing).await;
        }
        let order = match with_timeout(timeout, self.db.fetch_order_by_order_id(order_id)).await? {
            Some(o) => o,
            None => {
                let err = SettlementError::NotFound(format!("Order {order_id}"));
                return Err(self.reject_payment(&event, err).await);
            },
        };
        if order.status != OrderStatusType::Pending {
            // A concurrent delivery of this same event may have settled the order since the first lookup
            if let Some(existing) = with_timeout(timeout, self.ledger.fetch_by_reference(reference)).await? {
                return self.duplicate_result(&event, existing).await;
            }
            let err = SettlementError::StaleOrder {
                order_id: order_id.clone(),
                reason: format!("The order is {}, not awaiting payment", order.status),
            };
            return Err(self.reject_payment(&event, err).await);
        }
        if let Some(owner) = with_timeout(timeout, self.db.fetch_product_sale(&order.product_id)).await? {
            if &owner != order_id {
                let err = SettlementError::StaleOrder {
                    order_id: order_id.clone(),
                    reason: format!("Product {} has already been sold to order {owner}", order.product_id),
                };
                return Err(self.reject_payment(&event, err).await);
            }
        }
        if let Err(err) = self.check_amount(&order, &event) {
            return Err(self.reject_payment(&event, err).await);
        }
        let transaction = NewTransaction {
            order_id: order.order_id.clone(),
            gateway_reference: event.gateway_reference.clone(),
            buyer_id: order.buyer_id.clone(),
            seller_id: order.seller_id.clone(),
            product_id: order.product_id.clone(),
            amount_total: order.total_amount,
            commission_amount: order.service_fee + order.tax_amount,
            seller_earnings: order.product_price,
            shipping_cost: order.shipping_cost,
            tax_amount: order.tax_amount,
            currency: order.currency.clone(),
            created_at: Utc::now(),
        };
        match with_timeout(timeout, self.ledger.record(transaction)).await? {
            RecordSettlementResult::Recorded { transaction, order } => {
                info!(
                    "🔄️ Payment {reference} settled order [{order_id}]. Commission {}, seller earnings {}",
                    transaction.commission_amount, transaction.seller_earnings
                );
                let events = vec![
                    OrderEvent::OrderPaid { order: order.clone(), transaction: transaction.clone() }.into(),
                    ReservationChangedEvent {
                        product_id: order.product_id.clone(),
                        order_id: order.order_id.clone(),
                        reserved: true,
                    }
                    .into(),
                ];
                self.producers.dispatch_all(events).await;
                Ok(SettlementResult { transaction, order, duplicate: false })
            },
            RecordSettlementResult::Duplicate(existing) => self.duplicate_result(&event, existing).await,
            RecordSettlementResult::StaleOrder(reason) => {
                let err = SettlementError::StaleOrder { order_id: order_id.clone(), reason };
                Err(self.reject_payment(&event, err).await)
            },
        }
    }

    /// Calls [`Self::settle`] until it succeeds or fails permanently. If the retries run out, the event is placed in
    /// the reconciliation queue before the last error is returned.
    pub async fn settle_with_retry(
        &self,
        event: PaymentConfirmed,
        retry: &RetryConfig,
    ) -> Result<SettlementResult, SettlementError> {
        let label = format!("Settlement of payment {}", event.gateway_reference);
        let result =
            retry_with_backoff(retry, &label, |e: &SettlementError| e.is_transient(), |_| self.settle(event.clone()))
                .await;
        match result {
            Err(e) if e.is_transient() => {
                let reason = format!("Gave up after {} attempts. {e}", retry.max_attempts);
                self.dead_letter(&event, &event.gateway_reference, &event.order_id, SettlementEventKind::PaymentConfirmed, reason)
                    .await;
                Err(e)
            },
            other => other,
        }
    }

    /// Applies the gateway's notice that a payment failed or was cancelled.
    ///
    /// A pending order is cancelled. An order that is already cancelled is left alone. Any other status contradicts
    /// the gateway, so the notice is sent to the reconciliation queue.
    pub async fn payment_failed(&self, event: PaymentFailed) -> Result<PaymentFailedOutcome, SettlementError> {
        let order_id = &event.order_id;
        let order = match with_timeout(self.config.storage_timeout, self.db.fetch_order_by_order_id(order_id)).await? {
            Some(o) => o,
            None => {
                let err = SettlementError::NotFound(format!("Order {order_id}"));
                return Err(self.reject_failure(&event, err).await);
            },
        };
        match order.status {
            OrderStatusType::Cancelled => {
                debug!("🔄️ Order [{order_id}] is already cancelled. Ignoring failed payment {}", event.gateway_reference);
                Ok(PaymentFailedOutcome::AlreadyCancelled(order))
            },
            OrderStatusType::Pending => {
                let reason = match &event.reason {
                    Some(r) => format!("Payment failed: {r}"),
                    None => "Payment failed".to_string(),
                };
                let request = TransitionRequest::new(OrderStatusType::Cancelled).with_notes(reason);
                match self.transition_order(order_id, &request, &Actor::system()).await {
                    Ok(result) => Ok(PaymentFailedOutcome::Cancelled(result.order)),
                    Err(SettlementError::InvalidTransition { from, .. }) => {
                        let err = SettlementError::StaleOrder {
                            order_id: order_id.clone(),
                            reason: format!("The order became {from} before the failed payment could be applied"),
                        };
                        Err(self.reject_failure(&event, err).await)
                    },
                    Err(e) => Err(e),
                }
            },
            status => {
                let err = SettlementError::StaleOrder {
                    order_id: order_id.clone(),
                    reason: format!("The gateway reported a failed payment, but the order is {status}"),
                };
                Err(self.reject_failure(&event, err).await)
            },
        }
    }

    /// Moves an order through the state machine on behalf of `actor`, then carries out the follow-up work the
    /// transition calls for:
    /// * `cancelled`: the product is made available again and the earnings are withdrawn. Earnings that have already
    ///   been paid out are escalated to an administrator for a manual clawback.
    /// * `delivered`: the earnings start their hold period.
    /// * `disputed`: an administrator is alerted.
    ///
    /// The status change is final once the ledger has written it. If a follow-up step fails, the failure is escalated
    /// rather than returned.
    pub async fn transition_order(
        &self,
        order_id: &OrderId,
        request: &TransitionRequest,
        actor: &Actor,
    ) -> Result<TransitionResult, SettlementError> {
        let mut result =
            with_timeout(self.config.storage_timeout, self.orders.transition(order_id, request, actor)).await?;
        let reactions = match result.order.status {
            OrderStatusType::Cancelled => self.on_cancelled(&result.order).await,
            OrderStatusType::Delivered => self.on_delivered(&result.order).await,
            OrderStatusType::Disputed => Ok(vec![AdminEscalationEvent::new(
                order_id.clone(),
                format!(
                    "Dispute raised by {actor}: {}",
                    request.notes.as_deref().unwrap_or("no reason given")
                ),
            )
            .into()]),
            _ => Ok(Vec::new()),
        };
        match reactions {
            Ok(events) => result.events.extend(events),
            Err(e) => {
                error!("🔄️ Order [{order_id}] is {}, but its follow-up work failed: {e}", result.order.status);
                let reason = format!("Follow-up work after the order became {} failed: {e}", result.order.status);
                result.events.push(AdminEscalationEvent::new(order_id.clone(), reason).into());
            },
        }
        self.producers.dispatch_all(result.events.clone()).await;
        Ok(result)
    }

    async fn on_cancelled(&self, order: &Order) -> Result<Vec<DomainEvent>, SettlementError> {
        let timeout = self.config.storage_timeout;
        let mut events = Vec::new();
        if let Some(product_id) = with_timeout(timeout, self.db.release_product(&order.order_id)).await? {
            debug!("🔄️ Product {product_id} is available again after order [{}] was cancelled", order.order_id);
            events.push(ReservationChangedEvent { product_id, order_id: order.order_id.clone(), reserved: false }.into());
        }
        if let CancelEarningsResult::Committed(tx) =
            with_timeout(timeout, self.ledger.cancel_earnings(&order.order_id)).await?
        {
            let reason = format!(
                "Order cancelled after its earnings of {} {} were committed to a payout. A manual clawback from seller \
                 {} is needed.",
                tx.seller_earnings, tx.currency, tx.seller_id
            );
            events.push(AdminEscalationEvent::new(order.order_id.clone(), reason).into());
        }
        Ok(events)
    }

    async fn on_delivered(&self, order: &Order) -> Result<Vec<DomainEvent>, SettlementError> {
        with_timeout(self.config.storage_timeout, self.ledger.mark_payout_eligible(&order.order_id)).await?;
        Ok(Vec::new())
    }

    async fn duplicate_result(
        &self,
        event: &PaymentConfirmed,
        existing: Transaction,
    ) -> Result<SettlementResult, SettlementError> {
        if existing.order_id != event.order_id {
            let err = SettlementError::ValidationError(format!(
                "Payment {} was already used to settle order {}",
                event.gateway_reference, existing.order_id
            ));
            return Err(self.reject_payment(event, err).await);
        }
        let order = with_timeout(self.config.storage_timeout, self.orders.fetch(&existing.order_id)).await?;
        debug!("🔄️ Payment {} was already settled. Returning the original result", event.gateway_reference);
        Ok(SettlementResult { transaction: existing, order, duplicate: true })
    }

    /// The gateway amount must match the total frozen on the order, in the same currency, within the tolerance.
    fn check_amount(&self, order: &Order, event: &PaymentConfirmed) -> Result<(), SettlementError> {
        if event.amount.currency != order.currency {
            return Err(SettlementError::AmountMismatch(format!(
                "The payment was made in {}, but order {} is priced in {}",
                event.amount.currency, order.order_id, order.currency
            )));
        }
        if !self.orders.calculator().verify(order) {
            warn!(
                "🔄️ The fee schedule has changed since order [{}] was created. Settling against the amounts on the \
                 order",
                order.order_id
            );
        }
        let within_tolerance =
            event.amount.amount.abs_diff(order.total_amount).is_ok_and(|d| d <= self.config.amount_tolerance);
        if !within_tolerance {
            return Err(SettlementError::AmountMismatch(format!(
                "Expected {} but the gateway charged {}",
                order.total(),
                event.amount
            )));
        }
        Ok(())
    }

    async fn reject_payment(&self, event: &PaymentConfirmed, err: SettlementError) -> SettlementError {
        warn!("🔄️ Payment {} for order [{}] was rejected: {err}", event.gateway_reference, event.order_id);
        self.dead_letter(
            event,
            &event.gateway_reference,
            &event.order_id,
            SettlementEventKind::PaymentConfirmed,
            err.to_string(),
        )
        .await;
        err
    }

    async fn reject_failure(&self, event: &PaymentFailed, err: SettlementError) -> SettlementError {
        warn!("🔄️ Failed payment notice {} for order [{}] was rejected: {err}", event.gateway_reference, event.order_id);
        self.dead_letter(event, &event.gateway_reference, &event.order_id, SettlementEventKind::PaymentFailed, err.to_string())
            .await;
        err
    }

    /// Failing to write to the queue must not hide the original error, so it is only logged.
    async fn dead_letter<E: Serialize>(
        &self,
        event: &E,
        gateway_reference: &str,
        order_id: &OrderId,
        event_kind: SettlementEventKind,
        reason: String,
    ) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => format!("{{\"error\": \"could not serialize event: {e}\"}}"),
        };
        let entry = NewReconciliationEntry {
            gateway_reference: gateway_reference.to_string(),
            order_id: order_id.clone(),
            event_kind,
            payload,
            reason,
        };
        if let Err(e) = with_timeout(self.config.storage_timeout, self.db.dead_letter(entry)).await {
            error!("🔄️ Could not add payment {gateway_reference} to the reconciliation queue: {e}");
        }
    }
}
