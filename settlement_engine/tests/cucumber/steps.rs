use std::str::FromStr;

use chrono::{Duration, Utc};
use cucumber::{then, when};
use settlement_engine::{
    db_types::{Cents, Currency, Money, NewOrder, OrderId, OrderStatusType, PayoutMethod, PayoutStatus, UserId},
    order_objects::{Actor, TransitionRequest},
    payment_objects::{PaymentConfirmed, PaymentFailed},
    ReconciliationManagement,
    SettlementError,
    TransactionManagement,
};

use crate::cucumber::SettlementWorld;

fn eur(amount: &str) -> Money {
    let cents = Cents::from_str(amount).expect("Not a valid amount");
    Money::new(cents, Currency::default())
}

fn status(s: &str) -> OrderStatusType {
    OrderStatusType::from_str(s).expect("Not a valid order status")
}

fn error_name(e: &SettlementError) -> &'static str {
    match e {
        SettlementError::NotFound(_) => "NotFound",
        SettlementError::InvalidTransition { .. } => "InvalidTransition",
        SettlementError::PermissionDenied(_) => "PermissionDenied",
        SettlementError::AmountMismatch(_) => "AmountMismatch",
        SettlementError::StaleOrder { .. } => "StaleOrder",
        SettlementError::ValidationError(_) => "ValidationError",
        SettlementError::InsufficientBalance { .. } => "InsufficientBalance",
        SettlementError::BelowMinimum { .. } => "BelowMinimum",
        SettlementError::GatewayUnavailable(_) => "GatewayUnavailable",
        SettlementError::StorageConflict(_) => "StorageConflict",
        SettlementError::Storage(_) => "Storage",
        SettlementError::Timeout(_) => "Timeout",
    }
}

#[when(expr = "buyer '{word}' checks out order {word} for product '{word}' from seller '{word}' at {word} EUR")]
async fn checkout(world: &mut SettlementWorld, buyer: String, order_id: String, product: String, seller: String, price: String) {
    let order = NewOrder::new(order_id, buyer, seller, product, eur(&price));
    let result = world.coordinator().create_order(order).await;
    world.record(result);
}

#[when(expr = "the gateway confirms payment [{word}] of {word} EUR for order {word}")]
async fn confirm_payment(world: &mut SettlementWorld, reference: String, amount: String, order_id: String) {
    let event = PaymentConfirmed::new(reference, order_id, eur(&amount));
    let result = world.coordinator().settle(event).await;
    world.record(result);
}

#[when(expr = "the gateway reports that payment [{word}] for order {word} failed")]
async fn payment_failed(world: &mut SettlementWorld, reference: String, order_id: String) {
    let event = PaymentFailed { gateway_reference: reference, order_id: order_id.into(), reason: Some("declined".into()) };
    let result = world.coordinator().payment_failed(event).await;
    world.record(result);
}

#[when(expr = "'{word}' moves order {word} to {word}")]
async fn user_transition(world: &mut SettlementWorld, user: String, order_id: String, target: String) {
    transition(world, Actor::user(user), order_id, &target).await;
}

#[when(expr = "admin '{word}' moves order {word} to {word}")]
async fn admin_transition(world: &mut SettlementWorld, admin: String, order_id: String, target: String) {
    transition(world, Actor::admin(admin), order_id, &target).await;
}

async fn transition(world: &mut SettlementWorld, actor: Actor, order_id: String, target: &str) {
    let request = TransitionRequest::new(status(target));
    let result = world.coordinator().transition_order(&OrderId::from(order_id), &request, &actor).await;
    world.record(result);
}

#[when(expr = "order {word} was delivered {int} days ago")]
async fn backdate_delivery(world: &mut SettlementWorld, order_id: String, days: i64) {
    let at = Utc::now() - Duration::days(days);
    sqlx::query("UPDATE orders SET delivered_at = $1 WHERE order_id = $2")
        .bind(at)
        .bind(order_id)
        .execute(world.system().db.pool())
        .await
        .expect("Error updating delivery date");
}

#[when("the earnings release job runs")]
async fn release_job(world: &mut SettlementWorld) {
    let result = world.payouts().release_matured_earnings(Utc::now()).await;
    world.record(result);
}

#[when(expr = "seller '{word}' requests a payout of {word} EUR to wallet '{word}'")]
async fn request_payout(world: &mut SettlementWorld, seller: String, amount: String, handle: String) {
    let method = PayoutMethod::Wallet { handle };
    let result = world.payouts().request_payout(&UserId::from(seller), eur(&amount), method, None).await;
    world.record(result);
}

#[when(expr = "admin '{word}' moves the latest payout of '{word}' to {word}")]
async fn advance_payout(world: &mut SettlementWorld, admin: String, seller: String, target: String) {
    let payouts = world.payouts().payouts_for_seller(&UserId::from(seller)).await.expect("Error fetching payouts");
    let payout = payouts.iter().max_by_key(|p| p.id).expect("Seller has no payouts");
    let target = PayoutStatus::from_str(&target).expect("Not a valid payout status");
    let result = world.payouts().advance_payout(payout.id, target, &Actor::admin(admin), None).await;
    world.record(result);
}

#[then(expr = "order {word} has status {word}")]
async fn check_status(world: &mut SettlementWorld, order_id: String, expected: String) {
    let order = world.coordinator().fetch_order(&OrderId::from(order_id)).await.expect("Error fetching order");
    assert_eq!(order.status, status(&expected));
}

#[then(expr = "order {word} has a total of {word} EUR")]
async fn check_total(world: &mut SettlementWorld, order_id: String, expected: String) {
    let order = world.coordinator().fetch_order(&OrderId::from(order_id)).await.expect("Error fetching order");
    assert_eq!(order.total(), eur(&expected));
}

#[then("the last request succeeded")]
async fn check_success(world: &mut SettlementWorld) {
    assert!(world.last_error.is_none(), "Expected success, but got {:?}", world.last_error);
}

#[then(expr = "the last request failed with {word}")]
async fn check_failure(world: &mut SettlementWorld, expected: String) {
    let err = world.last_error.as_ref().expect("The last request succeeded");
    assert_eq!(error_name(err), expected, "{err}");
}

#[then(expr = "the earnings for order {word} are {word}")]
async fn check_earnings(world: &mut SettlementWorld, order_id: String, expected: String) {
    let tx = world
        .system()
        .db
        .fetch_transaction_for_order(&OrderId::from(order_id))
        .await
        .expect("Error fetching transaction")
        .expect("Order has no transaction");
    assert_eq!(tx.payout_status.to_string(), expected);
}

#[then(expr = "seller '{word}' has {word} EUR withdrawable")]
async fn check_withdrawable(world: &mut SettlementWorld, seller: String, expected: String) {
    let summary =
        world.payouts().seller_earnings_summary(&UserId::from(seller)).await.expect("Error fetching earnings");
    assert_eq!(summary.withdrawable, eur(&expected).amount);
}

#[then(expr = "there are {int} open reconciliation entries")]
async fn check_reconciliation(world: &mut SettlementWorld, expected: usize) {
    let entries = world.system().db.fetch_reconciliation_entries(false).await.expect("Error fetching entries");
    assert_eq!(entries.len(), expected);
}

#[then(expr = "the platform has earned {word} EUR in commission")]
async fn check_commission(world: &mut SettlementWorld, expected: String) {
    let report = world.payouts().platform_commission(None, None).await.expect("Error fetching report");
    assert_eq!(report.total_commission, eur(&expected).amount);
}
