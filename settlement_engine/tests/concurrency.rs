use futures_util::future::join_all;
use settlement_engine::{
    db_types::{Cents, OrderId, OrderStatusType, PayoutMethod, UserId},
    order_objects::{Actor, TransitionRequest},
    SettlementError,
    TransactionManagement,
};

mod support;

use support::{checkout, eur, fast_retry, payment_for, TestSystem};

#[tokio::test]
async fn concurrent_deliveries_of_one_payment_settle_once() {
    let sys = TestSystem::new().await;
    let order = sys.coordinator.create_order(checkout("o400", "alice", "bob", "kayak", 40_000)).await.unwrap();
    let event = payment_for(&order);
    let retry = fast_retry();
    let results = join_all((0..10).map(|_| sys.coordinator.settle_with_retry(event.clone(), &retry))).await;
    let results = results.into_iter().collect::<Result<Vec<_>, _>>().unwrap();
    let originals = results.iter().filter(|r| !r.duplicate).count();
    assert_eq!(originals, 1);
    let id = results[0].transaction.id;
    assert!(results.iter().all(|r| r.transaction.id == id));
    let txs = sys.db.fetch_transactions_for_seller(&UserId::from("bob")).await.unwrap();
    assert_eq!(txs.len(), 1);
    sys.tear_down().await;
}

#[tokio::test]
async fn competing_buyers_cannot_both_pay_for_a_product() {
    let sys = TestSystem::new().await;
    let mut orders = Vec::new();
    for (i, buyer) in ["alice", "carol", "dave", "erin"].into_iter().enumerate() {
        let order = sys.coordinator.create_order(checkout(&format!("o41{i}"), buyer, "bob", "canoe", 30_000)).await;
        orders.push(order.unwrap());
    }
    let retry = fast_retry();
    let results = join_all(orders.iter().map(|o| sys.coordinator.settle_with_retry(payment_for(o), &retry))).await;
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert!(matches!(err, SettlementError::StaleOrder { .. }), "{err}");
    }
    let paid = join_all(orders.iter().map(|o| sys.coordinator.fetch_order(&o.order_id))).await;
    let paid = paid.into_iter().filter(|o| o.as_ref().unwrap().status == OrderStatusType::Paid).count();
    assert_eq!(paid, 1);
    sys.tear_down().await;
}

#[tokio::test]
async fn concurrent_payouts_cannot_overdraw() {
    let sys = TestSystem::new().await;
    sys.withdrawable_order("o420", "alice", "bob", "bike", 5_000).await;
    let seller = UserId::from("bob");
    let method = PayoutMethod::Wallet { handle: "@bob".into() };
    let requests = (0..10).map(|_| sys.payouts.request_payout(&seller, eur(2_000), method.clone(), None));
    let results = join_all(requests).await;
    let granted = results.iter().filter(|r| r.is_ok()).count();
    assert!((1..=2).contains(&granted), "{granted} payouts were granted");
    for err in results.into_iter().filter_map(Result::err) {
        assert!(
            matches!(err, SettlementError::InsufficientBalance { .. } | SettlementError::StorageConflict(_)),
            "{err}"
        );
    }
    let summary = sys.payouts.seller_earnings_summary(&seller).await.unwrap();
    assert!(summary.withdrawable >= Cents::from(0));
    assert_eq!(summary.in_flight, Cents::from(2_000).checked_mul(granted as i64).unwrap());
    sys.tear_down().await;
}

#[tokio::test]
async fn shipping_and_cancelling_race_has_one_winner() {
    let sys = TestSystem::new().await;
    sys.paid_order("o430", "alice", "bob", "tent", 12_000).await;
    let oid = OrderId::from("o430");
    let ship = TransitionRequest::new(OrderStatusType::Shipped);
    let cancel = TransitionRequest::new(OrderStatusType::Cancelled);
    let seller = Actor::user("bob");
    let buyer = Actor::user("alice");
    let (shipped, cancelled) = tokio::join!(
        sys.coordinator.transition_order(&oid, &ship, &seller),
        sys.coordinator.transition_order(&oid, &cancel, &buyer)
    );
    assert!(shipped.is_ok() ^ cancelled.is_ok());
    let loser = shipped.err().or(cancelled.err()).unwrap();
    assert!(matches!(loser, SettlementError::InvalidTransition { .. }), "{loser}");
    let order = sys.coordinator.fetch_order(&oid).await.unwrap();
    assert!(matches!(order.status, OrderStatusType::Shipped | OrderStatusType::Cancelled));
    sys.tear_down().await;
}
