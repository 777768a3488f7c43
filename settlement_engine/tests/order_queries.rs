use settlement_engine::{
    db_types::{Cents, OrderStatusType, UserId},
    order_objects::{Actor, OrderQueryFilter},
};

mod support;

use support::{checkout, TestSystem};

fn ids(orders: &[settlement_engine::db_types::Order]) -> Vec<&str> {
    orders.iter().map(|o| o.order_id.as_str()).collect()
}

#[tokio::test]
async fn orders_are_listed_newest_first() {
    let sys = TestSystem::new().await;
    sys.paid_order("o1", "alice", "bob", "guitar", 10_000).await;
    sys.coordinator.create_order(checkout("o2", "alice", "bob", "lamp", 2_500)).await.unwrap();
    sys.coordinator.create_order(checkout("o3", "bob", "alice", "vase", 4_000)).await.unwrap();
    let alice = UserId::from("alice");

    let all = sys.coordinator.search_orders(OrderQueryFilter::default().with_party(alice.clone())).await.unwrap();
    assert_eq!(ids(&all), ["o3", "o2", "o1"]);
    let bought = OrderQueryFilter::default().with_buyer_id(alice.clone()).with_status(OrderStatusType::Pending);
    assert_eq!(ids(&sys.coordinator.search_orders(bought).await.unwrap()), ["o2"]);
    let page = OrderQueryFilter::default().with_party(alice.clone()).with_page(Some(2), Some(1));
    assert_eq!(ids(&sys.coordinator.search_orders(page).await.unwrap()), ["o2", "o1"]);
    let skip_only = OrderQueryFilter::default().with_party(alice).with_page(None, Some(2));
    assert_eq!(ids(&sys.coordinator.search_orders(skip_only).await.unwrap()), ["o1"]);
    sys.tear_down().await;
}

#[tokio::test]
async fn order_stats_follow_the_order_status() {
    let sys = TestSystem::new().await;
    sys.paid_order("o1", "alice", "bob", "guitar", 10_000).await;
    sys.paid_order("o2", "carol", "bob", "drum", 2_500).await;
    sys.coordinator.create_order(checkout("o3", "bob", "alice", "vase", 4_000)).await.unwrap();
    sys.transition("o2", OrderStatusType::Shipped, &Actor::user("bob")).await;

    let bob = sys.coordinator.order_stats(&UserId::from("bob")).await.unwrap();
    assert_eq!(bob.sales.total, 2);
    assert_eq!(bob.sales.paid, 1);
    assert_eq!(bob.sales.shipped, 1);
    assert_eq!(bob.sales.total_value, Cents::from(11_070 + 3_195));
    assert_eq!(bob.purchases.total, 1);
    assert_eq!(bob.purchases.pending, 1);
    assert_eq!(bob.purchases.total_value, Cents::from(4_770));

    sys.transition("o3", OrderStatusType::Cancelled, &Actor::user("alice")).await;
    let bob = sys.coordinator.order_stats(&UserId::from("bob")).await.unwrap();
    assert_eq!(bob.purchases.cancelled, 1);
    assert_eq!(bob.purchases.total_value, Cents::default());
    let nobody = sys.coordinator.order_stats(&UserId::from("dave")).await.unwrap();
    assert_eq!(nobody.purchases.total + nobody.sales.total, 0);
    sys.tear_down().await;
}
