#![allow(dead_code)]
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use settlement_engine::{
    db_types::{Currency, Money, NewOrder, Order, OrderId, OrderStatusType},
    events::EventProducers,
    helpers::RetryConfig,
    order_objects::{Actor, TransitionRequest},
    payment_objects::{PaymentConfirmed, SettlementResult},
    payout_objects::PayoutConfig,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    PayoutProcessor,
    SettlementConfig,
    SettlementCoordinator,
    SettlementDatabase,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub struct TestSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub coordinator: SettlementCoordinator<SqliteDatabase>,
    pub payouts: PayoutProcessor<SqliteDatabase>,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let config = SettlementConfig { conflict_retry: fast_retry(), ..Default::default() };
        let coordinator = SettlementCoordinator::new(db.clone(), producers, config);
        let payouts = PayoutProcessor::new(db.clone(), PayoutConfig::default());
        Self { db_path: url, db, coordinator, payouts }
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        Sqlite::drop_database(&self.db_path).await.unwrap();
    }

    /// Creates the order and settles it with a matching payment, using `pay-{order_id}` as the gateway reference.
    pub async fn paid_order(&self, order_id: &str, buyer: &str, seller: &str, product: &str, price: i64) -> SettlementResult {
        let order = self.coordinator.create_order(checkout(order_id, buyer, seller, product, price)).await.unwrap();
        self.coordinator.settle(payment_for(&order)).await.unwrap()
    }

    pub async fn transition(&self, order_id: &str, to: OrderStatusType, actor: &Actor) -> Order {
        let request = TransitionRequest::new(to);
        self.coordinator.transition_order(&OrderId::from(order_id), &request, actor).await.unwrap().order
    }

    /// Takes a paid order through shipping and delivery.
    pub async fn deliver(&self, order_id: &str, buyer: &str, seller: &str) -> Order {
        self.transition(order_id, OrderStatusType::Shipped, &Actor::user(seller)).await;
        self.transition(order_id, OrderStatusType::Delivered, &Actor::user(buyer)).await
    }

    /// Moves the delivery timestamp so that hold-period tests do not need to wait.
    pub async fn set_delivered_at(&self, order_id: &str, at: DateTime<Utc>) {
        sqlx::query("UPDATE orders SET delivered_at = $1 WHERE order_id = $2")
            .bind(at)
            .bind(order_id)
            .execute(self.db.pool())
            .await
            .unwrap();
    }

    /// Delivers the order and releases its earnings, so that they are withdrawable.
    pub async fn withdrawable_order(&self, order_id: &str, buyer: &str, seller: &str, product: &str, price: i64) {
        self.paid_order(order_id, buyer, seller, product, price).await;
        self.deliver(order_id, buyer, seller).await;
        let delivered = Utc::now() - chrono::Duration::days(30);
        self.set_delivered_at(order_id, delivered).await;
        let released = self.payouts.release_matured_earnings(Utc::now()).await.unwrap();
        assert!(released.iter().any(|t| t.order_id.as_str() == order_id));
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig::default().with_initial_delay(Duration::from_millis(2)).with_max_attempts(10)
}

pub fn eur(cents: i64) -> Money {
    Money::new(cents, Currency::default())
}

pub fn checkout(order_id: &str, buyer: &str, seller: &str, product: &str, price: i64) -> NewOrder {
    NewOrder::new(order_id, buyer, seller, product, eur(price))
}

pub fn payment_for(order: &Order) -> PaymentConfirmed {
    PaymentConfirmed::new(format!("pay-{}", order.order_id), order.order_id.clone(), order.total())
}
