use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
};
use chrono::{Duration, Utc};
use log::*;
use serde_json::{json, Value};
use settlement_engine::{
    db_types::{Order, OrderId, OrderStatusType},
    events::EventProducers,
    helpers::RetryConfig,
    order_objects::{Actor, TransitionRequest},
    payout_objects::PayoutConfig,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    PayoutProcessor,
    ReconciliationApi,
    SettlementConfig,
    SettlementCoordinator,
    SettlementDatabase,
    SqliteDatabase,
};

use crate::{
    auth::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER},
    config::ServerOptions,
    routes::health,
    server::configure_routes,
};

/// A fresh database and the server's routes in front of it.
pub struct TestContext {
    pub db_path: String,
    pub db: SqliteDatabase,
}

impl TestContext {
    pub async fn new() -> Self {
        let db_path = random_db_path();
        prepare_test_env(&db_path).await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error creating database");
        Self { db_path, db }
    }

    pub fn coordinator(&self) -> SettlementCoordinator<SqliteDatabase> {
        SettlementCoordinator::new(self.db.clone(), EventProducers::default(), SettlementConfig::default())
    }

    pub fn payouts(&self) -> PayoutProcessor<SqliteDatabase> {
        PayoutProcessor::new(self.db.clone(), PayoutConfig::default())
    }

    /// Sends the request through the full route table and returns the status and the body.
    pub async fn call(&self, req: TestRequest) -> (StatusCode, String) {
        let options = ServerOptions { settle_retry: RetryConfig::no_retry(), ..Default::default() };
        let app = App::new()
            .app_data(web::Data::new(self.coordinator()))
            .app_data(web::Data::new(self.payouts()))
            .app_data(web::Data::new(ReconciliationApi::new(self.db.clone())))
            .app_data(web::Data::new(options))
            .service(health)
            .configure(configure_routes::<SqliteDatabase>);
        let service = test::init_service(app).await;
        let res = match test::try_call_service(&service, req.to_request()).await {
            Ok(res) => res.into_parts().1,
            // Errors raised by middleware are not turned into responses outside a running server
            Err(e) => e.error_response(),
        };
        let status = res.status();
        let body = res.into_body().try_into_bytes().map(|b| String::from_utf8_lossy(&b).into_owned()).unwrap_or_default();
        debug!("🚀️ Response: {status} {body}");
        (status, body)
    }

    pub async fn call_json(&self, req: TestRequest) -> (StatusCode, Value) {
        let (status, body) = self.call(req).await;
        let value = serde_json::from_str(&body).unwrap_or_else(|_| panic!("Response is not JSON: {body}"));
        (status, value)
    }

    /// Alice buys `product` from Bob, and the gateway confirms the payment.
    pub async fn paid_order(&self, order_id: &str, product: &str, price: &str) -> Order {
        let (status, order) = self.call_json(checkout(order_id, product, price)).await;
        assert_eq!(status, StatusCode::OK, "checkout failed: {order}");
        let (status, body) = self.call_json(confirm(&format!("pay-{order_id}"), order_id, &amount(&order))).await;
        assert_eq!(status, StatusCode::OK, "settlement failed: {body}");
        serde_json::from_value(order).expect("Order JSON")
    }

    /// A paid order that has been shipped, delivered and held for longer than the hold period.
    pub async fn withdrawable_order(&self, order_id: &str, product: &str, price: &str) -> Order {
        self.paid_order(order_id, product, price).await;
        let api = self.coordinator();
        let id = OrderId::from(order_id);
        let shipped = TransitionRequest::new(OrderStatusType::Shipped).with_tracking_number("TRACK-1");
        api.transition_order(&id, &shipped, &Actor::user("bob")).await.unwrap();
        let delivered = TransitionRequest::new(OrderStatusType::Delivered);
        let result = api.transition_order(&id, &delivered, &Actor::user("alice")).await.unwrap();
        self.payouts().release_matured_earnings(Utc::now() + Duration::days(8)).await.unwrap();
        result.order
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        let path = self.db_path.trim_start_matches("sqlite://");
        if let Err(e) = std::fs::remove_file(path) {
            warn!("🚀️ Could not remove test database {path}: {e}");
        }
    }
}

pub fn as_user(req: TestRequest, id: &str) -> TestRequest {
    req.insert_header((ACTOR_ID_HEADER, id))
}

pub fn as_admin(req: TestRequest, id: &str) -> TestRequest {
    req.insert_header((ACTOR_ID_HEADER, id)).insert_header((ACTOR_ROLE_HEADER, "admin"))
}

pub fn checkout(order_id: &str, product: &str, price: &str) -> TestRequest {
    as_user(TestRequest::post().uri("/orders"), "alice").set_json(json!({
        "order_id": order_id,
        "buyer_id": "alice",
        "seller_id": "bob",
        "product_id": product,
        "price": price,
    }))
}

pub fn confirm(reference: &str, order_id: &str, amount: &str) -> TestRequest {
    TestRequest::post().uri("/settlement/confirm").set_json(json!({
        "gateway_reference": reference,
        "order_id": order_id,
        "amount": amount,
        "currency": "EUR",
    }))
}

pub fn transition(actor: &str, order_id: &str, target: &str) -> TestRequest {
    as_user(TestRequest::post().uri(&format!("/orders/{order_id}/transition")), actor)
        .set_json(json!({ "target_status": target }))
}

/// The order total as a decimal string
pub fn amount(order: &Value) -> String {
    let cents = order["total_amount"].as_i64().expect("total_amount");
    format!("{}.{:02}", cents / 100, cents % 100)
}
