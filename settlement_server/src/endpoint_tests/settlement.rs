use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json;

use super::helpers::{amount, as_admin, as_user, checkout, confirm, TestContext};

#[actix_web::test]
async fn confirmations_are_idempotent() {
    let ctx = TestContext::new().await;
    let (_, order) = ctx.call_json(checkout("1001", "guitar", "100.00")).await;
    assert_eq!(amount(&order), "110.70");
    let (status, first) = ctx.call_json(confirm("pi_1", "1001", "110.70")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["duplicate"], false);
    assert_eq!(first["status"], "paid");
    assert_eq!(first["transaction"]["commission_amount"], 570);
    assert_eq!(first["transaction"]["seller_earnings"], 10_000);
    let (status, second) = ctx.call_json(confirm("pi_1", "1001", "110.70")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["duplicate"], true);
    assert_eq!(second["transaction"]["id"], first["transaction"]["id"]);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn rejected_confirmations_are_queued_for_reconciliation() {
    let ctx = TestContext::new().await;
    ctx.call(checkout("1001", "guitar", "100.00")).await;
    let (status, err) = ctx.call_json(confirm("pi_1", "1001", "100.00")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().starts_with("Payment amount mismatch"));
    let (status, _) = ctx.call(confirm("pi_2", "4040", "10.00")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, entries) = ctx.call_json(as_admin(TestRequest::get().uri("/admin/reconciliation"), "root")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries.as_array().unwrap().len(), 2);
    // The order is still payable
    let (status, _) = ctx.call(confirm("pi_3", "1001", "110.70")).await;
    assert_eq!(status, StatusCode::OK);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn a_second_payment_is_stale() {
    let ctx = TestContext::new().await;
    ctx.paid_order("1001", "guitar", "100.00").await;
    let (status, _) = ctx.call(confirm("pi_other", "1001", "110.70")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn failed_payments_cancel_pending_orders() {
    let ctx = TestContext::new().await;
    ctx.call(checkout("1001", "guitar", "100.00")).await;
    let failed = || {
        TestRequest::post().uri("/settlement/failed").set_json(json!({
            "gateway_reference": "pi_1",
            "order_id": "1001",
            "reason": "card declined",
        }))
    };
    let (status, res) = ctx.call_json(failed()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["success"], true);
    assert_eq!(res["message"], "Order 1001 has been cancelled");
    let (status, res) = ctx.call_json(failed()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["message"], "Order 1001 was already cancelled");
    let (_, order) = ctx.call_json(as_user(TestRequest::get().uri("/orders/1001"), "alice")).await;
    assert_eq!(order["status"], "cancelled");
    ctx.tear_down().await;
}
