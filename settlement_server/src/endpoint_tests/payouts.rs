use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::{json, Value};

use super::helpers::{as_user, TestContext};

fn payout_request(amount: &str, method: Option<Value>) -> TestRequest {
    let mut body = json!({ "amount": amount, "currency": "EUR" });
    if let Some(m) = method {
        body["method"] = m;
    }
    as_user(TestRequest::post().uri("/payouts"), "bob").set_json(body)
}

fn wallet() -> Value {
    json!({ "type": "wallet", "handle": "@bob_wallet" })
}

#[actix_web::test]
async fn payouts_are_limited_to_the_withdrawable_balance() {
    let ctx = TestContext::new().await;
    ctx.withdrawable_order("1001", "guitar", "50.00").await;
    let (status, err) = ctx.call_json(payout_request("80.00", Some(wallet()))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "The requested amount, 80.00 EUR, exceeds the withdrawable balance of 50.00 EUR");
    let (status, payout) = ctx.call_json(payout_request("30.00", Some(wallet()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payout["status"], "pending");
    let (status, summary) = ctx.call_json(as_user(TestRequest::get().uri("/earnings"), "bob")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["withdrawable"], 2_000);
    assert_eq!(summary["in_flight"], 3_000);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn undelivered_earnings_cannot_be_withdrawn() {
    let ctx = TestContext::new().await;
    ctx.paid_order("1001", "guitar", "50.00").await;
    let (status, _) = ctx.call(payout_request("25.00", Some(wallet()))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (_, summary) = ctx.call_json(as_user(TestRequest::get().uri("/earnings"), "bob")).await;
    assert_eq!(summary["pending"], 5_000);
    assert_eq!(summary["withdrawable"], 0);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn small_payouts_and_bad_methods_are_refused() {
    let ctx = TestContext::new().await;
    ctx.withdrawable_order("1001", "guitar", "50.00").await;
    let (status, err) = ctx.call_json(payout_request("5.00", Some(wallet()))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "The requested amount, 5.00 EUR, is below the minimum payout of 20.00 EUR");
    let bad_iban = json!({ "type": "bank_transfer", "iban": "not an iban" });
    let (status, _) = ctx.call(payout_request("25.00", Some(bad_iban))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn the_default_method_is_used_when_none_is_given() {
    let ctx = TestContext::new().await;
    ctx.withdrawable_order("1001", "guitar", "50.00").await;
    let (status, _) = ctx.call(payout_request("25.00", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let req = as_user(TestRequest::put().uri("/payouts/method"), "bob").set_json(wallet());
    let (status, stored) = ctx.call_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["method"]["handle"], "@bob_wallet");
    let (status, payout) = ctx.call_json(payout_request("25.00", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payout["method"]["type"], "wallet");
    let (status, payouts) = ctx.call_json(as_user(TestRequest::get().uri("/payouts"), "bob")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payouts.as_array().unwrap().len(), 1);
    let (_, payouts) = ctx.call_json(as_user(TestRequest::get().uri("/payouts"), "alice")).await;
    assert!(payouts.as_array().unwrap().is_empty());
    ctx.tear_down().await;
}
