use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json;

use super::helpers::{as_admin, as_user, checkout, transition, TestContext};

#[actix_web::test]
async fn health_check() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx.call(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn checkout_freezes_the_fees() {
    let ctx = TestContext::new().await;
    let (status, order) = ctx.call_json(checkout("1001", "guitar", "100.00")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["service_fee"], 570);
    assert_eq!(order["shipping_cost"], 500);
    assert_eq!(order["total_amount"], 11_070);
    // Repeating the checkout returns the same order
    let (status, again) = ctx.call_json(checkout("1001", "guitar", "100.00")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], order["id"]);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn checkout_requires_the_buyer() {
    let ctx = TestContext::new().await;
    let body = json!({
        "order_id": "1001", "buyer_id": "alice", "seller_id": "bob", "product_id": "guitar", "price": "100.00"
    });
    let (status, _) = ctx.call(TestRequest::post().uri("/orders").set_json(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, err) = ctx.call_json(as_user(TestRequest::post().uri("/orders"), "mallory").set_json(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["error"], "You can only check out on your own behalf");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn malformed_prices_are_bad_requests() {
    let ctx = TestContext::new().await;
    let (status, _) = ctx.call(checkout("1001", "guitar", "12.345")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = ctx.call(checkout("1002", "guitar", "0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn prices_near_the_integer_limit_are_refused() {
    let ctx = TestContext::new().await;
    let (status, err) = ctx.call_json(checkout("1003", "yacht", "92233720368547757.07")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "The price cannot be more than 1000000.00");
    // The worker is still serving requests
    let (status, _) = ctx.call(checkout("1004", "guitar", "100.00")).await;
    assert_eq!(status, StatusCode::OK);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn orders_are_only_visible_to_their_parties() {
    let ctx = TestContext::new().await;
    ctx.call(checkout("1001", "guitar", "100.00")).await;
    let get = || TestRequest::get().uri("/orders/1001");
    let (status, order) = ctx.call_json(as_user(get(), "bob")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["buyer_id"], "alice");
    let (status, _) = ctx.call(as_user(get(), "carol")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx.call(as_admin(get(), "root")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ctx.call(as_user(TestRequest::get().uri("/orders/9999"), "alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn transitions_check_the_state_machine_and_the_caller() {
    let ctx = TestContext::new().await;
    ctx.call(checkout("1001", "guitar", "100.00")).await;
    // Orders can't skip ahead
    let (status, err) = ctx.call_json(transition("bob", "1001", "shipped")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"], "Cannot change the order status from pending to shipped");
    // Nobody can mark an order as paid by hand
    let (status, _) = ctx.call(transition("alice", "1001", "paid")).await;
    assert!(status == StatusCode::FORBIDDEN || status == StatusCode::CONFLICT, "{status}");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn only_the_seller_ships() {
    let ctx = TestContext::new().await;
    ctx.paid_order("1001", "guitar", "100.00").await;
    let (status, _) = ctx.call(transition("alice", "1001", "shipped")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let req = as_user(TestRequest::post().uri("/orders/1001/transition"), "bob")
        .set_json(json!({ "target_status": "shipped", "tracking_number": "TRACK-1" }));
    let (status, result) = ctx.call_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["previous_status"], "paid");
    assert_eq!(result["order"]["status"], "shipped");
    assert_eq!(result["order"]["tracking_number"], "TRACK-1");
    let (status, result) = ctx.call_json(transition("alice", "1001", "delivered")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(result["order"]["delivered_at"].is_string());
    ctx.tear_down().await;
}

fn order_ids(orders: &serde_json::Value) -> Vec<&str> {
    orders.as_array().expect("a list of orders").iter().map(|o| o["order_id"].as_str().expect("order_id")).collect()
}

/// Alice buys a guitar (paid) and a lamp (pending) from Bob, and sells Bob a vase.
async fn trade(ctx: &TestContext) {
    ctx.paid_order("1001", "guitar", "100.00").await;
    let (status, _) = ctx.call(checkout("1002", "lamp", "25.00")).await;
    assert_eq!(status, StatusCode::OK);
    let body = json!({
        "order_id": "2001", "buyer_id": "bob", "seller_id": "alice", "product_id": "vase", "price": "40.00"
    });
    let (status, _) = ctx.call(as_user(TestRequest::post().uri("/orders"), "bob").set_json(body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn callers_list_their_own_orders() {
    let ctx = TestContext::new().await;
    trade(&ctx).await;
    let list = |uri: &str, who: &str| as_user(TestRequest::get().uri(uri), who);

    let (status, orders) = ctx.call_json(list("/orders", "alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order_ids(&orders), ["2001", "1002", "1001"]);
    let (_, orders) = ctx.call_json(list("/orders?role=buyer", "alice")).await;
    assert_eq!(order_ids(&orders), ["1002", "1001"]);
    let (_, orders) = ctx.call_json(list("/orders?role=seller", "alice")).await;
    assert_eq!(order_ids(&orders), ["2001"]);
    let (_, orders) = ctx.call_json(list("/orders?role=buyer&status=paid", "alice")).await;
    assert_eq!(order_ids(&orders), ["1001"]);
    let (_, orders) = ctx.call_json(list("/orders?limit=1&offset=1", "alice")).await;
    assert_eq!(order_ids(&orders), ["1002"]);
    // Nobody sees other people's orders
    let (_, orders) = ctx.call_json(list("/orders", "carol")).await;
    assert!(order_ids(&orders).is_empty());

    let (status, _) = ctx.call(list("/orders?status=lost", "alice")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = ctx.call(TestRequest::get().uri("/orders")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn order_stats_count_purchases_and_sales() {
    let ctx = TestContext::new().await;
    trade(&ctx).await;
    let stats = || as_user(TestRequest::get().uri("/orders/stats"), "alice");

    let (status, s) = ctx.call_json(stats()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(s["user_id"], "alice");
    assert_eq!(s["purchases"]["total"], 2);
    assert_eq!(s["purchases"]["paid"], 1);
    assert_eq!(s["purchases"]["pending"], 1);
    // 110.70 for the guitar and 31.95 for the lamp
    assert_eq!(s["purchases"]["total_value"], 14_265);
    assert_eq!(s["sales"]["total"], 1);
    assert_eq!(s["sales"]["pending"], 1);
    assert_eq!(s["sales"]["total_value"], 4_770);

    let (status, _) = ctx.call(transition("alice", "1002", "cancelled")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, s) = ctx.call_json(stats()).await;
    assert_eq!(s["purchases"]["total"], 2);
    assert_eq!(s["purchases"]["cancelled"], 1);
    assert_eq!(s["purchases"]["total_value"], 11_070);

    let (_, s) = ctx.call_json(as_user(TestRequest::get().uri("/orders/stats"), "carol")).await;
    assert_eq!(s["purchases"]["total"], 0);
    assert_eq!(s["sales"]["total_value"], 0);
    ctx.tear_down().await;
}
