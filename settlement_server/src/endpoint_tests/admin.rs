use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json;

use super::helpers::{as_admin, as_user, confirm, TestContext};

#[actix_web::test]
async fn admin_routes_need_the_admin_role() {
    let ctx = TestContext::new().await;
    for uri in ["/admin/payouts/pending", "/admin/reconciliation", "/admin/commission"] {
        let (status, _) = ctx.call(as_user(TestRequest::get().uri(uri), "bob")).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        let (status, _) = ctx.call(TestRequest::get().uri(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        let (status, _) = ctx.call(as_admin(TestRequest::get().uri(uri), "root")).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }
    ctx.tear_down().await;
}

#[actix_web::test]
async fn admins_move_payouts_along() {
    let ctx = TestContext::new().await;
    ctx.withdrawable_order("1001", "guitar", "50.00").await;
    let req = as_user(TestRequest::post().uri("/payouts"), "bob")
        .set_json(json!({ "amount": "50.00", "method": { "type": "wallet", "handle": "@bob_wallet" } }));
    let (_, payout) = ctx.call_json(req).await;
    let id = payout["id"].as_i64().unwrap();
    let (status, open) = ctx.call_json(as_admin(TestRequest::get().uri("/admin/payouts/pending"), "root")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(open[0]["id"], id);
    let advance = |status: &str| {
        as_admin(TestRequest::post().uri(&format!("/admin/payouts/{id}/advance")), "root")
            .set_json(json!({ "status": status }))
    };
    let (status, payout) = ctx.call_json(advance("processing")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payout["status"], "processing");
    let (status, _) = ctx.call(advance("pending")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, payout) = ctx.call_json(advance("completed")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payout["processed_by"], "root");
    let missing = as_admin(TestRequest::post().uri("/admin/payouts/999/advance"), "root")
        .set_json(json!({ "status": "failed" }));
    let (status, _) = ctx.call(missing).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn reconciliation_entries_are_resolved_by_admins() {
    let ctx = TestContext::new().await;
    ctx.call(confirm("pi_lost", "4040", "10.00")).await;
    let (_, entries) = ctx.call_json(as_admin(TestRequest::get().uri("/admin/reconciliation"), "root")).await;
    let id = entries[0]["id"].as_i64().unwrap();
    assert_eq!(entries[0]["gateway_reference"], "pi_lost");
    let resolve = |resolution: &str| {
        as_admin(TestRequest::post().uri(&format!("/admin/reconciliation/{id}/resolve")), "root")
            .set_json(json!({ "resolution": resolution }))
    };
    let (status, _) = ctx.call(resolve("  ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = ctx.call(resolve("Refunded the buyer")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, entries) = ctx.call_json(as_admin(TestRequest::get().uri("/admin/reconciliation"), "root")).await;
    assert!(entries.as_array().unwrap().is_empty());
    let req = as_admin(TestRequest::get().uri("/admin/reconciliation?include_resolved=true"), "root");
    let (_, entries) = ctx.call_json(req).await;
    assert_eq!(entries.as_array().unwrap().len(), 1);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn commission_report() {
    let ctx = TestContext::new().await;
    ctx.paid_order("1001", "guitar", "100.00").await;
    ctx.paid_order("1002", "amp", "20.00").await;
    let (status, report) = ctx.call_json(as_admin(TestRequest::get().uri("/admin/commission"), "root")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["transaction_count"], 2);
    // 5.70 + 1.70
    assert_eq!(report["total_commission"], 740);
    assert_eq!(report["seller_earnings"], 12_000);
    ctx.tear_down().await;
}
