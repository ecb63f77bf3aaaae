//! Integration tests for order creation.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::StatusCode;
use serde_json::json;

use checklistpro_integration_tests::{TestContext, json_body};

// ============================================================================
// Pricing
// ============================================================================

#[tokio::test]
async fn test_order_totals_use_catalog_price() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Restaurant Opening", 1000, &[]).await;
    let (client, _) = ctx.customer("buyer@example.com").await;

    let resp = ctx
        .checkout(
            &client,
            json!([{ "product_id": product.id, "quantity": 2 }]),
            "pm_card_visa",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let order = json_body(resp).await;
    assert_eq!(order["subtotal"], "20.00");
    assert_eq!(order["tax"], "1.60");
    assert_eq!(order["total"], "21.60");
    assert_eq!(order["status"], "completed");
    assert_eq!(order["items"][0]["unit_price"], "10.00");
}

#[tokio::test]
async fn test_spoofed_client_price_is_ignored() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Restaurant Opening", 1000, &[]).await;
    let (client, _) = ctx.customer("spoofer@example.com").await;

    let resp = ctx
        .checkout(
            &client,
            json!([{ "productId": product.id, "quantity": 2, "price": "0.01" }]),
            "pm_card_visa",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let order = json_body(resp).await;
    assert_eq!(order["total"], "21.60");
    assert_eq!(order["items"][0]["unit_price"], "10.00");
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_deleted_product_rejects_cart_without_order() {
    let ctx = TestContext::new().await;
    let live = ctx.product("Clinic Setup", 1500, &[]).await;
    let (admin, _) = ctx.admin("admin@example.com").await;
    let (client, _) = ctx.customer("late@example.com").await;

    let deleted = ctx.product("Podcast Launch", 900, &[]).await;
    let resp = admin
        .delete(ctx.url(&format!("/products/{}", deleted.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = ctx
        .checkout(
            &client,
            json!([
                { "product_id": live.id, "quantity": 1 },
                { "product_id": deleted.id, "quantity": 1 },
                { "product_id": 999_999, "quantity": 1 }
            ]),
            "pm_card_visa",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert!(body["error"].is_string());
    assert_eq!(body["details"].as_array().unwrap().len(), 2);

    let orders = json_body(client.get(ctx.url("/orders")).send().await.unwrap()).await;
    assert_eq!(orders["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_empty_cart_and_bad_quantity_are_validation_errors() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Retail Launch", 500, &[]).await;
    let (client, _) = ctx.customer("empty@example.com").await;

    let resp = ctx.checkout(&client, json!([]), "pm_card_visa").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = ctx
        .checkout(
            &client,
            json!([{ "product_id": product.id, "quantity": 0 }]),
            "pm_card_visa",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_requires_login() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Retail Launch", 500, &[]).await;

    let resp = ctx
        .checkout(
            &TestContext::client(),
            json!([{ "product_id": product.id, "quantity": 1 }]),
            "pm_card_visa",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await["error"], "Authentication required");
}

// ============================================================================
// Payment outcomes
// ============================================================================

#[tokio::test]
async fn test_declined_payment_cancels_order_without_entitlement() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Consulting Kit", 2500, &[("pdf", "consulting.pdf")]).await;
    let (client, _) = ctx.customer("declined@example.com").await;

    let resp = ctx
        .checkout(
            &client,
            json!([{ "product_id": product.id, "quantity": 1 }]),
            "pm_card_declined",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("Payment failed for order"));

    let orders = json_body(client.get(ctx.url("/orders")).send().await.unwrap()).await;
    assert_eq!(orders["orders"][0]["status"], "cancelled");

    let downloads = json_body(client.get(ctx.url("/downloads")).send().await.unwrap()).await;
    assert!(downloads["downloads"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_provider_failure_leaves_order_processing() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Consulting Kit", 2500, &[]).await;
    let (client, _) = ctx.customer("outage@example.com").await;

    let resp = ctx
        .checkout(
            &client,
            json!([{ "product_id": product.id, "quantity": 1 }]),
            "pm_card_error",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let orders = json_body(client.get(ctx.url("/orders")).send().await.unwrap()).await;
    assert_eq!(orders["orders"][0]["status"], "processing");
}

#[tokio::test]
async fn test_idempotent_replay_returns_same_order() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Clinic Setup", 1500, &[]).await;
    let (client, _) = ctx.customer("retry@example.com").await;

    let send = || {
        client
            .post(ctx.url("/orders"))
            .header("Idempotency-Key", "checkout-7f3a")
            .json(&json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "payment_method": "pm_card_visa"
            }))
            .send()
    };

    let first = json_body(send().await.unwrap()).await;
    let second = json_body(send().await.unwrap()).await;
    assert_eq!(first["id"], second["id"]);

    let orders = json_body(client.get(ctx.url("/orders")).send().await.unwrap()).await;
    assert_eq!(orders["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_customers_cannot_see_each_others_orders() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Clinic Setup", 1500, &[]).await;
    let (alice, _) = ctx.customer("alice@example.com").await;
    let (bob, _) = ctx.customer("bob@example.com").await;

    let order = json_body(
        ctx.checkout(
            &alice,
            json!([{ "product_id": product.id, "quantity": 1 }]),
            "pm_card_visa",
        )
        .await,
    )
    .await;

    let resp = bob
        .get(ctx.url(&format!("/orders/{}", order["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = bob.get(ctx.url("/orders?all=true")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_completed_order_cannot_be_cancelled() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Clinic Setup", 1500, &[]).await;
    let (client, _) = ctx.customer("undo@example.com").await;

    let order = json_body(
        ctx.checkout(
            &client,
            json!([{ "product_id": product.id, "quantity": 1 }]),
            "pm_card_visa",
        )
        .await,
    )
    .await;

    let resp = client
        .put(ctx.url(&format!("/orders/{}/cancel", order["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}
