//! Integration tests for entitlements and file downloads.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::{Client, StatusCode, header};
use serde_json::{Value, json};

use checklistpro_integration_tests::{TestContext, json_body};
use checklistpro_storefront::models::Product;

async fn buy(ctx: &TestContext, client: &Client, product: &Product) -> Value {
    let resp = ctx
        .checkout(
            client,
            json!([{ "product_id": product.id, "quantity": 1 }]),
            "pm_card_visa",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    json_body(resp).await
}

fn download_url(ctx: &TestContext, order: &Value, product: &Product, format: &str) -> String {
    ctx.url(&format!(
        "/orders/{}/downloads/{}/{format}",
        order["id"], product.id
    ))
}

// ============================================================================
// Stored files
// ============================================================================

#[tokio::test]
async fn test_purchased_file_is_downloadable() {
    let ctx = TestContext::new().await;
    ctx.write_download("restaurant/opening.pdf", "%PDF-1.7 opening");
    let product = ctx
        .product("Restaurant Opening", 2900, &[("pdf", "restaurant/opening.pdf")])
        .await;
    let (client, _) = ctx.customer("owner@example.com").await;
    let order = buy(&ctx, &client, &product).await;

    let resp = client
        .get(download_url(&ctx, &order, &product, "PDF"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"opening.pdf\""
    );
    assert_eq!(resp.text().await.unwrap(), "%PDF-1.7 opening");

    let detail = json_body(
        client
            .get(ctx.url("/products/restaurant-opening"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(detail["download_count"], 1);
}

#[tokio::test]
async fn test_entitlements_are_listed_per_order() {
    let ctx = TestContext::new().await;
    let product = ctx
        .product("Clinic Setup", 1500, &[("pdf", "clinic.pdf"), ("docx", "clinic.docx")])
        .await;
    let (client, _) = ctx.customer("clinic@example.com").await;
    let order = buy(&ctx, &client, &product).await;

    let all = json_body(client.get(ctx.url("/downloads")).send().await.unwrap()).await;
    let downloads = all["downloads"].as_array().unwrap();
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0]["product_id"], json!(product.id));
    assert_eq!(downloads[0]["formats"], json!(["docx", "pdf"]));

    let one = json_body(
        client
            .get(ctx.url(&format!("/orders/{}/downloads", order["id"])))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(one["downloads"][0]["order_id"], order["id"]);
}

#[tokio::test]
async fn test_disabled_product_stays_downloadable_for_buyers() {
    let ctx = TestContext::new().await;
    ctx.write_download("bakery.pdf", "%PDF-1.7 bakery");
    let product = ctx.product("Bakery Opening", 1700, &[("pdf", "bakery.pdf")]).await;
    let (client, _) = ctx.customer("baker@example.com").await;
    let (admin, _) = ctx.admin("catalog-ops@example.com").await;
    let order = buy(&ctx, &client, &product).await;

    let resp = admin
        .delete(ctx.url(&format!("/products/{}", product.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["enabled"], false);

    let resp = client
        .get(download_url(&ctx, &order, &product, "pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "%PDF-1.7 bakery");

    let all = json_body(client.get(ctx.url("/downloads")).send().await.unwrap()).await;
    let downloads = all["downloads"].as_array().unwrap();
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0]["product_id"], json!(product.id));
    assert_eq!(downloads[0]["formats"], json!(["pdf"]));
}

// ============================================================================
// Access control
// ============================================================================

#[tokio::test]
async fn test_other_users_order_is_forbidden() {
    let ctx = TestContext::new().await;
    ctx.write_download("podcast.pdf", "%PDF-1.7 podcast");
    let product = ctx.product("Podcast Launch", 900, &[("pdf", "podcast.pdf")]).await;
    let (alice, _) = ctx.customer("alice@example.com").await;
    let (bob, _) = ctx.customer("bob@example.com").await;
    let order = buy(&ctx, &bob, &product).await;

    let resp = alice
        .get(download_url(&ctx, &order, &product, "pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await["error"], "You have not purchased this product");

    let resp = alice
        .get(ctx.url(&format!("/orders/{}/downloads", order["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_order_is_forbidden_not_missing() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Podcast Launch", 900, &[("pdf", "podcast.pdf")]).await;
    let (client, _) = ctx.customer("outsider@example.com").await;

    let resp = client
        .get(ctx.url(&format!("/orders/424242/downloads/{}/pdf", product.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_completion_unlocks_downloads() {
    let ctx = TestContext::new().await;
    ctx.write_download("retail.pdf", "%PDF-1.7 retail");
    let product = ctx.product("Retail Launch", 1200, &[("pdf", "retail.pdf")]).await;
    let (client, _) = ctx.customer("stuck@example.com").await;
    let (admin, _) = ctx.admin("ops@example.com").await;

    let resp = ctx
        .checkout(
            &client,
            json!([{ "product_id": product.id, "quantity": 1 }]),
            "pm_card_error",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let orders = json_body(client.get(ctx.url("/orders")).send().await.unwrap()).await;
    let order = orders["orders"][0].clone();
    assert_eq!(order["status"], "processing");

    let resp = client
        .get(download_url(&ctx, &order, &product, "pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = admin
        .put(ctx.url(&format!("/orders/{}/status", order["id"])))
        .json(&json!({ "status": "completed", "note": "Payment confirmed by phone" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "completed");

    let resp = client
        .get(download_url(&ctx, &order, &product, "pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let history = json_body(
        client
            .get(ctx.url(&format!("/orders/{}/history", order["id"])))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(history.as_array().unwrap().last().unwrap()["to_status"], "completed");
}

#[tokio::test]
async fn test_customer_cannot_force_status() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Retail Launch", 1200, &[]).await;
    let (client, _) = ctx.customer("sneaky@example.com").await;

    ctx.checkout(
        &client,
        json!([{ "product_id": product.id, "quantity": 1 }]),
        "pm_card_error",
    )
    .await;
    let orders = json_body(client.get(ctx.url("/orders")).send().await.unwrap()).await;

    let resp = client
        .put(ctx.url(&format!("/orders/{}/status", orders["orders"][0]["id"])))
        .json(&json!({ "status": "completed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await["error"], "Admin access required");
}

// ============================================================================
// Missing files
// ============================================================================

#[tokio::test]
async fn test_html_is_generated_from_markdown_source() {
    let ctx = TestContext::new().await;
    ctx.write_download("truck/launch.md", "# Food Truck Launch\n\n- [ ] Book commissary kitchen\n");
    let product = ctx
        .product(
            "Food Truck Launch",
            1900,
            &[("markdown", "truck/launch.md"), ("html", "truck/launch.html")],
        )
        .await;
    let (client, _) = ctx.customer("truck@example.com").await;
    let order = buy(&ctx, &client, &product).await;

    let resp = client
        .get(download_url(&ctx, &order, &product, "html"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
    let html = resp.text().await.unwrap();
    assert!(html.contains("<h1>Food Truck Launch</h1>"));
    assert!(html.contains("commissary"));
}

#[tokio::test]
async fn test_pdf_is_generated_from_markdown_source() {
    let ctx = TestContext::new().await;
    ctx.write_download("truck/launch.md", "# Real Truck Checklist\n\n- [ ] Book commissary kitchen\n");
    let product = ctx
        .product(
            "Food Truck Launch",
            1900,
            &[("markdown", "truck/launch.md"), ("pdf", "truck/launch.pdf")],
        )
        .await;
    let (client, _) = ctx.customer("truckpdf@example.com").await;
    let order = buy(&ctx, &client, &product).await;

    let resp = client
        .get(download_url(&ctx, &order, &product, "pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"launch.pdf\""
    );
    let body = resp.bytes().await.unwrap();
    assert!(body.starts_with(b"%PDF-"));
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("(Real Truck Checklist) Tj"));
    assert!(text.contains("([ ] Book commissary kitchen) Tj"));
}

#[tokio::test]
async fn test_placeholder_when_nothing_is_stored() {
    let ctx = TestContext::new().await;
    let product = ctx.product("Consulting Kit", 2500, &[("docx", "consulting.docx")]).await;
    let (client, _) = ctx.customer("consult@example.com").await;
    let order = buy(&ctx, &client, &product).await;

    let resp = client
        .get(download_url(&ctx, &order, &product, "docx"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    let body = resp.text().await.unwrap();
    assert!(body.starts_with("# Consulting Kit"));
    assert!(body.contains("Step-by-step tasks"));
}

#[tokio::test]
async fn test_unknown_format_and_escaping_reference_are_not_found() {
    let ctx = TestContext::new().await;
    let product = ctx
        .product("Clinic Setup", 1500, &[("pdf", "../../etc/passwd")])
        .await;
    let (client, _) = ctx.customer("paths@example.com").await;
    let order = buy(&ctx, &client, &product).await;

    let resp = client
        .get(download_url(&ctx, &order, &product, "xlsx"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["error"], "Format not available");

    let resp = client
        .get(download_url(&ctx, &order, &product, "pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["error"], "File not available");
}
