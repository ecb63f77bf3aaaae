//! Integration tests for admin uploads into the downloads directory.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, header};
use serde_json::json;

use checklistpro_integration_tests::{TestContext, json_body};

fn file(name: &str, contents: &[u8]) -> Part {
    Part::bytes(contents.to_vec()).file_name(name.to_owned())
}

#[tokio::test]
async fn test_uploaded_file_backs_a_product_download() {
    let ctx = TestContext::new().await;
    let (admin, _) = ctx.admin("uploads@example.com").await;

    let form = Form::new()
        .text("folder", "restaurant")
        .part("file", file("opening.pdf", b"%PDF-1.7 uploaded"));
    let resp = admin
        .post(ctx.url("/uploads"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let stored = json_body(resp).await;
    assert_eq!(stored["reference"], "restaurant/opening.pdf");
    assert_eq!(stored["content_type"], "application/pdf");
    assert_eq!(stored["size"], 17);

    let resp = admin
        .post(ctx.url("/products"))
        .json(&json!({
            "name": "Restaurant Opening",
            "price": "29.00",
            "formats": { "pdf": stored["reference"] }
        }))
        .send()
        .await
        .unwrap();
    let product = json_body(resp).await;

    let (client, _) = ctx.customer("diner@example.com").await;
    let order = json_body(
        ctx.checkout(
            &client,
            json!([{ "product_id": product["id"], "quantity": 1 }]),
            "pm_card_visa",
        )
        .await,
    )
    .await;
    let resp = client
        .get(ctx.url(&format!(
            "/orders/{}/downloads/{}/pdf",
            order["id"], product["id"]
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(resp.text().await.unwrap(), "%PDF-1.7 uploaded");
}

#[tokio::test]
async fn test_multiple_upload_and_delete() {
    let ctx = TestContext::new().await;
    let (admin, _) = ctx.admin("uploads@example.com").await;

    let form = Form::new()
        .part("files", file("clinic.md", b"# Clinic"))
        .part("files", file("clinic.csv", b"task,done"));
    let resp = admin
        .post(ctx.url("/uploads/multiple"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await;
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert!(ctx.downloads.path().join("clinic.csv").exists());

    let resp = admin
        .delete(ctx.url("/uploads/clinic.csv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(!ctx.downloads.path().join("clinic.csv").exists());

    let resp = admin
        .delete(ctx.url("/uploads/clinic.csv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_uploads_require_admin_and_allowed_types() {
    let ctx = TestContext::new().await;
    let (customer, _) = ctx.customer("shopper@example.com").await;
    let (admin, _) = ctx.admin("uploads@example.com").await;

    let resp = customer
        .post(ctx.url("/uploads"))
        .multipart(Form::new().part("file", file("list.pdf", b"%PDF")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = admin
        .post(ctx.url("/uploads"))
        .multipart(Form::new().part("file", file("tool.exe", b"MZ")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp).await["error"].as_str().unwrap().contains("unsupported"));

    let resp = admin
        .post(ctx.url("/uploads"))
        .multipart(Form::new().text("folder", "restaurant"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"], "No file uploaded");
}
