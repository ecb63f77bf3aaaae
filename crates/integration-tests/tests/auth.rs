//! Integration tests for sessions and account management.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::StatusCode;
use serde_json::json;

use checklistpro_integration_tests::{PASSWORD, TestContext, json_body};

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn test_register_logs_in_as_customer() {
    let ctx = TestContext::new().await;
    let (client, user) = ctx.customer("new@example.com").await;
    assert_eq!(user["role"], "customer");
    assert_eq!(user["active"], true);
    assert!(user.get("password_hash").is_none());

    let me = json_body(client.get(ctx.url("/auth/me")).send().await.unwrap()).await;
    assert_eq!(me["email"], "new@example.com");
    assert_eq!(me["id"], user["id"]);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let ctx = TestContext::new().await;
    let (client, _) = ctx.customer("leaving@example.com").await;

    let resp = client.post(ctx.url("/auth/logout")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client.get(ctx.url("/auth/me")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_with_wrong_password_is_rejected() {
    let ctx = TestContext::new().await;
    ctx.customer("careful@example.com").await;

    let client = TestContext::client();
    let resp = client
        .post(ctx.url("/auth/login"))
        .json(&json!({ "email": "careful@example.com", "password": "not-the-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await["error"], "Invalid credentials");

    let resp = client
        .post(ctx.url("/auth/login"))
        .json(&json!({ "email": "nobody@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await["error"], "Invalid credentials");
}

// ============================================================================
// Registration rules
// ============================================================================

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let ctx = TestContext::new().await;
    ctx.customer("taken@example.com").await;

    let resp = TestContext::client()
        .post(ctx.url("/auth/register"))
        .json(&json!({
            "firstName": "Second",
            "lastName": "Person",
            "email": "taken@example.com",
            "password": PASSWORD
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_registration_validation_errors() {
    let ctx = TestContext::new().await;
    let client = TestContext::client();

    let resp = client
        .post(ctx.url("/auth/register"))
        .json(&json!({
            "first_name": "Short",
            "last_name": "Password",
            "email": "short@example.com",
            "password": "abc"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert_eq!(body["error"], "Validation failed");
    assert!(!body["details"].as_array().unwrap().is_empty());

    let resp = client
        .post(ctx.url("/auth/register"))
        .json(&json!({
            "first_name": "Typo",
            "last_name": "Confirm",
            "email": "typo@example.com",
            "password": PASSWORD,
            "confirmPassword": "correct-horse-battery-staple"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["details"][0], "Passwords do not match");
}

// ============================================================================
// Self-service
// ============================================================================

#[tokio::test]
async fn test_profile_update_and_password_change() {
    let ctx = TestContext::new().await;
    let (client, _) = ctx.customer("profile@example.com").await;

    let resp = client
        .put(ctx.url("/auth/me"))
        .json(&json!({ "firstName": "Dana" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let user = json_body(resp).await;
    assert_eq!(user["first_name"], "Dana");
    assert_eq!(user["last_name"], "Customer");

    let resp = client
        .post(ctx.url("/auth/change-password"))
        .json(&json!({
            "current_password": PASSWORD,
            "new_password": "a-much-longer-passphrase"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = TestContext::client()
        .post(ctx.url("/auth/login"))
        .json(&json!({ "email": "profile@example.com", "password": "a-much-longer-passphrase" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// ============================================================================
// Admin user management
// ============================================================================

#[tokio::test]
async fn test_customer_cannot_reach_admin_routes() {
    let ctx = TestContext::new().await;
    let (client, _) = ctx.customer("curious@example.com").await;

    for path in ["/users", "/analytics", "/admin/products"] {
        let resp = client.get(ctx.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{path}");
    }

    let resp = TestContext::client().get(ctx.url("/users")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_promotes_and_deactivates_users() {
    let ctx = TestContext::new().await;
    let (admin, _) = ctx.admin("root@example.com").await;
    let (_, user) = ctx.customer("staff@example.com").await;

    let users = json_body(admin.get(ctx.url("/users")).send().await.unwrap()).await;
    assert_eq!(users["pagination"]["total"], 2);

    let resp = admin
        .put(ctx.url(&format!("/users/{}/role", user["id"])))
        .json(&json!({ "role": "admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["role"], "admin");

    let resp = admin
        .put(ctx.url(&format!("/users/{}/active", user["id"])))
        .json(&json!({ "active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = TestContext::client()
        .post(ctx.url("/auth/login"))
        .json(&json!({ "email": "staff@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await["error"], "Account is disabled");
}

#[tokio::test]
async fn test_admin_cannot_demote_or_deactivate_self() {
    let ctx = TestContext::new().await;
    let (admin, me) = ctx.admin("solo@example.com").await;

    let resp = admin
        .put(ctx.url(&format!("/users/{}/role", me["id"])))
        .json(&json!({ "role": "customer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = admin
        .put(ctx.url(&format!("/users/{}/active", me["id"])))
        .json(&json!({ "active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = admin.get(ctx.url("/users")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_demoted_admin_loses_access_immediately() {
    let ctx = TestContext::new().await;
    let (first, _) = ctx.admin("first@example.com").await;
    let (second, second_user) = ctx.admin("second@example.com").await;

    let resp = first
        .put(ctx.url(&format!("/users/{}/role", second_user["id"])))
        .json(&json!({ "role": "customer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = second.get(ctx.url("/users")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_demoted_admin_loses_cross_user_order_access() {
    let ctx = TestContext::new().await;
    let (first, _) = ctx.admin("first@example.com").await;
    let (second, second_user) = ctx.admin("second@example.com").await;
    let (customer, _) = ctx.customer("buyer@example.com").await;
    let product = ctx.product("Podcast Launch", 900, &[]).await;
    let order = json_body(
        ctx.checkout(
            &customer,
            json!([{ "product_id": product.id, "quantity": 1 }]),
            "pm_card_visa",
        )
        .await,
    )
    .await;

    let order_path = format!("/orders/{}", order["id"]);
    for path in ["/orders?all=true", order_path.as_str()] {
        let resp = second.get(ctx.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
    }

    let resp = first
        .put(ctx.url(&format!("/users/{}/role", second_user["id"])))
        .json(&json!({ "role": "customer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let history_path = format!("{order_path}/history");
    for path in ["/orders?all=true", order_path.as_str(), history_path.as_str()] {
        let resp = second.get(ctx.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{path}");
    }

    let me = json_body(second.get(ctx.url("/auth/me")).send().await.unwrap()).await;
    assert_eq!(me["role"], "customer");
}

#[tokio::test]
async fn test_deactivated_customer_session_is_rejected() {
    let ctx = TestContext::new().await;
    let (admin, _) = ctx.admin("root@example.com").await;
    let (customer, user) = ctx.customer("lapsed@example.com").await;
    let product = ctx.product("Clinic Setup", 1500, &[("pdf", "clinic.pdf")]).await;
    let order = json_body(
        ctx.checkout(
            &customer,
            json!([{ "product_id": product.id, "quantity": 1 }]),
            "pm_card_visa",
        )
        .await,
    )
    .await;

    let resp = admin
        .put(ctx.url(&format!("/users/{}/active", user["id"])))
        .json(&json!({ "active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = ctx
        .checkout(
            &customer,
            json!([{ "product_id": product.id, "quantity": 1 }]),
            "pm_card_visa",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await["error"], "Account is disabled");

    let resp = customer
        .get(ctx.url(&format!(
            "/orders/{}/downloads/{}/pdf",
            order["id"], product.id
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = customer.get(ctx.url("/downloads")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
