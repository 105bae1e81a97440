//! Store connection, sync and webhook flows against the scripted Shopify.

#![allow(clippy::unwrap_used)]

use amts_api::shopify::{RemoteProduct, RemoteVariant};
use amts_integration_tests::{SHOPIFY_SECRET, TestApp, connected_redirect};
use axum::http::{Method, StatusCode, header};
use serde_json::json;

const SHOP: &str = "greenleaf.myshopify.com";

fn remote(id: i64, title: &str, price: &str) -> RemoteProduct {
    RemoteProduct {
        id: Some(id),
        title: title.to_string(),
        body_html: Some(format!("<p>{title}</p>")),
        tags: "indica, relaxing".to_string(),
        status: Some("active".to_string()),
        variants: vec![RemoteVariant {
            price: Some(price.to_string()),
            sku: Some(format!("SKU-{id}")),
            inventory_quantity: Some(12),
            ..RemoteVariant::default()
        }],
        ..RemoteProduct::default()
    }
}

#[tokio::test]
async fn test_install_returns_authorize_url_for_the_shop() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;

    let response = app
        .get(
            &format!("/api/shopify/auth/install?shop={SHOP}"),
            &session.access_token,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let auth_url = response.str("auth_url");
    assert!(auth_url.starts_with(&format!("https://{SHOP}/admin/oauth/authorize")));
    assert!(auth_url.contains("state="));
}

#[tokio::test]
async fn test_install_rejects_a_malformed_domain() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;

    let response = app
        .get(
            "/api/shopify/auth/install?shop=bad!shop",
            &session.access_token,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_connects_the_store_and_redirects() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;
    let state = app.begin_install(&session.access_token, SHOP).await;

    let response = app.callback("code-1", SHOP, &state).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers[header::LOCATION].to_str().unwrap(),
        connected_redirect()
    );

    let stores = app.get("/api/shopify/stores", &session.access_token).await;
    let stores = stores.body.as_array().unwrap();
    assert_eq!(stores.len(), 1);
    assert_eq!(stores[0]["shop_domain"], SHOP);
    assert_eq!(stores[0]["status"], "connected");
    assert_eq!(stores[0]["name"], "greenleaf Dispensary");
    assert!(stores[0].get("access_token").is_none());
}

#[tokio::test]
async fn test_oauth_state_is_single_use() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;
    let state = app.begin_install(&session.access_token, SHOP).await;

    let first = app.callback("code-1", SHOP, &state).await;
    assert_eq!(first.status, StatusCode::SEE_OTHER);

    let replay = app.callback("code-2", SHOP, &state).await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.shopify.tokens_issued(), 1);
}

#[tokio::test]
async fn test_callback_rejects_state_issued_for_another_shop() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;
    let state = app.begin_install(&session.access_token, SHOP).await;

    let response = app.callback("code-1", "other.myshopify.com", &state).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.shopify.tokens_issued(), 0);
}

#[tokio::test]
async fn test_reinstall_reuses_the_existing_store() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;
    let first = app.connect_store(&session.access_token, SHOP).await;
    let second = app.connect_store(&session.access_token, SHOP).await;

    assert_eq!(first, second);
    let stores = app.get("/api/shopify/stores", &session.access_token).await;
    assert_eq!(stores.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_exchange_is_reported() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;
    let state = app.begin_install(&session.access_token, SHOP).await;
    app.shopify.fail_exchange(true);

    let response = app.callback("code-1", SHOP, &state).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let stores = app.get("/api/shopify/stores", &session.access_token).await;
    assert!(stores.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_imports_once_and_updates_in_place() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;
    let store_id = app.connect_store(&session.access_token, SHOP).await;
    app.shopify.set_products(vec![
        remote(101, "Blue Dream", "35.00"),
        remote(102, "Sour Diesel", "40.00"),
    ]);

    let sync_path = format!("/api/shopify/stores/{store_id}/sync");
    let first = app.post(&sync_path, &session.access_token, json!({})).await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.text);
    assert_eq!(first.body["synced"], 2);

    app.shopify.set_products(vec![
        remote(101, "Blue Dream Reserve", "38.00"),
        remote(102, "Sour Diesel", "40.00"),
    ]);
    let second = app.post(&sync_path, &session.access_token, json!({})).await;
    assert_eq!(second.status, StatusCode::OK);

    let products = app
        .get(
            &format!("/api/products?store_id={store_id}"),
            &session.access_token,
        )
        .await;
    let products = products.body.as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert!(products.iter().any(|p| p["title"] == "Blue Dream Reserve"));
    assert!(products.iter().all(|p| p["synced_to_shopify"] == true));

    let store = app
        .get(&format!("/api/shopify/stores/{store_id}"), &session.access_token)
        .await;
    assert_eq!(store.body["products_count"], 2);
    assert!(store.body["last_synced"].is_string());
}

#[tokio::test]
async fn test_other_merchants_cannot_touch_a_store() {
    let app = TestApp::new();
    let owner = app.signup("owner@example.com").await;
    let intruder = app.signup("intruder@example.com").await;
    let store_id = app.connect_store(&owner.access_token, SHOP).await;
    let path = format!("/api/shopify/stores/{store_id}");

    let read = app.get(&path, &intruder.access_token).await;
    assert_eq!(read.status, StatusCode::FORBIDDEN);

    let delete = app
        .request(Method::DELETE, &path, Some(&intruder.access_token), None)
        .await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);

    let still_there = app.get(&path, &owner.access_token).await;
    assert_eq!(still_there.status, StatusCode::OK);
}

#[tokio::test]
async fn test_owner_can_disconnect_a_store() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;
    let store_id = app.connect_store(&session.access_token, SHOP).await;
    let path = format!("/api/shopify/stores/{store_id}");

    let delete = app
        .request(Method::DELETE, &path, Some(&session.access_token), None)
        .await;
    assert_eq!(delete.status, StatusCode::OK);

    let gone = app.get(&path, &session.access_token).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_pushes_a_local_product() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;
    let store_id = app.connect_store(&session.access_token, SHOP).await;

    let created = app
        .post(
            "/api/products",
            &session.access_token,
            json!({"store_id": store_id, "title": "Gelato Gummies", "price": "24.99"}),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.text);
    let product_id = created.str("id").to_string();

    let export = app
        .post(
            &format!("/api/shopify/stores/{store_id}/export/{product_id}"),
            &session.access_token,
            json!({}),
        )
        .await;
    assert_eq!(export.status, StatusCode::OK, "{}", export.text);
    assert_eq!(export.body["success"], true);
    assert!(export.body["shopify_product_id"].is_i64());
    assert_eq!(app.shopify.products().len(), 1);

    let product = app
        .get(&format!("/api/products/{product_id}"), &session.access_token)
        .await;
    assert_eq!(product.body["synced_to_shopify"], true);
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_rejected() {
    let app = TestApp::new();
    let response = app
        .webhook("app/uninstalled", SHOP, "{}", "not-the-secret")
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_uninstall_webhook_disconnects_the_store() {
    let app = TestApp::new();
    let session = app.signup("grower@example.com").await;
    let store_id = app.connect_store(&session.access_token, SHOP).await;

    let response = app
        .webhook("app/uninstalled", SHOP, r#"{"id":1}"#, SHOPIFY_SECRET)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.str("message"), "Webhook processed");

    let store = app
        .get(&format!("/api/shopify/stores/{store_id}"), &session.access_token)
        .await;
    assert_eq!(store.body["status"], "disconnected");

    let sync = app
        .post(
            &format!("/api/shopify/stores/{store_id}/sync"),
            &session.access_token,
            json!({}),
        )
        .await;
    assert_eq!(sync.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unrelated_webhook_topics_are_acknowledged() {
    let app = TestApp::new();
    let response = app
        .webhook("products/update", SHOP, r#"{"id":1}"#, SHOPIFY_SECRET)
        .await;
    assert_eq!(response.status, StatusCode::OK);
}
