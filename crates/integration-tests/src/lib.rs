//! End-to-end tests for the AMTS API.
//!
//! Each test builds the real router over in-memory repositories and a
//! scripted Shopify, then drives it with `tower::ServiceExt::oneshot`. No
//! database or network is needed:
//!
//! ```bash
//! cargo test -p amts-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use amts_api::config::{ApiConfig, JwtConfig, ShopifyConfig};
use amts_api::db::Repositories;
use amts_api::shopify::fake::{FakeConnector, FakeShopify};
use amts_api::shopify::webhook;
use amts_api::{AppState, app};
use amts_core::{UserId, UserRole};

/// Webhook signing key and Shopify app secret used by every test app.
pub const SHOPIFY_SECRET: &str = "shpss_7fQ2mZ9xK4vR8tL1wN6cB3dH5jP0sY";

const JWT_SECRET: &str = "Zt8#qW2!mX5@vN9$kR3^bL7&cJ1*hF4%";
const DASHBOARD: &str = "http://dashboard.test";

/// A response with its body decoded as JSON (`Value::Null` when empty or
/// not JSON).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestResponse {
    /// A string field of the body, or `""`.
    #[must_use]
    pub fn str(&self, field: &str) -> &str {
        self.body.get(field).and_then(Value::as_str).unwrap_or_default()
    }
}

/// Tokens and id of a signed-up account.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// The API wired to in-memory storage and a fake Shopify.
pub struct TestApp {
    router: Router,
    pub repos: Repositories,
    pub shopify: Arc<FakeShopify>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// A fresh app with empty storage.
    #[must_use]
    pub fn new() -> Self {
        let config = config();
        let repos = Repositories::in_memory();
        let shopify = FakeShopify::new();
        let connector = Arc::new(FakeConnector::new(shopify.clone()));
        let state = AppState::new(&config, &repos, connector, None, None);
        Self {
            router: app(state, &config.cors_origins),
            repos,
            shopify,
        }
    }

    /// Send a request, with an optional bearer token and JSON body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("valid request")).await
    }

    /// Send a prebuilt request.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    pub async fn get(&self, path: &str, token: &str) -> TestResponse {
        self.request(Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::POST, path, Some(token), Some(body))
            .await
    }

    /// Sign up a merchant with a valid password.
    pub async fn signup(&self, email: &str) -> Session {
        let response = self
            .request(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(json!({
                    "email": email,
                    "password": "correct-horse-9",
                    "full_name": "Test Grower",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
        Session {
            user_id: response.body["user"]["id"]
                .as_str()
                .expect("user id")
                .to_string(),
            access_token: response.str("access_token").to_string(),
            refresh_token: response.str("refresh_token").to_string(),
        }
    }

    /// Sign up an account and promote it to `role` directly in storage.
    pub async fn staff(&self, email: &str, role: UserRole) -> Session {
        let session = self.signup(email).await;
        let id: UserId = serde_json::from_value(json!(session.user_id)).expect("user id");
        let update = amts_api::models::UserUpdate {
            role: Some(role),
            ..Default::default()
        };
        self.repos
            .users
            .update(id, &update)
            .await
            .expect("promote account");
        session
    }

    /// Start an install for `shop` and return the OAuth state from the
    /// authorize URL.
    pub async fn begin_install(&self, token: &str, shop: &str) -> String {
        let response = self
            .get(&format!("/api/shopify/auth/install?shop={shop}"), token)
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text);
        let auth_url = url::Url::parse(response.str("auth_url")).expect("authorize URL");
        auth_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .expect("state parameter")
    }

    /// Hit the OAuth callback as Shopify would.
    pub async fn callback(&self, code: &str, shop: &str, state: &str) -> TestResponse {
        self.request(
            Method::GET,
            &format!("/api/shopify/auth/callback?code={code}&shop={shop}&state={state}"),
            None,
            None,
        )
        .await
    }

    /// Run a full install and return the connected store's id.
    pub async fn connect_store(&self, token: &str, shop: &str) -> String {
        let state = self.begin_install(token, shop).await;
        let response = self.callback("auth-code", shop, &state).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "{}", response.text);

        let stores = self.get("/api/shopify/stores", token).await;
        stores
            .body
            .as_array()
            .and_then(|all| {
                all.iter()
                    .find(|s| s["shop_domain"] == shop)
                    .and_then(|s| s["id"].as_str())
            })
            .expect("connected store")
            .to_string()
    }

    /// Deliver a webhook, signed with `secret`.
    pub async fn webhook(&self, topic: &str, shop: &str, body: &str, secret: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/webhooks/shopify")
            .header(header::CONTENT_TYPE, "application/json")
            .header(webhook::TOPIC_HEADER, topic)
            .header(webhook::SHOP_DOMAIN_HEADER, shop)
            .header(
                webhook::HMAC_HEADER,
                webhook::sign(secret.as_bytes(), body.as_bytes()),
            )
            .body(Body::from(body.to_string()))
            .expect("valid request");
        self.send(request).await
    }
}

/// Where the OAuth callback redirects after a successful install.
#[must_use]
pub fn connected_redirect() -> String {
    format!("{DASHBOARD}/dashboard/shopify?connected=true")
}

fn config() -> ApiConfig {
    ApiConfig {
        database_url: SecretString::from("postgres://unused"),
        host: [127, 0, 0, 1].into(),
        port: 0,
        environment: "test".to_string(),
        jwt: JwtConfig {
            secret: SecretString::from(JWT_SECRET),
            algorithm: jsonwebtoken::Algorithm::HS256,
            access_ttl: chrono::Duration::minutes(30),
            refresh_ttl: chrono::Duration::days(7),
        },
        shopify: ShopifyConfig {
            api_key: "test_client_id".to_string(),
            api_secret: SecretString::from(SHOPIFY_SECRET),
            scopes: vec!["read_products".to_string(), "write_products".to_string()],
            app_url: "http://api.test".to_string(),
            request_timeout: Duration::from_secs(5),
        },
        openai: None,
        cors_origins: vec![DASHBOARD.to_string()],
        sentry_dsn: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}
