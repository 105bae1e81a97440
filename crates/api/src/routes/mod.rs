//! HTTP route handlers.
//!
//! # Route Structure
//!
//! Everything is nested under `/api` by [`crate::app`].
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (database ping)
//!
//! # Auth
//! POST /auth/signup | /auth/login | /auth/refresh | /auth/logout
//! GET  /auth/me, PUT /auth/me
//!
//! # Shopify
//! GET  /shopify/auth/install?shop=      - Start OAuth
//! GET  /shopify/auth/callback           - Finish OAuth (redirects to the dashboard)
//! GET  /shopify/stores[/{id}], DELETE /shopify/stores/{id}
//! POST /shopify/stores/{id}/sync | /export/{product_id}
//! ...  remote products, themes, assets, metafields
//!
//! # Webhooks
//! POST /webhooks/shopify
//!
//! # Products, Tasks, AI
//! /products..., /tasks..., /ai...
//!
//! # Admin (staff only)
//! /admin/dashboard, /admin/clients..., /admin/stores..., /admin/activity
//! ```

use axum::Router;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::state::AppState;

pub mod admin;
pub mod ai;
pub mod auth;
pub mod health;
pub mod products;
pub mod shopify;
pub mod tasks;
pub mod webhooks;

/// JSON body extractor whose rejections use the API error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor whose rejections use the API error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Parse an optional JSON body; an empty body yields the default.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for a non-empty body that does not parse.
pub fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))
}

/// Confirmation body for deletes and logout.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

impl Message {
    #[must_use]
    pub const fn new(message: &'static str) -> Self {
        Self { message }
    }
}

/// Every API route, relative to `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/auth", auth::router())
        .nest("/shopify", shopify::router())
        .nest("/webhooks", webhooks::router())
        .nest("/products", products::router())
        .nest("/tasks", tasks::router())
        .nest("/ai", ai::router())
        .nest("/admin", admin::router())
}
