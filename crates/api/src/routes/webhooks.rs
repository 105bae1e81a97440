//! Shopify webhook receiver.
//!
//! Deliveries are verified against the raw body before anything is parsed.
//! Only `app/uninstalled` changes state; other topics are acknowledged.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use secrecy::ExposeSecret;

use amts_core::ShopDomain;

use super::Message;
use crate::error::AppError;
use crate::shopify::webhook::{
    HMAC_HEADER, SHOP_DOMAIN_HEADER, TOPIC_HEADER, verify_webhook_signature,
};
use crate::state::AppState;

const APP_UNINSTALLED: &str = "app/uninstalled";

pub fn router() -> Router<AppState> {
    Router::new().route("/shopify", post(shopify_webhook))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /api/webhooks/shopify
async fn shopify_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Message>, AppError> {
    let signature = header(&headers, HMAC_HEADER).ok_or(AppError::InvalidSignature)?;
    if !verify_webhook_signature(
        state.webhook_secret().expose_secret().as_bytes(),
        &body,
        signature,
    ) {
        tracing::warn!("Rejected webhook with bad signature");
        return Err(AppError::InvalidSignature);
    }

    let topic = header(&headers, TOPIC_HEADER).unwrap_or_default();
    let shop = header(&headers, SHOP_DOMAIN_HEADER).unwrap_or_default();
    tracing::info!(topic, shop, "Shopify webhook received");

    if topic == APP_UNINSTALLED {
        let domain = ShopDomain::parse(shop)
            .map_err(|e| AppError::BadRequest(format!("invalid shop domain: {e}")))?;
        if state.connections().mark_uninstalled(&domain).await?.is_none() {
            tracing::info!(shop = %domain, "Uninstall for unknown shop ignored");
        }
    }

    Ok(Json(Message::new("Webhook processed")))
}
