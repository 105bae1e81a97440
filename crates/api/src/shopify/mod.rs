//! Shopify Admin REST API integration.
//!
//! # Architecture
//!
//! - [`ShopifyApi`] is the per-shop client seam. [`ShopifyClient`] implements it
//!   over `reqwest`; tests substitute scripted fakes.
//! - [`ShopifyConnector`] builds clients for a shop and renders the OAuth
//!   authorize URL. The store connection service caches the clients it hands out.
//! - [`webhook`] verifies delivery signatures over the raw body.
//!
//! Each resource call issues one request (reads may be retried on transient
//! failures) and surfaces any non-2xx response as [`ShopifyError::Upstream`].

mod client;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod types;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use amts_core::ShopDomain;
use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

pub use client::{API_VERSION, HttpShopifyConnector, ShopifyClient, authorization_url};
pub use types::{
    Metafield, MetafieldOwner, NewMetafield, ProductPage, RemoteImage, RemoteProduct,
    RemoteVariant, Shop, Theme, ThemeAsset,
};

use crate::resilience::RetryableError;

/// Errors that can occur when talking to Shopify.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// HTTP request failed before a response arrived (includes timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The call needs an access token but the client has none.
    #[error("No access token bound to this client")]
    Unauthenticated,

    /// The OAuth code exchange was rejected.
    #[error("OAuth exchange failed ({status}): {body}")]
    OAuthExchange {
        /// HTTP status returned by Shopify.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Shopify returned a non-2xx status.
    #[error("Shopify returned {status}: {body}")]
    Upstream {
        /// HTTP status returned by Shopify.
        status: u16,
        /// Response body.
        body: String,
        /// Parsed `Retry-After`, for 429 responses.
        retry_after: Option<Duration>,
    },

    /// The response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(String),

    /// Too many recent transient failures; the call was not attempted.
    #[error("Shopify circuit open, refusing calls")]
    CircuitOpen,
}

impl ShopifyError {
    /// Upstream HTTP status, if the error carries one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::OAuthExchange { status, .. } | Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl RetryableError for ShopifyError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Upstream { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    fn circuit_open() -> Self {
        Self::CircuitOpen
    }
}

/// Operations against one merchant's shop.
#[async_trait]
pub trait ShopifyApi: Send + Sync {
    /// The shop this client is bound to.
    fn shop(&self) -> &ShopDomain;

    /// Exchange an OAuth authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> Result<SecretString, ShopifyError>;

    /// Fetch shop metadata.
    async fn get_shop(&self) -> Result<Shop, ShopifyError>;

    /// Fetch one page of products. `page_info` is the cursor from a previous page.
    async fn list_products(
        &self,
        limit: u32,
        page_info: Option<&str>,
    ) -> Result<ProductPage, ShopifyError>;

    /// Fetch a single product.
    async fn get_product(&self, id: i64) -> Result<RemoteProduct, ShopifyError>;

    /// Create a product.
    async fn create_product(&self, product: &RemoteProduct)
    -> Result<RemoteProduct, ShopifyError>;

    /// Replace a product's fields.
    async fn update_product(
        &self,
        id: i64,
        product: &RemoteProduct,
    ) -> Result<RemoteProduct, ShopifyError>;

    /// Delete a product.
    async fn delete_product(&self, id: i64) -> Result<(), ShopifyError>;

    /// List themes.
    async fn list_themes(&self) -> Result<Vec<Theme>, ShopifyError>;

    /// List a theme's assets (keys only).
    async fn get_theme_assets(&self, theme_id: i64) -> Result<Vec<ThemeAsset>, ShopifyError>;

    /// Create or replace a theme asset.
    async fn update_theme_asset(
        &self,
        theme_id: i64,
        key: &str,
        value: &str,
    ) -> Result<ThemeAsset, ShopifyError>;

    /// List metafields of a resource.
    async fn get_metafields(
        &self,
        owner: MetafieldOwner,
        owner_id: i64,
    ) -> Result<Vec<Metafield>, ShopifyError>;

    /// Create a metafield on a resource.
    async fn create_metafield(
        &self,
        owner: MetafieldOwner,
        owner_id: i64,
        metafield: &NewMetafield,
    ) -> Result<Metafield, ShopifyError>;
}

/// Builds per-shop clients and OAuth URLs from the app's credentials.
pub trait ShopifyConnector: Send + Sync {
    /// The provider authorize URL for `shop`.
    fn authorization_url(&self, shop: &ShopDomain, redirect_uri: &str, state: &str) -> String;

    /// A client bound to `shop`, authenticated when a token is given.
    fn client(&self, shop: &ShopDomain, access_token: Option<SecretString>) -> Arc<dyn ShopifyApi>;
}
