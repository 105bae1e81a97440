//! Shopify Admin REST client over `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use amts_core::ShopDomain;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, LINK, RETRY_AFTER};
use reqwest::{Method, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::instrument;

use crate::config::ShopifyConfig;
use crate::resilience::{CircuitBreaker, RetryPolicy, call_with_resilience};

use super::types::{
    Metafield, MetafieldOwner, NewMetafield, ProductPage, RemoteProduct, Shop, Theme, ThemeAsset,
};
use super::{ShopifyApi, ShopifyConnector, ShopifyError};

/// Admin API version every request is pinned to.
pub const API_VERSION: &str = "2024-01";

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Build the OAuth authorize URL a merchant is redirected to.
#[must_use]
pub fn authorization_url(
    shop: &ShopDomain,
    client_id: &str,
    scopes: &[String],
    redirect_uri: &str,
    state: &str,
) -> String {
    let scope = scopes.join(",");
    format!(
        "https://{shop}/admin/oauth/authorize?client_id={}&scope={}&redirect_uri={}&state={}",
        urlencoding::encode(client_id),
        urlencoding::encode(&scope),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(state)
    )
}

/// Builds [`ShopifyClient`]s sharing one connection pool.
#[derive(Clone)]
pub struct HttpShopifyConnector {
    http: reqwest::Client,
    api_key: String,
    api_secret: SecretString,
    scopes: Vec<String>,
}

impl HttpShopifyConnector {
    /// Create a connector from the app credentials.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ShopifyConfig) -> Result<Self, ShopifyError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            scopes: config.scopes.clone(),
        })
    }
}

impl ShopifyConnector for HttpShopifyConnector {
    fn authorization_url(&self, shop: &ShopDomain, redirect_uri: &str, state: &str) -> String {
        authorization_url(shop, &self.api_key, &self.scopes, redirect_uri, state)
    }

    fn client(&self, shop: &ShopDomain, access_token: Option<SecretString>) -> Arc<dyn ShopifyApi> {
        Arc::new(ShopifyClient::new(
            self.http.clone(),
            shop.clone(),
            self.api_key.clone(),
            self.api_secret.clone(),
            access_token,
        ))
    }
}

/// Shopify Admin REST client bound to one shop.
///
/// Cheap to clone; clones share the circuit breaker.
#[derive(Clone)]
pub struct ShopifyClient {
    inner: Arc<ShopifyClientInner>,
}

struct ShopifyClientInner {
    http: reqwest::Client,
    shop: ShopDomain,
    api_key: String,
    api_secret: SecretString,
    access_token: Option<SecretString>,
    breaker: CircuitBreaker,
    base_url: String,
    token_url: String,
}

impl std::fmt::Debug for ShopifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyClient")
            .field("shop", &self.inner.shop)
            .field("authenticated", &self.inner.access_token.is_some())
            .finish_non_exhaustive()
    }
}

/// A successful response body plus its pagination header.
struct RawResponse {
    link: Option<String>,
    body: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ShopEnvelope {
    shop: Shop,
}

#[derive(Deserialize)]
struct ProductsEnvelope {
    products: Vec<RemoteProduct>,
}

#[derive(Deserialize)]
struct ProductEnvelope {
    product: RemoteProduct,
}

#[derive(Deserialize)]
struct ThemesEnvelope {
    themes: Vec<Theme>,
}

#[derive(Deserialize)]
struct AssetsEnvelope {
    assets: Vec<ThemeAsset>,
}

#[derive(Deserialize)]
struct AssetEnvelope {
    asset: ThemeAsset,
}

#[derive(Deserialize)]
struct MetafieldsEnvelope {
    metafields: Vec<Metafield>,
}

#[derive(Deserialize)]
struct MetafieldEnvelope {
    metafield: Metafield,
}

impl ShopifyClient {
    /// Create a client for `shop`.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        shop: ShopDomain,
        api_key: String,
        api_secret: SecretString,
        access_token: Option<SecretString>,
    ) -> Self {
        let origin = format!("https://{shop}");
        Self::with_origin(http, shop, api_key, api_secret, access_token, &origin)
    }

    fn with_origin(
        http: reqwest::Client,
        shop: ShopDomain,
        api_key: String,
        api_secret: SecretString,
        access_token: Option<SecretString>,
        origin: &str,
    ) -> Self {
        Self {
            inner: Arc::new(ShopifyClientInner {
                http,
                shop,
                api_key,
                api_secret,
                access_token,
                breaker: CircuitBreaker::default(),
                base_url: format!("{origin}/admin/api/{API_VERSION}"),
                token_url: format!("{origin}/admin/oauth/access_token"),
            }),
        }
    }

    /// The same client aimed at another origin, such as a local server.
    #[cfg(test)]
    fn with_base_url(&self, origin: &str) -> Self {
        let inner = &self.inner;
        Self::with_origin(
            inner.http.clone(),
            inner.shop.clone(),
            inner.api_key.clone(),
            inner.api_secret.clone(),
            inner.access_token.clone(),
            origin,
        )
    }

    /// Build the full URL for an Admin API resource path.
    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ShopifyError> {
        let mut url = Url::parse(&format!("{}/{path}", self.inner.base_url))
            .map_err(|e| ShopifyError::Parse(format!("Invalid endpoint {path}: {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Issue one authenticated request. Reads are retried on transient failures.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<RawResponse, ShopifyError> {
        let token = self
            .inner
            .access_token
            .as_ref()
            .ok_or(ShopifyError::Unauthenticated)?;
        let url = self.endpoint(path, query)?;
        let policy = if method == Method::GET {
            RetryPolicy::READS
        } else {
            RetryPolicy::SINGLE_ATTEMPT
        };

        call_with_resilience(policy, &self.inner.breaker, || {
            let mut builder = self
                .inner
                .http
                .request(method.clone(), url.clone())
                .header(ACCESS_TOKEN_HEADER, token.expose_secret());
            if let Some(body) = &body {
                builder = builder.json(body);
            }

            async move {
                let response = builder.send().await?;
                let status = response.status();
                let link = response
                    .headers()
                    .get(LINK)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);

                if !status.is_success() {
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    return Err(ShopifyError::Upstream {
                        status: status.as_u16(),
                        body,
                        retry_after,
                    });
                }

                let body = response.text().await?;
                Ok(RawResponse { link, body })
            }
        })
        .await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ShopifyError> {
        let raw = self.request(Method::GET, path, query, None).await?;
        decode(&raw.body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ShopifyError> {
        let raw = self.request(method, path, &[], Some(body)).await?;
        decode(&raw.body)
    }
}

#[async_trait]
impl ShopifyApi for ShopifyClient {
    fn shop(&self) -> &ShopDomain {
        &self.inner.shop
    }

    #[instrument(skip(self, code), fields(shop = %self.inner.shop))]
    async fn exchange_code(&self, code: &str) -> Result<SecretString, ShopifyError> {
        let payload = json!({
            "client_id": self.inner.api_key,
            "client_secret": self.inner.api_secret.expose_secret(),
            "code": code,
        });

        // Codes are single-use, so the exchange is never retried.
        let response = self
            .inner
            .http
            .post(&self.inner.token_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShopifyError::OAuthExchange {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let token: TokenResponse = decode(&body)?;
        Ok(SecretString::from(token.access_token))
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop))]
    async fn get_shop(&self) -> Result<Shop, ShopifyError> {
        let envelope: ShopEnvelope = self.get("shop.json", &[]).await?;
        Ok(envelope.shop)
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop))]
    async fn list_products(
        &self,
        limit: u32,
        page_info: Option<&str>,
    ) -> Result<ProductPage, ShopifyError> {
        // Shopify rejects any filter other than `limit` alongside a cursor.
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = page_info {
            query.push(("page_info", cursor.to_string()));
        }

        let raw = self
            .request(Method::GET, "products.json", &query, None)
            .await?;
        let envelope: ProductsEnvelope = decode(&raw.body)?;

        Ok(ProductPage {
            products: envelope.products,
            next_page_info: raw.link.as_deref().and_then(parse_next_page_info),
        })
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop))]
    async fn get_product(&self, id: i64) -> Result<RemoteProduct, ShopifyError> {
        let envelope: ProductEnvelope = self.get(&format!("products/{id}.json"), &[]).await?;
        Ok(envelope.product)
    }

    #[instrument(skip(self, product), fields(shop = %self.inner.shop))]
    async fn create_product(
        &self,
        product: &RemoteProduct,
    ) -> Result<RemoteProduct, ShopifyError> {
        let envelope: ProductEnvelope = self
            .send_json(Method::POST, "products.json", json!({ "product": product }))
            .await?;
        Ok(envelope.product)
    }

    #[instrument(skip(self, product), fields(shop = %self.inner.shop))]
    async fn update_product(
        &self,
        id: i64,
        product: &RemoteProduct,
    ) -> Result<RemoteProduct, ShopifyError> {
        let mut payload = serde_json::to_value(product)
            .map_err(|e| ShopifyError::Parse(format!("Failed to encode product: {e}")))?;
        if let Some(object) = payload.as_object_mut() {
            object.insert("id".to_string(), json!(id));
        }

        let envelope: ProductEnvelope = self
            .send_json(
                Method::PUT,
                &format!("products/{id}.json"),
                json!({ "product": payload }),
            )
            .await?;
        Ok(envelope.product)
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop))]
    async fn delete_product(&self, id: i64) -> Result<(), ShopifyError> {
        self.request(Method::DELETE, &format!("products/{id}.json"), &[], None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop))]
    async fn list_themes(&self) -> Result<Vec<Theme>, ShopifyError> {
        let envelope: ThemesEnvelope = self.get("themes.json", &[]).await?;
        Ok(envelope.themes)
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop))]
    async fn get_theme_assets(&self, theme_id: i64) -> Result<Vec<ThemeAsset>, ShopifyError> {
        let envelope: AssetsEnvelope = self
            .get(&format!("themes/{theme_id}/assets.json"), &[])
            .await?;
        Ok(envelope.assets)
    }

    #[instrument(skip(self, value), fields(shop = %self.inner.shop))]
    async fn update_theme_asset(
        &self,
        theme_id: i64,
        key: &str,
        value: &str,
    ) -> Result<ThemeAsset, ShopifyError> {
        let envelope: AssetEnvelope = self
            .send_json(
                Method::PUT,
                &format!("themes/{theme_id}/assets.json"),
                json!({ "asset": { "key": key, "value": value } }),
            )
            .await?;
        Ok(envelope.asset)
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop))]
    async fn get_metafields(
        &self,
        owner: MetafieldOwner,
        owner_id: i64,
    ) -> Result<Vec<Metafield>, ShopifyError> {
        let path = format!("{}/{owner_id}/metafields.json", owner.path_segment());
        let envelope: MetafieldsEnvelope = self.get(&path, &[]).await?;
        Ok(envelope.metafields)
    }

    #[instrument(skip(self, metafield), fields(shop = %self.inner.shop))]
    async fn create_metafield(
        &self,
        owner: MetafieldOwner,
        owner_id: i64,
        metafield: &NewMetafield,
    ) -> Result<Metafield, ShopifyError> {
        let path = format!("{}/{owner_id}/metafields.json", owner.path_segment());
        let envelope: MetafieldEnvelope = self
            .send_json(Method::POST, &path, json!({ "metafield": metafield }))
            .await?;
        Ok(envelope.metafield)
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ShopifyError> {
    serde_json::from_str(body)
        .map_err(|e| ShopifyError::Parse(format!("Failed to parse response: {e}")))
}

/// Seconds from a `Retry-After` header. Shopify sends fractional values.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Extract the `page_info` cursor of the `rel="next"` entry of a `Link` header.
fn parse_next_page_info(link: &str) -> Option<String> {
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .is_some_and(|rel| rel.trim_matches('"') == "next")
        });
        if !is_next {
            return None;
        }

        let url = Url::parse(target.trim_start_matches('<').trim_end_matches('>')).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page_info")
            .map(|(_, value)| value.into_owned())
    })
}
