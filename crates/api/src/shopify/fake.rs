//! Scripted in-memory Shopify for tests.
//!
//! One [`FakeShopify`] plays every shop: the connector hands out clients
//! bound to the requested domain, all backed by the same catalog. Failure
//! switches let tests exercise the exchange, shop lookup and paging error
//! paths.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use amts_core::ShopDomain;

use super::{
    Metafield, MetafieldOwner, NewMetafield, ProductPage, RemoteProduct, Shop, ShopifyApi,
    ShopifyConnector, ShopifyError, Theme, ThemeAsset,
};

/// Shared state behind every fake client.
#[derive(Debug)]
pub struct FakeShopify {
    products: Mutex<Vec<RemoteProduct>>,
    metafields: Mutex<Vec<Metafield>>,
    assets: Mutex<Vec<ThemeAsset>>,
    next_id: AtomicI64,
    tokens_issued: AtomicU32,
    page_requests: AtomicU32,
    fail_exchange: AtomicBool,
    fail_shop: AtomicBool,
    fail_writes: AtomicBool,
    fail_page: Mutex<Option<u32>>,
}

impl Default for FakeShopify {
    fn default() -> Self {
        Self {
            products: Mutex::default(),
            metafields: Mutex::default(),
            assets: Mutex::default(),
            next_id: AtomicI64::new(9000),
            tokens_issued: AtomicU32::new(0),
            page_requests: AtomicU32::new(0),
            fail_exchange: AtomicBool::new(false),
            fail_shop: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_page: Mutex::new(None),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl FakeShopify {
    /// A fresh fake behind an `Arc`.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the remote catalog.
    pub fn set_products(&self, products: Vec<RemoteProduct>) {
        *lock(&self.products) = products;
    }

    /// Snapshot of the remote catalog.
    #[must_use]
    pub fn products(&self) -> Vec<RemoteProduct> {
        lock(&self.products).clone()
    }

    /// Make code exchanges fail with a 400.
    pub fn fail_exchange(&self, fail: bool) {
        self.fail_exchange.store(fail, Ordering::SeqCst);
    }

    /// Make `GET /shop.json` fail with a 500.
    pub fn fail_shop(&self, fail: bool) {
        self.fail_shop.store(fail, Ordering::SeqCst);
    }

    /// Make product creates and updates fail with a 422.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make the product page with this zero-based index fail with a 503.
    pub fn fail_page(&self, page: Option<u32>) {
        *lock(&self.fail_page) = page;
    }

    /// How many access tokens have been handed out.
    #[must_use]
    pub fn tokens_issued(&self) -> u32 {
        self.tokens_issued.load(Ordering::SeqCst)
    }

    /// How many product pages have been requested.
    #[must_use]
    pub fn page_requests(&self) -> u32 {
        self.page_requests.load(Ordering::SeqCst)
    }
}

/// Connector producing [`FakeClient`]s.
#[derive(Debug, Clone)]
pub struct FakeConnector {
    pub state: Arc<FakeShopify>,
}

impl FakeConnector {
    /// Wrap shared fake state.
    #[must_use]
    pub const fn new(state: Arc<FakeShopify>) -> Self {
        Self { state }
    }
}

impl ShopifyConnector for FakeConnector {
    fn authorization_url(&self, shop: &ShopDomain, redirect_uri: &str, state: &str) -> String {
        super::authorization_url(shop, "fake_client_id", &[], redirect_uri, state)
    }

    fn client(&self, shop: &ShopDomain, access_token: Option<SecretString>) -> Arc<dyn ShopifyApi> {
        Arc::new(FakeClient {
            shop: shop.clone(),
            access_token,
            state: self.state.clone(),
        })
    }
}

/// A fake client bound to one shop domain.
#[derive(Debug)]
pub struct FakeClient {
    shop: ShopDomain,
    access_token: Option<SecretString>,
    state: Arc<FakeShopify>,
}

impl FakeClient {
    /// The bound access token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_ref().map(ExposeSecret::expose_secret)
    }

    fn authenticated(&self) -> Result<(), ShopifyError> {
        if self.access_token.is_some() {
            Ok(())
        } else {
            Err(ShopifyError::Unauthenticated)
        }
    }

    fn write_guard(&self) -> Result<(), ShopifyError> {
        self.authenticated()?;
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(upstream(422, "{\"errors\":\"rejected\"}"));
        }
        Ok(())
    }
}

fn upstream(status: u16, body: &str) -> ShopifyError {
    ShopifyError::Upstream {
        status,
        body: body.to_string(),
        retry_after: None,
    }
}

#[async_trait]
impl ShopifyApi for FakeClient {
    fn shop(&self) -> &ShopDomain {
        &self.shop
    }

    async fn exchange_code(&self, code: &str) -> Result<SecretString, ShopifyError> {
        if self.state.fail_exchange.load(Ordering::SeqCst) {
            return Err(ShopifyError::OAuthExchange {
                status: 400,
                body: "invalid_request".to_string(),
            });
        }
        let n = self.state.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SecretString::from(format!("shpat_{code}_{n}")))
    }

    async fn get_shop(&self) -> Result<Shop, ShopifyError> {
        self.authenticated()?;
        if self.state.fail_shop.load(Ordering::SeqCst) {
            return Err(upstream(500, "shop unavailable"));
        }
        Ok(Shop {
            id: 1,
            name: format!("{} Dispensary", self.shop.handle()),
            email: None,
            domain: None,
            myshopify_domain: Some(self.shop.to_string()),
            plan_name: None,
            currency: Some("USD".to_string()),
            products_count: i32::try_from(lock(&self.state.products).len()).ok(),
        })
    }

    async fn list_products(
        &self,
        limit: u32,
        page_info: Option<&str>,
    ) -> Result<ProductPage, ShopifyError> {
        self.authenticated()?;
        self.state.page_requests.fetch_add(1, Ordering::SeqCst);

        let page: u32 = page_info.and_then(|p| p.parse().ok()).unwrap_or(0);
        if *lock(&self.state.fail_page) == Some(page) {
            return Err(upstream(503, "try later"));
        }

        let products = lock(&self.state.products);
        let size = limit.max(1) as usize;
        let start = page as usize * size;
        let chunk: Vec<RemoteProduct> = products.iter().skip(start).take(size).cloned().collect();
        let next_page_info = (start + size < products.len()).then(|| (page + 1).to_string());

        Ok(ProductPage {
            products: chunk,
            next_page_info,
        })
    }

    async fn get_product(&self, id: i64) -> Result<RemoteProduct, ShopifyError> {
        self.authenticated()?;
        lock(&self.state.products)
            .iter()
            .find(|p| p.id == Some(id))
            .cloned()
            .ok_or_else(|| upstream(404, "Not Found"))
    }

    async fn create_product(&self, product: &RemoteProduct) -> Result<RemoteProduct, ShopifyError> {
        self.write_guard()?;
        let mut created = product.clone();
        created.id = Some(self.state.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.state.products).push(created.clone());
        Ok(created)
    }

    async fn update_product(
        &self,
        id: i64,
        product: &RemoteProduct,
    ) -> Result<RemoteProduct, ShopifyError> {
        self.write_guard()?;
        let mut products = lock(&self.state.products);
        let slot = products
            .iter_mut()
            .find(|p| p.id == Some(id))
            .ok_or_else(|| upstream(404, "Not Found"))?;
        let mut updated = product.clone();
        updated.id = Some(id);
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete_product(&self, id: i64) -> Result<(), ShopifyError> {
        self.write_guard()?;
        lock(&self.state.products).retain(|p| p.id != Some(id));
        Ok(())
    }

    async fn list_themes(&self) -> Result<Vec<Theme>, ShopifyError> {
        self.authenticated()?;
        Ok(vec![Theme {
            id: 77,
            name: "Dawn".to_string(),
            role: Some("main".to_string()),
        }])
    }

    async fn get_theme_assets(&self, _theme_id: i64) -> Result<Vec<ThemeAsset>, ShopifyError> {
        self.authenticated()?;
        Ok(lock(&self.state.assets)
            .iter()
            .map(|a| ThemeAsset {
                value: None,
                ..a.clone()
            })
            .collect())
    }

    async fn update_theme_asset(
        &self,
        _theme_id: i64,
        key: &str,
        value: &str,
    ) -> Result<ThemeAsset, ShopifyError> {
        self.write_guard()?;
        let asset = ThemeAsset {
            key: key.to_string(),
            value: Some(value.to_string()),
            content_type: None,
            updated_at: None,
        };
        let mut assets = lock(&self.state.assets);
        assets.retain(|a| a.key != key);
        assets.push(asset.clone());
        Ok(asset)
    }

    async fn get_metafields(
        &self,
        _owner: MetafieldOwner,
        _owner_id: i64,
    ) -> Result<Vec<Metafield>, ShopifyError> {
        self.authenticated()?;
        Ok(lock(&self.state.metafields).clone())
    }

    async fn create_metafield(
        &self,
        _owner: MetafieldOwner,
        _owner_id: i64,
        metafield: &NewMetafield,
    ) -> Result<Metafield, ShopifyError> {
        self.write_guard()?;
        let created = Metafield {
            id: Some(self.state.next_id.fetch_add(1, Ordering::SeqCst)),
            namespace: metafield.namespace.clone(),
            key: metafield.key.clone(),
            value: serde_json::Value::String(metafield.value.clone()),
            value_type: Some(metafield.value_type.clone()),
        };
        lock(&self.state.metafields).push(created.clone());
        Ok(created)
    }
}
