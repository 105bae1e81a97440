//! Shopify store connections.
//!
//! Installing the app is a two-step OAuth flow: [`StoreConnectionManager::begin_install`]
//! mints a single-use state token and returns the authorize URL, and
//! [`StoreConnectionManager::complete_install`] redeems the state, exchanges
//! the code and records the store. Authenticated clients are cached per shop
//! domain.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use moka::future::Cache;
use secrecy::SecretString;

use amts_core::{ShopDomain, StoreId, StoreStatus, UserId};

use super::ServiceError;
use crate::db::{OAuthStateRepository, PendingInstall, StoreRepository};
use crate::models::{NewStore, Store};
use crate::shopify::{ShopifyApi, ShopifyConnector};

/// How long a state token stays redeemable.
pub const OAUTH_STATE_TTL: chrono::Duration = chrono::Duration::minutes(10);

const STATE_BYTES: usize = 32;

/// Owns OAuth state and the per-shop client cache.
#[derive(Clone)]
pub struct StoreConnectionManager {
    stores: Arc<dyn StoreRepository>,
    oauth_states: Arc<dyn OAuthStateRepository>,
    connector: Arc<dyn ShopifyConnector>,
    clients: Cache<ShopDomain, Arc<dyn ShopifyApi>>,
    redirect_uri: String,
}

impl StoreConnectionManager {
    /// Create a connection manager.
    #[must_use]
    pub fn new(
        stores: Arc<dyn StoreRepository>,
        oauth_states: Arc<dyn OAuthStateRepository>,
        connector: Arc<dyn ShopifyConnector>,
        redirect_uri: String,
    ) -> Self {
        let clients = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(Duration::from_secs(60 * 60))
            .build();

        Self {
            stores,
            oauth_states,
            connector,
            clients,
            redirect_uri,
        }
    }

    // =========================================================================
    // OAuth
    // =========================================================================

    /// Start an install for `raw_shop` on behalf of `user_id`.
    ///
    /// Returns the Shopify authorize URL to send the merchant to.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a malformed shop identifier.
    #[tracing::instrument(skip(self))]
    pub async fn begin_install(
        &self,
        user_id: UserId,
        raw_shop: &str,
    ) -> Result<String, ServiceError> {
        let shop_domain =
            ShopDomain::parse(raw_shop).map_err(|e| ServiceError::Validation(e.to_string()))?;

        let now = Utc::now();
        if let Err(e) = self.oauth_states.purge_expired(now - OAUTH_STATE_TTL).await {
            tracing::warn!(error = %e, "Failed to purge expired OAuth states");
        }

        let state = URL_SAFE_NO_PAD.encode(rand::random::<[u8; STATE_BYTES]>());
        self.oauth_states
            .insert(&PendingInstall {
                state: state.clone(),
                user_id,
                shop_domain: shop_domain.clone(),
                issued_at: now,
            })
            .await?;

        Ok(self
            .connector
            .authorization_url(&shop_domain, &self.redirect_uri, &state))
    }

    /// Finish an install from the OAuth callback.
    ///
    /// # Errors
    ///
    /// - `ServiceError::InvalidState` if the state is unknown, expired, or
    ///   was issued for another shop. The state is consumed either way.
    /// - `ServiceError::OAuthExchangeFailed` if Shopify rejects the code. An
    ///   existing store for the domain is marked `error`.
    #[tracing::instrument(skip(self, code, state))]
    pub async fn complete_install(
        &self,
        code: &str,
        raw_shop: &str,
        state: &str,
    ) -> Result<Store, ServiceError> {
        let shop_domain = ShopDomain::parse(raw_shop).map_err(|_| ServiceError::InvalidState)?;

        let pending = self
            .oauth_states
            .consume(state)
            .await?
            .ok_or(ServiceError::InvalidState)?;
        if Utc::now() - pending.issued_at > OAUTH_STATE_TTL {
            tracing::warn!(shop = %shop_domain, "Expired OAuth state presented");
            return Err(ServiceError::InvalidState);
        }
        if pending.shop_domain != shop_domain {
            tracing::warn!(
                expected = %pending.shop_domain,
                actual = %shop_domain,
                "OAuth state issued for another shop"
            );
            return Err(ServiceError::InvalidState);
        }

        let access_token = match self
            .connector
            .client(&shop_domain, None)
            .exchange_code(code)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(shop = %shop_domain, error = %e, "OAuth code exchange failed");
                self.flag_exchange_failure(&shop_domain).await;
                return Err(ServiceError::OAuthExchangeFailed(e.to_string()));
            }
        };

        let client = self
            .connector
            .client(&shop_domain, Some(access_token.clone()));

        let store = if let Some(store) = self.stores.reconnect(&shop_domain, &access_token).await? {
            tracing::info!(store_id = %store.id, shop = %shop_domain, "Store reconnected");
            store
        } else {
            let (name, products_count) = match client.get_shop().await {
                Ok(shop) => (shop.name, shop.products_count.unwrap_or(0)),
                Err(e) => {
                    tracing::warn!(shop = %shop_domain, error = %e, "Could not fetch shop metadata");
                    (shop_domain.handle().to_string(), 0)
                }
            };
            let store = self
                .stores
                .insert_or_reconnect(NewStore {
                    user_id: pending.user_id,
                    name,
                    shop_domain: shop_domain.clone(),
                    access_token,
                    products_count,
                })
                .await?;
            tracing::info!(store_id = %store.id, shop = %shop_domain, "Store connected");
            store
        };

        self.clients.insert(shop_domain, client).await;
        Ok(store)
    }

    async fn flag_exchange_failure(&self, shop_domain: &ShopDomain) {
        let result = match self.stores.find_by_domain(shop_domain).await {
            Ok(Some(store)) => self.stores.set_status(store.id, StoreStatus::Error).await,
            Ok(None) => return,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(shop = %shop_domain, error = %e, "Failed to flag store after exchange failure");
        }
    }

    // =========================================================================
    // Stores
    // =========================================================================

    /// Load a store and check that `caller` owns it.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` or `ServiceError::Forbidden`.
    pub async fn owned_store(&self, store_id: StoreId, caller: UserId) -> Result<Store, ServiceError> {
        super::owned_store(self.stores.as_ref(), store_id, caller).await
    }

    /// Every store owned by `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the database operation fails.
    pub async fn stores_of(&self, user_id: UserId) -> Result<Vec<Store>, ServiceError> {
        super::stores_of(self.stores.as_ref(), user_id).await
    }

    /// Remove a store the caller owns and drop its cached client.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` or `ServiceError::Forbidden`; the
    /// store is untouched in both cases.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self, store_id: StoreId, caller: UserId) -> Result<(), ServiceError> {
        let store = self.owned_store(store_id, caller).await?;
        self.clients.invalidate(&store.shop_domain).await;
        self.stores.delete(store.id).await?;
        tracing::info!(store_id = %store.id, shop = %store.shop_domain, "Store disconnected");
        Ok(())
    }

    /// Handle an `app/uninstalled` webhook: mark the store disconnected.
    ///
    /// Returns the affected store id, or `None` for an unknown shop.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the database operation fails.
    pub async fn mark_uninstalled(
        &self,
        shop_domain: &ShopDomain,
    ) -> Result<Option<StoreId>, ServiceError> {
        self.clients.invalidate(shop_domain).await;
        let Some(store) = self.stores.find_by_domain(shop_domain).await? else {
            return Ok(None);
        };
        self.stores
            .set_status(store.id, StoreStatus::Disconnected)
            .await?;
        tracing::info!(store_id = %store.id, shop = %shop_domain, "App uninstalled");
        Ok(Some(store.id))
    }

    /// An authenticated client for `store`, cached by domain.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotConnected` if the store has no token or is
    /// not in the `connected` state.
    pub async fn client_for(&self, store: &Store) -> Result<Arc<dyn ShopifyApi>, ServiceError> {
        let Some(token) = store.access_token.as_ref().filter(|_| store.is_connected()) else {
            return Err(ServiceError::NotConnected);
        };

        if let Some(client) = self.clients.get(&store.shop_domain).await {
            return Ok(client);
        }

        let client = self
            .connector
            .client(&store.shop_domain, Some(SecretString::clone(token)));
        self.clients
            .insert(store.shop_domain.clone(), client.clone())
            .await;
        Ok(client)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::db::Repositories;
    use crate::models::StoreFilter;
    use crate::shopify::RemoteProduct;
    use crate::shopify::fake::{FakeConnector, FakeShopify};

    struct Harness {
        manager: StoreConnectionManager,
        repos: Repositories,
        shopify: Arc<FakeShopify>,
    }

    fn harness() -> Harness {
        let repos = Repositories::in_memory();
        let shopify = FakeShopify::new();
        let manager = StoreConnectionManager::new(
            repos.stores.clone(),
            repos.oauth_states.clone(),
            Arc::new(FakeConnector::new(shopify.clone())),
            "https://api.amts.dev/api/shopify/auth/callback".to_string(),
        );
        Harness {
            manager,
            repos,
            shopify,
        }
    }

    fn state_from(url: &str) -> String {
        let parsed = url::Url::parse(url).unwrap();
        parsed
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    async fn install(h: &Harness, user: UserId, shop: &str) -> Store {
        let url = h.manager.begin_install(user, shop).await.unwrap();
        h.manager
            .complete_install("code", shop, &state_from(&url))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_begin_install_normalizes_shop_and_binds_state() {
        let h = harness();
        let url = h
            .manager
            .begin_install(UserId::generate(), "  Green-Leaf ")
            .await
            .unwrap();

        assert!(url.starts_with("https://green-leaf.myshopify.com/admin/oauth/authorize?"));
        assert!(url.contains(&urlencoding::encode(
            "https://api.amts.dev/api/shopify/auth/callback"
        ).into_owned()));
        let state = state_from(&url);
        assert_eq!(URL_SAFE_NO_PAD.decode(&state).unwrap().len(), STATE_BYTES);
    }

    #[tokio::test]
    async fn test_begin_install_rejects_bad_shop() {
        let h = harness();
        let err = h
            .manager
            .begin_install(UserId::generate(), "green leaf!")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_complete_install_creates_connected_store() {
        let h = harness();
        let user = UserId::generate();
        let store = install(&h, user, "green-leaf").await;

        assert_eq!(store.user_id, user);
        assert_eq!(store.status, StoreStatus::Connected);
        assert_eq!(store.name, "green-leaf Dispensary");
        assert_eq!(store.shop_domain.as_str(), "green-leaf.myshopify.com");
    }

    #[tokio::test]
    async fn test_state_is_single_use() {
        let h = harness();
        let url = h
            .manager
            .begin_install(UserId::generate(), "green-leaf")
            .await
            .unwrap();
        let state = state_from(&url);

        h.manager
            .complete_install("code", "green-leaf", &state)
            .await
            .unwrap();
        let err = h
            .manager
            .complete_install("code", "green-leaf", &state)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState));
    }

    #[tokio::test]
    async fn test_state_for_other_shop_rejected() {
        let h = harness();
        let url = h
            .manager
            .begin_install(UserId::generate(), "green-leaf")
            .await
            .unwrap();

        let err = h
            .manager
            .complete_install("code", "other-shop", &state_from(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState));
        assert_eq!(h.shopify.tokens_issued(), 0);
    }

    #[tokio::test]
    async fn test_expired_state_rejected() {
        let h = harness();
        h.repos
            .oauth_states
            .insert(&PendingInstall {
                state: "stale".to_string(),
                user_id: UserId::generate(),
                shop_domain: ShopDomain::parse("green-leaf").unwrap(),
                issued_at: Utc::now() - chrono::Duration::minutes(11),
            })
            .await
            .unwrap();

        let err = h
            .manager
            .complete_install("code", "green-leaf", "stale")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState));
    }

    #[tokio::test]
    async fn test_reinstall_is_idempotent_per_domain() {
        let h = harness();
        let user = UserId::generate();
        let first = install(&h, user, "green-leaf").await;
        let second = install(&h, user, "green-leaf").await;

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        let all = h.repos.stores.list(&StoreFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        let token = all.first().unwrap().access_token.as_ref().unwrap();
        assert_eq!(token.expose_secret(), "shpat_code_2");
    }

    #[tokio::test]
    async fn test_exchange_failure_flags_existing_store() {
        let h = harness();
        let user = UserId::generate();
        let store = install(&h, user, "green-leaf").await;

        h.shopify.fail_exchange(true);
        let url = h.manager.begin_install(user, "green-leaf").await.unwrap();
        let err = h
            .manager
            .complete_install("code", "green-leaf", &state_from(&url))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::OAuthExchangeFailed(_)));
        let reloaded = h.repos.stores.get(store.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, StoreStatus::Error);
        assert!(matches!(
            h.manager.client_for(&reloaded).await,
            Err(ServiceError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_exchange_failure_without_store_creates_nothing() {
        let h = harness();
        h.shopify.fail_exchange(true);
        let url = h
            .manager
            .begin_install(UserId::generate(), "green-leaf")
            .await
            .unwrap();

        assert!(
            h.manager
                .complete_install("code", "green-leaf", &state_from(&url))
                .await
                .is_err()
        );
        assert_eq!(
            h.repos.stores.count(&StoreFilter::default()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_shop_lookup_failure_falls_back_to_handle() {
        let h = harness();
        h.shopify.fail_shop(true);
        let store = install(&h, UserId::generate(), "green-leaf").await;
        assert_eq!(store.name, "green-leaf");
    }

    #[tokio::test]
    async fn test_new_store_takes_catalog_size_from_shop() {
        let h = harness();
        h.shopify.set_products(vec![
            RemoteProduct {
                id: Some(1),
                title: "Blue Dream".to_string(),
                ..Default::default()
            },
            RemoteProduct {
                id: Some(2),
                title: "Sour Diesel".to_string(),
                ..Default::default()
            },
        ]);

        let store = install(&h, UserId::generate(), "green-leaf").await;
        assert_eq!(store.products_count, 2);
    }

    #[tokio::test]
    async fn test_disconnect_by_other_user_is_forbidden() {
        let h = harness();
        let owner = UserId::generate();
        let store = install(&h, owner, "green-leaf").await;

        let err = h
            .manager
            .disconnect(store.id, UserId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
        assert!(h.repos.stores.get(store.id).await.unwrap().is_some());

        h.manager.disconnect(store.id, owner).await.unwrap();
        assert!(h.repos.stores.get(store.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_unknown_store() {
        let h = harness();
        assert!(matches!(
            h.manager
                .disconnect(StoreId::generate(), UserId::generate())
                .await,
            Err(ServiceError::NotFound("store"))
        ));
    }

    #[tokio::test]
    async fn test_uninstall_marks_disconnected() {
        let h = harness();
        let store = install(&h, UserId::generate(), "green-leaf").await;

        let affected = h
            .manager
            .mark_uninstalled(&store.shop_domain)
            .await
            .unwrap();
        assert_eq!(affected, Some(store.id));

        let reloaded = h.repos.stores.get(store.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, StoreStatus::Disconnected);
        assert!(matches!(
            h.manager.client_for(&reloaded).await,
            Err(ServiceError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_client_for_connected_store() {
        let h = harness();
        let store = install(&h, UserId::generate(), "green-leaf").await;

        let client = h.manager.client_for(&store).await.unwrap();
        assert_eq!(client.shop(), &store.shop_domain);
        assert!(client.list_themes().await.is_ok());
    }
}
