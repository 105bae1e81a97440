//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::SecretString;
use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::Repositories;
use crate::openai::OpenAiClient;
use crate::services::{
    AdminService, AuthService, CatalogService, ContentService, StoreConnectionManager,
    SyncOrchestrator, TaskService,
};
use crate::shopify::ShopifyConnector;

/// Application state shared across all handlers.
///
/// Cheap to clone; every handler gets the same services.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: Option<PgPool>,
    webhook_secret: SecretString,
    dashboard_url: String,
    auth: AuthService,
    connections: StoreConnectionManager,
    sync: SyncOrchestrator,
    catalog: CatalogService,
    tasks: TaskService,
    content: ContentService,
    admin: AdminService,
}

impl AppState {
    /// Wire the services over `repos`.
    ///
    /// `pool` is only used by the readiness probe; in-memory deployments pass
    /// `None`. `openai: None` selects offline content generation.
    #[must_use]
    pub fn new(
        config: &ApiConfig,
        repos: &Repositories,
        connector: Arc<dyn ShopifyConnector>,
        openai: Option<OpenAiClient>,
        pool: Option<PgPool>,
    ) -> Self {
        let auth = AuthService::new(repos.users.clone(), repos.refresh_tokens.clone(), &config.jwt);
        let connections = StoreConnectionManager::new(
            repos.stores.clone(),
            repos.oauth_states.clone(),
            connector,
            config.shopify.redirect_uri(),
        );
        let sync = SyncOrchestrator::new(
            connections.clone(),
            repos.stores.clone(),
            repos.products.clone(),
        );
        let catalog = CatalogService::new(repos.stores.clone(), repos.products.clone());
        let tasks = TaskService::new(
            repos.stores.clone(),
            repos.products.clone(),
            repos.tasks.clone(),
        );
        let content = ContentService::new(openai, repos.stores.clone(), repos.products.clone());
        let admin = AdminService::new(
            auth.clone(),
            repos.users.clone(),
            repos.stores.clone(),
            repos.products.clone(),
            repos.tasks.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                pool,
                webhook_secret: config.shopify.api_secret.clone(),
                dashboard_url: config.dashboard_url().trim_end_matches('/').to_string(),
                auth,
                connections,
                sync,
                catalog,
                tasks,
                content,
                admin,
            }),
        }
    }

    /// Database pool, when backed by `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Key that signs Shopify webhook deliveries.
    #[must_use]
    pub fn webhook_secret(&self) -> &SecretString {
        &self.inner.webhook_secret
    }

    /// Merchant dashboard base URL, without a trailing slash.
    #[must_use]
    pub fn dashboard_url(&self) -> &str {
        &self.inner.dashboard_url
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn connections(&self) -> &StoreConnectionManager {
        &self.inner.connections
    }

    #[must_use]
    pub fn sync(&self) -> &SyncOrchestrator {
        &self.inner.sync
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn tasks(&self) -> &TaskService {
        &self.inner.tasks
    }

    #[must_use]
    pub fn content(&self) -> &ContentService {
        &self.inner.content
    }

    #[must_use]
    pub fn admin(&self) -> &AdminService {
        &self.inner.admin
    }
}
