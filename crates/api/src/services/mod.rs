//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Accounts, password hashing and JWT sessions
//! - `connections` - Shopify OAuth installs and per-shop client cache
//! - `sync` - Catalog import from Shopify and product export
//! - `catalog` - Local product CRUD and bulk import
//! - `tasks` - Task CRUD and status transitions
//! - `content` - AI product copy with an offline fallback
//! - `admin` - Cross-tenant views for staff

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod connections;
pub mod content;
pub mod sync;
pub mod tasks;

pub use admin::AdminService;
pub use auth::{AuthError, AuthService, ProfileUpdate, Registration, TokenPair};
pub use catalog::CatalogService;
pub use connections::StoreConnectionManager;
pub use content::ContentService;
pub use sync::SyncOrchestrator;
pub use tasks::TaskService;

use thiserror::Error;

use amts_core::{ProductId, StoreId, UserId};

use crate::db::{ProductRepository, RepositoryError, StoreRepository};
use crate::models::{Product, Store, StoreFilter, TaskError};
use crate::openai::OpenAiError;
use crate::shopify::ShopifyError;

/// Errors shared by the store, catalog, task and content services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The named resource does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The caller does not own the resource.
    #[error("access denied")]
    Forbidden,

    /// The store has no usable access token.
    #[error("store not connected")]
    NotConnected,

    /// OAuth state token unknown, expired, reused or bound to another shop.
    #[error("invalid state parameter")]
    InvalidState,

    /// The authorization code could not be exchanged.
    #[error("failed to exchange code: {0}")]
    OAuthExchangeFailed(String),

    /// A remote page could not be fetched during sync.
    #[error("sync failed: {0}")]
    SyncFailed(String),

    /// A product could not be pushed to Shopify.
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// Another request changed the record first.
    #[error("{0}")]
    Conflict(String),

    /// Account or permission failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Task status would move backward.
    #[error(transparent)]
    InvalidTransition(#[from] TaskError),

    /// Shopify call failed.
    #[error(transparent)]
    Shopify(#[from] ShopifyError),

    /// Content generation failed.
    #[error(transparent)]
    Content(#[from] OpenAiError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    /// Map `RepositoryError::NotFound` to a named `NotFound` and a lost
    /// race to `Conflict`.
    pub(crate) fn missing(resource: &'static str) -> impl Fn(RepositoryError) -> Self {
        move |e| match e {
            RepositoryError::NotFound => Self::NotFound(resource),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

/// Load a store and check that `caller` owns it.
pub(crate) async fn owned_store(
    stores: &dyn StoreRepository,
    store_id: StoreId,
    caller: UserId,
) -> Result<Store, ServiceError> {
    let store = stores
        .get(store_id)
        .await?
        .ok_or(ServiceError::NotFound("store"))?;
    if store.user_id != caller {
        return Err(ServiceError::Forbidden);
    }
    Ok(store)
}

/// Every store owned by `user_id`, newest first.
pub(crate) async fn stores_of(
    stores: &dyn StoreRepository,
    user_id: UserId,
) -> Result<Vec<Store>, ServiceError> {
    let filter = StoreFilter {
        user_id: Some(user_id),
        limit: i64::from(i32::MAX),
        ..StoreFilter::default()
    };
    Ok(stores.list(&filter).await?)
}

/// Ids of every store owned by `user_id`.
pub(crate) async fn store_ids_of(
    stores: &dyn StoreRepository,
    user_id: UserId,
) -> Result<Vec<StoreId>, ServiceError> {
    Ok(stores_of(stores, user_id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect())
}

/// Load a product and check that `caller` owns its store.
pub(crate) async fn owned_product(
    stores: &dyn StoreRepository,
    products: &dyn ProductRepository,
    product_id: ProductId,
    caller: UserId,
) -> Result<Product, ServiceError> {
    let product = products
        .get(product_id)
        .await?
        .ok_or(ServiceError::NotFound("product"))?;
    owned_store(stores, product.store_id, caller).await?;
    Ok(product)
}
