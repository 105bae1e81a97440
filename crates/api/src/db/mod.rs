//! Persistence for the API.
//!
//! # Tables
//!
//! - `users` - Merchant and staff accounts
//! - `refresh_tokens` - Latest refresh token id per user
//! - `oauth_states` - Pending Shopify installs (single-use state tokens)
//! - `stores` - Connected Shopify stores and their access tokens
//! - `products` - Catalog products with cannabis attributes
//! - `tasks` - Work items per store
//!
//! Each table sits behind a repository trait. The `Pg*` implementations are
//! used in production; [`memory::MemoryStore`] implements every trait for
//! tests and local development.
//!
//! Read-modify-write operations are single statements (`ON CONFLICT` upserts,
//! `DELETE ... RETURNING`, conditional updates) so concurrent requests cannot
//! lose updates.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p amts-cli -- migrate
//! ```

pub mod memory;
pub mod oauth_states;
pub mod products;
pub mod refresh_tokens;
pub mod stores;
pub mod tasks;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use memory::MemoryStore;
pub use oauth_states::{OAuthStateRepository, PendingInstall, PgOAuthStateRepository};
pub use products::{PgProductRepository, ProductRepository};
pub use refresh_tokens::{PgRefreshTokenRepository, RefreshTokenRepository};
pub use stores::{PgStoreRepository, StoreRepository};
pub use tasks::{PgTaskRepository, TaskRepository};
pub use users::{PgUserRepository, UserRepository};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or lost race (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to `Conflict`, passing other errors through.
    pub(crate) fn from_unique(err: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_string());
        }
        Self::Database(err)
    }
}

/// Every repository the services need.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub oauth_states: Arc<dyn OAuthStateRepository>,
    pub stores: Arc<dyn StoreRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub tasks: Arc<dyn TaskRepository>,
}

impl Repositories {
    /// `PostgreSQL`-backed repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            refresh_tokens: Arc::new(PgRefreshTokenRepository::new(pool.clone())),
            oauth_states: Arc::new(PgOAuthStateRepository::new(pool.clone())),
            stores: Arc::new(PgStoreRepository::new(pool.clone())),
            products: Arc::new(PgProductRepository::new(pool.clone())),
            tasks: Arc::new(PgTaskRepository::new(pool.clone())),
        }
    }

    /// In-memory repositories sharing one [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            users: store.clone(),
            refresh_tokens: store.clone(),
            oauth_states: store.clone(),
            stores: store.clone(),
            products: store.clone(),
            tasks: store,
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Run embedded migrations.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
