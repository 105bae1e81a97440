//! Store repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use uuid::Uuid;

use amts_core::{ShopDomain, StoreId, StoreStatus, UserId};

use super::RepositoryError;
use crate::models::{NewStore, Store, StoreFilter};

/// Storage for connected stores. At most one store exists per shop domain.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    /// Insert a connected store, or if the domain already has one, give it
    /// the new token and `connected` status.
    ///
    /// An existing store keeps its id, owner, name and product count.
    async fn insert_or_reconnect(&self, store: NewStore) -> Result<Store, RepositoryError>;

    /// Give the store for `domain` a new token and `connected` status.
    ///
    /// Returns `None` if no store exists for the domain.
    async fn reconnect(
        &self,
        domain: &ShopDomain,
        access_token: &SecretString,
    ) -> Result<Option<Store>, RepositoryError>;

    /// Get a store by id.
    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError>;

    /// Get the store for a shop domain.
    async fn find_by_domain(&self, domain: &ShopDomain) -> Result<Option<Store>, RepositoryError>;

    /// List stores matching `filter`, newest first.
    async fn list(&self, filter: &StoreFilter) -> Result<Vec<Store>, RepositoryError>;

    /// Count stores matching `filter`, ignoring paging.
    async fn count(&self, filter: &StoreFilter) -> Result<i64, RepositoryError>;

    /// Set the connection status. Fails with `NotFound` for an unknown id.
    async fn set_status(&self, id: StoreId, status: StoreStatus) -> Result<(), RepositoryError>;

    /// Stamp a finished sync and overwrite the cached product count.
    async fn record_sync(
        &self,
        id: StoreId,
        synced_at: DateTime<Utc>,
        products_count: i32,
    ) -> Result<Store, RepositoryError>;

    /// Remove a store. Returns `false` if it did not exist.
    async fn delete(&self, id: StoreId) -> Result<bool, RepositoryError>;
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    shop_domain: String,
    access_token: Option<String>,
    status: StoreStatus,
    industry: String,
    brand_colors: Option<serde_json::Value>,
    logo_url: Option<String>,
    last_synced: Option<DateTime<Utc>>,
    products_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoreRow> for Store {
    type Error = RepositoryError;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        let shop_domain = ShopDomain::parse(&row.shop_domain).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid shop domain in database: {e}"))
        })?;

        Ok(Self {
            id: StoreId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            name: row.name,
            shop_domain,
            access_token: row.access_token.map(SecretString::from),
            status: row.status,
            industry: row.industry,
            brand_colors: row.brand_colors,
            logo_url: row.logo_url,
            last_synced: row.last_synced,
            products_count: row.products_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const STORE_COLUMNS: &str = "id, user_id, name, shop_domain, access_token, status, industry, \
     brand_colors, logo_url, last_synced, products_count, created_at, updated_at";

const STORE_FILTER: &str = "($1::uuid IS NULL OR user_id = $1) \
     AND ($2::store_status IS NULL OR status = $2) \
     AND ($3::timestamptz IS NULL OR created_at >= $3)";

// =============================================================================
// PostgreSQL Repository
// =============================================================================

/// `PostgreSQL`-backed [`StoreRepository`].
pub struct PgStoreRepository {
    pool: PgPool,
}

impl PgStoreRepository {
    /// Create a new store repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreRepository for PgStoreRepository {
    async fn insert_or_reconnect(&self, store: NewStore) -> Result<Store, RepositoryError> {
        let store = store.into_store(Utc::now());
        let sql = format!(
            "INSERT INTO stores ({STORE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (shop_domain) DO UPDATE \
             SET access_token = EXCLUDED.access_token, \
                 status = EXCLUDED.status, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {STORE_COLUMNS}"
        );

        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(store.id)
            .bind(store.user_id)
            .bind(&store.name)
            .bind(store.shop_domain.as_str())
            .bind(store.access_token.as_ref().map(ExposeSecret::expose_secret))
            .bind(store.status)
            .bind(&store.industry)
            .bind(&store.brand_colors)
            .bind(&store.logo_url)
            .bind(store.last_synced)
            .bind(store.products_count)
            .bind(store.created_at)
            .bind(store.updated_at)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn reconnect(
        &self,
        domain: &ShopDomain,
        access_token: &SecretString,
    ) -> Result<Option<Store>, RepositoryError> {
        let sql = format!(
            "UPDATE stores \
             SET access_token = $2, status = 'connected', updated_at = NOW() \
             WHERE shop_domain = $1 \
             RETURNING {STORE_COLUMNS}"
        );

        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(domain.as_str())
            .bind(access_token.expose_secret())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = $1");
        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_by_domain(&self, domain: &ShopDomain) -> Result<Option<Store>, RepositoryError> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM stores WHERE shop_domain = $1");
        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(domain.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: &StoreFilter) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE {STORE_FILTER} \
             ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        );

        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(filter.user_id)
            .bind(filter.status)
            .bind(filter.created_since)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count(&self, filter: &StoreFilter) -> Result<i64, RepositoryError> {
        let sql = format!("SELECT COUNT(*) FROM stores WHERE {STORE_FILTER}");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(filter.user_id)
            .bind(filter.status)
            .bind(filter.created_since)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn set_status(&self, id: StoreId, status: StoreStatus) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE stores SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn record_sync(
        &self,
        id: StoreId,
        synced_at: DateTime<Utc>,
        products_count: i32,
    ) -> Result<Store, RepositoryError> {
        let sql = format!(
            "UPDATE stores \
             SET last_synced = $2, products_count = $3, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {STORE_COLUMNS}"
        );

        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(id)
            .bind(synced_at)
            .bind(products_count)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn delete(&self, id: StoreId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM stores WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
