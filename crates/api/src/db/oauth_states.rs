//! Pending Shopify installs keyed by OAuth state token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use amts_core::{ShopDomain, UserId};

use super::RepositoryError;

/// An install that was started but not yet completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInstall {
    /// Random URL-safe state token sent through Shopify.
    pub state: String,
    /// User who started the install.
    pub user_id: UserId,
    /// Shop the state was issued for.
    pub shop_domain: ShopDomain,
    /// When the install was started.
    pub issued_at: DateTime<Utc>,
}

/// Single-use OAuth state storage.
#[async_trait]
pub trait OAuthStateRepository: Send + Sync {
    /// Remember a pending install.
    async fn insert(&self, pending: &PendingInstall) -> Result<(), RepositoryError>;

    /// Remove and return the pending install for `state`.
    ///
    /// At most one caller receives `Some` for a given state.
    async fn consume(&self, state: &str) -> Result<Option<PendingInstall>, RepositoryError>;

    /// Drop installs issued before `cutoff`. Returns how many were removed.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[derive(Debug, sqlx::FromRow)]
struct PendingInstallRow {
    state: String,
    user_id: Uuid,
    shop_domain: String,
    issued_at: DateTime<Utc>,
}

impl TryFrom<PendingInstallRow> for PendingInstall {
    type Error = RepositoryError;

    fn try_from(row: PendingInstallRow) -> Result<Self, Self::Error> {
        let shop_domain = ShopDomain::parse(&row.shop_domain).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid shop domain in database: {e}"))
        })?;

        Ok(Self {
            state: row.state,
            user_id: UserId::from_uuid(row.user_id),
            shop_domain,
            issued_at: row.issued_at,
        })
    }
}

/// `PostgreSQL`-backed [`OAuthStateRepository`].
pub struct PgOAuthStateRepository {
    pool: PgPool,
}

impl PgOAuthStateRepository {
    /// Create a new OAuth state repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OAuthStateRepository for PgOAuthStateRepository {
    async fn insert(&self, pending: &PendingInstall) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO oauth_states (state, user_id, shop_domain, issued_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&pending.state)
        .bind(pending.user_id)
        .bind(pending.shop_domain.as_str())
        .bind(pending.issued_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "state token collision"))?;

        Ok(())
    }

    async fn consume(&self, state: &str) -> Result<Option<PendingInstall>, RepositoryError> {
        let row = sqlx::query_as::<_, PendingInstallRow>(
            r"
            DELETE FROM oauth_states
            WHERE state = $1
            RETURNING state, user_id, shop_domain, issued_at
            ",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE issued_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
