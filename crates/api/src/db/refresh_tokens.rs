//! Latest refresh token per user.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use amts_core::UserId;

use super::RepositoryError;

/// Remembers the one refresh token id (`jti`) each user may redeem.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// Record `token_id` as the user's only valid refresh token.
    async fn store_latest(&self, user_id: UserId, token_id: Uuid) -> Result<(), RepositoryError>;

    /// The user's current refresh token id.
    async fn current(&self, user_id: UserId) -> Result<Option<Uuid>, RepositoryError>;

    /// Replace `expected` with `next` if `expected` is still current.
    ///
    /// Returns `false` when the presented token is stale.
    async fn rotate(
        &self,
        user_id: UserId,
        expected: Uuid,
        next: Uuid,
    ) -> Result<bool, RepositoryError>;

    /// Forget the user's refresh token.
    async fn revoke(&self, user_id: UserId) -> Result<(), RepositoryError>;
}

/// `PostgreSQL`-backed [`RefreshTokenRepository`].
pub struct PgRefreshTokenRepository {
    pool: PgPool,
}

impl PgRefreshTokenRepository {
    /// Create a new refresh token repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepository for PgRefreshTokenRepository {
    async fn store_latest(&self, user_id: UserId, token_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO refresh_tokens (user_id, token_id, issued_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET token_id = EXCLUDED.token_id, issued_at = EXCLUDED.issued_at
            ",
        )
        .bind(user_id)
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn current(&self, user_id: UserId) -> Result<Option<Uuid>, RepositoryError> {
        let token_id = sqlx::query_scalar("SELECT token_id FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(token_id)
    }

    async fn rotate(
        &self,
        user_id: UserId,
        expected: Uuid,
        next: Uuid,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE refresh_tokens
            SET token_id = $3, issued_at = NOW()
            WHERE user_id = $1 AND token_id = $2
            ",
        )
        .bind(user_id)
        .bind(expected)
        .bind(next)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
