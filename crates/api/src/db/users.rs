//! User repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use amts_core::{Email, SubscriptionTier, UserId, UserRole};

use super::RepositoryError;
use crate::models::{NewUser, User, UserFilter, UserUpdate};

/// Storage for user accounts.
///
/// Emails are stored lowercased, so lookups by a parsed [`Email`] are
/// case-insensitive.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user.
    ///
    /// Fails with `Conflict` if the email is taken.
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;

    /// Get a user by id.
    async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Get a user by email.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Apply a partial update. Fails with `NotFound` for an unknown id.
    async fn update(&self, id: UserId, update: &UserUpdate) -> Result<User, RepositoryError>;

    /// List users matching `filter`, newest first.
    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError>;

    /// Count users matching `filter`, ignoring paging.
    async fn count(&self, filter: &UserFilter) -> Result<i64, RepositoryError>;
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    full_name: Option<String>,
    company_name: Option<String>,
    industry: String,
    avatar_url: Option<String>,
    onboarding_completed: bool,
    role: UserRole,
    subscription_tier: SubscriptionTier,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::from_uuid(row.id),
            email,
            password_hash: row.password_hash,
            full_name: row.full_name,
            company_name: row.company_name,
            industry: row.industry,
            avatar_url: row.avatar_url,
            onboarding_completed: row.onboarding_completed,
            role: row.role,
            subscription_tier: row.subscription_tier,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, full_name, company_name, industry, \
     avatar_url, onboarding_completed, role, subscription_tier, is_active, created_at, updated_at";

const USER_FILTER: &str = "($1::text IS NULL \
        OR email ILIKE '%' || $1 || '%' \
        OR full_name ILIKE '%' || $1 || '%' \
        OR company_name ILIKE '%' || $1 || '%') \
     AND ($2::user_role IS NULL OR role = $2) \
     AND ($3::subscription_tier IS NULL OR subscription_tier = $3) \
     AND ($4::boolean IS NULL OR is_active = $4) \
     AND ($5::timestamptz IS NULL OR created_at >= $5)";

// =============================================================================
// PostgreSQL Repository
// =============================================================================

/// `PostgreSQL`-backed [`UserRepository`].
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let user = user.into_user(Utc::now());
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(user.email.as_str())
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(&user.company_name)
            .bind(&user.industry)
            .bind(&user.avatar_url)
            .bind(user.onboarding_completed)
            .bind(user.role)
            .bind(user.subscription_tier)
            .bind(user.is_active)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "email already registered"))?;

        row.try_into()
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, id: UserId, update: &UserUpdate) -> Result<User, RepositoryError> {
        let sql = format!(
            "UPDATE users SET \
                full_name = COALESCE($2, full_name), \
                company_name = COALESCE($3, company_name), \
                industry = COALESCE($4, industry), \
                avatar_url = COALESCE($5, avatar_url), \
                onboarding_completed = COALESCE($6, onboarding_completed), \
                role = COALESCE($7, role), \
                subscription_tier = COALESCE($8, subscription_tier), \
                is_active = COALESCE($9, is_active), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&update.full_name)
            .bind(&update.company_name)
            .bind(&update.industry)
            .bind(&update.avatar_url)
            .bind(update.onboarding_completed)
            .bind(update.role)
            .bind(update.subscription_tier)
            .bind(update.is_active)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {USER_FILTER} \
             ORDER BY created_at DESC LIMIT $6 OFFSET $7"
        );

        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&filter.search)
            .bind(filter.role)
            .bind(filter.subscription_tier)
            .bind(filter.is_active)
            .bind(filter.created_since)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64, RepositoryError> {
        let sql = format!("SELECT COUNT(*) FROM users WHERE {USER_FILTER}");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(&filter.search)
            .bind(filter.role)
            .bind(filter.subscription_tier)
            .bind(filter.is_active)
            .bind(filter.created_since)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
