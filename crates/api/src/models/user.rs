//! Merchant and staff accounts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use amts_core::{Email, SubscriptionTier, UserId, UserRole};

/// A user account (domain type).
///
/// `password_hash` is never serialized and is redacted from `Debug`.
#[derive(Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub industry: String,
    pub avatar_url: Option<String>,
    pub onboarding_completed: bool,
    pub role: UserRole,
    pub subscription_tier: SubscriptionTier,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("role", &self.role)
            .field("subscription_tier", &self.subscription_tier)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

/// Input for creating a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub industry: String,
    pub role: UserRole,
    pub subscription_tier: SubscriptionTier,
}

impl NewUser {
    /// Materialize the record with a fresh id and timestamps.
    #[must_use]
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: UserId::generate(),
            email: self.email,
            password_hash: self.password_hash,
            full_name: self.full_name,
            company_name: self.company_name,
            industry: self.industry,
            avatar_url: None,
            onboarding_completed: false,
            role: self.role,
            subscription_tier: self.subscription_tier,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a user. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub industry: Option<String>,
    pub avatar_url: Option<String>,
    pub onboarding_completed: Option<bool>,
    pub role: Option<UserRole>,
    pub subscription_tier: Option<SubscriptionTier>,
    pub is_active: Option<bool>,
}

impl UserUpdate {
    /// Apply the set fields to `user`.
    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(v) = &self.full_name {
            user.full_name = Some(v.clone());
        }
        if let Some(v) = &self.company_name {
            user.company_name = Some(v.clone());
        }
        if let Some(v) = &self.industry {
            user.industry.clone_from(v);
        }
        if let Some(v) = &self.avatar_url {
            user.avatar_url = Some(v.clone());
        }
        if let Some(v) = self.onboarding_completed {
            user.onboarding_completed = v;
        }
        if let Some(v) = self.role {
            user.role = v;
        }
        if let Some(v) = self.subscription_tier {
            user.subscription_tier = v;
        }
        if let Some(v) = self.is_active {
            user.is_active = v;
        }
        user.updated_at = now;
    }
}

/// Filters for the admin client list.
#[derive(Debug, Clone)]
pub struct UserFilter {
    /// Case-insensitive match on email, full name or company name.
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub subscription_tier: Option<SubscriptionTier>,
    pub is_active: Option<bool>,
    /// Only accounts created at or after this instant.
    pub created_since: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for UserFilter {
    fn default() -> Self {
        Self {
            search: None,
            role: None,
            subscription_tier: None,
            is_active: None,
            created_since: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl UserFilter {
    /// Whether `user` passes every set filter.
    #[must_use]
    pub fn matches(&self, user: &User) -> bool {
        let search_ok = self.search.as_deref().is_none_or(|needle| {
            let needle = needle.to_lowercase();
            [
                Some(user.email.as_str()),
                user.full_name.as_deref(),
                user.company_name.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
        });

        search_ok
            && self.role.is_none_or(|r| user.role == r)
            && self.subscription_tier.is_none_or(|t| user.subscription_tier == t)
            && self.is_active.is_none_or(|a| user.is_active == a)
            && self.created_since.is_none_or(|since| user.created_at >= since)
    }
}
