//! Account authentication service.
//!
//! Passwords are hashed with Argon2id. Sessions are a short-lived access JWT
//! plus a refresh JWT; only the most recently issued refresh token of each
//! user can be redeemed, and redeeming it rotates both.

mod error;
pub mod jwt;
pub mod password;

pub use error::AuthError;
pub use jwt::{Claims, TokenSigner, TokenType};

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use amts_core::{Email, SubscriptionTier, UserId, UserRole};

use crate::config::JwtConfig;
use crate::db::{RefreshTokenRepository, RepositoryError, UserRepository};
use crate::models::{NewUser, User, UserUpdate};

const DEFAULT_INDUSTRY: &str = "cannabis";

/// Account details supplied at signup or by an admin creating a client.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub industry: Option<String>,
    pub avatar_url: Option<String>,
    pub onboarding_completed: Option<bool>,
}

impl From<ProfileUpdate> for UserUpdate {
    fn from(p: ProfileUpdate) -> Self {
        Self {
            full_name: p.full_name,
            company_name: p.company_name,
            industry: p.industry,
            avatar_url: p.avatar_url,
            onboarding_completed: p.onboarding_completed,
            ..Self::default()
        }
    }
}

/// An access/refresh token pair.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    refresh_tokens: Arc<dyn RefreshTokenRepository>,
    signer: TokenSigner,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        refresh_tokens: Arc<dyn RefreshTokenRepository>,
        jwt: &JwtConfig,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            signer: TokenSigner::new(jwt),
        }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Register a merchant account on the free tier.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `AuthError::Validation` for bad
    /// input, and `AuthError::DuplicateEmail` if the email (in any case) is
    /// already registered.
    pub async fn register(&self, registration: Registration) -> Result<User, AuthError> {
        self.create_user(registration, UserRole::User, SubscriptionTier::Free)
            .await
    }

    /// Create an account with an explicit role and tier.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`].
    #[tracing::instrument(skip(self, registration))]
    pub async fn create_user(
        &self,
        registration: Registration,
        role: UserRole,
        tier: SubscriptionTier,
    ) -> Result<User, AuthError> {
        let email = Email::parse(&registration.email)?;
        password::validate_password(&registration.password)?;
        let password_hash = password::hash_password(&registration.password).await?;

        let user = self
            .users
            .create(NewUser {
                email,
                password_hash,
                full_name: registration.full_name,
                company_name: registration.company_name,
                industry: registration
                    .industry
                    .unwrap_or_else(|| DEFAULT_INDUSTRY.to_string()),
                role,
                subscription_tier: tier,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::DuplicateEmail,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "Account created");
        Ok(user)
    }

    /// Update the caller's own profile. Role, tier and status are not
    /// reachable from here.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenInvalid` if the account disappeared.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<User, AuthError> {
        self.users
            .update(user_id, &update.into())
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::TokenInvalid,
                other => AuthError::Repository(other),
            })
    }

    /// Check an email/password pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email, a wrong
    /// password or an inactive account alike.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(password, &user.password_hash).await || !user.is_active {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    /// Issue a fresh token pair, invalidating any earlier refresh token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing` or `AuthError::Repository`.
    pub async fn issue_tokens(&self, user_id: UserId) -> Result<TokenPair, AuthError> {
        let jti = Uuid::new_v4();
        self.refresh_tokens.store_latest(user_id, jti).await?;
        self.sign_pair(user_id, jti)
    }

    /// Issue an access token only. The user's refresh token is untouched.
    ///
    /// Used for staff masquerade so the client's own session survives.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing`.
    pub fn issue_access_token(&self, user_id: UserId) -> Result<String, AuthError> {
        self.signer.access_token(user_id, Utc::now())
    }

    /// Access token lifetime in seconds.
    #[must_use]
    pub fn access_ttl_secs(&self) -> i64 {
        self.signer.access_ttl().num_seconds()
    }

    /// Verify a token and load its active subject.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenInvalid` for a bad signature, expiry, wrong
    /// type, or a subject that is missing or inactive.
    pub async fn verify(&self, token: &str, expected: TokenType) -> Result<(Claims, User), AuthError> {
        let claims = self.signer.decode(token, expected)?;
        match self.users.get(claims.sub).await? {
            Some(user) if user.is_active => Ok((claims, user)),
            _ => Err(AuthError::TokenInvalid),
        }
    }

    /// Redeem a refresh token for a new pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenInvalid` if the token fails verification or
    /// is no longer the user's latest refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, TokenPair), AuthError> {
        let (claims, user) = self.verify(refresh_token, TokenType::Refresh).await?;
        let Some(presented) = claims.jti else {
            return Err(AuthError::TokenInvalid);
        };

        let next = Uuid::new_v4();
        if !self.refresh_tokens.rotate(user.id, presented, next).await? {
            tracing::warn!(user_id = %user.id, "Stale refresh token presented");
            return Err(AuthError::TokenInvalid);
        }

        let pair = self.sign_pair(user.id, next)?;
        Ok((user, pair))
    }

    /// Drop the user's refresh token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn logout(&self, user_id: UserId) -> Result<(), AuthError> {
        self.refresh_tokens.revoke(user_id).await?;
        Ok(())
    }

    fn sign_pair(&self, user_id: UserId, jti: Uuid) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        Ok(TokenPair {
            access_token: self.signer.access_token(user_id, now)?,
            refresh_token: self.signer.refresh_token(user_id, jti, now)?,
            token_type: "bearer",
            expires_in: self.access_ttl_secs(),
        })
    }
}

/// Require a staff role.
///
/// # Errors
///
/// Returns `AuthError::Forbidden` for ordinary users.
pub const fn require_staff(user: &User) -> Result<(), AuthError> {
    if user.role.is_staff() {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Require the super admin role.
///
/// # Errors
///
/// Returns `AuthError::Forbidden` for everyone else.
pub const fn require_super_admin(user: &User) -> Result<(), AuthError> {
    if matches!(user.role, UserRole::SuperAdmin) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use jsonwebtoken::Algorithm;
    use secrecy::SecretString;

    use super::*;
    use crate::db::Repositories;
    use crate::models::UserUpdate;

    fn service() -> (AuthService, Repositories) {
        let repos = Repositories::in_memory();
        let jwt = JwtConfig {
            secret: SecretString::from("k3J9x!mQ2@vL8#pR5$tW1^zB6&nC4*hD"),
            algorithm: Algorithm::HS256,
            access_ttl: chrono::Duration::minutes(30),
            refresh_ttl: chrono::Duration::days(7),
        };
        let service = AuthService::new(repos.users.clone(), repos.refresh_tokens.clone(), &jwt);
        (service, repos)
    }

    fn registration(email: &str, password: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password: password.to_string(),
            full_name: Some("Mary Jane".to_string()),
            company_name: None,
            industry: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let (auth, _) = service();
        let user = auth
            .register(registration("mj@dispensary.co", "green-thumb-42"))
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::User);
        assert_eq!(user.subscription_tier, SubscriptionTier::Free);
        assert_eq!(user.industry, "cannabis");

        let found = auth
            .authenticate("MJ@Dispensary.co", "green-thumb-42")
            .await
            .unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_in_any_case() {
        let (auth, _) = service();
        auth.register(registration("mj@dispensary.co", "green-thumb-42"))
            .await
            .unwrap();

        let err = auth
            .register(registration("MJ@DISPENSARY.CO", "another-pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let (auth, _) = service();
        let err = auth
            .register(registration("mj@dispensary.co", "short"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_the_same() {
        let (auth, _) = service();
        auth.register(registration("mj@dispensary.co", "green-thumb-42"))
            .await
            .unwrap();

        let wrong = auth
            .authenticate("mj@dispensary.co", "not-the-password")
            .await
            .unwrap_err();
        let unknown = auth
            .authenticate("nobody@dispensary.co", "green-thumb-42")
            .await
            .unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_log_in_or_use_tokens() {
        let (auth, repos) = service();
        let user = auth
            .register(registration("mj@dispensary.co", "green-thumb-42"))
            .await
            .unwrap();
        let tokens = auth.issue_tokens(user.id).await.unwrap();

        repos
            .users
            .update(
                user.id,
                &UserUpdate {
                    is_active: Some(false),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            auth.authenticate("mj@dispensary.co", "green-thumb-42").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.verify(&tokens.access_token, TokenType::Access).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_stale_token_fails() {
        let (auth, _) = service();
        let user = auth
            .register(registration("mj@dispensary.co", "green-thumb-42"))
            .await
            .unwrap();

        let first = auth.issue_tokens(user.id).await.unwrap();
        let (_, second) = auth.refresh(&first.refresh_token).await.unwrap();

        assert!(matches!(
            auth.refresh(&first.refresh_token).await,
            Err(AuthError::TokenInvalid)
        ));
        assert!(auth.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_reissue_invalidates_previous_refresh_token() {
        let (auth, _) = service();
        let user = auth
            .register(registration("mj@dispensary.co", "green-thumb-42"))
            .await
            .unwrap();

        let old = auth.issue_tokens(user.id).await.unwrap();
        let _new = auth.issue_tokens(user.id).await.unwrap();

        assert!(matches!(
            auth.refresh(&old.refresh_token).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh() {
        let (auth, _) = service();
        let user = auth
            .register(registration("mj@dispensary.co", "green-thumb-42"))
            .await
            .unwrap();
        let tokens = auth.issue_tokens(user.id).await.unwrap();

        auth.logout(user.id).await.unwrap();
        assert!(auth.refresh(&tokens.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let (auth, _) = service();
        let user = auth
            .register(registration("mj@dispensary.co", "green-thumb-42"))
            .await
            .unwrap();
        let tokens = auth.issue_tokens(user.id).await.unwrap();

        assert!(auth.refresh(&tokens.access_token).await.is_err());
        let (claims, verified) = auth
            .verify(&tokens.access_token, TokenType::Access)
            .await
            .unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(verified.id, user.id);
    }

    #[tokio::test]
    async fn test_profile_update_cannot_touch_role() {
        let (auth, _) = service();
        let user = auth
            .register(registration("Grower@GreenLeaf.co", "correct horse battery"))
            .await
            .unwrap();

        let update: ProfileUpdate = serde_json::from_value(serde_json::json!({
            "company_name": "Green Leaf Farms",
            "onboarding_completed": true,
            "role": "super_admin"
        }))
        .unwrap();
        let updated = auth.update_profile(user.id, update).await.unwrap();

        assert_eq!(updated.company_name.as_deref(), Some("Green Leaf Farms"));
        assert!(updated.onboarding_completed);
        assert_eq!(updated.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_masquerade_token_leaves_refresh_intact() {
        let (auth, _) = service();
        let user = auth
            .register(registration("mj@dispensary.co", "green-thumb-42"))
            .await
            .unwrap();
        let tokens = auth.issue_tokens(user.id).await.unwrap();

        let access = auth.issue_access_token(user.id).unwrap();
        assert!(auth.verify(&access, TokenType::Access).await.is_ok());
        assert!(auth.refresh(&tokens.refresh_token).await.is_ok());
    }

    #[test]
    fn test_role_guards() {
        let mut user = NewUser {
            email: Email::parse("staff@amts.dev").unwrap(),
            password_hash: String::new(),
            full_name: None,
            company_name: None,
            industry: DEFAULT_INDUSTRY.to_string(),
            role: UserRole::User,
            subscription_tier: SubscriptionTier::Free,
        }
        .into_user(Utc::now());

        assert!(require_staff(&user).is_err());
        user.role = UserRole::Admin;
        assert!(require_staff(&user).is_ok());
        assert!(require_super_admin(&user).is_err());
        user.role = UserRole::SuperAdmin;
        assert!(require_super_admin(&user).is_ok());
    }
}
