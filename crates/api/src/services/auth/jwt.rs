//! Signed access and refresh tokens.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use amts_core::UserId;

use super::AuthError;
use crate::config::JwtConfig;

/// Which kind of token a JWT is. Carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: UserId,
    /// Expiration time (Unix seconds).
    pub exp: i64,
    /// Issued at (Unix seconds).
    pub iat: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Unique id, set on refresh tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<Uuid>,
}

/// Signs and verifies tokens with the configured HMAC secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("algorithm", &self.algorithm)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Build a signer from the JWT configuration.
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            algorithm: config.algorithm,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Lifetime of access tokens.
    #[must_use]
    pub const fn access_ttl(&self) -> chrono::Duration {
        self.access_ttl
    }

    /// Sign an access token for `user_id` issued at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing` if encoding fails.
    pub fn access_token(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, AuthError> {
        self.sign(&Claims {
            sub: user_id,
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
            token_type: TokenType::Access,
            jti: None,
        })
    }

    /// Sign a refresh token with id `jti` for `user_id` issued at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing` if encoding fails.
    pub fn refresh_token(
        &self,
        user_id: UserId,
        jti: Uuid,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        self.sign(&Claims {
            sub: user_id,
            exp: (now + self.refresh_ttl).timestamp(),
            iat: now.timestamp(),
            token_type: TokenType::Refresh,
            jti: Some(jti),
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        Ok(jsonwebtoken::encode(
            &Header::new(self.algorithm),
            claims,
            &self.encoding,
        )?)
    }

    /// Check signature, expiry and `type` claim.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenInvalid` on any failure.
    pub fn decode(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let validation = Validation::new(self.algorithm);
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |e| {
                tracing::debug!(error = %e, "Rejected token");
                AuthError::TokenInvalid
            },
        )?;

        if data.claims.token_type != expected {
            tracing::debug!(
                expected = ?expected,
                actual = ?data.claims.token_type,
                "Rejected token of wrong type"
            );
            return Err(AuthError::TokenInvalid);
        }
        Ok(data.claims)
    }
}
