//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `JWT_SECRET` - Token signing secret (min 32 chars, high entropy)
//! - `SHOPIFY_API_KEY` - Shopify app client ID
//! - `SHOPIFY_API_SECRET` - Shopify app client secret (also signs webhooks)
//!
//! ## Optional
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8000)
//! - `ENVIRONMENT` - Deployment name; `production` switches logs to JSON (default: development)
//! - `JWT_ALGORITHM` - `HS256`, `HS384` or `HS512` (default: HS256)
//! - `ACCESS_TOKEN_EXPIRE_MINUTES` - Access token lifetime (default: 30)
//! - `REFRESH_TOKEN_EXPIRE_DAYS` - Refresh token lifetime (default: 7)
//! - `SHOPIFY_SCOPES` - Comma-separated OAuth scopes
//! - `SHOPIFY_APP_URL` - Public URL of this API, used for the OAuth redirect (default: <http://localhost:8000>)
//! - `SHOPIFY_TIMEOUT_SECS` - Per-request timeout for Shopify calls (default: 30)
//! - `OPENAI_API_KEY` - `OpenAI` API key; without it content is generated offline
//! - `OPENAI_MODEL` - Chat model (default: gpt-4-turbo-preview)
//! - `OPENAI_TIMEOUT_SECS` - Per-request timeout for `OpenAI` calls (default: 60)
//! - `CORS_ORIGINS` - Comma-separated allowed origins; the first is the dashboard URL
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - Sentry sampling (default: 1.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use jsonwebtoken::Algorithm;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo-preview";
const DEFAULT_SHOPIFY_SCOPES: &str =
    "read_products,write_products,read_themes,write_themes,read_content,write_content";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:5174,http://localhost:3000";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Deployment environment name
    pub environment: String,
    /// Token signing configuration
    pub jwt: JwtConfig,
    /// Shopify app configuration
    pub shopify: ShopifyConfig,
    /// `OpenAI` configuration (optional, offline generation otherwise)
    pub openai: Option<OpenAiConfig>,
    /// Allowed cross-origin domains
    pub cors_origins: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// JWT signing configuration.
///
/// Implements `Debug` manually to redact the secret.
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC signing secret
    pub secret: SecretString,
    /// HMAC algorithm
    pub algorithm: Algorithm,
    /// Access token lifetime
    pub access_ttl: chrono::Duration,
    /// Refresh token lifetime
    pub refresh_ttl: chrono::Duration,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Shopify app configuration.
///
/// Implements `Debug` manually to redact the app secret.
#[derive(Clone)]
pub struct ShopifyConfig {
    /// OAuth client ID
    pub api_key: String,
    /// OAuth client secret; also the webhook signing key
    pub api_secret: SecretString,
    /// Requested OAuth scopes
    pub scopes: Vec<String>,
    /// Public URL of this API
    pub app_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ShopifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("app_url", &self.app_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ShopifyConfig {
    /// Where Shopify sends merchants back after they approve the install.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}/api/shopify/auth/callback",
            self.app_url.trim_end_matches('/')
        )
    }
}

/// `OpenAI` API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// `OpenAI` API key
    pub api_key: SecretString,
    /// Chat completion model
    pub model: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_required_secret("DATABASE_URL")?;
        let host = get_env_or_default("HOST", "0.0.0.0")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("PORT", "8000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORT".to_string(), e.to_string()))?;
        let environment = get_env_or_default("ENVIRONMENT", "development");

        let jwt = JwtConfig::from_env()?;
        let shopify = ShopifyConfig::from_env()?;
        let openai = OpenAiConfig::from_env();
        let cors_origins = parse_csv(&get_env_or_default("CORS_ORIGINS", DEFAULT_CORS_ORIGINS));
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            host,
            port,
            environment,
            jwt,
            shopify,
            openai,
            cors_origins,
            sentry_dsn,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether this is a production deployment.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// The merchant dashboard URL (first allowed origin).
    #[must_use]
    pub fn dashboard_url(&self) -> &str {
        self.cors_origins
            .first()
            .map_or("http://localhost:5173", String::as_str)
    }
}

impl JwtConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret = get_validated_secret("JWT_SECRET")?;
        validate_min_length(&secret, "JWT_SECRET")?;

        let algorithm = parse_algorithm(&get_env_or_default("JWT_ALGORITHM", "HS256"))?;
        let access_minutes = parse_positive("ACCESS_TOKEN_EXPIRE_MINUTES", "30")?;
        let refresh_days = parse_positive("REFRESH_TOKEN_EXPIRE_DAYS", "7")?;

        Ok(Self {
            secret,
            algorithm,
            access_ttl: chrono::Duration::minutes(access_minutes),
            refresh_ttl: chrono::Duration::days(refresh_days),
        })
    }
}

impl ShopifyConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = parse_positive("SHOPIFY_TIMEOUT_SECS", "30")?;

        Ok(Self {
            api_key: get_required_env("SHOPIFY_API_KEY")?,
            api_secret: get_validated_secret("SHOPIFY_API_SECRET")?,
            scopes: parse_csv(&get_env_or_default("SHOPIFY_SCOPES", DEFAULT_SHOPIFY_SCOPES)),
            app_url: get_env_or_default("SHOPIFY_APP_URL", "http://localhost:8000"),
            request_timeout: Duration::from_secs(timeout_secs.unsigned_abs()),
        })
    }
}

impl OpenAiConfig {
    /// Load `OpenAI` configuration from environment.
    ///
    /// Returns `None` if `OPENAI_API_KEY` is not set (offline generation).
    fn from_env() -> Option<Self> {
        get_optional_env("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(|key| {
                // Validate the key if present
                if let Err(e) = validate_secret_strength(&key, "OPENAI_API_KEY") {
                    tracing::warn!("OPENAI_API_KEY validation warning: {e}");
                }
                let timeout_secs = parse_positive("OPENAI_TIMEOUT_SECS", "60").unwrap_or(60);
                Self {
                    api_key: SecretString::from(key),
                    model: get_env_or_default("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
                    request_timeout: Duration::from_secs(timeout_secs.unsigned_abs()),
                }
            })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a positive integer variable.
fn parse_positive(key: &str, default: &str) -> Result<i64, ConfigError> {
    let value = get_env_or_default(key, default);
    match value.parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(n) => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be positive (got {n})"),
        )),
        Err(e) => Err(ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse a JWT algorithm name. Only HMAC algorithms are supported.
fn parse_algorithm(value: &str) -> Result<Algorithm, ConfigError> {
    match value.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(ConfigError::InvalidEnvVar(
            "JWT_ALGORITHM".to_string(),
            format!("unsupported algorithm {other} (use HS256, HS384 or HS512)"),
        )),
    }
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_min_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config() -> ApiConfig {
        ApiConfig {
            database_url: SecretString::from("postgres://localhost/amts_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 8000,
            environment: "development".to_string(),
            jwt: JwtConfig {
                secret: SecretString::from("k3J9x!mQ2@vL8#pR5$tW1^zB6&nC4*hD"),
                algorithm: Algorithm::HS256,
                access_ttl: chrono::Duration::minutes(30),
                refresh_ttl: chrono::Duration::days(7),
            },
            shopify: ShopifyConfig {
                api_key: "test_api_key".to_string(),
                api_secret: SecretString::from("shpss_super_private_value"),
                scopes: parse_csv(DEFAULT_SHOPIFY_SCOPES),
                app_url: "https://api.amts.dev/".to_string(),
                request_timeout: Duration::from_secs(30),
            },
            openai: None,
            cors_origins: parse_csv("https://app.amts.dev, https://admin.amts.dev"),
            sentry_dsn: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 1.0,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-jwt-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_min_length() {
        assert!(validate_min_length(&SecretString::from("short"), "JWT_SECRET").is_err());
        assert!(validate_min_length(&SecretString::from("a".repeat(32)), "JWT_SECRET").is_ok());
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("HS256").unwrap(), Algorithm::HS256);
        assert_eq!(parse_algorithm("hs512").unwrap(), Algorithm::HS512);
        assert!(parse_algorithm("RS256").is_err());
    }

    #[test]
    fn test_parse_csv() {
        assert_eq!(
            parse_csv(" read_products, write_products ,,"),
            vec!["read_products", "write_products"]
        );
        assert!(parse_csv("").is_empty());
    }

    #[test]
    fn test_redirect_uri_strips_trailing_slash() {
        let config = test_config();
        assert_eq!(
            config.shopify.redirect_uri(),
            "https://api.amts.dev/api/shopify/auth/callback"
        );
    }

    #[test]
    fn test_dashboard_url_is_first_origin() {
        let mut config = test_config();
        assert_eq!(config.dashboard_url(), "https://app.amts.dev");

        config.cors_origins.clear();
        assert_eq!(config.dashboard_url(), "http://localhost:5173");
    }

    #[test]
    fn test_socket_addr() {
        let addr = test_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = test_config();
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("test_api_key"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("shpss_super_private_value"));
        assert!(!debug_output.contains("k3J9x!mQ2@vL8"));
    }
}
