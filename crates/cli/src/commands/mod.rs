//! Subcommand implementations.

pub mod migrate;
pub mod user;

use amts_api::db::{self, RepositoryError};
use amts_api::services::AuthError;
use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Invalid email, weak password or duplicate account.
    #[error(transparent)]
    Account(#[from] AuthError),

    /// Repository failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// No account with this email.
    #[error("No account with email: {0}")]
    UnknownUser(String),
}

/// Connect to the database named by `DATABASE_URL`.
async fn connect() -> Result<PgPool, CommandError> {
    let database_url = std::env::var("DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}
