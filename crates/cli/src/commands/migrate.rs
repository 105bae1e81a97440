//! Database migration command.
//!
//! Applies the migrations embedded in `amts-api` (`crates/api/migrations/`),
//! the same set the server runs at startup.

use super::{CommandError, connect};

/// Apply all pending migrations.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running migrations...");
    amts_api::db::run_migrations(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
