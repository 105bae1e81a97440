//! Account management commands.
//!
//! Staff accounts cannot be created through the public signup route, so the
//! first `super_admin` is bootstrapped from here.

use amts_api::db::Repositories;
use amts_api::models::{NewUser, UserUpdate};
use amts_api::services::auth::password;
use amts_api::services::AuthError;
use amts_core::{Email, SubscriptionTier, UserId, UserRole};

use super::{CommandError, connect};

/// Create an account with an explicit role and tier.
///
/// # Returns
///
/// The ID of the created account.
pub async fn create(
    email: &str,
    name: Option<String>,
    password: &str,
    role: UserRole,
    tier: SubscriptionTier,
) -> Result<UserId, CommandError> {
    let email = Email::parse(email).map_err(AuthError::from)?;
    password::validate_password(password)?;

    let repos = Repositories::postgres(&connect().await?);

    if repos.users.find_by_email(&email).await?.is_some() {
        return Err(AuthError::DuplicateEmail.into());
    }

    tracing::info!("Creating account: {} ({})", email, role);

    let user = repos
        .users
        .create(NewUser {
            email,
            password_hash: password::hash_password(password).await?,
            full_name: name,
            company_name: None,
            industry: "cannabis".to_string(),
            role,
            subscription_tier: tier,
        })
        .await?;

    tracing::info!(
        "Account created successfully! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );

    Ok(user.id)
}

/// Change the role of an existing account.
pub async fn promote(email: &str, role: UserRole) -> Result<(), CommandError> {
    let parsed = Email::parse(email).map_err(AuthError::from)?;
    let repos = Repositories::postgres(&connect().await?);

    let user = repos
        .users
        .find_by_email(&parsed)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(email.to_owned()))?;

    let update = UserUpdate {
        role: Some(role),
        ..UserUpdate::default()
    };
    let user = repos.users.update(user.id, &update).await?;

    tracing::info!("{} is now {}", user.email, user.role);
    Ok(())
}
