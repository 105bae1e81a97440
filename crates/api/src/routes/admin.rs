//! Admin portal routes. Every route requires a staff account.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;
use tracing::instrument;

use amts_core::{StoreId, SubscriptionTier, UserId};

use super::{ApiJson, ApiQuery};
use crate::error::AppError;
use crate::middleware::RequireStaff;
use crate::models::User;
use crate::services::admin::{
    Activity, ClientDetail, ClientQuery, ClientSummary, ClientUpdate, DashboardStats, Masquerade,
    NewClient, StoreDetail, StoreQuery, StoreWithOwner,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/clients", get(list_clients).post(create_client))
        .route(
            "/clients/{id}",
            get(get_client).put(update_client).delete(deactivate_client),
        )
        .route("/clients/{id}/subscription", put(set_subscription))
        .route("/clients/{id}/masquerade", post(masquerade))
        .route("/stores", get(list_stores))
        .route("/stores/{id}", get(get_store))
        .route("/activity", get(activity))
}

/// GET /api/admin/dashboard
async fn dashboard(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(state.admin().dashboard(&actor).await?))
}

/// GET /api/admin/clients?search&subscription_tier&is_active&limit&offset
async fn list_clients(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
    ApiQuery(query): ApiQuery<ClientQuery>,
) -> Result<Json<Vec<ClientSummary>>, AppError> {
    Ok(Json(state.admin().list_clients(&actor, query).await?))
}

/// POST /api/admin/clients
#[instrument(skip_all, fields(actor = %actor.id))]
async fn create_client(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
    ApiJson(client): ApiJson<NewClient>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state.admin().create_client(&actor, client).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/admin/clients/{id}
async fn get_client(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
    Path(id): Path<UserId>,
) -> Result<Json<ClientDetail>, AppError> {
    Ok(Json(state.admin().get_client(&actor, id).await?))
}

/// PUT /api/admin/clients/{id}
async fn update_client(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
    Path(id): Path<UserId>,
    ApiJson(update): ApiJson<ClientUpdate>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.admin().update_client(&actor, id, update).await?))
}

/// Soft delete: the account is deactivated, never removed.
///
/// DELETE /api/admin/clients/{id}
async fn deactivate_client(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
    Path(id): Path<UserId>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.admin().deactivate_client(&actor, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionChange {
    pub subscription_tier: SubscriptionTier,
}

/// PUT /api/admin/clients/{id}/subscription
#[instrument(skip_all, fields(actor = %actor.id, client_id = %id))]
async fn set_subscription(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
    Path(id): Path<UserId>,
    ApiJson(change): ApiJson<SubscriptionChange>,
) -> Result<Json<User>, AppError> {
    let user = state
        .admin()
        .set_subscription(&actor, id, change.subscription_tier)
        .await?;
    Ok(Json(user))
}

/// POST /api/admin/clients/{id}/masquerade
#[instrument(skip_all, fields(actor = %actor.id, client_id = %id))]
async fn masquerade(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
    Path(id): Path<UserId>,
) -> Result<Json<Masquerade>, AppError> {
    Ok(Json(state.admin().masquerade(&actor, id).await?))
}

/// GET /api/admin/stores?client_id&status&limit&offset
async fn list_stores(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
    ApiQuery(query): ApiQuery<StoreQuery>,
) -> Result<Json<Vec<StoreWithOwner>>, AppError> {
    Ok(Json(state.admin().list_stores(&actor, query).await?))
}

/// GET /api/admin/stores/{id}
async fn get_store(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
    Path(id): Path<StoreId>,
) -> Result<Json<StoreDetail>, AppError> {
    Ok(Json(state.admin().get_store(&actor, id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub client_id: Option<UserId>,
    pub limit: Option<i64>,
}

/// GET /api/admin/activity?client_id&limit
async fn activity(
    State(state): State<AppState>,
    RequireStaff(actor): RequireStaff,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> Result<Json<Vec<Activity>>, AppError> {
    let feed = state
        .admin()
        .activity(&actor, query.client_id, query.limit)
        .await?;
    Ok(Json(feed))
}
