//! Shopify routes: OAuth install, connected stores, sync and remote passthrough.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::Redirect,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use amts_core::{ProductId, StoreId, UserId};

use super::{ApiJson, ApiQuery, Message};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::Store;
use crate::services::sync::{ExportResult, SyncReport};
use crate::shopify::{
    Metafield, MetafieldOwner, NewMetafield, ProductPage, ShopifyApi, Theme, ThemeAsset,
};
use crate::state::AppState;

/// Remote product page size bounds.
const DEFAULT_REMOTE_LIMIT: u32 = 50;
const MAX_REMOTE_LIMIT: u32 = 250;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/install", get(install))
        .route("/auth/callback", get(callback))
        .route("/stores", get(list_stores))
        .route("/stores/{id}", get(get_store).delete(disconnect))
        .route("/stores/{id}/products", get(remote_products))
        .route("/stores/{id}/sync", post(sync))
        .route("/stores/{id}/export/{product_id}", post(export))
        .route("/stores/{id}/themes", get(themes))
        .route(
            "/stores/{id}/themes/{theme_id}/assets",
            get(theme_assets).put(update_theme_asset),
        )
        .route(
            "/stores/{id}/products/{remote_id}/metafields",
            get(metafields).post(create_metafield),
        )
}

// =============================================================================
// OAuth
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct InstallQuery {
    pub shop: String,
}

#[derive(Debug, Serialize)]
pub struct InstallResponse {
    pub auth_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub shop: String,
    pub state: String,
}

/// Start an app install for a shop.
///
/// GET /api/shopify/auth/install?shop=
#[instrument(skip_all, fields(user_id = %user.id, shop = %query.shop))]
async fn install(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<InstallQuery>,
) -> Result<Json<InstallResponse>, AppError> {
    let auth_url = state
        .connections()
        .begin_install(user.id, &query.shop)
        .await?;
    Ok(Json(InstallResponse { auth_url }))
}

/// Finish an install and send the merchant back to the dashboard.
///
/// GET /api/shopify/auth/callback?code&shop&state
#[instrument(skip_all, fields(shop = %query.shop))]
async fn callback(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CallbackQuery>,
) -> Result<Redirect, AppError> {
    state
        .connections()
        .complete_install(&query.code, &query.shop, &query.state)
        .await?;
    Ok(Redirect::to(&format!(
        "{}/dashboard/shopify?connected=true",
        state.dashboard_url()
    )))
}

// =============================================================================
// Stores
// =============================================================================

/// GET /api/shopify/stores
async fn list_stores(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Store>>, AppError> {
    Ok(Json(state.connections().stores_of(user.id).await?))
}

/// GET /api/shopify/stores/{id}
async fn get_store(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
) -> Result<Json<Store>, AppError> {
    Ok(Json(state.connections().owned_store(id, user.id).await?))
}

/// DELETE /api/shopify/stores/{id}
async fn disconnect(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
) -> Result<Json<Message>, AppError> {
    state.connections().disconnect(id, user.id).await?;
    Ok(Json(Message::new("Store disconnected successfully")))
}

/// POST /api/shopify/stores/{id}/sync
#[instrument(skip_all, fields(store_id = %id))]
async fn sync(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
) -> Result<Json<SyncReport>, AppError> {
    Ok(Json(state.sync().sync_store(id, user.id).await?))
}

/// POST /api/shopify/stores/{id}/export/{product_id}
#[instrument(skip_all, fields(store_id = %id, product_id = %product_id))]
async fn export(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, product_id)): Path<(StoreId, ProductId)>,
) -> Result<Json<ExportResult>, AppError> {
    Ok(Json(
        state.sync().export_product(id, product_id, user.id).await?,
    ))
}

// =============================================================================
// Remote passthrough
// =============================================================================

/// A connected client for one of the caller's stores.
async fn client(
    state: &AppState,
    store_id: StoreId,
    caller: UserId,
) -> Result<Arc<dyn ShopifyApi>, AppError> {
    let store = state.connections().owned_store(store_id, caller).await?;
    Ok(state.connections().client_for(&store).await?)
}

#[derive(Debug, Deserialize)]
pub struct RemoteProductsQuery {
    pub limit: Option<u32>,
    pub page_info: Option<String>,
}

/// GET /api/shopify/stores/{id}/products?limit&page_info
async fn remote_products(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
    ApiQuery(query): ApiQuery<RemoteProductsQuery>,
) -> Result<Json<ProductPage>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_REMOTE_LIMIT)
        .clamp(1, MAX_REMOTE_LIMIT);
    let page = client(&state, id, user.id)
        .await?
        .list_products(limit, query.page_info.as_deref())
        .await?;
    Ok(Json(page))
}

/// GET /api/shopify/stores/{id}/themes
async fn themes(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<StoreId>,
) -> Result<Json<Vec<Theme>>, AppError> {
    Ok(Json(client(&state, id, user.id).await?.list_themes().await?))
}

/// GET /api/shopify/stores/{id}/themes/{theme_id}/assets
async fn theme_assets(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, theme_id)): Path<(StoreId, i64)>,
) -> Result<Json<Vec<ThemeAsset>>, AppError> {
    let assets = client(&state, id, user.id)
        .await?
        .get_theme_assets(theme_id)
        .await?;
    Ok(Json(assets))
}

#[derive(Debug, Deserialize)]
pub struct AssetUpdate {
    pub key: String,
    pub value: String,
}

/// PUT /api/shopify/stores/{id}/themes/{theme_id}/assets
#[instrument(skip_all, fields(store_id = %id, theme_id = theme_id, key = %update.key))]
async fn update_theme_asset(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, theme_id)): Path<(StoreId, i64)>,
    ApiJson(update): ApiJson<AssetUpdate>,
) -> Result<Json<ThemeAsset>, AppError> {
    let asset = client(&state, id, user.id)
        .await?
        .update_theme_asset(theme_id, &update.key, &update.value)
        .await?;
    Ok(Json(asset))
}

/// GET /api/shopify/stores/{id}/products/{remote_id}/metafields
async fn metafields(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, remote_id)): Path<(StoreId, i64)>,
) -> Result<Json<Vec<Metafield>>, AppError> {
    let fields = client(&state, id, user.id)
        .await?
        .get_metafields(MetafieldOwner::Product, remote_id)
        .await?;
    Ok(Json(fields))
}

/// POST /api/shopify/stores/{id}/products/{remote_id}/metafields
async fn create_metafield(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, remote_id)): Path<(StoreId, i64)>,
    ApiJson(metafield): ApiJson<NewMetafield>,
) -> Result<Json<Metafield>, AppError> {
    let created = client(&state, id, user.id)
        .await?
        .create_metafield(MetafieldOwner::Product, remote_id, &metafield)
        .await?;
    Ok(Json(created))
}
