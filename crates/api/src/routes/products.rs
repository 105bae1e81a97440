//! Local product catalog routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use amts_core::ProductId;

use super::{ApiJson, ApiQuery, Message};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::{NewProduct, Product, ProductUpdate};
use crate::services::catalog::{BulkImport, ProductQuery};
use crate::services::content::{Length, Tone};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/bulk-import", post(bulk_import))
        .route("/{id}", get(show).put(update).delete(remove))
        .route("/{id}/generate-description", post(generate_description))
}

/// GET /api/products?store_id&status&search&limit&offset
async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.catalog().list(user.id, query).await?))
}

/// POST /api/products
#[instrument(skip_all, fields(user_id = %user.id))]
async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(product): ApiJson<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = state.catalog().create(user.id, product).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /api/products/{id}
async fn show(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog().get(id, user.id).await?))
}

/// PUT /api/products/{id}
async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ProductId>,
    ApiJson(update): ApiJson<ProductUpdate>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog().update(id, user.id, update).await?))
}

/// DELETE /api/products/{id}
async fn remove(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ProductId>,
) -> Result<Json<Message>, AppError> {
    state.catalog().delete(id, user.id).await?;
    Ok(Json(Message::new("Product deleted successfully")))
}

/// POST /api/products/bulk-import
#[instrument(skip_all, fields(user_id = %user.id, rows = rows.len()))]
async fn bulk_import(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(rows): ApiJson<Vec<NewProduct>>,
) -> Result<Json<BulkImport>, AppError> {
    Ok(Json(state.catalog().bulk_import(user.id, rows).await?))
}

/// Voice and length for generated copy, from the query string.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StyleQuery {
    pub tone: Tone,
    pub length: Length,
}

#[derive(Debug, Serialize)]
pub struct GeneratedProductDescription {
    pub product_id: ProductId,
    pub description: Option<String>,
    pub ai_generated: bool,
}

/// Write and store a description for a product.
///
/// POST /api/products/{id}/generate-description?tone&length
#[instrument(skip_all, fields(product_id = %id))]
async fn generate_description(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ProductId>,
    ApiQuery(style): ApiQuery<StyleQuery>,
) -> Result<Json<GeneratedProductDescription>, AppError> {
    let product = state
        .content()
        .describe_product(id, user.id, style.tone, style.length)
        .await?;
    Ok(Json(GeneratedProductDescription {
        product_id: product.id,
        description: product.description,
        ai_generated: product.ai_generated,
    }))
}
