//! AI content routes.
//!
//! The streaming endpoint emits `data: {"content": ...}` frames and ends with
//! `data: [DONE]`. A generation error mid-stream is sent as
//! `data: {"error": ...}` before the terminator.

use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::State,
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use amts_core::ProductId;

use super::products::StyleQuery;
use super::{ApiJson, ApiQuery};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::content::{
    BulkGeneration, DescriptionRequest, Length, SeoContent, Tone, Usage,
};
use crate::state::AppState;

const DONE: &str = "[DONE]";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate-description", post(generate_description))
        .route("/generate-description/stream", post(generate_description_stream))
        .route("/generate-seo", post(generate_seo))
        .route("/bulk-generate", post(bulk_generate))
        .route("/usage", get(usage))
}

#[derive(Debug, Serialize)]
pub struct DescriptionResponse {
    pub description: String,
    pub ai_generated: bool,
    pub tone: Tone,
    pub length: Length,
}

/// POST /api/ai/generate-description
#[instrument(skip_all, fields(user_id = %user.id))]
async fn generate_description(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<DescriptionRequest>,
) -> Result<Json<DescriptionResponse>, AppError> {
    let description = state.content().describe(&request).await?;
    Ok(Json(DescriptionResponse {
        description,
        ai_generated: true,
        tone: request.tone,
        length: request.length,
    }))
}

/// POST /api/ai/generate-description/stream
#[instrument(skip_all, fields(user_id = %user.id))]
async fn generate_description_stream(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<DescriptionRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let chunks = state.content().describe_stream(&request).await?;

    let frames = chunks
        .map(|chunk| {
            let payload = match chunk {
                Ok(content) => json!({ "content": content }),
                Err(e) => {
                    tracing::warn!(error = %e, "Description stream failed");
                    json!({ "error": e.to_string() })
                }
            };
            Ok(Event::default().data(payload.to_string()))
        })
        .chain(stream::once(async { Ok(Event::default().data(DONE)) }));

    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct SeoRequest {
    pub product_name: String,
    #[serde(default)]
    pub description: String,
}

/// POST /api/ai/generate-seo
async fn generate_seo(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    ApiJson(request): ApiJson<SeoRequest>,
) -> Result<Json<SeoContent>, AppError> {
    let seo = state
        .content()
        .seo(&request.product_name, &request.description)
        .await?;
    Ok(Json(seo))
}

/// POST /api/ai/bulk-generate?tone&length
///
/// The body is a JSON array of product ids.
#[instrument(skip_all, fields(user_id = %user.id, count = product_ids.len()))]
async fn bulk_generate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(style): ApiQuery<StyleQuery>,
    ApiJson(product_ids): ApiJson<Vec<ProductId>>,
) -> Result<Json<BulkGeneration>, AppError> {
    let result = state
        .content()
        .bulk_generate(user.id, &product_ids, style.tone, style.length)
        .await?;
    Ok(Json(result))
}

/// GET /api/ai/usage
async fn usage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Usage>, AppError> {
    Ok(Json(state.content().usage(&user).await?))
}
