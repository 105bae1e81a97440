//! Account routes: signup, login, token refresh, logout and profile.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ApiJson, Message};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::User;
use crate::services::{ProfileUpdate, Registration, TokenPair};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me).put(update_me))
}

/// Tokens plus the account they belong to.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Register a merchant account and sign it in.
///
/// POST /api/auth/signup
#[instrument(skip(state, registration))]
async fn signup(
    State(state): State<AppState>,
    ApiJson(registration): ApiJson<Registration>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let user = state.auth().register(registration).await?;
    let tokens = state.auth().issue_tokens(user.id).await?;
    tracing::info!(user_id = %user.id, "Account registered");
    Ok((StatusCode::CREATED, Json(SessionResponse { tokens, user })))
}

/// POST /api/auth/login
#[instrument(skip(state, request))]
async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let user = state
        .auth()
        .authenticate(&request.email, &request.password)
        .await?;
    let tokens = state.auth().issue_tokens(user.id).await?;
    Ok(Json(SessionResponse { tokens, user }))
}

/// Exchange a refresh token for a new pair.
///
/// POST /api/auth/refresh
#[instrument(skip(state, request))]
async fn refresh(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let (user, tokens) = state.auth().refresh(&request.refresh_token).await?;
    Ok(Json(SessionResponse { tokens, user }))
}

/// POST /api/auth/logout
#[instrument(skip_all, fields(user_id = %user.id))]
async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Message>, AppError> {
    state.auth().logout(user.id).await?;
    Ok(Json(Message::new("Logged out successfully")))
}

/// GET /api/auth/me
async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// PUT /api/auth/me
#[instrument(skip_all, fields(user_id = %user.id))]
async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    let user = state.auth().update_profile(user.id, update).await?;
    Ok(Json(user))
}
