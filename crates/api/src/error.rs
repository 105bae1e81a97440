//! Unified error handling for the HTTP API.
//!
//! Every handler returns `Result<_, AppError>`. Responses carry a
//! `{"error": message}` body; server-side failures are logged, reported to
//! Sentry, and answered with a generic message.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::openai::OpenAiError;
use crate::services::{AuthError, ServiceError};
use crate::shopify::ShopifyError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// A service operation failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// No bearer token, or one that does not verify.
    #[error("could not validate credentials")]
    Unauthenticated,

    /// Webhook body did not match its signature.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        Self::Service(ServiceError::Auth(err))
    }
}

impl From<ShopifyError> for AppError {
    fn from(err: ShopifyError) -> Self {
        Self::Service(ServiceError::Shopify(err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(e) => service_status(e),
            Self::Unauthenticated | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn service_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Forbidden => StatusCode::FORBIDDEN,
        ServiceError::NotConnected
        | ServiceError::Conflict(_)
        | ServiceError::InvalidTransition(_) => StatusCode::CONFLICT,
        ServiceError::InvalidState
        | ServiceError::OAuthExchangeFailed(_)
        | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::SyncFailed(_) | ServiceError::ExportFailed(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Auth(e) => auth_status(e),
        ServiceError::Shopify(e) => shopify_status(e),
        ServiceError::Content(e) => content_status(e),
        ServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

const fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidEmail(_) | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::DuplicateEmail => StatusCode::CONFLICT,
        AuthError::InvalidCredentials | AuthError::TokenInvalid => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden => StatusCode::FORBIDDEN,
        AuthError::Hashing(_) | AuthError::Signing(_) | AuthError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

const fn shopify_status(err: &ShopifyError) -> StatusCode {
    match err {
        ShopifyError::Unauthenticated => StatusCode::CONFLICT,
        ShopifyError::OAuthExchange { .. } => StatusCode::BAD_REQUEST,
        ShopifyError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        ShopifyError::Http(_) | ShopifyError::Upstream { .. } | ShopifyError::Parse(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

const fn content_status(err: &OpenAiError) -> StatusCode {
    match err {
        OpenAiError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Don't expose internal error details to clients
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "API request error"
            );
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "service temporarily unavailable".to_string(),
                _ => "internal server error".to_string(),
            }
        } else {
            if status == StatusCode::BAD_GATEWAY {
                tracing::warn!(error = %self, "Upstream call failed");
            }
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Set the Sentry user context for the current request.
pub fn set_sentry_user(user_id: &str, email: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::RepositoryError;
    use crate::models::TaskError;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_service_status_codes() {
        let cases = [
            (ServiceError::NotFound("store"), StatusCode::NOT_FOUND),
            (ServiceError::Forbidden, StatusCode::FORBIDDEN),
            (ServiceError::NotConnected, StatusCode::CONFLICT),
            (ServiceError::InvalidState, StatusCode::BAD_REQUEST),
            (
                ServiceError::OAuthExchangeFailed("bad code".into()),
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::SyncFailed("page 2".into()), StatusCode::BAD_GATEWAY),
            (ServiceError::ExportFailed("422".into()), StatusCode::BAD_GATEWAY),
            (
                ServiceError::InvalidTransition(TaskError::InvalidTransition {
                    from: amts_core::TaskStatus::Completed,
                    to: amts_core::TaskStatus::Pending,
                }),
                StatusCode::CONFLICT,
            ),
            (ServiceError::Auth(AuthError::DuplicateEmail), StatusCode::CONFLICT),
            (
                ServiceError::Auth(AuthError::InvalidCredentials),
                StatusCode::UNAUTHORIZED,
            ),
            (ServiceError::Auth(AuthError::Forbidden), StatusCode::FORBIDDEN),
            (
                ServiceError::Shopify(ShopifyError::CircuitOpen),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::Repository(RepositoryError::DataCorruption("bad".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let (status, body) = body_of(ServiceError::NotFound("product").into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "product not found" }));
    }

    #[tokio::test]
    async fn test_upstream_message_is_surfaced() {
        let err = ServiceError::Shopify(ShopifyError::Upstream {
            status: 422,
            body: "title can't be blank".to_string(),
            retry_after: None,
        });
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("title can't be blank"));
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (status, body) = body_of(AppError::Internal("pool exhausted".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "internal server error" }));

        let err = ServiceError::Repository(RepositoryError::DataCorruption("row 7".into()));
        let (_, body) = body_of(err.into()).await;
        assert!(!body["error"].as_str().unwrap().contains("row 7"));
    }

    #[test]
    fn test_unauthenticated() {
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Unauthenticated.to_string(),
            "could not validate credentials"
        );
    }
}
