use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{Error, ErrorCategory};

/// Authentication errors for the middleware layer.
///
/// Every variant renders a fixed JSON body; no provider detail or internal
/// message reaches the client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No credential was accepted for this request.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Authenticated, but without the required role.
    #[error("Access denied")]
    Forbidden,

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Unauthorized",
                    "message": "Authentication required",
                })),
            )
                .into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "Forbidden",
                    "message": "Access denied",
                })),
            )
                .into_response(),
            Self::Config(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal Server Error",
                        "message": "Internal error",
                    })),
                )
                    .into_response()
            }
        }
    }
}

impl From<Error> for AuthError {
    fn from(e: Error) -> Self {
        match (&e, e.category()) {
            (Error::Config(msg), _) => Self::Config(msg.clone()),
            (_, ErrorCategory::Internal | ErrorCategory::ProviderUnavailable) => {
                Self::Internal(e.to_string())
            }
            _ => Self::Unauthenticated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unauthenticated_renders_uniform_body() {
        let response = AuthError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Unauthorized", "message": "Authentication required" })
        );
    }

    #[tokio::test]
    async fn forbidden_renders_uniform_body() {
        let response = AuthError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Forbidden", "message": "Access denied" })
        );
    }

    #[tokio::test]
    async fn internal_error_hides_detail() {
        let response = AuthError::Internal("db password wrong".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await.to_string();
        assert!(!body.contains("password"));
    }

    #[test]
    fn core_errors_map_by_category() {
        assert!(matches!(
            AuthError::from(Error::InactivityExpired),
            AuthError::Unauthenticated
        ));
        assert!(matches!(
            AuthError::from(Error::SignatureInvalid),
            AuthError::Unauthenticated
        ));
        assert!(matches!(
            AuthError::from(Error::DiscoveryUnavailable("down".into())),
            AuthError::Internal(_)
        ));
        assert!(matches!(
            AuthError::from(Error::Config("bad".into())),
            AuthError::Config(_)
        ));
    }
}
