use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::classifier;
use super::filter::FilterChain;
use crate::error::ErrorCategory;
use crate::identity::UserIdentity;
use crate::validator::Introspector;

/// Body of the token-exchange and refresh responses.
///
/// On failure every field is `null` and the status code carries the outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub session_token: Option<String>,
    pub user: Option<UserInfo>,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub roles: Vec<String>,
}

impl From<&UserIdentity> for UserInfo {
    fn from(identity: &UserIdentity) -> Self {
        Self {
            user_id: identity.user_id().to_string(),
            email: identity.email().map(str::to_owned),
            display_name: identity.display_name().map(str::to_owned),
            roles: identity.roles().iter().map(|r| r.as_str().to_owned()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenExchangeRequest {
    #[serde(default)]
    access_token: Option<String>,
}

/// Create the session bridge router: token exchange, session refresh and health.
pub fn auth_routes<I: Introspector>(chain: Arc<FilterChain<I>>) -> Router {
    let auth_path = chain.settings.auth_path.clone();

    Router::new()
        .route(
            &format!("{auth_path}/token-exchange"),
            post(token_exchange::<I>),
        )
        .route(
            &format!("{auth_path}/refresh-session"),
            post(refresh_session::<I>),
        )
        .route(&format!("{auth_path}/health"), get(health))
        .with_state(chain)
}

type Reply = (StatusCode, Json<AuthResponse>);

fn failure(status: StatusCode) -> Reply {
    (status, Json(AuthResponse::default()))
}

// ── Token exchange ─────────────────────────────────────────────────

async fn token_exchange<I: Introspector>(
    State(chain): State<Arc<FilterChain<I>>>,
    body: Result<Json<TokenExchangeRequest>, JsonRejection>,
) -> Reply {
    let access_token = match body {
        Ok(Json(request)) => request.access_token.unwrap_or_default(),
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Token exchange request rejected");
            return failure(StatusCode::BAD_REQUEST);
        }
    };
    let access_token = access_token.trim();
    if access_token.is_empty() {
        tracing::warn!("Token exchange without an access token");
        return failure(StatusCode::BAD_REQUEST);
    }

    let identity = match chain.validator.validate(access_token).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "Token exchange failed validation");
            return failure(StatusCode::UNAUTHORIZED);
        }
    };

    let session = match chain.sessions.issue(&identity) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Session issuance failed during token exchange");
            return failure(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    tracing::info!(user_id = %identity.user_id(), "Exchanged access token for session token");

    (
        StatusCode::OK,
        Json(AuthResponse {
            session_token: Some(session.into_token()),
            user: Some(UserInfo::from(&identity)),
            expires_in: Some(chain.sessions.policy().inactivity_seconds()),
        }),
    )
}

// ── Session refresh ────────────────────────────────────────────────

async fn refresh_session<I: Introspector>(
    State(chain): State<Arc<FilterChain<I>>>,
    headers: HeaderMap,
) -> Reply {
    let Some(token) = classifier::bearer_token(&headers) else {
        tracing::debug!("Session refresh without bearer token");
        return failure(StatusCode::UNAUTHORIZED);
    };

    match chain.sessions.touch(token) {
        Ok(renewed) => {
            tracing::debug!(user_id = %renewed.claims().subject(), "Session refreshed");
            (
                StatusCode::OK,
                Json(AuthResponse {
                    session_token: Some(renewed.into_token()),
                    user: None,
                    expires_in: Some(chain.sessions.policy().inactivity_seconds()),
                }),
            )
        }
        Err(e) if e.category() == ErrorCategory::Internal => {
            tracing::error!(error = %e, "Session refresh could not re-sign token");
            failure(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Session refresh failed");
            failure(StatusCode::UNAUTHORIZED)
        }
    }
}

// ── Health ─────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "Authentication service is healthy"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, UserId};

    #[test]
    fn failure_body_is_all_null() {
        let body = serde_json::to_value(AuthResponse::default()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "sessionToken": null, "user": null, "expiresIn": null })
        );
    }

    #[test]
    fn user_info_uses_camel_case() {
        let identity = UserIdentity::new(UserId("u1".into()), ["ADMIN".parse::<Role>().unwrap()])
            .with_email("u1@example.com")
            .with_display_name("Ada Lovelace");
        let body = serde_json::to_value(UserInfo::from(&identity)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "userId": "u1",
                "email": "u1@example.com",
                "displayName": "Ada Lovelace",
                "roles": ["ADMIN"]
            })
        );
    }
}
