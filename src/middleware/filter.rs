//! The two-stage credential filter chain.
//!
//! Stage order is fixed: the session stage runs first, the opaque stage
//! second. Each stage skips when the request is already authenticated or
//! the path is public. A failing stage only logs; the request continues
//! unauthenticated and a downstream guard produces the 401.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use super::classifier::{self, CredentialKind};
use super::config::{AuthConfig, AuthSettings};
use super::context::SecurityContext;
use super::error::AuthError;
use crate::session::SessionTokenService;
use crate::types::Role;
use crate::validator::{Introspector, OpaqueTokenValidator};

/// Outcome of running the chain over one request.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub context: SecurityContext,
    /// Session token to hand back to the caller, if a stage minted or renewed one.
    pub session_token: Option<String>,
}

/// Session stage followed by opaque-token stage.
pub struct FilterChain<I> {
    pub(super) sessions: Arc<SessionTokenService>,
    pub(super) validator: Arc<OpaqueTokenValidator<I>>,
    pub(super) settings: AuthSettings,
}

impl<I: Introspector> FilterChain<I> {
    #[must_use]
    pub fn new(config: AuthConfig<I>) -> Self {
        Self {
            sessions: Arc::new(config.sessions),
            validator: Arc::new(config.validator),
            settings: config.settings,
        }
    }

    /// Get the session token service.
    #[must_use]
    pub fn sessions(&self) -> &SessionTokenService {
        &self.sessions
    }

    /// Get the opaque token validator.
    #[must_use]
    pub fn validator(&self) -> &OpaqueTokenValidator<I> {
        &self.validator
    }

    /// Header renewed session tokens are written to; hand it to [`cors_layer`](super::cors_layer).
    #[must_use]
    pub fn session_header(&self) -> &HeaderName {
        &self.settings.session_header
    }

    /// Run both stages in order over the request path and headers.
    pub async fn run(&self, path: &str, headers: &HeaderMap) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        self.session_stage(path, headers, &mut outcome);
        self.opaque_stage(path, headers, &mut outcome).await;
        outcome
    }

    fn skips(&self, path: &str, ctx: &SecurityContext) -> bool {
        ctx.is_authenticated() || classifier::is_public_path(path, &self.settings.public_paths)
    }

    /// Validate and renew a session token from the session header, or from
    /// a bearer credential that looks like one.
    fn session_stage(&self, path: &str, headers: &HeaderMap, outcome: &mut FilterOutcome) {
        if self.skips(path, &outcome.context) {
            return;
        }

        let token = headers
            .get(&self.settings.session_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                classifier::bearer_token(headers)
                    .filter(|t| classifier::classify(t) == CredentialKind::Session)
            });
        let Some(token) = token else {
            return;
        };

        match self.sessions.touch(token) {
            Ok(renewed) => {
                let identity = renewed.claims().identity();
                tracing::debug!(user_id = %identity.user_id(), "Session token accepted");
                outcome
                    .context
                    .authenticate(identity, CredentialKind::Session);
                outcome.session_token = Some(renewed.into_token());
            }
            Err(e) => {
                tracing::warn!(error = %e, category = %e.category(), "Session token rejected");
            }
        }
    }

    /// Introspect an opaque bearer credential and mint a session token for it.
    async fn opaque_stage(&self, path: &str, headers: &HeaderMap, outcome: &mut FilterOutcome) {
        if self.skips(path, &outcome.context) {
            return;
        }

        let Some(token) = classifier::bearer_token(headers)
            .filter(|t| classifier::classify(t) == CredentialKind::Opaque)
        else {
            return;
        };

        let identity = match self.validator.validate(token).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "Opaque token rejected");
                return;
            }
        };

        match self.sessions.issue(&identity) {
            Ok(session) => {
                tracing::debug!(user_id = %identity.user_id(), "Session minted from opaque token");
                outcome.session_token = Some(session.into_token());
                outcome
                    .context
                    .authenticate(identity, CredentialKind::Opaque);
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not mint session token");
            }
        }
    }
}

/// Axum middleware running the [`FilterChain`].
///
/// Inserts the resulting [`SecurityContext`] into request extensions and
/// writes any minted or renewed session token to the session header of the
/// response. Never rejects by itself.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/api/tasks", get(list_tasks))
///     .route_layer(axum::middleware::from_fn(require_authenticated))
///     .layer(axum::middleware::from_fn_with_state(chain.clone(), authenticate::<HttpIntrospector>));
/// ```
pub async fn authenticate<I: Introspector>(
    State(chain): State<Arc<FilterChain<I>>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let headers = req.headers().clone();
    let outcome = chain.run(&path, &headers).await;
    req.extensions_mut().insert(outcome.context);

    let mut response = next.run(req).await;

    if let Some(token) = outcome.session_token {
        match HeaderValue::from_str(&token) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(chain.settings.session_header.clone(), value);
            }
            Err(e) => tracing::error!(error = %e, "Session token is not a valid header value"),
        }
    }

    response
}

/// Reject requests whose [`SecurityContext`] is not authenticated.
///
/// # Errors
///
/// Returns [`AuthError::Unauthenticated`] (401).
pub async fn require_authenticated(req: Request, next: Next) -> Result<Response, AuthError> {
    let authenticated = req
        .extensions()
        .get::<SecurityContext>()
        .is_some_and(SecurityContext::is_authenticated);
    if !authenticated {
        tracing::debug!(path = %req.uri().path(), "Unauthenticated request rejected");
        return Err(AuthError::Unauthenticated);
    }
    Ok(next.run(req).await)
}

/// Reject requests lacking `role`. Use with `from_fn_with_state`.
///
/// ```rust,ignore
/// let admin = Router::new()
///     .route("/admin", get(admin_page))
///     .route_layer(axum::middleware::from_fn_with_state("ADMIN".parse::<Role>()?, require_role));
/// ```
///
/// # Errors
///
/// Returns [`AuthError::Unauthenticated`] (401) without a principal, or
/// [`AuthError::Forbidden`] (403) without the role.
pub async fn require_role(
    State(role): State<Role>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let ctx = req
        .extensions()
        .get::<SecurityContext>()
        .cloned()
        .unwrap_or_default();
    if !ctx.is_authenticated() {
        return Err(AuthError::Unauthenticated);
    }
    if !ctx.has_role(role.as_str()) {
        tracing::warn!(
            user_id = %ctx.current_user_id(),
            role = %role,
            "Request rejected for missing role"
        );
        return Err(AuthError::Forbidden);
    }
    Ok(next.run(req).await)
}
