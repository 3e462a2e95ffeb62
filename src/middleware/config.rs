use axum::http::HeaderName;
use time::Duration;
use url::Url;

use super::error::AuthError;
use crate::introspection::{HttpIntrospector, IntrospectionConfig};
use crate::session::{SessionPolicy, SessionTokenService};
use crate::validator::{Introspector, OpaqueTokenValidator};

/// Paths that bypass both filter stages (prefix match).
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    "/actuator/health",
    "/actuator/info",
    "/v3/api-docs",
    "/swagger-ui",
    "/swagger-ui.html",
    "/.well-known",
    "/api/auth/health",
];

/// Header carrying session tokens in both directions.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Shared auth settings used by both config and runtime state.
#[derive(Debug, Clone)]
pub(crate) struct AuthSettings {
    pub(crate) public_paths: Vec<String>,
    pub(crate) session_header: HeaderName,
    pub(crate) auth_path: String,
}

impl AuthSettings {
    fn defaults() -> Self {
        Self {
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| (*p).to_owned()).collect(),
            session_header: HeaderName::from_static(SESSION_TOKEN_HEADER),
            auth_path: "/api/auth".into(),
        }
    }
}

/// Filter chain and endpoint configuration.
///
/// The session service and opaque validator are constructor parameters; the
/// rest has defaults overridable with `with_*` methods.
pub struct AuthConfig<I> {
    pub(super) sessions: SessionTokenService,
    pub(super) validator: OpaqueTokenValidator<I>,
    pub(super) settings: AuthSettings,
}

impl<I: Introspector> AuthConfig<I> {
    #[must_use]
    pub fn new(sessions: SessionTokenService, validator: OpaqueTokenValidator<I>) -> Self {
        Self {
            sessions,
            validator,
            settings: AuthSettings::defaults(),
        }
    }

    /// Replace the public path prefixes.
    #[must_use]
    pub fn with_public_paths<P: Into<String>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.settings.public_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Add one public path prefix to the current set.
    #[must_use]
    pub fn with_public_path(mut self, path: impl Into<String>) -> Self {
        self.settings.public_paths.push(path.into());
        self
    }

    /// Header used to read and return session tokens (default `X-Session-Token`).
    #[must_use]
    pub fn with_session_header(mut self, name: HeaderName) -> Self {
        self.settings.session_header = name;
        self
    }

    /// Mount point for the token-exchange, refresh and health endpoints.
    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    /// Get the session token service.
    #[must_use]
    pub fn sessions(&self) -> &SessionTokenService {
        &self.sessions
    }

    /// Get the public path prefixes.
    #[must_use]
    pub fn public_paths(&self) -> &[String] {
        &self.settings.public_paths
    }
}

impl AuthConfig<HttpIntrospector> {
    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SESSION_SECRET`: HMAC key for session tokens (at least 32 bytes)
    /// - `INTROSPECTION_URI`: RFC 7662 endpoint
    /// - `INTROSPECTION_CLIENT_ID`, `INTROSPECTION_CLIENT_SECRET`: resource server credentials
    ///
    /// # Optional env vars
    /// - `SESSION_INACTIVITY_SECONDS`: sliding window (default 1200)
    /// - `SESSION_MAX_DURATION_SECONDS`: absolute ceiling (default 86400)
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let required = |key: &'static str| {
            var(key).ok_or_else(|| AuthError::Config(format!("{key} is required")))
        };
        let seconds = |key: &'static str, default: Duration| -> Result<Duration, AuthError> {
            match var(key) {
                Some(value) => value
                    .trim()
                    .parse::<i64>()
                    .map(Duration::seconds)
                    .map_err(|e| AuthError::Config(format!("{key}: {e}"))),
                None => Ok(default),
            }
        };

        let defaults = SessionPolicy::default();
        let policy = SessionPolicy::new(
            seconds("SESSION_INACTIVITY_SECONDS", defaults.inactivity_window)?,
            seconds("SESSION_MAX_DURATION_SECONDS", defaults.max_duration)?,
        );
        let secret = required("SESSION_SECRET")?;
        let sessions = SessionTokenService::new(secret.as_bytes(), policy)
            .map_err(|e| AuthError::Config(e.to_string()))?;

        let endpoint: Url = required("INTROSPECTION_URI")?
            .parse()
            .map_err(|e| AuthError::Config(format!("INTROSPECTION_URI: {e}")))?;
        let introspection = IntrospectionConfig::new(
            endpoint,
            required("INTROSPECTION_CLIENT_ID")?,
            required("INTROSPECTION_CLIENT_SECRET")?,
        );
        let validator = OpaqueTokenValidator::new(HttpIntrospector::new(introspection));

        Ok(Self::new(sessions, validator))
    }
}
