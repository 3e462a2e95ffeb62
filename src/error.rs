type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the authorization flow, introspection and session layers.
///
/// `Display` output never includes raw provider response bodies, so it is
/// safe to log. Use [`Error::category`] for anything that crosses to a client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The user or the provider declined the authorization request.
    #[error("authorization denied: {code}")]
    AuthorizationDenied {
        code: String,
        description: Option<String>,
    },

    /// The `state` returned on the callback does not match the stored one.
    #[error("authorization state mismatch")]
    ForgeryDetected,

    /// The callback arrived without a matching in-flight login.
    #[error("no in-flight login: missing {0}")]
    MissingFlowState(&'static str),

    /// Introspection errored, reported the token inactive, or yielded no subject.
    #[error("token validation failed: {reason}")]
    TokenValidationFailed {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The session token could not be decoded.
    #[error("malformed session token: {0}")]
    Malformed(String),

    #[error("session token signature is invalid")]
    SignatureInvalid,

    #[error("session expired due to inactivity")]
    InactivityExpired,

    #[error("session exceeded its maximum duration")]
    DurationExpired,

    /// A session token could not be signed. Never the caller's fault.
    #[error("could not sign session token")]
    Signing(#[source] jsonwebtoken::errors::Error),

    /// Provider metadata could not be fetched or was unusable.
    #[error("provider metadata unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// A refresh-token grant failed; all cached tokens have been cleared.
    #[error("token refresh failed")]
    RefreshFailed(#[source] Box<Error>),

    /// An endpoint answered with a non-success status.
    #[error("{operation} failed (status {status:?})")]
    OAuth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[cfg(feature = "oauth")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Client-safe classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    AuthorizationDenied,
    Forgery,
    InvalidToken,
    SessionExpired,
    ProviderUnavailable,
    Internal,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationDenied => "authorization_denied",
            Self::Forgery => "forgery_detected",
            Self::InvalidToken => "invalid_token",
            Self::SessionExpired => "session_expired",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::Internal => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Token validation failure without an underlying cause.
    #[must_use]
    pub fn token_validation(reason: impl Into<String>) -> Self {
        Self::TokenValidationFailed {
            reason: reason.into(),
            source: None,
        }
    }

    /// Token validation failure wrapping the error that caused it.
    #[must_use]
    pub fn token_validation_caused_by(
        reason: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::TokenValidationFailed {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthorizationDenied { .. } => ErrorCategory::AuthorizationDenied,
            Self::ForgeryDetected | Self::MissingFlowState(_) => ErrorCategory::Forgery,
            Self::TokenValidationFailed { .. } | Self::Malformed(_) | Self::SignatureInvalid => {
                ErrorCategory::InvalidToken
            }
            Self::InactivityExpired | Self::DurationExpired | Self::RefreshFailed(_) => {
                ErrorCategory::SessionExpired
            }
            Self::DiscoveryUnavailable(_) => ErrorCategory::ProviderUnavailable,
            Self::OAuth { .. } | Self::Signing(_) | Self::Config(_) => ErrorCategory::Internal,
            #[cfg(feature = "oauth")]
            Self::Http(_) => ErrorCategory::ProviderUnavailable,
        }
    }

    /// Whether the caller must restart the authorization flow instead of retrying.
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationDenied { .. }
                | Self::ForgeryDetected
                | Self::MissingFlowState(_)
                | Self::TokenValidationFailed { .. }
                | Self::Malformed(_)
                | Self::SignatureInvalid
                | Self::InactivityExpired
                | Self::DurationExpired
                | Self::RefreshFailed(_)
        )
    }

    /// Whether a caller may retry with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::DiscoveryUnavailable(_) => true,
            #[cfg(feature = "oauth")]
            Self::Http(_) => true,
            _ => false,
        }
    }
}
