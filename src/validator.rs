use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::identity::UserIdentity;

/// Default bound on a single introspection round-trip.
pub const DEFAULT_INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Introspection result (RFC 7662): `active` plus every other claim as-is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntrospectionResponse {
    #[serde(default)]
    pub active: bool,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl IntrospectionResponse {
    /// An active response carrying the given claims.
    #[must_use]
    pub fn active(attributes: Map<String, Value>) -> Self {
        Self {
            active: true,
            attributes,
        }
    }

    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Asks the issuing authority whether an opaque token is valid.
///
/// # Example
///
/// ```rust,ignore
/// impl Introspector for MyIntrospector {
///     async fn introspect(&self, token: &str) -> Result<IntrospectionResponse, Error> {
///         self.client.post_introspection(token).await
///     }
/// }
/// ```
pub trait Introspector: Send + Sync + 'static {
    fn introspect(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<IntrospectionResponse, Error>> + Send;
}

/// Validates opaque access tokens by introspection and normalizes the claims.
///
/// No local signature checks happen here: opaque tokens are not
/// self-verifiable, so every trust decision belongs to the introspection
/// endpoint.
#[derive(Debug)]
pub struct OpaqueTokenValidator<I> {
    introspector: I,
    timeout: Duration,
}

impl<I: Introspector> OpaqueTokenValidator<I> {
    #[must_use]
    pub fn new(introspector: I) -> Self {
        Self {
            introspector,
            timeout: DEFAULT_INTROSPECTION_TIMEOUT,
        }
    }

    /// Bound the introspection call; a timeout counts as a rejected token.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn introspector(&self) -> &I {
        &self.introspector
    }

    /// Introspect `token` and build the caller's identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenValidationFailed`] when introspection errors or
    /// times out, the token is inactive, or no subject can be found.
    pub async fn validate(&self, token: &str) -> Result<UserIdentity, Error> {
        tracing::debug!("Validating opaque access token");

        let response = match tokio::time::timeout(self.timeout, self.introspector.introspect(token)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Token introspection failed");
                return Err(match e {
                    already @ Error::TokenValidationFailed { .. } => already,
                    other => Error::token_validation_caused_by("introspection failed", other),
                });
            }
            Err(elapsed) => {
                tracing::error!(timeout = ?self.timeout, "Token introspection timed out");
                return Err(Error::token_validation_caused_by(
                    "introspection timed out",
                    elapsed,
                ));
            }
        };

        if !response.active {
            tracing::warn!("Introspection reported an inactive token");
            return Err(Error::token_validation("token is not active"));
        }

        let identity = UserIdentity::from_claims(&response.attributes)?;
        tracing::info!(user_id = %identity.user_id(), "Validated opaque token");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(Result<IntrospectionResponse, ()>);

    impl Introspector for Fixed {
        async fn introspect(&self, _token: &str) -> Result<IntrospectionResponse, Error> {
            self.0
                .clone()
                .map_err(|()| Error::OAuth {
                    operation: "introspection",
                    status: Some(500),
                    detail: "boom".into(),
                })
        }
    }

    struct Stalled;

    impl Introspector for Stalled {
        async fn introspect(&self, _token: &str) -> Result<IntrospectionResponse, Error> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(IntrospectionResponse::inactive())
        }
    }

    fn active(value: Value) -> Fixed {
        Fixed(Ok(IntrospectionResponse::active(
            value.as_object().cloned().unwrap(),
        )))
    }

    #[tokio::test]
    async fn active_token_yields_identity() {
        let validator = OpaqueTokenValidator::new(active(json!({
            "sub": "u1",
            "email": "u1@example.com",
            "roles": ["ADMIN"]
        })));
        let identity = validator.validate("opaque").await.unwrap();

        assert_eq!(identity.user_id().as_str(), "u1");
        assert_eq!(identity.email(), Some("u1@example.com"));
        assert!(identity.has_role("ADMIN"));
    }

    #[tokio::test]
    async fn inactive_token_is_rejected() {
        let validator = OpaqueTokenValidator::new(Fixed(Ok(IntrospectionResponse::inactive())));
        let err = validator.validate("opaque").await.unwrap_err();
        assert!(matches!(err, Error::TokenValidationFailed { .. }));
    }

    #[tokio::test]
    async fn transport_error_is_wrapped() {
        use std::error::Error as _;

        let validator = OpaqueTokenValidator::new(Fixed(Err(())));
        let err = validator.validate("opaque").await.unwrap_err();
        assert!(matches!(err, Error::TokenValidationFailed { .. }));
        assert!(err.source().is_some());
        assert!(!err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn missing_subject_is_rejected() {
        let validator = OpaqueTokenValidator::new(active(json!({ "email": "x@example.com" })));
        let err = validator.validate("opaque").await.unwrap_err();
        assert!(matches!(err, Error::TokenValidationFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_closed() {
        let validator = OpaqueTokenValidator::new(Stalled).with_timeout(Duration::from_millis(50));
        let err = validator.validate("opaque").await.unwrap_err();
        assert!(matches!(err, Error::TokenValidationFailed { .. }));
    }

    #[test]
    fn response_flattens_attributes() {
        let response: IntrospectionResponse = serde_json::from_value(json!({
            "active": true,
            "sub": "u1",
            "scope": "openid"
        }))
        .unwrap();
        assert!(response.active);
        assert_eq!(response.attributes.get("sub"), Some(&json!("u1")));
        assert!(!response.attributes.contains_key("active"));
    }

    #[test]
    fn missing_active_means_inactive() {
        let response: IntrospectionResponse = serde_json::from_value(json!({ "sub": "u1" })).unwrap();
        assert!(!response.active);
    }
}
