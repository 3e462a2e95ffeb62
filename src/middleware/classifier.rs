use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// What a presented credential looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Has the three-part signed-token shape; handled by the session stage.
    Session,
    /// Anything else; handled by the opaque stage.
    Opaque,
}

/// Guess the credential kind from its shape.
///
/// Any `.` marks a session token candidate. This is a heuristic, not a
/// parse: a damaged session token without a dot is routed to introspection
/// and rejected there.
#[must_use]
pub fn classify(token: &str) -> CredentialKind {
    if token.contains('.') {
        CredentialKind::Session
    } else {
        CredentialKind::Opaque
    }
}

/// Token from an `Authorization: Bearer <token>` header, if present and non-blank.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Whether `path` falls under one of the public prefixes.
pub(crate) fn is_public_path(path: &str, public_paths: &[String]) -> bool {
    public_paths.iter().any(|prefix| {
        path == prefix
            || path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| prefix.ends_with('/') || rest.starts_with('/'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn dotted_credentials_are_session_tokens() {
        assert_eq!(classify("aaa.bbb.ccc"), CredentialKind::Session);
        assert_eq!(classify("opaque-token-123"), CredentialKind::Opaque);
    }

    #[test]
    fn damaged_session_token_without_dot_is_opaque() {
        assert_eq!(classify("eyJhbGciOiJIUzI1NiJ9"), CredentialKind::Opaque);
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn public_paths_match_by_segment_prefix() {
        let public = vec!["/actuator/health".to_string(), "/swagger-ui".to_string()];
        assert!(is_public_path("/actuator/health", &public));
        assert!(is_public_path("/swagger-ui/index.html", &public));
        assert!(!is_public_path("/actuator/healthcheck-admin", &public));
        assert!(!is_public_path("/api/tasks", &public));
    }

    #[test]
    fn default_public_paths_cover_docs_pages() {
        let defaults: Vec<String> = crate::middleware::DEFAULT_PUBLIC_PATHS
            .iter()
            .map(|p| (*p).to_owned())
            .collect();
        assert!(is_public_path("/swagger-ui.html", &defaults));
        assert!(is_public_path("/swagger-ui/index.html", &defaults));
        assert!(is_public_path("/v3/api-docs/swagger-config", &defaults));
        assert!(!is_public_path("/swagger-ui.htmlx", &defaults));
        assert!(!is_public_path("/api/tasks", &defaults));
    }
}
