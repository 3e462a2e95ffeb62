use std::time::Duration;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use super::error::AuthError;

/// CORS for a browser front end on `allowed_origins`.
///
/// Credentials are allowed, and `session_header` is both accepted and
/// exposed so scripts can read renewed tokens. Pass the header the filter
/// chain writes, e.g. [`FilterChain::session_header`](super::FilterChain::session_header).
///
/// # Errors
///
/// Returns [`AuthError::Config`] if an origin is not a valid header value.
pub fn cors_layer<'a>(
    allowed_origins: impl IntoIterator<Item = &'a str>,
    session_header: HeaderName,
) -> Result<CorsLayer, AuthError> {
    let origins = allowed_origins
        .into_iter()
        .map(|origin| {
            HeaderValue::from_str(origin.trim())
                .map_err(|e| AuthError::Config(format!("CORS origin {origin:?}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let requested_with = HeaderName::from_static("x-requested-with");

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            ORIGIN,
            requested_with,
            session_header.clone(),
        ])
        .expose_headers([AUTHORIZATION, CONTENT_TYPE, session_header])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600)))
}
