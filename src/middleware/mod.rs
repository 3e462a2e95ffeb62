//! Credential filter chain and session bridge endpoints for Axum.
//!
//! Requests carry either an opaque access token from the authorization
//! server or a session token minted here. The [`FilterChain`] tries the
//! session token first, falls back to introspecting an opaque token, and
//! leaves a [`SecurityContext`] in request extensions either way.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use session_bridge::middleware::{
//!     AuthConfig, CurrentUser, FilterChain, auth_routes, authenticate, cors_layer,
//!     require_authenticated,
//! };
//!
//! // 1. Configure from environment
//! let chain = Arc::new(FilterChain::new(AuthConfig::from_env()?));
//! let cors = cors_layer(["http://localhost:3000"], chain.session_header().clone())?;
//!
//! // 2. Protect your routes and mount the bridge endpoints
//! let app = axum::Router::new()
//!     .route("/api/tasks", get(list_tasks))
//!     .route_layer(axum::middleware::from_fn(require_authenticated))
//!     .merge(auth_routes(chain.clone()))
//!     .layer(axum::middleware::from_fn_with_state(chain, authenticate))
//!     .layer(cors);
//!
//! // 3. Read the caller in handlers
//! async fn list_tasks(CurrentUser(user_id): CurrentUser) -> String { user_id }
//! ```

mod classifier;
mod config;
mod context;
mod cors;
mod error;
mod extractor;
mod filter;
mod routes;

pub use classifier::{CredentialKind, bearer_token, classify};
pub use config::{AuthConfig, DEFAULT_PUBLIC_PATHS, SESSION_TOKEN_HEADER};
pub use context::{ANONYMOUS_USER, Principal, SecurityContext};
pub use cors::cors_layer;
pub use error::AuthError;
pub use extractor::{Authenticated, CurrentUser};
pub use filter::{FilterChain, FilterOutcome, authenticate, require_authenticated, require_role};
pub use routes::{AuthResponse, UserInfo, auth_routes};
