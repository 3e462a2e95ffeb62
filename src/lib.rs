#![doc = include_str!("../README.md")]

pub mod error;
pub mod identity;
pub mod pkce;
pub mod session;
pub mod storage;
pub mod types;
pub mod validator;

#[cfg(feature = "oauth")]
pub mod discovery;
#[cfg(feature = "oauth")]
pub mod introspection;
#[cfg(feature = "oauth")]
pub mod oauth;

#[cfg(feature = "middleware")]
pub mod middleware;

// Re-exports for convenient access
pub use error::{Error, ErrorCategory};
pub use identity::{DEFAULT_ROLE, RoleClaim, UserIdentity};
pub use pkce::{
    AuthorizationContext, ChallengeMethod, PkceChallenge, generate_code_challenge,
    generate_code_verifier, generate_nonce, generate_state,
};
pub use session::{IssuedSession, SessionClaims, SessionPolicy, SessionState, SessionTokenService};
pub use storage::{FlowStorage, MemoryStorage};
pub use types::{Role, UserId};
pub use validator::{IntrospectionResponse, Introspector, OpaqueTokenValidator};

#[cfg(feature = "oauth")]
pub use discovery::{DiscoveryCache, ProviderMetadata};
#[cfg(feature = "oauth")]
pub use introspection::{HttpIntrospector, IntrospectionConfig};
#[cfg(feature = "oauth")]
pub use oauth::{AuthClient, OAuthConfig, TokenResponse};
