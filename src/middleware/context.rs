use crate::identity::UserIdentity;
use crate::types::{Role, UserId};

use super::classifier::CredentialKind;

/// User id reported for requests without an authenticated principal.
pub const ANONYMOUS_USER: &str = "anonymous";

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    identity: UserIdentity,
    authorities: Vec<String>,
    credential: CredentialKind,
}

impl Principal {
    fn new(identity: UserIdentity, credential: CredentialKind) -> Self {
        let authorities = identity.authorities();
        Self {
            identity,
            authorities,
            credential,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        self.identity.user_id()
    }

    /// Granted authorities (`ROLE_<role>`).
    #[must_use]
    pub fn authorities(&self) -> &[String] {
        &self.authorities
    }

    /// Which stage accepted the credential.
    #[must_use]
    pub fn credential(&self) -> CredentialKind {
        self.credential
    }
}

/// Per-request authentication result, built by the filter chain and handed
/// to handlers through request extensions.
#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    principal: Option<Principal>,
}

impl SecurityContext {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// The caller's user id, or [`ANONYMOUS_USER`].
    #[must_use]
    pub fn current_user_id(&self) -> &str {
        self.principal
            .as_ref()
            .map_or(ANONYMOUS_USER, |p| p.user_id().as_str())
    }

    /// Whether the caller holds `role`, with or without the `ROLE_` prefix.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        let Some(principal) = &self.principal else {
            return false;
        };
        let role = role
            .strip_prefix(Role::AUTHORITY_PREFIX)
            .unwrap_or(role);
        principal.identity.has_role(role)
    }

    pub(super) fn authenticate(&mut self, identity: UserIdentity, credential: CredentialKind) {
        self.principal = Some(Principal::new(identity, credential));
    }

    pub(super) fn into_principal(self) -> Option<Principal> {
        self.principal
    }
}
