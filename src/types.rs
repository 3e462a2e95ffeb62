use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Authenticated user identifier (the provider's `sub` claim).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A single role name, trimmed and non-empty.
///
/// Use `"ADMIN".parse::<Role>()` or `Role::try_from(string)` to create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
pub struct Role(String);

impl Role {
    /// Prefix applied when a role is turned into a granted authority.
    pub const AUTHORITY_PREFIX: &'static str = "ROLE_";

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Granted authority for this role (`USER` → `ROLE_USER`).
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}{}", Self::AUTHORITY_PREFIX, self.0)
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for Role {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::Malformed("empty role".into()));
        }
        if trimmed.len() == s.len() {
            Ok(Self(s))
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        r.0
    }
}
