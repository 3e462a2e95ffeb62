//! Canonical user identity and provider-claim normalization.
//!
//! Introspection responses differ by provider: the subject may live in `sub`
//! or only in `username`, display names may be split into `given_name` and
//! `family_name`, and roles show up under several claim names as either a
//! JSON list or a comma-separated string. [`UserIdentity::from_claims`]
//! folds all of these into one shape.

use serde_json::{Map, Value};

use crate::error::Error;
use crate::types::{Role, UserId};

/// Role assigned when the provider supplies none.
pub const DEFAULT_ROLE: &str = "USER";

/// Role claim names, searched in priority order.
const ROLE_CLAIMS: [&str; 4] = ["roles", "authorities", "groups", "realm_access.roles"];

/// Authenticated user, normalized from provider claims.
///
/// Immutable once built; `roles` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    user_id: UserId,
    email: Option<String>,
    display_name: Option<String>,
    roles: Vec<Role>,
}

impl UserIdentity {
    /// Create an identity. Duplicate roles are dropped; an empty role list
    /// gets the [`DEFAULT_ROLE`].
    #[must_use]
    pub fn new(user_id: impl Into<UserId>, roles: impl IntoIterator<Item = Role>) -> Self {
        let mut deduped: Vec<Role> = Vec::new();
        for role in roles {
            if !deduped.contains(&role) {
                deduped.push(role);
            }
        }
        if deduped.is_empty() {
            deduped.push(default_role());
        }
        Self {
            user_id: user_id.into(),
            email: None,
            display_name: None,
            roles: deduped,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Normalize introspection attributes into an identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenValidationFailed`] when neither `sub` nor
    /// `username` carries a usable subject.
    pub fn from_claims(claims: &Map<String, Value>) -> Result<Self, Error> {
        let user_id = string_claim(claims, "sub")
            .or_else(|| string_claim(claims, "username"))
            .ok_or_else(|| Error::token_validation("introspection response has no subject"))?;

        let mut identity = Self::new(UserId(user_id), extract_roles(claims));
        identity.email = string_claim(claims, "email");
        identity.display_name = display_name(claims);
        Ok(identity)
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == role)
    }

    /// Granted authorities (`ROLE_`-prefixed roles).
    #[must_use]
    pub fn authorities(&self) -> Vec<String> {
        self.roles.iter().map(Role::authority).collect()
    }
}

/// The three shapes a role claim can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleClaim {
    List(Vec<String>),
    Delimited(String),
    Absent,
}

impl RoleClaim {
    /// Classify a raw claim value. Nulls, numbers, objects and booleans are `Absent`.
    #[must_use]
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Array(items)) => Self::List(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect(),
            ),
            Some(Value::String(s)) => Self::Delimited(s.clone()),
            _ => Self::Absent,
        }
    }

    /// Roles carried by this claim; blank entries are skipped.
    #[must_use]
    pub fn into_roles(self) -> Vec<Role> {
        let raw: Vec<String> = match self {
            Self::List(items) => items,
            Self::Delimited(s) => s.split(',').map(str::to_owned).collect(),
            Self::Absent => Vec::new(),
        };
        raw.into_iter().filter_map(|r| Role::try_from(r).ok()).collect()
    }
}

/// First role claim (in [`ROLE_CLAIMS`] order) that yields at least one role.
fn extract_roles(claims: &Map<String, Value>) -> Vec<Role> {
    ROLE_CLAIMS
        .iter()
        .map(|name| RoleClaim::from_value(claim_at(claims, name)).into_roles())
        .find(|roles| !roles.is_empty())
        .unwrap_or_default()
}

fn display_name(claims: &Map<String, Value>) -> Option<String> {
    if let Some(name) = string_claim(claims, "name") {
        return Some(name);
    }
    match (
        string_claim(claims, "given_name"),
        string_claim(claims, "family_name"),
    ) {
        (Some(given), Some(family)) => Some(format!("{given} {family}")),
        (given, family) => family.or(given),
    }
}

/// Look up a claim by literal key, then by dotted path through nested objects.
fn claim_at<'a>(claims: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = claims.get(path) {
        return Some(value);
    }
    let mut segments = path.split('.');
    let mut current = claims.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Non-empty string claim. Numeric subjects are accepted as their decimal form.
fn string_claim(claims: &Map<String, Value>, key: &str) -> Option<String> {
    match claims.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn default_role() -> Role {
    DEFAULT_ROLE.parse().expect("DEFAULT_ROLE is non-blank")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn role_names(identity: &UserIdentity) -> Vec<&str> {
        identity.roles().iter().map(Role::as_str).collect()
    }

    #[test]
    fn absent_roles_synthesize_default() {
        let id = UserIdentity::from_claims(&claims(json!({ "sub": "u1" }))).unwrap();
        assert_eq!(role_names(&id), vec!["USER"]);
    }

    #[test]
    fn comma_separated_roles_are_split() {
        let id = UserIdentity::from_claims(&claims(json!({ "sub": "u1", "roles": "a,b,c" }))).unwrap();
        assert_eq!(role_names(&id), vec!["a", "b", "c"]);
    }

    #[test]
    fn list_roles_ignore_non_strings() {
        let id = UserIdentity::from_claims(&claims(json!({
            "sub": "u1",
            "roles": ["ADMIN", 7, null, "EDITOR"]
        })))
        .unwrap();
        assert_eq!(role_names(&id), vec!["ADMIN", "EDITOR"]);
    }

    #[test]
    fn role_claims_follow_priority_order() {
        let id = UserIdentity::from_claims(&claims(json!({
            "sub": "u1",
            "groups": ["staff"],
            "authorities": "reader, writer"
        })))
        .unwrap();
        assert_eq!(role_names(&id), vec!["reader", "writer"]);
    }

    #[test]
    fn null_and_empty_role_claims_fall_through() {
        let id = UserIdentity::from_claims(&claims(json!({
            "sub": "u1",
            "roles": null,
            "authorities": [],
            "groups": " , ",
            "realm_access": { "roles": ["offline_access"] }
        })))
        .unwrap();
        assert_eq!(role_names(&id), vec!["offline_access"]);
    }

    #[test]
    fn literal_dotted_key_is_accepted() {
        let id = UserIdentity::from_claims(&claims(json!({
            "sub": "u1",
            "realm_access.roles": "ops"
        })))
        .unwrap();
        assert_eq!(role_names(&id), vec!["ops"]);
    }

    #[test]
    fn duplicate_roles_collapse() {
        let id = UserIdentity::from_claims(&claims(json!({ "sub": "u1", "roles": "A,A,B" }))).unwrap();
        assert_eq!(role_names(&id), vec!["A", "B"]);
    }

    #[test]
    fn subject_falls_back_to_username() {
        let id = UserIdentity::from_claims(&claims(json!({ "sub": "", "username": "alice" }))).unwrap();
        assert_eq!(id.user_id().as_str(), "alice");
    }

    #[test]
    fn missing_subject_is_rejected() {
        let err = UserIdentity::from_claims(&claims(json!({ "email": "a@example.com" }))).unwrap_err();
        assert!(matches!(err, Error::TokenValidationFailed { .. }));
    }

    #[test]
    fn display_name_prefers_name_claim() {
        let id = UserIdentity::from_claims(&claims(json!({
            "sub": "u1",
            "name": "Ada Lovelace",
            "given_name": "Ada"
        })))
        .unwrap();
        assert_eq!(id.display_name(), Some("Ada Lovelace"));
    }

    #[test]
    fn display_name_joins_given_and_family() {
        let id = UserIdentity::from_claims(&claims(json!({
            "sub": "u1",
            "given_name": "Ada",
            "family_name": "Lovelace"
        })))
        .unwrap();
        assert_eq!(id.display_name(), Some("Ada Lovelace"));

        let family_only =
            UserIdentity::from_claims(&claims(json!({ "sub": "u1", "family_name": "Lovelace" })))
                .unwrap();
        assert_eq!(family_only.display_name(), Some("Lovelace"));
    }

    #[test]
    fn email_is_optional() {
        let id = UserIdentity::from_claims(&claims(json!({ "sub": "u1", "email": null }))).unwrap();
        assert_eq!(id.email(), None);
    }

    #[test]
    fn authorities_are_prefixed() {
        let id = UserIdentity::new(UserId::from("u1".to_string()), ["ADMIN".parse().unwrap()]);
        assert_eq!(id.authorities(), vec!["ROLE_ADMIN".to_string()]);
        assert!(id.has_role("ADMIN"));
    }
}
