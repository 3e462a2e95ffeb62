//! Self-contained session tokens with a sliding inactivity window and an
//! absolute lifetime ceiling.
//!
//! A session token is an HS256-signed JWT carrying the user identity and
//! two timers: `lastActivity` (rewritten on every accepted request) and
//! `sessionStart` (fixed at mint time). Nothing is stored server-side, so
//! validation is a pure function of the token and the clock.
//!
//! ```rust,ignore
//! let service = SessionTokenService::new(secret.as_bytes(), SessionPolicy::default())?;
//! let session = service.issue(&identity)?;
//! // on a later request:
//! let refreshed = service.touch(session.token())?;
//! ```

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::Error;
use crate::identity::UserIdentity;
use crate::types::{Role, UserId};

/// Minimum HMAC secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Upper bound for either session timeout (ten years).
pub const MAX_TIMEOUT: Duration = Duration::days(3650);

/// Current time in epoch seconds.
pub(crate) fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Session timeout policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Sliding window; reset by every accepted request (default 20 minutes).
    pub inactivity_window: Duration,
    /// Absolute ceiling measured from session start (default 24 hours).
    pub max_duration: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            inactivity_window: Duration::seconds(1200),
            max_duration: Duration::seconds(86_400),
        }
    }
}

impl SessionPolicy {
    #[must_use]
    pub fn new(inactivity_window: Duration, max_duration: Duration) -> Self {
        Self {
            inactivity_window,
            max_duration,
        }
    }

    /// Get the inactivity window in whole seconds.
    #[must_use]
    pub fn inactivity_seconds(&self) -> i64 {
        self.inactivity_window.whole_seconds()
    }

    /// Get the absolute lifetime in whole seconds.
    #[must_use]
    pub fn max_duration_seconds(&self) -> i64 {
        self.max_duration.whole_seconds()
    }
}

/// Claims carried by a session token. All timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "sub")]
    subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(rename = "iat")]
    issued_at: i64,
    #[serde(rename = "exp")]
    expires_at: i64,
    #[serde(rename = "lastActivity")]
    last_activity_at: i64,
    #[serde(rename = "sessionStart")]
    session_start_at: i64,
}

impl SessionClaims {
    /// Get the subject (user id).
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Get the email, if the provider supplied one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Get the display name.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Get the roles.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Get the issue time (`iat`).
    #[must_use]
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Get the expiry time (`exp`), the end of the current inactivity window.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Get the time of the last accepted request.
    #[must_use]
    pub fn last_activity_at(&self) -> i64 {
        self.last_activity_at
    }

    /// Get the time the session was first minted.
    #[must_use]
    pub fn session_start_at(&self) -> i64 {
        self.session_start_at
    }

    /// The identity this session was minted for.
    #[must_use]
    pub fn identity(&self) -> UserIdentity {
        let mut identity =
            UserIdentity::new(UserId(self.subject.clone()), self.roles.iter().cloned());
        if let Some(email) = &self.email {
            identity = identity.with_email(email.clone());
        }
        if let Some(name) = &self.display_name {
            identity = identity.with_display_name(name.clone());
        }
        identity
    }

    /// Derive the timer state at `now`. The duration ceiling wins when both
    /// timers have run out, since activity can never recover it.
    #[must_use]
    pub fn state_at(&self, policy: &SessionPolicy, now: i64) -> SessionState {
        let ceiling = self
            .session_start_at
            .saturating_add(policy.max_duration_seconds());
        let inactivity_deadline = self
            .expires_at
            .min(self.last_activity_at.saturating_add(policy.inactivity_seconds()));

        if now > ceiling {
            SessionState::DurationExpired
        } else if now > inactivity_deadline {
            SessionState::InactivityExpired
        } else {
            SessionState::Active
        }
    }

    fn for_identity(identity: &UserIdentity, policy: &SessionPolicy, now: i64) -> Self {
        Self {
            subject: identity.user_id().to_string(),
            email: identity.email().map(str::to_owned),
            display_name: identity.display_name().map(str::to_owned),
            roles: identity.roles().to_vec(),
            issued_at: now,
            expires_at: now.saturating_add(policy.inactivity_seconds()),
            last_activity_at: now,
            session_start_at: now,
        }
    }

    fn renewed(&self, policy: &SessionPolicy, now: i64) -> Self {
        Self {
            issued_at: now,
            expires_at: now.saturating_add(policy.inactivity_seconds()),
            last_activity_at: now,
            ..self.clone()
        }
    }
}

/// Timer state of a session token, derived from its claims and the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    InactivityExpired,
    DurationExpired,
}

/// A freshly signed session token and the claims inside it.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    token: String,
    claims: SessionClaims,
}

impl IssuedSession {
    /// Get the signed token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the claims that were signed.
    #[must_use]
    pub fn claims(&self) -> &SessionClaims {
        &self.claims
    }

    #[must_use]
    pub fn into_token(self) -> String {
        self.token
    }
}

/// Issues, validates and slides session tokens.
pub struct SessionTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    policy: SessionPolicy,
}

impl std::fmt::Debug for SessionTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenService")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SessionTokenService {
    /// Create a service signing with the given HMAC secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the secret is shorter than
    /// [`MIN_SECRET_LEN`] bytes, or a policy timeout is non-positive or
    /// longer than [`MAX_TIMEOUT`].
    pub fn new(secret: &[u8], policy: SessionPolicy) -> Result<Self, Error> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "session secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }
        if policy.inactivity_seconds() <= 0 || policy.max_duration_seconds() <= 0 {
            return Err(Error::Config("session timeouts must be positive".into()));
        }
        if policy.inactivity_window > MAX_TIMEOUT || policy.max_duration > MAX_TIMEOUT {
            return Err(Error::Config(format!(
                "session timeouts must not exceed {} seconds",
                MAX_TIMEOUT.whole_seconds()
            )));
        }

        // Timers are checked here, not by the JWT library.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            policy,
        })
    }

    /// Get the timeout policy.
    #[must_use]
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Mint a session for `identity` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the identity has an empty subject, or
    /// [`Error::Signing`] if the token cannot be signed.
    pub fn issue(&self, identity: &UserIdentity) -> Result<IssuedSession, Error> {
        self.issue_at(identity, unix_now())
    }

    /// Mint a session with `now` as issue, activity and start time.
    ///
    /// # Errors
    ///
    /// See [`issue`](Self::issue).
    pub fn issue_at(&self, identity: &UserIdentity, now: i64) -> Result<IssuedSession, Error> {
        if identity.user_id().as_str().is_empty() {
            return Err(Error::Malformed("identity has no subject".into()));
        }
        let claims = SessionClaims::for_identity(identity, &self.policy, now);
        self.sign(claims)
    }

    /// Verify a token and both timers at the current time.
    ///
    /// # Errors
    ///
    /// [`Error::Malformed`] or [`Error::SignatureInvalid`] for a corrupt token,
    /// [`Error::DurationExpired`] or [`Error::InactivityExpired`] when a timer ran out.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, Error> {
        self.validate_at(token, unix_now())
    }

    /// Verify a token and both timers at `now`.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn validate_at(&self, token: &str, now: i64) -> Result<SessionClaims, Error> {
        let claims = self.decode(token)?;
        match claims.state_at(&self.policy, now) {
            SessionState::Active => Ok(claims),
            SessionState::DurationExpired => {
                tracing::warn!(user_id = %claims.subject, "Session exceeded maximum duration");
                Err(Error::DurationExpired)
            }
            SessionState::InactivityExpired => {
                tracing::warn!(user_id = %claims.subject, "Session expired due to inactivity");
                Err(Error::InactivityExpired)
            }
        }
    }

    /// Validate and re-issue with a slid inactivity window.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn touch(&self, token: &str) -> Result<IssuedSession, Error> {
        self.touch_at(token, unix_now())
    }

    /// Validate at `now` and re-issue with `lastActivity = now`.
    /// `sessionStart` and the identity are carried over unchanged.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn touch_at(&self, token: &str, now: i64) -> Result<IssuedSession, Error> {
        let claims = self.validate_at(token, now)?;
        self.sign(claims.renewed(&self.policy, now))
    }

    /// Timer state at `now` for a correctly signed token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] or [`Error::SignatureInvalid`].
    pub fn state_at(&self, token: &str, now: i64) -> Result<SessionState, Error> {
        Ok(self.decode(token)?.state_at(&self.policy, now))
    }

    /// Subject of a correctly signed token, ignoring timers.
    ///
    /// Diagnostics only; never use the result for authorization.
    #[must_use]
    pub fn peek_subject(&self, token: &str) -> Option<String> {
        match self.decode(token) {
            Ok(claims) => Some(claims.subject),
            Err(e) => {
                tracing::debug!(error = %e, "Could not read session subject");
                None
            }
        }
    }

    /// `true` unless the token is correctly signed and currently active.
    ///
    /// Diagnostics only; never use the result for authorization.
    #[must_use]
    pub fn is_expired(&self, token: &str) -> bool {
        !matches!(self.state_at(token, unix_now()), Ok(SessionState::Active))
    }

    fn sign(&self, claims: SessionClaims) -> Result<IssuedSession, Error> {
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(Error::Signing)?;
        Ok(IssuedSession { token, claims })
    }

    fn decode(&self, token: &str) -> Result<SessionClaims, Error> {
        use jsonwebtoken::errors::ErrorKind;

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => Error::SignatureInvalid,
                _ => Error::Malformed(e.to_string()),
            })?;

        if data.claims.subject.is_empty() {
            return Err(Error::Malformed("missing subject".into()));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";
    const T0: i64 = 1_700_000_000;

    fn service() -> SessionTokenService {
        SessionTokenService::new(SECRET, SessionPolicy::default()).unwrap()
    }

    fn service_with(inactivity: i64, max: i64) -> SessionTokenService {
        let policy = SessionPolicy::new(Duration::seconds(inactivity), Duration::seconds(max));
        SessionTokenService::new(SECRET, policy).unwrap()
    }

    fn identity() -> UserIdentity {
        UserIdentity::new(UserId::from("u1".to_string()), ["USER".parse().unwrap()])
            .with_email("u1@example.com")
            .with_display_name("User One")
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = SessionTokenService::new(b"short", SessionPolicy::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn oversized_timeouts_are_rejected() {
        let huge = Duration::seconds(i64::MAX);
        let day = Duration::days(1);
        for policy in [SessionPolicy::new(huge, day), SessionPolicy::new(day, huge)] {
            let err = SessionTokenService::new(SECRET, policy).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{policy:?}");
        }

        let longest = SessionPolicy::new(MAX_TIMEOUT, MAX_TIMEOUT);
        let service = SessionTokenService::new(SECRET, longest).unwrap();
        let session = service.issue_at(&identity(), T0).unwrap();
        assert_eq!(
            session.claims().expires_at(),
            T0 + MAX_TIMEOUT.whole_seconds()
        );
    }

    #[test]
    fn timer_arithmetic_saturates_at_clock_extremes() {
        let service = service_with(60, 3600);
        let session = service.issue_at(&identity(), i64::MAX - 10).unwrap();
        assert_eq!(session.claims().expires_at(), i64::MAX);
        assert_eq!(
            service.state_at(session.token(), i64::MAX).unwrap(),
            SessionState::Active
        );
    }

    #[test]
    fn default_policy_is_twenty_minutes_and_a_day() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.inactivity_seconds(), 1200);
        assert_eq!(policy.max_duration_seconds(), 86_400);
    }

    #[test]
    fn issue_then_validate_round_trips_identity() {
        let service = service();
        let issued = service.issue_at(&identity(), T0).unwrap();
        let claims = service.validate_at(issued.token(), T0).unwrap();

        assert_eq!(claims.identity(), identity());
        assert_eq!(claims.session_start_at(), T0);
        assert_eq!(claims.last_activity_at(), T0);
        assert_eq!(claims.issued_at(), T0);
        assert_eq!(claims.expires_at(), T0 + 1200);
    }

    #[test]
    fn token_has_three_parts() {
        let issued = service().issue_at(&identity(), T0).unwrap();
        assert_eq!(issued.token().split('.').count(), 3);
    }

    #[test]
    fn touch_slides_window_and_keeps_start() {
        let service = service();
        let issued = service.issue_at(&identity(), T0).unwrap();
        let touched = service.touch_at(issued.token(), T0 + 30).unwrap();
        let before = issued.claims();
        let after = touched.claims();

        assert_eq!(after.session_start_at(), before.session_start_at());
        assert_eq!(after.identity(), before.identity());
        assert_eq!(after.last_activity_at() - before.last_activity_at(), 30);
        assert_eq!(after.expires_at() - before.expires_at(), 30);
        assert_eq!(after.expires_at(), after.last_activity_at() + 1200);
    }

    #[test]
    fn inactivity_expiry() {
        let service = service_with(2, 86_400);
        let issued = service.issue_at(&identity(), T0).unwrap();

        assert!(service.validate_at(issued.token(), T0 + 2).is_ok());
        let err = service.validate_at(issued.token(), T0 + 3).unwrap_err();
        assert!(matches!(err, Error::InactivityExpired));
    }

    #[test]
    fn inactivity_expiry_before_ceiling() {
        let service = service();
        let issued = service.issue_at(&identity(), T0).unwrap();
        let touched = service.touch_at(issued.token(), T0 + 600).unwrap();

        let last = touched.claims().last_activity_at();
        let err = service.validate_at(touched.token(), last + 1200 + 1).unwrap_err();
        assert!(matches!(err, Error::InactivityExpired));
    }

    #[test]
    fn duration_ceiling_survives_continuous_activity() {
        let service = service_with(1200, 2);
        let mut token = service.issue_at(&identity(), T0).unwrap().into_token();

        token = service.touch_at(&token, T0 + 1).unwrap().into_token();
        token = service.touch_at(&token, T0 + 2).unwrap().into_token();
        let err = service.touch_at(&token, T0 + 3).unwrap_err();
        assert!(matches!(err, Error::DurationExpired));
    }

    #[test]
    fn duration_ceiling_with_touch_every_second() {
        let service = service_with(5, 60);
        let mut token = service.issue_at(&identity(), T0).unwrap().into_token();
        for t in 1..=60 {
            token = service.touch_at(&token, T0 + t).unwrap().into_token();
        }
        let err = service.validate_at(&token, T0 + 61).unwrap_err();
        assert!(matches!(err, Error::DurationExpired));
    }

    #[test]
    fn duration_reported_when_both_timers_expired() {
        let service = service_with(2, 3);
        let issued = service.issue_at(&identity(), T0).unwrap();
        let err = service.validate_at(issued.token(), T0 + 100).unwrap_err();
        assert!(matches!(err, Error::DurationExpired));
    }

    #[test]
    fn tampered_token_fails_signature() {
        let service = service();
        let token = service.issue_at(&identity(), T0).unwrap().into_token();
        let other = SessionTokenService::new(b"fedcba9876543210fedcba9876543210", SessionPolicy::default())
            .unwrap();

        let err = other.validate_at(&token, T0).unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = service().validate_at("not.a.token", T0).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
        let err = service().validate_at("", T0).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn foreign_claims_are_malformed() {
        #[derive(Serialize)]
        struct Foreign {
            sub: String,
            exp: i64,
        }
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &Foreign {
                sub: "u1".into(),
                exp: T0 + 10,
            },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        let err = service().validate_at(&token, T0).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn state_at_reports_each_state() {
        let service = service_with(10, 20);
        let token = service.issue_at(&identity(), T0).unwrap().into_token();

        assert_eq!(service.state_at(&token, T0 + 5).unwrap(), SessionState::Active);
        assert_eq!(
            service.state_at(&token, T0 + 11).unwrap(),
            SessionState::InactivityExpired
        );
        assert_eq!(
            service.state_at(&token, T0 + 21).unwrap(),
            SessionState::DurationExpired
        );
    }

    #[test]
    fn peek_helpers_swallow_errors() {
        let service = service();
        assert_eq!(service.peek_subject("garbage"), None);
        assert!(service.is_expired("garbage"));

        let live = service.issue(&identity()).unwrap();
        assert_eq!(service.peek_subject(live.token()).as_deref(), Some("u1"));
        assert!(!service.is_expired(live.token()));

        let stale = service.issue_at(&identity(), T0).unwrap();
        assert_eq!(service.peek_subject(stale.token()).as_deref(), Some("u1"));
        assert!(service.is_expired(stale.token()));
    }

    #[test]
    fn empty_subject_cannot_be_issued() {
        let nobody = UserIdentity::new(UserId::from(String::new()), Vec::new());
        assert!(matches!(
            service().issue_at(&nobody, T0),
            Err(Error::Malformed(_))
        ));
    }
}
