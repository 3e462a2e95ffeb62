use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// RFC 3986 unreserved characters, the alphabet allowed in a code verifier.
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Length of a generated code verifier (the RFC 7636 maximum).
pub const CODE_VERIFIER_LENGTH: usize = 128;

/// Length of generated `state` and `nonce` values.
pub const STATE_LENGTH: usize = 32;

fn random_unreserved(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| UNRESERVED[rng.random_range(0..UNRESERVED.len())] as char)
        .collect()
}

/// Generates a cryptographically random code verifier for PKCE.
///
/// Returns a 128-character string drawn from the unreserved alphabet.
#[must_use]
pub fn generate_code_verifier() -> String {
    random_unreserved(CODE_VERIFIER_LENGTH)
}

/// Computes the S256 code challenge from a code verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generates a random anti-CSRF `state` parameter.
#[must_use]
pub fn generate_state() -> String {
    random_unreserved(STATE_LENGTH)
}

/// Generates a random OIDC `nonce`.
#[must_use]
pub fn generate_nonce() -> String {
    random_unreserved(STATE_LENGTH)
}

/// PKCE transformation applied to the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    S256,
}

impl ChallengeMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

/// Verifier/challenge pair for one login attempt.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub method: ChallengeMethod,
}

impl PkceChallenge {
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
            method: ChallengeMethod::S256,
        }
    }
}

/// Values that must survive the round-trip through the authorization server.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
}

impl AuthorizationContext {
    /// Creates a context bound to the given challenge's verifier.
    #[must_use]
    pub fn for_challenge(challenge: &PkceChallenge) -> Self {
        Self {
            state: generate_state(),
            nonce: generate_nonce(),
            code_verifier: challenge.code_verifier.clone(),
        }
    }
}
