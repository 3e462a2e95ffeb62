//! Client-side storage for in-flight login state and issued tokens.
//!
//! The authorization flow client keeps two stores: a short-lived,
//! per-origin store for the PKCE verifier, `state` and `nonce` of the
//! current login attempt, and a token store for the tokens it received.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::pkce::AuthorizationContext;

pub(crate) const STATE_KEY: &str = "oidc.flow.state";
pub(crate) const NONCE_KEY: &str = "oidc.flow.nonce";
pub(crate) const VERIFIER_KEY: &str = "oidc.flow.code_verifier";

pub(crate) const ACCESS_TOKEN_KEY: &str = "oidc.access_token";
pub(crate) const REFRESH_TOKEN_KEY: &str = "oidc.refresh_token";
pub(crate) const ID_TOKEN_KEY: &str = "oidc.id_token";

/// Key/value storage scoped to one application origin.
///
/// Implementations must be cheap and infallible; a browser's
/// `sessionStorage` is the model.
pub trait FlowStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn remove(&self, key: &str);
}

/// Process-local [`FlowStorage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl FlowStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.lock().insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// Persist a login attempt, replacing any previous one.
pub(crate) fn store_flow(storage: &dyn FlowStorage, ctx: &AuthorizationContext) {
    storage.set(STATE_KEY, ctx.state.clone());
    storage.set(NONCE_KEY, ctx.nonce.clone());
    storage.set(VERIFIER_KEY, ctx.code_verifier.clone());
}

/// Remove and return the stored login attempt. Partial entries are still cleared.
pub(crate) fn take_flow(storage: &dyn FlowStorage) -> Option<AuthorizationContext> {
    let state = storage.get(STATE_KEY);
    let nonce = storage.get(NONCE_KEY);
    let code_verifier = storage.get(VERIFIER_KEY);
    clear_flow(storage);

    Some(AuthorizationContext {
        state: state?,
        nonce: nonce.unwrap_or_default(),
        code_verifier: code_verifier?,
    })
}

pub(crate) fn clear_flow(storage: &dyn FlowStorage) {
    storage.remove(STATE_KEY);
    storage.remove(NONCE_KEY);
    storage.remove(VERIFIER_KEY);
}

pub(crate) fn clear_tokens(storage: &dyn FlowStorage) {
    storage.remove(ACCESS_TOKEN_KEY);
    storage.remove(REFRESH_TOKEN_KEY);
    storage.remove(ID_TOKEN_KEY);
}
