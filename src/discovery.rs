//! Authorization-server metadata discovery with a per-authority cache.
//!
//! Metadata is fetched from `{authority}/.well-known/openid-configuration`
//! once per authority and kept for the life of the cache. Concurrent cold
//! lookups for the same authority share a single fetch; a failed fetch
//! leaves nothing behind, so the next lookup tries again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::OnceCell;
use url::Url;

use crate::error::Error;

/// Default bound on a discovery fetch.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider endpoints needed by the authorization flow.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
    #[serde(default)]
    pub introspection_endpoint: Option<Url>,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
}

type Slot = Arc<OnceCell<Arc<ProviderMetadata>>>;

/// Thread-safe memoization of [`ProviderMetadata`] keyed by authority URL.
pub struct DiscoveryCache {
    http: reqwest::Client,
    timeout: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Default for DiscoveryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Metadata for `authority`, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryUnavailable`] if the document cannot be
    /// fetched in time, is not valid JSON, lacks a required endpoint, or names
    /// a different issuer.
    pub async fn get(&self, authority: &Url) -> Result<Arc<ProviderMetadata>, Error> {
        let key = authority_key(authority);
        let slot = self.slots.lock().entry(key).or_default().clone();

        slot.get_or_try_init(|| self.fetch(authority))
            .await
            .cloned()
    }

    /// Whether metadata for `authority` is already cached.
    #[must_use]
    pub fn is_cached(&self, authority: &Url) -> bool {
        self.slots
            .lock()
            .get(&authority_key(authority))
            .is_some_and(|slot| slot.initialized())
    }

    /// Drop the cached entry so the next lookup fetches again.
    pub fn invalidate(&self, authority: &Url) {
        self.slots.lock().remove(&authority_key(authority));
        tracing::debug!(%authority, "Invalidated provider metadata");
    }

    async fn fetch(&self, authority: &Url) -> Result<Arc<ProviderMetadata>, Error> {
        let url = discovery_url(authority);
        tracing::debug!(%url, "Fetching provider metadata");

        let request = async {
            let response = self
                .http
                .get(url.clone())
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await?
                .error_for_status()?;
            response.json::<ProviderMetadata>().await
        };

        let metadata = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                tracing::error!(%authority, error = %e, "Provider metadata fetch failed");
                return Err(Error::DiscoveryUnavailable(format!(
                    "could not load metadata for {authority}"
                )));
            }
            Err(_) => {
                tracing::error!(%authority, "Provider metadata fetch timed out");
                return Err(Error::DiscoveryUnavailable(format!(
                    "metadata request to {authority} timed out"
                )));
            }
        };

        if metadata.issuer.trim_end_matches('/') != authority.as_str().trim_end_matches('/') {
            tracing::error!(
                expected = %authority,
                actual = %metadata.issuer,
                "Provider metadata issuer mismatch"
            );
            return Err(Error::DiscoveryUnavailable(format!(
                "issuer mismatch for {authority}"
            )));
        }

        Ok(Arc::new(metadata))
    }
}

fn authority_key(authority: &Url) -> String {
    authority.as_str().trim_end_matches('/').to_owned()
}

fn discovery_url(authority: &Url) -> Url {
    let mut url = authority.clone();
    let path = authority.path().trim_end_matches('/');
    url.set_path(&format!("{path}/.well-known/openid-configuration"));
    url
}
