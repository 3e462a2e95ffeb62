use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::discovery::{DiscoveryCache, ProviderMetadata};
use crate::error::Error;
use crate::pkce::{AuthorizationContext, PkceChallenge};
use crate::storage::{self, FlowStorage, MemoryStorage};

/// Target for security audit events.
const AUDIT_TARGET: &str = "session_bridge::audit";

/// Authorization-code + PKCE client configuration.
///
/// Required fields are constructor parameters, so there are no runtime "missing field" errors.
///
/// ```rust,ignore
/// use session_bridge::OAuthConfig;
///
/// let config = OAuthConfig::new(
///     "https://sso.example.com/realms/tasks".parse()?,
///     "task-web",
///     "https://tasks.example.com/callback".parse()?,
/// )
/// .with_scopes(vec!["openid".into(), "email".into()]);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) authority: Url,
    pub(crate) client_id: String,
    pub(crate) redirect_uri: Url,
    pub(crate) post_logout_redirect_uri: Option<Url>,
    pub(crate) app_origin: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) request_timeout: Duration,
}

impl OAuthConfig {
    /// Create a new configuration. The application origin defaults to the
    /// origin of `redirect_uri`.
    #[must_use]
    pub fn new(authority: Url, client_id: impl Into<String>, redirect_uri: Url) -> Self {
        let mut app_origin = redirect_uri.clone();
        app_origin.set_path("/");
        app_origin.set_query(None);
        app_origin.set_fragment(None);

        Self {
            authority,
            client_id: client_id.into(),
            redirect_uri,
            post_logout_redirect_uri: None,
            app_origin,
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `OIDC_AUTHORITY`: issuer URL
    /// - `OIDC_CLIENT_ID`: public client ID
    /// - `OIDC_REDIRECT_URI`: callback URI
    ///
    /// # Optional env vars
    /// - `OIDC_SCOPES`: comma- or space-separated scopes
    /// - `OIDC_POST_LOGOUT_REDIRECT_URI`: where the provider sends the user after logout
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a URL is invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let required = |key: &'static str| {
            var(key).ok_or_else(|| Error::Config(format!("{key} is required")))
        };
        let parse_url = |key: &'static str, value: String| {
            value
                .parse::<Url>()
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        };

        let authority = parse_url("OIDC_AUTHORITY", required("OIDC_AUTHORITY")?)?;
        let client_id = required("OIDC_CLIENT_ID")?;
        let redirect_uri = parse_url("OIDC_REDIRECT_URI", required("OIDC_REDIRECT_URI")?)?;

        let mut config = Self::new(authority, client_id, redirect_uri);

        if let Some(scopes) = var("OIDC_SCOPES") {
            config = config.with_scopes(
                scopes
                    .split([',', ' '])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect(),
            );
        }
        if let Some(value) = var("OIDC_POST_LOGOUT_REDIRECT_URI") {
            config = config
                .with_post_logout_redirect_uri(parse_url("OIDC_POST_LOGOUT_REDIRECT_URI", value)?);
        }

        Ok(config)
    }

    /// Override the requested scopes (default: `["openid", "profile", "email"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, url: Url) -> Self {
        self.post_logout_redirect_uri = Some(url);
        self
    }

    /// Override the application origin used as the fallback logout target.
    #[must_use]
    pub fn with_app_origin(mut self, url: Url) -> Self {
        self.app_origin = url;
        self
    }

    /// Bound each token-endpoint call (default: 10 seconds).
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Get the authorization server base URL.
    #[must_use]
    pub fn authority(&self) -> &Url {
        &self.authority
    }

    /// Get the OAuth client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the callback URL registered with the provider.
    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Get the requested scopes.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn post_logout_target(&self) -> &Url {
        self.post_logout_redirect_uri
            .as_ref()
            .unwrap_or(&self.app_origin)
    }
}

/// Token set returned by the token endpoint.
///
/// The access token is opaque: it is never parsed here, only presented to
/// the resource server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Parameters the authorization server appends to the redirect URI.
#[derive(Debug, Default)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }
}

/// Authorization-code + PKCE client.
///
/// Holds the in-flight login state and the received tokens in two
/// [`FlowStorage`]s; both default to process-local memory.
pub struct AuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
    discovery: Arc<DiscoveryCache>,
    flow: Arc<dyn FlowStorage>,
    tokens: Arc<dyn FlowStorage>,
}

impl AuthClient {
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            discovery: Arc::new(DiscoveryCache::new()),
            flow: Arc::new(MemoryStorage::new()),
            tokens: Arc::new(MemoryStorage::new()),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Share a discovery cache between clients.
    #[must_use]
    pub fn with_discovery_cache(mut self, cache: Arc<DiscoveryCache>) -> Self {
        self.discovery = cache;
        self
    }

    /// Storage for the in-flight verifier, state and nonce.
    #[must_use]
    pub fn with_flow_storage(mut self, storage: Arc<dyn FlowStorage>) -> Self {
        self.flow = storage;
        self
    }

    /// Storage for received tokens.
    #[must_use]
    pub fn with_token_storage(mut self, storage: Arc<dyn FlowStorage>) -> Self {
        self.tokens = storage;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Currently stored access token.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.tokens.get(storage::ACCESS_TOKEN_KEY)
    }

    /// Currently stored refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.tokens.get(storage::REFRESH_TOKEN_KEY)
    }

    async fn metadata(&self) -> Result<Arc<ProviderMetadata>, Error> {
        self.discovery.get(&self.config.authority).await
    }

    /// Start a login: store a fresh PKCE verifier, `state` and `nonce`, and
    /// return the authorization URL to send the browser to.
    ///
    /// Any earlier in-flight login is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryUnavailable`] if provider metadata cannot be loaded.
    pub async fn begin_login(&self) -> Result<Url, Error> {
        let metadata = self.metadata().await?;

        let pkce = PkceChallenge::generate();
        let ctx = AuthorizationContext::for_challenge(&pkce);
        let scope = self.config.scopes.join(" ");

        let mut url = metadata.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", &ctx.state)
            .append_pair("nonce", &ctx.nonce)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", pkce.method.as_str());

        storage::store_flow(self.flow.as_ref(), &ctx);
        tracing::debug!("Authorization request prepared");

        Ok(url)
    }

    /// Finish a login from the callback URL and store the received tokens.
    ///
    /// Stored flow state is cleared before anything else, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthorizationDenied`] if the provider returned `error`
    /// - [`Error::MissingFlowState`] if no login is in flight
    /// - [`Error::ForgeryDetected`] if `state` does not match; the token
    ///   endpoint is never contacted in that case
    /// - [`Error::Http`] / [`Error::OAuth`] if the code exchange fails
    pub async fn complete_login(&self, callback_url: &Url) -> Result<TokenResponse, Error> {
        let params = CallbackParams::from_url(callback_url);
        let stored = storage::take_flow(self.flow.as_ref());

        if let Some(code) = params.error {
            tracing::warn!(
                error = %code,
                description = params.error_description.as_deref().unwrap_or(""),
                "Authorization denied by provider"
            );
            return Err(Error::AuthorizationDenied {
                code,
                description: params.error_description,
            });
        }

        let stored = stored.ok_or(Error::MissingFlowState("state"))?;

        if params.state.as_deref() != Some(stored.state.as_str()) {
            tracing::warn!(
                target: AUDIT_TARGET,
                event = "state_mismatch",
                "Authorization callback state mismatch; flow aborted"
            );
            return Err(Error::ForgeryDetected);
        }

        let code = params.code.ok_or_else(|| Error::OAuth {
            operation: "authorization callback",
            status: None,
            detail: "callback carried no code".into(),
        })?;

        let metadata = self.metadata().await?;
        let tokens = self
            .exchange_code(&metadata.token_endpoint, &code, &stored.code_verifier)
            .await?;

        self.store_tokens(&tokens);
        tracing::info!("Authorization code exchanged");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new token set.
    ///
    /// On any failure all stored tokens are cleared; the caller must restart
    /// the login rather than retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RefreshFailed`] wrapping the underlying cause.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let result = async {
            let metadata = self.metadata().await?;
            let params = [
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
            ];
            self.token_request(&metadata.token_endpoint, &params, "token refresh")
                .await
        }
        .await;

        match result {
            Ok(tokens) => {
                self.store_tokens(&tokens);
                Ok(tokens)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed; re-authentication required");
                storage::clear_tokens(self.tokens.as_ref());
                Err(Error::RefreshFailed(Box::new(e)))
            }
        }
    }

    /// Clear local tokens and return where to send the browser.
    ///
    /// Local state is always cleared first. If the provider advertises an
    /// end-session endpoint the result points there with
    /// `post_logout_redirect_uri` and, when known, `id_token_hint`;
    /// otherwise it is the application origin.
    pub async fn logout(&self, id_token_hint: Option<&str>) -> Url {
        let hint = id_token_hint
            .map(str::to_owned)
            .or_else(|| self.tokens.get(storage::ID_TOKEN_KEY));
        storage::clear_tokens(self.tokens.as_ref());
        storage::clear_flow(self.flow.as_ref());

        let metadata = match self.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(error = %e, "Provider metadata unavailable during logout");
                return self.config.app_origin.clone();
            }
        };

        let Some(end_session) = metadata.end_session_endpoint.as_ref() else {
            return self.config.app_origin.clone();
        };

        let mut url = end_session.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(
                "post_logout_redirect_uri",
                self.config.post_logout_target().as_str(),
            );
            if let Some(hint) = &hint {
                query.append_pair("id_token_hint", hint);
            }
        }
        url
    }

    async fn exchange_code(
        &self,
        token_endpoint: &Url,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        self.token_request(token_endpoint, &params, "token exchange")
            .await
    }

    async fn token_request(
        &self,
        token_endpoint: &Url,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, Error> {
        let response = self
            .http
            .post(token_endpoint.clone())
            .timeout(self.config.request_timeout)
            .form(params)
            .send()
            .await?;

        let response = Self::ensure_success(response, operation).await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    fn store_tokens(&self, tokens: &TokenResponse) {
        self.tokens
            .set(storage::ACCESS_TOKEN_KEY, tokens.access_token.clone());
        match &tokens.refresh_token {
            Some(token) => self.tokens.set(storage::REFRESH_TOKEN_KEY, token.clone()),
            None => self.tokens.remove(storage::REFRESH_TOKEN_KEY),
        }
        if let Some(token) = &tokens.id_token {
            self.tokens.set(storage::ID_TOKEN_KEY, token.clone());
        }
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::OAuth {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}
