use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::validator::{DEFAULT_INTROSPECTION_TIMEOUT, IntrospectionResponse, Introspector};

/// Introspection endpoint and the resource server's client credentials.
#[derive(Clone)]
#[non_exhaustive]
pub struct IntrospectionConfig {
    pub(crate) endpoint: Url,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) request_timeout: Duration,
}

impl std::fmt::Debug for IntrospectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("client_id", &self.client_id)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl IntrospectionConfig {
    #[must_use]
    pub fn new(
        endpoint: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            request_timeout: DEFAULT_INTROSPECTION_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// RFC 7662 introspection over HTTP with Basic client authentication.
pub struct HttpIntrospector {
    config: IntrospectionConfig,
    http: reqwest::Client,
}

impl HttpIntrospector {
    #[must_use]
    pub fn new(config: IntrospectionConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &IntrospectionConfig {
        &self.config
    }
}

impl Introspector for HttpIntrospector {
    async fn introspect(&self, token: &str) -> Result<IntrospectionResponse, Error> {
        let params = [("token", token), ("token_type_hint", "access_token")];

        let response = self
            .http
            .post(self.config.endpoint.clone())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.config.request_timeout)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::OAuth {
                operation: "token introspection",
                status: Some(status),
                detail,
            });
        }

        response.json::<IntrospectionResponse>().await.map_err(Into::into)
    }
}
