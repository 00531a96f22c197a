// Wire-level access to the upstream travel API.
// The trait is the seam the client and token store are tested through; the
// reqwest implementation reproduces the upstream contract: form-encoded
// OAuth2 token POST, authenticated JSON GETs, 429 with optional Retry-After.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ProxyConfig;
use crate::error::ApiError;
use crate::retry::AttemptError;
use crate::token::TokenResponse;

pub const TOKEN_ENDPOINT: &str = "/v1/security/oauth2/token";

#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// OAuth2 client-credentials exchange.
    async fn exchange_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenResponse, AttemptError>;

    /// One authenticated GET against `endpoint`, classified per attempt.
    async fn get_json(
        &self,
        endpoint: &str,
        query: &[(String, String)],
        bearer: &str,
    ) -> Result<Value, AttemptError>;
}

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    token_timeout: Duration,
    search_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ProxyConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::InvalidArgument(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token_timeout: config.token_timeout,
            search_timeout: config.search_timeout,
        })
    }
}

// Timeouts and connection-level failures are all transient to the retry layer.
fn network(err: reqwest::Error) -> AttemptError {
    AttemptError::Network(err.to_string())
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    async fn exchange_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenResponse, AttemptError> {
        let url = format!("{}{}", self.base_url, TOKEN_ENDPOINT);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let response = self
            .http
            .post(&url)
            .form(&form)
            .timeout(self.token_timeout)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(AttemptError::Http {
                status: status.as_u16(),
                message,
            });
        }
        response.json::<TokenResponse>().await.map_err(|e| {
            AttemptError::Http {
                status: status.as_u16(),
                message: format!("invalid token response: {e}"),
            }
        })
    }

    async fn get_json(
        &self,
        endpoint: &str,
        query: &[(String, String)],
        bearer: &str,
    ) -> Result<Value, AttemptError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(bearer)
            .timeout(self.search_timeout)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::RateLimited {
                retry_after: retry_after(&response),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(AttemptError::Http {
                status: status.as_u16(),
                message,
            });
        }
        response.json::<Value>().await.map_err(|e| AttemptError::Http {
            status: status.as_u16(),
            message: format!("invalid JSON body: {e}"),
        })
    }
}
