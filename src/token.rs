// Upstream bearer-token lifecycle: cache the token, refresh synchronously
// when it nears expiry, and never run more than one exchange at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ApiError;
use crate::transport::UpstreamTransport;

/// Tokens within this margin of expiry are refreshed before being handed out,
/// so a caller always holds one valid for at least the span of a request.
const REFRESH_MARGIN: Duration = Duration::from_secs(30);

/// Body of the client-credentials response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Process-wide token holder. The async lock covers the whole
/// check-and-refresh sequence: concurrent cold callers queue behind a single
/// exchange and all leave with its result.
pub struct TokenStore {
    transport: Arc<dyn UpstreamTransport>,
    client_id: String,
    client_secret: String,
    current: Mutex<Option<CachedToken>>,
    refresh_margin: Duration,
}

impl TokenStore {
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            current: Mutex::new(None),
            refresh_margin: REFRESH_MARGIN,
        }
    }

    /// A bearer token valid beyond the refresh margin.
    ///
    /// On a failed exchange the stored token is left untouched and the error
    /// surfaces as `ApiError::Authentication`; no partial token is ever kept.
    pub async fn bearer(&self) -> Result<String, ApiError> {
        let mut slot = self.current.lock().await;
        if let Some(token) = slot.as_ref() {
            if Instant::now() + self.refresh_margin < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let response = self
            .transport
            .exchange_token(&self.client_id, &self.client_secret)
            .await
            .map_err(|e| ApiError::Authentication(e.to_string()))?;
        debug!(expires_in = response.expires_in, "obtained upstream token");

        let token = CachedToken {
            access_token: response.access_token,
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        };
        let bearer = token.access_token.clone();
        *slot = Some(token);
        Ok(bearer)
    }
}
