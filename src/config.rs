// Externally supplied configuration for the proxy core

use std::env;
use std::time::Duration;

use crate::error::ApiError;

/// Default upstream host; the production host is supplied via configuration.
pub const DEFAULT_BASE_URL: &str = "https://test.api.amadeus.com";

const DEFAULT_RESPONSE_TTL: Duration = Duration::from_secs(60);
const DEFAULT_CACHE_CAPACITY: usize = 512;
const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Everything the client composition needs, supplied once at process start.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// TTL applied to cached search responses.
    pub response_ttl: Duration,
    pub cache_capacity: usize,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Timeout for the token exchange request.
    pub token_timeout: Duration,
    /// Timeout for search requests; a timeout is retried like a network error.
    pub search_timeout: Duration,
}

impl ProxyConfig {
    /// Configuration with the stated defaults and the test upstream host.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            response_ttl: DEFAULT_RESPONSE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    /// Load configuration from the environment (and a `.env` file if present).
    ///
    /// `AMADEUS_CLIENT_ID` and `AMADEUS_CLIENT_SECRET` are required; the rest
    /// fall back to the defaults above.
    pub fn from_env() -> Result<Self, ApiError> {
        let _ = dotenvy::dotenv();

        let client_id = require_var("AMADEUS_CLIENT_ID")?;
        let client_secret = require_var("AMADEUS_CLIENT_SECRET")?;

        let mut config = Self::new(client_id, client_secret);
        if let Ok(base_url) = env::var("AMADEUS_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_var::<u64>("CACHE_TTL_SECONDS")? {
            config.response_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_var::<usize>("CACHE_CAPACITY")? {
            config.cache_capacity = capacity;
        }
        if let Some(attempts) = parse_var::<u32>("RETRY_MAX_ATTEMPTS")? {
            config.max_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64>("RETRY_INITIAL_BACKOFF_MS")? {
            config.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>("TOKEN_TIMEOUT_SECONDS")? {
            config.token_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("SEARCH_TIMEOUT_SECONDS")? {
            config.search_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the components would otherwise have to guard against.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(ApiError::InvalidArgument(
                "client credentials must not be empty".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(ApiError::InvalidArgument(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        if self.response_ttl.is_zero() {
            return Err(ApiError::InvalidArgument(
                "response TTL must be positive".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ApiError::InvalidArgument(
                "retry attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn require_var(name: &str) -> Result<String, ApiError> {
    env::var(name).map_err(|_| ApiError::InvalidArgument(format!("{name} is not set")))
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ApiError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ApiError::InvalidArgument(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}
