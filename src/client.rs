// Search façade composing cache, token store, and retry executor.
// One instance is shared across all concurrent requests; the route layer
// hands it already-validated, normalized parameters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheStats, TtlCache};
use crate::config::ProxyConfig;
use crate::error::ApiError;
use crate::normalize::{self, FlightOffersPage};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::token::TokenStore;
use crate::transport::{HttpTransport, UpstreamTransport};

pub const FLIGHT_OFFERS_ENDPOINT: &str = "/v2/shopping/flight-offers";
pub const HOTEL_OFFERS_ENDPOINT: &str = "/v1/shopping/hotel-offers";

/// Flight search parameters, already validated by the route layer.
#[derive(Debug, Clone)]
pub struct FlightSearchParams {
    pub origin: String,
    pub destination: String,
    pub departure_date: String,
    pub adults: u32,
    pub non_stop: bool,
    pub max_results: u32,
    pub currency: String,
}

impl FlightSearchParams {
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        departure_date: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            departure_date: departure_date.into(),
            adults: 1,
            non_stop: false,
            max_results: 20,
            currency: "INR".to_string(),
        }
    }

    fn to_query(&self) -> Vec<(String, String)> {
        vec![
            ("originLocationCode".to_string(), self.origin.to_uppercase()),
            (
                "destinationLocationCode".to_string(),
                self.destination.to_uppercase(),
            ),
            ("departureDate".to_string(), self.departure_date.clone()),
            ("adults".to_string(), self.adults.to_string()),
            ("nonStop".to_string(), self.non_stop.to_string()),
            ("max".to_string(), self.max_results.to_string()),
            ("currencyCode".to_string(), self.currency.clone()),
        ]
    }
}

/// Hotel search parameters, already validated by the route layer.
#[derive(Debug, Clone)]
pub struct HotelSearchParams {
    pub city_code: String,
    pub check_in_date: String,
    pub check_out_date: String,
}

impl HotelSearchParams {
    pub fn new(
        city_code: impl Into<String>,
        check_in_date: impl Into<String>,
        check_out_date: impl Into<String>,
    ) -> Self {
        Self {
            city_code: city_code.into(),
            check_in_date: check_in_date.into(),
            check_out_date: check_out_date.into(),
        }
    }

    fn to_query(&self) -> Vec<(String, String)> {
        vec![
            ("cityCode".to_string(), self.city_code.clone()),
            ("checkInDate".to_string(), self.check_in_date.clone()),
            ("checkOutDate".to_string(), self.check_out_date.clone()),
        ]
    }
}

/// Deterministic cache key: endpoint identity plus the full parameter set,
/// order-independent.
pub fn cache_key(endpoint: &str, query: &[(String, String)]) -> String {
    let mut pairs: Vec<&(String, String)> = query.iter().collect();
    pairs.sort();
    let joined = pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{endpoint}?{joined}")
}

#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search_flights(
        &self,
        params: &FlightSearchParams,
    ) -> Result<FlightOffersPage, ApiError>;

    /// Hotel offers are returned as the raw upstream payload.
    async fn search_hotels(&self, params: &HotelSearchParams) -> Result<Value, ApiError>;
}

pub struct TravelApiClient {
    transport: Arc<dyn UpstreamTransport>,
    tokens: TokenStore,
    cache: TtlCache<Value>,
    retry: RetryExecutor,
    response_ttl: Duration,
}

impl TravelApiClient {
    pub fn new(config: &ProxyConfig) -> Result<Self, ApiError> {
        let transport: Arc<dyn UpstreamTransport> = Arc::new(HttpTransport::new(config)?);
        Self::with_transport(config, transport)
    }

    /// Compose the client over an externally supplied transport.
    pub fn with_transport(
        config: &ProxyConfig,
        transport: Arc<dyn UpstreamTransport>,
    ) -> Result<Self, ApiError> {
        config.validate()?;
        Ok(Self {
            tokens: TokenStore::new(
                Arc::clone(&transport),
                config.client_id.clone(),
                config.client_secret.clone(),
            ),
            cache: TtlCache::new(config.cache_capacity)?,
            retry: RetryExecutor::new(RetryPolicy {
                max_attempts: config.max_attempts,
                initial_backoff: config.initial_backoff,
            }),
            response_ttl: config.response_ttl,
            transport,
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // Cache, then token, then the retried upstream call. A hit returns
    // without touching the token store or the wire.
    async fn fetch_cached(
        &self,
        endpoint: &str,
        query: &[(String, String)],
    ) -> Result<Value, ApiError> {
        let key = cache_key(endpoint, query);
        if let Some(raw) = self.cache.get(&key) {
            debug!(%key, "cache hit");
            return Ok(raw);
        }

        let bearer = self.tokens.bearer().await?;
        let raw = self
            .retry
            .execute(|| self.transport.get_json(endpoint, query, &bearer))
            .await?;
        self.cache.set(key, raw.clone(), self.response_ttl)?;
        Ok(raw)
    }
}

#[async_trait]
impl SearchApi for TravelApiClient {
    async fn search_flights(
        &self,
        params: &FlightSearchParams,
    ) -> Result<FlightOffersPage, ApiError> {
        let query = params.to_query();
        let raw = self.fetch_cached(FLIGHT_OFFERS_ENDPOINT, &query).await?;
        Ok(normalize::flight_offers(params, &raw))
    }

    async fn search_hotels(&self, params: &HotelSearchParams) -> Result<Value, ApiError> {
        let query = params.to_query();
        self.fetch_cached(HOTEL_OFFERS_ENDPOINT, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::AttemptError;
    use crate::transport::mock::MockTransport;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn client_with(transport: Arc<MockTransport>) -> TravelApiClient {
        let config = ProxyConfig::new("id", "secret");
        TravelApiClient::with_transport(&config, transport).unwrap()
    }

    fn flight_params() -> FlightSearchParams {
        FlightSearchParams {
            adults: 1,
            ..FlightSearchParams::new("BLR", "DXB", "2026-04-30")
        }
    }

    #[test]
    fn cache_key_is_order_independent() {
        let forward = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        let reversed = vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ];
        assert_eq!(
            cache_key("/v2/shopping/flight-offers", &forward),
            cache_key("/v2/shopping/flight-offers", &reversed)
        );
    }

    #[test]
    fn cache_key_distinguishes_endpoints() {
        let query = vec![("a".to_string(), "1".to_string())];
        assert_ne!(
            cache_key(FLIGHT_OFFERS_ENDPOINT, &query),
            cache_key(HOTEL_OFFERS_ENDPOINT, &query)
        );
    }

    #[tokio::test]
    async fn repeated_search_hits_upstream_once() {
        let transport = Arc::new(MockTransport {
            search_response: json!({ "data": [{ "id": "1" }] }),
            ..Default::default()
        });
        let client = client_with(Arc::clone(&transport));

        let first = client.search_flights(&flight_params()).await.unwrap();
        let second = client.search_flights(&flight_params()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.count, 1);
        assert_eq!(transport.search_calls.load(Ordering::SeqCst), 1);
        // the cache hit never re-touches the token store
        assert_eq!(transport.exchange_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.cache_stats().hit_count, 1);
    }

    #[tokio::test]
    async fn different_params_miss_the_cache() {
        let transport = Arc::new(MockTransport::default());
        let client = client_with(Arc::clone(&transport));

        client.search_flights(&flight_params()).await.unwrap();
        let other = FlightSearchParams::new("BLR", "SIN", "2026-04-30");
        client.search_flights(&other).await.unwrap();

        assert_eq!(transport.search_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn hotels_return_raw_upstream_payload() {
        let payload = json!({ "data": [{ "hotel": { "hotelId": "DELHOTEL" } }] });
        let transport = Arc::new(MockTransport {
            search_response: payload.clone(),
            ..Default::default()
        });
        let client = client_with(Arc::clone(&transport));

        let params = HotelSearchParams::new("DEL", "2026-05-01", "2026-05-03");
        let raw = client.search_hotels(&params).await.unwrap();
        assert_eq!(raw, payload);

        // cached on the second call
        client.search_hotels(&params).await.unwrap();
        assert_eq!(transport.search_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn authentication_failure_propagates_before_any_search() {
        let transport = Arc::new(MockTransport {
            fail_exchange: true,
            ..Default::default()
        });
        let client = client_with(Arc::clone(&transport));

        let err = client.search_flights(&flight_params()).await.unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
        assert_eq!(transport.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_retryable_upstream_error_is_not_cached() {
        let transport = Arc::new(MockTransport::default());
        transport
            .scripted_failures
            .lock()
            .push_back(AttemptError::Http {
                status: 400,
                message: "bad request".to_string(),
            });
        let client = client_with(Arc::clone(&transport));

        let err = client.search_flights(&flight_params()).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(transport.search_calls.load(Ordering::SeqCst), 1);

        // a failed call leaves nothing behind; the next one goes upstream
        client.search_flights(&flight_params()).await.unwrap();
        assert_eq!(transport.search_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_then_cached() {
        let transport = Arc::new(MockTransport::default());
        {
            let mut failures = transport.scripted_failures.lock();
            failures.push_back(AttemptError::Network("connection reset".to_string()));
            failures.push_back(AttemptError::Http {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        let client = client_with(Arc::clone(&transport));

        client.search_flights(&flight_params()).await.unwrap();
        assert_eq!(transport.search_calls.load(Ordering::SeqCst), 3);

        client.search_flights(&flight_params()).await.unwrap();
        assert_eq!(transport.search_calls.load(Ordering::SeqCst), 3);
    }
}
