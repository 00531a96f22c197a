// Upstream-access core for the travel search proxy: OAuth2 token lifecycle,
// TTL response caching, and retry/backoff around the third-party travel API.
// The HTTP route layer lives outside this crate and talks to `SearchApi`.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod normalize;
pub mod retry;
pub mod token;
pub mod transport;

// Re-export key types for convenience
pub use cache::{CacheStats, TtlCache};
pub use client::{
    cache_key, FlightSearchParams, HotelSearchParams, SearchApi, TravelApiClient,
    FLIGHT_OFFERS_ENDPOINT, HOTEL_OFFERS_ENDPOINT,
};
pub use config::ProxyConfig;
pub use error::ApiError;
pub use normalize::{FlightOffer, FlightOffersPage, FlightSegment};
pub use retry::{AttemptError, RetryExecutor, RetryPolicy};
pub use token::{TokenResponse, TokenStore};
pub use transport::{HttpTransport, UpstreamTransport};
