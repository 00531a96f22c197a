// Flight-offer response simplification. The upstream payload is deeply
// nested; the route layer only needs price, duration, and per-segment
// timings. Missing fields are tolerated, never an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::FlightSearchParams;

/// Echo of the search the offers answer, as the route layer returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightQuery {
    pub origin: String,
    pub destination: String,
    #[serde(rename = "departureDate")]
    pub departure_date: String,
    pub adults: u32,
    #[serde(rename = "nonStop")]
    pub non_stop: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightOffersPage {
    pub query: FlightQuery,
    pub count: usize,
    pub offers: Vec<FlightOffer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightOffer {
    pub id: Option<String>,
    pub total: Option<String>,
    pub currency: Option<String>,
    /// ISO-8601 duration of the first itinerary.
    pub duration: Option<String>,
    pub segments: Vec<FlightSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSegment {
    #[serde(rename = "from")]
    pub origin: Option<String>,
    #[serde(rename = "to")]
    pub destination: Option<String>,
    #[serde(rename = "departAt")]
    pub depart_at: Option<String>,
    #[serde(rename = "arriveAt")]
    pub arrive_at: Option<String>,
    pub carrier: Option<String>,
    #[serde(rename = "flightNumber")]
    pub flight_number: Option<String>,
    #[serde(rename = "segmentDuration")]
    pub segment_duration: Option<String>,
}

/// Simplify a raw flight-offers payload into the shape exposed to callers.
pub fn flight_offers(params: &FlightSearchParams, raw: &Value) -> FlightOffersPage {
    let offers: Vec<FlightOffer> = raw
        .get("data")
        .and_then(Value::as_array)
        .map(|data| data.iter().map(offer).collect())
        .unwrap_or_default();

    FlightOffersPage {
        query: FlightQuery {
            origin: params.origin.to_uppercase(),
            destination: params.destination.to_uppercase(),
            departure_date: params.departure_date.clone(),
            adults: params.adults,
            non_stop: params.non_stop,
        },
        count: offers.len(),
        offers,
    }
}

fn offer(raw: &Value) -> FlightOffer {
    let first_itinerary = raw
        .get("itineraries")
        .and_then(Value::as_array)
        .and_then(|itineraries| itineraries.first());
    let segments = first_itinerary
        .and_then(|itinerary| itinerary.get("segments"))
        .and_then(Value::as_array)
        .map(|segments| segments.iter().map(segment).collect())
        .unwrap_or_default();

    FlightOffer {
        id: text(raw.get("id")),
        total: text(raw.pointer("/price/total")),
        currency: text(raw.pointer("/price/currency")),
        duration: text(first_itinerary.and_then(|itinerary| itinerary.get("duration"))),
        segments,
    }
}

fn segment(raw: &Value) -> FlightSegment {
    FlightSegment {
        origin: text(raw.pointer("/departure/iataCode")),
        destination: text(raw.pointer("/arrival/iataCode")),
        depart_at: text(raw.pointer("/departure/at")),
        arrive_at: text(raw.pointer("/arrival/at")),
        carrier: text(raw.get("carrierCode")),
        flight_number: text(raw.get("number")),
        segment_duration: text(raw.get("duration")),
    }
}

// Upstream is loose about string vs number fields (flight numbers, prices).
fn text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
