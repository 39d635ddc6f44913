//! Geocoding client.
//!
//! Thin wrapper over the Google Maps geocoding endpoint. Forward lookups
//! turn free text into coordinates; reverse lookups turn a coordinate pair
//! into a formatted address. "No results" is an absence (`Ok(None)`), not
//! an error — callers decide whether to re-prompt.

use crate::config::GeocodeConfig;
use crate::error::GeocodeError;
use serde::Deserialize;
use std::time::Duration;

/// First entry of the provider's result list.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeEntry>,
}

#[derive(Debug, Deserialize)]
struct GeocodeEntry {
    geometry: Geometry,
    formatted_address: String,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl From<GeocodeEntry> for Place {
    fn from(entry: GeocodeEntry) -> Self {
        Self {
            lat: entry.geometry.location.lat,
            lng: entry.geometry.location.lng,
            formatted_address: entry.formatted_address,
        }
    }
}

/// Stateless geocoding client with a bounded per-request timeout.
#[derive(Debug, Clone)]
pub struct GeocodeClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GeocodeClient {
    /// Build a client from configuration.
    ///
    /// Fails if the underlying HTTP client cannot be constructed; callers
    /// treat that as fatal at startup. Succeeding here guarantees the
    /// configured timeout is in effect for every request.
    pub fn new(config: &GeocodeConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Forward geocode: address text -> first matching place.
    ///
    /// The query is trimmed before sending; percent-encoding is handled by
    /// the URL query builder.
    pub async fn forward(&self, query: &str) -> Result<Option<Place>, GeocodeError> {
        let query = query.trim();
        self.lookup(&[("address", query)]).await
    }

    /// Reverse geocode: coordinate pair -> first matching place.
    pub async fn reverse(&self, lat: f64, lng: f64) -> Result<Option<Place>, GeocodeError> {
        let latlng = latlng_key(lat, lng);
        self.lookup(&[("latlng", latlng.as_str())]).await
    }

    async fn lookup(&self, params: &[(&str, &str)]) -> Result<Option<Place>, GeocodeError> {
        let mut request = self.client.get(&self.endpoint).query(params);
        if let Some(ref key) = self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Endpoint(status.as_u16()));
        }

        let body: GeocodeResponse = response.json().await?;
        if body.status == "ZERO_RESULTS" {
            return Ok(None);
        }
        match body.results.into_iter().next() {
            Some(entry) => Ok(Some(Place::from(entry))),
            // An OK status with an empty result list is still "nothing found";
            // any other status without results is a provider error
            None if body.status == "OK" => Ok(None),
            None => Err(GeocodeError::Provider(body.status)),
        }
    }
}

/// Format a coordinate pair as the provider's `latlng` key.
///
/// The provider rejects whitespace between the pair, and integral
/// coordinates keep their fractional point (`40.0`, not `40`).
pub fn latlng_key(lat: f64, lng: f64) -> String {
    format!("{},{}", fmt_coord(lat), fmt_coord(lng))
}

fn fmt_coord(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
