use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::Coordinate;
use crate::error::JobError;

/// Live address lookup. `Ok(None)` means the service answered but found nothing usable.
pub trait GeocodeClient: Send + Sync {
    fn lookup(&self, address: &str) -> Result<Option<Coordinate>, JobError>;
}

#[derive(Clone)]
pub struct GeocodeHttpClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(default)]
    location: Option<Coordinate>,
}

impl GeocodeHttpClient {
    pub fn new(api_key: &str) -> Result<Self, JobError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("relief-jobs/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| JobError::GeocodeHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| JobError::GeocodeHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn request_url(&self, address: &str) -> Result<reqwest::Url, JobError> {
        reqwest::Url::parse_with_params(
            &self.endpoint,
            &[
                ("address", address),
                ("key", self.api_key.as_str()),
                ("language", "ja"),
            ],
        )
        .map_err(|err| JobError::GeocodeHttp(err.to_string()))
    }
}

impl GeocodeClient for GeocodeHttpClient {
    fn lookup(&self, address: &str) -> Result<Option<Coordinate>, JobError> {
        let url = self.request_url(address)?;
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| JobError::GeocodeHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "geocoding request failed".to_string());
            return Err(JobError::GeocodeStatus { status, message });
        }
        let body: GeocodeResponse = response
            .json()
            .map_err(|err| JobError::GeocodeHttp(err.to_string()))?;
        Ok(first_location(body))
    }
}

fn first_location(body: GeocodeResponse) -> Option<Coordinate> {
    if body.status != "OK" {
        return None;
    }
    body.results
        .into_iter()
        .next()
        .and_then(|result| result.geometry)
        .and_then(|geometry| geometry.location)
}

/// Anything that can turn an address into a coordinate during ingestion.
pub trait Locator {
    fn locate(&mut self, address: &str) -> Option<Coordinate>;
}

/// Hand-curated coordinates for places the live service is known to get wrong.
///
/// Keys match as substrings of the full address, first entry wins.
#[derive(Debug, Clone, Default)]
pub struct StaticOverrides {
    entries: Vec<(String, Coordinate)>,
}

impl StaticOverrides {
    pub fn new(entries: Vec<(String, Coordinate)>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            ("舳倉島".to_string(), Coordinate::new(37.8497, 136.9197)),
            ("能登空港".to_string(), Coordinate::new(37.2925, 136.962)),
        ])
    }

    /// Adds or replaces entries. Replaced keys keep their original position.
    pub fn extend(&mut self, extra: BTreeMap<String, Coordinate>) {
        for (key, coordinate) in extra {
            match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
                Some(entry) => entry.1 = coordinate,
                None => self.entries.push((key, coordinate)),
            }
        }
    }

    pub fn lookup(&self, address: &str) -> Option<Coordinate> {
        self.entries
            .iter()
            .find(|(key, _)| address.contains(key.as_str()))
            .map(|(_, coordinate)| *coordinate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodeStats {
    pub override_hits: usize,
    pub cache_hits: usize,
    pub live_calls: usize,
    pub unresolved: usize,
}

/// Three-tier address resolver: static overrides, then the in-memory cache, then the
/// live client. Only successful live answers are cached.
pub struct GeocodeResolver<G: GeocodeClient> {
    client: G,
    overrides: StaticOverrides,
    cache: HashMap<String, Coordinate>,
    stats: GeocodeStats,
}

impl<G: GeocodeClient> GeocodeResolver<G> {
    pub fn new(client: G, overrides: StaticOverrides) -> Self {
        Self {
            client,
            overrides,
            cache: HashMap::new(),
            stats: GeocodeStats::default(),
        }
    }

    pub fn resolve(&mut self, address: &str) -> Option<Coordinate> {
        if let Some(coordinate) = self.overrides.lookup(address) {
            self.stats.override_hits += 1;
            return Some(coordinate);
        }
        if let Some(coordinate) = self.cache.get(address) {
            self.stats.cache_hits += 1;
            return Some(*coordinate);
        }

        self.stats.live_calls += 1;
        match self.client.lookup(address) {
            Ok(Some(coordinate)) => {
                debug!(address, lat = coordinate.lat, lng = coordinate.lng, "geocoded");
                self.cache.insert(address.to_string(), coordinate);
                Some(coordinate)
            }
            Ok(None) => {
                self.stats.unresolved += 1;
                warn!(address, "geocoding returned no usable result");
                None
            }
            Err(err) => {
                self.stats.unresolved += 1;
                warn!(address, error = %err, "geocoding failed");
                None
            }
        }
    }

    pub fn stats(&self) -> GeocodeStats {
        self.stats
    }

    pub fn cached(&self, address: &str) -> Option<Coordinate> {
        self.cache.get(address).copied()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn client(&self) -> &G {
        &self.client
    }
}

impl<G: GeocodeClient> Locator for GeocodeResolver<G> {
    fn locate(&mut self, address: &str) -> Option<Coordinate> {
        self.resolve(address)
    }
}
