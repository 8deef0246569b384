//! Location resolution for provider records: structured-address extraction
//! with false-positive filters, then geocoding fallbacks, coarsest last.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use dpcmap_core::{LocationFix, UNKNOWN_CITY, UNKNOWN_STATE, UNKNOWN_ZIP};
use dpcmap_storage::{FetchError, HttpClientConfig, HttpFetcher, MinIntervalGate};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "dpcmap-geo";

/// 50 states plus DC and PR. Anything else is a false positive.
const US_STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "PR", "RI", "SC", "SD", "TN", "TX",
    "UT", "VT", "VA", "WA", "WV", "WI", "WY",
];

/// Three-digit ZIP prefixes assigned to Maryland. "MD" in scraped text is
/// more often a physician title than a state; a geocode that claims MD must
/// carry a ZIP from this set or it is rejected.
const MD_ZIP_PREFIXES: &[&str] = &[
    "206", "207", "208", "209", "210", "211", "212", "214", "215", "216", "217", "218", "219",
];

/// Credential/suffix tokens that mark a "city" as a person-name fragment.
const NAME_SUFFIXES: &[&str] = &[
    "MD", "DO", "PHD", "JR", "SR", "II", "III", "IV", "NP", "PA", "DNP", "FNP", "RN",
];

/// Curated high-frequency American first names; a bare one of these in the
/// city slot is near-certainly a physician name fragment.
const COMMON_FIRST_NAMES: &[&str] = &[
    "aaron", "amy", "andrew", "angela", "anna", "barbara", "benjamin", "brian", "carol",
    "charles", "christopher", "cynthia", "daniel", "david", "deborah", "donald", "donna",
    "edward", "elizabeth", "emily", "eric", "heather", "helen", "jacob", "james", "jason",
    "jeffrey", "jennifer", "jessica", "john", "jonathan", "joseph", "joshua", "karen",
    "katherine", "kathleen", "kevin", "kimberly", "laura", "linda", "lisa", "margaret",
    "maria", "mark", "mary", "matthew", "melissa", "michael", "michelle", "nancy",
    "nicholas", "patricia", "paul", "rachel", "rebecca", "richard", "robert", "ronald",
    "ryan", "sandra", "sarah", "scott", "sharon", "stephanie", "stephen", "steven", "susan",
    "thomas", "timothy", "william",
];

static STATE_NAMES: LazyLock<Vec<(&'static str, &'static str)>> = LazyLock::new(|| {
    vec![
        ("alabama", "AL"), ("alaska", "AK"), ("arizona", "AZ"), ("arkansas", "AR"),
        ("california", "CA"), ("colorado", "CO"), ("connecticut", "CT"), ("delaware", "DE"),
        ("district of columbia", "DC"), ("florida", "FL"), ("georgia", "GA"), ("hawaii", "HI"),
        ("idaho", "ID"), ("illinois", "IL"), ("indiana", "IN"), ("iowa", "IA"),
        ("kansas", "KS"), ("kentucky", "KY"), ("louisiana", "LA"), ("maine", "ME"),
        ("maryland", "MD"), ("massachusetts", "MA"), ("michigan", "MI"), ("minnesota", "MN"),
        ("mississippi", "MS"), ("missouri", "MO"), ("montana", "MT"), ("nebraska", "NE"),
        ("nevada", "NV"), ("new hampshire", "NH"), ("new jersey", "NJ"), ("new mexico", "NM"),
        ("new york", "NY"), ("north carolina", "NC"), ("north dakota", "ND"), ("ohio", "OH"),
        ("oklahoma", "OK"), ("oregon", "OR"), ("pennsylvania", "PA"), ("puerto rico", "PR"),
        ("rhode island", "RI"), ("south carolina", "SC"), ("south dakota", "SD"),
        ("tennessee", "TN"), ("texas", "TX"), ("utah", "UT"), ("vermont", "VT"),
        ("virginia", "VA"), ("washington", "WA"), ("west virginia", "WV"),
        ("wisconsin", "WI"), ("wyoming", "WY"),
    ]
});

// Street-type token, then city, 2-letter state, ZIP. The optional
// suite/unit segment between street and city is consumed, not captured.
static STREET_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\d+\s+[A-Za-z0-9 .'-]+?\b(?:st|street|ave|avenue|blvd|boulevard|dr|drive|rd|road|ln|lane|way|pkwy|parkway|ct|court|pl|place|hwy|highway|cir|circle|ter|terrace)\b\.?\s*,?\s*(?:(?:ste|suite|unit|bldg|#)\s*\.?\s*[A-Za-z0-9-]+\s*,?\s*)?([A-Za-z][A-Za-z .'-]{2,}?)\s*,\s*([A-Za-z]{2})\s+(\d{5})(?:-\d{4})?",
    )
    .expect("street block regex compiles")
});

static CITY_ST_ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z][A-Za-z .'-]{2,}?)\s*,\s*([A-Za-z]{2})\s+(\d{5})(?:-\d{4})?")
        .expect("city/state/zip regex compiles")
});

pub fn valid_state_code(code: &str) -> bool {
    US_STATE_CODES.contains(&code)
}

pub fn state_code_for(name_or_code: &str) -> Option<&'static str> {
    let trimmed = name_or_code.trim();
    if trimmed.len() == 2 {
        let upper = trimmed.to_ascii_uppercase();
        return US_STATE_CODES.iter().find(|c| **c == upper).copied();
    }
    let lower = trimmed.to_ascii_lowercase();
    STATE_NAMES.iter().find(|(n, _)| *n == lower).map(|(_, c)| *c)
}

/// The MD guard: "MD" followed by a non-Maryland ZIP is a physician title
/// misread as a state, not an address.
pub fn state_zip_consistent(state: &str, zip: &str) -> bool {
    if state != "MD" {
        return true;
    }
    zip.len() == 5 && MD_ZIP_PREFIXES.contains(&&zip[..3])
}

/// Whether a captured "city" string is plausibly a city rather than a
/// fragment of the provider's own name.
pub fn plausible_city(city: &str, provider_name: &str) -> bool {
    let city = city.trim();
    if city.len() < 3 {
        return false;
    }
    let city_lower = city.to_ascii_lowercase();
    if COMMON_FIRST_NAMES.contains(&city_lower.as_str()) {
        return false;
    }
    let last_token = city
        .rsplit(|c: char| c.is_whitespace() || c == '.' || c == ',')
        .find(|t| !t.is_empty())
        .unwrap_or("");
    if NAME_SUFFIXES.contains(&last_token.to_ascii_uppercase().as_str()) {
        return false;
    }
    let name_lower = provider_name.to_ascii_lowercase();
    for token in city_lower.split_whitespace() {
        if token.len() >= 3 && name_lower.contains(token) {
            return false;
        }
    }
    true
}

fn sanity_check(city: &str, state: &str, zip: &str, provider_name: &str) -> bool {
    valid_state_code(state) && state_zip_consistent(state, zip) && plausible_city(city, provider_name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoPrecision {
    /// City/state/zip read directly out of an address block.
    Address,
    /// Forward or city-level geocode hit.
    Locality,
    /// ZIP centroid only: an approximate point, not a street location.
    ZipCentroid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationData {
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub precision: GeoPrecision,
}

impl LocationData {
    pub fn has_known_trio(&self) -> bool {
        self.state != UNKNOWN_STATE
    }

    pub fn fix(&self) -> Option<LocationFix> {
        if !self.has_known_trio() {
            return None;
        }
        Some(LocationFix {
            city: self.city.clone(),
            state: self.state.clone(),
            zip_code: self.zip_code.clone(),
        })
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// Everything the resolver may draw on for one provider.
#[derive(Debug, Clone, Default)]
pub struct LocationInput {
    pub raw_text: String,
    pub city_hint: Option<String>,
    pub state_hint: Option<String>,
    pub zip_hint: Option<String>,
    pub provider_name: String,
}

impl LocationInput {
    fn hint(value: &Option<String>, sentinel: &str) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != sentinel)
            .map(str::to_string)
    }

    fn city(&self) -> Option<String> {
        Self::hint(&self.city_hint, UNKNOWN_CITY)
    }

    fn state(&self) -> Option<String> {
        Self::hint(&self.state_hint, UNKNOWN_STATE)
    }

    fn zip(&self) -> Option<String> {
        Self::hint(&self.zip_hint, UNKNOWN_ZIP)
    }

    /// The fullest address string we can assemble for forward geocoding.
    fn fullest_query(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let raw = self.raw_text.trim();
        if !raw.is_empty() {
            parts.push(raw.to_string());
        }
        for piece in [self.city(), self.state(), self.zip()].into_iter().flatten() {
            if !raw.to_ascii_lowercase().contains(&piece.to_ascii_lowercase()) {
                parts.push(piece);
            }
        }
        parts.join(", ")
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected geocoder payload: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

/// Forward and postal-code geocoding. Implementations resolve a free-text
/// query to at most one point; `None` means the service had no answer.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn forward(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError>;
    async fn zip_centroid(&self, zip: &str) -> Result<Option<GeoPoint>, GeocodeError>;
}

/// Decorator that holds every call to the wrapped geocoder at least
/// `min_interval` apart. Public geocoding endpoints block callers above
/// ~1 request/second.
pub struct RateLimitedGeocoder<G> {
    inner: G,
    gate: MinIntervalGate,
}

impl<G: Geocoder> RateLimitedGeocoder<G> {
    pub fn new(inner: G, min_interval: Duration) -> Self {
        Self {
            inner,
            gate: MinIntervalGate::new(min_interval),
        }
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for RateLimitedGeocoder<G> {
    async fn forward(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        self.gate.wait_turn().await;
        self.inner.forward(query).await
    }

    async fn zip_centroid(&self, zip: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        self.gate.wait_turn().await;
        self.inner.zip_centroid(zip).await
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize, Default)]
struct NominatimAddress {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    town: Option<String>,
    #[serde(default)]
    village: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    postcode: Option<String>,
}

/// Nominatim-compatible geocoder over plain HTTP.
pub struct NominatimGeocoder {
    http: HttpFetcher,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(endpoint: impl Into<String>, user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout,
            user_agent: Some(user_agent.to_string()),
            ..Default::default()
        })?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn search(&self, params: &[(&str, &str)]) -> Result<Option<GeoPoint>, GeocodeError> {
        let url = reqwest::Url::parse_with_params(&format!("{}/search", self.endpoint), params)
            .map_err(|e| GeocodeError::Decode(e.to_string()))?;
        let page = self.http.fetch("geocoder", url.as_str()).await?;
        let places: Vec<NominatimPlace> = serde_json::from_slice(&page.body)
            .map_err(|e| GeocodeError::Decode(e.to_string()))?;
        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };
        let latitude = place
            .lat
            .parse::<f64>()
            .map_err(|e| GeocodeError::Decode(format!("latitude: {e}")))?;
        let longitude = place
            .lon
            .parse::<f64>()
            .map_err(|e| GeocodeError::Decode(format!("longitude: {e}")))?;
        let address = place.address.unwrap_or_default();
        Ok(Some(GeoPoint {
            latitude,
            longitude,
            city: address.city.or(address.town).or(address.village),
            state: address.state.as_deref().and_then(state_code_for).map(str::to_string),
            zip_code: address.postcode.map(|p| p.chars().take(5).collect()),
        }))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn forward(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        self.search(&[
            ("format", "jsonv2"),
            ("limit", "1"),
            ("addressdetails", "1"),
            ("countrycodes", "us"),
            ("q", query),
        ])
        .await
    }

    async fn zip_centroid(&self, zip: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        self.search(&[
            ("format", "jsonv2"),
            ("limit", "1"),
            ("addressdetails", "1"),
            ("country", "us"),
            ("postalcode", zip),
        ])
        .await
    }
}

/// Strategies 1 and 2: pure text extraction, no network. Scans for a
/// structured address block first, then a bare `City, ST ZIP`, applying the
/// state/ZIP and name-like-city filters to every capture.
pub fn extract_from_text(input: &LocationInput) -> Option<LocationData> {
    let text = input.raw_text.as_str();
    for caps in STREET_BLOCK_RE.captures_iter(text) {
        if let Some(found) = accept_captures(&caps, input) {
            return Some(found);
        }
    }
    for caps in CITY_ST_ZIP_RE.captures_iter(text) {
        if let Some(found) = accept_captures(&caps, input) {
            return Some(found);
        }
    }
    None
}

fn accept_captures(caps: &regex::Captures<'_>, input: &LocationInput) -> Option<LocationData> {
    let city = caps.get(1)?.as_str().trim();
    let state = caps.get(2)?.as_str().to_ascii_uppercase();
    let zip = caps.get(3)?.as_str();
    if !sanity_check(city, &state, zip, &input.provider_name) {
        debug!(city, state, zip, "rejected address-block candidate");
        return None;
    }
    Some(LocationData {
        city: city.to_string(),
        state,
        zip_code: zip.to_string(),
        latitude: None,
        longitude: None,
        precision: GeoPrecision::Address,
    })
}

/// The fallback chain. Strategies run in order, first success wins, and a
/// validation rejection just falls through to the next strategy.
pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
}

impl LocationResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    pub async fn resolve(&self, input: &LocationInput) -> Option<LocationData> {
        if let Some(found) = extract_from_text(input) {
            return Some(found);
        }
        self.geocode_chain(input).await
    }

    /// Strategies 3-5 only: coordinate backfill for rows whose trio is
    /// already known.
    pub async fn coordinates_only(&self, input: &LocationInput) -> Option<LocationData> {
        self.geocode_chain(input).await
    }

    async fn geocode_chain(&self, input: &LocationInput) -> Option<LocationData> {
        // Strategy 3: forward geocode of the fullest address string.
        let query = input.fullest_query();
        if !query.is_empty() {
            match self.geocoder.forward(&query).await {
                Ok(Some(point)) => {
                    if let Some(found) = self.assemble(input, point, GeoPrecision::Locality) {
                        return Some(found);
                    }
                }
                Ok(None) => {}
                Err(err) => debug!(%err, "forward geocode failed"),
            }
        }

        // Strategy 4: city+state only.
        if let (Some(city), Some(state)) = (input.city(), input.state()) {
            let query = format!("{city}, {state}, USA");
            match self.geocoder.forward(&query).await {
                Ok(Some(point)) => {
                    if let Some(found) = self.assemble(input, point, GeoPrecision::Locality) {
                        return Some(found);
                    }
                }
                Ok(None) => {}
                Err(err) => debug!(%err, "city/state geocode failed"),
            }
        }

        // Strategy 5: ZIP centroid, coarse by construction.
        if let Some(zip) = input.zip() {
            match self.geocoder.zip_centroid(&zip).await {
                Ok(Some(point)) => {
                    if let Some(found) = self.assemble(input, point, GeoPrecision::ZipCentroid) {
                        return Some(found);
                    }
                }
                Ok(None) => {}
                Err(err) => debug!(%err, "zip centroid geocode failed"),
            }
        }

        None
    }

    /// Merge a geocoder hit with the input hints into a validated record.
    /// Hints win over the service's own address parts; an implausible trio
    /// degrades to sentinels rather than rejecting the coordinates.
    fn assemble(
        &self,
        input: &LocationInput,
        point: GeoPoint,
        precision: GeoPrecision,
    ) -> Option<LocationData> {
        let city = input.city().or(point.city);
        let state = input
            .state()
            .as_deref()
            .and_then(state_code_for)
            .map(str::to_string)
            .or(point.state);
        let zip = input.zip().or(point.zip_code);

        let trio = match (city, state, zip) {
            (Some(city), Some(state), Some(zip))
                if sanity_check(&city, &state, &zip, &input.provider_name) =>
            {
                Some((city, state, zip))
            }
            _ => None,
        };

        let (city, state, zip_code) = trio.unwrap_or((
            UNKNOWN_CITY.to_string(),
            UNKNOWN_STATE.to_string(),
            UNKNOWN_ZIP.to_string(),
        ));
        Some(LocationData {
            city,
            state,
            zip_code,
            latitude: Some(point.latitude),
            longitude: Some(point.longitude),
            precision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted geocoder: fixed answers, counts calls.
    struct StubGeocoder {
        forward_answer: Option<GeoPoint>,
        zip_answer: Option<GeoPoint>,
        forward_calls: AtomicUsize,
        zip_calls: AtomicUsize,
    }

    impl StubGeocoder {
        fn new(forward_answer: Option<GeoPoint>, zip_answer: Option<GeoPoint>) -> Self {
            Self {
                forward_answer,
                zip_answer,
                forward_calls: AtomicUsize::new(0),
                zip_calls: AtomicUsize::new(0),
            }
        }

        fn silent() -> Self {
            Self::new(None, None)
        }
    }

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn forward(&self, _query: &str) -> Result<Option<GeoPoint>, GeocodeError> {
            self.forward_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.forward_answer.clone())
        }

        async fn zip_centroid(&self, _zip: &str) -> Result<Option<GeoPoint>, GeocodeError> {
            self.zip_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.zip_answer.clone())
        }
    }

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint {
            latitude: lat,
            longitude: lng,
            city: Some("Fuzzyville".to_string()),
            state: Some("KS".to_string()),
            zip_code: Some("66000".to_string()),
        }
    }

    fn input(raw: &str, name: &str) -> LocationInput {
        LocationInput {
            raw_text: raw.to_string(),
            provider_name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn structured_block_wins_over_forward_geocode() {
        let stub = Arc::new(StubGeocoder::new(Some(point(38.0, -97.0)), None));
        let resolver = LocationResolver::new(stub.clone());
        let found = resolver
            .resolve(&input(
                "Visit us at 123 Main St, Springfield, IL 62704 or call anytime",
                "Example Family Medicine",
            ))
            .await
            .expect("resolved");
        assert_eq!(found.city, "Springfield");
        assert_eq!(found.state, "IL");
        assert_eq!(found.zip_code, "62704");
        assert_eq!(found.precision, GeoPrecision::Address);
        assert_eq!(stub.forward_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn name_like_city_is_rejected() {
        let resolver = LocationResolver::new(Arc::new(StubGeocoder::silent()));
        let found = resolver
            .resolve(&input("Bukie, MD 20175", "Dr. Amara Bukie Family Care"))
            .await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn md_state_requires_maryland_zip_prefix() {
        let resolver = LocationResolver::new(Arc::new(StubGeocoder::silent()));
        assert!(resolver
            .resolve(&input("Baltimore, MD 10001", "Harbor Direct Care"))
            .await
            .is_none());

        let found = resolver
            .resolve(&input("Baltimore, MD 21201", "Harbor Direct Care"))
            .await
            .expect("valid MD zip accepted");
        assert_eq!(found.state, "MD");
        assert_eq!(found.zip_code, "21201");
    }

    #[tokio::test]
    async fn invalid_state_code_is_rejected() {
        let resolver = LocationResolver::new(Arc::new(StubGeocoder::silent()));
        assert!(resolver
            .resolve(&input("Springfield, ZZ 62704", "Example Family Medicine"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn common_first_name_city_is_rejected() {
        let resolver = LocationResolver::new(Arc::new(StubGeocoder::silent()));
        assert!(resolver
            .resolve(&input("Jennifer, TX 75001", "Lakeside Primary Care"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn falls_back_to_forward_geocode_when_no_block_parses() {
        let stub = Arc::new(StubGeocoder::new(Some(point(39.78, -89.65)), None));
        let resolver = LocationResolver::new(stub.clone());
        let mut inp = input("somewhere on the prairie", "Example Family Medicine");
        inp.city_hint = Some("Springfield".to_string());
        inp.state_hint = Some("IL".to_string());
        inp.zip_hint = Some("62704".to_string());

        let found = resolver.resolve(&inp).await.expect("resolved");
        assert_eq!(found.coordinates(), Some((39.78, -89.65)));
        assert_eq!(found.city, "Springfield");
        assert_eq!(found.precision, GeoPrecision::Locality);
        assert_eq!(stub.forward_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zip_centroid_is_the_last_resort() {
        let stub = Arc::new(StubGeocoder::new(None, Some(point(39.75, -89.60))));
        let resolver = LocationResolver::new(stub.clone());
        let mut inp = input("", "Example Family Medicine");
        inp.zip_hint = Some("62704".to_string());

        let found = resolver.resolve(&inp).await.expect("resolved");
        assert_eq!(found.precision, GeoPrecision::ZipCentroid);
        assert!(found.coordinates().is_some());
        assert!(stub.zip_calls.load(Ordering::SeqCst) == 1);
    }

    #[tokio::test]
    async fn exhausted_chain_yields_none() {
        let resolver = LocationResolver::new(Arc::new(StubGeocoder::silent()));
        let mut inp = input("", "Example Family Medicine");
        inp.zip_hint = Some("62704".to_string());
        assert!(resolver.resolve(&inp).await.is_none());
    }

    #[tokio::test]
    async fn rate_limited_geocoder_spaces_calls() {
        let limited = RateLimitedGeocoder::new(
            StubGeocoder::new(Some(point(1.0, 2.0)), None),
            Duration::from_millis(25),
        );
        let started = std::time::Instant::now();
        for _ in 0..3 {
            limited.forward("anything").await.expect("forward");
        }
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn state_names_map_to_codes() {
        assert_eq!(state_code_for("Illinois"), Some("IL"));
        assert_eq!(state_code_for("il"), Some("IL"));
        assert_eq!(state_code_for("Atlantis"), None);
    }

    #[test]
    fn suffix_bearing_city_is_implausible() {
        assert!(!plausible_city("John Smith MD", "Smith Family Care"));
        assert!(plausible_city("Baltimore", "Harbor Direct Care"));
    }
}
