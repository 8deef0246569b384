//! Source adapters for the enrichment pipeline: page rendering, per-source
//! fetchers with tagged payload types, pattern-table field extractors, and
//! practice-website discovery.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use dpcmap_core::{PricingConfidence, PricingTier, ProviderCandidate};
use dpcmap_storage::{FetchError, HttpFetcher};
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "dpcmap-adapters";

/// Source names as recorded in provider attribution rows.
pub const FRONTIER_SOURCE: &str = "frontier";
pub const ALLIANCE_SOURCE: &str = "dpc-alliance";
pub const PRACTICE_WEBSITE_SOURCE: &str = "practice-website";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected payload shape: {0}")]
    Payload(String),
}

// ---------------------------------------------------------------------------
// Page rendering capability
// ---------------------------------------------------------------------------

/// A rendered page: visible text plus any JSON blobs embedded in script tags.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: String,
    pub text: String,
    pub script_json: Vec<JsonValue>,
}

/// Narrow "render and extract" capability: navigate, wait for the page to
/// settle, pull out text content and script-tag JSON. The pipeline only
/// depends on this contract, never on a particular browser or HTTP stack.
/// `Ok(None)` means the source has no such page.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<Option<RenderedPage>, AdapterError>;
}

/// Plain-HTTP renderer. Good enough for server-rendered pages and for map
/// applications that ship their point index in an inline script tag.
pub struct HttpPageRenderer {
    http: HttpFetcher,
}

impl HttpPageRenderer {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PageRenderer for HttpPageRenderer {
    async fn render(&self, url: &str) -> Result<Option<RenderedPage>, AdapterError> {
        let page = match self.http.fetch("renderer", url).await {
            Ok(page) => page,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let html = page.text();
        Ok(Some(RenderedPage {
            final_url: page.final_url,
            text: html_text(&html),
            script_json: embedded_script_json(&html),
        }))
    }
}

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("script regex compiles"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").expect("style regex compiles"));

/// Visible text content of an HTML document, whitespace-collapsed.
pub fn html_text(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, " ");
    let cleaned = STYLE_RE.replace_all(&without_scripts, " ");
    let document = Html::parse_document(&cleaned);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Every script tag body that parses as JSON, in document order.
pub fn embedded_script_json(html: &str) -> Vec<JsonValue> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script").expect("script selector parses");
    document
        .select(&selector)
        .filter_map(|node| {
            let body = node.text().collect::<String>();
            let body = body.trim();
            if body.is_empty() {
                return None;
            }
            serde_json::from_str::<JsonValue>(body).ok()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Frontier map application (primary source)
// ---------------------------------------------------------------------------

/// One pin in the map application's embedded point index.
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierPoint {
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "lat")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "lng", alias = "lon")]
    pub longitude: Option<f64>,
}

/// Full practice record from the map application's JSON endpoint. Field
/// names vary across deploys of the app, hence the aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierPayload {
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "practice", alias = "practiceName")]
    pub practice_name: Option<String>,
    #[serde(default, alias = "street", alias = "address1")]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, alias = "zip", alias = "zipCode", alias = "postal_code")]
    pub zip_code: Option<String>,
    #[serde(default, alias = "lat")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "lng", alias = "lon")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "url")]
    pub website: Option<String>,
    #[serde(default, alias = "contactEmail")]
    pub email: Option<String>,
    #[serde(default, alias = "monthlyFee", alias = "price")]
    pub monthly_fee: Option<f64>,
    #[serde(default, alias = "acceptingPatients", alias = "accepting_new_patients")]
    pub accepting_patients: Option<bool>,
    #[serde(default)]
    pub specialties: Vec<String>,
}

pub fn parse_frontier_payload(bytes: &[u8]) -> Result<FrontierPayload, AdapterError> {
    serde_json::from_slice(bytes).map_err(|e| AdapterError::Payload(e.to_string()))
}

/// Fetch contract for the map source: an index of points, then one raw JSON
/// record per practice. `Ok(None)` is the source's not-found signal.
#[async_trait]
pub trait MapFeed: Send + Sync {
    async fn point_index(&self) -> Result<Vec<FrontierPoint>, AdapterError>;
    async fn practice(&self, id: i64) -> Result<Option<Vec<u8>>, AdapterError>;
}

/// The live map application. The index only exists inside the rendered page,
/// so this leans on a [`PageRenderer`]; individual records are plain JSON.
pub struct FrontierSource {
    renderer: Arc<dyn PageRenderer>,
    http: HttpFetcher,
    base_url: String,
}

impl FrontierSource {
    pub fn new(renderer: Arc<dyn PageRenderer>, http: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            renderer,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn practice_url(&self, id: i64) -> String {
        format!("{}/api/practices/{id}.json", self.base_url)
    }

    fn decode_point_index(blobs: &[JsonValue]) -> Option<Vec<FrontierPoint>> {
        for blob in blobs {
            if let Ok(points) = serde_json::from_value::<Vec<FrontierPoint>>(blob.clone()) {
                if !points.is_empty() {
                    return Some(points);
                }
            }
            for key in ["practices", "points", "markers"] {
                if let Some(inner) = blob.get(key) {
                    if let Ok(points) = serde_json::from_value::<Vec<FrontierPoint>>(inner.clone()) {
                        if !points.is_empty() {
                            return Some(points);
                        }
                    }
                }
            }
        }
        None
    }
}

#[async_trait]
impl MapFeed for FrontierSource {
    async fn point_index(&self) -> Result<Vec<FrontierPoint>, AdapterError> {
        let page = self
            .renderer
            .render(&self.base_url)
            .await?
            .ok_or_else(|| AdapterError::Payload("map application page not found".to_string()))?;
        Self::decode_point_index(&page.script_json).ok_or_else(|| {
            AdapterError::Payload("no point index found in rendered map page".to_string())
        })
    }

    async fn practice(&self, id: i64) -> Result<Option<Vec<u8>>, AdapterError> {
        match self.http.fetch(FRONTIER_SOURCE, &self.practice_url(id)).await {
            Ok(page) => Ok(Some(page.body)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Map a frontier record onto the shared candidate type. Untyped values stop
/// here; everything past this point is the internal candidate shape.
pub fn candidate_from_frontier(payload: &FrontierPayload, base_url: &str) -> Result<ProviderCandidate, AdapterError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AdapterError::Payload(format!(
            "practice record {} has no name",
            payload.id
        )));
    }
    let mut cand = ProviderCandidate::new(FRONTIER_SOURCE, payload.id.to_string());
    cand.source_url = Some(format!(
        "{}/practices/{}",
        base_url.trim_end_matches('/'),
        payload.id
    ));
    cand.name = Some(name.to_string());
    cand.practice_name = payload.practice_name.clone();
    cand.address = payload.address.clone();
    cand.city = payload.city.clone();
    cand.state = payload.state.as_deref().map(|s| s.trim().to_ascii_uppercase());
    cand.zip_code = payload.zip_code.clone();
    cand.latitude = payload.latitude;
    cand.longitude = payload.longitude;
    cand.phone = payload.phone.as_deref().and_then(extract::phone);
    cand.website = payload.website.clone();
    // The email field goes through the extractor so placeholder domains are
    // filtered the same way as free-text captures.
    cand.email = payload
        .email
        .as_deref()
        .and_then(|e| extract::emails(e).into_iter().next());
    if let Some(fee) = payload.monthly_fee.filter(|f| *f > 0.0) {
        cand.monthly_fee = Some(fee);
        cand.pricing_confidence = Some(PricingConfidence::Medium);
    }
    cand.accepting_patients = payload.accepting_patients;
    cand.specialties = payload.specialties.clone();
    Ok(cand)
}

// ---------------------------------------------------------------------------
// DPC Alliance directory (HTML profiles)
// ---------------------------------------------------------------------------

/// Fetch contract for the directory source: profile slugs from the index
/// pages, then one raw HTML document per profile.
#[async_trait]
pub trait DirectoryFeed: Send + Sync {
    async fn profile_slugs(&self) -> Result<Vec<String>, AdapterError>;
    async fn profile_page(&self, slug: &str) -> Result<Option<String>, AdapterError>;
}

pub struct AllianceDirectory {
    http: HttpFetcher,
    base_url: String,
}

const DIRECTORY_PAGE_CAP: usize = 100;

impl AllianceDirectory {
    pub fn new(http: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn profile_url(&self, slug: &str) -> String {
        format!("{}/providers/{slug}", self.base_url)
    }

    fn slugs_in_index(html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("a[href]").expect("anchor selector parses");
        let mut slugs = Vec::new();
        for node in document.select(&selector) {
            let Some(href) = node.value().attr("href") else {
                continue;
            };
            let Some(rest) = href.split("/providers/").nth(1) else {
                continue;
            };
            let slug = rest.trim_end_matches('/').split(['?', '#']).next().unwrap_or("");
            if !slug.is_empty() && !slug.contains('/') && !slugs.iter().any(|s| s == slug) {
                slugs.push(slug.to_string());
            }
        }
        slugs
    }
}

#[async_trait]
impl DirectoryFeed for AllianceDirectory {
    async fn profile_slugs(&self) -> Result<Vec<String>, AdapterError> {
        let mut all: Vec<String> = Vec::new();
        for page_no in 1..=DIRECTORY_PAGE_CAP {
            let url = format!("{}/providers?page={page_no}", self.base_url);
            let page = match self.http.fetch(ALLIANCE_SOURCE, &url).await {
                Ok(page) => page,
                Err(err) if err.is_not_found() => break,
                Err(err) => return Err(err.into()),
            };
            let slugs = Self::slugs_in_index(&page.text());
            let before = all.len();
            for slug in slugs {
                if !all.contains(&slug) {
                    all.push(slug);
                }
            }
            // A page contributing nothing new is the end of the listing.
            if all.len() == before {
                break;
            }
        }
        debug!(count = all.len(), "collected directory profile slugs");
        Ok(all)
    }

    async fn profile_page(&self, slug: &str) -> Result<Option<String>, AdapterError> {
        match self.http.fetch(ALLIANCE_SOURCE, &self.profile_url(slug)).await {
            Ok(page) => Ok(Some(page.text())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Parsed directory profile. Every field tolerates absence; `body_text` is
/// the whole visible page for the free-text extractors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllianceProfilePayload {
    pub slug: String,
    pub name: Option<String>,
    pub practice_name: Option<String>,
    pub address_text: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub specialties: Vec<String>,
    pub body_text: String,
}

pub fn parse_alliance_profile(html: &str, slug: &str) -> AllianceProfilePayload {
    let document = Html::parse_document(html);

    let name = select_first_text(&document, "h1");
    let practice_name = select_first_text(&document, ".practice-name").or_else(|| select_first_text(&document, "h2"));
    let address_text = select_first_text(&document, "address").or_else(|| select_first_text(&document, ".address"));
    let phone = select_first_attr(&document, r#"a[href^="tel:"]"#, "href")
        .map(|href| href.trim_start_matches("tel:").to_string());
    let website = profile_website(&document);
    let mut specialties = select_all_texts(&document, ".specialties li");
    if specialties.is_empty() {
        specialties = select_all_texts(&document, ".specialty");
    }

    AllianceProfilePayload {
        slug: slug.to_string(),
        name,
        practice_name,
        address_text,
        phone,
        website,
        specialties,
        body_text: html_text(html),
    }
}

/// The profile's outbound practice link: first external anchor that is not a
/// known directory/aggregator domain.
fn profile_website(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"a[href^="http"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|node| node.value().attr("href"))
        .find(|href| !is_directory_domain(href))
        .map(str::to_string)
}

fn select_first_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .map(|node| node.text().collect::<String>())
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}

fn select_first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|node| node.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn select_all_texts(document: &Html, selector: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };
    document
        .select(&sel)
        .map(|node| node.text().collect::<String>())
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
        .collect()
}

/// Assemble the candidate for a directory profile: structured fields from
/// the DOM; pricing, status, email, and the physician roster from the
/// free-text extractors.
pub fn candidate_from_alliance(payload: &AllianceProfilePayload, base_url: &str) -> Result<ProviderCandidate, AdapterError> {
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AdapterError::Payload(format!("profile {} has no name", payload.slug)))?;

    let mut cand = ProviderCandidate::new(ALLIANCE_SOURCE, payload.slug.clone());
    cand.source_url = Some(format!(
        "{}/providers/{}",
        base_url.trim_end_matches('/'),
        payload.slug
    ));
    cand.name = Some(name.to_string());
    cand.practice_name = payload.practice_name.clone();
    cand.address = payload.address_text.clone();
    cand.phone = payload
        .phone
        .as_deref()
        .and_then(extract::phone)
        .or_else(|| extract::phone(&payload.body_text));
    cand.website = payload.website.clone();
    cand.email = extract::emails(&payload.body_text).into_iter().next();
    cand.physicians = extract::physician_names(&payload.body_text);
    cand.specialties = payload.specialties.clone();
    cand.accepting_patients = extract::accepting_patients(&payload.body_text);

    let pricing = extract::pricing(&payload.body_text);
    cand.monthly_fee = pricing.monthly_fee;
    cand.child_monthly_fee = pricing.child_monthly_fee;
    cand.family_fee = pricing.family_fee;
    cand.enrollment_fee = pricing.enrollment_fee;
    cand.pricing_tiers = pricing.tiers;
    cand.pricing_notes = pricing.notes;
    if pricing.confidence > PricingConfidence::None {
        cand.pricing_confidence = Some(pricing.confidence);
    }

    Ok(cand)
}

// ---------------------------------------------------------------------------
// Field extractors
// ---------------------------------------------------------------------------

/// Pattern-based extractors. Pure functions of input text: no I/O, no
/// failure mode, absence is `None`.
pub mod extract {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PriceField {
        Monthly,
        Child,
        Family,
        Enrollment,
        Annual,
    }

    struct PricePattern {
        field: PriceField,
        confidence: PricingConfidence,
        pattern: &'static str,
    }

    /// Ordered pattern table. Every keyword class maps to exactly one target
    /// field and the first match wins per class; a keyword with no amount
    /// nearby simply does not match. Amounts are whole dollars.
    const PRICE_PATTERNS: &[PricePattern] = &[
        PricePattern {
            field: PriceField::Monthly,
            confidence: PricingConfidence::High,
            pattern: r"(?i)\$\s*(\d{1,4})(?:\.\d{2})?\s*(?:/|per\s+|a\s+|each\s+)mo(?:nth)?\b",
        },
        PricePattern {
            field: PriceField::Monthly,
            confidence: PricingConfidence::Medium,
            pattern: r"(?i)\b(?:monthly|membership|individual)\b[^$\n]{0,40}?\$\s*(\d{1,4})(?:\.\d{2})?",
        },
        PricePattern {
            field: PriceField::Monthly,
            confidence: PricingConfidence::Medium,
            pattern: r"(?i)\$\s*(\d{1,4})(?:\.\d{2})?[^$\n]{0,30}?\b(?:monthly|membership)\b",
        },
        PricePattern {
            field: PriceField::Child,
            confidence: PricingConfidence::Medium,
            pattern: r"(?i)\b(?:child(?:ren)?|pediatric|kids?)\b[^$\n]{0,40}?\$\s*(\d{1,4})(?:\.\d{2})?",
        },
        PricePattern {
            field: PriceField::Family,
            confidence: PricingConfidence::Medium,
            pattern: r"(?i)\b(?:family|household|couples?)\b[^$\n]{0,40}?\$\s*(\d{1,4})(?:\.\d{2})?",
        },
        PricePattern {
            field: PriceField::Enrollment,
            confidence: PricingConfidence::Medium,
            pattern: r"(?i)\b(?:enrollment|registration|sign[\s-]?up)\b[^$\n]{0,40}?\$\s*(\d{1,4})(?:\.\d{2})?",
        },
        PricePattern {
            field: PriceField::Annual,
            confidence: PricingConfidence::Low,
            pattern: r"(?i)\b(?:annual(?:ly)?|yearly|per\s+year)\b[^$\n]{0,40}?\$\s*(\d{1,5})(?:\.\d{2})?",
        },
    ];

    static COMPILED_PRICE_PATTERNS: LazyLock<Vec<(PriceField, PricingConfidence, Regex)>> =
        LazyLock::new(|| {
            PRICE_PATTERNS
                .iter()
                .map(|p| {
                    (
                        p.field,
                        p.confidence,
                        Regex::new(p.pattern).expect("price pattern compiles"),
                    )
                })
                .collect()
        });

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct PricingExtract {
        pub monthly_fee: Option<f64>,
        pub child_monthly_fee: Option<f64>,
        pub family_fee: Option<f64>,
        pub enrollment_fee: Option<f64>,
        pub tiers: Vec<PricingTier>,
        pub notes: Option<String>,
        pub confidence: PricingConfidence,
    }

    /// Scan free text for amount-bearing pricing patterns. The overall
    /// confidence is the best confidence among the fee fields that matched;
    /// annual amounts become a note, never a synthesized monthly fee.
    pub fn pricing(text: &str) -> PricingExtract {
        let mut out = PricingExtract::default();

        for (field, confidence, regex) in COMPILED_PRICE_PATTERNS.iter() {
            let taken = match field {
                PriceField::Monthly => out.monthly_fee.is_some(),
                PriceField::Child => out.child_monthly_fee.is_some(),
                PriceField::Family => out.family_fee.is_some(),
                PriceField::Enrollment => out.enrollment_fee.is_some(),
                PriceField::Annual => out.notes.is_some(),
            };
            if taken {
                continue;
            }
            let Some(caps) = regex.captures(text) else {
                continue;
            };
            let Some(amount) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                continue;
            };
            let amount = f64::from(amount);
            match field {
                PriceField::Monthly => out.monthly_fee = Some(amount),
                PriceField::Child => out.child_monthly_fee = Some(amount),
                PriceField::Family => out.family_fee = Some(amount),
                PriceField::Enrollment => out.enrollment_fee = Some(amount),
                PriceField::Annual => {
                    out.notes = Some(format!("annual rate ${amount:.0} advertised"));
                    continue;
                }
            }
            if *confidence > out.confidence {
                out.confidence = *confidence;
            }
        }

        for (fee, label) in [
            (out.monthly_fee, "Individual"),
            (out.child_monthly_fee, "Child"),
            (out.family_fee, "Family"),
        ] {
            if let Some(monthly_fee) = fee {
                out.tiers.push(PricingTier {
                    label: label.to_string(),
                    monthly_fee,
                    min_age: None,
                    max_age: None,
                });
            }
        }

        out
    }

    static DR_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b(?:Dr\.?|Doctor)\s+([A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+){0,2})")
            .expect("dr-name regex compiles")
    });

    static CREDENTIAL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b([A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+){0,2})\s*,?\s+(?:M\.?D\.?|D\.?O\.?)(?:[\s,.]|$)")
            .expect("credential-name regex compiles")
    });

    /// Two independent passes ("Dr. Name" and "Name, M.D.") merged into one
    /// deduplicated, sorted set.
    pub fn physician_names(text: &str) -> Vec<String> {
        let mut names = std::collections::BTreeSet::new();
        for caps in DR_NAME_RE.captures_iter(text) {
            if let Some(name) = caps.get(1) {
                names.insert(name.as_str().trim().to_string());
            }
        }
        for caps in CREDENTIAL_NAME_RE.captures_iter(text) {
            if let Some(name) = caps.get(1) {
                names.insert(name.as_str().trim().to_string());
            }
        }
        names.into_iter().collect()
    }

    static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[A-Za-z0-9][A-Za-z0-9._%+-]*@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("email regex compiles")
    });

    const PLACEHOLDER_EMAIL_DOMAINS: &[&str] = &["example.com", "test.com", "email.com", "domain.com"];

    pub fn emails(text: &str) -> Vec<String> {
        let mut found = Vec::new();
        for m in EMAIL_RE.find_iter(text) {
            let email = m.as_str().to_ascii_lowercase();
            let domain = email.rsplit('@').next().unwrap_or("");
            if PLACEHOLDER_EMAIL_DOMAINS.contains(&domain) {
                continue;
            }
            if !found.contains(&email) {
                found.push(email);
            }
        }
        found
    }

    static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?:\+?1[\s.-]?)?\(?([2-9]\d{2})\)?[\s.-]?(\d{3})[\s.-]?(\d{4})\b")
            .expect("phone regex compiles")
    });

    /// First US phone number in the text, normalized to ten bare digits.
    pub fn phone(text: &str) -> Option<String> {
        let caps = PHONE_RE.captures(text)?;
        Some(format!("{}{}{}", &caps[1], &caps[2], &caps[3]))
    }

    const NOT_ACCEPTING_PHRASES: &[&str] = &[
        "not accepting new patients",
        "not currently accepting",
        "no longer accepting",
        "closed to new patients",
        "waitlist",
        "wait list",
    ];

    const ACCEPTING_PHRASES: &[&str] = &[
        "accepting new patients",
        "now accepting",
        "welcoming new patients",
        "open to new patients",
    ];

    /// Definite accepting-patients status, if the page states one. Negative
    /// phrasing is checked first since it usually contains the affirmative
    /// phrase as a substring.
    pub fn accepting_patients(text: &str) -> Option<bool> {
        let lower = text.to_ascii_lowercase();
        if NOT_ACCEPTING_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(false);
        }
        if ACCEPTING_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(true);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Practice-website discovery
// ---------------------------------------------------------------------------

/// Search capability: a query in, an ordered list of candidate URLs out.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>, AdapterError>;
}

/// Directory, aggregator, and social domains that must never be recorded as
/// a practice's own website.
pub const DIRECTORY_DOMAIN_BLOCKLIST: &[&str] = &[
    "dpcfrontier.com",
    "dpcalliance.org",
    "dpccareers.org",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "yelp.com",
    "yellowpages.com",
    "healthgrades.com",
    "zocdoc.com",
    "vitals.com",
    "webmd.com",
    "wikipedia.org",
    "mapquest.com",
    "npino.com",
    "npidb.org",
    "doximity.com",
    "duckduckgo.com",
];

pub fn is_directory_domain(url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return true;
    };
    let Some(host) = parsed.host_str() else {
        return true;
    };
    let host = host.trim_start_matches("www.");
    DIRECTORY_DOMAIN_BLOCKLIST
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// First search result that is plausibly the practice's own site.
pub fn pick_practice_website(results: &[String]) -> Option<String> {
    results
        .iter()
        .filter(|url| url.starts_with("http"))
        .find(|url| !is_directory_domain(url))
        .cloned()
}

/// HTML-endpoint DuckDuckGo search. Result anchors carry the destination in
/// a `uddg` redirect parameter.
pub struct DuckDuckGoSearch {
    http: HttpFetcher,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub const DEFAULT_ENDPOINT: &'static str = "https://html.duckduckgo.com";

    pub fn new(http: HttpFetcher, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn parse_results(html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let Ok(selector) = Selector::parse("a.result__a") else {
            return Vec::new();
        };
        document
            .select(&selector)
            .filter_map(|node| node.value().attr("href"))
            .filter_map(Self::destination_url)
            .collect()
    }

    fn destination_url(href: &str) -> Option<String> {
        let absolute = if href.starts_with("//") {
            format!("https:{href}")
        } else {
            href.to_string()
        };
        let parsed = reqwest::Url::parse(&absolute).ok()?;
        if let Some((_, destination)) = parsed.query_pairs().find(|(key, _)| key == "uddg") {
            return Some(destination.into_owned());
        }
        if absolute.starts_with("http") {
            return Some(absolute);
        }
        None
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<String>, AdapterError> {
        let url = reqwest::Url::parse_with_params(&format!("{}/html/", self.endpoint), &[("q", query)])
            .map_err(|e| AdapterError::Payload(e.to_string()))?;
        let page = match self.http.fetch("web-search", url.as_str()).await {
            Ok(page) => page,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let results = Self::parse_results(&page.text());
        if results.is_empty() {
            warn!(query, "search returned no parseable results");
        }
        Ok(results)
    }
}
