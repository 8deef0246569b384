//! Core domain model for the DPC provider map: canonical provider rows,
//! source attribution, candidate records, and the never-downgrade merge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "dpcmap-core";

/// Location sentinels. The three travel together: a provider either has a
/// fully known city/state/zip or carries all three sentinels.
pub const UNKNOWN_CITY: &str = "Unknown";
pub const UNKNOWN_STATE: &str = "XX";
pub const UNKNOWN_ZIP: &str = "00000";

/// Id prefix for providers originating from the DPC Alliance directory.
/// Providers from the primary (frontier) source carry a bare slug. The
/// prefix is the de-duplication boundary between sources.
pub const ALLIANCE_ID_PREFIX: &str = "dpca-";

const KNOWN_ID_PREFIXES: &[&str] = &[ALLIANCE_ID_PREFIX];

/// How much trust a pricing extraction carries. Ordered: a later pass may
/// only replace pricing at equal or higher confidence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PricingConfidence {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl PricingConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingConfidence::None => "none",
            PricingConfidence::Low => "low",
            PricingConfidence::Medium => "medium",
            PricingConfidence::High => "high",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "low" => PricingConfidence::Low,
            "medium" => PricingConfidence::Medium,
            "high" => PricingConfidence::High,
            _ => PricingConfidence::None,
        }
    }
}

/// One labeled membership tier, e.g. `{ "Individual", 75, 18..=64 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTier {
    pub label: String,
    pub monthly_fee: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_age: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u8>,
}

/// Canonical persisted provider row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub practice_name: Option<String>,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    /// Monthly fee in dollars; 0 means "unknown/unset", not "free".
    pub monthly_fee: f64,
    pub child_monthly_fee: Option<f64>,
    pub family_fee: Option<f64>,
    pub enrollment_fee: Option<f64>,
    pub pricing_tiers: Vec<PricingTier>,
    pub pricing_notes: Option<String>,
    pub pricing_confidence: PricingConfidence,
    pub pricing_scraped_at: Option<DateTime<Utc>>,
    /// Unknown is `None`, which is not the same as `Some(false)`.
    pub accepting_patients: Option<bool>,
    pub physicians: Vec<String>,
    pub specialties: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    /// A freshly discovered provider: sentinel location, no pricing, zero
    /// score. Subsequent passes fill fields in without ever downgrading.
    pub fn stub(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            practice_name: None,
            address: None,
            city: UNKNOWN_CITY.to_string(),
            state: UNKNOWN_STATE.to_string(),
            zip_code: UNKNOWN_ZIP.to_string(),
            latitude: None,
            longitude: None,
            phone: None,
            website: None,
            email: None,
            monthly_fee: 0.0,
            child_monthly_fee: None,
            family_fee: None,
            enrollment_fee: None,
            pricing_tiers: Vec::new(),
            pricing_notes: None,
            pricing_confidence: PricingConfidence::None,
            pricing_scraped_at: None,
            accepting_patients: None,
            physicians: Vec::new(),
            specialties: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_known_location(&self) -> bool {
        self.state != UNKNOWN_STATE
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn has_website(&self) -> bool {
        self.website.as_deref().is_some_and(|w| !w.trim().is_empty())
    }

    /// Worklist predicate for the pricing pass: nothing known yet, or only a
    /// low-trust guess on record.
    pub fn needs_pricing(&self) -> bool {
        self.monthly_fee <= 0.0 || self.pricing_confidence <= PricingConfidence::Low
    }

    pub fn apply(&mut self, patch: &ProviderPatch) {
        if let Some(v) = &patch.name {
            self.name = v.clone();
        }
        if let Some(v) = &patch.practice_name {
            self.practice_name = Some(v.clone());
        }
        if let Some(v) = &patch.address {
            self.address = Some(v.clone());
        }
        if let Some(fix) = &patch.location {
            self.city = fix.city.clone();
            self.state = fix.state.clone();
            self.zip_code = fix.zip_code.clone();
        }
        if let Some((lat, lng)) = patch.coordinates {
            self.latitude = Some(lat);
            self.longitude = Some(lng);
        }
        if let Some(v) = &patch.phone {
            self.phone = Some(v.clone());
        }
        if let Some(v) = &patch.website {
            self.website = Some(v.clone());
        }
        if let Some(v) = &patch.email {
            self.email = Some(v.clone());
        }
        if let Some(v) = patch.monthly_fee {
            self.monthly_fee = v;
        }
        if let Some(v) = patch.child_monthly_fee {
            self.child_monthly_fee = Some(v);
        }
        if let Some(v) = patch.family_fee {
            self.family_fee = Some(v);
        }
        if let Some(v) = patch.enrollment_fee {
            self.enrollment_fee = Some(v);
        }
        if let Some(v) = &patch.pricing_tiers {
            self.pricing_tiers = v.clone();
        }
        if let Some(v) = &patch.pricing_notes {
            self.pricing_notes = Some(v.clone());
        }
        if let Some(v) = patch.pricing_confidence {
            self.pricing_confidence = v;
        }
        if let Some(v) = patch.pricing_scraped_at {
            self.pricing_scraped_at = Some(v);
        }
        if let Some(v) = patch.accepting_patients {
            self.accepting_patients = Some(v);
        }
        if let Some(v) = &patch.physicians {
            self.physicians = v.clone();
        }
        if let Some(v) = &patch.specialties {
            self.specialties = v.clone();
        }
    }
}

/// Attribution/audit record: one row per (provider, originating source).
/// Updated in place on every re-scrape with `last_scraped` bumped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSource {
    pub provider_id: String,
    pub source: String,
    pub source_url: Option<String>,
    pub source_id: String,
    pub data_quality_score: i32,
    pub last_scraped: DateTime<Utc>,
}

/// A complete, validated city/state/zip replacement. Location is only ever
/// written as a trio so the sentinel invariant cannot be half-updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFix {
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

/// Extractor output: everything independently optional, plus where it came
/// from. Extractors never fail; absence is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCandidate {
    pub source: String,
    pub source_id: String,
    pub source_url: Option<String>,
    pub name: Option<String>,
    pub practice_name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub monthly_fee: Option<f64>,
    pub child_monthly_fee: Option<f64>,
    pub family_fee: Option<f64>,
    pub enrollment_fee: Option<f64>,
    pub pricing_tiers: Vec<PricingTier>,
    pub pricing_notes: Option<String>,
    pub pricing_confidence: Option<PricingConfidence>,
    pub accepting_patients: Option<bool>,
    pub physicians: Vec<String>,
    pub specialties: Vec<String>,
}

impl ProviderCandidate {
    pub fn new(source: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
            source_url: None,
            name: None,
            practice_name: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            latitude: None,
            longitude: None,
            phone: None,
            website: None,
            email: None,
            monthly_fee: None,
            child_monthly_fee: None,
            family_fee: None,
            enrollment_fee: None,
            pricing_tiers: Vec::new(),
            pricing_notes: None,
            pricing_confidence: None,
            accepting_patients: None,
            physicians: Vec::new(),
            specialties: Vec::new(),
        }
    }

    /// The complete location trio, if this candidate carries one. Partial or
    /// sentinel-valued locations yield `None`.
    pub fn location_fix(&self) -> Option<LocationFix> {
        let city = non_empty(self.city.as_deref())?;
        let state = non_empty(self.state.as_deref())?;
        let zip = non_empty(self.zip_code.as_deref())?;
        if city == UNKNOWN_CITY || state == UNKNOWN_STATE || zip == UNKNOWN_ZIP {
            return None;
        }
        Some(LocationFix {
            city: city.to_string(),
            state: state.to_string(),
            zip_code: zip.to_string(),
        })
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    fn has_pricing(&self) -> bool {
        self.monthly_fee.is_some_and(|f| f > 0.0)
            || self.child_monthly_fee.is_some()
            || self.family_fee.is_some()
            || self.enrollment_fee.is_some()
            || !self.pricing_tiers.is_empty()
    }
}

/// Field-level upsert unit: only populated fields are written. Location and
/// coordinates travel as units so the row invariants hold at the write
/// boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderPatch {
    pub name: Option<String>,
    pub practice_name: Option<String>,
    pub address: Option<String>,
    pub location: Option<LocationFix>,
    pub coordinates: Option<(f64, f64)>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub monthly_fee: Option<f64>,
    pub child_monthly_fee: Option<f64>,
    pub family_fee: Option<f64>,
    pub enrollment_fee: Option<f64>,
    pub pricing_tiers: Option<Vec<PricingTier>>,
    pub pricing_notes: Option<String>,
    pub pricing_confidence: Option<PricingConfidence>,
    pub pricing_scraped_at: Option<DateTime<Utc>>,
    pub accepting_patients: Option<bool>,
    pub physicians: Option<Vec<String>>,
    pub specialties: Option<Vec<String>>,
}

impl ProviderPatch {
    pub fn is_empty(&self) -> bool {
        *self == ProviderPatch::default()
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.name.is_some() {
            names.push("name");
        }
        if self.practice_name.is_some() {
            names.push("practice_name");
        }
        if self.address.is_some() {
            names.push("address");
        }
        if self.location.is_some() {
            names.push("location");
        }
        if self.coordinates.is_some() {
            names.push("coordinates");
        }
        if self.phone.is_some() {
            names.push("phone");
        }
        if self.website.is_some() {
            names.push("website");
        }
        if self.email.is_some() {
            names.push("email");
        }
        if self.monthly_fee.is_some() {
            names.push("monthly_fee");
        }
        if self.child_monthly_fee.is_some() {
            names.push("child_monthly_fee");
        }
        if self.family_fee.is_some() {
            names.push("family_fee");
        }
        if self.enrollment_fee.is_some() {
            names.push("enrollment_fee");
        }
        if self.pricing_tiers.is_some() {
            names.push("pricing_tiers");
        }
        if self.pricing_notes.is_some() {
            names.push("pricing_notes");
        }
        if self.pricing_confidence.is_some() {
            names.push("pricing_confidence");
        }
        if self.pricing_scraped_at.is_some() {
            names.push("pricing_scraped_at");
        }
        if self.accepting_patients.is_some() {
            names.push("accepting_patients");
        }
        if self.physicians.is_some() {
            names.push("physicians");
        }
        if self.specialties.is_some() {
            names.push("specialties");
        }
        names
    }
}

/// Compute the field-level patch a candidate may apply to an existing row.
///
/// Never-downgrade rules:
/// - identity/contact fields fill blanks only, never overwrite or clear;
/// - the location trio is written only when complete and the row still holds
///   sentinels; coordinates only as a pair onto a row without one;
/// - pricing is replaced only at equal-or-higher confidence and only where a
///   value actually differs from the stored one, so re-scraping an unchanged
///   page yields an empty patch; any pricing write stamps
///   `pricing_scraped_at`;
/// - a definite `accepting_patients` replaces a stale one, unknown never
///   clears;
/// - physicians and specialties merge as sorted set unions.
pub fn build_patch(
    current: &Provider,
    cand: &ProviderCandidate,
    now: DateTime<Utc>,
) -> ProviderPatch {
    let mut patch = ProviderPatch::default();

    if current.name.trim().is_empty() {
        if let Some(name) = non_empty(cand.name.as_deref()) {
            patch.name = Some(name.to_string());
        }
    }
    if non_empty(current.practice_name.as_deref()).is_none() {
        if let Some(v) = non_empty(cand.practice_name.as_deref()) {
            patch.practice_name = Some(v.to_string());
        }
    }
    if non_empty(current.address.as_deref()).is_none() {
        if let Some(v) = non_empty(cand.address.as_deref()) {
            patch.address = Some(v.to_string());
        }
    }
    if !current.has_known_location() {
        patch.location = cand.location_fix();
    }
    if !current.has_coordinates() {
        patch.coordinates = cand.coordinates();
    }
    if non_empty(current.phone.as_deref()).is_none() {
        if let Some(v) = non_empty(cand.phone.as_deref()) {
            patch.phone = Some(v.to_string());
        }
    }
    if !current.has_website() {
        if let Some(v) = non_empty(cand.website.as_deref()) {
            patch.website = Some(v.to_string());
        }
    }
    if non_empty(current.email.as_deref()).is_none() {
        if let Some(v) = non_empty(cand.email.as_deref()) {
            patch.email = Some(v.to_string());
        }
    }

    if cand.has_pricing() {
        let cand_confidence = cand.pricing_confidence.unwrap_or(PricingConfidence::Low);
        if cand_confidence >= current.pricing_confidence {
            if let Some(fee) = cand.monthly_fee.filter(|f| *f > 0.0) {
                if fee != current.monthly_fee {
                    patch.monthly_fee = Some(fee);
                }
            }
            patch.child_monthly_fee = cand
                .child_monthly_fee
                .filter(|f| *f > 0.0 && current.child_monthly_fee != Some(*f));
            patch.family_fee = cand
                .family_fee
                .filter(|f| *f > 0.0 && current.family_fee != Some(*f));
            patch.enrollment_fee = cand
                .enrollment_fee
                .filter(|f| *f >= 0.0 && current.enrollment_fee != Some(*f));
            if !cand.pricing_tiers.is_empty() && cand.pricing_tiers != current.pricing_tiers {
                patch.pricing_tiers = Some(cand.pricing_tiers.clone());
            }
            if let Some(notes) = non_empty(cand.pricing_notes.as_deref()) {
                if current.pricing_notes.as_deref() != Some(notes) {
                    patch.pricing_notes = Some(notes.to_string());
                }
            }
            if cand_confidence > current.pricing_confidence {
                patch.pricing_confidence = Some(cand_confidence);
            }
            let wrote_pricing = patch.monthly_fee.is_some()
                || patch.child_monthly_fee.is_some()
                || patch.family_fee.is_some()
                || patch.enrollment_fee.is_some()
                || patch.pricing_tiers.is_some()
                || patch.pricing_notes.is_some()
                || patch.pricing_confidence.is_some();
            if wrote_pricing {
                patch.pricing_scraped_at = Some(now);
            }
        }
    }

    if let Some(accepting) = cand.accepting_patients {
        if current.accepting_patients != Some(accepting) {
            patch.accepting_patients = Some(accepting);
        }
    }

    patch.physicians = merge_name_set(&current.physicians, &cand.physicians);
    patch.specialties = merge_name_set(&current.specialties, &cand.specialties);

    patch
}

/// Case-insensitive set union, sorted; `None` when the union adds nothing.
fn merge_name_set(current: &[String], incoming: &[String]) -> Option<Vec<String>> {
    if incoming.is_empty() {
        return None;
    }
    let mut merged = current.to_vec();
    for s in incoming {
        let s = s.trim();
        if !s.is_empty() && !merged.iter().any(|m| m.eq_ignore_ascii_case(s)) {
            merged.push(s.to_string());
        }
    }
    merged.sort();
    (merged != current).then_some(merged)
}

/// Deterministic completeness/confidence score, 0..=100.
///
/// Weights: name 10, practice name 5, address 10, known location trio 15,
/// coordinate pair 10, phone 10, website 10, monthly fee set 10, pricing
/// confidence high/medium/low 10/6/3, accepting-patients known 5,
/// specialties present 5. Every term is keyed to "non-placeholder field
/// present" and non-negative, so filling a field never lowers the score.
pub fn quality_score(p: &Provider) -> i32 {
    let mut score = 0;
    if !p.name.trim().is_empty() {
        score += 10;
    }
    if non_empty(p.practice_name.as_deref()).is_some() {
        score += 5;
    }
    if non_empty(p.address.as_deref()).is_some() {
        score += 10;
    }
    if p.has_known_location() {
        score += 15;
    }
    if p.has_coordinates() {
        score += 10;
    }
    if non_empty(p.phone.as_deref()).is_some() {
        score += 10;
    }
    if p.has_website() {
        score += 10;
    }
    if p.monthly_fee > 0.0 {
        score += 10;
    }
    score += match p.pricing_confidence {
        PricingConfidence::High => 10,
        PricingConfidence::Medium => 6,
        PricingConfidence::Low => 3,
        PricingConfidence::None => 0,
    };
    if p.accepting_patients.is_some() {
        score += 5;
    }
    if !p.specialties.is_empty() {
        score += 5;
    }
    score
}

/// Lowercase alphanumeric slug with single-dash separators.
pub fn slugify(input: &str) -> String {
    input
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub fn namespaced_id(prefix: &str, slug: &str) -> String {
    format!("{prefix}{slug}")
}

/// Whether `id` belongs to the namespace named by `prefix`. The empty prefix
/// names the primary namespace: ids carrying none of the known prefixes.
pub fn in_namespace(id: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        !KNOWN_ID_PREFIXES.iter().any(|p| id.starts_with(p))
    } else {
        id.starts_with(prefix)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
