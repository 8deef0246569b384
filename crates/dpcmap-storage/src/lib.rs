//! HTTP fetch utilities, raw-payload snapshot storage, and the canonical
//! provider store behind the enrichment pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use dpcmap_core::{Provider, ProviderPatch, ProviderSource, ALLIANCE_ID_PREFIX};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info_span;
use uuid::Uuid;

pub const CRATE_NAME: &str = "dpcmap-storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// Serializes callers so consecutive requests through one fetcher are at
/// least `min_interval` apart. External sources block callers that exceed
/// ~1 request/second; this gate is the hard ceiling, not a tunable.
#[derive(Debug)]
pub struct MinIntervalGate {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl MinIntervalGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub async fn wait_turn(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
    /// Minimum spacing between requests through this client, if any.
    pub min_request_interval: Option<Duration>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
            min_request_interval: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl FetchError {
    /// A 404/410 is "the source has no such record", not a transport fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::HttpStatus { status: 404 | 410, .. })
    }
}

/// GET client with bounded timeout, classified retries with capped
/// exponential backoff, and an optional minimum-interval gate.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff: BackoffPolicy,
    gate: Option<MinIntervalGate>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            backoff: config.backoff,
            gate: config.min_request_interval.map(MinIntervalGate::new),
        })
    }

    pub async fn fetch(&self, source: &str, url: &str) -> Result<FetchedPage, FetchError> {
        if let Some(gate) = &self.gate {
            gate.wait_turn().await;
        }

        let span = info_span!("http_fetch", source, url);
        let _guard = span.enter();

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        return Ok(FetchedPage {
                            status,
                            final_url,
                            body,
                        });
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub snapshot_id: Uuid,
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Hash-addressed archive of raw fetched payloads, one immutable file per
/// distinct body. Re-scrapes of unchanged pages land on the existing file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Deterministic id for a (source, source_id) snapshot lineage.
    pub fn snapshot_id(source: &str, source_id: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{source}:{source_id}").as_bytes())
    }

    fn relative_path(source: &str, source_id: &str, content_hash: &str, extension: &str) -> PathBuf {
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        PathBuf::from(source)
            .join(dpcmap_core::slugify(source_id))
            .join(format!("{content_hash}.{ext}"))
    }

    pub async fn store_bytes(
        &self,
        source: &str,
        source_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<StoredSnapshot> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = Self::relative_path(source, source_id, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);
        let snapshot_id = Self::snapshot_id(source, source_id);

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating snapshot directory {}", parent.display()))?;
        }

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking snapshot path {}", absolute_path.display()))?
        {
            return Ok(StoredSnapshot {
                snapshot_id,
                content_hash,
                relative_path,
                absolute_path,
                byte_size: bytes.len(),
                deduplicated: true,
            });
        }

        let temp_name = format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len());
        let temp_path = absolute_path
            .parent()
            .expect("snapshot path always has parent")
            .join(temp_name);

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp snapshot file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp snapshot file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp snapshot file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &absolute_path).await {
            Ok(()) => Ok(StoredSnapshot {
                snapshot_id,
                content_hash,
                relative_path,
                absolute_path,
                byte_size: bytes.len(),
                deduplicated: false,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&temp_path).await;
                Ok(StoredSnapshot {
                    snapshot_id,
                    content_hash,
                    relative_path,
                    absolute_path,
                    byte_size: bytes.len(),
                    deduplicated: true,
                })
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming temp snapshot {} -> {}",
                        temp_path.display(),
                        absolute_path.display()
                    )
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: usize,
    pub unknown_location: usize,
    pub missing_coordinates: usize,
    pub missing_website: usize,
    pub missing_pricing: usize,
}

/// Repository handle for the canonical provider table. Constructed per run
/// and passed in; reads are simple worklist filters, writes are field-level
/// patches plus attribution upserts.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Provider>>;
    /// All rows in one source namespace; `""` is the primary (unprefixed)
    /// namespace.
    async fn list_namespace(&self, prefix: &str) -> Result<Vec<Provider>>;
    async fn list_missing_coordinates(&self) -> Result<Vec<Provider>>;
    async fn list_unknown_location(&self) -> Result<Vec<Provider>>;
    async fn list_missing_website(&self) -> Result<Vec<Provider>>;
    async fn list_missing_pricing(&self) -> Result<Vec<Provider>>;
    async fn insert(&self, provider: &Provider) -> Result<()>;
    async fn update(&self, id: &str, patch: &ProviderPatch) -> Result<()>;
    async fn find_by_source_id(&self, source: &str, source_id: &str) -> Result<Option<Provider>>;
    async fn get_source(&self, provider_id: &str, source: &str) -> Result<Option<ProviderSource>>;
    async fn upsert_source(&self, attribution: &ProviderSource) -> Result<()>;
    async fn stats(&self) -> Result<StoreStats>;
    /// Cheap connectivity probe used for the fatal-setup check.
    async fn ping(&self) -> Result<()>;
}

/// Postgres-backed store.
pub struct PgProviderStore {
    pool: PgPool,
}

impl PgProviderStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await
            .context("connecting to provider database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running provider store migrations")?;
        Ok(())
    }

    fn row_to_provider(row: &sqlx::postgres::PgRow) -> Result<Provider> {
        let pricing_tiers: serde_json::Value = row.try_get("pricing_tiers")?;
        let physicians: serde_json::Value = row.try_get("physicians")?;
        let specialties: serde_json::Value = row.try_get("specialties")?;
        let confidence: String = row.try_get("pricing_confidence")?;
        Ok(Provider {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            practice_name: row.try_get("practice_name")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            zip_code: row.try_get("zip_code")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            phone: row.try_get("phone")?,
            website: row.try_get("website")?,
            email: row.try_get("email")?,
            monthly_fee: row.try_get("monthly_fee")?,
            child_monthly_fee: row.try_get("child_monthly_fee")?,
            family_fee: row.try_get("family_fee")?,
            enrollment_fee: row.try_get("enrollment_fee")?,
            pricing_tiers: serde_json::from_value(pricing_tiers)
                .context("decoding pricing_tiers column")?,
            pricing_notes: row.try_get("pricing_notes")?,
            pricing_confidence: dpcmap_core::PricingConfidence::parse(&confidence),
            pricing_scraped_at: row.try_get("pricing_scraped_at")?,
            accepting_patients: row.try_get("accepting_patients")?,
            physicians: serde_json::from_value(physicians)
                .context("decoding physicians column")?,
            specialties: serde_json::from_value(specialties)
                .context("decoding specialties column")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn select_where(&self, predicate: &str) -> Result<Vec<Provider>> {
        let sql = format!("SELECT * FROM providers WHERE {predicate} ORDER BY id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("listing providers where {predicate}"))?;
        rows.iter().map(Self::row_to_provider).collect()
    }
}

#[async_trait]
impl ProviderStore for PgProviderStore {
    async fn get(&self, id: &str) -> Result<Option<Provider>> {
        let row = sqlx::query("SELECT * FROM providers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("fetching provider {id}"))?;
        row.as_ref().map(Self::row_to_provider).transpose()
    }

    async fn list_namespace(&self, prefix: &str) -> Result<Vec<Provider>> {
        if prefix.is_empty() {
            let pattern = format!("{ALLIANCE_ID_PREFIX}%");
            let rows = sqlx::query("SELECT * FROM providers WHERE id NOT LIKE $1 ORDER BY id")
                .bind(pattern)
                .fetch_all(&self.pool)
                .await
                .context("listing primary-namespace providers")?;
            rows.iter().map(Self::row_to_provider).collect()
        } else {
            let pattern = format!("{prefix}%");
            let rows = sqlx::query("SELECT * FROM providers WHERE id LIKE $1 ORDER BY id")
                .bind(pattern)
                .fetch_all(&self.pool)
                .await
                .with_context(|| format!("listing providers in namespace {prefix}"))?;
            rows.iter().map(Self::row_to_provider).collect()
        }
    }

    async fn list_missing_coordinates(&self) -> Result<Vec<Provider>> {
        self.select_where("latitude IS NULL").await
    }

    async fn list_unknown_location(&self) -> Result<Vec<Provider>> {
        self.select_where("state = 'XX'").await
    }

    async fn list_missing_website(&self) -> Result<Vec<Provider>> {
        self.select_where("website IS NULL OR website = ''").await
    }

    async fn list_missing_pricing(&self) -> Result<Vec<Provider>> {
        self.select_where("monthly_fee <= 0 OR pricing_confidence IN ('none', 'low')")
            .await
    }

    async fn insert(&self, p: &Provider) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO providers (
                 id, name, practice_name, address, city, state, zip_code,
                 latitude, longitude, phone, website, email,
                 monthly_fee, child_monthly_fee, family_fee, enrollment_fee,
                 pricing_tiers, pricing_notes, pricing_confidence, pricing_scraped_at,
                 accepting_patients, physicians, specialties, created_at, updated_at
               ) VALUES (
                 $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                 $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25
               )"#,
        )
        .bind(&p.id)
        .bind(&p.name)
        .bind(&p.practice_name)
        .bind(&p.address)
        .bind(&p.city)
        .bind(&p.state)
        .bind(&p.zip_code)
        .bind(p.latitude)
        .bind(p.longitude)
        .bind(&p.phone)
        .bind(&p.website)
        .bind(&p.email)
        .bind(p.monthly_fee)
        .bind(p.child_monthly_fee)
        .bind(p.family_fee)
        .bind(p.enrollment_fee)
        .bind(serde_json::to_value(&p.pricing_tiers).context("encoding pricing_tiers")?)
        .bind(&p.pricing_notes)
        .bind(p.pricing_confidence.as_str())
        .bind(p.pricing_scraped_at)
        .bind(p.accepting_patients)
        .bind(serde_json::to_value(&p.physicians).context("encoding physicians")?)
        .bind(serde_json::to_value(&p.specialties).context("encoding specialties")?)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting provider {}", p.id))?;
        Ok(())
    }

    async fn update(&self, id: &str, patch: &ProviderPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE providers SET updated_at = now()");
        if let Some(v) = &patch.name {
            qb.push(", name = ").push_bind(v);
        }
        if let Some(v) = &patch.practice_name {
            qb.push(", practice_name = ").push_bind(v);
        }
        if let Some(v) = &patch.address {
            qb.push(", address = ").push_bind(v);
        }
        if let Some(fix) = &patch.location {
            qb.push(", city = ").push_bind(&fix.city);
            qb.push(", state = ").push_bind(&fix.state);
            qb.push(", zip_code = ").push_bind(&fix.zip_code);
        }
        if let Some((lat, lng)) = patch.coordinates {
            qb.push(", latitude = ").push_bind(lat);
            qb.push(", longitude = ").push_bind(lng);
        }
        if let Some(v) = &patch.phone {
            qb.push(", phone = ").push_bind(v);
        }
        if let Some(v) = &patch.website {
            qb.push(", website = ").push_bind(v);
        }
        if let Some(v) = &patch.email {
            qb.push(", email = ").push_bind(v);
        }
        if let Some(v) = patch.monthly_fee {
            qb.push(", monthly_fee = ").push_bind(v);
        }
        if let Some(v) = patch.child_monthly_fee {
            qb.push(", child_monthly_fee = ").push_bind(v);
        }
        if let Some(v) = patch.family_fee {
            qb.push(", family_fee = ").push_bind(v);
        }
        if let Some(v) = patch.enrollment_fee {
            qb.push(", enrollment_fee = ").push_bind(v);
        }
        if let Some(v) = &patch.pricing_tiers {
            qb.push(", pricing_tiers = ")
                .push_bind(serde_json::to_value(v).context("encoding pricing_tiers")?);
        }
        if let Some(v) = &patch.pricing_notes {
            qb.push(", pricing_notes = ").push_bind(v);
        }
        if let Some(v) = patch.pricing_confidence {
            qb.push(", pricing_confidence = ").push_bind(v.as_str());
        }
        if let Some(v) = patch.pricing_scraped_at {
            qb.push(", pricing_scraped_at = ").push_bind(v);
        }
        if let Some(v) = patch.accepting_patients {
            qb.push(", accepting_patients = ").push_bind(v);
        }
        if let Some(v) = &patch.physicians {
            qb.push(", physicians = ")
                .push_bind(serde_json::to_value(v).context("encoding physicians")?);
        }
        if let Some(v) = &patch.specialties {
            qb.push(", specialties = ")
                .push_bind(serde_json::to_value(v).context("encoding specialties")?);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("patching provider {id}"))?;
        Ok(())
    }

    async fn find_by_source_id(&self, source: &str, source_id: &str) -> Result<Option<Provider>> {
        let row = sqlx::query(
            r#"SELECT p.* FROM providers p
               JOIN provider_sources s ON s.provider_id = p.id
               WHERE s.source = $1 AND s.source_id = $2"#,
        )
        .bind(source)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("looking up provider by {source}/{source_id}"))?;
        row.as_ref().map(Self::row_to_provider).transpose()
    }

    async fn get_source(&self, provider_id: &str, source: &str) -> Result<Option<ProviderSource>> {
        let row = sqlx::query(
            "SELECT * FROM provider_sources WHERE provider_id = $1 AND source = $2",
        )
        .bind(provider_id)
        .bind(source)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("fetching attribution {provider_id}/{source}"))?;
        row.map(|row| -> Result<ProviderSource> {
            Ok(ProviderSource {
                provider_id: row.try_get("provider_id")?,
                source: row.try_get("source")?,
                source_url: row.try_get("source_url")?,
                source_id: row.try_get("source_id")?,
                data_quality_score: row.try_get("data_quality_score")?,
                last_scraped: row.try_get("last_scraped")?,
            })
        })
        .transpose()
    }

    async fn upsert_source(&self, a: &ProviderSource) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO provider_sources
                 (provider_id, source, source_url, source_id, data_quality_score, last_scraped)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (provider_id, source) DO UPDATE SET
                 source_url = EXCLUDED.source_url,
                 source_id = EXCLUDED.source_id,
                 data_quality_score = EXCLUDED.data_quality_score,
                 last_scraped = EXCLUDED.last_scraped"#,
        )
        .bind(&a.provider_id)
        .bind(&a.source)
        .bind(&a.source_url)
        .bind(&a.source_id)
        .bind(a.data_quality_score)
        .bind(a.last_scraped)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upserting attribution {}/{}", a.provider_id, a.source))?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"SELECT
                 COUNT(*) AS total,
                 COUNT(*) FILTER (WHERE state = 'XX') AS unknown_location,
                 COUNT(*) FILTER (WHERE latitude IS NULL) AS missing_coordinates,
                 COUNT(*) FILTER (WHERE website IS NULL OR website = '') AS missing_website,
                 COUNT(*) FILTER (WHERE monthly_fee <= 0
                                  OR pricing_confidence IN ('none', 'low')) AS missing_pricing
               FROM providers"#,
        )
        .fetch_one(&self.pool)
        .await
        .context("computing store stats")?;
        Ok(StoreStats {
            total: row.try_get::<i64, _>("total")? as usize,
            unknown_location: row.try_get::<i64, _>("unknown_location")? as usize,
            missing_coordinates: row.try_get::<i64, _>("missing_coordinates")? as usize,
            missing_website: row.try_get::<i64, _>("missing_website")? as usize,
            missing_pricing: row.try_get::<i64, _>("missing_pricing")? as usize,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("pinging provider database")?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryInner {
    providers: BTreeMap<String, Provider>,
    sources: BTreeMap<(String, String), ProviderSource>,
}

/// In-memory store for tests and dry inspection. Same contract as Postgres,
/// no durability.
#[derive(Default)]
pub struct MemoryProviderStore {
    inner: StdMutex<MemoryInner>,
}

impl MemoryProviderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut MemoryInner) -> T) -> T {
        let mut inner = self.inner.lock().expect("memory store mutex poisoned");
        f(&mut inner)
    }

    fn filtered(&self, predicate: impl Fn(&Provider) -> bool) -> Vec<Provider> {
        self.with_inner(|inner| inner.providers.values().filter(|p| predicate(p)).cloned().collect())
    }
}

#[async_trait]
impl ProviderStore for MemoryProviderStore {
    async fn get(&self, id: &str) -> Result<Option<Provider>> {
        Ok(self.with_inner(|inner| inner.providers.get(id).cloned()))
    }

    async fn list_namespace(&self, prefix: &str) -> Result<Vec<Provider>> {
        Ok(self.filtered(|p| dpcmap_core::in_namespace(&p.id, prefix)))
    }

    async fn list_missing_coordinates(&self) -> Result<Vec<Provider>> {
        Ok(self.filtered(|p| !p.has_coordinates()))
    }

    async fn list_unknown_location(&self) -> Result<Vec<Provider>> {
        Ok(self.filtered(|p| !p.has_known_location()))
    }

    async fn list_missing_website(&self) -> Result<Vec<Provider>> {
        Ok(self.filtered(|p| !p.has_website()))
    }

    async fn list_missing_pricing(&self) -> Result<Vec<Provider>> {
        Ok(self.filtered(Provider::needs_pricing))
    }

    async fn insert(&self, provider: &Provider) -> Result<()> {
        self.with_inner(|inner| {
            inner.providers.insert(provider.id.clone(), provider.clone());
        });
        Ok(())
    }

    async fn update(&self, id: &str, patch: &ProviderPatch) -> Result<()> {
        self.with_inner(|inner| {
            if let Some(provider) = inner.providers.get_mut(id) {
                provider.apply(patch);
                provider.updated_at = Utc::now();
            }
        });
        Ok(())
    }

    async fn find_by_source_id(&self, source: &str, source_id: &str) -> Result<Option<Provider>> {
        Ok(self.with_inner(|inner| {
            inner
                .sources
                .values()
                .find(|s| s.source == source && s.source_id == source_id)
                .and_then(|s| inner.providers.get(&s.provider_id).cloned())
        }))
    }

    async fn get_source(&self, provider_id: &str, source: &str) -> Result<Option<ProviderSource>> {
        let key = (provider_id.to_string(), source.to_string());
        Ok(self.with_inner(|inner| inner.sources.get(&key).cloned()))
    }

    async fn upsert_source(&self, attribution: &ProviderSource) -> Result<()> {
        let key = (attribution.provider_id.clone(), attribution.source.clone());
        self.with_inner(|inner| {
            inner.sources.insert(key, attribution.clone());
        });
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(self.with_inner(|inner| StoreStats {
            total: inner.providers.len(),
            unknown_location: inner.providers.values().filter(|p| !p.has_known_location()).count(),
            missing_coordinates: inner.providers.values().filter(|p| !p.has_coordinates()).count(),
            missing_website: inner.providers.values().filter(|p| !p.has_website()).count(),
            missing_pricing: inner.providers.values().filter(|p| p.needs_pricing()).count(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn snapshot_hashing_is_stable() {
        let hash = SnapshotStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn snapshots_deduplicate_by_content_hash() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());

        let first = store
            .store_bytes("frontier", "p-17", "json", b"{\"name\":\"same\"}")
            .await
            .expect("first store");
        let second = store
            .store_bytes("frontier", "p-17", "json", b"{\"name\":\"same\"}")
            .await
            .expect("second store");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.snapshot_id, second.snapshot_id);
        assert!(first.absolute_path.exists());
    }

    #[tokio::test]
    async fn fetcher_returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(HttpClientConfig::default()).expect("fetcher");
        let page = fetcher
            .fetch("dpc-alliance", &format!("{}/profile", server.uri()))
            .await
            .expect("fetch");
        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.text(), "<html>ok</html>");
    }

    #[tokio::test]
    async fn fetcher_maps_missing_records_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(HttpClientConfig::default()).expect("fetcher");
        let err = fetcher
            .fetch("frontier", &format!("{}/gone", server.uri()))
            .await
            .expect_err("should fail");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn fetcher_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(HttpClientConfig {
            backoff: BackoffPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
            },
            ..Default::default()
        })
        .expect("fetcher");
        let page = fetcher
            .fetch("frontier", &format!("{}/flaky", server.uri()))
            .await
            .expect("fetch after retry");
        assert_eq!(page.text(), "recovered");
    }

    #[tokio::test]
    async fn gate_spaces_out_consecutive_calls() {
        let gate = MinIntervalGate::new(Duration::from_millis(25));
        let started = std::time::Instant::now();
        gate.wait_turn().await;
        gate.wait_turn().await;
        gate.wait_turn().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn memory_store_patches_fields_in_place() {
        let store = MemoryProviderStore::new();
        let provider = Provider::stub("example-family-medicine", "Example Family Medicine", ts());
        store.insert(&provider).await.expect("insert");

        let patch = ProviderPatch {
            website: Some("https://examplefamilymed.com".to_string()),
            ..Default::default()
        };
        store.update("example-family-medicine", &patch).await.expect("update");

        let got = store
            .get("example-family-medicine")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(got.website.as_deref(), Some("https://examplefamilymed.com"));
        assert_eq!(got.name, "Example Family Medicine");

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.total, 1);
        assert_eq!(stats.missing_website, 0);
        assert_eq!(stats.unknown_location, 1);
    }

    #[tokio::test]
    async fn attribution_upsert_replaces_prior_row() {
        let store = MemoryProviderStore::new();
        let provider = Provider::stub("example-family-medicine", "Example Family Medicine", ts());
        store.insert(&provider).await.expect("insert");

        let mut attribution = ProviderSource {
            provider_id: "example-family-medicine".to_string(),
            source: "frontier".to_string(),
            source_url: Some("https://mapper.example/practices/17".to_string()),
            source_id: "17".to_string(),
            data_quality_score: 25,
            last_scraped: ts(),
        };
        store.upsert_source(&attribution).await.expect("first upsert");

        attribution.data_quality_score = 60;
        store.upsert_source(&attribution).await.expect("second upsert");

        let got = store
            .get_source("example-family-medicine", "frontier")
            .await
            .expect("get_source")
            .expect("present");
        assert_eq!(got.data_quality_score, 60);

        let by_source = store
            .find_by_source_id("frontier", "17")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(by_source.id, "example-family-medicine");
    }
}
