//! Durable snapshot + audit-log storage and HTTP fetch utilities for FGW.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use fgw_core::{MergedGame, SkippedEntry, Snapshot};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info_span};
use uuid::Uuid;

pub const CRATE_NAME: &str = "fgw-storage";

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
    #[error("snapshot {path} has schema version {found}, expected {expected}")]
    SchemaVersion {
        path: String,
        found: u32,
        expected: u32,
    },
    #[error("encoding snapshot: {0}")]
    Encode(String),
}

/// On-disk envelope around the snapshot map.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDocument {
    schema_version: u32,
    written_at: DateTime<Utc>,
    games: BTreeMap<u64, MergedGame>,
}

#[derive(Debug, Clone)]
pub struct WrittenSnapshot {
    pub content_hash: String,
    pub path: PathBuf,
    pub byte_size: usize,
    /// True when the live set was byte-identical to what is already on disk
    /// and no rewrite happened.
    pub unchanged: bool,
}

/// Whole-snapshot JSON persistence. Writes are all-or-nothing: the document
/// is staged to a temp file and atomically renamed over the previous one.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    fn hash_sidecar_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "snapshot.json".to_string());
        name.push_str(".sha256");
        self.path.with_file_name(name)
    }

    /// Read the persisted snapshot. A missing file is an empty snapshot,
    /// not an error; anything unparseable is.
    pub async fn read(&self) -> Result<Snapshot, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Snapshot::default());
            }
            Err(err) => {
                return Err(StoreError::Io {
                    action: "reading",
                    path: self.path.display().to_string(),
                    source: err,
                });
            }
        };

        let document: SnapshotDocument =
            serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt {
                path: self.path.display().to_string(),
                message: err.to_string(),
            })?;

        if document.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(StoreError::SchemaVersion {
                path: self.path.display().to_string(),
                found: document.schema_version,
                expected: SNAPSHOT_SCHEMA_VERSION,
            });
        }

        Ok(Snapshot {
            games: document.games,
        })
    }

    /// Replace the persisted snapshot with `snapshot`. The content hash of
    /// the live set is kept in a sidecar file; when it matches, the bytes on
    /// disk are already equivalent and the write is skipped.
    pub async fn write(
        &self,
        snapshot: &Snapshot,
        written_at: DateTime<Utc>,
    ) -> Result<WrittenSnapshot, StoreError> {
        let games_bytes = serde_json::to_vec(&snapshot.games)
            .map_err(|err| StoreError::Encode(err.to_string()))?;
        let content_hash = Self::sha256_hex(&games_bytes);

        let sidecar = self.hash_sidecar_path();
        if let Ok(previous_hash) = fs::read_to_string(&sidecar).await {
            if previous_hash.trim() == content_hash && path_exists(&self.path).await {
                debug!(path = %self.path.display(), "snapshot unchanged, skipping rewrite");
                return Ok(WrittenSnapshot {
                    content_hash,
                    path: self.path.clone(),
                    byte_size: games_bytes.len(),
                    unchanged: true,
                });
            }
        }

        let document = SnapshotDocument {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            written_at,
            games: snapshot.games.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|err| StoreError::Encode(err.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|err| StoreError::Io {
                    action: "creating",
                    path: parent.display().to_string(),
                    source: err,
                })?;
            }
        }

        let temp_name = format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len());
        let temp_path = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.join(&temp_name))
            .unwrap_or_else(|| PathBuf::from(&temp_name));

        stage_and_rename(&temp_path, &self.path, &bytes).await?;

        fs::write(&sidecar, format!("{content_hash}\n"))
            .await
            .map_err(|err| StoreError::Io {
                action: "writing",
                path: sidecar.display().to_string(),
                source: err,
            })?;

        Ok(WrittenSnapshot {
            content_hash,
            path: self.path.clone(),
            byte_size: bytes.len(),
            unchanged: false,
        })
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn stage_and_rename(temp_path: &Path, final_path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |action: &'static str, path: &Path, source: std::io::Error| StoreError::Io {
        action,
        path: path.display().to_string(),
        source,
    };

    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(temp_path)
        .await
        .map_err(|err| io_err("opening", temp_path, err))?;
    if let Err(err) = file.write_all(bytes).await {
        let _ = fs::remove_file(temp_path).await;
        return Err(io_err("writing", temp_path, err));
    }
    if let Err(err) = file.flush().await {
        let _ = fs::remove_file(temp_path).await;
        return Err(io_err("flushing", temp_path, err));
    }
    drop(file);

    match fs::rename(temp_path, final_path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(temp_path).await;
            Err(io_err("renaming", final_path, err))
        }
    }
}

/// Append-only JSONL sink for skipped-offer audit records.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &SkippedEntry) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let mut line = serde_json::to_vec(entry).context("serializing audit entry")?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening audit log {}", self.path.display()))?;
        file.write_all(&line)
            .await
            .with_context(|| format!("appending to audit log {}", self.path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing audit log {}", self.path.display()))?;
        Ok(())
    }
}

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

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
    pub token_bucket: Option<TokenBucketConfig>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
            token_bucket: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    pub capacity: u32,
    pub refill_every: Duration,
}

#[derive(Debug)]
pub struct SimpleTokenBucket {
    capacity: u32,
    refill_every: Duration,
    state: Mutex<TokenBucketState>,
}

#[derive(Debug, Clone, Copy)]
struct TokenBucketState {
    tokens: u32,
    last_refill: Instant,
}

impl SimpleTokenBucket {
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        Self {
            capacity,
            refill_every,
            state: Mutex::new(TokenBucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn take(&self) {
        loop {
            let mut state = self.state.lock().await;
            let elapsed = state.last_refill.elapsed();
            if elapsed >= self.refill_every && self.refill_every.as_millis() > 0 {
                let refills = (elapsed.as_millis() / self.refill_every.as_millis()) as u32;
                state.tokens = (state.tokens.saturating_add(refills)).min(self.capacity);
                state.last_refill = Instant::now();
            }

            if state.tokens > 0 {
                state.tokens -= 1;
                return;
            }

            let sleep_for = self.refill_every;
            drop(state);
            tokio::time::sleep(sleep_for).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Shared HTTP transport with exponential-backoff retry for transient
/// failures and an optional token-bucket rate limit.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    token_bucket: Option<Arc<SimpleTokenBucket>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        let token_bucket = config
            .token_bucket
            .map(|c| Arc::new(SimpleTokenBucket::new(c.capacity, c.refill_every)));

        Ok(Self {
            client,
            token_bucket,
            backoff: config.backoff,
        })
    }

    pub async fn get_bytes(
        &self,
        source_id: &str,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        self.execute(Method::GET, source_id, url, &[], None).await
    }

    pub async fn post_bytes(
        &self,
        source_id: &str,
        url: &str,
        headers: &[(String, String)],
        body: String,
    ) -> Result<FetchedResponse, FetchError> {
        self.execute(Method::POST, source_id, url, headers, Some(body))
            .await
    }

    async fn execute(
        &self,
        method: Method,
        source_id: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<String>,
    ) -> Result<FetchedResponse, FetchError> {
        if let Some(bucket) = &self.token_bucket {
            bucket.take().await;
        }

        let span = info_span!("http_fetch", source_id, url);
        let _guard = span.enter();

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            let mut request = self.client.request(method.clone(), url);
            for (name, value) in headers {
                request = request.header(name, value);
            }
            if let Some(body) = &body {
                request = request.body(body.clone());
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                        });
                    }

                    let disposition = classify_status(status);
                    if disposition == RetryDisposition::Retryable && attempt < self.backoff.max_retries
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
                    let disposition = classify_reqwest_error(&err);
                    if disposition == RetryDisposition::Retryable && attempt < self.backoff.max_retries
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fgw_core::{MergedGame, Offer, SkipReason, StoreId};
    use tempfile::tempdir;

    fn ts(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).single().expect("ts")
    }

    fn sample_game(id: u64) -> MergedGame {
        MergedGame::from_offer(
            &Offer {
                id,
                title: format!("Game {id}"),
                worth: Some("$9.99".to_string()),
                store: StoreId::Steam,
                expiry_at: Some(ts(2026, 8, 10, 12)),
                claim_url: format!("https://example.com/claim/{id}"),
            },
            None,
        )
    }

    #[test]
    fn snapshot_hashing_is_stable() {
        let hash = SnapshotStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn missing_snapshot_reads_as_empty() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));
        let snapshot = store.read().await.expect("read");
        assert!(snapshot.games.is_empty());
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));

        let mut snapshot = Snapshot::default();
        snapshot.games.insert(1, sample_game(1));
        snapshot.games.insert(2, sample_game(2));

        let written = store.write(&snapshot, ts(2026, 8, 7, 9)).await.expect("write");
        assert!(!written.unchanged);

        let loaded = store.read().await.expect("read");
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn identical_snapshot_write_is_skipped() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));

        let mut snapshot = Snapshot::default();
        snapshot.games.insert(7, sample_game(7));

        let first = store.write(&snapshot, ts(2026, 8, 7, 9)).await.expect("first");
        let second = store.write(&snapshot, ts(2026, 8, 7, 21)).await.expect("second");

        assert!(!first.unchanged);
        assert!(second.unchanged);
        assert_eq!(first.content_hash, second.content_hash);
    }

    #[tokio::test]
    async fn changed_snapshot_replaces_previous_file() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));

        let mut snapshot = Snapshot::default();
        snapshot.games.insert(1, sample_game(1));
        store.write(&snapshot, ts(2026, 8, 7, 9)).await.expect("first");

        snapshot.games.insert(2, sample_game(2));
        let written = store.write(&snapshot, ts(2026, 8, 7, 21)).await.expect("second");
        assert!(!written.unchanged);

        let loaded = store.read().await.expect("read");
        assert_eq!(loaded.games.len(), 2);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error_not_empty() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("snapshot.json");
        tokio::fs::write(&path, b"{ not json").await.expect("write garbage");

        let store = SnapshotStore::new(&path);
        let err = store.read().await.expect_err("corrupt read must fail");
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn audit_log_appends_one_json_line_per_entry() {
        let dir = tempdir().expect("tempdir");
        let log = AuditLog::new(dir.path().join("skipped.jsonl"));

        let entry = SkippedEntry {
            offer: Offer {
                id: 42,
                title: "Portal".to_string(),
                worth: None,
                store: StoreId::Steam,
                expiry_at: None,
                claim_url: "https://example.com/claim/42".to_string(),
            },
            reason: SkipReason::ConfusingMatch,
            detail: Some("candidate: Portal 2".to_string()),
            at: ts(2026, 8, 7, 9),
        };
        log.append(&entry).await.expect("first append");
        log.append(&entry).await.expect("second append");

        let text = tokio::fs::read_to_string(log.path()).await.expect("read log");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: SkippedEntry = serde_json::from_str(lines[0]).expect("parse line");
        assert_eq!(parsed, entry);
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
}
