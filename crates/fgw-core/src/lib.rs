//! Core domain model for FGW: feed offers, catalog enrichment, merged
//! catalog records, and the notification events derived from them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "fgw-core";

/// Storefront a giveaway is claimed on, as reported by the offer feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreId {
    Steam,
    EpicGamesStore,
    Gog,
    Origin,
    IndieGala,
    Stove,
    ItchIo,
    DrmFree,
    Unknown,
}

impl StoreId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreId::Steam => "Steam",
            StoreId::EpicGamesStore => "Epic Games Store",
            StoreId::Gog => "GOG",
            StoreId::Origin => "Origin",
            StoreId::IndieGala => "IndieGala",
            StoreId::Stove => "STOVE",
            StoreId::ItchIo => "itch.io",
            StoreId::DrmFree => "DRM-Free",
            StoreId::Unknown => "Unknown",
        }
    }
}

/// One raw entry from the offer feed. Immutable within a run; `id` is the
/// feed-assigned stable identifier and the snapshot key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: u64,
    pub title: String,
    pub worth: Option<String>,
    pub store: StoreId,
    pub expiry_at: Option<DateTime<Utc>>,
    pub claim_url: String,
}

/// One candidate returned by the catalog lookup for a free-text query,
/// in the relevance order the lookup service produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogCandidate {
    pub catalog_id: u64,
    pub name: String,
    pub platforms: Vec<u64>,
    pub summary: Option<String>,
    pub storyline: Option<String>,
    pub rating: Option<f64>,
    pub release_date: Option<DateTime<Utc>>,
    pub cover_url: Option<String>,
    pub screenshot_urls: Vec<String>,
    pub genres: Vec<String>,
    pub perspectives: Vec<String>,
    pub engines: Vec<String>,
    pub modes: Vec<String>,
    pub website_urls: Vec<String>,
}

/// Catalog metadata accepted for an offer. Absent entirely when no
/// candidate survived matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub catalog_id: u64,
    pub canonical_name: String,
    pub summary: Option<String>,
    pub storyline: Option<String>,
    pub rating: Option<f64>,
    pub release_date: Option<DateTime<Utc>>,
    pub cover_url: Option<String>,
    pub screenshot_urls: Vec<String>,
    pub genres: Vec<String>,
    pub perspectives: Vec<String>,
    pub engines: Vec<String>,
    pub modes: Vec<String>,
    pub website_urls: Vec<String>,
}

impl EnrichmentRecord {
    pub fn from_candidate(candidate: &CatalogCandidate) -> Self {
        Self {
            catalog_id: candidate.catalog_id,
            canonical_name: candidate.name.clone(),
            summary: candidate.summary.clone(),
            storyline: candidate.storyline.clone(),
            rating: candidate.rating,
            release_date: candidate.release_date,
            cover_url: candidate.cover_url.clone(),
            screenshot_urls: candidate.screenshot_urls.clone(),
            genres: candidate.genres.clone(),
            perspectives: candidate.perspectives.clone(),
            engines: candidate.engines.clone(),
            modes: candidate.modes.clone(),
            website_urls: candidate.website_urls.clone(),
        }
    }
}

/// Per-offer notification state. Each flag is monotonic: once `true` it is
/// never reset by the engine; only a brand-new offer id starts all-`false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFlags {
    pub new_notified: bool,
    pub urgent_notified: bool,
    pub reminder_sent: bool,
}

/// Persisted unit of truth, keyed by `Offer::id`. Union of feed fields,
/// flattened enrichment fields, curator-owned fields, and notification
/// flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedGame {
    pub id: u64,
    pub title: String,
    pub worth: Option<String>,
    pub store: StoreId,
    pub expiry_at: Option<DateTime<Utc>>,
    pub claim_url: String,
    pub catalog_id: Option<u64>,
    pub canonical_name: Option<String>,
    pub summary: Option<String>,
    pub storyline: Option<String>,
    pub rating: Option<f64>,
    pub release_date: Option<DateTime<Utc>>,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub screenshot_urls: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub perspectives: Vec<String>,
    #[serde(default)]
    pub engines: Vec<String>,
    #[serde(default)]
    pub modes: Vec<String>,
    #[serde(default)]
    pub website_urls: Vec<String>,
    /// Hand-written curation, edited directly on the persisted record.
    /// Never populated from either API.
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub flags: NotificationFlags,
}

impl MergedGame {
    pub fn from_offer(offer: &Offer, enrichment: Option<EnrichmentRecord>) -> Self {
        let (
            catalog_id,
            canonical_name,
            summary,
            storyline,
            rating,
            release_date,
            cover_url,
            screenshot_urls,
            genres,
            perspectives,
            engines,
            modes,
            website_urls,
        ) = match enrichment {
            Some(e) => (
                Some(e.catalog_id),
                Some(e.canonical_name),
                e.summary,
                e.storyline,
                e.rating,
                e.release_date,
                e.cover_url,
                e.screenshot_urls,
                e.genres,
                e.perspectives,
                e.engines,
                e.modes,
                e.website_urls,
            ),
            None => (
                None,
                None,
                None,
                None,
                None,
                None,
                None,
                Vec::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
            ),
        };

        Self {
            id: offer.id,
            title: offer.title.clone(),
            worth: offer.worth.clone(),
            store: offer.store,
            expiry_at: offer.expiry_at,
            claim_url: offer.claim_url.clone(),
            catalog_id,
            canonical_name,
            summary,
            storyline,
            rating,
            release_date,
            cover_url,
            screenshot_urls,
            genres,
            perspectives,
            engines,
            modes,
            website_urls,
            notes: None,
            flags: NotificationFlags::default(),
        }
    }
}

/// The full set of live merged records at a point in time. Keyed map with
/// deterministic ordering so persisted output is byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub games: BTreeMap<u64, MergedGame>,
}

/// Partition of the union of two snapshots' ids. Disjoint and exhaustive
/// by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub added: BTreeSet<u64>,
    pub removed: BTreeSet<u64>,
    pub retained: BTreeSet<u64>,
}

/// Why an offer was left out of (or unenriched in) the live snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    ConfusingMatch,
    WrongPlatform,
    NoMatch,
    FetchError,
}

/// Audit record for an offer that could not be enriched. Appended to the
/// side log, never part of the live snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub offer: Offer,
    pub reason: SkipReason,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    NewOffer,
    ExpiringSoon,
    ExpiresToday,
}

/// One notification decision. Carries enough of the merged record to render
/// a push message; delivery is the sink collaborator's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub offer_id: u64,
    pub title: String,
    pub store: StoreId,
    pub worth: Option<String>,
    pub expiry_at: Option<DateTime<Utc>>,
    pub claim_url: String,
}

impl NotificationEvent {
    pub fn for_game(kind: EventKind, game: &MergedGame) -> Self {
        Self {
            kind,
            offer_id: game.id,
            title: game.title.clone(),
            store: game.store,
            worth: game.worth.clone(),
            expiry_at: game.expiry_at,
            claim_url: game.claim_url.clone(),
        }
    }
}

/// Outcome record for one full pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub offers_seen: usize,
    pub enriched: usize,
    pub skipped: usize,
    pub added: usize,
    pub removed: usize,
    pub retained: usize,
    pub events_emitted: usize,
    pub events_delivered: usize,
    pub snapshot_path: String,
}
