//! Collaborator contracts for the watch pipeline plus the HTTP adapters
//! that implement them: the GamerPower giveaway feed, the IGDB catalog
//! lookup, and the webhook notification sink.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use fgw_core::{CatalogCandidate, NotificationEvent, Offer, StoreId};
use fgw_storage::{FetchError, HttpFetcher};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "fgw-feeds";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("http status {status} for {url}")]
    Http { status: u16, url: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decoding response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl From<FetchError> for FeedError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::HttpStatus { status, url } => FeedError::Http { status, url },
            FetchError::Request(err) => FeedError::Transport(err.to_string()),
        }
    }
}

/// Produces the current catalog of raw offers. Failure is total: either the
/// whole feed parses or the run aborts.
#[async_trait]
pub trait OfferFeed: Send + Sync {
    async fn fetch_offers(&self) -> Result<Vec<Offer>, FeedError>;
}

/// Free-text catalog search returning relevance-ranked candidates. Failures
/// are per-query and downgrade to a skipped offer, never abort the run.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<CatalogCandidate>, FeedError>;
}

/// Delivery boundary for notification events. The pipeline never blocks its
/// own state transition on the result.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> Result<(), FeedError>;
}

/// Sink for deployments without a delivery endpoint configured.
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    async fn send(&self, event: &NotificationEvent) -> Result<(), FeedError> {
        debug!(offer_id = event.offer_id, kind = ?event.kind, "dropping event, no sink configured");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GamerPower giveaway feed
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawGiveaway {
    id: u64,
    title: String,
    #[serde(default)]
    worth: String,
    #[serde(default)]
    platforms: String,
    #[serde(default)]
    end_date: String,
    #[serde(default)]
    open_giveaway_url: String,
}

pub struct GamerPowerFeed {
    fetcher: Arc<HttpFetcher>,
    url: String,
}

impl GamerPowerFeed {
    pub fn new(fetcher: Arc<HttpFetcher>, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }
}

#[async_trait]
impl OfferFeed for GamerPowerFeed {
    async fn fetch_offers(&self) -> Result<Vec<Offer>, FeedError> {
        let response = self.fetcher.get_bytes("gamerpower", &self.url).await?;
        let raw: Vec<RawGiveaway> =
            serde_json::from_slice(&response.body).map_err(|err| FeedError::Decode {
                url: response.final_url.clone(),
                message: err.to_string(),
            })?;
        Ok(raw.iter().map(offer_from_giveaway).collect())
    }
}

fn offer_from_giveaway(raw: &RawGiveaway) -> Offer {
    Offer {
        id: raw.id,
        title: raw.title.trim().to_string(),
        worth: parse_worth(&raw.worth),
        store: store_from_platforms(&raw.platforms),
        expiry_at: parse_end_date(&raw.end_date),
        claim_url: raw.open_giveaway_url.clone(),
    }
}

/// "$29.99" stays as-is, "N/A" and blanks become absent.
fn parse_worth(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Feed timestamps are naive UTC, "YYYY-MM-DD HH:MM:SS". "N/A" means the
/// giveaway has no published end.
fn parse_end_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") {
        return None;
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// The feed reports a free-text platform list like "PC, Epic Games Store".
/// The first recognized storefront wins.
fn store_from_platforms(raw: &str) -> StoreId {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("epic") {
        StoreId::EpicGamesStore
    } else if lower.contains("steam") {
        StoreId::Steam
    } else if lower.contains("gog") {
        StoreId::Gog
    } else if lower.contains("origin") {
        StoreId::Origin
    } else if lower.contains("indiegala") {
        StoreId::IndieGala
    } else if lower.contains("stove") {
        StoreId::Stove
    } else if lower.contains("itch") {
        StoreId::ItchIo
    } else if lower.contains("drm") {
        StoreId::DrmFree
    } else {
        StoreId::Unknown
    }
}

// ---------------------------------------------------------------------------
// IGDB catalog lookup
// ---------------------------------------------------------------------------

const IGDB_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
struct RawGame {
    id: u64,
    name: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    storyline: Option<String>,
    #[serde(default)]
    total_rating: Option<f64>,
    #[serde(default)]
    first_release_date: Option<i64>,
    #[serde(default)]
    cover: Option<RawImage>,
    #[serde(default)]
    screenshots: Vec<RawImage>,
    #[serde(default)]
    genres: Vec<RawNamed>,
    #[serde(default)]
    player_perspectives: Vec<RawNamed>,
    #[serde(default)]
    game_engines: Vec<RawNamed>,
    #[serde(default)]
    game_modes: Vec<RawNamed>,
    #[serde(default)]
    websites: Vec<RawWebsite>,
    #[serde(default)]
    platforms: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct RawImage {
    image_id: String,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawWebsite {
    url: String,
}

pub struct IgdbLookup {
    fetcher: Arc<HttpFetcher>,
    games_url: String,
    client_id: String,
    bearer_token: String,
}

impl IgdbLookup {
    pub fn new(
        fetcher: Arc<HttpFetcher>,
        games_url: impl Into<String>,
        client_id: impl Into<String>,
        bearer_token: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            games_url: games_url.into(),
            client_id: client_id.into(),
            bearer_token: bearer_token.into(),
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Client-ID".to_string(), self.client_id.clone()),
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.bearer_token),
            ),
            ("Accept".to_string(), "application/json".to_string()),
        ]
    }
}

#[async_trait]
impl CatalogLookup for IgdbLookup {
    async fn search(&self, query: &str) -> Result<Vec<CatalogCandidate>, FeedError> {
        let body = build_search_body(query, IGDB_SEARCH_LIMIT);
        let response = self
            .fetcher
            .post_bytes("igdb", &self.games_url, &self.headers(), body)
            .await?;
        let raw: Vec<RawGame> =
            serde_json::from_slice(&response.body).map_err(|err| FeedError::Decode {
                url: response.final_url.clone(),
                message: err.to_string(),
            })?;
        Ok(raw.iter().map(candidate_from_game).collect())
    }
}

/// IGDB's query DSL takes the search term inside double quotes; quotes and
/// backslashes in titles are replaced rather than escaped since they never
/// carry matching signal.
fn build_search_body(query: &str, limit: usize) -> String {
    let sanitized = query
        .replace(['"', '\\'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "search \"{sanitized}\"; \
         fields name,summary,storyline,total_rating,first_release_date,\
         cover.image_id,screenshots.image_id,genres.name,\
         player_perspectives.name,game_engines.name,game_modes.name,\
         websites.url,platforms; \
         limit {limit};"
    )
}

fn candidate_from_game(raw: &RawGame) -> CatalogCandidate {
    CatalogCandidate {
        catalog_id: raw.id,
        name: raw.name.clone(),
        platforms: raw.platforms.clone(),
        summary: raw.summary.clone(),
        storyline: raw.storyline.clone(),
        rating: raw.total_rating,
        release_date: raw
            .first_release_date
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        cover_url: raw
            .cover
            .as_ref()
            .map(|c| image_url("cover_big", &c.image_id)),
        screenshot_urls: raw
            .screenshots
            .iter()
            .map(|s| image_url("screenshot_big", &s.image_id))
            .collect(),
        genres: named(&raw.genres),
        perspectives: named(&raw.player_perspectives),
        engines: named(&raw.game_engines),
        modes: named(&raw.game_modes),
        website_urls: raw.websites.iter().map(|w| w.url.clone()).collect(),
    }
}

fn named(items: &[RawNamed]) -> Vec<String> {
    items.iter().map(|n| n.name.clone()).collect()
}

fn image_url(kind: &str, image_id: &str) -> String {
    format!("https://images.igdb.com/igdb/image/upload/t_{kind}/{image_id}.jpg")
}

// ---------------------------------------------------------------------------
// Webhook notification sink
// ---------------------------------------------------------------------------

pub struct WebhookSink {
    fetcher: Arc<HttpFetcher>,
    url: String,
}

impl WebhookSink {
    pub fn new(fetcher: Arc<HttpFetcher>, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, event: &NotificationEvent) -> Result<(), FeedError> {
        let body = serde_json::to_string(event).map_err(|err| FeedError::Decode {
            url: self.url.clone(),
            message: err.to_string(),
        })?;
        let headers = vec![(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )];
        self.fetcher
            .post_bytes("webhook", &self.url, &headers, body)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fgw_core::EventKind;

    #[test]
    fn giveaway_wire_format_maps_to_offer() {
        let json = r#"{
            "id": 2301,
            "title": "  Deponia  ",
            "worth": "$19.99",
            "thumbnail": "https://www.gamerpower.com/offers/1/thumb.jpg",
            "platforms": "PC, Epic Games Store",
            "end_date": "2026-08-14 23:59:00",
            "users": 12850,
            "type": "Game",
            "open_giveaway_url": "https://www.gamerpower.com/open/deponia"
        }"#;
        let raw: RawGiveaway = serde_json::from_str(json).expect("decode giveaway");
        let offer = offer_from_giveaway(&raw);

        assert_eq!(offer.id, 2301);
        assert_eq!(offer.title, "Deponia");
        assert_eq!(offer.worth.as_deref(), Some("$19.99"));
        assert_eq!(offer.store, StoreId::EpicGamesStore);
        assert_eq!(offer.claim_url, "https://www.gamerpower.com/open/deponia");
        let expiry = offer.expiry_at.expect("expiry parsed");
        assert_eq!(expiry.to_rfc3339(), "2026-08-14T23:59:00+00:00");
    }

    #[test]
    fn not_available_worth_and_end_date_become_absent() {
        assert_eq!(parse_worth("N/A"), None);
        assert_eq!(parse_worth(""), None);
        assert_eq!(parse_worth("$0.99").as_deref(), Some("$0.99"));

        assert_eq!(parse_end_date("N/A"), None);
        assert_eq!(parse_end_date("soon"), None);
        assert!(parse_end_date("2026-12-01 00:00:00").is_some());
    }

    #[test]
    fn store_inference_covers_known_storefronts() {
        assert_eq!(store_from_platforms("PC, Steam"), StoreId::Steam);
        assert_eq!(
            store_from_platforms("PC, Epic Games Store"),
            StoreId::EpicGamesStore
        );
        assert_eq!(store_from_platforms("PC, GOG"), StoreId::Gog);
        assert_eq!(store_from_platforms("PC, Itch.io"), StoreId::ItchIo);
        assert_eq!(store_from_platforms("PC, DRM-Free"), StoreId::DrmFree);
        assert_eq!(store_from_platforms("Playstation 5"), StoreId::Unknown);
    }

    #[test]
    fn search_body_quotes_term_and_strips_embedded_quotes() {
        let body = build_search_body(r#"Dandy & "Randy" DX"#, 10);
        assert!(body.starts_with("search \"Dandy & Randy DX\";"));
        assert!(body.contains("fields name,"));
        assert!(body.ends_with("limit 10;"));
    }

    #[test]
    fn catalog_wire_format_maps_to_candidate() {
        let json = r#"[{
            "id": 1905,
            "name": "Fortune Summoners",
            "summary": "A 2D side-scrolling RPG.",
            "total_rating": 71.5,
            "first_release_date": 1325376000,
            "cover": { "id": 9001, "image_id": "co1abc" },
            "screenshots": [
                { "id": 1, "image_id": "sc1" },
                { "id": 2, "image_id": "sc2" }
            ],
            "genres": [ { "id": 12, "name": "Role-playing (RPG)" } ],
            "player_perspectives": [ { "id": 4, "name": "Side view" } ],
            "game_modes": [ { "id": 1, "name": "Single player" } ],
            "websites": [ { "id": 5, "url": "https://example.com" } ],
            "platforms": [6, 3]
        }]"#;
        let raw: Vec<RawGame> = serde_json::from_str(json).expect("decode games");
        let candidate = candidate_from_game(&raw[0]);

        assert_eq!(candidate.catalog_id, 1905);
        assert_eq!(candidate.name, "Fortune Summoners");
        assert_eq!(candidate.platforms, vec![6, 3]);
        assert_eq!(
            candidate.cover_url.as_deref(),
            Some("https://images.igdb.com/igdb/image/upload/t_cover_big/co1abc.jpg")
        );
        assert_eq!(candidate.screenshot_urls.len(), 2);
        assert_eq!(candidate.genres, vec!["Role-playing (RPG)".to_string()]);
        assert_eq!(
            candidate.release_date.expect("release date").to_rfc3339(),
            "2012-01-01T00:00:00+00:00"
        );
        assert!(candidate.storyline.is_none());
    }

    #[test]
    fn sparse_catalog_entry_decodes_with_defaults() {
        let json = r#"[{ "id": 7, "name": "DOOM" }]"#;
        let raw: Vec<RawGame> = serde_json::from_str(json).expect("decode sparse");
        let candidate = candidate_from_game(&raw[0]);
        assert!(candidate.platforms.is_empty());
        assert!(candidate.cover_url.is_none());
        assert!(candidate.screenshot_urls.is_empty());
    }

    #[tokio::test]
    async fn noop_sink_accepts_any_event() {
        let event = NotificationEvent {
            kind: EventKind::NewOffer,
            offer_id: 1,
            title: "DOOM".to_string(),
            store: StoreId::Steam,
            worth: None,
            expiry_at: None,
            claim_url: "https://example.com".to_string(),
        };
        NoopSink.send(&event).await.expect("noop send");
    }
}
