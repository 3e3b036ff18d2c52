//! Field-level reconciliation of a freshly enriched record with its
//! persisted counterpart. Store, price, expiry, and claim URL track the
//! feed unconditionally; everything else is curated-unless-empty so manual
//! edits on the persisted record survive routine re-enrichment.

use fgw_core::{MergedGame, NotificationFlags};

/// Merge `fresh` (this run's feed + enrichment data) with the persisted
/// record for the same id, if any.
///
/// Volatile fields (`worth`, `store`, `expiry_at`, `claim_url`) always take
/// the fresh value. Every other field keeps the existing value when it is
/// present and non-empty. Notification flags are OR-ed: once set, never
/// cleared.
pub fn merge_records(fresh: MergedGame, existing: Option<&MergedGame>) -> MergedGame {
    let Some(existing) = existing else {
        return fresh;
    };
    debug_assert_eq!(fresh.id, existing.id);

    MergedGame {
        id: fresh.id,
        worth: fresh.worth,
        store: fresh.store,
        expiry_at: fresh.expiry_at,
        claim_url: fresh.claim_url,
        title: keep_text(&existing.title, fresh.title),
        catalog_id: existing.catalog_id.or(fresh.catalog_id),
        canonical_name: keep_opt_text(&existing.canonical_name, fresh.canonical_name),
        summary: keep_opt_text(&existing.summary, fresh.summary),
        storyline: keep_opt_text(&existing.storyline, fresh.storyline),
        rating: existing.rating.or(fresh.rating),
        release_date: existing.release_date.or(fresh.release_date),
        cover_url: keep_opt_text(&existing.cover_url, fresh.cover_url),
        screenshot_urls: keep_list(&existing.screenshot_urls, fresh.screenshot_urls),
        genres: keep_list(&existing.genres, fresh.genres),
        perspectives: keep_list(&existing.perspectives, fresh.perspectives),
        engines: keep_list(&existing.engines, fresh.engines),
        modes: keep_list(&existing.modes, fresh.modes),
        website_urls: keep_list(&existing.website_urls, fresh.website_urls),
        notes: keep_opt_text(&existing.notes, fresh.notes),
        flags: NotificationFlags {
            new_notified: existing.flags.new_notified || fresh.flags.new_notified,
            urgent_notified: existing.flags.urgent_notified || fresh.flags.urgent_notified,
            reminder_sent: existing.flags.reminder_sent || fresh.flags.reminder_sent,
        },
    }
}

fn keep_text(existing: &str, fresh: String) -> String {
    if existing.trim().is_empty() {
        fresh
    } else {
        existing.to_string()
    }
}

fn keep_opt_text(existing: &Option<String>, fresh: Option<String>) -> Option<String> {
    match existing {
        Some(text) if !text.trim().is_empty() => Some(text.clone()),
        _ => fresh,
    }
}

fn keep_list(existing: &[String], fresh: Vec<String>) -> Vec<String> {
    if existing.is_empty() {
        fresh
    } else {
        existing.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fgw_core::{Offer, StoreId};

    fn game(id: u64) -> MergedGame {
        MergedGame::from_offer(
            &Offer {
                id,
                title: "Deponia".to_string(),
                worth: Some("$19.99".to_string()),
                store: StoreId::EpicGamesStore,
                expiry_at: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single().expect("ts")),
                claim_url: "https://example.com/claim".to_string(),
            },
            None,
        )
    }

    #[test]
    fn first_sighting_passes_through_unchanged() {
        let fresh = game(1);
        let merged = merge_records(fresh.clone(), None);
        assert_eq!(merged, fresh);
    }

    #[test]
    fn volatile_fields_always_refresh_from_the_feed() {
        let mut existing = game(1);
        existing.worth = Some("$4.99".to_string());
        existing.store = StoreId::Steam;
        existing.expiry_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("ts"));
        existing.claim_url = "https://example.com/old".to_string();

        let fresh = game(1);
        let merged = merge_records(fresh.clone(), Some(&existing));

        assert_eq!(merged.worth, fresh.worth);
        assert_eq!(merged.store, fresh.store);
        assert_eq!(merged.expiry_at, fresh.expiry_at);
        assert_eq!(merged.claim_url, fresh.claim_url);
    }

    #[test]
    fn curated_fields_survive_and_empty_fresh_never_clobbers() {
        let mut existing = game(1);
        existing.notes = Some("curated text".to_string());
        existing.summary = Some("hand-tuned summary".to_string());
        existing.genres = vec!["Adventure".to_string()];

        let mut fresh = game(1);
        fresh.notes = None;
        fresh.summary = Some("api summary".to_string());
        fresh.genres = Vec::new();

        let merged = merge_records(fresh, Some(&existing));
        assert_eq!(merged.notes.as_deref(), Some("curated text"));
        assert_eq!(merged.summary.as_deref(), Some("hand-tuned summary"));
        assert_eq!(merged.genres, vec!["Adventure".to_string()]);
    }

    #[test]
    fn missing_existing_fields_backfill_from_fresh() {
        let existing = game(1);

        let mut fresh = game(1);
        fresh.summary = Some("api summary".to_string());
        fresh.catalog_id = Some(77);
        fresh.screenshot_urls = vec!["https://img.example.com/1.jpg".to_string()];

        let merged = merge_records(fresh, Some(&existing));
        assert_eq!(merged.summary.as_deref(), Some("api summary"));
        assert_eq!(merged.catalog_id, Some(77));
        assert_eq!(merged.screenshot_urls.len(), 1);
    }

    #[test]
    fn whitespace_only_existing_text_counts_as_empty() {
        let mut existing = game(1);
        existing.notes = Some("   ".to_string());

        let mut fresh = game(1);
        fresh.notes = Some("api note".to_string());

        let merged = merge_records(fresh, Some(&existing));
        assert_eq!(merged.notes.as_deref(), Some("api note"));
    }

    #[test]
    fn notification_flags_are_monotonic_under_merge() {
        let mut existing = game(1);
        existing.flags.new_notified = true;
        existing.flags.urgent_notified = true;

        let fresh = game(1);
        let merged = merge_records(fresh, Some(&existing));
        assert!(merged.flags.new_notified);
        assert!(merged.flags.urgent_notified);
        assert!(!merged.flags.reminder_sent);
    }
}
