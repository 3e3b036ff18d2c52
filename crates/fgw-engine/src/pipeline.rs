//! Watch pipeline orchestration: one run fetches the live offer catalog,
//! enriches it through the matcher, reconciles it with the persisted
//! snapshot, fires gated notifications, and persists the result. A failed
//! run leaves the previous snapshot untouched and emits nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fgw_core::{MergedGame, NotificationEvent, RunSummary, SkipReason, SkippedEntry, Snapshot};
use fgw_feeds::{
    CatalogLookup, GamerPowerFeed, IgdbLookup, NoopSink, NotificationSink, OfferFeed, WebhookSink,
};
use fgw_storage::{AuditLog, HttpClientConfig, HttpFetcher, SnapshotStore};
use tokio::fs;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{UnmatchedPolicy, WatchConfig};
use crate::diff::diff_ids;
use crate::gate::evaluate_gate;
use crate::matcher::{CatalogMatcher, MatchOutcome, MatcherConfig};
use crate::merge::merge_records;
use crate::throttle::{Throttle, TokenBucketThrottle};

pub struct WatchPipeline {
    config: WatchConfig,
    feed: Box<dyn OfferFeed>,
    lookup: Box<dyn CatalogLookup>,
    sink: Box<dyn NotificationSink>,
    throttle: Box<dyn Throttle>,
    matcher: CatalogMatcher,
    snapshot_store: SnapshotStore,
    audit_log: AuditLog,
}

impl WatchPipeline {
    pub fn new(
        config: WatchConfig,
        feed: Box<dyn OfferFeed>,
        lookup: Box<dyn CatalogLookup>,
        sink: Box<dyn NotificationSink>,
    ) -> Self {
        let matcher = CatalogMatcher::new(MatcherConfig {
            mode: config.match_mode,
            fuzzy_threshold: config.fuzzy_threshold,
        });
        let snapshot_store = SnapshotStore::new(config.snapshot_path());
        let audit_log = AuditLog::new(config.audit_log_path());
        let throttle: Box<dyn Throttle> = Box::new(TokenBucketThrottle::new(
            1,
            Duration::from_millis(config.lookup_interval_ms.max(1)),
        ));
        Self {
            config,
            feed,
            lookup,
            sink,
            throttle,
            matcher,
            snapshot_store,
            audit_log,
        }
    }

    pub fn with_throttle(mut self, throttle: Box<dyn Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        self.run_at(Utc::now()).await
    }

    /// One full snapshot comparison against the given evaluation instant.
    /// Persisting happens before delivery: the flags that gate idempotence
    /// are durable by the time the first notification leaves the process.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();

        let offers = self.feed.fetch_offers().await.context("fetching offer feed")?;
        let previous = self
            .snapshot_store
            .read()
            .await
            .context("reading persisted snapshot")?;

        let mut skipped_entries: Vec<SkippedEntry> = Vec::new();
        let mut fresh_games: BTreeMap<u64, MergedGame> = BTreeMap::new();
        let mut enriched = 0usize;

        for offer in &offers {
            self.throttle.pause().await;

            let outcome = match self.lookup.search(&offer.title).await {
                Ok(candidates) => self.matcher.match_offer(offer, &candidates),
                Err(err) => {
                    warn!(offer_id = offer.id, error = %err, "catalog lookup failed");
                    skipped_entries.push(SkippedEntry {
                        offer: offer.clone(),
                        reason: SkipReason::FetchError,
                        detail: Some(err.to_string()),
                        at: now,
                    });
                    if self.config.unmatched_policy == UnmatchedPolicy::Retain {
                        fresh_games.insert(offer.id, MergedGame::from_offer(offer, None));
                    }
                    continue;
                }
            };

            match outcome {
                MatchOutcome::Matched(enrichment) => {
                    enriched += 1;
                    fresh_games.insert(offer.id, MergedGame::from_offer(offer, Some(enrichment)));
                }
                MatchOutcome::Skipped(reason) => {
                    skipped_entries.push(SkippedEntry {
                        offer: offer.clone(),
                        reason,
                        detail: None,
                        at: now,
                    });
                    if self.config.unmatched_policy == UnmatchedPolicy::Retain {
                        fresh_games.insert(offer.id, MergedGame::from_offer(offer, None));
                    }
                }
            }
        }

        let previous_ids: BTreeSet<u64> = previous.games.keys().copied().collect();
        let current_ids: BTreeSet<u64> = fresh_games.keys().copied().collect();
        let diff = diff_ids(&previous_ids, &current_ids);

        let mut next = Snapshot::default();
        for (id, fresh) in fresh_games {
            next.games
                .insert(id, merge_records(fresh, previous.games.get(&id)));
        }

        let events = evaluate_gate(&mut next, &diff, now);

        let written = self
            .snapshot_store
            .write(&next, now)
            .await
            .context("persisting snapshot")?;

        let mut delivered = 0usize;
        for event in &events {
            match self.sink.send(event).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(
                        offer_id = event.offer_id,
                        kind = ?event.kind,
                        error = %err,
                        "notification delivery failed"
                    );
                }
            }
        }

        for entry in &skipped_entries {
            if let Err(err) = self.audit_log.append(entry).await {
                warn!(offer_id = entry.offer.id, error = %err, "audit log append failed");
            }
        }

        let summary = RunSummary {
            run_id,
            started_at: now,
            finished_at: Utc::now(),
            offers_seen: offers.len(),
            enriched,
            skipped: skipped_entries.len(),
            added: diff.added.len(),
            removed: diff.removed.len(),
            retained: diff.retained.len(),
            events_emitted: events.len(),
            events_delivered: delivered,
            snapshot_path: written.path.display().to_string(),
        };

        self.write_report(&summary, &events)
            .await
            .context("writing run report")?;

        info!(
            run_id = %summary.run_id,
            offers = summary.offers_seen,
            added = summary.added,
            removed = summary.removed,
            events = summary.events_emitted,
            "watch run complete"
        );

        Ok(summary)
    }

    pub async fn maybe_build_scheduler(self: Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        for cron in [&self.config.watch_cron_1, &self.config.watch_cron_2] {
            let pipeline = Arc::clone(&self);
            let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
                let pipeline = Arc::clone(&pipeline);
                Box::pin(async move {
                    match pipeline.run_once().await {
                        Ok(summary) => info!(
                            run_id = %summary.run_id,
                            added = summary.added,
                            removed = summary.removed,
                            "scheduled watch run complete"
                        ),
                        Err(err) => warn!(error = %err, "scheduled watch run failed"),
                    }
                })
            })
            .with_context(|| format!("creating scheduler job for cron {cron}"))?;
            sched.add(job).await.context("adding scheduler job")?;
        }
        Ok(Some(sched))
    }

    async fn write_report(
        &self,
        summary: &RunSummary,
        events: &[NotificationEvent],
    ) -> Result<PathBuf> {
        let report_dir = self.config.reports_dir().join(summary.run_id.to_string());
        fs::create_dir_all(&report_dir)
            .await
            .with_context(|| format!("creating {}", report_dir.display()))?;

        let summary_bytes =
            serde_json::to_vec_pretty(summary).context("serializing run summary")?;
        fs::write(report_dir.join("run_summary.json"), summary_bytes)
            .await
            .context("writing run_summary.json")?;

        let event_lines = if events.is_empty() {
            "- none".to_string()
        } else {
            events
                .iter()
                .map(|e| format!("- {:?}: {} ({})", e.kind, e.title, e.store.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let brief = format!(
            "# FGW Run Brief\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Offers seen: {}\n- Enriched: {}\n- Skipped: {}\n- Added: {} / Removed: {} / Retained: {}\n\n## Events\n{}\n",
            summary.run_id,
            summary.started_at,
            summary.finished_at,
            summary.offers_seen,
            summary.enriched,
            summary.skipped,
            summary.added,
            summary.removed,
            summary.retained,
            event_lines
        );
        fs::write(report_dir.join("brief.md"), brief)
            .await
            .context("writing brief.md")?;

        Ok(report_dir)
    }
}

/// Wire the production collaborators from env config and run one pass.
pub async fn run_watch_once_from_env() -> Result<RunSummary> {
    let config = WatchConfig::from_env();
    let pipeline = build_pipeline(config)?;
    pipeline.run_at(Utc::now()).await
}

/// Construct the pipeline with its HTTP collaborators. Webhook delivery is
/// optional; without a configured URL events are computed and logged only.
pub fn build_pipeline(config: WatchConfig) -> Result<WatchPipeline> {
    let fetcher = Arc::new(HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
        ..Default::default()
    })?);

    let feed = GamerPowerFeed::new(Arc::clone(&fetcher), config.feed_url.clone());
    let lookup = IgdbLookup::new(
        Arc::clone(&fetcher),
        config.catalog_url.clone(),
        config.catalog_client_id.clone(),
        config.catalog_token.clone(),
    );
    let sink: Box<dyn NotificationSink> = match &config.webhook_url {
        Some(url) => Box::new(WebhookSink::new(Arc::clone(&fetcher), url.clone())),
        None => Box::new(NoopSink),
    };

    Ok(WatchPipeline::new(
        config,
        Box::new(feed),
        Box::new(lookup),
        sink,
    ))
}

/// Summarize the most recent run reports as markdown, newest first.
pub fn report_recent_markdown(runs: usize, state_dir: Option<PathBuf>) -> Result<String> {
    let root = state_dir.unwrap_or_else(|| PathBuf::from("./state"));
    let reports_root = root.join("reports");
    let mut dirs = std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();
    let dirs = dirs.into_iter().take(runs.max(1)).collect::<Vec<_>>();

    let mut lines = vec!["# FGW Recent Runs".to_string(), String::new()];
    for dir in dirs {
        let summary_path = dir.path().join("run_summary.json");
        let brief_path = dir.path().join("brief.md");

        let summary: RunSummary = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;

        lines.push(format!("## Run `{}`", summary.run_id));
        lines.push(format!("- started: {}", summary.started_at));
        lines.push(format!(
            "- offers: {} (enriched {}, skipped {})",
            summary.offers_seen, summary.enriched, summary.skipped
        ));
        lines.push(format!(
            "- diff: +{} / -{} / ={}",
            summary.added, summary.removed, summary.retained
        ));
        lines.push(format!(
            "- events: {} emitted, {} delivered",
            summary.events_emitted, summary.events_delivered
        ));
        if brief_path.exists() {
            lines.push(format!("- brief: `{}`", brief_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}
