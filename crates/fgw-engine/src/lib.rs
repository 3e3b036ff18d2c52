//! Reconciliation and matching engine for the free-game watcher: title
//! normalization, catalog matching, snapshot diffing, edit-preserving
//! merges, and the idempotent notification gate, wired together by the
//! watch pipeline.

pub mod classify;
pub mod config;
pub mod diff;
pub mod gate;
pub mod matcher;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod throttle;

pub const CRATE_NAME: &str = "fgw-engine";

pub use classify::{classify, Verdict, PC_PLATFORM_IDS};
pub use config::{UnmatchedPolicy, WatchConfig};
pub use diff::diff_ids;
pub use gate::evaluate_gate;
pub use matcher::{CatalogMatcher, MatchMode, MatchOutcome, MatcherConfig};
pub use merge::merge_records;
pub use normalize::normalize;
pub use pipeline::{build_pipeline, report_recent_markdown, run_watch_once_from_env, WatchPipeline};
pub use throttle::{NoThrottle, Throttle, TokenBucketThrottle};
