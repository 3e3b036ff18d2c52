//! Drives the classifier over one offer's lookup candidates and settles on
//! either an enrichment record or a recorded skip reason. Candidates are
//! assumed relevance-ranked by the lookup service; the first acceptable hit
//! wins and nothing is ever dropped silently.

use fgw_core::{CatalogCandidate, EnrichmentRecord, Offer, SkipReason};
use strsim::sorensen_dice;

use crate::classify::{classify, Verdict};
use crate::normalize::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Accept only candidates whose normalized name equals the offer's
    /// normalized title.
    Strict,
    /// Score every candidate by string similarity and accept the best one
    /// above the threshold.
    Fuzzy,
}

#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    pub mode: MatchMode,
    pub fuzzy_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            mode: MatchMode::Strict,
            fuzzy_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(EnrichmentRecord),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogMatcher {
    config: MatcherConfig,
}

impl CatalogMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn match_offer(&self, offer: &Offer, candidates: &[CatalogCandidate]) -> MatchOutcome {
        if candidates.is_empty() {
            return MatchOutcome::Skipped(SkipReason::NoMatch);
        }
        match self.config.mode {
            MatchMode::Strict => self.match_strict(offer, candidates),
            MatchMode::Fuzzy => self.match_fuzzy(offer, candidates),
        }
    }

    fn match_strict(&self, offer: &Offer, candidates: &[CatalogCandidate]) -> MatchOutcome {
        let wanted = normalize(&offer.title);
        let mut rejection = RejectionTracker::default();

        for candidate in candidates {
            let verdict = classify(&offer.title, &candidate.name, &candidate.platforms);
            let name_equal = normalize(&candidate.name) == wanted;
            match verdict {
                Verdict::Match if name_equal => {
                    return MatchOutcome::Matched(EnrichmentRecord::from_candidate(candidate));
                }
                Verdict::Confusing => rejection.saw_confusing = true,
                Verdict::WrongPlatform if name_equal => rejection.saw_wrong_platform = true,
                _ => {}
            }
        }

        MatchOutcome::Skipped(rejection.reason())
    }

    fn match_fuzzy(&self, offer: &Offer, candidates: &[CatalogCandidate]) -> MatchOutcome {
        let source = offer.title.to_lowercase();
        let best = candidates
            .iter()
            .map(|candidate| {
                let score = sorensen_dice(&source, &candidate.name.to_lowercase());
                (candidate, score)
            })
            .max_by(|(_, a), (_, b)| a.total_cmp(b));

        let Some((candidate, score)) = best else {
            return MatchOutcome::Skipped(SkipReason::NoMatch);
        };
        if score < self.config.fuzzy_threshold {
            return MatchOutcome::Skipped(SkipReason::NoMatch);
        }

        match classify(&offer.title, &candidate.name, &candidate.platforms) {
            Verdict::Match => MatchOutcome::Matched(EnrichmentRecord::from_candidate(candidate)),
            Verdict::Confusing => MatchOutcome::Skipped(SkipReason::ConfusingMatch),
            Verdict::WrongPlatform => MatchOutcome::Skipped(SkipReason::WrongPlatform),
        }
    }
}

/// Skip-reason bookkeeping for the strict scan. The most specific rejection
/// observed across all candidates is reported: a sequel/edition confusion
/// over a platform miss over a plain no-match.
#[derive(Debug, Default, Clone, Copy)]
struct RejectionTracker {
    saw_confusing: bool,
    saw_wrong_platform: bool,
}

impl RejectionTracker {
    fn reason(&self) -> SkipReason {
        if self.saw_confusing {
            SkipReason::ConfusingMatch
        } else if self.saw_wrong_platform {
            SkipReason::WrongPlatform
        } else {
            SkipReason::NoMatch
        }
    }
}
