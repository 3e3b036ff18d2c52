//! Candidate classification. Free-text catalog search happily returns the
//! sequel, the remaster, or the console port of whatever was asked for; the
//! offer title is the only ground truth for which variant is actually being
//! given away, so any catalog attribute not evidenced in the source title
//! counts against the candidate.

use std::collections::HashSet;

use crate::normalize::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    Confusing,
    WrongPlatform,
}

/// Catalog platform ids a PC giveaway can legitimately resolve to:
/// 6 = PC (Windows), 3 = Linux, 14 = Mac.
pub const PC_PLATFORM_IDS: &[u64] = &[6, 3, 14];

const EDITION_KEYWORDS: &[&str] = &[
    "remastered",
    "definitive",
    "goty",
    "complete",
    "hd",
    "ultimate",
    "anniversary",
    "collection",
    "trilogy",
    "bundle",
    "director",
    "redux",
    "reloaded",
    "remake",
];

/// Decide whether `candidate_name` can stand in for `source_title`.
///
/// A numeric token or edition keyword present in the candidate but absent
/// from the source marks an unrequested sequel or re-release (`Confusing`);
/// a candidate with no PC platform is a console-only entry
/// (`WrongPlatform`). Biased toward false negatives: a skipped offer is
/// recoverable, wrong enrichment shown to users is not.
pub fn classify(source_title: &str, candidate_name: &str, candidate_platforms: &[u64]) -> Verdict {
    let source = normalize(source_title);
    let candidate = normalize(candidate_name);
    let source_tokens: HashSet<&str> = source.split_whitespace().collect();

    for token in candidate.split_whitespace() {
        let numeric = !token.is_empty() && token.chars().all(|c| c.is_ascii_digit());
        if numeric && !source_tokens.contains(token) {
            return Verdict::Confusing;
        }
    }

    for token in candidate.split_whitespace() {
        if EDITION_KEYWORDS.contains(&token) && !source_tokens.contains(token) {
            return Verdict::Confusing;
        }
    }

    if !candidate_platforms
        .iter()
        .any(|p| PC_PLATFORM_IDS.contains(p))
    {
        return Verdict::WrongPlatform;
    }

    Verdict::Match
}
