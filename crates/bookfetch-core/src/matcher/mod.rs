//! Candidate matching.
//!
//! A catalog search by title is noisy: it returns other editions, unrelated
//! books sharing a word, and formats we cannot use. `filter_candidates` keeps
//! only records whose extension is accepted and whose title contains most of
//! the target title's words (at most `mismatch_budget` missing, and at least
//! one shared). Author data is too unreliable at the source to
//! act as a gate, so it never disqualifies a candidate.

mod tokenize;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::progress::Candidate;

pub use tokenize::{token_set, tokenize};

/// Behaviour when the target title yields no usable words (e.g. missing metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTargetPolicy {
    /// Every extension-eligible candidate passes the title check.
    #[default]
    AcceptAll,
    /// Nothing matches an empty target.
    RejectAll,
}

/// Filter tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOptions {
    /// Number of target-title words allowed to be missing from a candidate title.
    pub mismatch_budget: usize,
    /// Lower-case extensions without the leading dot.
    pub accepted_extensions: BTreeSet<String>,
    pub on_empty_target: EmptyTargetPolicy,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            mismatch_budget: 3,
            accepted_extensions: ["epub", "mobi", "pdf"].iter().map(|s| s.to_string()).collect(),
            on_empty_target: EmptyTargetPolicy::AcceptAll,
        }
    }
}

/// What we are looking for.
#[derive(Debug, Clone, Copy)]
pub struct MatchTarget<'a> {
    pub title: &'a str,
    pub author: &'a str,
}

/// Narrows `catalog` to the candidates matching `target`, keyed by their original identifiers.
pub fn filter_candidates(
    target: MatchTarget<'_>,
    catalog: &BTreeMap<String, Candidate>,
    opts: &MatchOptions,
) -> BTreeMap<String, Candidate> {
    let title_words = tokenize(target.title);
    // Author words are computed for logging only; see module docs.
    let author_words = tokenize(target.author);

    if title_words.is_empty() && opts.on_empty_target == EmptyTargetPolicy::RejectAll {
        tracing::debug!(title = target.title, "empty target title, rejecting all candidates");
        return BTreeMap::new();
    }

    let mut kept = BTreeMap::new();
    for (key, candidate) in catalog {
        if !extension_accepted(&candidate.extension, opts) {
            continue;
        }
        let candidate_words = token_set(&candidate.title);
        let missing = title_words
            .iter()
            .filter(|w| !candidate_words.contains(w.as_str()))
            .count();
        // A non-empty target must share at least one word, whatever the budget.
        if missing > opts.mismatch_budget || (!title_words.is_empty() && missing == title_words.len()) {
            continue;
        }
        kept.insert(key.clone(), candidate.clone());
    }

    tracing::debug!(
        title = target.title,
        author_words = author_words.len(),
        searched = catalog.len(),
        kept = kept.len(),
        "filtered catalog results"
    );
    kept
}

fn extension_accepted(extension: &str, opts: &MatchOptions) -> bool {
    let ext = extension.trim().trim_start_matches('.').to_lowercase();
    !ext.is_empty() && opts.accepted_extensions.contains(&ext)
}
