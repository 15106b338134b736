//! Country name canonicalization.
//!
//! Resolution order for a free-text name:
//!
//! 1. the input is itself an ISO3 code in the reference list (`Code`)
//! 2. its folded form equals a folded official name (`Exact`) or alias (`Alias`)
//! 3. fuzzy: Jaro-Winkler against every folded name and alias, best score per
//!    country; the winner is the highest score, then the lexicographically
//!    smallest canonical name, then the ISO3 code. Accepted only at or above
//!    the threshold.
//!
//! A fuzzy candidate must also agree word for word: after dropping `and`/`of`,
//! both names have the same number of words and each word pair, in order, has
//! a normalized Damerau-Levenshtein similarity of at least [`WORD_FLOOR`].
//! Typos like "Frnace" or "Untied Kingdom" pass. Region names that share a
//! prefix with a country ("South Asia", "Southern Africa", "North America",
//! "Americas", "Virgin Islands") do not.
//!
//! Anything else is `Unresolved`. A code is never guessed.

pub mod normalize;
pub mod reference;

use rayon::prelude::*;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::debug;

pub use normalize::fold;
pub use reference::{CountryEntry, KeyKind, ReferenceList};

pub const DEFAULT_THRESHOLD: f64 = 0.90;

/// Minimum per-word similarity for a fuzzy candidate.
pub const WORD_FLOOR: f64 = 0.75;

const CONNECTIVES: &[&str] = &["and", "of"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Code,
    Exact,
    Alias,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountryMatch {
    pub iso3: String,
    /// Canonical name from the reference list.
    pub name: String,
    /// 1.0 for non-fuzzy matches.
    pub score: f64,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched(CountryMatch),
    Unresolved,
}

impl Resolution {
    pub fn iso3(&self) -> Option<&str> {
        match self {
            Resolution::Matched(m) => Some(&m.iso3),
            Resolution::Unresolved => None,
        }
    }

    pub fn matched(&self) -> Option<&CountryMatch> {
        match self {
            Resolution::Matched(m) => Some(m),
            Resolution::Unresolved => None,
        }
    }
}

/// Pure name -> code resolution over an immutable reference list.
#[derive(Debug, Clone)]
pub struct Resolver {
    reference: Arc<ReferenceList>,
    threshold: f64,
}

impl Resolver {
    pub fn new(reference: Arc<ReferenceList>, threshold: f64) -> Self {
        Self {
            reference,
            threshold,
        }
    }

    pub fn reference(&self) -> &Arc<ReferenceList> {
        &self.reference
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn resolve(&self, raw: &str) -> Resolution {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Resolution::Unresolved;
        }

        if let Some(entry) = self.reference.by_code(trimmed) {
            return matched(entry, 1.0, MatchKind::Code);
        }

        let key = fold(trimmed);
        if key.is_empty() {
            return Resolution::Unresolved;
        }

        if let Some((entry, kind)) = self.reference.by_key(&key) {
            let kind = match kind {
                KeyKind::Name => MatchKind::Exact,
                KeyKind::Alias => MatchKind::Alias,
            };
            return matched(entry, 1.0, kind);
        }

        match self.best_fuzzy(&key) {
            Some((entry, score)) if score >= self.threshold => {
                matched(entry, score, MatchKind::Fuzzy)
            }
            Some((entry, score)) => {
                debug!(name = raw, nearest = %entry.iso3, score, "below match threshold");
                Resolution::Unresolved
            }
            None => Resolution::Unresolved,
        }
    }

    fn best_fuzzy(&self, key: &str) -> Option<(&CountryEntry, f64)> {
        let mut best_per_country: HashMap<&str, (&CountryEntry, f64)> = HashMap::new();
        for (candidate, entry) in self.reference.candidates() {
            if !words_agree(key, candidate) {
                continue;
            }
            let score = strsim::jaro_winkler(key, candidate);
            best_per_country
                .entry(entry.iso3.as_str())
                .and_modify(|slot| {
                    if score > slot.1 {
                        slot.1 = score;
                    }
                })
                .or_insert((entry, score));
        }

        best_per_country.into_values().min_by(|a, b| rank(a, b))
    }
}

fn content_words(folded: &str) -> Vec<&str> {
    folded
        .split_whitespace()
        .filter(|w| !CONNECTIVES.contains(w))
        .collect()
}

/// Same word count, and every word pair within an edit or two.
fn words_agree(key: &str, candidate: &str) -> bool {
    let (a, b) = (content_words(key), content_words(candidate));
    a.len() == b.len()
        && a.iter()
            .zip(&b)
            .all(|(x, y)| strsim::normalized_damerau_levenshtein(x, y) >= WORD_FLOOR)
}

/// Ordering where the preferred candidate sorts first.
fn rank(a: &(&CountryEntry, f64), b: &(&CountryEntry, f64)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.name.cmp(&b.0.name))
        .then_with(|| a.0.iso3.cmp(&b.0.iso3))
}

fn matched(entry: &CountryEntry, score: f64, kind: MatchKind) -> Resolution {
    Resolution::Matched(CountryMatch {
        iso3: entry.iso3.clone(),
        name: entry.name.clone(),
        score,
        kind,
    })
}

/// A resolver plus a cache keyed by the exact input string. One instance per
/// pipeline run; nothing is shared across runs.
#[derive(Debug)]
pub struct Canonicalizer {
    resolver: Resolver,
    cache: HashMap<String, Resolution>,
}

impl Canonicalizer {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            cache: HashMap::new(),
        }
    }

    /// Built-in reference list with the given threshold.
    pub fn builtin(threshold: f64) -> crate::error::PipelineResult<Self> {
        Ok(Self::new(Resolver::new(ReferenceList::builtin()?, threshold)))
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn resolve(&mut self, raw: &str) -> Resolution {
        if let Some(hit) = self.cache.get(raw) {
            return hit.clone();
        }
        let res = self.resolver.resolve(raw);
        self.cache.insert(raw.to_string(), res.clone());
        res
    }

    /// Resolve every distinct uncached name, in parallel, and return the
    /// resolutions for all of `names` keyed by input string.
    pub fn resolve_all<'a, I>(&mut self, names: I) -> BTreeMap<String, Resolution>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeMap<&str, ()> = names.into_iter().map(|n| (n, ())).collect();

        let pending: Vec<&str> = distinct
            .keys()
            .copied()
            .filter(|n| !self.cache.contains_key(*n))
            .collect();
        let resolver = &self.resolver;
        let fresh: Vec<(String, Resolution)> = pending
            .par_iter()
            .map(|n| (n.to_string(), resolver.resolve(n)))
            .collect();
        self.cache.extend(fresh);

        distinct
            .keys()
            .filter_map(|n| self.cache.get(*n).map(|r| (n.to_string(), r.clone())))
            .collect()
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
