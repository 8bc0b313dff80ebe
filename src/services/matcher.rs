//! Place matching: tiered gazetteer search merged with geocoder results.
//!
//! The matcher never fails — geocoder errors are swallowed and an empty
//! result set is a valid outcome.

use std::collections::HashSet;
use std::sync::Arc;

use crate::gazetteer::{Gazetteer, GazetteerEntry, PlaceCandidate};
use crate::services::geocode::NominatimClient;

/// Maximum number of results returned by a search.
const MAX_RESULTS: usize = 20;

/// How a gazetteer entry matched a query. Tier determines inclusion only,
/// not ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    /// Name equals query, or query is a member of the alias set.
    Exact,
    /// Name or an alias starts with the query.
    Prefix,
    /// Name or an alias contains the query.
    Substring,
    /// Every whitespace token of the query matches name or an alias.
    MultiToken,
    /// One-character query contained in the name.
    SingleChar,
}

/// Match a gazetteer entry against a normalized (trimmed, lowercased) query.
pub fn match_tier(entry: &GazetteerEntry, query: &str) -> Option<MatchTier> {
    let name = entry.name.to_lowercase();
    let aliases = &entry.aliases;

    if name == query || aliases.iter().any(|a| a == query) {
        return Some(MatchTier::Exact);
    }
    if name.starts_with(query) || aliases.iter().any(|a| a.starts_with(query)) {
        return Some(MatchTier::Prefix);
    }
    if name.contains(query) || aliases.iter().any(|a| a.contains(query)) {
        return Some(MatchTier::Substring);
    }

    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.len() >= 2
        && tokens
            .iter()
            .all(|t| name.contains(t) || aliases.iter().any(|a| a.contains(t)))
    {
        return Some(MatchTier::MultiToken);
    }

    if query.chars().count() == 1 && name.contains(query) {
        return Some(MatchTier::SingleChar);
    }

    None
}

/// City search over the curated gazetteer plus live geocoder results.
#[derive(Clone)]
pub struct PlaceMatcher {
    gazetteer: Arc<Gazetteer>,
    geocoder: NominatimClient,
}

impl PlaceMatcher {
    pub fn new(gazetteer: Arc<Gazetteer>, geocoder: NominatimClient) -> Self {
        Self {
            gazetteer,
            geocoder,
        }
    }

    /// First N curated cities, served for the empty query.
    pub fn hot_cities(&self) -> Vec<PlaceCandidate> {
        self.gazetteer.hot_cities()
    }

    /// Search for places matching a free-text query.
    ///
    /// Gazetteer matches and geocoder results are unioned, deduplicated by
    /// exact name, sorted (names starting with the query first, then by
    /// name length) and truncated to 20.
    pub async fn search(&self, query: &str) -> Vec<PlaceCandidate> {
        let normalized = crate::helpers::normalize_city_key(query);
        if normalized.is_empty() {
            return self.hot_cities();
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut results: Vec<PlaceCandidate> = Vec::new();

        for entry in self.gazetteer.entries() {
            if match_tier(entry, &normalized).is_some() && seen.insert(entry.name.clone()) {
                results.push(entry.candidate());
            }
        }

        // Geocoder contributes nothing on failure; the search still succeeds.
        match self.geocoder.search(query).await {
            Ok(remote) => {
                for candidate in remote {
                    if seen.insert(candidate.name.clone()) {
                        results.push(candidate);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Geocoder search failed, serving gazetteer only: {}", e);
            }
        }

        sort_candidates(&mut results, &normalized);
        results.truncate(MAX_RESULTS);
        results
    }
}

/// Names starting with the query sort first; ties break by name length
/// ascending (shorter = more general = ranked higher).
fn sort_candidates(candidates: &mut [PlaceCandidate], normalized_query: &str) {
    candidates.sort_by(|a, b| {
        let a_starts = a.name.to_lowercase().starts_with(normalized_query);
        let b_starts = b.name.to_lowercase().starts_with(normalized_query);
        b_starts
            .cmp(&a_starts)
            .then(a.name.chars().count().cmp(&b.name.chars().count()))
    });
}
