use crate::cache::PromotingCache;
use crate::error::{LanternError, Result};
use crate::index::snapshot::Snapshot;
use crate::index::ATTRS_FIELD;
use crate::types::FilterCondition;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tantivy::collector::DocSetCollector;
use tantivy::DocAddress;

/// A materialized hit-set: the documents matching one filter-condition list,
/// evaluated against one snapshot.
///
/// The recorded snapshot version guards the ids: they are only meaningful
/// for the snapshot they were built from, and the reader clears the filter
/// cache on reload so a `FilterHits` is never consulted across versions.
#[derive(Debug)]
pub struct FilterHits {
    pub filter_key: String,
    pub snapshot_version: u64,
    pub docs: HashSet<DocAddress>,
}

pub(crate) type FilterCache = Mutex<PromotingCache<String, Arc<FilterHits>>>;

impl FilterCondition {
    /// Canonical form of one condition, used to build the filter cache key.
    pub fn cache_key(&self) -> String {
        match self {
            FilterCondition::Equals { field, value } => format!("{field}={value}"),
            FilterCondition::Range { field, min, max } => format!("{field}:[{min} TO {max}]"),
        }
    }

    /// The query-engine form of one condition, addressing the attribute
    /// field by path.
    fn to_query_string(&self) -> String {
        match self {
            FilterCondition::Equals { field, value } => {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                format!("{ATTRS_FIELD}.{field}:\"{escaped}\"")
            }
            FilterCondition::Range { field, min, max } => {
                format!("{ATTRS_FIELD}.{field}:[{min} TO {max}]")
            }
        }
    }
}

/// Order-independent key for a filter-condition list: two lists with the
/// same conditions in any order produce the same key.
pub fn filter_list_key(conditions: &[FilterCondition]) -> String {
    let mut keys: Vec<String> = conditions.iter().map(FilterCondition::cache_key).collect();
    keys.sort();
    keys.join(";")
}

/// Resolve a filter-condition list to its hit-set against `snapshot`,
/// reading through the filter cache. An empty list short-circuits to "no
/// filtering" without touching the cache. Conditions combine with AND
/// semantics.
pub(crate) fn materialize(
    conditions: &[FilterCondition],
    snapshot: &Snapshot,
    cache: &FilterCache,
) -> Result<Option<Arc<FilterHits>>> {
    if conditions.is_empty() {
        return Ok(None);
    }

    let key = filter_list_key(conditions);
    if let Some(hits) = cache.lock().get_and_promote(&key) {
        // A cached hit-set from another version means the reload protocol
        // failed to clear this cache; refuse to serve it.
        if hits.snapshot_version != snapshot.version() {
            return Err(LanternError::StaleSnapshot {
                cached: hits.snapshot_version,
                active: snapshot.version(),
            });
        }
        return Ok(Some(hits));
    }

    let parser = snapshot.query_parser();
    let searcher = snapshot.searcher();
    let mut combined: Option<HashSet<DocAddress>> = None;
    for condition in conditions {
        let query = parser.parse_query(&condition.to_query_string())?;
        snapshot.record_evaluation();
        let docs = searcher.search(&query, &DocSetCollector)?;
        combined = Some(match combined {
            None => docs,
            Some(prev) => prev.intersection(&docs).copied().collect(),
        });
    }

    let hits = Arc::new(FilterHits {
        filter_key: key.clone(),
        snapshot_version: snapshot.version(),
        docs: combined.unwrap_or_default(),
    });
    cache.lock().put(key, Arc::clone(&hits));
    Ok(Some(hits))
}
