use crate::cache::PromotingCache;
use crate::error::Result;
use crate::index::snapshot::Snapshot;
use crate::query::filter::{self, FilterCache, FilterHits};
use crate::types::{DocSetHits, FacetCount, SearchRequest, Sort, SortOrder};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tantivy::collector::DocSetCollector;
use tantivy::query::{AllQuery, Query};
use tantivy::{DocAddress, Searcher};

pub(crate) type SearchCache = Mutex<PromotingCache<String, Arc<DocSetHits>>>;

/// Run one search request against `snapshot`, reading through the search and
/// filter caches.
///
/// Delete-shaped requests bypass the search cache in both directions: the
/// caller needs an authoritative match count to decide whether a reload must
/// follow, and a result that exists only to plan a removal must never be
/// served again.
pub(crate) fn execute(
    request: &SearchRequest,
    snapshot: &Snapshot,
    search_cache: &SearchCache,
    filter_cache: &FilterCache,
) -> Result<Arc<DocSetHits>> {
    let filter = filter::materialize(&request.filters, snapshot, filter_cache)?;
    let key = search_cache_key(request, filter.as_ref().map(|f| f.filter_key.as_str()));

    if !request.is_delete {
        if let Some(hits) = search_cache.lock().get_and_promote(&key) {
            return Ok(hits);
        }
    }

    let hits = Arc::new(execute_uncached(request, snapshot, filter.as_deref())?);
    if !request.is_delete {
        search_cache.lock().put(key, Arc::clone(&hits));
    }
    Ok(hits)
}

/// Canonical cache key for a search request. Identical logical content —
/// query text, filter set in any order, sort, facet fields — produces an
/// identical key.
pub(crate) fn search_cache_key(request: &SearchRequest, filter_key: Option<&str>) -> String {
    let mut key = request.query.clone();
    if let Some(fk) = filter_key {
        key.push('|');
        key.push_str(fk);
    }
    if let Some(sort) = &request.sort {
        key.push('_');
        key.push_str(&sort.sort_key());
    }
    if request.is_facet() {
        let mut fields = request.facet_fields.clone();
        fields.sort();
        key.push_str("|facet:");
        key.push_str(&fields.join(","));
    }
    key
}

fn execute_uncached(
    request: &SearchRequest,
    snapshot: &Snapshot,
    filter: Option<&FilterHits>,
) -> Result<DocSetHits> {
    let searcher = snapshot.searcher();
    let query = parse_query(snapshot, &request.query)?;
    snapshot.record_evaluation();
    let matched_set: HashSet<DocAddress> = searcher.search(&query, &DocSetCollector)?;

    let mut matched: Vec<DocAddress> = match filter {
        Some(f) => matched_set.intersection(&f.docs).copied().collect(),
        None => matched_set.into_iter().collect(),
    };
    matched.sort();
    let doc_count = matched.len();

    let facet_counts = if request.is_facet() {
        count_facets(snapshot, &searcher, &matched, &request.facet_fields)?
    } else {
        HashMap::new()
    };

    if let Some(sort) = &request.sort {
        apply_sort(snapshot, &searcher, &mut matched, sort)?;
    }
    matched.truncate(request.limit);

    Ok(DocSetHits {
        matched,
        doc_count,
        is_facet: request.is_facet(),
        facet_counts,
    })
}

fn parse_query(snapshot: &Snapshot, text: &str) -> Result<Box<dyn Query>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return Ok(Box::new(AllQuery));
    }
    Ok(snapshot.query_parser().parse_query(trimmed)?)
}

/// Order hits by the stored value of the sort field. Hits missing the field
/// sort after every valued hit; index order breaks ties so the result is
/// deterministic.
fn apply_sort(
    snapshot: &Snapshot,
    searcher: &Searcher,
    matched: &mut Vec<DocAddress>,
    sort: &Sort,
) -> Result<()> {
    let mut keyed: Vec<(SortValue, DocAddress)> = Vec::with_capacity(matched.len());
    for &addr in matched.iter() {
        let value = snapshot
            .stored_source(searcher, addr)?
            .and_then(|(_, attrs)| attrs.get(&sort.field).map(SortValue::from_json))
            .unwrap_or(SortValue::Missing);
        keyed.push((value, addr));
    }
    keyed.sort_by(|a, b| {
        let ord = a.0.compare(&b.0);
        let ord = match sort.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };
        ord.then_with(|| a.1.cmp(&b.1))
    });
    *matched = keyed.into_iter().map(|(_, addr)| addr).collect();
    Ok(())
}

enum SortValue {
    Number(f64),
    Text(String),
    Missing,
}

impl SortValue {
    fn from_json(value: &JsonValue) -> SortValue {
        match value {
            JsonValue::Number(n) => n.as_f64().map(SortValue::Number).unwrap_or(SortValue::Missing),
            JsonValue::String(s) => SortValue::Text(s.clone()),
            JsonValue::Bool(b) => SortValue::Text(b.to_string()),
            _ => SortValue::Missing,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortValue::Number(_) => 0,
            SortValue::Text(_) => 1,
            SortValue::Missing => 2,
        }
    }

    fn compare(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Count stored attribute values of the matched set, per requested facet
/// field. Arrays contribute one count per element.
fn count_facets(
    snapshot: &Snapshot,
    searcher: &Searcher,
    matched: &[DocAddress],
    fields: &[String],
) -> Result<HashMap<String, Vec<FacetCount>>> {
    let mut counters: Vec<HashMap<String, u64>> = vec![HashMap::new(); fields.len()];
    for &addr in matched {
        let Some((_, attrs)) = snapshot.stored_source(searcher, addr)? else {
            continue;
        };
        for (i, field) in fields.iter().enumerate() {
            if let Some(value) = attrs.get(field) {
                for facet_value in facet_values(value) {
                    *counters[i].entry(facet_value).or_insert(0) += 1;
                }
            }
        }
    }

    let mut out = HashMap::new();
    for (field, counter) in fields.iter().zip(counters) {
        let mut rows: Vec<FacetCount> = counter
            .into_iter()
            .map(|(value, count)| FacetCount { value, count })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        out.insert(field.clone(), rows);
    }
    Ok(out)
}

fn facet_values(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::String(s) => vec![s.clone()],
        JsonValue::Number(n) => vec![n.to_string()],
        JsonValue::Bool(b) => vec![b.to_string()],
        JsonValue::Array(items) => items.iter().flat_map(facet_values).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writer::{LocalWriter, WriterBackend};
    use crate::types::FilterCondition;
    use serde_json::json;

    fn sample_snapshot(root: &std::path::Path) -> Snapshot {
        let mut writer = LocalWriter::create_generation(root, 1).unwrap();
        writer
            .add_document("a", &json!({"title": "red laptop", "color": "red", "price": 30}))
            .unwrap();
        writer
            .add_document("b", &json!({"title": "blue laptop", "color": "blue", "price": 10}))
            .unwrap();
        writer
            .add_document("c", &json!({"title": "red phone", "color": "red", "price": 20}))
            .unwrap();
        writer.commit().unwrap();
        let data_dir = writer.data_dir().to_path_buf();
        drop(writer);
        Snapshot::open("idx", root, &data_dir).unwrap()
    }

    fn caches() -> (SearchCache, FilterCache) {
        (
            Mutex::new(PromotingCache::new(16)),
            Mutex::new(PromotingCache::new(16)),
        )
    }

    // ── cache keys ──────────────────────────────────────────────────────

    #[test]
    fn key_reflects_query_filter_sort_and_facets() {
        let mut req = SearchRequest::new("laptop");
        let bare = search_cache_key(&req, None);
        let filtered = search_cache_key(&req, Some("color=red"));
        req.sort = Some(Sort {
            field: "price".into(),
            order: SortOrder::Asc,
        });
        let sorted = search_cache_key(&req, Some("color=red"));
        req.facet_fields.push("color".into());
        let faceted = search_cache_key(&req, Some("color=red"));

        assert_eq!(bare, "laptop");
        assert_eq!(filtered, "laptop|color=red");
        assert_eq!(sorted, "laptop|color=red_price:asc");
        assert_eq!(faceted, "laptop|color=red_price:asc|facet:color");
    }

    #[test]
    fn facet_field_order_does_not_change_key() {
        let mut a = SearchRequest::new("*");
        a.facet_fields = vec!["color".into(), "brand".into()];
        let mut b = SearchRequest::new("*");
        b.facet_fields = vec!["brand".into(), "color".into()];
        assert_eq!(search_cache_key(&a, None), search_cache_key(&b, None));
    }

    // ── execution ───────────────────────────────────────────────────────

    #[test]
    fn match_all_counts_every_document() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(root.path());
        let (search_cache, filter_cache) = caches();
        let hits = execute(
            &SearchRequest::new("*"),
            &snapshot,
            &search_cache,
            &filter_cache,
        )
        .unwrap();
        assert_eq!(hits.doc_count, 3);
        assert_eq!(hits.matched.len(), 3);
    }

    #[test]
    fn text_query_matches_subset() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(root.path());
        let (search_cache, filter_cache) = caches();
        let hits = execute(
            &SearchRequest::new("laptop"),
            &snapshot,
            &search_cache,
            &filter_cache,
        )
        .unwrap();
        assert_eq!(hits.doc_count, 2);
    }

    #[test]
    fn filter_narrows_query_matches() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(root.path());
        let (search_cache, filter_cache) = caches();
        let mut req = SearchRequest::new("laptop");
        req.filters.push(FilterCondition::Equals {
            field: "color".into(),
            value: "red".into(),
        });
        let hits = execute(&req, &snapshot, &search_cache, &filter_cache).unwrap();
        assert_eq!(hits.doc_count, 1);
    }

    #[test]
    fn limit_truncates_ids_but_not_count() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(root.path());
        let (search_cache, filter_cache) = caches();
        let mut req = SearchRequest::new("*");
        req.limit = 2;
        let hits = execute(&req, &snapshot, &search_cache, &filter_cache).unwrap();
        assert_eq!(hits.doc_count, 3);
        assert_eq!(hits.matched.len(), 2);
    }

    #[test]
    fn second_execution_is_a_cache_hit() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(root.path());
        let (search_cache, filter_cache) = caches();
        let req = SearchRequest::new("laptop");
        let first = execute(&req, &snapshot, &search_cache, &filter_cache).unwrap();
        let evaluations = snapshot.evaluation_count();
        let second = execute(&req, &snapshot, &search_cache, &filter_cache).unwrap();
        assert_eq!(snapshot.evaluation_count(), evaluations);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn filter_order_still_hits_search_cache() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(root.path());
        let (search_cache, filter_cache) = caches();
        let red = FilterCondition::Equals {
            field: "color".into(),
            value: "red".into(),
        };
        let cheap = FilterCondition::Range {
            field: "price".into(),
            min: 0,
            max: 25,
        };
        let mut first = SearchRequest::new("*");
        first.filters = vec![red.clone(), cheap.clone()];
        let mut second = SearchRequest::new("*");
        second.filters = vec![cheap, red];

        execute(&first, &snapshot, &search_cache, &filter_cache).unwrap();
        let evaluations = snapshot.evaluation_count();
        let hits = execute(&second, &snapshot, &search_cache, &filter_cache).unwrap();
        assert_eq!(snapshot.evaluation_count(), evaluations);
        assert_eq!(hits.doc_count, 1);
    }

    #[test]
    fn delete_request_bypasses_search_cache() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(root.path());
        let (search_cache, filter_cache) = caches();
        let mut req = SearchRequest::new("laptop");
        req.is_delete = true;
        let hits = execute(&req, &snapshot, &search_cache, &filter_cache).unwrap();
        assert_eq!(hits.doc_count, 2);
        assert_eq!(search_cache.lock().len(), 0);

        // A delete search also never reads a previously cached result.
        let mut cached = SearchRequest::new("laptop");
        execute(&cached, &snapshot, &search_cache, &filter_cache).unwrap();
        cached.is_delete = true;
        let evaluations = snapshot.evaluation_count();
        execute(&cached, &snapshot, &search_cache, &filter_cache).unwrap();
        assert!(snapshot.evaluation_count() > evaluations);
    }

    #[test]
    fn sort_orders_by_stored_value() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(root.path());
        let (search_cache, filter_cache) = caches();
        let searcher = snapshot.searcher();

        let mut req = SearchRequest::new("*");
        req.sort = Some(Sort {
            field: "price".into(),
            order: SortOrder::Asc,
        });
        let hits = execute(&req, &snapshot, &search_cache, &filter_cache).unwrap();
        let prices: Vec<i64> = hits
            .matched
            .iter()
            .map(|&addr| {
                let (_, attrs) = snapshot.stored_source(&searcher, addr).unwrap().unwrap();
                attrs["price"].as_i64().unwrap()
            })
            .collect();
        assert_eq!(prices, vec![10, 20, 30]);

        let mut req = SearchRequest::new("*");
        req.sort = Some(Sort {
            field: "price".into(),
            order: SortOrder::Desc,
        });
        let hits = execute(&req, &snapshot, &search_cache, &filter_cache).unwrap();
        let first = hits.matched[0];
        let (_, attrs) = snapshot.stored_source(&searcher, first).unwrap().unwrap();
        assert_eq!(attrs["price"], json!(30));
    }

    #[test]
    fn facet_request_counts_stored_values() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(root.path());
        let (search_cache, filter_cache) = caches();
        let mut req = SearchRequest::new("*");
        req.facet_fields.push("color".into());
        let hits = execute(&req, &snapshot, &search_cache, &filter_cache).unwrap();
        assert!(hits.is_facet);
        let colors = &hits.facet_counts["color"];
        assert_eq!(
            colors[0],
            FacetCount {
                value: "red".into(),
                count: 2
            }
        );
        assert_eq!(
            colors[1],
            FacetCount {
                value: "blue".into(),
                count: 1
            }
        );
    }

    #[test]
    fn non_facet_request_has_no_facet_counts() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(root.path());
        let (search_cache, filter_cache) = caches();
        let hits = execute(
            &SearchRequest::new("*"),
            &snapshot,
            &search_cache,
            &filter_cache,
        )
        .unwrap();
        assert!(!hits.is_facet);
        assert!(hits.facet_counts.is_empty());
    }
}
