use crate::cache::PromotingCache;
use crate::error::Result;
use crate::index::snapshot::Snapshot;
use crate::types::{DocumentRequest, FieldSelector, ResolvedDocument};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tantivy::{DocAddress, Searcher};

/// Deep-copied stored fields for one `(request shape, index, doc id)`
/// triple. Entries stay valid across later reloads because the values were
/// copied out of the snapshot at fetch time.
pub struct DocumentCacheEntry {
    pub key: String,
    pub id: String,
    pub fields: Map<String, Value>,
}

pub(crate) type DocumentCache = Mutex<PromotingCache<String, Arc<DocumentCacheEntry>>>;

/// Cache key for one document fetch, or `None` when the request shape is not
/// safely cacheable (unnamed requests carry an ad-hoc field selection).
pub(crate) fn document_cache_key(
    request: &DocumentRequest,
    index_name: &str,
    addr: DocAddress,
) -> Option<String> {
    request
        .name
        .as_ref()
        .map(|name| format!("{}|{}|{}:{}", name, index_name, addr.segment_ord, addr.doc_id))
}

/// Resolve stored fields for one document id, reading through the document
/// cache. Absent ids resolve to `None`.
pub(crate) fn fetch(
    request: &DocumentRequest,
    addr: DocAddress,
    snapshot: &Snapshot,
    searcher: &Searcher,
    cache: &DocumentCache,
) -> Result<Option<ResolvedDocument>> {
    let key = document_cache_key(request, snapshot.name(), addr);
    if let Some(k) = &key {
        if let Some(entry) = cache.lock().get_and_promote(k) {
            return Ok(Some(ResolvedDocument {
                address: addr,
                id: entry.id.clone(),
                fields: select_fields(&entry.fields, &request.selector),
            }));
        }
    }

    let Some((id, attrs)) = snapshot.stored_source(searcher, addr)? else {
        return Ok(None);
    };
    let fields = select_fields(&attrs, &request.selector);
    if let Some(k) = key {
        cache.lock().put(
            k.clone(),
            Arc::new(DocumentCacheEntry {
                key: k,
                id: id.clone(),
                fields: fields.clone(),
            }),
        );
    }
    Ok(Some(ResolvedDocument {
        address: addr,
        id,
        fields,
    }))
}

/// Project a stored attribute map onto the request's selector.
fn select_fields(attrs: &Map<String, Value>, selector: &FieldSelector) -> Map<String, Value> {
    match selector {
        FieldSelector::All => attrs.clone(),
        FieldSelector::Fields(names) => names
            .iter()
            .filter_map(|name| attrs.get(name).map(|v| (name.clone(), v.clone())))
            .collect(),
    }
}
