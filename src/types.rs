use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tantivy::DocAddress;

/// Default cap on the number of hit ids carried by a [`DocSetHits`].
pub const DEFAULT_SEARCH_LIMIT: usize = 1_000;

/// A search request against one named index.
///
/// Two requests with identical logical content (query text, filter set
/// regardless of order, sort, facet fields) resolve to the same cache key,
/// so the second execution against an unchanged snapshot is a cache hit.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Query text, handed to the query parser. `""` and `"*"` match all
    /// documents.
    pub query: String,
    /// Filter conditions, combined with AND semantics.
    pub filters: Vec<FilterCondition>,
    /// Optional sort on a stored attribute. Without it, hits are in stable
    /// index order.
    pub sort: Option<Sort>,
    /// Maximum number of hit ids to return. The total match count is
    /// reported regardless.
    pub limit: usize,
    /// Attributes to compute value counts for. Non-empty makes this a facet
    /// request.
    pub facet_fields: Vec<String>,
    /// Marks a search issued to locate documents for removal. Delete
    /// searches bypass the search cache in both directions and, on a
    /// positive match count, trigger a reload attempt.
    pub is_delete: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        SearchRequest {
            query: query.into(),
            filters: Vec::new(),
            sort: None,
            limit: DEFAULT_SEARCH_LIMIT,
            facet_fields: Vec::new(),
            is_delete: false,
        }
    }

    pub fn is_facet(&self) -> bool {
        !self.facet_fields.is_empty()
    }
}

/// A single filter condition over a stored attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    Equals { field: String, value: String },
    Range { field: String, min: i64, max: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort hits by the stored value of one attribute.
#[derive(Debug, Clone)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    /// Canonical key fragment, appended to the search cache key.
    pub fn sort_key(&self) -> String {
        let dir = match self.order {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        };
        format!("{}:{}", self.field, dir)
    }
}

/// The result of one search execution: the matched document ids plus the
/// total match count.
///
/// Hit ids are only meaningful against the snapshot the search ran on; the
/// reader clears its caches on reload so a `DocSetHits` never outlives its
/// snapshot.
#[derive(Debug, Clone)]
pub struct DocSetHits {
    /// Matched ids, truncated to the request limit. Stable index order
    /// unless the request carried a sort.
    pub matched: Vec<DocAddress>,
    /// Total number of matching documents, before truncation.
    pub doc_count: usize,
    pub is_facet: bool,
    /// Value counts per requested facet field. Empty unless `is_facet`.
    pub facet_counts: HashMap<String, Vec<FacetCount>>,
}

/// A single facet value and its document count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetCount {
    pub value: String,
    pub count: u64,
}

/// Which stored fields a document fetch should resolve.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSelector {
    /// Every stored attribute.
    All,
    /// Only the named attributes.
    Fields(Vec<String>),
}

/// A stored-field fetch for a set of document ids.
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    /// Name of the request shape. Named requests have a fixed, deterministic
    /// field selection and are cacheable; unnamed requests always bypass the
    /// document cache.
    pub name: Option<String>,
    pub doc_ids: Vec<DocAddress>,
    pub selector: FieldSelector,
}

impl DocumentRequest {
    pub fn new(doc_ids: Vec<DocAddress>, selector: FieldSelector) -> Self {
        DocumentRequest {
            name: None,
            doc_ids,
            selector,
        }
    }

    pub fn named(
        name: impl Into<String>,
        doc_ids: Vec<DocAddress>,
        selector: FieldSelector,
    ) -> Self {
        DocumentRequest {
            name: Some(name.into()),
            doc_ids,
            selector,
        }
    }
}

/// Stored field values resolved for one document id.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub address: DocAddress,
    /// The document's external identifier.
    pub id: String,
    /// Deep-copied stored values, projected to the request's selector.
    /// Valid across later reloads.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Read-only metadata about the active snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatistics {
    pub name: String,
    pub version: u64,
    pub doc_count: usize,
    pub generation_dir: PathBuf,
}

/// Capacities for the three result-cache tiers. A capacity of 0 disables
/// that tier.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub search: usize,
    pub filter: usize,
    pub document: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            search: 2_048,
            filter: 512,
            document: 8_192,
        }
    }
}
