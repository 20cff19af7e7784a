//! Versioned full-text index reader with hot reload and multi-tier result
//! caching.
//!
//! An independent writer publishes immutable on-disk *generations* of a
//! tantivy index under one root directory. A [`ReaderManager`] holds a
//! [`Snapshot`] of the most recent generation, serves concurrent search,
//! filter, and document-fetch operations against it through three LRU
//! caches, and atomically swaps in newer generations without interrupting
//! in-flight readers.
//!
//! ```rust,no_run
//! use lantern::{CacheConfig, ReaderManager, SearchRequest};
//!
//! # fn main() -> lantern::Result<()> {
//! let reader = ReaderManager::open_or_create("products", "./data/products", CacheConfig::default(), true)?;
//! let hits = reader.search(&SearchRequest::new("laptop"))?;
//! println!("{} matches", hits.doc_count);
//! reader.reload_if_newer(false)?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod index;
pub mod query;
pub mod types;

pub use cache::{CacheStatistics, PromotingCache};
pub use error::{LanternError, Result};
pub use index::document::DocumentCacheEntry;
pub use index::reader::{ReaderCacheStatistics, ReaderManager};
pub use index::registry::ReaderRegistry;
pub use index::snapshot::{find_most_recent, Snapshot};
pub use index::writer::{LocalWriter, WriterBackend};
pub use query::filter::{filter_list_key, FilterHits};
pub use types::{
    CacheConfig, DocSetHits, DocumentRequest, FacetCount, FieldSelector, FilterCondition,
    IndexStatistics, ResolvedDocument, SearchRequest, Sort, SortOrder, DEFAULT_SEARCH_LIMIT,
};
