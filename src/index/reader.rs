use crate::cache::{CacheStatistics, PromotingCache};
use crate::error::{LanternError, Result};
use crate::index::document::{self, DocumentCache};
use crate::index::snapshot::{self, Snapshot};
use crate::index::generation_dir_name;
use crate::query::executor::{self, SearchCache};
use crate::query::filter::FilterCache;
use crate::types::{
    CacheConfig, DocSetHits, DocumentRequest, IndexStatistics, ResolvedDocument, SearchRequest,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-tier cache statistics for one reader.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReaderCacheStatistics {
    pub search: CacheStatistics,
    pub filter: CacheStatistics,
    pub document: CacheStatistics,
}

/// Serves search, filter, and document-fetch operations against the active
/// [`Snapshot`] of one named index, and hot-swaps in newer on-disk
/// generations without interrupting in-flight readers.
///
/// One read-write lock guards the active snapshot: operations that only read
/// it (search, fetch, statistics) take the shared lock and run concurrently;
/// operations that replace it or clear caches (reload, delete-triggered
/// reload, close) take the exclusive lock. `None` behind the lock is the
/// terminal closed state.
///
/// Each cache sits in its own mutex because cache reads mutate recency
/// order. Lock order is manager lock, then cache mutex; a cache mutex is
/// never held across a snapshot read. Two shared holders racing to populate
/// the same key both compute and both insert; the later insert wins, which
/// is sound because cache values are pure functions of (snapshot version,
/// key).
pub struct ReaderManager {
    name: String,
    root_dir: PathBuf,
    state: RwLock<Option<Snapshot>>,
    search_cache: SearchCache,
    filter_cache: FilterCache,
    document_cache: DocumentCache,
}

impl std::fmt::Debug for ReaderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderManager")
            .field("name", &self.name)
            .field("root_dir", &self.root_dir)
            .finish_non_exhaustive()
    }
}

impl ReaderManager {
    /// Discover the most recent generation under `root_dir` and open it. If
    /// none exists and `create_if_missing` is set, a fresh empty generation
    /// is created; otherwise the index is reported as not found.
    pub fn open_or_create(
        name: &str,
        root_dir: impl AsRef<Path>,
        cache_config: CacheConfig,
        create_if_missing: bool,
    ) -> Result<ReaderManager> {
        let root_dir = root_dir.as_ref();
        if !root_dir.exists() {
            if !create_if_missing {
                return Err(LanternError::IndexNotFound(name.to_string()));
            }
            std::fs::create_dir_all(root_dir)?;
        }

        let snapshot = match snapshot::find_most_recent(name, root_dir, false) {
            Some(snapshot) => snapshot,
            None if create_if_missing => {
                let data_dir = root_dir.join(generation_dir_name(1));
                Snapshot::create_empty(name, root_dir, &data_dir)?
            }
            None => return Err(LanternError::IndexNotFound(name.to_string())),
        };
        tracing::info!(
            "[{}] opened generation version {} ({} docs)",
            name,
            snapshot.version(),
            snapshot.doc_count()
        );

        Ok(ReaderManager {
            name: name.to_string(),
            root_dir: root_dir.to_path_buf(),
            state: RwLock::new(Some(snapshot)),
            search_cache: Mutex::new(PromotingCache::new(cache_config.search)),
            filter_cache: Mutex::new(PromotingCache::new(cache_config.filter)),
            document_cache: Mutex::new(PromotingCache::new(cache_config.document)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Execute a search under the shared lock, except for delete-shaped
    /// requests, which take the exclusive lock: a positive-hit delete search
    /// means the caller is about to remove documents through the writer, so
    /// the manager immediately attempts to adopt whatever newer generation
    /// exists before returning. If the writer has not published one yet this
    /// is a benign no-op and a later explicit reload picks it up.
    pub fn search(&self, request: &SearchRequest) -> Result<Arc<DocSetHits>> {
        if request.is_delete {
            let mut state = self.state.write();
            let hits = {
                let snapshot = state.as_ref().ok_or_else(|| self.closed())?;
                executor::execute(request, snapshot, &self.search_cache, &self.filter_cache)?
            };
            if hits.doc_count > 0 {
                self.reload_locked(&mut state, false)?;
            }
            Ok(hits)
        } else {
            let state = self.state.read();
            let snapshot = state.as_ref().ok_or_else(|| self.closed())?;
            executor::execute(request, snapshot, &self.search_cache, &self.filter_cache)
        }
    }

    /// Resolve stored fields for every requested doc id under the shared
    /// lock. Absent ids are skipped, not errors.
    pub fn fetch_documents(&self, request: &DocumentRequest) -> Result<Vec<ResolvedDocument>> {
        let state = self.state.read();
        let snapshot = state.as_ref().ok_or_else(|| self.closed())?;
        let searcher = snapshot.searcher();
        let mut resolved = Vec::with_capacity(request.doc_ids.len());
        for &addr in &request.doc_ids {
            if let Some(doc) =
                document::fetch(request, addr, snapshot, &searcher, &self.document_cache)?
            {
                resolved.push(doc);
            }
        }
        Ok(resolved)
    }

    /// Re-discover the most recent on-disk generation and, if it is strictly
    /// newer than the active snapshot, adopt it and clear all three caches.
    /// Returns whether a swap happened. With `delete_stale_generations`,
    /// superseded and unopenable generation directories are deleted during
    /// discovery.
    pub fn reload_if_newer(&self, delete_stale_generations: bool) -> Result<bool> {
        let mut state = self.state.write();
        self.reload_locked(&mut state, delete_stale_generations)
    }

    fn reload_locked(&self, state: &mut Option<Snapshot>, cleanup: bool) -> Result<bool> {
        let active_version = state.as_ref().ok_or_else(|| self.closed())?.version();
        let Some(candidate) = snapshot::find_most_recent(&self.name, &self.root_dir, cleanup)
        else {
            return Ok(false);
        };
        if candidate.version() <= active_version {
            candidate.close();
            return Ok(false);
        }

        let new_version = candidate.version();
        if let Some(old) = state.replace(candidate) {
            old.close();
        }
        self.search_cache.lock().clear();
        self.filter_cache.lock().clear();
        self.document_cache.lock().clear();
        tracing::info!(
            "[{}] reloaded: version {} -> {}",
            self.name,
            active_version,
            new_version
        );
        Ok(true)
    }

    /// Close the active snapshot and enter the terminal state. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.write();
        if let Some(snapshot) = state.take() {
            tracing::info!("[{}] reader closed", self.name);
            snapshot.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().is_none()
    }

    pub fn statistics(&self) -> Result<IndexStatistics> {
        let state = self.state.read();
        let snapshot = state.as_ref().ok_or_else(|| self.closed())?;
        Ok(snapshot.statistics())
    }

    /// The active snapshot's raw-evaluation counter; cache hits leave it
    /// unchanged.
    pub fn evaluation_count(&self) -> Result<u64> {
        let state = self.state.read();
        let snapshot = state.as_ref().ok_or_else(|| self.closed())?;
        Ok(snapshot.evaluation_count())
    }

    pub fn cache_statistics(&self) -> ReaderCacheStatistics {
        let _state = self.state.read();
        ReaderCacheStatistics {
            search: self.search_cache.lock().statistics(),
            filter: self.filter_cache.lock().statistics(),
            document: self.document_cache.lock().statistics(),
        }
    }

    fn closed(&self) -> LanternError {
        LanternError::IndexClosed(self.name.clone())
    }
}
