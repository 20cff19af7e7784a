use crate::error::Result;
use crate::index::reader::ReaderManager;
use crate::types::CacheConfig;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;

/// Process-wide map from index name to its reader.
///
/// The embedder populates it at startup (one `open` per configured index)
/// and tears it down with `close_all` on shutdown; nothing here is ambient
/// global state.
#[derive(Default)]
pub struct ReaderRegistry {
    readers: DashMap<String, Arc<ReaderManager>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        ReaderRegistry {
            readers: DashMap::new(),
        }
    }

    /// Open (or create) the reader for `name`, registering it under that
    /// name. Opening an already-registered name returns the existing reader.
    pub fn open(
        &self,
        name: &str,
        root_dir: impl AsRef<Path>,
        cache_config: CacheConfig,
        create_if_missing: bool,
    ) -> Result<Arc<ReaderManager>> {
        if let Some(existing) = self.readers.get(name) {
            return Ok(Arc::clone(&existing));
        }
        let reader = Arc::new(ReaderManager::open_or_create(
            name,
            root_dir,
            cache_config,
            create_if_missing,
        )?);
        self.readers.insert(name.to_string(), Arc::clone(&reader));
        Ok(reader)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ReaderManager>> {
        self.readers.get(name).map(|r| Arc::clone(&r))
    }

    pub fn names(&self) -> Vec<String> {
        self.readers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Ask every registered reader to adopt a newer generation if one
    /// exists. Per-reader failures are logged and skipped. Returns how many
    /// readers swapped.
    pub fn reload_all(&self, delete_stale_generations: bool) -> usize {
        let mut reloaded = 0;
        for entry in self.readers.iter() {
            match entry.value().reload_if_newer(delete_stale_generations) {
                Ok(true) => reloaded += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!("[{}] reload failed: {}", entry.key(), e),
            }
        }
        reloaded
    }

    /// Close every registered reader and empty the registry.
    pub fn close_all(&self) {
        for entry in self.readers.iter() {
            entry.value().close();
        }
        self.readers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_registers_and_returns_same_reader() {
        let root = tempfile::tempdir().unwrap();
        let registry = ReaderRegistry::new();
        let first = registry
            .open("products", root.path().join("products"), CacheConfig::default(), true)
            .unwrap();
        let second = registry
            .open("products", root.path().join("products"), CacheConfig::default(), true)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["products".to_string()]);
    }

    #[test]
    fn get_unknown_name_is_none() {
        let registry = ReaderRegistry::new();
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn close_all_closes_and_clears() {
        let root = tempfile::tempdir().unwrap();
        let registry = ReaderRegistry::new();
        let reader = registry
            .open("products", root.path().join("products"), CacheConfig::default(), true)
            .unwrap();
        registry.close_all();
        assert!(registry.is_empty());
        assert!(reader.is_closed());
    }

    #[test]
    fn reload_all_reports_swapped_readers() {
        let root = tempfile::tempdir().unwrap();
        let registry = ReaderRegistry::new();
        registry
            .open("a", root.path().join("a"), CacheConfig::default(), true)
            .unwrap();
        registry
            .open("b", root.path().join("b"), CacheConfig::default(), true)
            .unwrap();
        assert_eq!(registry.reload_all(false), 0);

        use crate::index::writer::{LocalWriter, WriterBackend};
        let mut writer = LocalWriter::create_generation(&root.path().join("a"), 2).unwrap();
        writer
            .add_document("x", &serde_json::json!({"v": "y"}))
            .unwrap();
        writer.commit().unwrap();
        drop(writer);

        assert_eq!(registry.reload_all(false), 1);
        assert_eq!(
            registry.get("a").unwrap().statistics().unwrap().version,
            2
        );
    }
}
