use crate::error::{LanternError, Result};
use crate::index::writer::{LocalWriter, WriterBackend};
use crate::index::GenerationSchema;
use crate::types::IndexStatistics;
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tantivy::query::QueryParser;
use tantivy::schema::Value;
use tantivy::{DocAddress, Index, IndexReader, ReloadPolicy, Searcher, TantivyDocument};

/// An immutable handle onto one on-disk generation of an index.
///
/// A snapshot never changes after `open`: its reader is pinned to the
/// segments that existed at open time, and its version is the one the writer
/// stamped into the generation's commit metadata. Exactly one snapshot is
/// active per reader manager; reload swaps the whole handle.
pub struct Snapshot {
    name: String,
    root_dir: PathBuf,
    data_dir: PathBuf,
    version: u64,
    index: Index,
    reader: IndexReader,
    pub(crate) schema: GenerationSchema,
    /// Counts raw query evaluations and stored-document reads against this
    /// snapshot, so callers can tell cache hits from recomputation.
    evaluations: AtomicU64,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("name", &self.name)
            .field("root_dir", &self.root_dir)
            .field("data_dir", &self.data_dir)
            .field("version", &self.version)
            .field("schema", &self.schema)
            .field("evaluations", &self.evaluations)
            .finish_non_exhaustive()
    }
}

impl Snapshot {
    /// Open the generation at `data_dir`. A corrupt or partially written
    /// generation (or one written with a foreign schema) fails with
    /// [`LanternError::IndexOpen`].
    pub fn open(name: &str, root_dir: &Path, data_dir: &Path) -> Result<Snapshot> {
        let open_err = |message: String| LanternError::IndexOpen {
            path: data_dir.to_path_buf(),
            message,
        };
        let index = Index::open_in_dir(data_dir).map_err(|e| open_err(e.to_string()))?;
        let schema = GenerationSchema::for_index(&index, data_dir)?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| open_err(e.to_string()))?;
        let metas = index.load_metas().map_err(|e| open_err(e.to_string()))?;
        let version = metas
            .payload
            .as_deref()
            .and_then(|p| p.parse::<u64>().ok())
            .unwrap_or(metas.opstamp);
        Ok(Snapshot {
            name: name.to_string(),
            root_dir: root_dir.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            version,
            index,
            reader,
            schema,
            evaluations: AtomicU64::new(0),
        })
    }

    /// First-time initialization: create an empty generation at `data_dir`,
    /// published at version 1, and open it.
    pub fn create_empty(name: &str, root_dir: &Path, data_dir: &Path) -> Result<Snapshot> {
        let mut writer = LocalWriter::create_at(data_dir, 1)?;
        writer.commit()?;
        tracing::info!(
            "[{}] created empty generation at {}",
            name,
            data_dir.display()
        );
        Snapshot::open(name, root_dir, data_dir)
    }

    /// Release reader resources. The manager's ownership makes a second
    /// close a no-op rather than an error.
    pub fn close(self) {
        tracing::debug!("[{}] closing snapshot version {}", self.name, self.version);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The writer-stamped version of this generation. Strictly increasing
    /// across successive active snapshots of one index.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn doc_count(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }

    pub fn statistics(&self) -> IndexStatistics {
        IndexStatistics {
            name: self.name.clone(),
            version: self.version,
            doc_count: self.doc_count(),
            generation_dir: self.data_dir.clone(),
        }
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub(crate) fn record_evaluation(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Query parser over the catch-all text field; filter conditions address
    /// the attribute field explicitly by path.
    pub(crate) fn query_parser(&self) -> QueryParser {
        QueryParser::for_index(&self.index, vec![self.schema.text])
    }

    /// Read the stored id and attribute map for one document. Absent doc ids
    /// resolve to `None`, not an error.
    pub(crate) fn stored_source(
        &self,
        searcher: &Searcher,
        addr: DocAddress,
    ) -> Result<Option<(String, Map<String, JsonValue>)>> {
        let Some(segment) = searcher.segment_readers().get(addr.segment_ord as usize) else {
            return Ok(None);
        };
        if addr.doc_id >= segment.max_doc() {
            return Ok(None);
        }
        self.record_evaluation();
        let doc: TantivyDocument = searcher.doc(addr)?;
        let id = doc
            .get_first(self.schema.id)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let attrs = match doc.get_first(self.schema.source).and_then(|v| v.as_str()) {
            Some(raw) => serde_json::from_str(raw)?,
            None => Map::new(),
        };
        Ok(Some((id, attrs)))
    }
}

/// Scan the generation directories under `root_dir` and open the one with
/// the highest version. Hidden entries are skipped. Candidates that fail to
/// open are logged and skipped; in cleanup mode their directories, and any
/// superseded generation's directory, are deleted. Returns `None` when no
/// generation could be opened.
pub fn find_most_recent(name: &str, root_dir: &Path, cleanup: bool) -> Option<Snapshot> {
    let entries = match std::fs::read_dir(root_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("[{}] cannot scan {}: {}", name, root_dir.display(), e);
            return None;
        }
    };

    let mut best: Option<Snapshot> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if entry.file_name().to_string_lossy().starts_with('.') || !path.is_dir() {
            continue;
        }
        let candidate = match Snapshot::open(name, root_dir, &path) {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!("[{}] skipping corrupt generation: {}", name, e);
                if cleanup {
                    delete_generation_dir(name, &path);
                }
                continue;
            }
        };
        best = Some(match best {
            None => candidate,
            Some(current) if candidate.version() > current.version() => {
                retire(name, current, cleanup);
                candidate
            }
            Some(current) => {
                retire(name, candidate, cleanup);
                current
            }
        });
    }
    best
}

fn retire(name: &str, snapshot: Snapshot, cleanup: bool) {
    let dir = snapshot.data_dir().to_path_buf();
    snapshot.close();
    if cleanup {
        delete_generation_dir(name, &dir);
    }
}

fn delete_generation_dir(name: &str, dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => tracing::info!("[{}] deleted old generation {}", name, dir.display()),
        Err(e) => tracing::warn!(
            "[{}] failed to delete generation {}: {}",
            name,
            dir.display(),
            e
        ),
    }
}
