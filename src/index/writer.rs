use crate::error::{LanternError, Result};
use crate::index::utils::copy_generation_dir;
use crate::index::{generation_dir_name, GenerationSchema};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tantivy::schema::OwnedValue;
use tantivy::{Index, IndexWriter, TantivyDocument, Term};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Contract between the reader side and whatever produces generations.
///
/// Implementations mutate one generation; `commit` publishes it at the
/// writer's version so readers can order sibling generations. A
/// native-engine-backed implementation would satisfy the same contract
/// behind an FFI boundary; only the local on-disk variant lives here.
pub trait WriterBackend {
    /// Insert or replace the document with the given id. `attrs` must be a
    /// JSON object of attribute values.
    fn add_document(&mut self, id: &str, attrs: &Value) -> Result<()>;

    /// Remove the document with the given id. Removing an absent id is a
    /// no-op.
    fn delete_document(&mut self, id: &str) -> Result<()>;

    /// Persist pending mutations and stamp the generation with the writer's
    /// version. Returns the published version.
    fn commit(&mut self) -> Result<u64>;
}

/// Local on-disk writer: owns one generation directory and a tantivy writer
/// on it.
pub struct LocalWriter {
    data_dir: PathBuf,
    version: u64,
    schema: GenerationSchema,
    writer: IndexWriter,
}

impl LocalWriter {
    /// Create a fresh generation in a new conventionally-named directory
    /// under `root_dir`.
    pub fn create_generation(root_dir: &Path, version: u64) -> Result<LocalWriter> {
        let data_dir = root_dir.join(generation_dir_name(version));
        Self::create_at(&data_dir, version)
    }

    /// Create a fresh generation at an explicit path.
    pub fn create_at(data_dir: &Path, version: u64) -> Result<LocalWriter> {
        std::fs::create_dir_all(data_dir)?;
        let schema = GenerationSchema::build();
        let index = Index::create_in_dir(data_dir, schema.schema.clone())?;
        let writer = index.writer(WRITER_HEAP_BYTES)?;
        tracing::debug!(
            "[{}] created generation for version {}",
            data_dir.display(),
            version
        );
        Ok(LocalWriter {
            data_dir: data_dir.to_path_buf(),
            version,
            schema,
            writer,
        })
    }

    /// Continue writing an existing generation, republishing it at `version`.
    pub fn open_generation(data_dir: &Path, version: u64) -> Result<LocalWriter> {
        let index = Index::open_in_dir(data_dir).map_err(|e| LanternError::IndexOpen {
            path: data_dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let schema = GenerationSchema::for_index(&index, data_dir)?;
        let writer = index.writer(WRITER_HEAP_BYTES)?;
        Ok(LocalWriter {
            data_dir: data_dir.to_path_buf(),
            version,
            schema,
            writer,
        })
    }

    /// Start the next generation as a copy of an existing one, in a new
    /// conventionally-named directory under `root_dir`. This is how a writer
    /// carries the corpus forward between generations.
    pub fn branch_generation(
        prev_data_dir: &Path,
        root_dir: &Path,
        version: u64,
    ) -> Result<LocalWriter> {
        let data_dir = root_dir.join(generation_dir_name(version));
        copy_generation_dir(prev_data_dir, &data_dir)?;
        Self::open_generation(&data_dir, version)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

impl WriterBackend for LocalWriter {
    fn add_document(&mut self, id: &str, attrs: &Value) -> Result<()> {
        let map = attrs.as_object().ok_or_else(|| {
            LanternError::InvalidDocument("expected a JSON object of attributes".to_string())
        })?;
        let mut doc = TantivyDocument::new();
        doc.add_text(self.schema.id, id);
        doc.add_text(self.schema.text, &collect_text(attrs));
        doc.add_object(self.schema.attrs, json_to_btree(map)?);
        doc.add_text(self.schema.source, &serde_json::to_string(map)?);
        // Upsert: drop any previous revision of this id first.
        self.writer
            .delete_term(Term::from_field_text(self.schema.id, id));
        self.writer.add_document(doc)?;
        Ok(())
    }

    fn delete_document(&mut self, id: &str) -> Result<()> {
        self.writer
            .delete_term(Term::from_field_text(self.schema.id, id));
        Ok(())
    }

    fn commit(&mut self) -> Result<u64> {
        let mut prepared = self.writer.prepare_commit()?;
        prepared.set_payload(&self.version.to_string());
        prepared.commit()?;
        Ok(self.version)
    }
}

/// Concatenate every string value in the attribute tree; this is what the
/// catch-all text field indexes.
fn collect_text(value: &Value) -> String {
    let mut out = Vec::new();
    collect_text_into(value, &mut out);
    out.join(" ")
}

fn collect_text_into(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_text_into(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_text_into(item, out);
            }
        }
        _ => {}
    }
}

fn json_to_btree(map: &Map<String, Value>) -> Result<BTreeMap<String, OwnedValue>> {
    let mut btree = BTreeMap::new();
    for (k, v) in map {
        btree.insert(k.clone(), json_value_to_owned(v)?);
    }
    Ok(btree)
}

fn json_value_to_owned(value: &Value) -> Result<OwnedValue> {
    match value {
        Value::Null => Ok(OwnedValue::Null),
        Value::Bool(b) => Ok(OwnedValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(OwnedValue::I64(i))
            } else if let Some(u) = n.as_u64() {
                Ok(OwnedValue::U64(u))
            } else if let Some(f) = n.as_f64() {
                Ok(OwnedValue::F64(f))
            } else {
                Err(LanternError::InvalidDocument("invalid number".to_string()))
            }
        }
        Value::String(s) => Ok(OwnedValue::Str(s.clone())),
        Value::Array(arr) => {
            let owned: Result<Vec<OwnedValue>> = arr.iter().map(json_value_to_owned).collect();
            Ok(OwnedValue::Array(owned?))
        }
        Value::Object(map) => {
            let mut pairs = Vec::new();
            for (k, v) in map {
                pairs.push((k.clone(), json_value_to_owned(v)?));
            }
            Ok(OwnedValue::Object(pairs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::snapshot::Snapshot;
    use serde_json::json;

    // ── document conversion helpers ─────────────────────────────────────

    #[test]
    fn collect_text_gathers_nested_strings() {
        let attrs = json!({
            "title": "red laptop",
            "specs": {"cpu": "m4"},
            "tags": ["sale", "new"],
            "price": 999
        });
        let text = collect_text(&attrs);
        assert!(text.contains("red laptop"));
        assert!(text.contains("m4"));
        assert!(text.contains("sale"));
        assert!(text.contains("new"));
        assert!(!text.contains("999"));
    }

    #[test]
    fn json_to_btree_maps_scalar_types() {
        let attrs = json!({"a": "text", "b": 7, "c": 1.5, "d": true, "e": null});
        let btree = json_to_btree(attrs.as_object().unwrap()).unwrap();
        assert_eq!(btree.len(), 5);
        assert!(matches!(btree["a"], OwnedValue::Str(_)));
        assert!(matches!(btree["b"], OwnedValue::I64(7)));
        assert!(matches!(btree["c"], OwnedValue::F64(_)));
        assert!(matches!(btree["d"], OwnedValue::Bool(true)));
        assert!(matches!(btree["e"], OwnedValue::Null));
    }

    // ── LocalWriter lifecycle ───────────────────────────────────────────

    #[test]
    fn commit_publishes_version_in_generation() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("gen");
        let mut writer = LocalWriter::create_at(&data_dir, 3).unwrap();
        writer
            .add_document("doc-1", &json!({"title": "hello"}))
            .unwrap();
        assert_eq!(writer.commit().unwrap(), 3);

        let snapshot = Snapshot::open("idx", dir.path(), &data_dir).unwrap();
        assert_eq!(snapshot.version(), 3);
        assert_eq!(snapshot.doc_count(), 1);
    }

    #[test]
    fn add_document_rejects_non_object_attrs() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LocalWriter::create_at(&dir.path().join("gen"), 1).unwrap();
        let err = writer.add_document("doc-1", &json!("not an object"));
        assert!(matches!(err, Err(LanternError::InvalidDocument(_))));
    }

    #[test]
    fn re_adding_id_replaces_document() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("gen");
        let mut writer = LocalWriter::create_at(&data_dir, 1).unwrap();
        writer.add_document("doc-1", &json!({"v": "a"})).unwrap();
        writer.add_document("doc-1", &json!({"v": "b"})).unwrap();
        writer.commit().unwrap();

        let snapshot = Snapshot::open("idx", dir.path(), &data_dir).unwrap();
        assert_eq!(snapshot.doc_count(), 1);
    }

    #[test]
    fn delete_document_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("gen");
        let mut writer = LocalWriter::create_at(&data_dir, 1).unwrap();
        writer.add_document("doc-1", &json!({"v": "a"})).unwrap();
        writer.add_document("doc-2", &json!({"v": "b"})).unwrap();
        writer.commit().unwrap();
        writer.delete_document("doc-1").unwrap();
        writer.commit().unwrap();

        let snapshot = Snapshot::open("idx", dir.path(), &data_dir).unwrap();
        assert_eq!(snapshot.doc_count(), 1);
    }

    #[test]
    fn branch_generation_carries_corpus_forward() {
        let root = tempfile::tempdir().unwrap();
        let mut writer = LocalWriter::create_generation(root.path(), 1).unwrap();
        writer.add_document("doc-1", &json!({"v": "a"})).unwrap();
        writer.commit().unwrap();
        let first_dir = writer.data_dir().to_path_buf();
        drop(writer);

        let mut next = LocalWriter::branch_generation(&first_dir, root.path(), 2).unwrap();
        next.add_document("doc-2", &json!({"v": "b"})).unwrap();
        next.commit().unwrap();
        let second_dir = next.data_dir().to_path_buf();
        drop(next);

        assert_ne!(first_dir, second_dir);
        let snapshot = Snapshot::open("idx", root.path(), &second_dir).unwrap();
        assert_eq!(snapshot.version(), 2);
        assert_eq!(snapshot.doc_count(), 2);
    }
}
