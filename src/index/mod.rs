use crate::error::{LanternError, Result};
use std::path::Path;
use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};

pub mod document;
pub mod reader;
pub mod registry;
pub mod snapshot;
pub mod utils;
pub mod writer;

/// Name of the raw identifier field.
pub(crate) const ID_FIELD: &str = "_id";
/// Catch-all tokenized field; default target for free-text queries.
pub(crate) const TEXT_FIELD: &str = "_text";
/// Indexed JSON field; target of filter conditions (`_attrs.color:red`).
pub(crate) const ATTRS_FIELD: &str = "_attrs";
/// Stored JSON string of the full attribute map.
pub(crate) const SOURCE_FIELD: &str = "_source";

/// Field handles for the fixed schema every generation is written with.
///
/// `_id` is a raw stored term (delete-by-term and id retrieval), `_text`
/// carries every string attribute for free-text search, `_attrs` is the
/// indexed JSON object filters run against, and `_source` stores the
/// attribute map verbatim for stored-field fetches.
#[derive(Clone, Debug)]
pub(crate) struct GenerationSchema {
    pub schema: Schema,
    pub id: Field,
    pub text: Field,
    pub attrs: Field,
    pub source: Field,
}

impl GenerationSchema {
    /// Build the schema for a new generation.
    pub fn build() -> Self {
        let mut builder = Schema::builder();
        let id = builder.add_text_field(ID_FIELD, STRING | STORED);
        let text = builder.add_text_field(TEXT_FIELD, TEXT);
        let attrs = builder.add_json_field(ATTRS_FIELD, TEXT);
        let source = builder.add_text_field(SOURCE_FIELD, STORED);
        GenerationSchema {
            schema: builder.build(),
            id,
            text,
            attrs,
            source,
        }
    }

    /// Resolve the field handles from an opened generation. A generation
    /// missing one of the fixed fields was not written by a compatible
    /// writer and is treated as unopenable.
    pub fn for_index(index: &tantivy::Index, data_dir: &Path) -> Result<Self> {
        let schema = index.schema();
        let field = |name: &str| {
            schema.get_field(name).map_err(|_| LanternError::IndexOpen {
                path: data_dir.to_path_buf(),
                message: format!("generation schema is missing the {name} field"),
            })
        };
        Ok(GenerationSchema {
            id: field(ID_FIELD)?,
            text: field(TEXT_FIELD)?,
            attrs: field(ATTRS_FIELD)?,
            source: field(SOURCE_FIELD)?,
            schema,
        })
    }
}

/// Conventional name for a new generation directory: timestamp-prefixed,
/// version-suffixed. Ordering across generations always uses the
/// reader-reported version, never this name.
pub(crate) fn generation_dir_name(version: u64) -> String {
    format!("{}-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"), version)
}
