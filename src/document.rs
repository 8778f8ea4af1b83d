//! Persistence collaborator: the catalog plus the nested tree of the open
//! quote, stored as a JSON file.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::catalog::{Catalog, CategoryField};
use crate::error::BackendError;
use crate::field_key::{ROOT, SEPARATOR};
use crate::flatten::{flatten_data, lookup_path, merge_path, unflatten_data, FlatMap};
use crate::view_store::DocumentType;

pub const FORMAT_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub doc_type: DocumentType,
    pub fields: FlatMap,
}

/// What the session needs from storage. Catalog queries never fail; file
/// operations report a [`BackendError`] and leave the backend unchanged.
pub trait QuoteBackend {
    fn categories(&self, doc_type: DocumentType) -> Vec<String>;

    fn category_fields(&self, category: &str) -> Vec<CategoryField>;

    fn category_can_add(&self, category: &str) -> bool;

    fn load_document(&mut self, path: &Path) -> Result<LoadedDocument, BackendError>;

    fn save_document(
        &mut self,
        path: &Path,
        doc_type: DocumentType,
        fields: &FlatMap,
    ) -> Result<(), BackendError>;

    fn set_field(&mut self, key: &str, value: &str);

    fn get_field(&self, key: &str) -> Option<String>;

    /// Drops the open document's data.
    fn clear_document(&mut self);
}

/// Nested data tree of the open quote, addressed by dotted keys.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteDocument {
    data: Value,
}

impl Default for QuoteDocument {
    fn default() -> Self {
        Self { data: json!({}) }
    }
}

impl QuoteDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: Value) -> Self {
        let data = if data.is_object() { data } else { json!({}) };
        Self { data }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn fields(&self) -> FlatMap {
        flatten_data(&self.data)
    }

    /// Keys outside the `data` root are ignored.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let Some(path) = data_path(key) else {
            return false;
        };
        merge_path(&mut self.data, path, Value::String(value.to_string()));
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        lookup_path(&self.data, data_path(key)?)
    }

    pub fn clear(&mut self) {
        self.data = json!({});
    }
}

fn data_path(key: &str) -> Option<&str> {
    key.strip_prefix(ROOT)?
        .strip_prefix(SEPARATOR)
        .filter(|path| !path.is_empty())
}

#[derive(Debug, Default)]
pub struct LocalBackend {
    catalog: Catalog,
    document: QuoteDocument,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> &QuoteDocument {
        &self.document
    }
}

impl QuoteBackend for LocalBackend {
    fn categories(&self, doc_type: DocumentType) -> Vec<String> {
        self.catalog.categories(doc_type)
    }

    fn category_fields(&self, category: &str) -> Vec<CategoryField> {
        self.catalog.category_fields(category)
    }

    fn category_can_add(&self, category: &str) -> bool {
        self.catalog.category_can_add(category)
    }

    fn load_document(&mut self, path: &Path) -> Result<LoadedDocument, BackendError> {
        let raw = fs::read_to_string(path)?;
        let parsed = serde_json::from_str::<Value>(raw.as_str())?;
        let (doc_type, data) = split_quote_file(parsed)?;
        let fields = flatten_data(&data);
        info!(path = %path.display(), %doc_type, fields = fields.len(), "quote loaded");
        self.document = QuoteDocument::from_data(data);
        Ok(LoadedDocument { doc_type, fields })
    }

    fn save_document(
        &mut self,
        path: &Path,
        doc_type: DocumentType,
        fields: &FlatMap,
    ) -> Result<(), BackendError> {
        if let Some(stray) = fields.keys().find(|key| data_path(key).is_none()) {
            return Err(BackendError::InvalidDocument(format!(
                "key '{stray}' is outside the {ROOT} root"
            )));
        }
        let data = unflatten_data(fields);
        let file = json!({
            "version": FORMAT_VERSION,
            "quoteType": doc_type.as_str(),
            "savedAt": now_string(),
            "data": data,
        });
        let content = serde_json::to_string_pretty(&file)?;
        write_text_file(path, content.as_str())?;
        info!(path = %path.display(), %doc_type, fields = fields.len(), "quote saved");
        self.document = QuoteDocument::from_data(data);
        Ok(())
    }

    fn set_field(&mut self, key: &str, value: &str) {
        if !self.document.set(key, value) {
            debug!(key, "ignoring field outside the data root");
        }
    }

    fn get_field(&self, key: &str) -> Option<String> {
        self.document.get(key).map(str::to_string)
    }

    fn clear_document(&mut self) {
        self.document.clear();
    }
}

fn split_quote_file(value: Value) -> Result<(DocumentType, Value), BackendError> {
    let Value::Object(mut obj) = value else {
        return Err(BackendError::InvalidDocument(
            "quote file must be a JSON object".to_string(),
        ));
    };
    let doc_type = obj
        .get("quoteType")
        .and_then(Value::as_str)
        .and_then(DocumentType::parse)
        .unwrap_or_default();
    match obj.remove(ROOT) {
        Some(data) if data.is_object() => Ok((doc_type, data)),
        _ => Err(BackendError::InvalidDocument(format!(
            "quote file has no '{ROOT}' object"
        ))),
    }
}

fn now_string() -> String {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    ms.to_string()
}

pub(crate) fn write_text_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}
