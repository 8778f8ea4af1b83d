//! Per-document-type flat store of what the user currently sees.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::field_key::{is_shadow, shadow_key, SHADOW_SUFFIX};
use crate::flatten::FlatMap;
use crate::form::{CapturedValue, FormSurface};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Budgetary,
    #[default]
    Final,
}

impl DocumentType {
    pub const ALL: [DocumentType; 2] = [DocumentType::Budgetary, DocumentType::Final];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Budgetary => "budgetary",
            DocumentType::Final => "final",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "budgetary" => Some(DocumentType::Budgetary),
            "final" => Some(DocumentType::Final),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct ViewState {
    active: BTreeSet<String>,
    stored: FlatMap,
}

/// Outcome of [`FlatViewStore::apply`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FlatViewStore {
    views: HashMap<DocumentType, ViewState>,
}

impl FlatViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn view_mut(&mut self, doc_type: DocumentType) -> &mut ViewState {
        self.views.entry(doc_type).or_default()
    }

    pub fn register_field(&mut self, doc_type: DocumentType, key: &str) {
        self.view_mut(doc_type).active.insert(key.to_string());
    }

    /// Drops the registration and purges the stored value (and its shadow)
    /// so a later apply cannot resurrect it.
    pub fn unregister_field(&mut self, doc_type: DocumentType, key: &str) {
        let view = self.view_mut(doc_type);
        view.active.remove(key);
        view.stored.remove(key);
        view.stored.remove(shadow_key(key).as_str());
    }

    pub fn is_registered(&self, doc_type: DocumentType, key: &str) -> bool {
        self.views
            .get(&doc_type)
            .is_some_and(|view| view.active.contains(key))
    }

    pub fn active_keys(&self, doc_type: DocumentType) -> Vec<String> {
        self.views
            .get(&doc_type)
            .map(|view| view.active.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Moves a registration and its stored values to a new key.
    pub fn rename_field(&mut self, doc_type: DocumentType, from: &str, to: &str) {
        let view = self.view_mut(doc_type);
        if view.active.remove(from) {
            view.active.insert(to.to_string());
        }
        if let Some(value) = view.stored.remove(from) {
            view.stored.insert(to.to_string(), value);
        }
        if let Some(label) = view.stored.remove(shadow_key(from).as_str()) {
            view.stored.insert(shadow_key(to), label);
        }
    }

    pub fn stored(&self, doc_type: DocumentType) -> FlatMap {
        self.views
            .get(&doc_type)
            .map(|view| view.stored.clone())
            .unwrap_or_default()
    }

    pub fn stored_value(&self, doc_type: DocumentType, key: &str) -> Option<&str> {
        self.views
            .get(&doc_type)
            .and_then(|view| view.stored.get(key))
            .map(String::as_str)
    }

    /// Replaces the stored map wholesale without touching the registry.
    pub fn replace(&mut self, doc_type: DocumentType, fields: FlatMap) {
        self.view_mut(doc_type).stored = fields;
    }

    pub fn clear(&mut self) {
        self.views.clear();
    }

    /// Forgets registrations and stored values of one document type.
    pub fn reset(&mut self, doc_type: DocumentType) {
        self.views.remove(&doc_type);
    }

    /// Reads every registered control without committing the result.
    pub fn capture(&self, doc_type: DocumentType, form: &dyn FormSurface) -> FlatMap {
        let mut out = FlatMap::new();
        let Some(view) = self.views.get(&doc_type) else {
            return out;
        };
        for key in &view.active {
            let Some(captured) = form.read(key) else {
                warn!(key = key.as_str(), %doc_type, "registered key has no control");
                continue;
            };
            match captured {
                CapturedValue::Text(value) => {
                    out.insert(key.clone(), value);
                }
                CapturedValue::Selection { value, label } => {
                    out.insert(key.clone(), value);
                    out.insert(shadow_key(key), label);
                }
                CapturedValue::Computed(display) => {
                    out.insert(key.clone(), strip_display(display.as_str()));
                }
            }
        }
        out
    }

    /// Captures every registered control and replaces the stored map with it.
    pub fn snapshot(&mut self, doc_type: DocumentType, form: &dyn FormSurface) -> FlatMap {
        let captured = self.capture(doc_type, form);
        debug!(%doc_type, keys = captured.len(), "view snapshot");
        self.replace(doc_type, captured.clone());
        captured
    }

    /// Writes every stored value into its control. Keys without a control are
    /// logged and skipped. A shadow key sitting beside its stored value is
    /// derived and never written back.
    pub fn apply(&self, doc_type: DocumentType, form: &mut dyn FormSurface) -> ApplyReport {
        let mut report = ApplyReport::default();
        let Some(view) = self.views.get(&doc_type) else {
            return report;
        };
        for (key, value) in &view.stored {
            if is_shadow_of_stored(key, &view.stored) {
                continue;
            }
            if form.write(key, value) {
                report.applied += 1;
            } else {
                warn!(key = key.as_str(), %doc_type, "no control for stored key, skipping");
                report.skipped.push(key.clone());
            }
        }
        debug!(%doc_type, applied = report.applied, skipped = report.skipped.len(), "view apply");
        report
    }
}

fn is_shadow_of_stored(key: &str, stored: &FlatMap) -> bool {
    is_shadow(key)
        && key
            .strip_suffix(SHADOW_SUFFIX)
            .is_some_and(|base| stored.contains_key(base))
}

fn strip_display(display: &str) -> String {
    let trimmed = display.trim();
    trimmed
        .strip_suffix('%')
        .map(str::trim_end)
        .unwrap_or(trimmed)
        .to_string()
}
