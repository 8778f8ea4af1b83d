//! One open quote: the rendered form per document type, the flat view
//! store, and the save/open flows that tie them to a [`QuoteBackend`].

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::control_kind;
use crate::collections::{CollectionTemplate, DynamicCollectionManager};
use crate::document::QuoteBackend;
use crate::error::{BackendError, EngineError, Result};
use crate::flatten::FlatMap;
use crate::form::{ControlSpec, FormModel, FormSection, FormSurface};
use crate::oee::{self, OeeFigures, OeeInputs};
use crate::view_store::{ApplyReport, DocumentType, FlatViewStore};

#[derive(Debug, Default)]
pub struct DocumentView {
    pub form: FormModel,
    pub collections: DynamicCollectionManager,
    rendered: bool,
}

impl DocumentView {
    pub fn is_rendered(&self) -> bool {
        self.rendered
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub id: String,
    pub category: String,
    pub live: Vec<u32>,
}

/// Values captured by [`QuoteSession::begin_save`]; nothing is committed
/// until [`QuoteSession::complete_save`] sees the write succeed.
#[derive(Debug)]
pub struct PendingSave {
    doc_type: DocumentType,
    fields: FlatMap,
}

impl PendingSave {
    pub fn doc_type(&self) -> DocumentType {
        self.doc_type
    }

    pub fn fields(&self) -> &FlatMap {
        &self.fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenOutcome {
    pub doc_type: DocumentType,
    pub fields: usize,
    pub report: ApplyReport,
}

#[derive(Debug, Default)]
pub struct QuoteSession {
    current: DocumentType,
    store: FlatViewStore,
    views: HashMap<DocumentType, DocumentView>,
    busy: HashSet<DocumentType>,
    dirty: HashSet<DocumentType>,
}

impl QuoteSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_type(&self) -> DocumentType {
        self.current
    }

    /// True when any document type holds unsaved edits.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn is_type_dirty(&self, doc_type: DocumentType) -> bool {
        self.dirty.contains(&doc_type)
    }

    pub fn is_busy(&self, doc_type: DocumentType) -> bool {
        self.busy.contains(&doc_type)
    }

    pub fn store(&self) -> &FlatViewStore {
        &self.store
    }

    pub fn register_field(&mut self, doc_type: DocumentType, key: &str) -> Result<()> {
        self.ensure_idle(doc_type)?;
        self.store.register_field(doc_type, key);
        Ok(())
    }

    pub fn unregister_field(&mut self, doc_type: DocumentType, key: &str) -> Result<()> {
        self.ensure_idle(doc_type)?;
        self.store.unregister_field(doc_type, key);
        Ok(())
    }

    pub fn view(&self, doc_type: DocumentType) -> Option<&DocumentView> {
        self.views.get(&doc_type)
    }

    pub fn form_view(&self, doc_type: DocumentType) -> Vec<FormSection> {
        self.views
            .get(&doc_type)
            .map(|view| view.form.view())
            .unwrap_or_default()
    }

    pub fn collections(&self, doc_type: DocumentType) -> Vec<CollectionSummary> {
        let Some(view) = self.views.get(&doc_type) else {
            return Vec::new();
        };
        view.collections
            .ids()
            .into_iter()
            .filter_map(|id| {
                let category = view.collections.template(id.as_str())?.category.clone();
                let live = view.collections.live_indices(id.as_str()).ok()?;
                Some(CollectionSummary { id, category, live })
            })
            .collect()
    }

    fn ensure_idle(&self, doc_type: DocumentType) -> Result<()> {
        if self.busy.contains(&doc_type) {
            return Err(EngineError::Busy(doc_type));
        }
        Ok(())
    }

    fn ensure_all_idle(&self) -> Result<()> {
        match self.busy.iter().next() {
            Some(doc_type) => Err(EngineError::Busy(*doc_type)),
            None => Ok(()),
        }
    }

    /// Builds the form of `doc_type` from the backend catalog. Repeatable
    /// categories become collections with their first entry in place.
    /// Rendering an already rendered type does nothing.
    pub fn render(&mut self, backend: &dyn QuoteBackend, doc_type: DocumentType) -> Result<()> {
        self.ensure_idle(doc_type)?;
        let view = self.views.entry(doc_type).or_default();
        if view.rendered {
            return Ok(());
        }
        if let Err(err) = render_view(view, &mut self.store, backend, doc_type) {
            self.views.remove(&doc_type);
            self.store.reset(doc_type);
            return Err(err);
        }
        view.rendered = true;
        Ok(())
    }

    pub fn new_document(
        &mut self,
        backend: &mut dyn QuoteBackend,
        doc_type: DocumentType,
    ) -> Result<()> {
        self.ensure_all_idle()?;
        self.views.clear();
        self.store.clear();
        backend.clear_document();
        self.current = doc_type;
        self.render(backend, doc_type)?;
        self.dirty.clear();
        info!(%doc_type, "new quote");
        Ok(())
    }

    /// Snapshots the current type, then shows `doc_type` with its own stored
    /// values.
    pub fn switch_type(
        &mut self,
        backend: &dyn QuoteBackend,
        doc_type: DocumentType,
    ) -> Result<ApplyReport> {
        self.ensure_idle(self.current)?;
        self.ensure_idle(doc_type)?;
        if doc_type == self.current {
            return Ok(ApplyReport::default());
        }
        if let Some(view) = self.views.get(&self.current) {
            self.store.snapshot(self.current, &view.form);
        }
        self.render(backend, doc_type)?;
        self.current = doc_type;
        debug!(%doc_type, "switched quote type");
        self.apply(doc_type)
    }

    /// Handles one edit coming from the form. OEE inputs refresh the derived
    /// displays, which are returned.
    pub fn field_changed(
        &mut self,
        backend: &mut dyn QuoteBackend,
        key: &str,
        value: &str,
    ) -> Result<Option<OeeFigures>> {
        let doc_type = self.current;
        self.ensure_idle(doc_type)?;
        let Some(view) = self.views.get_mut(&doc_type) else {
            return Err(EngineError::MissingControl(key.to_string()));
        };
        if !view.form.write(key, value) {
            return Err(EngineError::MissingControl(key.to_string()));
        }
        backend.set_field(key, value);
        self.dirty.insert(doc_type);

        if !oee::is_input_key(key) {
            return Ok(None);
        }
        let captured = self.store.capture(doc_type, &view.form);
        let figures = oee::compute(&OeeInputs::from_fields(&captured));
        oee::write_displays(&mut view.form, &figures);
        for (display, rendered) in figures.displays() {
            backend.set_field(display.as_str(), rendered.as_str());
        }
        Ok(Some(figures))
    }

    pub fn add_entry(&mut self, doc_type: DocumentType, collection: &str) -> Result<u32> {
        self.ensure_idle(doc_type)?;
        let view = collection_view(&mut self.views, doc_type, collection)?;
        let index = view
            .collections
            .add_entry(collection, &mut view.form, &mut self.store, doc_type)?;
        self.dirty.insert(doc_type);
        Ok(index)
    }

    pub fn delete_entry(
        &mut self,
        doc_type: DocumentType,
        collection: &str,
        index: u32,
    ) -> Result<()> {
        self.ensure_idle(doc_type)?;
        let view = collection_view(&mut self.views, doc_type, collection)?;
        view.collections
            .delete_entry(collection, index, &mut view.form, &mut self.store, doc_type)?;
        self.dirty.insert(doc_type);
        Ok(())
    }

    pub fn reconcile(
        &mut self,
        doc_type: DocumentType,
        collection: &str,
        incoming: &FlatMap,
    ) -> Result<u32> {
        self.ensure_idle(doc_type)?;
        let view = collection_view(&mut self.views, doc_type, collection)?;
        let added = view
            .collections
            .reconcile(collection, incoming, &mut view.form, &mut self.store, doc_type)?;
        if added > 0 {
            self.dirty.insert(doc_type);
        }
        Ok(added)
    }

    pub fn snapshot(&mut self, doc_type: DocumentType) -> Result<FlatMap> {
        self.ensure_idle(doc_type)?;
        let Some(view) = self.views.get(&doc_type) else {
            return Ok(self.store.stored(doc_type));
        };
        Ok(self.store.snapshot(doc_type, &view.form))
    }

    pub fn apply(&mut self, doc_type: DocumentType) -> Result<ApplyReport> {
        self.ensure_idle(doc_type)?;
        let Some(view) = self.views.get_mut(&doc_type) else {
            return Ok(ApplyReport::default());
        };
        Ok(self.store.apply(doc_type, &mut view.form))
    }

    /// Loads a quote file into its document type and makes that type
    /// current. A failed load leaves the session untouched.
    pub fn open_document(
        &mut self,
        backend: &mut dyn QuoteBackend,
        path: &Path,
    ) -> Result<OpenOutcome> {
        self.ensure_all_idle()?;
        let loaded = backend.load_document(path)?;
        let doc_type = loaded.doc_type;

        self.views.remove(&doc_type);
        self.store.reset(doc_type);
        self.render(backend, doc_type)?;
        self.store.replace(doc_type, loaded.fields.clone());

        let view = self.views.entry(doc_type).or_default();
        for id in view.collections.ids() {
            view.collections.reconcile(
                id.as_str(),
                &loaded.fields,
                &mut view.form,
                &mut self.store,
                doc_type,
            )?;
        }
        let report = self.store.apply(doc_type, &mut view.form);
        if !report.skipped.is_empty() {
            warn!(skipped = report.skipped.len(), "loaded keys without a control");
        }

        self.current = doc_type;
        self.dirty.remove(&doc_type);
        Ok(OpenOutcome {
            doc_type,
            fields: loaded.fields.len(),
            report,
        })
    }

    /// Captures `doc_type` for saving and marks it busy. The stored snapshot
    /// is left alone.
    pub fn begin_save(&mut self, doc_type: DocumentType) -> Result<PendingSave> {
        self.ensure_idle(doc_type)?;
        let fields = match self.views.get(&doc_type) {
            Some(view) => self.store.capture(doc_type, &view.form),
            None => self.store.stored(doc_type),
        };
        self.busy.insert(doc_type);
        Ok(PendingSave { doc_type, fields })
    }

    /// Releases the busy flag. Only a successful write commits the captured
    /// values and clears the dirty flag of that type.
    pub fn complete_save(
        &mut self,
        pending: PendingSave,
        outcome: std::result::Result<(), BackendError>,
    ) -> Result<()> {
        let PendingSave { doc_type, fields } = pending;
        self.busy.remove(&doc_type);
        match outcome {
            Ok(()) => {
                self.store.replace(doc_type, fields);
                self.dirty.remove(&doc_type);
                Ok(())
            }
            Err(err) => {
                warn!(%doc_type, error = %err, "quote save failed");
                Err(err.into())
            }
        }
    }

    pub fn save_document(&mut self, backend: &mut dyn QuoteBackend, path: &Path) -> Result<()> {
        let pending = self.begin_save(self.current)?;
        let outcome = backend.save_document(path, pending.doc_type, &pending.fields);
        self.complete_save(pending, outcome)
    }
}

fn render_view(
    view: &mut DocumentView,
    store: &mut FlatViewStore,
    backend: &dyn QuoteBackend,
    doc_type: DocumentType,
) -> Result<()> {
    for category in backend.categories(doc_type) {
        let fields = backend.category_fields(category.as_str());
        if fields.is_empty() {
            warn!(category = category.as_str(), "category has no fields");
            continue;
        }
        if backend.category_can_add(category.as_str()) {
            let template = CollectionTemplate::from_category_fields(category.as_str(), &fields)?;
            let id = view.collections.define(template)?;
            view.collections
                .add_entry(id.as_str(), &mut view.form, store, doc_type)?;
            continue;
        }
        for field in fields {
            store.register_field(doc_type, field.key.as_str());
            view.form.create_control(ControlSpec {
                key: field.key,
                section: category.clone(),
                label: field.label,
                ordinal: None,
                kind: control_kind(field.kind),
                optional: field.optional,
            });
        }
    }
    debug!(%doc_type, controls = view.form.len(), "form rendered");
    Ok(())
}

fn collection_view<'a>(
    views: &'a mut HashMap<DocumentType, DocumentView>,
    doc_type: DocumentType,
    collection: &str,
) -> Result<&'a mut DocumentView> {
    views
        .get_mut(&doc_type)
        .filter(|view| view.collections.is_defined(collection))
        .ok_or_else(|| EngineError::UnknownCollection(collection.to_string()))
}
