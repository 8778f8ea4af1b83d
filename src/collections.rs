//! Repeating field groups ("collections") and their numbered entries.
//!
//! The live index list of each collection is the source of truth. The form
//! and the view store are updated from it, never scanned to rebuild it, and
//! the list is always exactly `1..=N`.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{control_kind, CategoryField, FieldKind};
use crate::error::{EngineError, Result};
use crate::field_key::{decode, encode, FieldKey};
use crate::flatten::FlatMap;
use crate::form::{CapturedValue, ControlSpec, FormSurface, Rebind};
use crate::view_store::{DocumentType, FlatViewStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldTemplate {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub optional: bool,
}

impl FieldTemplate {
    pub fn text(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Text,
            optional: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionTemplate {
    /// Display name, also the form section the entries render into.
    pub category: String,
    pub category_path: Vec<String>,
    pub fields: Vec<FieldTemplate>,
}

impl CollectionTemplate {
    pub fn new(category: &str, category_path: &[&str], fields: Vec<FieldTemplate>) -> Self {
        Self {
            category: category.to_string(),
            category_path: category_path.iter().map(|segment| segment.to_string()).collect(),
            fields,
        }
    }

    /// Builds a template from catalog fields whose keys still carry the
    /// placeholder index.
    pub fn from_category_fields(category: &str, fields: &[CategoryField]) -> Result<Self> {
        let mut category_path: Option<Vec<String>> = None;
        let mut templates = Vec::with_capacity(fields.len());
        for field in fields {
            let Some(decoded) = decode(field.key.as_str()) else {
                return Err(EngineError::InvalidTemplate(category.to_string()));
            };
            match &category_path {
                Some(path) if path != &decoded.category_path => {
                    return Err(EngineError::InvalidTemplate(category.to_string()));
                }
                Some(_) => {}
                None => category_path = Some(decoded.category_path.clone()),
            }
            templates.push(FieldTemplate {
                name: decoded.field_name,
                label: field.label.clone(),
                kind: field.kind,
                optional: field.optional,
            });
        }
        let Some(category_path) = category_path else {
            return Err(EngineError::InvalidTemplate(category.to_string()));
        };
        Ok(Self {
            category: category.to_string(),
            category_path,
            fields: templates,
        })
    }

    pub fn key(&self, field: &FieldTemplate, index: u32) -> Result<FieldKey> {
        encode(self.category_path.as_slice(), field.name.as_str(), Some(index))
    }

    fn owns(&self, key: &str) -> Option<u32> {
        let decoded = decode(key)?;
        if !decoded.category_path_matches(self.category_path.as_slice()) {
            return None;
        }
        self.fields
            .iter()
            .any(|field| field.name == decoded.field_name)
            .then_some(decoded.index)
    }
}

fn entry_spec(
    template: &CollectionTemplate,
    field: &FieldTemplate,
    index: u32,
) -> Result<ControlSpec> {
    Ok(ControlSpec {
        key: template.key(field, index)?.into_string(),
        section: template.category.clone(),
        label: field.label.clone(),
        ordinal: Some(index),
        kind: control_kind(field.kind),
        optional: field.optional,
    })
}

/// Undoes a partially applied delete: moves the renumbered entries back up,
/// then re-creates entry `index` with the values it had.
fn restore_entry(
    template: &CollectionTemplate,
    index: u32,
    moved: &[Vec<Rebind>],
    values: &[Option<CapturedValue>],
    form: &mut dyn FormSurface,
    store: &mut FlatViewStore,
    doc_type: DocumentType,
) {
    for batch in moved.iter().rev() {
        let back: Vec<Rebind> = batch
            .iter()
            .map(|rebind| Rebind {
                from: rebind.to.clone(),
                to: rebind.from.clone(),
                ordinal: rebind.ordinal.map(|ordinal| ordinal + 1),
            })
            .collect();
        if let Err(err) = form.rebind_batch(&back) {
            warn!(error = %err, "could not move entry back");
            continue;
        }
        for rebind in &back {
            store.rename_field(doc_type, rebind.from.as_str(), rebind.to.as_str());
        }
    }
    for (field, value) in template.fields.iter().zip(values) {
        let spec = match entry_spec(template, field, index) {
            Ok(spec) => spec,
            Err(err) => {
                warn!(error = %err, "could not rebuild entry control");
                continue;
            }
        };
        let key = spec.key.clone();
        store.register_field(doc_type, key.as_str());
        form.create_control(spec);
        if let Some(value) = value {
            form.write(key.as_str(), captured_text(value));
        }
    }
}

fn captured_text(value: &CapturedValue) -> &str {
    match value {
        CapturedValue::Text(text) | CapturedValue::Computed(text) => text.as_str(),
        CapturedValue::Selection { value, .. } => value.as_str(),
    }
}

/// Collection id for a category display name: the name without whitespace.
pub fn collection_id(category: &str) -> String {
    category.chars().filter(|ch| !ch.is_whitespace()).collect()
}

#[derive(Debug)]
struct CollectionState {
    template: CollectionTemplate,
    live: Vec<u32>,
}

impl CollectionState {
    fn current(&self) -> u32 {
        self.live.iter().copied().max().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct DynamicCollectionManager {
    collections: BTreeMap<String, CollectionState>,
}

impl DynamicCollectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collection and returns its id. Defining an id twice keeps
    /// the first definition and its entries. A template must yield keys that
    /// [`decode`] recognises as entry keys.
    pub fn define(&mut self, template: CollectionTemplate) -> Result<String> {
        if template.fields.is_empty() {
            return Err(EngineError::InvalidTemplate(template.category.clone()));
        }
        for field in &template.fields {
            template.key(field, 1)?;
        }
        let id = collection_id(template.category.as_str());
        self.collections
            .entry(id.clone())
            .or_insert_with(|| CollectionState {
                template,
                live: Vec::new(),
            });
        Ok(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    pub fn is_defined(&self, id: &str) -> bool {
        self.collections.contains_key(id)
    }

    pub fn template(&self, id: &str) -> Option<&CollectionTemplate> {
        self.collections.get(id).map(|state| &state.template)
    }

    pub fn live_indices(&self, id: &str) -> Result<Vec<u32>> {
        Ok(self.state(id)?.live.clone())
    }

    pub fn entry_keys(&self, id: &str, index: u32) -> Result<Vec<FieldKey>> {
        let state = self.state(id)?;
        state
            .template
            .fields
            .iter()
            .map(|field| state.template.key(field, index))
            .collect()
    }

    pub fn clear(&mut self) {
        self.collections.clear();
    }

    fn state(&self, id: &str) -> Result<&CollectionState> {
        self.collections
            .get(id)
            .ok_or_else(|| EngineError::UnknownCollection(id.to_string()))
    }

    fn state_mut(&mut self, id: &str) -> Result<&mut CollectionState> {
        self.collections
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownCollection(id.to_string()))
    }

    /// Appends entry `max + 1`, creating and registering one control per
    /// template field. New controls start empty.
    pub fn add_entry(
        &mut self,
        id: &str,
        form: &mut dyn FormSurface,
        store: &mut FlatViewStore,
        doc_type: DocumentType,
    ) -> Result<u32> {
        let state = self.state_mut(id)?;
        let index = state.current() + 1;
        let specs = state
            .template
            .fields
            .iter()
            .map(|field| entry_spec(&state.template, field, index))
            .collect::<Result<Vec<_>>>()?;
        for spec in specs {
            store.register_field(doc_type, spec.key.as_str());
            form.create_control(spec);
        }
        state.live.push(index);
        debug!(collection = id, index, %doc_type, "entry added");
        Ok(index)
    }

    /// Removes entry `index` and shifts every later entry down by one so the
    /// live indices stay contiguous. Nothing is mutated unless every control
    /// that has to move is present. If the form still rejects a renumbering
    /// batch, the entries already moved go back and the deleted entry is
    /// re-created with its values.
    pub fn delete_entry(
        &mut self,
        id: &str,
        index: u32,
        form: &mut dyn FormSurface,
        store: &mut FlatViewStore,
        doc_type: DocumentType,
    ) -> Result<()> {
        let state = self.state_mut(id)?;
        if !state.live.contains(&index) {
            return Err(EngineError::EntryNotFound {
                collection: id.to_string(),
                index,
            });
        }

        let mut later: Vec<u32> = state.live.iter().copied().filter(|i| *i > index).collect();
        later.sort_unstable();
        let mut batches: Vec<Vec<Rebind>> = Vec::with_capacity(later.len());
        for entry in later {
            let mut batch = Vec::with_capacity(state.template.fields.len());
            for field in &state.template.fields {
                let from = state.template.key(field, entry)?;
                if !form.has_control(from.as_str()) {
                    return Err(EngineError::MissingControl(from.into_string()));
                }
                let to = state.template.key(field, entry - 1)?;
                batch.push(Rebind {
                    from: from.into_string(),
                    to: to.into_string(),
                    ordinal: Some(entry - 1),
                });
            }
            batches.push(batch);
        }
        let doomed: Vec<FieldKey> = state
            .template
            .fields
            .iter()
            .map(|field| state.template.key(field, index))
            .collect::<Result<_>>()?;
        let doomed_values: Vec<Option<CapturedValue>> =
            doomed.iter().map(|key| form.read(key.as_str())).collect();
        let stored_before = store.stored(doc_type);

        for key in &doomed {
            if !form.destroy_control(key.as_str()) {
                warn!(key = key.as_str(), "deleted entry had no control");
            }
            store.unregister_field(doc_type, key.as_str());
        }
        for (done, batch) in batches.iter().enumerate() {
            if let Err(err) = form.rebind_batch(batch) {
                warn!(collection = id, index, error = %err, "renumbering rejected, restoring entry");
                restore_entry(
                    &state.template,
                    index,
                    &batches[..done],
                    &doomed_values,
                    form,
                    store,
                    doc_type,
                );
                store.replace(doc_type, stored_before);
                return Err(err);
            }
            for rebind in batch {
                store.rename_field(doc_type, rebind.from.as_str(), rebind.to.as_str());
            }
        }

        state.live.retain(|i| *i != index);
        for live in state.live.iter_mut() {
            if *live > index {
                *live -= 1;
            }
        }
        info!(collection = id, index, remaining = state.live.len(), %doc_type, "entry deleted");
        Ok(())
    }

    /// Adds entries until the collection can host the highest index `incoming`
    /// references for it. Never removes entries; returns how many were added.
    pub fn reconcile(
        &mut self,
        id: &str,
        incoming: &FlatMap,
        form: &mut dyn FormSurface,
        store: &mut FlatViewStore,
        doc_type: DocumentType,
    ) -> Result<u32> {
        let (target, current) = {
            let state = self.state(id)?;
            let target = incoming
                .keys()
                .filter_map(|key| state.template.owns(key))
                .max()
                .unwrap_or(0);
            (target, state.current())
        };
        if target <= current {
            return Ok(0);
        }
        let missing = target - current;
        for _ in 0..missing {
            self.add_entry(id, form, store, doc_type)?;
        }
        debug!(collection = id, target, added = missing, "collection reconciled");
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_ids_drop_whitespace() {
        assert_eq!(collection_id("Customer Specifications"), "CustomerSpecifications");
        assert_eq!(collection_id("Equipment"), "Equipment");
    }

    #[test]
    fn template_from_catalog_fields_strips_placeholder() {
        let catalog = crate::catalog::Catalog::quote();
        let fields = catalog.category_fields("Cost Sheet");
        let template = CollectionTemplate::from_category_fields("Cost Sheet", &fields).unwrap();
        assert_eq!(template.category_path, vec!["costSheet".to_string()]);
        let names: Vec<&str> = template.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["link", "total"]);
    }

    #[test]
    fn template_rejects_mixed_paths_and_static_keys() {
        let mixed = vec![
            CategoryField {
                key: "data.a.x.1".to_string(),
                label: "X".to_string(),
                optional: false,
                kind: FieldKind::Text,
            },
            CategoryField {
                key: "data.b.y.1".to_string(),
                label: "Y".to_string(),
                optional: false,
                kind: FieldKind::Text,
            },
        ];
        assert!(matches!(
            CollectionTemplate::from_category_fields("Mixed", &mixed),
            Err(EngineError::InvalidTemplate(_))
        ));

        let catalog = crate::catalog::Catalog::quote();
        let fields = catalog.category_fields("System Layout");
        assert!(CollectionTemplate::from_category_fields("System Layout", &fields).is_err());
    }

    #[test]
    fn owns_matches_path_and_field() {
        let template = CollectionTemplate::new(
            "Equipment",
            &["Equipment"],
            vec![FieldTemplate::text("Description", "Description")],
        );
        assert_eq!(template.owns("data.Equipment.Description.4"), Some(4));
        assert_eq!(template.owns("data.Equipment.Description.4_label"), Some(4));
        assert_eq!(template.owns("data.Equipment.Other.4"), None);
        assert_eq!(template.owns("data.Other.Description.4"), None);
        assert_eq!(template.owns("data.Equipment.Description"), None);
    }
}
