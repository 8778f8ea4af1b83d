//! The rendered form as an explicit projection.
//!
//! [`FormSurface`] is what the collection manager and the view store drive;
//! [`FormModel`] is the in-memory surface the desktop shell serializes to the
//! web view on every render request.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlKind {
    Text,
    Select { options: Vec<SelectOption> },
    /// Read-only display filled by derived calculations.
    Computed { percent: bool },
}

#[derive(Debug, Clone)]
pub struct ControlSpec {
    pub key: String,
    pub section: String,
    pub label: String,
    pub ordinal: Option<u32>,
    pub kind: ControlKind,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Control {
    pub key: String,
    pub section: String,
    pub label: String,
    pub ordinal: Option<u32>,
    pub kind: ControlKind,
    pub optional: bool,
    pub value: String,
    #[serde(skip)]
    position: u64,
}

impl Control {
    pub fn display_label(&self) -> String {
        match self.ordinal {
            Some(ordinal) => format!("{} {ordinal}", self.label),
            None => self.label.clone(),
        }
    }
}

/// What a snapshot reads out of one control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedValue {
    Text(String),
    Selection { value: String, label: String },
    /// Raw display text, decoration included.
    Computed(String),
}

/// One key rename inside an entry renumbering batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebind {
    pub from: String,
    pub to: String,
    pub ordinal: Option<u32>,
}

pub trait FormSurface {
    fn create_control(&mut self, spec: ControlSpec);

    /// Returns false when no control was bound to `key`.
    fn destroy_control(&mut self, key: &str) -> bool;

    fn has_control(&self, key: &str) -> bool;

    fn read(&self, key: &str) -> Option<CapturedValue>;

    /// Returns false when no control was bound to `key`.
    fn write(&mut self, key: &str, value: &str) -> bool;

    /// Renames every control of the batch or none of them.
    fn rebind_batch(&mut self, batch: &[Rebind]) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct FormModel {
    controls: HashMap<String, Control>,
    sections: Vec<String>,
    next_position: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormSection {
    pub name: String,
    pub controls: Vec<Control>,
}

impl FormModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn control(&self, key: &str) -> Option<&Control> {
        self.controls.get(key)
    }

    pub fn clear(&mut self) {
        self.controls.clear();
        self.sections.clear();
        self.next_position = 0;
    }

    /// Sections in render order, controls in creation order within each.
    pub fn view(&self) -> Vec<FormSection> {
        let mut out: Vec<FormSection> = self
            .sections
            .iter()
            .map(|name| FormSection {
                name: name.clone(),
                controls: Vec::new(),
            })
            .collect();
        let mut controls: Vec<&Control> = self.controls.values().collect();
        controls.sort_by_key(|control| control.position);
        for control in controls {
            if let Some(section) = out.iter_mut().find(|section| section.name == control.section) {
                section.controls.push(control.clone());
            }
        }
        out.retain(|section| !section.controls.is_empty());
        out
    }
}

impl FormSurface for FormModel {
    fn create_control(&mut self, spec: ControlSpec) {
        if !self.sections.iter().any(|name| name == &spec.section) {
            self.sections.push(spec.section.clone());
        }
        let position = self.next_position;
        self.next_position += 1;
        self.controls.insert(
            spec.key.clone(),
            Control {
                key: spec.key,
                section: spec.section,
                label: spec.label,
                ordinal: spec.ordinal,
                kind: spec.kind,
                optional: spec.optional,
                value: String::new(),
                position,
            },
        );
    }

    fn destroy_control(&mut self, key: &str) -> bool {
        self.controls.remove(key).is_some()
    }

    fn has_control(&self, key: &str) -> bool {
        self.controls.contains_key(key)
    }

    fn read(&self, key: &str) -> Option<CapturedValue> {
        let control = self.controls.get(key)?;
        let captured = match &control.kind {
            ControlKind::Text => CapturedValue::Text(control.value.clone()),
            ControlKind::Select { options } => {
                let label = if control.value.is_empty() {
                    String::new()
                } else {
                    options
                        .iter()
                        .find(|option| option.value == control.value)
                        .map(|option| option.label.clone())
                        .unwrap_or_else(|| control.value.clone())
                };
                CapturedValue::Selection {
                    value: control.value.clone(),
                    label,
                }
            }
            ControlKind::Computed { .. } => CapturedValue::Computed(control.value.clone()),
        };
        Some(captured)
    }

    fn write(&mut self, key: &str, value: &str) -> bool {
        let Some(control) = self.controls.get_mut(key) else {
            return false;
        };
        control.value = match control.kind {
            ControlKind::Computed { percent: true } if !value.is_empty() && !value.ends_with('%') => {
                format!("{value}%")
            }
            _ => value.to_string(),
        };
        true
    }

    fn rebind_batch(&mut self, batch: &[Rebind]) -> Result<()> {
        let sources: HashSet<&str> = batch.iter().map(|rebind| rebind.from.as_str()).collect();
        for rebind in batch {
            if !self.controls.contains_key(rebind.from.as_str()) {
                return Err(EngineError::MissingControl(rebind.from.clone()));
            }
            if self.controls.contains_key(rebind.to.as_str())
                && !sources.contains(rebind.to.as_str())
            {
                return Err(EngineError::KeyInUse(rebind.to.clone()));
            }
        }
        let mut moved = Vec::with_capacity(batch.len());
        for rebind in batch {
            if let Some(mut control) = self.controls.remove(rebind.from.as_str()) {
                control.key = rebind.to.clone();
                control.ordinal = rebind.ordinal;
                moved.push(control);
            }
        }
        for control in moved {
            self.controls.insert(control.key.clone(), control);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(key: &str, section: &str) -> ControlSpec {
        ControlSpec {
            key: key.to_string(),
            section: section.to_string(),
            label: "Field".to_string(),
            ordinal: None,
            kind: ControlKind::Text,
            optional: false,
        }
    }

    #[test]
    fn select_reads_value_and_label() {
        let mut form = FormModel::new();
        form.create_control(ControlSpec {
            kind: ControlKind::Select {
                options: vec![SelectOption {
                    value: "FOB".to_string(),
                    label: "FOB - Free on Board".to_string(),
                }],
            },
            ..text("data.shipping.incoterms", "Shipping Information")
        });
        assert!(form.write("data.shipping.incoterms", "FOB"));
        assert_eq!(
            form.read("data.shipping.incoterms"),
            Some(CapturedValue::Selection {
                value: "FOB".to_string(),
                label: "FOB - Free on Board".to_string(),
            })
        );
    }

    #[test]
    fn percent_displays_keep_their_suffix() {
        let mut form = FormModel::new();
        form.create_control(ControlSpec {
            kind: ControlKind::Computed { percent: true },
            ..text("data.oee.oee", "OEE Metrics")
        });
        form.write("data.oee.oee", "87");
        assert_eq!(
            form.read("data.oee.oee"),
            Some(CapturedValue::Computed("87%".to_string()))
        );
    }

    #[test]
    fn rebind_batch_is_all_or_nothing() {
        let mut form = FormModel::new();
        form.create_control(text("data.x.a.2", "X"));
        let batch = vec![
            Rebind {
                from: "data.x.a.2".to_string(),
                to: "data.x.a.1".to_string(),
                ordinal: Some(1),
            },
            Rebind {
                from: "data.x.b.2".to_string(),
                to: "data.x.b.1".to_string(),
                ordinal: Some(1),
            },
        ];
        assert!(form.rebind_batch(&batch).is_err());
        assert!(form.has_control("data.x.a.2"));
        assert!(!form.has_control("data.x.a.1"));
    }

    #[test]
    fn view_groups_sections_in_render_order() {
        let mut form = FormModel::new();
        form.create_control(text("data.quoteNumber", "Quote Information"));
        form.create_control(text("data.costSheet.link.1", "Cost Sheet"));
        form.create_control(text("data.proposalDate", "Quote Information"));
        let view = form.view();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].name, "Quote Information");
        assert_eq!(view[0].controls[1].key, "data.proposalDate");
        assert_eq!(view[1].controls[0].key, "data.costSheet.link.1");
    }
}
