use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use quote_desk::catalog::FieldKind;
use quote_desk::form::{CapturedValue, ControlKind, ControlSpec, Rebind, SelectOption};
use quote_desk::{
    CollectionTemplate, DocumentType, DynamicCollectionManager, EngineError, FieldTemplate,
    FlatMap, FlatViewStore, FormModel, FormSurface,
};

const FINAL: DocumentType = DocumentType::Final;

struct Fixture {
    form: FormModel,
    store: FlatViewStore,
    manager: DynamicCollectionManager,
    id: String,
}

impl Fixture {
    fn equipment() -> Self {
        let mut manager = DynamicCollectionManager::new();
        let id = manager.define(CollectionTemplate::new(
            "Equipment",
            &["Equipment"],
            vec![
                FieldTemplate::text("Description", "Description"),
                FieldTemplate::text("Qty", "Quantity"),
            ],
        ))
        .unwrap();
        Self {
            form: FormModel::new(),
            store: FlatViewStore::new(),
            manager,
            id,
        }
    }

    fn add(&mut self) -> u32 {
        self.manager
            .add_entry(self.id.as_str(), &mut self.form, &mut self.store, FINAL)
            .unwrap()
    }

    fn delete(&mut self, index: u32) -> Result<(), EngineError> {
        self.manager
            .delete_entry(self.id.as_str(), index, &mut self.form, &mut self.store, FINAL)
    }

    fn reconcile(&mut self, incoming: &FlatMap) -> u32 {
        self.manager
            .reconcile(self.id.as_str(), incoming, &mut self.form, &mut self.store, FINAL)
            .unwrap()
    }

    fn live(&self) -> Vec<u32> {
        self.manager.live_indices(self.id.as_str()).unwrap()
    }

    fn value(&self, key: &str) -> String {
        self.form.control(key).map(|c| c.value.clone()).unwrap_or_default()
    }
}

fn flat(pairs: &[(&str, &str)]) -> FlatMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn adds_produce_contiguous_indices() {
    let mut fx = Fixture::equipment();
    assert_eq!(fx.id, "Equipment");
    for expected in 1..=5 {
        assert_eq!(fx.add(), expected);
    }
    assert_eq!(fx.live(), vec![1, 2, 3, 4, 5]);
    assert_eq!(fx.form.len(), 10);
    assert!(fx.store.is_registered(FINAL, "data.Equipment.Qty.5"));

    let control = fx.form.control("data.Equipment.Description.3").unwrap();
    assert_eq!(control.display_label(), "Description 3");
    assert_eq!(control.section, "Equipment");
}

#[test]
fn deleting_first_of_two_moves_valve_down() {
    let mut fx = Fixture::equipment();
    fx.add();
    fx.add();
    assert!(fx.form.has_control("data.Equipment.Description.1"));
    assert!(fx.form.has_control("data.Equipment.Description.2"));
    fx.form.write("data.Equipment.Description.1", "Pump");
    fx.form.write("data.Equipment.Description.2", "Valve");

    fx.delete(1).unwrap();

    assert_eq!(fx.live(), vec![1]);
    assert_eq!(fx.value("data.Equipment.Description.1"), "Valve");
    assert!(!fx.form.has_control("data.Equipment.Description.2"));
    assert_eq!(fx.form.len(), 2);
}

#[test]
fn delete_in_the_middle_renumbers_everything_above() {
    let mut fx = Fixture::equipment();
    for _ in 0..4 {
        fx.add();
    }
    for index in 1..=4 {
        let key = format!("data.Equipment.Description.{index}");
        fx.form.write(key.as_str(), format!("item {index}").as_str());
    }
    fx.store.snapshot(FINAL, &fx.form);

    fx.delete(2).unwrap();

    assert_eq!(fx.live(), vec![1, 2, 3]);
    assert_eq!(fx.value("data.Equipment.Description.1"), "item 1");
    assert_eq!(fx.value("data.Equipment.Description.2"), "item 3");
    assert_eq!(fx.value("data.Equipment.Description.3"), "item 4");
    assert_eq!(
        fx.form.control("data.Equipment.Description.3").unwrap().display_label(),
        "Description 3"
    );

    // Stored values follow their entries and the registry has no stale keys.
    assert_eq!(
        fx.store.stored_value(FINAL, "data.Equipment.Description.2"),
        Some("item 3")
    );
    assert_eq!(fx.store.stored_value(FINAL, "data.Equipment.Description.4"), None);
    assert!(!fx.store.is_registered(FINAL, "data.Equipment.Description.4"));
    assert_eq!(fx.store.active_keys(FINAL).len(), 6);
}

#[test]
fn delete_then_add_reuses_the_next_index() {
    let mut fx = Fixture::equipment();
    fx.add();
    fx.add();
    fx.delete(2).unwrap();
    assert_eq!(fx.add(), 2);
    assert_eq!(fx.value("data.Equipment.Description.2"), "");
    assert_eq!(fx.live(), vec![1, 2]);
}

#[test]
fn deleting_unknown_entry_is_an_error() {
    let mut fx = Fixture::equipment();
    fx.add();
    assert!(matches!(
        fx.delete(3),
        Err(EngineError::EntryNotFound { index: 3, .. })
    ));
    assert!(matches!(
        fx.manager
            .add_entry("Nope", &mut fx.form, &mut fx.store, FINAL),
        Err(EngineError::UnknownCollection(_))
    ));
    assert_eq!(fx.live(), vec![1]);
}

#[test]
fn missing_control_aborts_before_any_mutation() {
    let mut fx = Fixture::equipment();
    for _ in 0..3 {
        fx.add();
    }
    fx.form.write("data.Equipment.Description.1", "keep");
    assert!(fx.form.destroy_control("data.Equipment.Qty.3"));

    let err = fx.delete(1).unwrap_err();
    assert!(matches!(err, EngineError::MissingControl(ref key) if key == "data.Equipment.Qty.3"));

    assert_eq!(fx.live(), vec![1, 2, 3]);
    assert_eq!(fx.value("data.Equipment.Description.1"), "keep");
    assert!(fx.form.has_control("data.Equipment.Description.2"));
    assert!(fx.store.is_registered(FINAL, "data.Equipment.Description.1"));
}

#[test]
fn reconcile_is_idempotent() {
    let mut fx = Fixture::equipment();
    fx.add();
    let incoming = flat(&[
        ("data.Equipment.Description.1", "Pump"),
        ("data.Equipment.Description.2", "Valve"),
        ("data.Equipment.Qty.3", "4"),
    ]);
    assert_eq!(fx.reconcile(&incoming), 2);
    assert_eq!(fx.live(), vec![1, 2, 3]);
    assert_eq!(fx.reconcile(&incoming), 0);
    assert_eq!(fx.live(), vec![1, 2, 3]);
}

#[test]
fn reconcile_fills_gaps_with_a_contiguous_range() {
    let mut fx = Fixture::equipment();
    let incoming = flat(&[
        ("data.Equipment.Description.1", "Pump"),
        ("data.Equipment.Description.3", "Valve"),
        ("data.Other.Description.9", "ignored"),
        ("data.Equipment.Unknown.7", "ignored"),
    ]);
    assert_eq!(fx.reconcile(&incoming), 3);
    assert_eq!(fx.live(), vec![1, 2, 3]);
    assert!(fx.form.has_control("data.Equipment.Qty.2"));
}

#[test]
fn reconcile_never_removes_entries() {
    let mut fx = Fixture::equipment();
    for _ in 0..4 {
        fx.add();
    }
    assert_eq!(fx.reconcile(&flat(&[("data.Equipment.Description.1", "x")])), 0);
    assert_eq!(fx.reconcile(&FlatMap::new()), 0);
    assert_eq!(fx.live(), vec![1, 2, 3, 4]);
}

#[test]
fn selection_shadow_labels_follow_renumbering() {
    let mut manager = DynamicCollectionManager::new();
    let id = manager.define(CollectionTemplate::new(
        "Shipping Legs",
        &["shippingLegs"],
        vec![FieldTemplate {
            name: "terms".to_string(),
            label: "Terms".to_string(),
            kind: FieldKind::Incoterms,
            optional: false,
        }],
    ))
    .unwrap();
    assert_eq!(id, "ShippingLegs");
    let mut form = FormModel::new();
    let mut store = FlatViewStore::new();
    for _ in 0..2 {
        manager.add_entry(id.as_str(), &mut form, &mut store, FINAL).unwrap();
    }
    form.write("data.shippingLegs.terms.2", "FOB");
    store.snapshot(FINAL, &form);
    assert_eq!(
        store.stored_value(FINAL, "data.shippingLegs.terms.2_label"),
        Some("FOB - Free on Board")
    );

    manager
        .delete_entry(id.as_str(), 1, &mut form, &mut store, FINAL)
        .unwrap();
    assert_eq!(store.stored_value(FINAL, "data.shippingLegs.terms.1"), Some("FOB"));
    assert_eq!(
        store.stored_value(FINAL, "data.shippingLegs.terms.1_label"),
        Some("FOB - Free on Board")
    );
    assert_eq!(store.stored_value(FINAL, "data.shippingLegs.terms.2_label"), None);
}

#[test]
fn snapshot_then_apply_restores_text_and_selection() {
    let mut form = FormModel::new();
    let mut store = FlatViewStore::new();
    form.create_control(ControlSpec {
        key: "data.systemName".to_string(),
        section: "System Name".to_string(),
        label: "System Name".to_string(),
        ordinal: None,
        kind: ControlKind::Text,
        optional: false,
    });
    form.create_control(ControlSpec {
        key: "data.shipping.incoterms".to_string(),
        section: "Shipping Information".to_string(),
        label: "Shipping Terms".to_string(),
        ordinal: None,
        kind: ControlKind::Select {
            options: vec![SelectOption {
                value: "DAP".to_string(),
                label: "DAP - Delivered at Place".to_string(),
            }],
        },
        optional: false,
    });
    store.register_field(FINAL, "data.systemName");
    store.register_field(FINAL, "data.shipping.incoterms");
    form.write("data.systemName", "Case Erector");
    form.write("data.shipping.incoterms", "DAP");

    store.snapshot(FINAL, &form);
    form.write("data.systemName", "");
    form.write("data.shipping.incoterms", "");
    let report = store.apply(FINAL, &mut form);

    assert_eq!(report.applied, 2);
    assert!(report.skipped.is_empty());
    assert_eq!(form.control("data.systemName").unwrap().value, "Case Erector");
    assert_eq!(form.control("data.shipping.incoterms").unwrap().value, "DAP");
}

#[test]
fn rebind_rejects_occupied_targets() {
    let mut form = FormModel::new();
    for key in ["data.a.x.1", "data.a.x.2"] {
        form.create_control(ControlSpec {
            key: key.to_string(),
            section: "A".to_string(),
            label: "X".to_string(),
            ordinal: None,
            kind: ControlKind::Text,
            optional: false,
        });
    }
    let err = form
        .rebind_batch(&[Rebind {
            from: "data.a.x.2".to_string(),
            to: "data.a.x.1".to_string(),
            ordinal: Some(1),
        }])
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyInUse(_)));
    assert!(form.has_control("data.a.x.2"));
}

#[test]
fn templates_must_produce_entry_keys() {
    let mut manager = DynamicCollectionManager::new();
    let no_path: [&str; 0] = [];
    let err = manager
        .define(CollectionTemplate::new(
            "Notes",
            &no_path,
            vec![FieldTemplate::text("note", "Note")],
        ))
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyCategoryPath(ref field) if field == "note"));
    assert!(!manager.is_defined("Notes"));

    assert!(matches!(
        manager.define(CollectionTemplate::new("Blank", &["blank"], Vec::new())),
        Err(EngineError::InvalidTemplate(_))
    ));
    assert!(matches!(
        manager.define(CollectionTemplate::new(
            "Dotted",
            &["a.b"],
            vec![FieldTemplate::text("note", "Note")],
        )),
        Err(EngineError::InvalidSegment(_))
    ));
    assert!(manager.ids().is_empty());
}

/// Form surface that refuses any rebind batch touching one key.
struct RejectingForm {
    inner: FormModel,
    reject: String,
}

impl FormSurface for RejectingForm {
    fn create_control(&mut self, spec: ControlSpec) {
        self.inner.create_control(spec);
    }

    fn destroy_control(&mut self, key: &str) -> bool {
        self.inner.destroy_control(key)
    }

    fn has_control(&self, key: &str) -> bool {
        self.inner.has_control(key)
    }

    fn read(&self, key: &str) -> Option<CapturedValue> {
        self.inner.read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> bool {
        self.inner.write(key, value)
    }

    fn rebind_batch(&mut self, batch: &[Rebind]) -> Result<(), EngineError> {
        if batch.iter().any(|rebind| rebind.from == self.reject) {
            return Err(EngineError::KeyInUse(self.reject.clone()));
        }
        self.inner.rebind_batch(batch)
    }
}

#[test]
fn rejected_renumbering_restores_every_entry() {
    let mut fx = Fixture::equipment();
    for _ in 0..3 {
        fx.add();
    }
    for index in 1..=3 {
        fx.form.write(
            format!("data.Equipment.Description.{index}").as_str(),
            format!("item {index}").as_str(),
        );
        fx.form.write(
            format!("data.Equipment.Qty.{index}").as_str(),
            index.to_string().as_str(),
        );
    }
    fx.store.snapshot(FINAL, &fx.form);
    let stored_before = fx.store.stored(FINAL);
    let active_before = fx.store.active_keys(FINAL);

    // Entry 2 moves down fine, entry 3 is refused.
    let mut form = RejectingForm {
        inner: std::mem::take(&mut fx.form),
        reject: "data.Equipment.Description.3".to_string(),
    };
    let err = fx
        .manager
        .delete_entry(fx.id.as_str(), 1, &mut form, &mut fx.store, FINAL)
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyInUse(_)));
    fx.form = form.inner;

    assert_eq!(fx.live(), vec![1, 2, 3]);
    for index in 1..=3 {
        let key = format!("data.Equipment.Description.{index}");
        assert_eq!(fx.value(key.as_str()), format!("item {index}"));
        assert_eq!(
            fx.form.control(key.as_str()).unwrap().display_label(),
            format!("Description {index}")
        );
        assert_eq!(
            fx.value(format!("data.Equipment.Qty.{index}").as_str()),
            index.to_string()
        );
    }
    assert_eq!(fx.form.len(), 6);
    assert_eq!(fx.store.stored(FINAL), stored_before);
    assert_eq!(fx.store.active_keys(FINAL), active_before);

    // The collection is still usable afterwards.
    fx.delete(1).unwrap();
    assert_eq!(fx.live(), vec![1, 2]);
    assert_eq!(fx.value("data.Equipment.Description.1"), "item 2");
}

proptest! {
    #[test]
    fn any_number_of_adds_is_contiguous(count in 1u32..16) {
        let mut fx = Fixture::equipment();
        for expected in 1..=count {
            prop_assert_eq!(fx.add(), expected);
        }
        prop_assert_eq!(fx.live(), (1..=count).collect::<Vec<_>>());
        prop_assert_eq!(fx.form.len(), 2 * count as usize);
    }

    #[test]
    fn delete_shifts_every_later_entry_down(
        (count, doomed) in (1u32..12).prop_flat_map(|count| (Just(count), 1..=count))
    ) {
        let mut fx = Fixture::equipment();
        for index in 1..=count {
            fx.add();
            fx.form.write(
                format!("data.Equipment.Description.{index}").as_str(),
                format!("item {index}").as_str(),
            );
        }
        fx.store.snapshot(FINAL, &fx.form);

        fx.delete(doomed).unwrap();

        prop_assert_eq!(fx.live(), (1..count).collect::<Vec<_>>());
        for index in 1..count {
            let source = if index < doomed { index } else { index + 1 };
            let key = format!("data.Equipment.Description.{index}");
            let expected = format!("item {source}");
            prop_assert_eq!(fx.value(key.as_str()), expected.clone());
            prop_assert_eq!(
                fx.store.stored_value(FINAL, key.as_str()),
                Some(expected.as_str())
            );
        }
        let last = format!("data.Equipment.Description.{count}");
        prop_assert!(!fx.form.has_control(last.as_str()));
        prop_assert!(!fx.store.is_registered(FINAL, last.as_str()));
        prop_assert_eq!(fx.store.stored_value(FINAL, last.as_str()), None);
    }

    #[test]
    fn reconcile_reaches_the_highest_index_once(
        existing in 0u32..5,
        indices in prop::collection::btree_set(1u32..20, 0..6),
    ) {
        let mut fx = Fixture::equipment();
        for _ in 0..existing {
            fx.add();
        }
        let incoming: FlatMap = indices
            .iter()
            .map(|index| (format!("data.Equipment.Qty.{index}"), index.to_string()))
            .collect();
        let highest = indices.iter().copied().max().unwrap_or(0);
        let expected = existing.max(highest);

        let added = fx.reconcile(&incoming);
        prop_assert_eq!(added, expected - existing);
        prop_assert_eq!(fx.live(), (1..=expected).collect::<Vec<_>>());

        prop_assert_eq!(fx.reconcile(&incoming), 0);
        prop_assert_eq!(fx.live(), (1..=expected).collect::<Vec<_>>());
        let keys: BTreeSet<String> = fx.store.active_keys(FINAL).into_iter().collect();
        prop_assert_eq!(keys.len(), 2 * expected as usize);
    }
}
