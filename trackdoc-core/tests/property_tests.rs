use proptest::prelude::*;
use std::sync::Arc;
use trackdoc_core::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    PutEntry(usize),
    SetEntryLevel(usize, i64),
    RemoveEntry(usize),
    ReplaceMap,
    PushItem,
    InsertItem(usize),
    SetItemLevel(usize, i64),
    RemoveItem(usize),
    PushNote(usize),
    InsertTag(u8),
    SetName(u8),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..4).prop_map(Op::PutEntry),
        (0usize..4, any::<i64>()).prop_map(|(k, v)| Op::SetEntryLevel(k, v)),
        (0usize..4).prop_map(Op::RemoveEntry),
        Just(Op::ReplaceMap),
        Just(Op::PushItem),
        (0usize..4).prop_map(Op::InsertItem),
        (0usize..4, any::<i64>()).prop_map(|(i, v)| Op::SetItemLevel(i, v)),
        (0usize..4).prop_map(Op::RemoveItem),
        (0usize..4).prop_map(Op::PushNote),
        (0u8..4).prop_map(Op::InsertTag),
        (0u8..4).prop_map(Op::SetName),
        Just(Op::Clear),
    ]
}

fn model() -> Arc<DocumentModel> {
    let model = DocumentModel::new(TrackingConfig::default()).unwrap();
    let item = Schema::builder("Item")
        .field("level", FieldKind::Scalar(ScalarType::Int))
        .field("notes", FieldKind::List(ElementKind::Scalar(ScalarType::String)))
        .build()
        .unwrap();
    let player = Schema::builder("Player")
        .field("name", FieldKind::Scalar(ScalarType::String))
        .field("map", FieldKind::Map(ElementKind::Record(item.clone())))
        .field("items", FieldKind::List(ElementKind::Record(item.clone())))
        .field("tags", FieldKind::Set(ElementKind::Scalar(ScalarType::String)))
        .build()
        .unwrap();
    model.register(item).unwrap();
    model.register(player).unwrap();
    model
}

fn apply(model: &DocumentModel, doc: &Document, op: &Op) {
    let item_schema = model.schema("Item").unwrap();
    let root = doc.root();
    match op {
        Op::PutEntry(k) => {
            let map = root.get_map("map").unwrap();
            map.put(format!("k{}", k), model.record(&item_schema)).unwrap();
        }
        Op::SetEntryLevel(k, v) => {
            let map = root.get_map("map").unwrap();
            if let Some(entry) = map.get(&format!("k{}", k)).and_then(|v| v.as_record().cloned()) {
                entry.set("level", *v).unwrap();
            }
        }
        Op::RemoveEntry(k) => {
            root.get_map("map").unwrap().remove(&format!("k{}", k)).unwrap();
        }
        Op::ReplaceMap => {
            doc.set("map", model.map()).unwrap();
        }
        Op::PushItem => {
            root.get_list("items").unwrap().push(model.record(&item_schema)).unwrap();
        }
        Op::InsertItem(i) => {
            let items = root.get_list("items").unwrap();
            let at = (*i).min(items.len());
            items.insert(at, model.record(&item_schema)).unwrap();
        }
        Op::SetItemLevel(i, v) => {
            let items = root.get_list("items").unwrap();
            if let Some(item) = items.get(*i).and_then(|v| v.as_record().cloned()) {
                item.set("level", *v).unwrap();
            }
        }
        Op::RemoveItem(i) => {
            let items = root.get_list("items").unwrap();
            if *i < items.len() {
                items.remove(*i).unwrap();
            }
        }
        Op::PushNote(i) => {
            let items = root.get_list("items").unwrap();
            if let Some(item) = items.get(*i).and_then(|v| v.as_record().cloned()) {
                item.get_list("notes").unwrap().push("note").unwrap();
            }
        }
        Op::InsertTag(t) => {
            root.get_set("tags").unwrap().insert(format!("t{}", t)).unwrap();
        }
        Op::SetName(n) => {
            doc.set("name", format!("n{}", n)).unwrap();
        }
        Op::Clear => doc.clear_dirty(),
    }
}

proptest! {
    #[test]
    fn dirty_set_never_holds_overlapping_paths(ops in prop::collection::vec(op(), 1..40)) {
        let model = model();
        let doc = Document::new(&model, "Player").unwrap();

        for op in &ops {
            apply(&model, &doc, op);
            let recorded = doc.dirty_paths();
            for a in &recorded {
                for b in &recorded {
                    prop_assert!(a == b || !a.covers(b), "{} covers {} after {:?}", a, b, op);
                }
            }
        }
    }

    #[test]
    fn attached_nodes_resolve_to_their_slot(ops in prop::collection::vec(op(), 1..40)) {
        let model = model();
        let doc = Document::new(&model, "Player").unwrap();
        for op in &ops {
            apply(&model, &doc, op);
        }

        let items = doc.root().get_list("items").unwrap();
        for (index, item) in items.to_vec().iter().enumerate() {
            let record = item.as_record().unwrap();
            prop_assert_eq!(record.path(), Some(DotPath::from(format!("items.{}", index))));
        }
        let map = doc.root().get_map("map").unwrap();
        for (key, entry) in map.entries() {
            let record = entry.as_record().unwrap();
            prop_assert_eq!(record.path(), Some(DotPath::from(format!("map.{}", key))));
        }
    }
}
