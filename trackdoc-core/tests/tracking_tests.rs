//! Integration tests for dirty-path tracking

use std::sync::Arc;
use std::thread;
use trackdoc_core::prelude::*;
use trackdoc_core::{ConstantPool, TrackError};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn model_with(config: TrackingConfig) -> Arc<DocumentModel> {
    let model = DocumentModel::new(config).unwrap();
    let item = Schema::builder("Item")
        .field("level", FieldKind::Scalar(ScalarType::Int))
        .field("notes", FieldKind::List(ElementKind::Scalar(ScalarType::String)))
        .build()
        .unwrap();
    let player = Schema::builder("Player")
        .field("name", FieldKind::Scalar(ScalarType::String))
        .field("map", FieldKind::Map(ElementKind::Record(item.clone())))
        .field("items", FieldKind::List(ElementKind::Record(item.clone())))
        .field("badges", FieldKind::Set(ElementKind::Record(item.clone())))
        .field("tags", FieldKind::Set(ElementKind::Scalar(ScalarType::String)))
        .field("scores", FieldKind::Map(ElementKind::Scalar(ScalarType::Int)))
        .key_fields(["name"])
        .version("version")
        .build()
        .unwrap();
    model.register(item).unwrap();
    model.register(player).unwrap();
    model
}

fn model() -> Arc<DocumentModel> {
    model_with(TrackingConfig::default())
}

fn item(model: &DocumentModel) -> Arc<Record> {
    model.record(&model.schema("Item").unwrap())
}

fn paths(doc: &Document) -> Vec<String> {
    doc.dirty_paths().iter().map(|p| p.to_string()).collect()
}

fn assert_no_prefix_pairs(doc: &Document) {
    let recorded = doc.dirty_paths();
    for a in &recorded {
        for b in &recorded {
            assert!(a == b || !a.covers(b), "{} covers {}", a, b);
        }
    }
}

#[test]
fn test_fresh_document_has_empty_diff() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    assert!(doc.dirty_paths().is_empty());
    assert!(doc.root().get_map("map").unwrap().is_empty());
    assert!(doc.root().get_list("items").unwrap().is_empty());
}

#[test]
fn test_nested_record_in_map_records_leaf_path() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let map = doc.root().get_map("map").unwrap();
    let entry = item(&model);

    map.put("k", entry.clone()).unwrap();
    assert_eq!(paths(&doc), vec!["map.k"]);
    doc.clear_dirty();

    entry.set("level", 5).unwrap();
    assert_eq!(paths(&doc), vec!["map.k.level"]);
}

#[test]
fn test_replacing_container_collapses_sub_paths() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let entry = item(&model);
    doc.root().get_map("map").unwrap().put("k", entry.clone()).unwrap();
    doc.clear_dirty();

    entry.set("level", 5).unwrap();
    entry.get_list("notes").unwrap().push("first").unwrap();
    assert_eq!(paths(&doc), vec!["map.k.level", "map.k.notes"]);

    doc.set("map", model.map()).unwrap();
    assert_eq!(paths(&doc), vec!["map"]);

    // The replaced map and its entries left the tree.
    assert!(!entry.is_attached());
    entry.set("level", 6).unwrap();
    assert_eq!(paths(&doc), vec!["map"]);
}

#[test]
fn test_duplicate_set_member_changes_nothing() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let tags = doc.root().get_set("tags").unwrap();

    assert!(tags.insert("a").unwrap());
    doc.clear_dirty();

    assert!(!tags.insert("a").unwrap());
    assert_eq!(tags.len(), 1);
    assert_eq!(tags.to_vec(), vec![Value::from("a")]);
    assert!(doc.dirty_paths().is_empty());
}

#[test]
fn test_batch_set_insert_reports_accepted_subset() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let tags = doc.root().get_set("tags").unwrap();

    let accepted = tags.extend(["a", "b", "a", "c"]).unwrap();
    assert_eq!(accepted, vec![Value::from("a"), Value::from("b"), Value::from("c")]);
    assert_eq!(paths(&doc), vec!["tags"]);
}

#[test]
fn test_list_paths_follow_reindexing() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let items = doc.root().get_list("items").unwrap();
    let (first, second, inserted) = (item(&model), item(&model), item(&model));

    items.push(first.clone()).unwrap();
    items.push(second.clone()).unwrap();
    doc.clear_dirty();

    items.insert(0, inserted.clone()).unwrap();
    assert_eq!(paths(&doc), vec!["items"]);
    assert_eq!(inserted.path(), Some(DotPath::from("items.0")));
    assert_eq!(second.path(), Some(DotPath::from("items.2")));
    doc.clear_dirty();

    second.set("level", 1).unwrap();
    assert_eq!(paths(&doc), vec!["items.2.level"]);
    doc.clear_dirty();

    items.remove(0).unwrap();
    assert!(!inserted.is_attached());
    assert_eq!(first.path(), Some(DotPath::from("items.0")));
    assert_eq!(second.path(), Some(DotPath::from("items.1")));
}

#[test]
fn test_list_replace_records_index() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let items = doc.root().get_list("items").unwrap();
    items.extend([item(&model), item(&model)]).unwrap();
    doc.clear_dirty();

    let old = items.set(1, item(&model)).unwrap();
    assert_eq!(paths(&doc), vec!["items.1"]);
    assert!(!old.is_attached());
}

#[test]
fn test_nested_operations_record_once_per_outer_call() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let scores = doc.root().get_map("scores").unwrap();

    scores.put_all([("a", 1), ("b", 2)]).unwrap();
    assert_eq!(paths(&doc), vec!["scores.a", "scores.b"]);
    doc.clear_dirty();

    let items = doc.root().get_list("items").unwrap();
    items.extend([item(&model), item(&model), item(&model)]).unwrap();
    doc.clear_dirty();
    let second = items.get(1).unwrap();
    assert_eq!(items.retain(|v| !v.same_node(&second)).unwrap(), 1);
    assert_eq!(items.len(), 2);
    assert_eq!(paths(&doc), vec!["items"]);
}

#[test]
fn test_set_members_collapse_onto_set_path() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let badges = doc.root().get_set("badges").unwrap();
    let badge = item(&model);
    badges.insert(badge.clone()).unwrap();
    doc.clear_dirty();

    badge.get_list("notes").unwrap().push("shiny").unwrap();
    assert_eq!(paths(&doc), vec!["badges"]);
}

#[test]
fn test_detached_node_stops_contributing() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let map = doc.root().get_map("map").unwrap();
    let entry = item(&model);
    map.put("k", entry.clone()).unwrap();
    doc.clear_dirty();

    entry.set("level", 1).unwrap();
    let live = doc.tree().live_nodes();
    map.remove("k").unwrap();
    assert_eq!(paths(&doc), vec!["map.k"]);
    assert!(doc.tree().live_nodes() < live);

    entry.set("level", 2).unwrap();
    entry.get_list("notes").unwrap().push("late").unwrap();
    assert_eq!(paths(&doc), vec!["map.k"]);
}

#[test]
fn test_node_cannot_be_attached_twice() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let entry = item(&model);
    doc.root().get_list("items").unwrap().push(entry.clone()).unwrap();

    let map = doc.root().get_map("map").unwrap();
    let err = map.put("k", entry.clone()).unwrap_err();
    assert!(matches!(err, TrackError::AlreadyAttached(path) if path == "items.0"));
    assert!(map.is_empty());

    let other = Document::new(&model, "Player").unwrap();
    assert!(other.root().get_list("items").unwrap().push(entry).is_err());
}

#[test]
fn test_reputting_same_node_is_allowed() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let map = doc.root().get_map("map").unwrap();
    let entry = item(&model);
    map.put("k", entry.clone()).unwrap();
    map.put("k", entry.clone()).unwrap();
    assert!(entry.is_attached());
    assert_eq!(entry.path(), Some(DotPath::from("map.k")));
}

#[test]
fn test_root_field_writes() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    doc.set("name", "ada").unwrap();
    doc.root().get_map("scores").unwrap().put("x", 1).unwrap();
    assert_eq!(paths(&doc), vec!["name", "scores.x"]);

    doc.unset("scores").unwrap();
    assert_eq!(paths(&doc), vec!["name", "scores"]);
    assert_no_prefix_pairs(&doc);
}

#[test]
fn test_clear_records_container_path() {
    let model = model();
    let doc = Document::new(&model, "Player").unwrap();
    let scores = doc.root().get_map("scores").unwrap();
    scores.put_all([("a", 1), ("b", 2)]).unwrap();
    scores.clear().unwrap();
    assert_eq!(paths(&doc), vec!["scores"]);
}

#[test]
fn test_bucketed_unsynchronized_model_tracks_the_same() {
    let config = TrackingConfig {
        lock_mode: LockMode::Unsynchronized,
        attribute_store: trackdoc_core::AttributeStoreKind::Bucketed,
        attribute_buckets: 4,
        ..TrackingConfig::default()
    };
    let model = model_with(config);
    let doc = Document::new(&model, "Player").unwrap();
    let entry = item(&model);
    doc.root().get_map("map").unwrap().put("k", entry.clone()).unwrap();
    doc.clear_dirty();
    entry.set("level", 3).unwrap();
    assert_eq!(paths(&doc), vec!["map.k.level"]);
}

#[test]
fn test_concurrent_mutations_keep_minimal_set() {
    init_tracing();
    let model = model();
    let doc = Arc::new(Document::new(&model, "Player").unwrap());
    let scores = doc.root().get_map("scores").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let scores = scores.clone();
            let doc = doc.clone();
            thread::spawn(move || {
                for k in 0..50 {
                    scores.put(format!("t{}k{}", t, k), k).unwrap();
                    if k % 10 == 0 {
                        doc.set("name", format!("writer{}", t)).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(scores.len(), 200);
    assert_eq!(doc.dirty_paths().len(), 201);
    assert_no_prefix_pairs(&doc);
}

#[test]
fn test_identity_registry_is_consistent_across_threads() {
    let pool = Arc::new(ConstantPool::new());
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || pool.value_of("shared"))
        })
        .collect();
    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(ids.iter().all(|c| c == &ids[0]));
    assert_eq!(pool.len(), 1);
    assert_eq!(ids[0].id(), 0);
}
