use sqlitesync::{
    Introspector, ModelDef, Schema, SchemaProvider, SqliteStore, SyncError,
    cache::ObservedTypeCache,
};

#[test]
fn test_observed_type_cache_get_insert_clear() {
    let cache = ObservedTypeCache::new();
    assert!(cache.get("Campaign", "reference_object").is_none());
    cache.insert("Campaign", "reference_object", vec!["Listing".into()]);
    assert_eq!(
        cache.get("Campaign", "reference_object"),
        Some(vec!["Listing".to_string()])
    );
    assert!(cache.get("Campaign", "partner").is_none());
    cache.clear();
    assert!(cache.get("Campaign", "reference_object").is_none());
}

fn schema() -> Schema {
    Schema::new(vec![
        ModelDef::new("Campaign", "campaigns").belongs_to_polymorphic("reference_object"),
        ModelDef::new("Agent", "agents"),
        ModelDef::new("Listing", "listings"),
    ])
    .unwrap()
}

fn store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .execute_batch(
            "CREATE TABLE campaigns (id INTEGER PRIMARY KEY, reference_object_id INTEGER, reference_object_type TEXT);
             CREATE TABLE agents (id INTEGER PRIMARY KEY);
             CREATE TABLE listings (id INTEGER PRIMARY KEY);
             INSERT INTO campaigns VALUES (1, 1, 'Listing'), (2, 1, 'Agent'), (3, NULL, NULL), (4, 2, '');",
        )
        .unwrap();
    store
}

#[test]
fn test_introspector_reports_sorted_observed_types() {
    let schema = schema();
    let store = store();
    let introspector = Introspector::new(&schema, &store);
    let relationship = schema.relationship("Campaign", "reference_object").unwrap();
    let types = introspector
        .observed_target_types("Campaign", relationship)
        .unwrap();
    assert_eq!(types, vec!["Agent".to_string(), "Listing".to_string()]);
}

#[test]
fn test_introspector_serves_cached_types_until_cleared() {
    let schema = schema();
    let store = store();
    let introspector = Introspector::new(&schema, &store);
    let relationship = schema.relationship("Campaign", "reference_object").unwrap();
    introspector
        .observed_target_types("Campaign", relationship)
        .unwrap();

    store
        .execute_batch("INSERT INTO campaigns VALUES (5, 9, 'Spaceship');")
        .unwrap();
    let cached = introspector
        .observed_target_types("Campaign", relationship)
        .unwrap();
    assert_eq!(cached.len(), 2);

    introspector.clear_cache();
    let err = introspector
        .observed_target_types("Campaign", relationship)
        .unwrap_err();
    assert!(matches!(err, SyncError::Schema(_)));
}
