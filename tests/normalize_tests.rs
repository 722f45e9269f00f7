use serde_json::{Value, json};
use sqlitesync::{
    Descriptor, Nested, SyncError, normalize,
    normalize::{to_descriptor, to_json},
};

fn canonical(input: Value) -> Value {
    let descriptor = Descriptor::try_from(&input).expect("descriptor");
    to_json(&normalize(&descriptor).expect("normalize"))
}

#[test]
fn test_normalize_bare_name() {
    assert_eq!(canonical(json!("example")), json!([{"example": {}}]));
    assert_eq!(canonical(json!(["example"])), json!([{"example": {}}]));
}

#[test]
fn test_normalize_flattens_nested_lists() {
    assert_eq!(
        canonical(json!(["example1", ["example2", "example3"]])),
        json!([{"example1": {}}, {"example2": {}}, {"example3": {}}])
    );
}

#[test]
fn test_normalize_maps() {
    assert_eq!(canonical(json!({})), json!([]));
    assert_eq!(canonical(json!({"a": {}})), json!([{"a": {}}]));
    assert_eq!(canonical(json!({"a": "b"})), json!([{"a": {"b": {}}}]));
    assert_eq!(
        canonical(json!({"a": {}, "b": {}})),
        json!([{"a": {}}, {"b": {}}])
    );
    assert_eq!(
        canonical(json!({"a": {"b": {}, "c": {}}})),
        json!([{"a": {"b": {}}}, {"a": {"c": {}}}])
    );
}

#[test]
fn test_normalize_unrolls_every_disjoint_expansion() {
    let input = json!([
        {"campaign_group": [
            {"campaigns": "campaign_products"},
            "campaign_groups_targeting_segments",
            {"transactions": ["coupon", "issued_by_user"]}
        ]},
        {"advertiser_profile": ["advertiser_profile_sources", {"ad_configs": "parent"}]}
    ]);
    assert_eq!(
        canonical(input),
        json!([
            {"campaign_group": {"campaigns": {"campaign_products": {}}}},
            {"campaign_group": {"campaign_groups_targeting_segments": {}}},
            {"campaign_group": {"transactions": {"coupon": {}}}},
            {"campaign_group": {"transactions": {"issued_by_user": {}}}},
            {"advertiser_profile": {"advertiser_profile_sources": {}}},
            {"advertiser_profile": {"ad_configs": {"parent": {}}}}
        ])
    );

    let deep = json!({
        "example1": {
            "example2": {"example3": ["example4", "example5"]},
            "example6": {"example7": {"example8": "example9"}}
        }
    });
    assert_eq!(
        canonical(deep),
        json!([
            {"example1": {"example2": {"example3": {"example4": {}}}}},
            {"example1": {"example2": {"example3": {"example5": {}}}}},
            {"example1": {"example6": {"example7": {"example8": {"example9": {}}}}}}
        ])
    );
}

#[test]
fn test_normalize_passes_branch_maps_through() {
    let input = json!([
        {"campaign_products": ["transactions"]},
        {"reference_object": {"AdvertiserProfile": {}, "Listing": {}}}
    ]);
    let descriptor = Descriptor::try_from(&input).unwrap();
    let paths = normalize(&descriptor).unwrap();
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[1].relationship, "reference_object");
    let Nested::Polymorphic(branches) = &paths[1].nested else {
        panic!("expected per-model branches");
    };
    assert_eq!(
        branches.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["AdvertiserProfile", "Listing"]
    );
    assert_eq!(
        to_json(&paths),
        json!([
            {"campaign_products": {"transactions": {}}},
            {"reference_object": {"AdvertiserProfile": {}, "Listing": {}}}
        ])
    );
}

#[test]
fn test_normalize_is_idempotent() {
    let inputs = [
        json!("a"),
        json!(["a", "b"]),
        json!({"a": {"b": {}, "c": ["d", {"e": "f"}]}}),
        json!([{"reference_object": {"Agent": "listings", "Listing": null}}, "vertical"]),
    ];
    for input in inputs {
        let once = normalize(&Descriptor::try_from(&input).unwrap()).unwrap();
        let twice = normalize(&to_descriptor(&once)).unwrap();
        assert_eq!(once, twice, "normalizing {input} twice changed it");
    }
}

#[test]
fn test_normalize_rejects_misplaced_branches_and_scalars() {
    let err = normalize(&Descriptor::from_json_str(r#"[{"Agent": "listings"}]"#).unwrap())
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidInput(_)));

    let err = Descriptor::from_json_str("[1]").unwrap_err();
    assert!(matches!(err, SyncError::InvalidInput(_)));
}
