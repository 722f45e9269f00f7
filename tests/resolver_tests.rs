use serde_json::json;
use sqlitesync::{
    BasicHint, Descriptor, HintPolicy, Introspector, ModelDef, Relationship, Schema, SqliteStore,
    SyncError,
    bench_utils::{SchemaShape, generate_schema, model_name},
    identify_associations,
};

fn resolve(schema: &Schema, ddl: &str, root: &str, hints: &HintPolicy) -> Option<Descriptor> {
    let store = SqliteStore::open_in_memory().expect("store");
    store.execute_batch(ddl).expect("ddl");
    let introspector = Introspector::new(schema, &store);
    identify_associations(&introspector, root, hints).expect("resolve")
}

fn expected(value: serde_json::Value) -> Option<Descriptor> {
    Some(Descriptor::try_from(&value).expect("descriptor"))
}

fn pictures_schema() -> Schema {
    Schema::new(vec![
        ModelDef::new("Picture", "pictures").belongs_to_polymorphic("imageable"),
        ModelDef::new("Employee", "employees")
            .relationship(Relationship::has_many("pictures", "Picture").as_interface("imageable"))
            .has_one("region", "Region"),
        ModelDef::new("Gizmo", "gizmos")
            .relationship(Relationship::has_many("pictures", "Picture").as_interface("imageable")),
        ModelDef::new("Region", "regions"),
    ])
    .expect("schema")
}

const PICTURES_DDL: &str = "
    CREATE TABLE pictures (id INTEGER PRIMARY KEY, imageable_id INTEGER, imageable_type TEXT);
    INSERT INTO pictures (imageable_id, imageable_type) VALUES (1, 'Employee'), (1, 'Gizmo'), (NULL, NULL), (NULL, '');
";

fn campaigns_schema() -> Schema {
    Schema::new(vec![
        ModelDef::new("Campaign", "campaigns")
            .belongs_to("partner", "Partner")
            .belongs_to("vertical", "Vertical")
            .belongs_to_polymorphic("reference_object")
            .has_many("products", "Product"),
        ModelDef::new("Partner", "partners")
            .has_many("campaigns", "Campaign")
            .belongs_to("vertical", "Vertical"),
        ModelDef::new("Vertical", "verticals")
            .has_many("partners", "Partner")
            .has_many("campaigns", "Campaign"),
        ModelDef::new("Agent", "agents")
            .has_many("listings", "Listing")
            .relationship(
                Relationship::has_many("campaigns", "Campaign").as_interface("reference_object"),
            ),
        ModelDef::new("Listing", "listings")
            .belongs_to("agent", "Agent")
            .relationship(
                Relationship::has_many("campaigns", "Campaign").as_interface("reference_object"),
            ),
        ModelDef::new("Product", "products")
            .belongs_to("order", "Order")
            .belongs_to("campaign", "Campaign"),
        ModelDef::new("Order", "orders").has_many("products", "Product"),
    ])
    .expect("schema")
}

const CAMPAIGNS_DDL: &str = "
    CREATE TABLE campaigns (id INTEGER PRIMARY KEY, reference_object_id INTEGER, reference_object_type TEXT);
    INSERT INTO campaigns (reference_object_id, reference_object_type) VALUES (1, 'Agent'), (1, 'Listing');
";

/// Every target model a descriptor reaches from `model`, following the schema.
fn reached_models(schema: &Schema, model: &str, descriptor: &Descriptor, out: &mut Vec<String>) {
    match descriptor {
        Descriptor::Name(name) => {
            let relationship = schema.relationship(model, name).expect("relationship");
            if let Some(target) = relationship.target_model() {
                out.push(target.to_string());
            }
        }
        Descriptor::List(items) => {
            for item in items {
                reached_models(schema, model, item, out);
            }
        }
        Descriptor::Map(entries) => {
            for (name, nested) in entries {
                let relationship = schema.relationship(model, name).expect("relationship");
                match (relationship.target_model(), nested) {
                    (_, Descriptor::ByType(branches)) => {
                        for (runtime, branch) in branches {
                            out.push(runtime.clone());
                            if let Some(branch) = branch {
                                reached_models(schema, runtime, branch, out);
                            }
                        }
                    }
                    (Some(target), nested) => {
                        out.push(target.to_string());
                        reached_models(schema, target, nested, out);
                    }
                    (None, _) => {}
                }
            }
        }
        Descriptor::ByType(_) => panic!("branch map outside a relationship"),
    }
}

/// Fails when a descriptor steps `X -> Y -> X` through standard relationships.
fn assert_no_immediate_backtrack(
    schema: &Schema,
    model: &str,
    came_from: Option<&str>,
    descriptor: &Descriptor,
) {
    let check = |name: &str| -> String {
        let target = schema
            .relationship(model, name)
            .expect("relationship")
            .target_model()
            .expect("standard")
            .to_string();
        if let Some(previous) = came_from {
            assert_ne!(target, previous, "{model}.{name} walks straight back to {previous}");
        }
        target
    };
    match descriptor {
        Descriptor::Name(name) => {
            check(name.as_str());
        }
        Descriptor::List(items) => {
            for item in items {
                assert_no_immediate_backtrack(schema, model, came_from, item);
            }
        }
        Descriptor::Map(entries) => {
            for (name, nested) in entries {
                let target = check(name.as_str());
                assert_no_immediate_backtrack(schema, &target, Some(model), nested);
            }
        }
        Descriptor::ByType(_) => panic!("random schemas have no polymorphic relationships"),
    }
}

#[test]
fn test_model_without_relationships_resolves_to_none() {
    let schema = Schema::new(vec![ModelDef::new("Cat", "cats")]).expect("schema");
    assert_eq!(resolve(&schema, "", "Cat", &HintPolicy::new()), None);
}

#[test]
fn test_single_and_multiple_direct_relationships() {
    let schema = Schema::new(vec![
        ModelDef::new("Car", "cars").has_one("steering_wheel", "SteeringWheel"),
        ModelDef::new("SteeringWheel", "steering_wheels"),
        ModelDef::new("Plane", "planes")
            .has_many("passengers", "Passenger")
            .has_many("pilots", "Pilot"),
        ModelDef::new("Passenger", "passengers"),
        ModelDef::new("Pilot", "pilots"),
    ])
    .expect("schema");
    assert_eq!(
        resolve(&schema, "", "Car", &HintPolicy::new()),
        expected(json!("steering_wheel"))
    );
    assert_eq!(
        resolve(&schema, "", "Plane", &HintPolicy::new()),
        expected(json!(["passengers", "pilots"]))
    );
}

#[test]
fn test_back_reference_to_parent_is_pruned() {
    let schema = Schema::new(vec![
        ModelDef::new("Country", "countries")
            .has_many("states", "State")
            .relationship(Relationship::has_many_through("counties", "County", "states", "counties")),
        ModelDef::new("State", "states")
            .belongs_to("country", "Country")
            .has_many("counties", "County"),
        ModelDef::new("County", "counties").belongs_to("state", "State"),
    ])
    .expect("schema");
    assert_eq!(
        resolve(&schema, "", "Country", &HintPolicy::new()),
        expected(json!({"states": "counties"}))
    );
}

#[test]
fn test_has_one_through_is_ignored_in_favor_of_direct_path() {
    let schema = Schema::new(vec![
        ModelDef::new("Supplier", "suppliers")
            .has_one("account", "Account")
            .relationship(Relationship::has_one_through(
                "account_history",
                "AccountHistory",
                "account",
                "account_history",
            )),
        ModelDef::new("Account", "accounts")
            .belongs_to("supplier", "Supplier")
            .has_one("account_history", "AccountHistory"),
        ModelDef::new("AccountHistory", "account_histories").belongs_to("account", "Account"),
    ])
    .expect("schema");
    assert_eq!(
        resolve(&schema, "", "Supplier", &HintPolicy::new()),
        expected(json!({"account": "account_history"}))
    );
}

#[test]
fn test_many_to_many_back_reference_is_pruned() {
    let schema = Schema::new(vec![
        ModelDef::new("Assembly", "assemblies").has_and_belongs_to_many("parts", "Part"),
        ModelDef::new("Part", "parts").has_and_belongs_to_many("assemblies", "Assembly"),
    ])
    .expect("schema");
    assert_eq!(
        resolve(&schema, "", "Assembly", &HintPolicy::new()),
        expected(json!("parts"))
    );
}

#[test]
fn test_polymorphic_relationship_branches_per_observed_type() {
    let resolved = resolve(&pictures_schema(), PICTURES_DDL, "Picture", &HintPolicy::new());
    assert_eq!(
        resolved,
        expected(json!({"imageable": {"Employee": "region", "Gizmo": null}}))
    );
}

#[test]
fn test_polymorphic_relationship_nested_below_standard_ones() {
    let schema = Schema::new(vec![
        ModelDef::new("Customer", "customers").has_many("invoices", "Invoice"),
        ModelDef::new("Invoice", "invoices")
            .belongs_to("customer", "Customer")
            .has_many("line_items", "LineItem"),
        ModelDef::new("LineItem", "line_items")
            .belongs_to("invoice", "Invoice")
            .belongs_to_polymorphic("product"),
        ModelDef::new("DigitalProduct", "digital_products")
            .relationship(Relationship::has_many("line_items", "LineItem").as_interface("product"))
            .belongs_to("category", "Category"),
        ModelDef::new("PhysicalProduct", "physical_products")
            .relationship(Relationship::has_many("line_items", "LineItem").as_interface("product"))
            .belongs_to("distributor", "Distributor"),
        ModelDef::new("Category", "categories").has_many("digital_products", "DigitalProduct"),
        ModelDef::new("Distributor", "distributors")
            .has_many("physical_products", "PhysicalProduct"),
    ])
    .expect("schema");
    let ddl = "
        CREATE TABLE line_items (id INTEGER PRIMARY KEY, product_id INTEGER, product_type TEXT);
        INSERT INTO line_items (product_id, product_type) VALUES (1, 'DigitalProduct'), (1, 'PhysicalProduct');
    ";
    assert_eq!(
        resolve(&schema, ddl, "Customer", &HintPolicy::new()),
        expected(json!({"invoices": {"line_items": {"product": {
            "DigitalProduct": "category",
            "PhysicalProduct": "distributor"
        }}}}))
    );
}

#[test]
fn test_cyclic_schema_terminates_with_circular_leaf() {
    let schema = Schema::new(vec![
        ModelDef::new("Project", "projects")
            .belongs_to("participant", "Participant")
            .belongs_to("group", "Group"),
        ModelDef::new("Participant", "participants")
            .has_many("projects", "Project")
            .belongs_to("group", "Group"),
        ModelDef::new("Group", "groups").has_many("participants", "Participant"),
    ])
    .expect("schema");
    assert_eq!(
        resolve(&schema, "", "Project", &HintPolicy::new()),
        expected(json!([
            {"participant": "group"},
            {"group": {"participants": {"projects": {"group": "participants"}}}}
        ]))
    );
}

#[test]
fn test_hints_deny_target_models() {
    let schema = campaigns_schema();
    let hints = HintPolicy::new()
        .with(BasicHint::deny().to_models(["Campaign"]))
        .with(BasicHint::deny().to_models(["Partner"]));
    let resolved = resolve(&schema, CAMPAIGNS_DDL, "Campaign", &hints);
    assert_eq!(
        resolved,
        expected(json!([
            "vertical",
            {"reference_object": {"Agent": "listings", "Listing": null}},
            {"products": "order"}
        ]))
    );
}

#[test]
fn test_denied_model_never_appears_in_resolution() {
    let schema = campaigns_schema();
    let hints = HintPolicy::new().with(BasicHint::deny().to_models(["Partner"]));
    let resolved = resolve(&schema, CAMPAIGNS_DDL, "Campaign", &hints).expect("descriptor");
    let mut reached = Vec::new();
    reached_models(&schema, "Campaign", &resolved, &mut reached);
    assert!(!reached.is_empty());
    assert!(!reached.iter().any(|model| model == "Partner"));
}

#[test]
fn test_unknown_observed_type_is_a_schema_error() {
    let schema = pictures_schema();
    let store = SqliteStore::open_in_memory().expect("store");
    store
        .execute_batch(
            "CREATE TABLE pictures (id INTEGER PRIMARY KEY, imageable_id INTEGER, imageable_type TEXT);
             INSERT INTO pictures (imageable_id, imageable_type) VALUES (1, 'Spaceship');",
        )
        .expect("ddl");
    let introspector = Introspector::new(&schema, &store);
    let err = identify_associations(&introspector, "Picture", &HintPolicy::new()).unwrap_err();
    assert!(matches!(err, SyncError::Schema(_)));
}

#[test]
fn test_random_schemas_terminate_without_backtracking() {
    for seed in 0..16u64 {
        let schema = generate_schema(SchemaShape::Random { relationships: 2 }, 5, seed)
            .expect("schema");
        let store = SqliteStore::open_in_memory().expect("store");
        let introspector = Introspector::new(&schema, &store);
        for model in schema.models() {
            let resolved = identify_associations(&introspector, &model.name, &HintPolicy::new())
                .expect("resolve");
            if let Some(descriptor) = resolved {
                assert_no_immediate_backtrack(&schema, &model.name, None, &descriptor);
            }
        }
    }
}

#[test]
fn test_chain_and_star_schemas_resolve_linearly() {
    let chain = generate_schema(SchemaShape::Chain, 4, 0).expect("chain");
    let store = SqliteStore::open_in_memory().expect("store");
    let introspector = Introspector::new(&chain, &store);
    let resolved =
        identify_associations(&introspector, &model_name(0), &HintPolicy::new()).expect("resolve");
    assert_eq!(resolved, expected(json!({"model1": {"model2": "model3"}})));

    let star = generate_schema(SchemaShape::Star, 3, 0).expect("star");
    let introspector = Introspector::new(&star, &store);
    let resolved =
        identify_associations(&introspector, &model_name(0), &HintPolicy::new()).expect("resolve");
    assert_eq!(resolved, expected(json!(["model1s", "model2s"])));
}

#[test]
fn test_self_referential_model_terminates() {
    let schema = Schema::new(vec![
        ModelDef::new("Category", "categories")
            .belongs_to("parent", "Category")
            .has_many("children", "Category"),
    ])
    .expect("schema");
    // `children` sits beside `parent` pointing back at the same model, so it is pruned.
    let resolved = resolve(&schema, "", "Category", &HintPolicy::new());
    assert_eq!(resolved, Some(Descriptor::name("parent")));
}
