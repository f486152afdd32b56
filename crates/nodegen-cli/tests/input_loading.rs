use std::fs;

use nodegen::{load_input, render_inspection, render_summary, PlanDocument};
use nodegen_core::{Category, NodegenConfig, Pipeline};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const MIXED_INPUT: &str = r#"{
    "specs": [
        {"id": "tree.Tree", "kind": "NO_IMPL",
         "properties": [
            {"id": "kind", "type": {"name": "Kind", "shape": "reference", "non_null": true},
             "role": "PROPERTY"}
         ]}
    ],
    "interfaces": [
        {"id": "tree.Binary", "kind": "IMPL", "parents": ["tree.Tree"],
         "methods": [
            {"name": "getRight", "return_type": {"name": "Expression", "shape": "reference"},
             "markers": ["@Child", "@Ordering.After(\"left\")"]},
            {"name": "getLeft", "return_type": {"name": "Expression", "shape": "reference"},
             "markers": ["@Child"]},
            {"name": "compute", "parameter_count": 1,
             "return_type": {"name": "int", "shape": "primitive"},
             "markers": ["@Property"]}
         ]}
    ]
}"#;

#[test]
fn test_load_mixed_document() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nodes.json");
    fs::write(&path, MIXED_INPUT).unwrap();

    let loaded = load_input(&path).unwrap();
    assert_eq!(loaded.specs.len(), 2);

    let binary = &loaded.specs[1];
    let ids: Vec<&str> = binary.properties().iter().map(|p| p.id().as_str()).collect();
    assert_eq!(ids, vec!["left", "right"]);

    // the method taking a parameter is skipped with a warning
    assert_eq!(loaded.diagnostics.by_category(Category::Validation).count(), 1);
}

#[test]
fn test_load_bare_spec_array() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("specs.json");
    fs::write(
        &path,
        r#"[{"id": "tree.Leaf", "kind": "IMPL", "properties": []}]"#,
    )
    .unwrap();

    let loaded = load_input(&path).unwrap();
    assert_eq!(loaded.specs.len(), 1);
    assert!(loaded.diagnostics.is_empty());
}

#[test]
fn test_load_toml_document() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nodes.toml");
    fs::write(
        &path,
        r#"
[[specs]]
id = "tree.Literal"
kind = "IMPL"

[[specs.properties]]
id = "value"
role = "PROPERTY"
type = { name = "Object", shape = "reference" }
"#,
    )
    .unwrap();

    let loaded = load_input(&path).unwrap();
    assert_eq!(loaded.specs.len(), 1);
    assert!(loaded.specs[0].property("value").is_some());
}

#[test]
fn test_missing_input_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");

    let err = load_input(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("absent.json"));
}

#[test]
fn test_plan_document_and_summary() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nodes.json");
    fs::write(&path, MIXED_INPUT).unwrap();

    let loaded = load_input(&path).unwrap();
    let pipeline = Pipeline::from_specs(loaded.specs.clone(), NodegenConfig::default())
        .with_extraction_diagnostics(loaded.diagnostics.clone());
    let report = pipeline.run();

    let summary = render_summary(&report);
    assert!(summary.contains("tree.Binary -> BinaryImpl extends AbstractTree"));
    assert!(summary.ends_with("1 planned, 0 flagged, 0 failed\n"));

    // the skipped method is reported with the spec that declares it
    assert!(summary.contains("    warning"));

    let document = PlanDocument::new(&report);
    let json = serde_json::to_value(&document).unwrap();
    assert_eq!(json["summary"]["planned"], 1);
    assert_eq!(json["plans"][0]["name"], "BinaryImpl");
    assert_eq!(json["reports"][0]["status"], "planned");
    assert_eq!(json["diagnostics"].as_array().unwrap().len(), 0);
    assert_eq!(json["reports"][0]["diagnostics"].as_array().unwrap().len(), 1);

    let (ancestry, merged) = pipeline.inspect("tree.Binary").unwrap();
    let inspection = render_inspection(&ancestry, &merged);
    assert!(inspection.contains("tree.Tree [NO_IMPL]"));
    assert!(inspection.contains("kind: @NonNull Kind from tree.Tree"));
}
