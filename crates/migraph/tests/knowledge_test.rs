//! Integration tests for knowledge-base export and import

use std::fs;

use migraph::knowledge::{self, KnowledgeBase};
use migraph::types::{ElementKind, KeyStrategy, NodeSummary, StructuralElement};
use migraph::{DependencyGraph, Error};
use tempfile::TempDir;

fn element(name: &str, file: &str, deps: &[&str]) -> StructuralElement {
    StructuralElement {
        kind: ElementKind::Type,
        name: name.to_string(),
        content: format!("class {name} {{}}"),
        source_file: file.to_string(),
        start_line: 1,
        end_line: 1,
        dependency_names: deps.iter().map(|d| (*d).to_string()).collect(),
        enclosing_type: None,
        modifiers: Vec::new(),
        annotations: Vec::new(),
        signature: None,
    }
}

fn sample_graph() -> DependencyGraph {
    let mut graph = DependencyGraph::build(&[
        element("Invoice", "billing/Invoice.java", &["Customer", "TaxTable"]),
        element("Customer", "crm/Customer.java", &[]),
        element("Loop", "misc/Loop.java", &["Loop"]),
    ]);
    graph.add_summary(NodeSummary {
        name: "Invoice".to_string(),
        kind: Some("type".to_string()),
        file_path: Some("billing/Invoice.java".to_string()),
        purpose: "Bills a customer".to_string(),
        inputs: vec!["Customer".to_string()],
        outputs: vec!["PDF".to_string()],
        business_rules: vec!["VAT applies".to_string()],
        dependencies: vec!["Customer".to_string()],
        key_methods: vec!["issue".to_string()],
        complexity_score: 3.0,
    });
    graph
}

#[test]
fn test_export_import_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested/dir/knowledge_base.json");
    let graph = sample_graph();

    knowledge::export(&graph, &path).unwrap();
    assert!(path.exists());

    let restored = knowledge::import(&path).unwrap();
    assert_eq!(restored.nodes(), graph.nodes());
    assert_eq!(restored.summaries(), graph.summaries());
    assert_eq!(restored.dependency_map(), graph.dependency_map());
    assert_eq!(restored.reverse_dependency_map(), graph.reverse_dependency_map());
    assert_eq!(restored.key_strategy(), KeyStrategy::Name);

    // Dangling edge survives, derived queries agree.
    assert!(restored.node("Invoice").unwrap().dependencies.contains("TaxTable"));
    assert_eq!(restored.migration_order(), graph.migration_order());
    assert_eq!(restored.find_cycles(), vec![vec!["Loop".to_string()]]);
}

#[test]
fn test_export_leaves_no_temporary_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("knowledge_base.json");
    sample_graph().export_knowledge_base(&path).unwrap();
    sample_graph().export_knowledge_base(&path).unwrap();

    let entries: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec!["knowledge_base.json"]);
}

#[test]
fn test_document_layout() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kb.json");
    knowledge::export(&sample_graph(), &path).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    for field in ["nodes", "summaries", "dependency_map", "reverse_dependency_map"] {
        assert!(value.get(field).is_some(), "missing {field}");
    }
    assert_eq!(value["summaries"]["Invoice"]["type"], "type");
    assert_eq!(value["nodes"]["Customer"]["dependents"][0], "Invoice");
    assert!(value["reverse_dependency_map"].get("TaxTable").is_none());
}

#[test]
fn test_qualified_graph_round_trip_keeps_resolution() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kb.json");
    let graph = DependencyGraph::build_with(
        &[
            element("Order", "a/Order.java", &[]),
            element("Order", "b/Order.java", &[]),
            element("Cart", "b/Cart.java", &["Order"]),
        ],
        KeyStrategy::Qualified,
    );
    knowledge::export(&graph, &path).unwrap();

    let restored = DependencyGraph::import_knowledge_base(&path).unwrap();
    assert_eq!(restored.key_strategy(), KeyStrategy::Qualified);
    assert_eq!(restored.len(), 3);
    assert_eq!(restored.node("Cart").unwrap().file_path, "b/Cart.java");
    assert!(
        restored.nodes()["b/Order.java::Order"]
            .dependents
            .contains("b/Cart.java::Cart")
    );
}

#[test]
fn test_import_missing_file_is_io_error() {
    let temp = TempDir::new().unwrap();
    let result = knowledge::import(&temp.path().join("absent.json"));
    assert!(matches!(result, Err(Error::Io { .. })));
}

#[test]
fn test_import_malformed_json_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kb.json");
    fs::write(&path, "{ \"nodes\": [").unwrap();
    assert!(matches!(knowledge::import(&path), Err(Error::Json { .. })));
}

#[test]
fn test_import_inconsistent_maps_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kb.json");

    let mut snapshot = KnowledgeBase::from_graph(&sample_graph());
    snapshot
        .reverse_dependency_map
        .insert("Ghost".to_string(), ["Invoice".to_string()].into_iter().collect());
    fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();
    assert!(matches!(
        knowledge::import(&path),
        Err(Error::InvalidKnowledgeBase(_))
    ));

    let mut snapshot = KnowledgeBase::from_graph(&sample_graph());
    snapshot
        .dependency_map
        .insert("Customer".to_string(), ["Invoice".to_string()].into_iter().collect());
    assert!(matches!(
        snapshot.into_graph(),
        Err(Error::InvalidKnowledgeBase(_))
    ));
}

#[test]
fn test_export_rejects_non_finite_scores() {
    for score in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kb.json");
        let mut graph = sample_graph();
        graph.add_summary(NodeSummary {
            name: "Customer".to_string(),
            complexity_score: score,
            ..NodeSummary::default()
        });

        let result = knowledge::export(&graph, &path);
        assert!(
            matches!(result, Err(Error::InvalidKnowledgeBase(_))),
            "score {score} was accepted"
        );
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}

#[test]
fn test_fractional_scores_survive_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kb.json");
    let mut graph = sample_graph();
    for (name, score) in [("Customer", 0.1 + 0.2), ("Loop", 1.0 / 3.0), ("Ghost", 2.5e-308)] {
        graph.add_summary(NodeSummary {
            name: name.to_string(),
            complexity_score: score,
            ..NodeSummary::default()
        });
    }

    knowledge::export(&graph, &path).unwrap();
    let restored = knowledge::import(&path).unwrap();
    assert_eq!(restored.summaries(), graph.summaries());
}

#[test]
fn test_import_rejects_dropped_reverse_map() {
    let mut snapshot = KnowledgeBase::from_graph(&sample_graph());
    snapshot.reverse_dependency_map.clear();
    assert!(matches!(
        snapshot.into_graph(),
        Err(Error::InvalidKnowledgeBase(_))
    ));

    let mut snapshot = KnowledgeBase::from_graph(&sample_graph());
    snapshot.dependency_map.remove("Invoice");
    assert!(matches!(
        snapshot.into_graph(),
        Err(Error::InvalidKnowledgeBase(_))
    ));
}

#[test]
fn test_import_rejects_one_sided_edges() {
    // Customer claims Loop as a dependent, consistently in both tables, but
    // Loop does not depend on Customer.
    let mut snapshot = KnowledgeBase::from_graph(&sample_graph());
    let customer = snapshot.nodes.get_mut("Customer").unwrap();
    customer.dependents.insert("Loop".to_string());
    let dependents = customer.dependents.clone();
    snapshot
        .reverse_dependency_map
        .insert("Customer".to_string(), dependents);
    assert!(matches!(
        snapshot.validate(),
        Err(Error::InvalidKnowledgeBase(_))
    ));

    // Invoice depends on Customer, but Customer no longer lists it.
    let mut snapshot = KnowledgeBase::from_graph(&sample_graph());
    snapshot.nodes.get_mut("Customer").unwrap().dependents.clear();
    snapshot.reverse_dependency_map.remove("Customer");
    assert!(matches!(
        snapshot.validate(),
        Err(Error::InvalidKnowledgeBase(_))
    ));
}

#[test]
fn test_failed_rename_removes_temporary_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kb.json");
    fs::create_dir_all(path.join("occupied")).unwrap();

    let result = knowledge::export(&sample_graph(), &path);
    assert!(matches!(result, Err(Error::Io { .. })));

    let entries: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec!["kb.json"]);
    assert!(path.join("occupied").is_dir());
}
