//! Integration tests for the dependency graph

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use migraph::extraction::{self, Extractor};
use migraph::types::{ElementKind, KeyStrategy, StructuralElement};
use migraph::{DependencyGraph, config};
use tempfile::TempDir;

fn element(name: &str, deps: &[&str]) -> StructuralElement {
    StructuralElement {
        kind: ElementKind::Type,
        name: name.to_string(),
        content: format!("class {name} {{}}"),
        source_file: format!("src/{name}.java"),
        start_line: 1,
        end_line: 1,
        dependency_names: deps.iter().map(|d| (*d).to_string()).collect(),
        enclosing_type: None,
        modifiers: vec!["public".to_string()],
        annotations: Vec::new(),
        signature: None,
    }
}

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn copy_dir(src: &Path, dst: &Path) {
    fs::create_dir_all(dst).unwrap();
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let dest = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &dest);
        } else {
            fs::copy(entry.path(), dest).unwrap();
        }
    }
}

fn shop_graph(strategy: KeyStrategy) -> (TempDir, DependencyGraph) {
    let temp_dir = TempDir::new().unwrap();
    copy_dir(Path::new("tests/fixtures/java-shop"), temp_dir.path());
    let cfg = config::create_default_config(temp_dir.path());
    let report = extraction::extract_project(temp_dir.path(), &cfg, &Extractor::new(), None);
    let graph = DependencyGraph::build_with(&report.elements, strategy);
    (temp_dir, graph)
}

#[test]
fn test_three_cycle_with_isolated_node() {
    let graph = DependencyGraph::build(&[
        element("A", &["B"]),
        element("B", &["C"]),
        element("C", &["A"]),
        element("D", &[]),
    ]);

    let cycles = graph.find_cycles();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0], vec!["A", "B", "C"]);

    assert_eq!(graph.migration_order(), vec!["D"]);
    assert_eq!(graph.unorderable_nodes(), vec!["A", "B", "C"]);

    let metrics = graph.complexity_metrics();
    assert_eq!(metrics.total_nodes, 4);
    assert_eq!(metrics.root_nodes, 1);
    assert_eq!(metrics.leaf_nodes, 1);
    assert_eq!(metrics.circular_dependencies, 1);
    assert_eq!(metrics.max_dependencies, 1);
    assert!((metrics.avg_dependencies - 0.75).abs() < f64::EPSILON);
    assert_eq!(metrics.node_types.get(&ElementKind::Type), Some(&4));
}

#[test]
fn test_dangling_dependency_is_kept_forward_only() {
    let graph = DependencyGraph::build(&[element("M", &["X"])]);

    let m = graph.node("M").unwrap();
    assert!(m.dependencies.contains("X"));
    assert!(graph.node("X").is_none());
    assert_eq!(graph.dependency_map()["M"], names(&["X"]));
    assert!(graph.reverse_dependency_map().get("X").is_none());

    assert_eq!(graph.neighborhood("M", 1), names(&["M"]));
    assert_eq!(graph.migration_order(), vec!["M"]);
}

#[test]
fn test_self_loop_is_a_one_node_cycle() {
    let graph = DependencyGraph::build(&[element("Node", &["Node"]), element("Other", &["Node"])]);

    let node = graph.node("Node").unwrap();
    assert_eq!(node.dependents, names(&["Node", "Other"]));
    assert_eq!(graph.find_cycles(), vec![vec!["Node".to_string()]]);
    assert!(graph.migration_order().is_empty());
    assert_eq!(graph.unorderable_nodes(), vec!["Node", "Other"]);
}

#[test]
fn test_neighborhood_follows_both_directions() {
    let graph = DependencyGraph::build(&[
        element("Controller", &["Service"]),
        element("Service", &["Repository"]),
        element("Repository", &["Entity"]),
        element("Entity", &[]),
        element("Job", &["Service"]),
    ]);

    assert_eq!(graph.neighborhood("Service", 0), names(&["Service"]));
    assert_eq!(
        graph.neighborhood("Service", 1),
        names(&["Controller", "Job", "Repository", "Service"])
    );
    assert_eq!(
        graph.neighborhood("Service", 2),
        names(&["Controller", "Entity", "Job", "Repository", "Service"])
    );
    assert!(graph.neighborhood("Missing", 3).is_empty());
}

#[test]
fn test_unknown_names_give_empty_results() {
    let graph = DependencyGraph::build(&[element("A", &[])]);
    assert!(graph.node("Nope").is_none());
    assert!(graph.dependency_chain("Nope").is_empty());
    assert!(graph.context_for_migration("Nope").is_none());
}

#[test]
fn test_shop_graph_edges_and_order() {
    let (_temp, graph) = shop_graph(KeyStrategy::Name);

    let order = graph.node("Order").unwrap();
    assert!(order.dependencies.contains("OrderLine"));
    for dependent in ["OrderRepository", "OrderService", "placeOrder", "AuditLog", "write"] {
        assert!(order.dependents.contains(dependent), "missing dependent {dependent}");
    }
    assert!(graph.node("OrderLine").unwrap().dependents.contains("Order"));

    assert!(graph.find_cycles().is_empty());
    assert!(graph.unorderable_nodes().is_empty());

    let migration = graph.migration_order();
    assert_eq!(migration.len(), graph.len());
    let position = |name: &str| migration.iter().position(|n| n == name).unwrap();
    assert!(position("OrderLine") < position("Order"));
    assert!(position("Order") < position("OrderRepository"));
    assert!(position("OrderRepository") < position("OrderService"));
    assert!(position("AuditLog") < position("OrderService"));

    let metrics = graph.complexity_metrics();
    assert_eq!(metrics.node_types.get(&ElementKind::Constant), Some(&3));
    assert_eq!(metrics.node_types.get(&ElementKind::Interface), Some(&1));
    assert_eq!(metrics.node_types.get(&ElementKind::Enumeration), Some(&1));
}

#[test]
fn test_shop_graph_with_qualified_keys() {
    let (_temp, graph) = shop_graph(KeyStrategy::Qualified);

    assert!(graph.nodes().contains_key("model/Order.java::Order"));
    assert!(graph.nodes().contains_key("model/Order.java::Order::addItem"));
    assert!(graph.nodes().contains_key("service/OrderService.java::AuditLog::write"));

    let service = graph.node("OrderService").unwrap();
    assert_eq!(service.file_path, "service/OrderService.java");
    assert!(service.dependencies.contains("model/Order.java::Order"));
    assert!(service.dependencies.contains("repo/OrderRepository.java::OrderRepository"));

    let order = graph.node("model/Order.java::Order").unwrap();
    assert!(order.dependents.contains("service/OrderService.java::OrderService"));
    assert!(
        graph
            .neighborhood("Order", 1)
            .contains("model/OrderLine.java::OrderLine")
    );
}

#[test]
fn test_replace_file_updates_incrementally() {
    let (temp, mut graph) = shop_graph(KeyStrategy::Name);
    let before = graph.len();

    let path = temp.path().join("model/OrderLine.java");
    let updated = "package com.acme.shop.model;\n\npublic class OrderLine {\n    public Money subtotal() {\n        return Money.of(1);\n    }\n}\n";
    fs::write(&path, updated).unwrap();

    let elements = Extractor::new().extract_file("model/OrderLine.java", updated);
    graph.replace_file("model/OrderLine.java", &elements);

    assert_eq!(graph.len(), before);
    let line = graph.node("OrderLine").unwrap();
    assert!(line.dependents.contains("Order"));
    assert!(graph.node("subtotal").unwrap().dependencies.contains("Money"));

    graph.replace_file("model/OrderLine.java", &[]);
    assert!(graph.node("OrderLine").is_none());
    assert!(graph.node("Order").unwrap().dependencies.contains("OrderLine"));
    assert!(graph.reverse_dependency_map().get("OrderLine").is_none());
}
