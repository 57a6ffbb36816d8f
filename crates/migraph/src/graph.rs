#![forbid(unsafe_code)]

//! Dependency graph over structural elements.
//!
//! Nodes are keyed by element name (or by `file::Enclosing::name` with
//! [`KeyStrategy::Qualified`]). Forward edges may dangle; reverse edges only
//! exist between resolved nodes. All maps are ordered, so every traversal
//! breaks ties by key order and results are reproducible across a
//! knowledge-base round trip.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::resolution::{NameIndex, NodeLocation};
use crate::types::{
    ComplexityMetrics, DependencyNode, ElementKind, KeyStrategy, NodeSummary, StructuralElement,
};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub(crate) nodes: BTreeMap<String, DependencyNode>,
    pub(crate) summaries: BTreeMap<String, NodeSummary>,
    pub(crate) dependency_map: BTreeMap<String, BTreeSet<String>>,
    pub(crate) reverse_dependency_map: BTreeMap<String, BTreeSet<String>>,
    pub(crate) key_strategy: KeyStrategy,
    pub(crate) names: NameIndex,
}

impl DependencyGraph {
    pub fn new(key_strategy: KeyStrategy) -> Self {
        Self {
            key_strategy,
            ..Self::default()
        }
    }

    /// Build a name-keyed graph. Later elements overwrite earlier ones with
    /// the same name.
    pub fn build(elements: &[StructuralElement]) -> Self {
        Self::build_with(elements, KeyStrategy::Name)
    }

    pub fn build_with(elements: &[StructuralElement], key_strategy: KeyStrategy) -> Self {
        let mut graph = Self::new(key_strategy);
        graph.insert_elements(elements);
        graph.rebuild_reverse_edges();
        tracing::info!(
            nodes = graph.nodes.len(),
            elements = elements.len(),
            "built dependency graph with {} nodes",
            graph.nodes.len()
        );
        graph
    }

    /// Node pass: one node per element, dependents left for the second pass.
    fn insert_elements(&mut self, elements: &[StructuralElement]) {
        let keyed: Vec<(String, &StructuralElement)> = elements
            .iter()
            .map(|element| (self.key_for(element), element))
            .collect();

        if self.key_strategy == KeyStrategy::Qualified {
            for (key, element) in &keyed {
                self.names.insert(&element.name, location_of(key, element));
            }
        }

        for (key, element) in keyed {
            let dependencies = match self.key_strategy {
                KeyStrategy::Name => element.dependency_names.clone(),
                KeyStrategy::Qualified => {
                    let from = location_of(&key, element);
                    element
                        .dependency_names
                        .iter()
                        .map(|name| {
                            self.names
                                .resolve(name, Some(&from))
                                .map_or_else(|| name.clone(), str::to_string)
                        })
                        .collect()
                }
            };

            let node = DependencyNode::from_element(element, dependencies);
            if let Some(previous) = self.nodes.insert(key.clone(), node) {
                tracing::debug!(
                    key = %key,
                    previous_file = %previous.file_path,
                    file = %element.source_file,
                    "duplicate element name, keeping the later one"
                );
            }
        }

        for (key, node) in &self.nodes {
            self.dependency_map
                .insert(key.clone(), node.dependencies.clone());
        }
    }

    fn key_for(&self, element: &StructuralElement) -> String {
        match self.key_strategy {
            KeyStrategy::Name => element.name.clone(),
            KeyStrategy::Qualified => element.qualified_key(),
        }
    }

    /// Reverse-edge pass. Recomputes every `dependents` set from the forward
    /// edges; dangling names produce no reverse entry.
    pub fn rebuild_reverse_edges(&mut self) {
        let mut reverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (key, node) in &self.nodes {
            for dep in &node.dependencies {
                if self.nodes.contains_key(dep) {
                    reverse.entry(dep.clone()).or_default().insert(key.clone());
                }
            }
        }

        for (key, node) in &mut self.nodes {
            node.dependents = reverse.get(key).cloned().unwrap_or_default();
        }
        self.reverse_dependency_map = reverse;
    }

    /// Replace everything extracted from `file_path` with `elements`.
    ///
    /// Only the reverse-edge pass is re-run. Dependencies of surviving nodes
    /// on removed names are kept as dangling edges.
    pub fn replace_file(&mut self, file_path: &str, elements: &[StructuralElement]) {
        let removed: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.file_path == file_path)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &removed {
            self.nodes.remove(key);
            self.dependency_map.remove(key);
            self.names.remove_key(key);
        }

        self.insert_elements(elements);
        if self.key_strategy == KeyStrategy::Qualified {
            self.relink_dangling();
        }
        self.rebuild_reverse_edges();

        tracing::debug!(
            file = file_path,
            removed = removed.len(),
            inserted = elements.len(),
            "replaced file in dependency graph"
        );
    }

    /// Point bare dangling names at nodes that now match them.
    fn relink_dangling(&mut self) {
        let mut updates = Vec::new();
        for (key, node) in &self.nodes {
            let from = NodeLocation {
                key: key.clone(),
                file_path: node.file_path.clone(),
                enclosing_type: node.metadata.enclosing_type.clone(),
            };
            let relinked: BTreeSet<String> = node
                .dependencies
                .iter()
                .map(|dep| {
                    if self.nodes.contains_key(dep) {
                        dep.clone()
                    } else {
                        self.names
                            .resolve(dep, Some(&from))
                            .map_or_else(|| dep.clone(), str::to_string)
                    }
                })
                .collect();
            if relinked != node.dependencies {
                updates.push((key.clone(), relinked));
            }
        }

        for (key, dependencies) in updates {
            self.dependency_map.insert(key.clone(), dependencies.clone());
            if let Some(node) = self.nodes.get_mut(&key) {
                node.dependencies = dependencies;
            }
        }
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.key_strategy
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &BTreeMap<String, DependencyNode> {
        &self.nodes
    }

    pub fn summaries(&self) -> &BTreeMap<String, NodeSummary> {
        &self.summaries
    }

    pub fn dependency_map(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.dependency_map
    }

    pub fn reverse_dependency_map(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.reverse_dependency_map
    }

    /// Node key for `name`: an exact key, or with qualified keys the most
    /// likely candidate for a bare name.
    pub fn resolve_key(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.nodes.get_key_value(name) {
            return Some(key.as_str());
        }
        match self.key_strategy {
            KeyStrategy::Name => None,
            KeyStrategy::Qualified => self.names.resolve(name, None),
        }
    }

    pub fn node(&self, name: &str) -> Option<&DependencyNode> {
        self.resolve_key(name).and_then(|key| self.nodes.get(key))
    }

    pub fn summary(&self, name: &str) -> Option<&NodeSummary> {
        self.summaries.get(name)
    }

    /// Attach or overwrite the summary for `summary.name`. The name does not
    /// have to match a node.
    pub fn add_summary(&mut self, summary: NodeSummary) {
        self.summaries.insert(summary.name.clone(), summary);
    }

    fn resolved_dependencies<'a>(&'a self, key: &str) -> Vec<&'a str> {
        self.nodes.get(key).map_or_else(Vec::new, |node| {
            node.dependencies
                .iter()
                .filter_map(|dep| self.nodes.get_key_value(dep).map(|(k, _)| k.as_str()))
                .collect()
        })
    }

    /// Every cycle found by a depth-first walk from each unvisited node.
    ///
    /// A cycle is reported as the path slice from the first occurrence of the
    /// re-entered node through the current node. Rotations of the same cycle
    /// reached from different paths are not merged.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut cycles: Vec<Vec<String>> = Vec::new();

        for root in self.nodes.keys() {
            if !visited.insert(root.as_str()) {
                continue;
            }

            let mut path: Vec<&str> = vec![root.as_str()];
            let mut on_path: HashSet<&str> = HashSet::from([root.as_str()]);
            let mut frames = vec![self.resolved_dependencies(root).into_iter()];

            while let Some(frame) = frames.last_mut() {
                match frame.next() {
                    Some(next) => {
                        if on_path.contains(next) {
                            let start = path.iter().position(|n| *n == next).unwrap_or(0);
                            cycles.push(path[start..].iter().map(|n| (*n).to_string()).collect());
                        } else if visited.insert(next) {
                            path.push(next);
                            on_path.insert(next);
                            frames.push(self.resolved_dependencies(next).into_iter());
                        }
                    }
                    None => {
                        frames.pop();
                        if let Some(done) = path.pop() {
                            on_path.remove(done);
                        }
                    }
                }
            }
        }

        cycles
    }

    /// Names within `depth` forward or reverse hops of `name`, including it.
    /// Unknown names give an empty set.
    pub fn neighborhood(&self, name: &str, depth: usize) -> BTreeSet<String> {
        let mut neighborhood = BTreeSet::new();
        let Some(origin) = self.resolve_key(name) else {
            return neighborhood;
        };

        let mut visited: HashSet<&str> = HashSet::from([origin]);
        let mut queue = VecDeque::from([(origin, 0usize)]);

        while let Some((current, current_depth)) = queue.pop_front() {
            neighborhood.insert(current.to_string());
            if current_depth >= depth {
                continue;
            }

            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for next in node.dependencies.iter().chain(node.dependents.iter()) {
                if let Some((key, _)) = self.nodes.get_key_value(next)
                    && visited.insert(key.as_str())
                {
                    queue.push_back((key.as_str(), current_depth + 1));
                }
            }
        }

        neighborhood
    }

    /// Dependency-first order of the resolved nodes (Kahn's algorithm).
    ///
    /// A node is emitted once all of its resolved dependencies have been.
    /// Members of a cycle, and anything depending on one, are left out; see
    /// [`Self::unorderable_nodes`].
    pub fn migration_order(&self) -> Vec<String> {
        let mut pending: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .map(|key| (key.as_str(), self.resolved_dependencies(key).len()))
            .collect();

        let mut queue: VecDeque<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(key, _)| *key)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(current) = queue.pop_front() {
            order.push(current.to_string());
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for dependent in &node.dependents {
                if let Some(count) = pending.get_mut(dependent.as_str()) {
                    if *count == 0 {
                        continue;
                    }
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        order
    }

    /// Resolved nodes that [`Self::migration_order`] cannot place.
    pub fn unorderable_nodes(&self) -> Vec<String> {
        let ordered: HashSet<String> = self.migration_order().into_iter().collect();
        self.nodes
            .keys()
            .filter(|key| !ordered.contains(*key))
            .cloned()
            .collect()
    }

    /// The migration order, for a node that exists; empty otherwise.
    pub fn dependency_chain(&self, name: &str) -> Vec<String> {
        if self.resolve_key(name).is_none() {
            return Vec::new();
        }
        self.migration_order()
    }

    pub fn complexity_metrics(&self) -> ComplexityMetrics {
        let mut node_types: BTreeMap<ElementKind, usize> = BTreeMap::new();
        let mut total_deps = 0usize;
        let mut max_dependencies = 0usize;

        for node in self.nodes.values() {
            *node_types.entry(node.kind).or_default() += 1;
            total_deps += node.dependencies.len();
            max_dependencies = max_dependencies.max(node.dependencies.len());
        }

        #[allow(clippy::cast_precision_loss)]
        let avg_dependencies = if self.nodes.is_empty() {
            0.0
        } else {
            total_deps as f64 / self.nodes.len() as f64
        };

        ComplexityMetrics {
            total_nodes: self.nodes.len(),
            node_types,
            avg_dependencies,
            max_dependencies,
            circular_dependencies: self.find_cycles().len(),
            root_nodes: self
                .nodes
                .values()
                .filter(|n| n.dependencies.is_empty())
                .count(),
            leaf_nodes: self
                .nodes
                .values()
                .filter(|n| n.dependents.is_empty())
                .count(),
        }
    }

    /// Log roots, leaves and the first few cycles.
    pub fn log_analysis(&self) {
        let roots: Vec<&str> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.dependencies.is_empty())
            .map(|(k, _)| k.as_str())
            .collect();
        let leaves: Vec<&str> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.dependents.is_empty())
            .map(|(k, _)| k.as_str())
            .collect();
        tracing::info!(count = roots.len(), "root nodes: {roots:?}");
        tracing::info!(count = leaves.len(), "leaf nodes: {leaves:?}");

        let cycles = self.find_cycles();
        if !cycles.is_empty() {
            tracing::info!(count = cycles.len(), "found circular dependencies");
            for cycle in cycles.iter().take(3) {
                tracing::info!("cycle: {}", cycle.join(" -> "));
            }
        }
    }
}

fn location_of(key: &str, element: &StructuralElement) -> NodeLocation {
    NodeLocation {
        key: key.to_string(),
        file_path: element.source_file.clone(),
        enclosing_type: element.enclosing_type.clone(),
    }
}
