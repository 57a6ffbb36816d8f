#![forbid(unsafe_code)]

//! Knowledge-base snapshots.
//!
//! A knowledge base is one JSON document holding the node table, the summary
//! table and both adjacency maps. Import validates the maps against the node
//! table before a graph is handed back.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::resolution::{NameIndex, NodeLocation};
use crate::types::{DependencyNode, KeyStrategy, NodeSummary};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub nodes: BTreeMap<String, DependencyNode>,
    #[serde(default)]
    pub summaries: BTreeMap<String, NodeSummary>,
    pub dependency_map: BTreeMap<String, BTreeSet<String>>,
    pub reverse_dependency_map: BTreeMap<String, BTreeSet<String>>,
}

impl KnowledgeBase {
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        Self {
            nodes: graph.nodes.clone(),
            summaries: graph.summaries.clone(),
            dependency_map: graph.dependency_map.clone(),
            reverse_dependency_map: graph.reverse_dependency_map.clone(),
        }
    }

    /// Check that both maps agree with the node table.
    pub fn validate(&self) -> Result<()> {
        for (key, deps) in &self.dependency_map {
            let Some(node) = self.nodes.get(key) else {
                return Err(Error::InvalidKnowledgeBase(format!(
                    "dependency_map entry '{key}' has no node"
                )));
            };
            if &node.dependencies != deps {
                return Err(Error::InvalidKnowledgeBase(format!(
                    "dependency_map entry '{key}' disagrees with the node's dependencies"
                )));
            }
        }

        for (key, dependents) in &self.reverse_dependency_map {
            let Some(node) = self.nodes.get(key) else {
                return Err(Error::InvalidKnowledgeBase(format!(
                    "reverse_dependency_map entry '{key}' has no node"
                )));
            };
            if &node.dependents != dependents {
                return Err(Error::InvalidKnowledgeBase(format!(
                    "reverse_dependency_map entry '{key}' disagrees with the node's dependents"
                )));
            }
        }

        for (key, node) in &self.nodes {
            if !node.dependencies.is_empty() && !self.dependency_map.contains_key(key) {
                return Err(Error::InvalidKnowledgeBase(format!(
                    "node '{key}' has dependencies but no dependency_map entry"
                )));
            }
            if !node.dependents.is_empty() && !self.reverse_dependency_map.contains_key(key) {
                return Err(Error::InvalidKnowledgeBase(format!(
                    "node '{key}' has dependents but no reverse_dependency_map entry"
                )));
            }
            for dependent in &node.dependents {
                let links_back = self
                    .nodes
                    .get(dependent)
                    .is_some_and(|source| source.dependencies.contains(key));
                if !links_back {
                    return Err(Error::InvalidKnowledgeBase(format!(
                        "'{dependent}' is listed as a dependent of '{key}' but does not depend on it"
                    )));
                }
            }
            for dep in &node.dependencies {
                if let Some(target) = self.nodes.get(dep)
                    && !target.dependents.contains(key)
                {
                    return Err(Error::InvalidKnowledgeBase(format!(
                        "'{key}' depends on '{dep}' but is missing from its dependents"
                    )));
                }
            }
        }

        validate_summaries(&self.summaries)
    }

    /// Validate and turn the snapshot back into a graph.
    ///
    /// The key strategy is inferred: a table whose keys all equal their
    /// node names is name-keyed.
    pub fn into_graph(self) -> Result<DependencyGraph> {
        self.validate()?;

        let qualified = self.nodes.iter().any(|(key, node)| *key != node.name);
        let key_strategy = if qualified {
            KeyStrategy::Qualified
        } else {
            KeyStrategy::Name
        };

        let mut names = NameIndex::default();
        if qualified {
            for (key, node) in &self.nodes {
                names.insert(
                    &node.name,
                    NodeLocation {
                        key: key.clone(),
                        file_path: node.file_path.clone(),
                        enclosing_type: node.metadata.enclosing_type.clone(),
                    },
                );
            }
        }

        Ok(DependencyGraph {
            nodes: self.nodes,
            summaries: self.summaries,
            dependency_map: self.dependency_map,
            reverse_dependency_map: self.reverse_dependency_map,
            key_strategy,
            names,
        })
    }
}

/// JSON has no encoding for NaN or infinity, so such a score could be
/// written but never read back.
fn validate_summaries(summaries: &BTreeMap<String, NodeSummary>) -> Result<()> {
    match summaries
        .iter()
        .find(|(_, summary)| !summary.complexity_score.is_finite())
    {
        Some((name, summary)) => Err(Error::InvalidKnowledgeBase(format!(
            "summary '{name}' has a non-finite complexity_score ({})",
            summary.complexity_score
        ))),
        None => Ok(()),
    }
}

/// Write `graph` to `path` as pretty-printed JSON.
///
/// The document goes to a sibling temporary file first and is renamed over
/// the target, so readers never see a partial write.
pub fn export(graph: &DependencyGraph, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
    }

    let snapshot = KnowledgeBase::from_graph(graph);
    validate_summaries(&snapshot.summaries)?;
    let raw = serde_json::to_string_pretty(&snapshot).map_err(|err| Error::json(path, err))?;

    let file_name = path
        .file_name()
        .map_or_else(|| "knowledge_base".into(), |n| n.to_string_lossy());
    let temp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&temp, raw).map_err(|err| Error::io(&temp, err))?;
    if let Err(err) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(Error::io(path, err));
    }

    tracing::info!(
        path = %path.display(),
        nodes = snapshot.nodes.len(),
        summaries = snapshot.summaries.len(),
        "exported knowledge base"
    );
    Ok(())
}

/// Read a knowledge base written by [`export`].
pub fn import(path: &Path) -> Result<DependencyGraph> {
    let raw = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
    let snapshot: KnowledgeBase = serde_json::from_str(&raw).map_err(|err| Error::json(path, err))?;
    let graph = snapshot.into_graph()?;

    tracing::info!(
        path = %path.display(),
        nodes = graph.len(),
        "imported knowledge base"
    );
    Ok(graph)
}

impl DependencyGraph {
    pub fn export_knowledge_base(&self, path: &Path) -> Result<()> {
        export(self, path)
    }

    pub fn import_knowledge_base(path: &Path) -> Result<Self> {
        import(path)
    }
}
