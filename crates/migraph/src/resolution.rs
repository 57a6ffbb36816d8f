#![forbid(unsafe_code)]

//! Dependency-name resolution.
//!
//! [`DependencyResolver`] turns an element's source text into the names it
//! depends on. [`NameIndex`] maps bare names onto node keys when the graph is
//! keyed by qualified names.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::Regex;

/// Approximates the reference graph of one element without a full resolver.
pub trait DependencyResolver: Send + Sync {
    /// `imports` are the import paths visible to the element's file.
    fn dependencies(&self, content: &str, imports: &[String]) -> BTreeSet<String>;
}

/// Textual scan: instantiations, call receivers and non-wildcard imports.
///
/// Deliberately over-approximates; shadowed locals and common type names show
/// up as false positives.
#[derive(Debug, Clone)]
pub struct TextualResolver {
    instantiation: Regex,
    call_receiver: Regex,
}

impl Default for TextualResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TextualResolver {
    #[allow(clippy::missing_panics_doc)]
    pub fn new() -> Self {
        Self {
            instantiation: Regex::new(r"\bnew\s+(\w+)").expect("valid instantiation pattern"),
            call_receiver: Regex::new(r"(\w+)\.(\w+)\(").expect("valid call pattern"),
        }
    }

    /// Names the content references directly, ignoring imports.
    pub fn body_references(&self, content: &str) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for caps in self.instantiation.captures_iter(content) {
            names.insert(caps[1].to_string());
        }
        for caps in self.call_receiver.captures_iter(content) {
            names.insert(caps[1].to_string());
        }
        names
    }
}

impl DependencyResolver for TextualResolver {
    fn dependencies(&self, content: &str, imports: &[String]) -> BTreeSet<String> {
        let mut names = self.body_references(content);
        names.extend(imports.iter().filter_map(|import| import_simple_name(import)));
        names
    }
}

/// Simple name of a non-wildcard import path (`java.util.List` -> `List`).
pub fn import_simple_name(import: &str) -> Option<String> {
    let trimmed = import.trim();
    if trimmed.is_empty() || trimmed.ends_with('*') {
        return None;
    }
    let name = trimmed.rsplit('.').next().unwrap_or(trimmed);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Where a node lives; used to rank candidates for a bare name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLocation {
    pub key: String,
    pub file_path: String,
    pub enclosing_type: Option<String>,
}

/// Bare name -> candidate node keys.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    by_name: BTreeMap<String, Vec<NodeLocation>>,
}

impl NameIndex {
    pub fn insert(&mut self, name: &str, location: NodeLocation) {
        let entry = self.by_name.entry(name.to_string()).or_default();
        if !entry.iter().any(|existing| existing.key == location.key) {
            entry.push(location);
            entry.sort_by(|a, b| a.key.cmp(&b.key));
        }
    }

    pub fn remove_key(&mut self, key: &str) {
        for candidates in self.by_name.values_mut() {
            candidates.retain(|c| c.key != key);
        }
        self.by_name.retain(|_, candidates| !candidates.is_empty());
    }

    pub fn candidates(&self, name: &str) -> &[NodeLocation] {
        self.by_name.get(name).map_or(&[][..], Vec::as_slice)
    }

    /// Most specific candidate for `name` as seen from `from`.
    ///
    /// Same file and enclosing type first, then same file, then same
    /// directory, then the first candidate by key order.
    pub fn resolve(&self, name: &str, from: Option<&NodeLocation>) -> Option<&str> {
        let candidates = self.candidates(name);
        let first = candidates.first()?;
        let Some(from) = from else {
            return Some(first.key.as_str());
        };

        let from_dir = Path::new(&from.file_path).parent();
        let mut same_file = None;
        let mut same_dir = None;

        for candidate in candidates {
            if candidate.file_path == from.file_path {
                let enclosing_matches = candidate.enclosing_type.is_some()
                    && (candidate.enclosing_type == from.enclosing_type
                        || candidate.enclosing_type.as_deref() == Some(last_segment(&from.key)));
                if enclosing_matches {
                    return Some(candidate.key.as_str());
                }
                same_file.get_or_insert(candidate);
            } else if from_dir.is_some() && Path::new(&candidate.file_path).parent() == from_dir {
                same_dir.get_or_insert(candidate);
            }
        }

        Some(same_file.or(same_dir).unwrap_or(first).key.as_str())
    }
}

fn last_segment(key: &str) -> &str {
    key.rsplit("::").next().unwrap_or(key)
}
