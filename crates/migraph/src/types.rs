#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Type,
    Member,
    Interface,
    Enumeration,
    AnnotationType,
    Constant,
}

impl ElementKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Member => "member",
            Self::Interface => "interface",
            Self::Enumeration => "enumeration",
            Self::AnnotationType => "annotation_type",
            Self::Constant => "constant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "type" | "class" => Some(Self::Type),
            "member" | "method" => Some(Self::Member),
            "interface" => Some(Self::Interface),
            "enumeration" | "enum" => Some(Self::Enumeration),
            "annotation_type" | "annotation" => Some(Self::AnnotationType),
            "constant" => Some(Self::Constant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSignature {
    pub return_type: String,
    pub parameters: Vec<Parameter>,
}

/// One parsed unit of source: a type, member, interface, enumeration,
/// annotation type or constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralElement {
    pub kind: ElementKind,
    pub name: String,
    pub content: String,
    pub source_file: String,
    pub start_line: usize,
    pub end_line: usize,
    pub dependency_names: BTreeSet<String>,
    pub enclosing_type: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
    pub signature: Option<MemberSignature>,
}

impl StructuralElement {
    /// Key used when nodes are keyed by `file::Enclosing::name`.
    pub fn qualified_key(&self) -> String {
        match &self.enclosing_type {
            Some(enclosing) => format!("{}::{}::{}", self.source_file, enclosing, self.name),
            None => format!("{}::{}", self.source_file, self.name),
        }
    }

    pub fn has_same_modifiers(&self, other: &Self) -> bool {
        let ours: BTreeSet<&str> = self.modifiers.iter().map(String::as_str).collect();
        let theirs: BTreeSet<&str> = other.modifiers.iter().map(String::as_str).collect();
        ours == theirs
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
    pub return_type: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub enclosing_type: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
}

/// Graph vertex wrapping one structural element.
///
/// `dependencies` may hold names without a node (dangling edges);
/// `dependents` only ever holds keys of existing nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub name: String,
    pub kind: ElementKind,
    pub file_path: String,
    pub content: String,
    pub dependencies: BTreeSet<String>,
    pub dependents: BTreeSet<String>,
    pub metadata: NodeMetadata,
}

impl DependencyNode {
    pub fn from_element(element: &StructuralElement, dependencies: BTreeSet<String>) -> Self {
        let (return_type, parameters) = match &element.signature {
            Some(signature) => (
                Some(signature.return_type.clone()),
                signature.parameters.clone(),
            ),
            None => (None, Vec::new()),
        };

        Self {
            name: element.name.clone(),
            kind: element.kind,
            file_path: element.source_file.clone(),
            content: element.content.clone(),
            dependencies,
            dependents: BTreeSet::new(),
            metadata: NodeMetadata {
                modifiers: element.modifiers.clone(),
                annotations: element.annotations.clone(),
                return_type,
                parameters,
                enclosing_type: element.enclosing_type.clone(),
                start_line: element.start_line,
                end_line: element.end_line,
            },
        }
    }
}

/// Free-form summary supplied by an external collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub business_rules: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub key_methods: Vec<String>,
    #[serde(default)]
    pub complexity_score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    #[default]
    Name,
    Qualified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    pub total_nodes: usize,
    pub node_types: BTreeMap<ElementKind, usize>,
    pub avg_dependencies: f64,
    pub max_dependencies: usize,
    pub circular_dependencies: usize,
    pub root_nodes: usize,
    pub leaf_nodes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub file_path: String,
    pub content: String,
    pub metadata: NodeMetadata,
    pub summary: Option<NodeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub file_path: String,
    pub content: String,
    pub summary: Option<NodeSummary>,
}

/// Everything a downstream generator needs about one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationContext {
    pub target_node: TargetRecord,
    pub dependencies: Vec<NodeRecord>,
    pub dependents: Vec<NodeRecord>,
    pub neighborhood: Vec<NodeRecord>,
    pub dependency_chain: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextFormat {
    Markdown,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigraphConfig {
    pub version: i64,
    pub root_dir: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_file_size: u64,
    #[serde(default = "default_context_depth")]
    pub context_depth: usize,
    #[serde(default)]
    pub key_strategy: KeyStrategy,
    #[serde(default = "default_knowledge_base")]
    pub knowledge_base: String,
}

const fn default_context_depth() -> usize {
    2
}

fn default_knowledge_base() -> String {
    ".migraph/knowledge_base.json".to_string()
}
