#![forbid(unsafe_code)]

use crate::graph::DependencyGraph;
use crate::types::{
    ContextFormat, DependencyNode, MigrationContext, NodeRecord, NodeSummary, TargetRecord,
};

pub const DEFAULT_CONTEXT_DEPTH: usize = 2;

impl DependencyGraph {
    /// Context bundle for `name` using the default neighborhood depth.
    pub fn context_for_migration(&self, name: &str) -> Option<MigrationContext> {
        self.context_for(name, DEFAULT_CONTEXT_DEPTH)
    }

    /// Context bundle for `name`, or `None` if it is not a node.
    pub fn context_for(&self, name: &str, depth: usize) -> Option<MigrationContext> {
        let key = self.resolve_key(name)?;
        let target = self.nodes.get(key)?;

        let dependencies = target
            .dependencies
            .iter()
            .filter_map(|dep| self.node_record(dep))
            .collect();
        let dependents = target
            .dependents
            .iter()
            .filter_map(|dep| self.node_record(dep))
            .collect();
        let neighborhood = self
            .neighborhood(key, depth)
            .iter()
            .filter(|member| member.as_str() != key)
            .filter_map(|member| self.node_record(member))
            .collect();

        Some(MigrationContext {
            target_node: TargetRecord {
                name: key.to_string(),
                kind: target.kind,
                file_path: target.file_path.clone(),
                content: target.content.clone(),
                metadata: target.metadata.clone(),
                summary: self.summary_for(key, target).cloned(),
            },
            dependencies,
            dependents,
            neighborhood,
            dependency_chain: self.dependency_chain(key),
        })
    }

    fn node_record(&self, key: &str) -> Option<NodeRecord> {
        let node = self.nodes.get(key)?;
        Some(NodeRecord {
            name: key.to_string(),
            kind: node.kind,
            file_path: node.file_path.clone(),
            content: node.content.clone(),
            summary: self.summary_for(key, node).cloned(),
        })
    }

    /// Summaries are keyed by whatever name the caller used, so fall back to
    /// the bare element name when nodes carry qualified keys.
    fn summary_for(&self, key: &str, node: &DependencyNode) -> Option<&NodeSummary> {
        self.summaries
            .get(key)
            .or_else(|| self.summaries.get(&node.name))
    }
}

/// Render a bundle in the requested format.
pub fn render(context: &MigrationContext, format: ContextFormat) -> String {
    match format {
        ContextFormat::Markdown => render_markdown(context),
        ContextFormat::Json => serde_json::to_string_pretty(context).unwrap_or_default(),
    }
}

pub fn render_markdown(context: &MigrationContext) -> String {
    let target = &context.target_node;
    let mut lines = Vec::new();
    lines.push(format!("## Migration Context: {}", target.name));
    lines.push(String::new());
    lines.push(format!(
        "**Kind:** {} - {}:{}-{}",
        target.kind.as_str(),
        target.file_path,
        target.metadata.start_line,
        target.metadata.end_line
    ));
    if let Some(summary) = &target.summary
        && !summary.purpose.is_empty()
    {
        lines.push(format!("**Purpose:** {}", summary.purpose));
    }
    lines.push(String::new());
    lines.push("```java".to_string());
    lines.push(target.content.clone());
    lines.push("```".to_string());
    lines.push(String::new());

    push_records(&mut lines, "Dependencies", &context.dependencies, true);
    push_records(&mut lines, "Dependents", &context.dependents, false);
    push_records(&mut lines, "Neighborhood", &context.neighborhood, false);

    if !context.dependency_chain.is_empty() {
        lines.push("### Migration Order".to_string());
        lines.push(String::new());
        for (index, name) in context.dependency_chain.iter().enumerate() {
            let marker = if *name == target.name { " <-" } else { "" };
            lines.push(format!("{}. {name}{marker}", index + 1));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn push_records(lines: &mut Vec<String>, title: &str, records: &[NodeRecord], with_code: bool) {
    if records.is_empty() {
        return;
    }

    lines.push(format!("### {title}"));
    lines.push(String::new());
    for record in records {
        let purpose = record
            .summary
            .as_ref()
            .filter(|s| !s.purpose.is_empty())
            .map_or_else(String::new, |s| format!(": {}", s.purpose));
        lines.push(format!(
            "- **{}** ({}) - {}{purpose}",
            record.name,
            record.kind.as_str(),
            record.file_path
        ));
    }
    lines.push(String::new());

    if with_code {
        for record in records {
            lines.push(format!("#### {} ({})", record.name, record.file_path));
            lines.push(String::new());
            lines.push("```java".to_string());
            lines.push(record.content.clone());
            lines.push("```".to_string());
            lines.push(String::new());
        }
    }
}
