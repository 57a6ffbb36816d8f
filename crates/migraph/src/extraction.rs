#![forbid(unsafe_code)]
#![allow(
    clippy::indexing_slicing,
    clippy::missing_const_for_fn,
    clippy::option_if_let_else,
    clippy::too_many_lines
)]

//! Structural extraction of Java sources.
//!
//! Each file is parsed with tree-sitter and walked once in document order.
//! Files that do not parse cleanly go through a regex pass that only finds
//! `class` declarations.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use regex::Regex;
use tree_sitter::{Node as TsNode, Parser, Tree};

use crate::resolution::{DependencyResolver, TextualResolver};
use crate::types::{ElementKind, MemberSignature, MigraphConfig, Parameter, StructuralElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPhase {
    Scanning,
    Parsing,
}

#[derive(Debug, Clone)]
pub struct ExtractionProgress {
    pub phase: ExtractionPhase,
    pub current: usize,
    pub total: usize,
    pub current_file: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub elements: Vec<StructuralElement>,
    pub files_scanned: usize,
    pub files_extracted: usize,
    pub fallback_files: Vec<String>,
    pub skipped_files: Vec<String>,
    pub duration_ms: u128,
}

/// Result of extracting a single file.
#[derive(Debug, Clone, Default)]
pub struct FileExtraction {
    pub elements: Vec<StructuralElement>,
    pub used_fallback: bool,
}

pub struct Extractor {
    resolver: Box<dyn DependencyResolver>,
    constant_pattern: Regex,
    fallback_class_pattern: Regex,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor").finish_non_exhaustive()
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self::with_resolver(Box::new(TextualResolver::new()))
    }

    #[allow(clippy::missing_panics_doc)]
    pub fn with_resolver(resolver: Box<dyn DependencyResolver>) -> Self {
        Self {
            resolver,
            constant_pattern: Regex::new(
                r#"\b((?:(?:public|static|final)\s+){3})([\w.$<>\[\]?, ]+?)\s+(\w+)\s*=\s*((?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|[^;"'])+);"#,
            )
            .expect("valid constant pattern"),
            fallback_class_pattern: Regex::new(
                r"((?:(?:public|protected|private|abstract|final|static)\s+)*)\bclass\s+(\w+)[^{;]*\{",
            )
            .expect("valid class pattern"),
        }
    }

    /// Elements of one file, in document order, constants last.
    pub fn extract_file(&self, file_path: &str, content: &str) -> Vec<StructuralElement> {
        self.extract_file_detailed(file_path, content).elements
    }

    pub fn extract_file_detailed(&self, file_path: &str, content: &str) -> FileExtraction {
        let Some(tree) = parse_java(content) else {
            tracing::debug!(file = file_path, "parse failed, using pattern fallback");
            return FileExtraction {
                elements: self.fallback_elements(file_path, content),
                used_fallback: true,
            };
        };

        let file = FileContext::new(file_path, content, collect_imports(tree.root_node(), content));
        let mut elements = Vec::new();
        self.walk(tree.root_node(), &file, &mut elements);
        elements.extend(self.constant_elements(file_path, content));

        tracing::debug!(file = file_path, elements = elements.len(), "parsed file");
        FileExtraction {
            elements,
            used_fallback: false,
        }
    }

    fn walk(&self, node: TsNode, file: &FileContext, elements: &mut Vec<StructuralElement>) {
        let Some(kind) = declaration_kind(node.kind()) else {
            self.walk_children(node, file, elements);
            return;
        };

        let Some(element) = self.type_element(node, kind, file) else {
            self.walk_children(node, file, elements);
            return;
        };
        let type_name = element.name.clone();
        elements.push(element);

        if kind != ElementKind::Type {
            self.walk_children(node, file, elements);
            return;
        }

        for child in node.children(&mut node.walk()) {
            if child.kind() != "class_body" {
                self.walk(child, file, elements);
                continue;
            }
            for member in child.children(&mut child.walk()) {
                if member.kind() == "method_declaration" {
                    if let Some(element) = self.member_element(member, &type_name, file) {
                        elements.push(element);
                    }
                    // Local and anonymous classes inside the method body.
                    self.walk_children(member, file, elements);
                } else {
                    self.walk(member, file, elements);
                }
            }
        }
    }

    fn walk_children(&self, node: TsNode, file: &FileContext, elements: &mut Vec<StructuralElement>) {
        for child in node.children(&mut node.walk()) {
            self.walk(child, file, elements);
        }
    }

    fn type_element(
        &self,
        node: TsNode,
        kind: ElementKind,
        file: &FileContext,
    ) -> Option<StructuralElement> {
        let name = field_text(node, "name", file.source)?;
        let (start_line, end_line, content) = file.span(node);
        let dependency_names = self.scan_dependencies(&name, &content, &file.imports);

        Some(StructuralElement {
            kind,
            name,
            content,
            source_file: file.path.to_string(),
            start_line,
            end_line,
            dependency_names,
            enclosing_type: None,
            modifiers: modifiers(node, file.source),
            annotations: annotations(node, file.source),
            signature: None,
        })
    }

    fn member_element(
        &self,
        node: TsNode,
        enclosing_type: &str,
        file: &FileContext,
    ) -> Option<StructuralElement> {
        let name = field_text(node, "name", file.source)?;
        let (start_line, end_line, content) = file.span(node);
        let dependency_names = self.scan_dependencies(&name, &content, &file.imports);
        let return_type = field_text(node, "type", file.source)
            .map_or_else(|| "void".to_string(), |text| simple_type_name(&text));

        Some(StructuralElement {
            kind: ElementKind::Member,
            name,
            content,
            source_file: file.path.to_string(),
            start_line,
            end_line,
            dependency_names,
            enclosing_type: Some(enclosing_type.to_string()),
            modifiers: modifiers(node, file.source),
            annotations: annotations(node, file.source),
            signature: Some(MemberSignature {
                return_type,
                parameters: parameters(node, file.source),
            }),
        })
    }

    /// Runs the resolver and drops the element's own name unless the body
    /// itself references it.
    fn scan_dependencies(&self, name: &str, content: &str, imports: &[String]) -> BTreeSet<String> {
        let mut names = self.resolver.dependencies(content, imports);
        if names.contains(name) && !self.resolver.dependencies(content, &[]).contains(name) {
            names.remove(name);
        }
        names
    }

    fn constant_elements(&self, file_path: &str, content: &str) -> Vec<StructuralElement> {
        let mut constants = Vec::new();

        for caps in self.constant_pattern.captures_iter(content) {
            let declared: BTreeSet<&str> = caps[1].split_whitespace().collect();
            if declared != BTreeSet::from(["public", "static", "final"]) {
                continue;
            }
            let Some(whole) = caps.get(0) else {
                continue;
            };

            let start_line = line_of_offset(content, whole.start());
            let text = whole.as_str();
            constants.push(StructuralElement {
                kind: ElementKind::Constant,
                name: caps[3].to_string(),
                content: text.to_string(),
                source_file: file_path.to_string(),
                start_line,
                end_line: start_line + text.matches('\n').count(),
                dependency_names: BTreeSet::new(),
                enclosing_type: None,
                modifiers: vec!["public".to_string(), "static".to_string(), "final".to_string()],
                annotations: Vec::new(),
                signature: None,
            });
        }

        constants
    }

    fn fallback_elements(&self, file_path: &str, content: &str) -> Vec<StructuralElement> {
        let mut elements = Vec::new();

        for caps in self.fallback_class_pattern.captures_iter(content) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let name = caps[2].to_string();
            let start = whole.start();
            let open_brace = whole.end() - 1;

            let text = match matching_brace(content, open_brace) {
                Some(close) => &content[start..=close],
                None => declaration_line(content, start),
            };

            let start_line = line_of_offset(content, start);
            let dependency_names = self.scan_dependencies(&name, text, &[]);
            elements.push(StructuralElement {
                kind: ElementKind::Type,
                name,
                content: text.to_string(),
                source_file: file_path.to_string(),
                start_line,
                end_line: start_line + text.matches('\n').count(),
                dependency_names,
                enclosing_type: None,
                modifiers: caps[1].split_whitespace().map(str::to_string).collect(),
                annotations: Vec::new(),
                signature: None,
            });
        }

        elements
    }
}

/// Extract one file with the default textual resolver.
pub fn extract_file(file_path: &str, content: &str) -> Vec<StructuralElement> {
    Extractor::new().extract_file(file_path, content)
}

/// Extract every matching file under `project_root`.
///
/// Files are processed in parallel but results are concatenated in sorted
/// relative-path order, so the graph built from them is reproducible.
pub fn extract_project(
    project_root: &Path,
    config: &MigraphConfig,
    extractor: &Extractor,
    on_progress: Option<&(dyn Fn(ExtractionProgress) + Sync)>,
) -> ExtractionReport {
    let start = Instant::now();
    let filter = FileFilter::new(config);

    let mut files = scan_directory(project_root, &filter, |current, file| {
        if let Some(cb) = on_progress {
            cb(ExtractionProgress {
                phase: ExtractionPhase::Scanning,
                current,
                total: 0,
                current_file: Some(file.to_string()),
            });
        }
    });
    files.sort();

    let total = files.len();
    let done = AtomicUsize::new(0);
    let outcomes: Vec<(String, Option<FileExtraction>)> = files
        .par_iter()
        .map(|file| {
            let outcome = read_source(project_root, file, config.max_file_size)
                .map(|content| extractor.extract_file_detailed(file, &content));
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(cb) = on_progress {
                cb(ExtractionProgress {
                    phase: ExtractionPhase::Parsing,
                    current,
                    total,
                    current_file: Some(file.clone()),
                });
            }
            (file.clone(), outcome)
        })
        .collect();

    let mut report = ExtractionReport {
        files_scanned: total,
        ..ExtractionReport::default()
    };
    for (file, outcome) in outcomes {
        match outcome {
            Some(extraction) => {
                report.files_extracted += 1;
                if extraction.used_fallback {
                    report.fallback_files.push(file);
                }
                report.elements.extend(extraction.elements);
            }
            None => report.skipped_files.push(file),
        }
    }

    report.duration_ms = start.elapsed().as_millis();
    tracing::info!(
        files = report.files_scanned,
        elements = report.elements.len(),
        fallback = report.fallback_files.len(),
        "extracted {} structural elements",
        report.elements.len()
    );
    report
}

fn read_source(project_root: &Path, relative_path: &str, max_file_size: u64) -> Option<String> {
    let full_path = project_root.join(relative_path);
    match fs::read_to_string(&full_path) {
        Ok(content) if (content.len() as u64) > max_file_size => {
            tracing::debug!(file = relative_path, size = content.len(), "file too large, skipped");
            None
        }
        Ok(content) => Some(content),
        Err(err) => {
            tracing::warn!(file = relative_path, error = %err, "could not read source file");
            None
        }
    }
}

struct FileContext<'a> {
    path: &'a str,
    source: &'a str,
    lines: Vec<&'a str>,
    imports: Vec<String>,
}

impl<'a> FileContext<'a> {
    fn new(path: &'a str, source: &'a str, imports: Vec<String>) -> Self {
        Self {
            path,
            source,
            lines: source.lines().collect(),
            imports,
        }
    }

    /// 1-based line bounds and whole-line content of a declaration.
    ///
    /// The end comes from the furthest child; a node without children falls
    /// back to brace matching, then to its own first line.
    fn span(&self, node: TsNode) -> (usize, usize, String) {
        let start = node.start_position().row;
        let child_end = node
            .children(&mut node.walk())
            .map(|child| child.end_position().row)
            .max();
        let end = child_end
            .or_else(|| brace_match_end(&self.lines, start))
            .unwrap_or(start)
            .max(start);

        let last = end.min(self.lines.len().saturating_sub(1));
        let content = self
            .lines
            .get(start..=last)
            .map_or_else(String::new, |lines| lines.join("\n"));
        (start + 1, end + 1, content)
    }
}

fn parse_java(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    let language = tree_sitter::Language::new(tree_sitter_java::LANGUAGE);
    if parser.set_language(&language).is_err() {
        return None;
    }
    let tree = parser.parse(source, None)?;
    if tree.root_node().has_error() {
        return None;
    }
    Some(tree)
}

fn declaration_kind(kind: &str) -> Option<ElementKind> {
    match kind {
        "class_declaration" | "record_declaration" => Some(ElementKind::Type),
        "interface_declaration" => Some(ElementKind::Interface),
        "enum_declaration" => Some(ElementKind::Enumeration),
        "annotation_type_declaration" => Some(ElementKind::AnnotationType),
        _ => None,
    }
}

fn node_text(node: TsNode, source: &str) -> Option<String> {
    node.utf8_text(source.as_bytes())
        .ok()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn field_text(node: TsNode, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|child| node_text(child, source))
}

fn modifier_children(node: TsNode) -> Vec<TsNode> {
    let mut result = Vec::new();
    for child in node.children(&mut node.walk()) {
        if child.kind() == "modifiers" {
            result.extend(child.children(&mut child.walk()));
        }
    }
    result
}

fn is_annotation(node: TsNode) -> bool {
    matches!(node.kind(), "marker_annotation" | "annotation")
}

fn modifiers(node: TsNode, source: &str) -> Vec<String> {
    modifier_children(node)
        .into_iter()
        .filter(|child| !is_annotation(*child) && !child.kind().ends_with("comment"))
        .filter_map(|child| node_text(child, source))
        .collect()
}

fn annotations(node: TsNode, source: &str) -> Vec<String> {
    modifier_children(node)
        .into_iter()
        .filter(|child| is_annotation(*child))
        .filter_map(|child| field_text(child, "name", source))
        .collect()
}

fn parameters(node: TsNode, source: &str) -> Vec<Parameter> {
    let Some(list) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };

    let mut params = Vec::new();
    for child in list.children(&mut list.walk()) {
        match child.kind() {
            "formal_parameter" => {
                let type_name = field_text(child, "type", source)
                    .map_or_else(|| "Object".to_string(), |t| simple_type_name(&t));
                let name = field_text(child, "name", source).unwrap_or_default();
                params.push(Parameter { type_name, name });
            }
            "spread_parameter" => {
                let mut type_name = "Object".to_string();
                let mut name = String::new();
                for part in child.children(&mut child.walk()) {
                    if part.kind() == "variable_declarator" {
                        name = field_text(part, "name", source).unwrap_or_default();
                    } else if part.is_named() && part.kind() != "modifiers" {
                        if let Some(text) = node_text(part, source) {
                            type_name = simple_type_name(&text);
                        }
                    }
                }
                params.push(Parameter { type_name, name });
            }
            _ => {}
        }
    }
    params
}

/// `java.util.List<String>[]` -> `List`.
pub fn simple_type_name(text: &str) -> String {
    let base = text.split('<').next().unwrap_or(text);
    let base = base.trim().trim_end_matches("...").trim_end_matches("[]").trim();
    base.rsplit('.').next().unwrap_or(base).trim().to_string()
}

fn collect_imports(root: TsNode, source: &str) -> Vec<String> {
    let mut imports = Vec::new();
    for child in root.children(&mut root.walk()) {
        if child.kind() != "import_declaration" {
            continue;
        }
        let Some(text) = node_text(child, source) else {
            continue;
        };
        let path: String = text
            .trim_start_matches("import")
            .trim_end_matches(';')
            .trim()
            .trim_start_matches("static ")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if !path.is_empty() {
            imports.push(path);
        }
    }
    imports
}

/// Last row of the block opened at or after `start`, by brace depth.
fn brace_match_end(lines: &[&str], start: usize) -> Option<usize> {
    let mut depth: i64 = 0;
    let mut opened = false;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        let opens = line.matches('{').count() as i64;
        let closes = line.matches('}').count() as i64;
        if opens > 0 {
            opened = true;
        }
        depth += opens - closes;
        if opened && depth <= 0 {
            return Some(idx);
        }
    }
    None
}

/// Byte offset of the brace closing the one at `open`.
fn matching_brace(content: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, ch) in content[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn declaration_line(content: &str, start: usize) -> &str {
    let rest = &content[start..];
    rest.split('\n').next().unwrap_or(rest).trim_end_matches('\r')
}

fn line_of_offset(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}

struct FileFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl FileFilter {
    fn new(config: &MigraphConfig) -> Self {
        Self {
            include: build_globset(&config.include),
            exclude: build_globset(&config.exclude),
        }
    }

    fn excludes_dir(&self, rel_dir: &str) -> bool {
        self.exclude.is_match(format!("{rel_dir}/")) || self.exclude.is_match(format!("{rel_dir}/x"))
    }

    fn includes_file(&self, rel_path: &str) -> bool {
        !self.exclude.is_match(rel_path) && self.include.is_match(rel_path)
    }
}

fn build_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => tracing::warn!(pattern = %pattern, error = %err, "ignoring invalid glob"),
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

fn scan_directory(
    root_dir: &Path,
    filter: &FileFilter,
    mut on_progress: impl FnMut(usize, &str),
) -> Vec<String> {
    let mut files = Vec::new();
    let mut count = 0;

    let mut stack = vec![root_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(rel_path) = path.strip_prefix(root_dir) else {
                continue;
            };
            let rel_str = rel_path
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if !filter.excludes_dir(&rel_str) {
                    stack.push(path);
                }
            } else if file_type.is_file() && filter.includes_file(&rel_str) {
                count += 1;
                on_progress(count, &rel_str);
                files.push(rel_str);
            }
        }
    }

    files
}
