//! Source feature analysis
//!
//! Decides which runtime behaviors a file exhibits, and therefore which probes
//! are worth synthesizing. Python is parsed with tree-sitter; files that do not
//! parse cleanly are skipped. Other languages have no probe runtime.

use crate::types::ProbeCategory;
use mend_core::{FileRecord, Language};
use tree_sitter::{Node, Parser};

const USER_INPUT_ATTRS: &[&str] = &["get", "post", "put", "delete", "getParameter", "getHeader"];
const RESOURCE_HINTS: &[&str] = &["connect", "connection", "socket", "cursor"];
const CONCURRENCY_NAMES: &[&str] = &[
    "asyncio",
    "multiprocessing",
    "concurrent",
    "Lock",
    "RLock",
    "Semaphore",
];
const DYNAMIC_CALLS: &[&str] = &["eval", "exec", "__import__", "compile"];
const DESERIALIZERS: &[&str] = &["pickle", "marshal", "dill", "yaml"];

/// Behaviors detected in one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFeatures {
    /// Reads external or request data
    pub user_input: bool,
    /// Opens files, sockets or connections
    pub resource_management: bool,
    /// Uses threads or other concurrency primitives
    pub concurrency: bool,
    /// Loops, division or modulo
    pub boundary_conditions: bool,
    /// Reads environment variables
    pub environment_config: bool,
    /// Evaluates code or deserializes objects
    pub dynamic_execution: bool,
    /// Module-level function names
    pub functions: Vec<String>,
    /// Module-level class names
    pub classes: Vec<String>,
}

impl SourceFeatures {
    /// Categories worth probing, in synthesis order
    #[must_use]
    pub fn categories(&self) -> Vec<ProbeCategory> {
        ProbeCategory::ALL
            .into_iter()
            .filter(|c| self.has(*c))
            .collect()
    }

    /// Whether a category was detected
    #[must_use]
    pub fn has(&self, category: ProbeCategory) -> bool {
        match category {
            ProbeCategory::UserInput => self.user_input,
            ProbeCategory::ResourceManagement => self.resource_management,
            ProbeCategory::Concurrency => self.concurrency,
            ProbeCategory::BoundaryConditions => self.boundary_conditions,
            ProbeCategory::EnvironmentConfig => self.environment_config,
            ProbeCategory::DynamicExecution => self.dynamic_execution,
        }
    }
}

/// Analyze a file; `None` when it has no text, does not parse, or has no probe runtime
#[must_use]
pub fn analyze(file: &FileRecord) -> Option<SourceFeatures> {
    let source = file.content.as_deref().filter(|c| !c.trim().is_empty())?;
    match file.language {
        Language::Python => {
            let features = analyze_python(source);
            if features.is_none() {
                tracing::debug!(file = %file.path, "python source did not parse, skipping probes");
            }
            features
        }
        other => {
            tracing::debug!(file = %file.path, language = %other, "no probe runtime for language");
            None
        }
    }
}

/// Analyze Python source
#[must_use]
pub fn analyze_python(source: &str) -> Option<SourceFeatures> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }

    let mut features = SourceFeatures::default();
    collect_definitions(&root, source, &mut features);

    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        inspect(&node, source, &mut features);

        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return Some(features);
            }
        }
    }
}

fn collect_definitions(root: &Node<'_>, source: &str, features: &mut SourceFeatures) {
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let definition = if child.kind() == "decorated_definition" {
            match child.child_by_field_name("definition") {
                Some(def) => def,
                None => continue,
            }
        } else {
            child
        };
        let Some(name) = definition
            .child_by_field_name("name")
            .map(|n| node_text(&n, source).to_string())
        else {
            continue;
        };
        match definition.kind() {
            "function_definition" => features.functions.push(name),
            "class_definition" => features.classes.push(name),
            _ => {}
        }
    }
}

fn inspect(node: &Node<'_>, source: &str, features: &mut SourceFeatures) {
    match node.kind() {
        "call" => inspect_call(node, source, features),
        "attribute" => {
            if let Some(attr) = node.child_by_field_name("attribute") {
                let attr = node_text(&attr, source);
                let lower = attr.to_lowercase();
                if RESOURCE_HINTS.iter().any(|h| lower.contains(h)) {
                    features.resource_management = true;
                }
                if lower.contains("environ") || lower.contains("getenv") {
                    features.environment_config = true;
                }
            }
        }
        "identifier" => {
            let name = node_text(node, source);
            if name.to_lowercase().contains("thread") || CONCURRENCY_NAMES.contains(&name) {
                features.concurrency = true;
            }
        }
        "for_statement" | "while_statement" => features.boundary_conditions = true,
        "binary_operator" => {
            let op = node
                .child_by_field_name("operator")
                .map(|n| node_text(&n, source));
            if matches!(op, Some("/" | "//" | "%")) {
                features.boundary_conditions = true;
            }
        }
        _ => {}
    }
}

fn inspect_call(node: &Node<'_>, source: &str, features: &mut SourceFeatures) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    match function.kind() {
        "identifier" => {
            let name = node_text(&function, source);
            if name == "open" {
                features.resource_management = true;
            }
            if name == "input" {
                features.user_input = true;
            }
            if DYNAMIC_CALLS.contains(&name) {
                features.dynamic_execution = true;
            }
        }
        "attribute" => {
            let attr = function
                .child_by_field_name("attribute")
                .map_or("", |n| node_text(&n, source));
            let object = function
                .child_by_field_name("object")
                .map_or("", |n| node_text(&n, source));
            if USER_INPUT_ATTRS.contains(&attr) {
                features.user_input = true;
            }
            if matches!(attr, "load" | "loads") && DESERIALIZERS.contains(&object) {
                features.dynamic_execution = true;
            }
            if attr == "import_module" {
                features.dynamic_execution = true;
            }
        }
        _ => {}
    }
}

fn node_text<'s>(node: &Node<'_>, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}
