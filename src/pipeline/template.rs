//! Pipeline property template: document model and startup loading.
//!
//! The template is a JSON document whose `rte.predefined_graphs` array
//! holds named graphs, each with an `auto_start` flag and named nodes
//! carrying a `property` object. Unknown keys at every level are kept
//! verbatim so the materialized file stays readable by the worker.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::pipeline::field_map::FieldMap;
use crate::{AppError, Result};

/// Root of a pipeline property document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyDocument {
    /// Runtime section holding the graphs.
    pub rte: RteSection,
    /// Other top-level keys, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `rte` section of a property document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RteSection {
    /// Named graphs available to workers.
    #[serde(default)]
    pub predefined_graphs: Vec<Graph>,
    /// Other runtime keys, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One named pipeline graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Graph {
    /// Graph name, unique within the document.
    pub name: String,
    /// Whether the worker starts this graph on launch.
    #[serde(default)]
    pub auto_start: bool,
    /// Stages of the graph.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Connections and other graph keys, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One configurable stage (extension) of a graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node name, unique within its graph.
    pub name: String,
    /// Property name → scalar value.
    #[serde(default)]
    pub property: Map<String, Value>,
    /// Addon, type, and other node keys, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PropertyDocument {
    /// Parse and validate a document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Template` if the JSON is malformed or graph or
    /// node names repeat.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let document: Self = serde_json::from_str(raw)
            .map_err(|err| AppError::Template(format!("invalid property template: {err}")))?;
        document.validate()?;
        Ok(document)
    }

    /// Find a graph by name.
    #[must_use]
    pub fn graph(&self, name: &str) -> Option<&Graph> {
        self.rte.predefined_graphs.iter().find(|g| g.name == name)
    }

    /// Find a graph by name for mutation.
    pub fn graph_mut(&mut self, name: &str) -> Option<&mut Graph> {
        self.rte
            .predefined_graphs
            .iter_mut()
            .find(|g| g.name == name)
    }

    /// Names of every graph in document order.
    #[must_use]
    pub fn graph_names(&self) -> Vec<&str> {
        self.rte
            .predefined_graphs
            .iter()
            .map(|g| g.name.as_str())
            .collect()
    }

    fn validate(&self) -> Result<()> {
        let mut graphs = HashSet::new();
        for graph in &self.rte.predefined_graphs {
            if !graphs.insert(graph.name.as_str()) {
                return Err(AppError::Template(format!(
                    "duplicate graph name `{}`",
                    graph.name
                )));
            }
            let mut nodes = HashSet::new();
            for node in &graph.nodes {
                if !nodes.insert(node.name.as_str()) {
                    return Err(AppError::Template(format!(
                        "duplicate node `{}` in graph `{}`",
                        node.name, graph.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Graph {
    /// Set a node property; returns `false` when the node is absent.
    pub fn set_property(&mut self, node: &str, property: &str, value: Value) -> bool {
        match self.nodes.iter_mut().find(|n| n.name == node) {
            Some(target) => {
                target.property.insert(property.to_owned(), value);
                true
            }
            None => false,
        }
    }

    /// Read a node property.
    #[must_use]
    pub fn property(&self, node: &str, property: &str) -> Option<&Value> {
        self.nodes
            .iter()
            .find(|n| n.name == node)
            .and_then(|n| n.property.get(property))
    }
}

/// Read-only holder of the prepared template.
///
/// Built once at startup; per-session variants are independent clones.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    document: PropertyDocument,
}

impl TemplateStore {
    /// Wrap an already-prepared document.
    #[must_use]
    pub fn new(document: PropertyDocument) -> Self {
        Self { document }
    }

    /// Load the template from disk and prepare it for session use.
    ///
    /// Environment overrides are read from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Template` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>, field_map: &FieldMap) -> Result<Self> {
        Self::load_with_env(path, field_map, |key| std::env::var(key).ok())
    }

    /// Load the template, resolving environment overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Template` if the file cannot be read or parsed.
    pub fn load_with_env<F>(path: impl AsRef<Path>, field_map: &FieldMap, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Template(format!(
                "failed to read property template {}: {err}",
                path.display()
            ))
        })?;
        let mut document = PropertyDocument::from_json_str(&raw)?;
        prepare(&mut document, field_map, lookup);

        info!(
            path = %path.display(),
            graphs = document.rte.predefined_graphs.len(),
            "property template loaded"
        );
        Ok(Self { document })
    }

    /// The prepared template.
    #[must_use]
    pub fn document(&self) -> &PropertyDocument {
        &self.document
    }
}

/// Disable auto-start everywhere and apply environment overrides.
fn prepare<F>(document: &mut PropertyDocument, field_map: &FieldMap, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let overrides: Vec<_> = field_map
        .env_properties
        .iter()
        .filter_map(|(key, targets)| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .map(|value| (key, value, targets))
        })
        .collect();

    for graph in &mut document.rte.predefined_graphs {
        graph.auto_start = false;
        for (key, value, targets) in &overrides {
            for target in *targets {
                let value = Value::String(value.clone());
                if graph.set_property(&target.node, &target.property, value) {
                    debug!(
                        env = %key,
                        graph = %graph.name,
                        node = %target.node,
                        "env override applied"
                    );
                }
            }
        }
    }
}
