//! Turns a start request into a per-session property document on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::field_map::{FieldMap, StartField};
use super::naming;
use super::template::{PropertyDocument, TemplateStore};
use crate::models::request::StartRequest;
use crate::{AppError, Result};

/// Output of [`Materializer::materialize`].
#[derive(Debug, Clone)]
pub struct MaterializedConfig {
    /// The patched document that was written.
    pub document: PropertyDocument,
    /// Graph selected for the session.
    pub graph_name: String,
    /// Where the document was written.
    pub config_path: PathBuf,
    /// Where the worker should write its output.
    pub log_path: PathBuf,
}

/// Produces per-session configurations from the shared template.
#[derive(Debug, Clone)]
pub struct Materializer {
    template: Arc<TemplateStore>,
    field_map: Arc<FieldMap>,
    work_dir: PathBuf,
}

impl Materializer {
    /// Create a materializer writing under `work_dir`.
    #[must_use]
    pub fn new(template: Arc<TemplateStore>, field_map: Arc<FieldMap>, work_dir: PathBuf) -> Self {
        Self {
            template,
            field_map,
            work_dir,
        }
    }

    /// Directory receiving generated files.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Resolve the graph a request should run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::GraphNotFound` when neither the explicit name nor
    /// the language table names a graph present in the template.
    pub fn select_graph(&self, request: &StartRequest) -> Result<String> {
        let name = if request.graph_name.is_empty() {
            self.field_map
                .graph_for_language(&request.asr_language)
                .ok_or_else(|| {
                    AppError::GraphNotFound(format!(
                        "no graph configured for language `{}`",
                        request.asr_language
                    ))
                })?
        } else {
            request.graph_name.as_str()
        };

        if self.template.document().graph(name).is_none() {
            return Err(AppError::GraphNotFound(format!(
                "graph `{name}` is not in the template"
            )));
        }
        Ok(name.to_owned())
    }

    /// Build the patched document for a request without touching disk.
    ///
    /// # Errors
    ///
    /// Returns `AppError::GraphNotFound` if the graph cannot be resolved.
    pub fn render(&self, request: &StartRequest) -> Result<(String, PropertyDocument)> {
        let graph_name = self.select_graph(request)?;
        let mut document = self.template.document().clone();
        let graph = document
            .graph_mut(&graph_name)
            .ok_or_else(|| AppError::GraphNotFound(graph_name.clone()))?;
        graph.auto_start = true;

        for (field, targets) in &self.field_map.fields {
            let Some(value) = request.field_value(*field) else {
                continue;
            };
            for target in targets {
                let resolved = if *field == StartField::VoiceType {
                    let voice = self.field_map.resolve_voice(
                        &request.asr_language,
                        &target.node,
                        &request.voice_type,
                    );
                    if voice.is_none() {
                        debug!(
                            language = %request.asr_language,
                            node = %target.node,
                            voice_type = %request.voice_type,
                            "no voice mapping, clearing property"
                        );
                    }
                    Value::String(voice.unwrap_or_default().to_owned())
                } else {
                    value.clone()
                };

                if !graph.set_property(&target.node, &target.property, resolved) {
                    debug!(graph = %graph_name, node = %target.node, %field, "target node absent");
                }
            }
        }

        Ok((graph_name, document))
    }

    /// Render the request and persist it to a fresh configuration file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::GraphNotFound` if the graph cannot be resolved, or
    /// `AppError::Template` if the document cannot be written.
    pub async fn materialize(&self, request: &StartRequest) -> Result<MaterializedConfig> {
        let (graph_name, document) = self.render(request)?;
        let (config_path, log_path) = naming::session_paths(&self.work_dir, &request.channel_name);

        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|err| AppError::Template(format!("failed to encode document: {err}")))?;
        if let Err(err) = tokio::fs::write(&config_path, bytes).await {
            warn!(path = %config_path.display(), %err, "failed to write session config");
            return Err(AppError::Template(format!(
                "failed to write {}: {err}",
                config_path.display()
            )));
        }

        info!(
            channel = %request.channel_name,
            graph = %graph_name,
            config_path = %config_path.display(),
            "session config materialized"
        );

        Ok(MaterializedConfig {
            document,
            graph_name,
            config_path,
            log_path,
        })
    }
}
