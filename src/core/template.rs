//! Descriptor template rendering.
//!
//! Templates are JSON text with `{{ name }}` markers. Rendering substitutes
//! markers from a [`VariableSet`], then parses the result strictly as JSON,
//! applies secrets and refuses output that still carries the sentinel.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::descriptor_file_name;
use crate::error::{ContainerFailure, Error, PipelineLocation, Result};
use crate::secrets;
use crate::variables::VariableSet;

fn marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("Invalid regex pattern")
    })
}

/// Substitute `{{ name }}` markers.
///
/// Strings are inserted verbatim, everything else as its JSON text. Returns
/// every undefined name (first-seen order) when any marker cannot be resolved.
pub fn substitute(text: &str, variables: &VariableSet) -> std::result::Result<String, Vec<String>> {
    let mut undefined: Vec<String> = Vec::new();
    let rendered = marker().replace_all(text, |caps: &Captures| {
        let name = &caps[1];
        match variables.lookup(name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                if !undefined.iter().any(|u| u == name) {
                    undefined.push(name.to_string());
                }
                String::new()
            }
        }
    });
    if undefined.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(undefined)
    }
}

/// Per-container render inputs.
#[derive(Debug, Clone, Default)]
pub struct RenderJob {
    pub variables: VariableSet,
    /// `None` when no secrets document was found.
    pub secrets: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDescriptor {
    pub container: String,
    pub descriptor: Value,
}

/// Outcome of rendering every container of one application.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderBatch {
    pub rendered: Vec<RenderedDescriptor>,
    pub failures: Vec<ContainerFailure>,
}

impl RenderBatch {
    pub fn record(&mut self, container: &str, result: Result<Value>) {
        match result {
            Ok(descriptor) => self.rendered.push(RenderedDescriptor {
                container: container.to_string(),
                descriptor,
            }),
            Err(err) => {
                log_status!("render", "{}: {}", container, err.message);
                self.failures.push(err.into_failure(container));
            }
        }
    }

    /// Fail if any container failed; otherwise hand back the descriptors.
    pub fn into_result(self, location: &PipelineLocation) -> Result<Vec<RenderedDescriptor>> {
        if self.failures.is_empty() {
            Ok(self.rendered)
        } else {
            Err(Error::render_batch_failed(self.failures, location.clone()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    root: PathBuf,
}

impl TemplateRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Templates from `template_path` inside a checkout at `<work_dir>/<repo_name>`.
    pub fn in_repository(work_dir: &Path, repo_name: &str, template_path: &str) -> Self {
        Self::new(work_dir.join(repo_name).join(template_path))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn template_path(&self, config_name: &str, container: &str) -> PathBuf {
        self.root.join(descriptor_file_name(config_name, container))
    }

    /// Read, substitute and parse a template without applying secrets.
    pub fn render_text(
        &self,
        config_name: &str,
        container: &str,
        variables: &VariableSet,
        location: &PipelineLocation,
    ) -> Result<Value> {
        let path = self.template_path(config_name, container);
        let template = path.display().to_string();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::template_not_found(template, location.clone()));
            }
            Err(e) => {
                return Err(Error::internal_io(e.to_string(), Some(format!("read {}", template))))
            }
        };

        let rendered = substitute(&text, variables)
            .map_err(|names| Error::template_undefined_variable(&template, names, location.clone()))?;

        serde_json::from_str(&rendered)
            .map_err(|e| Error::template_malformed_output(&template, e.to_string(), location.clone()))
    }

    /// Render one container and apply its secrets, failing on leftover sentinels.
    pub fn render_container(
        &self,
        config_name: &str,
        container: &str,
        job: &RenderJob,
        location: &PipelineLocation,
    ) -> Result<Value> {
        let location = PipelineLocation {
            container: Some(container.to_string()),
            ..location.clone()
        };
        let mut descriptor = self.render_text(config_name, container, &job.variables, &location)?;

        if let Some(secret_set) = &job.secrets {
            secrets::substitute(&mut descriptor, secret_set);
        }
        secrets::ensure_resolved(&descriptor, job.secrets.is_some(), &location)?;

        Ok(descriptor)
    }

    /// Render every job, recording failures per container instead of stopping.
    pub fn render_batch<I>(
        &self,
        config_name: &str,
        jobs: I,
        location: &PipelineLocation,
    ) -> RenderBatch
    where
        I: IntoIterator<Item = (String, Result<RenderJob>)>,
    {
        let mut batch = RenderBatch::default();
        for (container, job) in jobs {
            let result =
                job.and_then(|job| self.render_container(config_name, &container, &job, location));
            batch.record(&container, result);
        }
        batch
    }
}

/// Write a descriptor to `<components>/<environment>/<config>-<container>.json`.
pub fn write_descriptor(
    components_dir: &Path,
    environment: &str,
    config_name: &str,
    container: &str,
    descriptor: &Value,
) -> Result<PathBuf> {
    let dir = components_dir.join(environment);
    fs::create_dir_all(&dir).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("create {}", dir.display())))
    })?;
    let path = dir.join(descriptor_file_name(config_name, container));
    let body = serde_json::to_string_pretty(descriptor)
        .map_err(|e| Error::internal_json(e.to_string(), Some(container.to_string())))?;
    fs::write(&path, body).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("write {}", path.display())))
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use serde_json::json;
    use tempfile::tempdir;

    fn vars(value: Value) -> VariableSet {
        let mut set = VariableSet::new();
        if let Value::Object(map) = value {
            set.extend(&map);
        }
        set
    }

    fn job(value: Value) -> RenderJob {
        RenderJob {
            variables: vars(value),
            secrets: None,
        }
    }

    #[test]
    fn substitute_inserts_strings_raw_and_scalars_as_json() {
        let set = vars(json!({"image": "reg/app:v1", "port": 8080, "debug": false, "db": {"host": "h"}}));
        let out = substitute(
            r#"{"image": "{{ image }}", "port": {{port}}, "debug": {{ debug }}, "host": "{{db.host}}"}"#,
            &set,
        )
        .unwrap();
        assert_eq!(
            out,
            r#"{"image": "reg/app:v1", "port": 8080, "debug": false, "host": "h"}"#
        );
    }

    #[test]
    fn substitute_reports_every_undefined_name_once() {
        let err = substitute("{{ a }} {{ b }} {{ a }} {{ c }}", &vars(json!({"c": 1}))).unwrap_err();
        assert_eq!(err, vec!["a", "b"]);
    }

    #[test]
    fn undefined_and_malformed_are_distinct_errors() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cfg-web.json"), r#"{"cpus": {{ cpus }}}"#).unwrap();
        fs::write(dir.path().join("cfg-api.json"), r#"{"cpus": {{ cpus }},}"#).unwrap();
        let renderer = TemplateRenderer::new(dir.path());
        let location = PipelineLocation::default();

        let undefined = renderer
            .render_container("cfg", "web", &job(json!({})), &location)
            .unwrap_err();
        assert_eq!(undefined.code, ErrorCode::TemplateUndefinedVariable);
        assert_eq!(undefined.details["variables"], json!(["cpus"]));

        let malformed = renderer
            .render_container("cfg", "api", &job(json!({"cpus": 1})), &location)
            .unwrap_err();
        assert_eq!(malformed.code, ErrorCode::TemplateMalformedOutput);
        assert_eq!(malformed.details["container"], "api");
    }

    #[test]
    fn secrets_are_applied_after_parsing() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("cfg-web.json"),
            r#"{"id": "/{{ environment }}/web", "env": {"DB_PASSWORD": "SECRET"}}"#,
        )
        .unwrap();
        let renderer = TemplateRenderer::new(dir.path());
        let mut secrets = Map::new();
        secrets.insert("DB_PASSWORD".to_string(), json!("pw"));
        let job = RenderJob {
            variables: vars(json!({"environment": "dev"})),
            secrets: Some(secrets),
        };

        let descriptor = renderer
            .render_container("cfg", "web", &job, &PipelineLocation::default())
            .unwrap();
        assert_eq!(descriptor, json!({"id": "/dev/web", "env": {"DB_PASSWORD": "pw"}}));
    }

    #[test]
    fn sentinel_without_secrets_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cfg-web.json"), r#"{"env": {"TOKEN": "SECRET"}}"#).unwrap();
        let err = TemplateRenderer::new(dir.path())
            .render_container("cfg", "web", &job(json!({})), &PipelineLocation::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SecretNotResolved);
        assert_eq!(err.details["secretsLoaded"], false);
    }

    #[test]
    fn batch_collects_failures_and_keeps_going() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cfg-one.json"), r#"{"id": "one"}"#).unwrap();
        fs::write(dir.path().join("cfg-three.json"), r#"{"id": "three"}"#).unwrap();
        let renderer = TemplateRenderer::new(dir.path());

        let jobs = ["one", "two", "three"]
            .iter()
            .map(|c| (c.to_string(), Ok::<RenderJob, Error>(job(json!({})))));
        let batch = renderer.render_batch("cfg", jobs, &PipelineLocation::default());

        let rendered: Vec<&str> = batch.rendered.iter().map(|r| r.container.as_str()).collect();
        assert_eq!(rendered, vec!["one", "three"]);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].container, "two");
        assert_eq!(batch.failures[0].code, "template.not_found");

        let err = batch.into_result(&PipelineLocation::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RenderBatchFailed);
    }

    #[test]
    fn write_descriptor_uses_environment_subdirectory() {
        let dir = tempdir().unwrap();
        let path = write_descriptor(dir.path(), "dev", "cfg", "web", &json!({"id": "web"})).unwrap();
        assert_eq!(path, dir.path().join("dev").join("cfg-web.json"));
        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["id"], "web");
    }
}
