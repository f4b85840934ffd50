use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::push::PushBatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidDocument,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    EnvironmentNotFound,
    ApplicationNotFound,
    ContainerNotFound,

    RegistryQueryFailed,

    TemplateNotFound,
    TemplateUndefinedVariable,
    TemplateMalformedOutput,
    RenderBatchFailed,

    SecretLoadFailed,
    SecretNotResolved,

    DeploymentCheckFailed,

    PushFailed,
    PushBatchFailed,
    PromoteFailed,

    HookFailed,
    NotificationFailed,

    SourceCommandFailed,
    BuildFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidDocument => "config.invalid_document",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::EnvironmentNotFound => "environment.not_found",
            ErrorCode::ApplicationNotFound => "application.not_found",
            ErrorCode::ContainerNotFound => "container.not_found",

            ErrorCode::RegistryQueryFailed => "registry.query_failed",

            ErrorCode::TemplateNotFound => "template.not_found",
            ErrorCode::TemplateUndefinedVariable => "template.undefined_variable",
            ErrorCode::TemplateMalformedOutput => "template.malformed_output",
            ErrorCode::RenderBatchFailed => "render.batch_failed",

            ErrorCode::SecretLoadFailed => "secret.load_failed",
            ErrorCode::SecretNotResolved => "secret.not_resolved",

            ErrorCode::DeploymentCheckFailed => "validate.deployment_check_failed",

            ErrorCode::PushFailed => "push.failed",
            ErrorCode::PushBatchFailed => "push.batch_failed",
            ErrorCode::PromoteFailed => "promote.failed",

            ErrorCode::HookFailed => "hook.failed",
            ErrorCode::NotificationFailed => "notify.failed",

            ErrorCode::SourceCommandFailed => "source.command_failed",
            ErrorCode::BuildFailed => "build.failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Configuration errors abort the whole invocation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConfigMissingKey
                | ErrorCode::ConfigInvalidDocument
                | ErrorCode::ConfigInvalidValue
                | ErrorCode::EnvironmentNotFound
                | ErrorCode::ApplicationNotFound
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

/// Where in the pipeline an error happened.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidDocumentDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDetails {
    pub template: String,
    #[serde(flatten)]
    pub location: PipelineLocation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretNotResolvedDetails {
    #[serde(flatten)]
    pub location: PipelineLocation,
    pub paths: Vec<String>,
    pub secrets_loaded: bool,
}

/// One failed container in a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerFailure {
    pub container: String,
    pub code: String,
    pub message: String,
    /// Details of the underlying error.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailedDetails {
    #[serde(flatten)]
    pub location: PipelineLocation,
    pub failures: Vec<ContainerFailure>,
}

/// A push batch with at least one failure. Containers that were accepted
/// are reported alongside the failures.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBatchFailedDetails<'a> {
    #[serde(flatten)]
    pub location: PipelineLocation,
    #[serde(flatten)]
    pub batch: &'a PushBatch,
    pub task_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushFailedDetails {
    #[serde(flatten)]
    pub location: PipelineLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookFailedDetails {
    pub hook: String,
    pub command: String,
    pub working_dir: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            to_details(ConfigMissingKeyDetails { key, path }),
        )
    }

    pub fn config_invalid_document(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigInvalidDocument,
            format!("Unable to parse document {}", path),
            to_details(ConfigInvalidDocumentDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value: {}", problem),
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem,
            }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            problem.clone(),
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem,
                id,
                tried,
            }),
        )
    }

    pub fn environment_not_found(id: impl Into<String>, available: Vec<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::EnvironmentNotFound,
            format!("Environment '{}' is not defined in porter.yml", id),
            to_details(NotFoundDetails { id, available }),
        )
        .with_hint("Pass --env or set PORTER_ENV to one of the configured environments")
    }

    pub fn application_not_found(id: impl Into<String>, available: Vec<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::ApplicationNotFound,
            format!("Application '{}' not found in config", id),
            to_details(NotFoundDetails { id, available }),
        )
    }

    pub fn container_not_found(id: impl Into<String>, available: Vec<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::ContainerNotFound,
            format!("Container '{}' is not configured for this application", id),
            to_details(NotFoundDetails { id, available }),
        )
    }

    pub fn registry_query_failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::RegistryQueryFailed,
            "Registry query failed",
            to_details(CommandFailedDetails {
                command: command.into(),
                error: error.into(),
                context: None,
            }),
        )
    }

    pub fn template_not_found(template: impl Into<String>, location: PipelineLocation) -> Self {
        let template = template.into();
        Self::new(
            ErrorCode::TemplateNotFound,
            format!("The template file {} does not exist", template),
            to_details(TemplateDetails {
                template,
                location,
                variables: Vec::new(),
                error: None,
            }),
        )
    }

    pub fn template_undefined_variable(
        template: impl Into<String>,
        variables: Vec<String>,
        location: PipelineLocation,
    ) -> Self {
        Self::new(
            ErrorCode::TemplateUndefinedVariable,
            format!("Undefined template variable(s): {}", variables.join(", ")),
            to_details(TemplateDetails {
                template: template.into(),
                location,
                variables,
                error: None,
            }),
        )
    }

    pub fn template_malformed_output(
        template: impl Into<String>,
        error: impl Into<String>,
        location: PipelineLocation,
    ) -> Self {
        let template = template.into();
        let error = error.into();
        Self::new(
            ErrorCode::TemplateMalformedOutput,
            format!("Rendered output of {} is not valid JSON: {}", template, error),
            to_details(TemplateDetails {
                template,
                location,
                variables: Vec::new(),
                error: Some(error),
            }),
        )
    }

    pub fn secret_load_failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::SecretLoadFailed,
            format!("Error while loading secrets from {}", path),
            to_details(ConfigInvalidDocumentDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn secret_not_resolved(
        paths: Vec<String>,
        secrets_loaded: bool,
        location: PipelineLocation,
    ) -> Self {
        let err = Self::new(
            ErrorCode::SecretNotResolved,
            "Found the \"SECRET\" placeholder in the rendered descriptor",
            to_details(SecretNotResolvedDetails {
                location,
                paths,
                secrets_loaded,
            }),
        );
        if secrets_loaded {
            err.with_hint("Add the missing keys to the secrets file for this container")
        } else {
            err.with_hint("No secrets file was found; pass --secrets-file or add one under the secrets directory")
        }
    }

    pub fn render_batch_failed(failures: Vec<ContainerFailure>, location: PipelineLocation) -> Self {
        let names: Vec<&str> = failures.iter().map(|f| f.container.as_str()).collect();
        Self::new(
            ErrorCode::RenderBatchFailed,
            format!("Unable to render template for container(s): {}", names.join(", ")),
            to_details(BatchFailedDetails { location, failures }),
        )
    }

    pub fn deployment_check_failed(
        failures: Vec<ContainerFailure>,
        location: PipelineLocation,
    ) -> Self {
        Self::new(
            ErrorCode::DeploymentCheckFailed,
            "Deployment checks failed for one or more containers",
            to_details(BatchFailedDetails { location, failures }),
        )
        .with_hint("Fix the reported collisions, or pass --force-push to push anyway")
    }

    pub fn push_failed(message: impl Into<String>, details: PushFailedDetails) -> Self {
        let mut err = Self::new(ErrorCode::PushFailed, message, to_details(details));
        err.retryable = Some(true);
        err
    }

    pub fn push_batch_failed(batch: &PushBatch, location: PipelineLocation) -> Self {
        let names: Vec<&str> = batch.failures.iter().map(|f| f.container.as_str()).collect();
        Self::new(
            ErrorCode::PushBatchFailed,
            format!(
                "Push failed for container(s): {} ({} pushed)",
                names.join(", "),
                batch.pushed.len()
            ),
            to_details(PushBatchFailedDetails {
                location,
                batch,
                task_ids: batch.task_ids(),
            }),
        )
    }

    pub fn promote_failed(failures: Vec<ContainerFailure>, location: PipelineLocation) -> Self {
        let names: Vec<&str> = failures.iter().map(|f| f.container.as_str()).collect();
        Self::new(
            ErrorCode::PromoteFailed,
            format!("Images that failed to promote: {}", names.join(", ")),
            to_details(BatchFailedDetails { location, failures }),
        )
    }

    pub fn hook_failed(details: HookFailedDetails) -> Self {
        let message = format!("{} hook failed", details.hook);
        Self::new(ErrorCode::HookFailed, message, to_details(details))
    }

    pub fn notification_failed(channel: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::NotificationFailed,
            "Notification delivery failed",
            serde_json::json!({ "channel": channel.into(), "error": error.into() }),
        )
    }

    pub fn source_command_failed(
        command: impl Into<String>,
        error: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        Self::new(
            ErrorCode::SourceCommandFailed,
            "Source control command failed",
            to_details(CommandFailedDetails {
                command: command.into(),
                error: error.into(),
                context,
            }),
        )
    }

    pub fn build_failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::BuildFailed,
            "Image build failed",
            to_details(CommandFailedDetails {
                command: command.into(),
                error: error.into(),
                context: None,
            }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalJsonErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Attach pipeline location fields to the details object.
    ///
    /// Existing fields win so callers deeper in the stack keep their context.
    pub fn at(mut self, location: &PipelineLocation) -> Self {
        let extra = to_details(location);
        if let (Value::Object(details), Value::Object(extra)) = (&mut self.details, extra) {
            for (key, value) in extra {
                details.entry(key).or_insert(value);
            }
        }
        self
    }

    /// Flatten into a per-container failure record.
    pub fn into_failure(self, container: impl Into<String>) -> ContainerFailure {
        ContainerFailure {
            container: container.into(),
            code: self.code.as_str().to_string(),
            message: self.message,
            details: self.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_as_dotted_strings() {
        assert_eq!(ErrorCode::SecretNotResolved.as_str(), "secret.not_resolved");
        assert_eq!(
            ErrorCode::TemplateUndefinedVariable.as_str(),
            "template.undefined_variable"
        );
    }

    #[test]
    fn at_adds_location_without_overwriting() {
        let err = Error::template_not_found(
            "/t/app-web.json",
            PipelineLocation {
                container: Some("web".to_string()),
                ..Default::default()
            },
        )
        .at(&PipelineLocation {
            phase: Some("push".to_string()),
            container: Some("other".to_string()),
            ..Default::default()
        });

        assert_eq!(err.details["container"], "web");
        assert_eq!(err.details["phase"], "push");
    }

    #[test]
    fn render_batch_failed_names_every_container() {
        let failures = vec![
            Error::internal_unexpected("x").into_failure("api"),
            Error::internal_unexpected("y").into_failure("worker"),
        ];
        let err = Error::render_batch_failed(failures, PipelineLocation::default());
        assert!(err.message.contains("api, worker"));
        assert_eq!(err.details["failures"].as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn container_failure_keeps_the_cause() {
        let failure = Error::internal_io("connection reset", Some("GET http://routing".to_string()))
            .into_failure("web");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["container"], "web");
        assert_eq!(json["details"]["error"], "connection reset");
    }

    #[test]
    fn environment_not_found_is_configuration_error() {
        let err = Error::environment_not_found("qa", vec!["dev".to_string()]);
        assert!(err.code.is_configuration());
        assert!(!err.hints.is_empty());
    }
}
