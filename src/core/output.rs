//! Report types returned by pipeline operations.
//!
//! These are what the CLI serializes into the response envelope.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::context::{PhaseTiming, Release};
use crate::error::{Error, PipelineLocation, Result};
use crate::push::PushBatch;
use crate::validator::CheckReport;

/// Result of pushing one application to one environment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub application: String,
    pub environment: String,
    /// Full image path handed to templates as `image`.
    pub image: String,
    /// `<components>/<environment>`
    pub output_dir: PathBuf,
    pub descriptors: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckReport>,
    /// `None` when pushing was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushBatch>,
}

impl PushReport {
    pub fn task_ids(&self) -> Vec<String> {
        self.push.as_ref().map(PushBatch::task_ids).unwrap_or_default()
    }

    /// Fail when any container of the batch was not accepted.
    pub fn into_result(self, location: &PipelineLocation) -> Result<Self> {
        if let Some(batch) = self.push.as_ref().filter(|b| !b.is_success()) {
            return Err(Error::push_batch_failed(batch, location.clone()));
        }
        Ok(self)
    }
}

/// Outcome for a single item in a bulk operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome<T: Serialize> {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(flatten)]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl From<&Error> for ItemError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

impl<T: Serialize> ItemOutcome<T> {
    pub fn succeeded(id: impl Into<String>, result: T) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, err: &Error) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(ItemError::from(err)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of bulk operation results.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BulkSummary {
    pub fn of<T: Serialize>(items: &[ItemOutcome<T>]) -> Self {
        let succeeded = items.iter().filter(|i| i.is_success()).count();
        Self {
            total: items.len(),
            succeeded,
            failed: items.len() - succeeded,
        }
    }
}

/// One application's deploy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDeployment {
    pub release: Release,
    pub push: PushReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub identifier: String,
    pub environment: String,
    pub applications: Vec<ItemOutcome<AppDeployment>>,
    pub summary: BulkSummary,
    pub timings: Vec<PhaseTiming>,
    pub task_ids: Vec<String>,
    pub elapsed_seconds: i64,
}

impl DeployReport {
    pub fn is_success(&self) -> bool {
        self.summary.failed == 0
    }
}

/// One container moved between environments.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotedContainer {
    pub container: String,
    pub image: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteReport {
    pub application: String,
    pub from: String,
    pub to: String,
    pub promoted: Vec<PromotedContainer>,
    pub task_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn summary_counts_failures() {
        let err = Error::new(ErrorCode::BuildFailed, "docker build failed", serde_json::json!({}));
        let items = vec![
            ItemOutcome::succeeded("api", 1),
            ItemOutcome::failed("web", &err),
        ];
        let summary = BulkSummary::of(&items);
        assert_eq!((summary.total, summary.succeeded, summary.failed), (2, 1, 1));
    }

    #[test]
    fn failed_item_serializes_code() {
        let err = Error::new(ErrorCode::BuildFailed, "docker build failed", serde_json::json!({}));
        let item: ItemOutcome<PromotedContainer> = ItemOutcome::failed("web", &err);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["error"]["code"], "build.failed");
        assert_eq!(json["id"], "web");
        assert!(json["error"]["details"].is_object());
    }
}
