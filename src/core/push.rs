//! Descriptor submission and task identifier extraction.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::config::EnvironmentConfig;
use crate::error::{ContainerFailure, Error, PipelineLocation, PushFailedDetails, Result};
use crate::scheduler::{Scheduler, SubmitRequest};
use crate::template::RenderedDescriptor;

/// Join a child id onto its parent path. Absolute child ids stand alone.
fn join_id(parent: &str, child: &str) -> String {
    if child.starts_with('/') || parent.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), child)
    }
}

/// Raw task ids from a `{id, groups: [{id, apps: [{id} | [{id}]]}]}` tree.
///
/// A tree without groups yields its top-level id alone.
pub fn task_ids(tree: &Value) -> Vec<String> {
    let Some(top) = tree.get("id").and_then(Value::as_str) else {
        return Vec::new();
    };
    let Some(groups) = tree.get("groups").and_then(Value::as_array) else {
        return vec![top.to_string()];
    };

    let mut ids = Vec::new();
    for group in groups {
        let group_path = match group.get("id").and_then(Value::as_str) {
            Some(id) => join_id(top, id),
            None => top.to_string(),
        };
        let Some(apps) = group.get("apps").and_then(Value::as_array) else {
            continue;
        };
        for entry in apps {
            let members: Vec<&Value> = match entry {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for app in members {
                if let Some(id) = app.get("id").and_then(Value::as_str) {
                    ids.push(join_id(&group_path, id));
                }
            }
        }
    }
    ids
}

/// Strip one leading `/` and replace the remaining `/` with `_`.
pub fn normalize_task_id(id: &str) -> String {
    id.strip_prefix('/').unwrap_or(id).replace('/', "_")
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub container: String,
    pub status: u16,
    pub task_ids: Vec<String>,
}

/// Per-container outcomes for one application push.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBatch {
    pub pushed: Vec<PushResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ContainerFailure>,
}

impl PushBatch {
    pub fn task_ids(&self) -> Vec<String> {
        self.pushed.iter().flat_map(|r| r.task_ids.clone()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct PushExecutor<'a> {
    scheduler: &'a dyn Scheduler,
    environment: &'a str,
    target: &'a EnvironmentConfig,
    act_as: Option<&'a str>,
}

impl<'a> PushExecutor<'a> {
    pub fn new(
        scheduler: &'a dyn Scheduler,
        environment: &'a str,
        target: &'a EnvironmentConfig,
    ) -> Self {
        Self {
            scheduler,
            environment,
            target,
            act_as: None,
        }
    }

    pub fn act_as(mut self, user: Option<&'a str>) -> Self {
        self.act_as = user;
        self
    }

    /// Submit one descriptor; a non-2xx status is a push failure.
    pub fn push_container(
        &self,
        container: &str,
        descriptor: &Value,
        location: &PipelineLocation,
    ) -> Result<PushResult> {
        let location = PipelineLocation {
            container: Some(container.to_string()),
            environment: Some(self.environment.to_string()),
            ..location.clone()
        };
        let request = SubmitRequest {
            descriptor,
            environment: self.environment,
            target: self.target,
            container,
            act_as: self.act_as,
        };

        let response = self.scheduler.submit(&request).map_err(|e| {
            let cause = e.details["error"].as_str().unwrap_or(&e.message).to_string();
            Error::push_failed(
                format!("Push of {} failed: {}", container, cause),
                PushFailedDetails {
                    location: location.clone(),
                    status: None,
                    body: None,
                    error: Some(cause),
                },
            )
        })?;
        if !response.is_success() {
            return Err(Error::push_failed(
                format!("Scheduler rejected {} with HTTP {}", container, response.status),
                PushFailedDetails {
                    location,
                    status: Some(response.status),
                    body: response.body.as_ref().map(Value::to_string),
                    error: None,
                },
            ));
        }

        // Fall back to the submitted tree when the body carries no id.
        let tree = match &response.body {
            Some(body) if body.get("id").is_some() => body,
            _ => descriptor,
        };
        let task_ids = task_ids(tree)
            .iter()
            .map(|id| normalize_task_id(id))
            .collect();

        log_status!("push", "{} accepted with HTTP {}", container, response.status);
        Ok(PushResult {
            container: container.to_string(),
            status: response.status,
            task_ids,
        })
    }

    /// Push every descriptor not in `skip`, continuing past failures.
    pub fn push_batch(
        &self,
        descriptors: &[RenderedDescriptor],
        skip: &BTreeSet<String>,
        location: &PipelineLocation,
    ) -> PushBatch {
        let mut batch = PushBatch::default();
        for rendered in descriptors {
            if skip.contains(&rendered.container) {
                batch.skipped.push(rendered.container.clone());
                continue;
            }
            match self.push_container(&rendered.container, &rendered.descriptor, location) {
                Ok(result) => batch.pushed.push(result),
                Err(err) => {
                    log_status!("push", "{}", err.message);
                    batch.failures.push(err.into_failure(&rendered.container));
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SubmitResponse;
    use serde_json::json;
    use std::cell::RefCell;

    struct ScriptedScheduler {
        statuses: RefCell<Vec<u16>>,
        calls: RefCell<Vec<(String, Option<String>)>>,
    }

    impl ScriptedScheduler {
        fn new(statuses: &[u16]) -> Self {
            Self {
                statuses: RefCell::new(statuses.iter().rev().copied().collect()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Scheduler for ScriptedScheduler {
        fn submit(&self, request: &SubmitRequest<'_>) -> Result<SubmitResponse> {
            self.calls
                .borrow_mut()
                .push((request.container.to_string(), request.act_as.map(str::to_string)));
            let status = self.statuses.borrow_mut().pop().unwrap_or(500);
            Ok(SubmitResponse {
                status,
                body: if status == 204 { None } else { Some(json!({"message": "x"})) },
            })
        }

        fn current_image(&self, _: &str, _: &EnvironmentConfig, _: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn rendered(container: &str, id: &str) -> RenderedDescriptor {
        RenderedDescriptor {
            container: container.to_string(),
            descriptor: json!({"id": id}),
        }
    }

    #[test]
    fn absolute_app_ids_replace_parent_path() {
        let tree = json!({"id": "/g", "groups": [{"id": "sub", "apps": [{"id": "/g/sub/app1"}]}]});
        let ids: Vec<String> = task_ids(&tree).iter().map(|id| normalize_task_id(id)).collect();
        assert_eq!(ids, vec!["g_sub_app1"]);
    }

    #[test]
    fn relative_ids_are_joined_and_nested_lists_flattened() {
        let tree = json!({"id": "/prod", "groups": [
            {"id": "api", "apps": [{"id": "web"}, [{"id": "worker"}, {"id": "cron"}]]},
            {"id": "/other", "apps": [{"id": "x"}]}
        ]});
        assert_eq!(
            task_ids(&tree),
            vec!["/prod/api/web", "/prod/api/worker", "/prod/api/cron", "/other/x"]
        );
    }

    #[test]
    fn tree_without_groups_yields_top_id() {
        assert_eq!(task_ids(&json!({"id": "/team/web"})), vec!["/team/web"]);
        assert!(task_ids(&json!({"apps": []})).is_empty());
        assert_eq!(normalize_task_id("/team/web"), "team_web");
        assert_eq!(normalize_task_id("team/web"), "team_web");
    }

    #[test]
    fn empty_body_falls_back_to_descriptor_ids() {
        let scheduler = ScriptedScheduler::new(&[204]);
        let target = EnvironmentConfig::default();
        let executor = PushExecutor::new(&scheduler, "dev", &target).act_as(Some("ops"));

        let result = executor
            .push_container("web", &json!({"id": "/team/web"}), &PipelineLocation::default())
            .unwrap();
        assert_eq!(result.task_ids, vec!["team_web"]);
        assert_eq!(scheduler.calls.borrow()[0].1.as_deref(), Some("ops"));
    }

    #[test]
    fn rejection_is_a_push_failure_with_status() {
        let scheduler = ScriptedScheduler::new(&[409]);
        let target = EnvironmentConfig::default();
        let err = PushExecutor::new(&scheduler, "dev", &target)
            .push_container("web", &json!({"id": "/web"}), &PipelineLocation::default())
            .unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::PushFailed);
        assert_eq!(err.details["status"], 409);
        assert_eq!(err.details["container"], "web");
        assert_eq!(err.details["environment"], "dev");
    }

    #[test]
    fn batch_continues_past_failures_and_honours_skips() {
        let scheduler = ScriptedScheduler::new(&[500, 200]);
        let target = EnvironmentConfig::default();
        let executor = PushExecutor::new(&scheduler, "dev", &target);
        let descriptors = vec![rendered("a", "/a"), rendered("b", "/b"), rendered("c", "/c")];
        let skip: BTreeSet<String> = ["b".to_string()].into_iter().collect();

        let batch = executor.push_batch(&descriptors, &skip, &PipelineLocation::default());
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].container, "a");
        assert_eq!(batch.failures[0].details["status"], 500);
        assert_eq!(batch.skipped, vec!["b"]);
        assert_eq!(batch.pushed[0].container, "c");
        assert_eq!(batch.task_ids(), vec!["c"]);
    }
}
