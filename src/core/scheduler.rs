//! Cluster scheduler client seam.

use std::time::Duration;

use serde_json::Value;

use crate::config::EnvironmentConfig;
use crate::error::{Error, Result};

pub const DEFAULT_ACT_AS_HEADER: &str = "X-Act-As-User";

/// One descriptor submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmitRequest<'a> {
    pub descriptor: &'a Value,
    pub environment: &'a str,
    pub target: &'a EnvironmentConfig,
    pub container: &'a str,
    pub act_as: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResponse {
    pub status: u16,
    /// `None` for empty bodies (e.g. 204).
    pub body: Option<Value>,
}

impl SubmitResponse {
    pub fn is_success(&self) -> bool {
        self.status / 100 == 2
    }
}

pub trait Scheduler {
    fn submit(&self, request: &SubmitRequest<'_>) -> Result<SubmitResponse>;

    /// Image currently deployed for `app_id`, if any.
    fn current_image(
        &self,
        environment: &str,
        target: &EnvironmentConfig,
        app_id: &str,
    ) -> Result<Option<String>>;
}

/// Marathon-style REST scheduler.
pub struct MarathonScheduler {
    client: reqwest::blocking::Client,
    act_as_header: String,
}

impl MarathonScheduler {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("porter/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))?;
        Ok(Self {
            client,
            act_as_header: DEFAULT_ACT_AS_HEADER.to_string(),
        })
    }

    pub fn with_act_as_header(mut self, header: impl Into<String>) -> Self {
        self.act_as_header = header.into();
        self
    }

    fn endpoint(base: &str, descriptor: &Value) -> Result<String> {
        let base = base.trim_end_matches('/');
        if descriptor.get("groups").is_some() {
            return Ok(format!("{}/v2/groups?force=true", base));
        }
        let id = descriptor
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation_invalid_argument("id", "Descriptor has no 'id'", None, None))?;
        Ok(format!("{}/v2/apps/{}?force=true", base, id.trim_start_matches('/')))
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
        target: &EnvironmentConfig,
    ) -> reqwest::blocking::RequestBuilder {
        match target.credentials_env.as_ref().and_then(|c| c.resolve()) {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }
}

impl Scheduler for MarathonScheduler {
    fn submit(&self, request: &SubmitRequest<'_>) -> Result<SubmitResponse> {
        let url = Self::endpoint(&request.target.scheduler_url, request.descriptor)?;
        log_status!("push", "PUT {} ({} on {})", url, request.container, request.environment);

        let mut builder = self.client.put(&url).json(request.descriptor);
        if let Some(user) = request.act_as.filter(|u| !u.is_empty()) {
            builder = builder.header(self.act_as_header.as_str(), user);
        }
        let response = self
            .authorize(builder, request.target)
            .send()
            .map_err(|e| Error::internal_io(e.to_string(), Some(format!("PUT {}", url))))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| Error::internal_io(e.to_string(), Some(format!("read response of {}", url))))?;
        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        };
        Ok(SubmitResponse { status, body })
    }

    fn current_image(
        &self,
        environment: &str,
        target: &EnvironmentConfig,
        app_id: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/v2/apps/{}",
            target.scheduler_url.trim_end_matches('/'),
            app_id.trim_start_matches('/')
        );
        log_status!("push", "Looking up deployed image of {} on {}", app_id, environment);

        let response = self
            .authorize(self.client.get(&url), target)
            .send()
            .map_err(|e| Error::internal_io(e.to_string(), Some(format!("GET {}", url))))?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::internal_io(
                format!("scheduler returned HTTP {}", response.status().as_u16()),
                Some(format!("GET {}", url)),
            ));
        }
        let body: Value = response
            .json()
            .map_err(|e| Error::internal_json(e.to_string(), Some(format!("GET {}", url))))?;
        Ok(deployed_image(&body))
    }
}

/// `app.container.docker.image` of an app lookup response.
pub fn deployed_image(body: &Value) -> Option<String> {
    body.pointer("/app/container/docker/image")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_class_decides_success() {
        assert!(SubmitResponse { status: 201, body: None }.is_success());
        assert!(SubmitResponse { status: 204, body: None }.is_success());
        assert!(!SubmitResponse { status: 409, body: None }.is_success());
        assert!(!SubmitResponse { status: 302, body: None }.is_success());
    }

    #[test]
    fn groups_and_apps_use_different_endpoints() {
        let group = json!({"id": "/g", "groups": []});
        let app = json!({"id": "/team/web"});
        assert_eq!(
            MarathonScheduler::endpoint("http://m:8080/", &group).unwrap(),
            "http://m:8080/v2/groups?force=true"
        );
        assert_eq!(
            MarathonScheduler::endpoint("http://m:8080", &app).unwrap(),
            "http://m:8080/v2/apps/team/web?force=true"
        );
        assert!(MarathonScheduler::endpoint("http://m", &json!({})).is_err());
    }

    #[test]
    fn deployed_image_reads_docker_image() {
        let body = json!({"app": {"container": {"docker": {"image": "reg/cfg-web-abc/v1.2.0"}}}});
        assert_eq!(deployed_image(&body).as_deref(), Some("reg/cfg-web-abc/v1.2.0"));
        assert_eq!(deployed_image(&json!({"app": {}})), None);
    }
}
