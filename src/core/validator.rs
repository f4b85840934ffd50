//! Pre-push deployment checks against the routing layer.
//!
//! The routing layer publishes which application id owns each HTTP path
//! prefix and each TCP port. A descriptor collides when it claims a prefix
//! or port registered to a different application id.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EnvironmentConfig;
use crate::error::{ContainerFailure, Error, ErrorCode, PipelineLocation, Result};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingTable {
    /// HTTP path prefix → application id.
    pub paths: HashMap<String, String>,
    /// TCP port → application id.
    pub ports: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RoutingDocument {
    #[serde(rename = "Apps", default)]
    apps: Vec<RoutedApp>,
}

#[derive(Debug, Deserialize)]
struct RoutedApp {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Env", default)]
    env: HashMap<String, Value>,
    #[serde(rename = "TcpPorts", default)]
    tcp_ports: Option<HashMap<String, Value>>,
}

impl RoutingTable {
    /// Build from the routing config document (`{"Apps": [...]}`).
    pub fn from_document(document: &Value) -> Result<Self> {
        let parsed: RoutingDocument = serde_json::from_value(document.clone())
            .map_err(|e| Error::internal_json(e.to_string(), Some("routing config".to_string())))?;

        let mut table = RoutingTable::default();
        for app in parsed.apps {
            if let Some(prefix) = app.env.get("HTTP_PREFIX").and_then(Value::as_str) {
                table.paths.insert(prefix.to_string(), app.id.clone());
            }
            if let Some(ports) = app.tcp_ports {
                for port in ports.into_keys() {
                    table.ports.insert(port, app.id.clone());
                }
            }
        }
        Ok(table)
    }

    /// An empty prefix never collides; a prefix owned by `app_id` is fine.
    pub fn path_conflict(&self, prefix: &str, app_id: &str) -> Option<&str> {
        if prefix.is_empty() {
            return None;
        }
        self.paths
            .get(prefix)
            .map(String::as_str)
            .filter(|owner| *owner != app_id)
    }

    pub fn port_conflict(&self, port: &str, app_id: &str) -> Option<&str> {
        self.ports
            .get(port)
            .map(String::as_str)
            .filter(|owner| *owner != app_id)
    }
}

/// Where the current routing table comes from.
pub trait RoutingSource {
    /// `None` when the environment publishes no routing config.
    fn routing_table(&self, environment: &str, target: &EnvironmentConfig) -> Result<Option<RoutingTable>>;
}

/// Fetches `routing_config_url` over HTTP.
pub struct HttpRoutingSource {
    client: reqwest::blocking::Client,
}

impl HttpRoutingSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("porter/{}", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))?;
        Ok(Self { client })
    }
}

impl RoutingSource for HttpRoutingSource {
    fn routing_table(&self, environment: &str, target: &EnvironmentConfig) -> Result<Option<RoutingTable>> {
        let Some(url) = target.routing_config_url.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(None);
        };
        log_status!("validate", "Fetching routing config for {} from {}", environment, url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::internal_io(e.to_string(), Some(format!("GET {}", url))))?;
        if !response.status().is_success() {
            return Err(Error::internal_io(
                format!("routing config returned HTTP {}", response.status().as_u16()),
                Some(format!("GET {}", url)),
            ));
        }
        let document: Value = response
            .json()
            .map_err(|e| Error::internal_json(e.to_string(), Some(format!("GET {}", url))))?;
        RoutingTable::from_document(&document).map(Some)
    }
}

/// What a container does when its deployment check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Any failing container stops the whole push.
    #[default]
    BlockBatch,
    /// Only failing containers are skipped.
    BlockContainer,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub container: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

/// One routable app declared by a descriptor.
#[derive(Debug, Clone, PartialEq)]
struct DeclaredApp {
    id: String,
    http_prefix: Option<String>,
    tcp_ports: Vec<String>,
}

pub struct DeploymentValidator {
    routing: RoutingTable,
}

impl DeploymentValidator {
    pub fn new(routing: RoutingTable) -> Self {
        Self { routing }
    }

    pub fn check(&self, container: &str, descriptor: &Value) -> CheckReport {
        let mut reasons = Vec::new();

        for app in declared_apps(descriptor) {
            if let Some(prefix) = &app.http_prefix {
                if let Some(owner) = self.routing.path_conflict(prefix, &app.id) {
                    reasons.push(format!(
                        "HTTP_PREFIX '{}' for app '{}' is already used by '{}'",
                        prefix, app.id, owner
                    ));
                }
            }
            for port in &app.tcp_ports {
                if let Some(owner) = self.routing.port_conflict(port, &app.id) {
                    reasons.push(format!(
                        "TCP port {} for app '{}' is already used by '{}'",
                        port, app.id, owner
                    ));
                }
            }
        }

        CheckReport {
            container: container.to_string(),
            passed: reasons.is_empty(),
            reasons,
        }
    }
}

fn declared_apps(descriptor: &Value) -> Vec<DeclaredApp> {
    let mut apps = Vec::new();
    collect_apps(descriptor, &mut apps);
    apps
}

fn collect_apps(node: &Value, apps: &mut Vec<DeclaredApp>) {
    if let Some(groups) = node.get("groups").and_then(Value::as_array) {
        for group in groups {
            collect_apps(group, apps);
        }
    }
    if let Some(children) = node.get("apps").and_then(Value::as_array) {
        for child in children {
            collect_apps(child, apps);
        }
    }
    if node.get("groups").is_some() || node.get("apps").is_some() {
        return;
    }

    let Some(id) = node.get("id").and_then(Value::as_str) else {
        return;
    };
    let env = node.get("env");
    let http_prefix = env
        .and_then(|e| e.get("HTTP_PREFIX"))
        .and_then(Value::as_str)
        .map(str::to_string);
    apps.push(DeclaredApp {
        id: id.to_string(),
        http_prefix,
        tcp_ports: tcp_ports(env.and_then(|e| e.get("TCP_PORTS"))),
    });
}

/// `TCP_PORTS` is a JSON object serialized into a string env value; its keys are ports.
fn tcp_ports(raw: Option<&Value>) -> Vec<String> {
    let parsed = match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => serde_json::from_str::<Value>(s).ok(),
        Some(Value::Object(_)) => raw.cloned(),
        _ => None,
    };
    parsed
        .as_ref()
        .and_then(Value::as_object)
        .map(|ports| ports.keys().cloned().collect())
        .unwrap_or_default()
}

/// Apply the validation policy to a batch of reports.
///
/// Returns the containers to skip. Force-push ignores every failure.
pub fn gate(
    reports: &[CheckReport],
    policy: ValidationPolicy,
    force_push: bool,
    location: &PipelineLocation,
) -> Result<BTreeSet<String>> {
    let failed: Vec<&CheckReport> = reports.iter().filter(|r| !r.passed).collect();
    if failed.is_empty() {
        return Ok(BTreeSet::new());
    }
    if force_push {
        for report in &failed {
            log_status!(
                "validate",
                "Force-pushing {} despite: {}",
                report.container,
                report.reasons.join("; ")
            );
        }
        return Ok(BTreeSet::new());
    }

    match policy {
        ValidationPolicy::BlockBatch => {
            let failures = failed
                .iter()
                .map(|r| ContainerFailure {
                    container: r.container.clone(),
                    code: ErrorCode::DeploymentCheckFailed.as_str().to_string(),
                    message: r.reasons.join("; "),
                    details: serde_json::json!({ "reasons": r.reasons }),
                })
                .collect();
            Err(Error::deployment_check_failed(failures, location.clone()))
        }
        ValidationPolicy::BlockContainer => {
            for report in &failed {
                log_status!(
                    "validate",
                    "Skipping {}: {}",
                    report.container,
                    report.reasons.join("; ")
                );
            }
            Ok(failed.iter().map(|r| r.container.clone()).collect())
        }
    }
}
