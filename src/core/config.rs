//! Configuration model: tool environment, application configs, settings.
//!
//! Parsing is a thin serde layer over [`crate::document`]; everything here is
//! plain data plus lookups that turn absent entries into configuration errors.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document;
use crate::error::{Error, Result};
use crate::notify::NotificationRule;
use crate::paths;

pub const USER_ENV: &str = "PORTER_USER";
pub const ENVIRONMENT_ENV: &str = "PORTER_ENV";

/// Directories and identity for one invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub config_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub secrets_dir: PathBuf,
    pub components_dir: PathBuf,
    pub user: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let user = env::var(USER_ENV)
            .or_else(|_| env::var("USER"))
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            config_dir: paths::porter()?,
            templates_dir: paths::templates()?,
            secrets_dir: paths::secrets()?,
            components_dir: paths::components()?,
            user,
        })
    }

    /// Settings rooted at a single directory (used by tests and `--config-dir`).
    pub fn rooted_at(root: &Path, user: impl Into<String>) -> Self {
        Self {
            config_dir: root.to_path_buf(),
            templates_dir: root.join("templates"),
            secrets_dir: root.join("secrets"),
            components_dir: root.join("components"),
            user: user.into(),
        }
    }
}

/// `porter.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolEnv {
    #[serde(default)]
    pub registry: Option<String>,
    #[serde(default)]
    pub default_environment: Option<String>,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    #[serde(default)]
    pub notifications: Option<WebhookSettings>,
    #[serde(default)]
    pub default_repo_prefix: Option<String>,
    /// Header carrying the act-as identity on scheduler requests.
    #[serde(default)]
    pub act_as_header: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub scheduler_url: String,
    #[serde(default)]
    pub routing_config_url: Option<String>,
    #[serde(default)]
    pub credentials_env: Option<CredentialsEnv>,
}

/// Names of the environment variables holding scheduler credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsEnv {
    pub user_env: String,
    pub password_env: String,
}

impl CredentialsEnv {
    pub fn resolve(&self) -> Option<(String, String)> {
        let user = env::var(&self.user_env).ok()?;
        let password = env::var(&self.password_env).ok()?;
        Some((user, password))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookSettings {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub default_channel: String,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_emoji")]
    pub icon_emoji: String,
}

fn default_emoji() -> String {
    ":rocket:".to_string()
}

impl ToolEnv {
    pub fn load(settings: &Settings) -> Result<Self> {
        let yml = settings.config_dir.join("porter.yml");
        let path = if yml.exists() {
            yml
        } else {
            settings.config_dir.join("porter.json")
        };
        if !path.exists() {
            return Err(Error::config_missing_key(
                "porter.yml",
                Some(settings.config_dir.display().to_string()),
            ));
        }
        document::load(&path)
    }

    pub fn registry(&self) -> Result<&str> {
        self.registry
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::config_missing_key("registry", Some("porter.yml".to_string())))
    }

    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }

    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.environments
            .get(name)
            .ok_or_else(|| Error::environment_not_found(name, self.environment_names()))
    }

    /// Explicit argument, then non-blank `PORTER_ENV`, then `default_environment`.
    pub fn resolve_environment(&self, explicit: Option<&str>) -> Result<String> {
        let from_env = env::var(ENVIRONMENT_ENV).ok();
        let name = select_environment(explicit, from_env.as_deref(), self.default_environment.as_deref());
        match name {
            Some(name) => {
                self.environment(&name)?;
                Ok(name)
            }
            None => Err(Error::config_missing_key(
                "default_environment",
                Some("porter.yml".to_string()),
            )),
        }
    }
}

fn select_environment(
    explicit: Option<&str>,
    from_env: Option<&str>,
    default: Option<&str>,
) -> Option<String> {
    if let Some(name) = explicit {
        return Some(name.to_string());
    }
    match from_env.map(str::trim) {
        Some(name) if !name.is_empty() => Some(name.to_string()),
        Some(_) => {
            log_status!("config", "PORTER_ENV is blank, using default_environment");
            default.map(str::to_string)
        }
        None => default.map(str::to_string),
    }
}

/// One application config file (`content.yml`, `kwe.json`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppsConfig {
    pub name: String,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default, rename = "act-as", alias = "act_as")]
    pub act_as: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub vars: Option<Value>,
    #[serde(default)]
    pub apps: BTreeMap<String, AppConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub vars: Option<Value>,
    #[serde(default)]
    pub hooks: HashMap<String, String>,
    #[serde(default)]
    pub notifications: Option<NotificationRule>,
    #[serde(default)]
    pub template_path: Option<String>,
    #[serde(default)]
    pub extra_variables_path: Option<String>,
    /// Dockerfile directory relative to the repository root.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub build_filename: Option<String>,
    #[serde(default, rename = "build-args", alias = "build_args")]
    pub build_args: Option<BuildArgs>,
}

/// Docker build args per environment: `build-args.environment.<env>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildArgs {
    #[serde(default)]
    pub environment: BTreeMap<String, BTreeMap<String, Value>>,
}

impl AppsConfig {
    /// Load an app config; relative paths resolve against the config dir.
    pub fn load(settings: &Settings, config_file: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(config_file).to_string();
        let path = if Path::new(&expanded).is_absolute() {
            PathBuf::from(expanded)
        } else {
            settings.config_dir.join(expanded)
        };
        if !path.is_file() {
            return Err(Error::config_invalid_value(
                "config_file",
                Some(path.display().to_string()),
                format!("Config filepath '{}' is not a readable file", path.display()),
            ));
        }
        let config: AppsConfig = document::load(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (app_name, app) in &self.apps {
            let mut seen = HashSet::new();
            for container in &app.containers {
                if !seen.insert(container.name()) {
                    return Err(Error::config_invalid_value(
                        format!("apps.{}.containers", app_name),
                        Some(container.name().to_string()),
                        format!(
                            "container '{}' is declared twice in application '{}'",
                            container.name(),
                            app_name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn app(&self, name: &str) -> Result<&AppConfig> {
        self.apps
            .get(name)
            .ok_or_else(|| Error::application_not_found(name, self.apps.keys().cloned().collect()))
    }

    /// Application repo, falling back to the config-wide repo, then the app name.
    pub fn repo_for(&self, app_name: &str, app: &AppConfig) -> String {
        app.repo
            .clone()
            .or_else(|| self.repo.clone().filter(|r| !r.is_empty()))
            .unwrap_or_else(|| app_name.to_string())
    }

    /// Identity the scheduler should act as; `owner` wins over `act-as`.
    pub fn act_as(&self) -> Option<&str> {
        self.owner.as_deref().or(self.act_as.as_deref())
    }
}

impl AppConfig {
    /// Build args for `environment`, with `overrides` winning on equal keys.
    pub fn build_args_for(
        &self,
        environment: &str,
        overrides: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut args: BTreeMap<String, String> = self
            .build_args
            .as_ref()
            .and_then(|b| b.environment.get(environment))
            .map(|vars| {
                vars.iter()
                    .map(|(key, value)| {
                        let value = match value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (key.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();
        args.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        args
    }

    pub fn container_names(&self) -> Vec<String> {
        self.containers.iter().map(|c| c.name().to_string()).collect()
    }

    /// Containers to process, in declaration order, optionally restricted to `requested`.
    pub fn select_containers(&self, requested: &[String]) -> Result<Vec<&Container>> {
        if requested.is_empty() {
            return Ok(self.containers.iter().collect());
        }
        let configured = self.container_names();
        for name in requested {
            if !configured.contains(name) {
                return Err(Error::container_not_found(name, configured));
            }
        }
        Ok(self
            .containers
            .iter()
            .filter(|c| requested.iter().any(|r| r == c.name()))
            .collect())
    }
}

/// A container entry: either a bare name or a single-key mapping of name to overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContainer", into = "RawContainer")]
pub enum Container {
    Named(String),
    WithOverrides(String, Map<String, Value>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawContainer {
    Name(String),
    Mapping(Map<String, Value>),
}

impl TryFrom<RawContainer> for Container {
    type Error = String;

    fn try_from(raw: RawContainer) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawContainer::Name(name) => Ok(Container::Named(name)),
            RawContainer::Mapping(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "container mapping must have exactly one key, found {}",
                        map.len()
                    ));
                }
                let Some((name, overrides)) = map.into_iter().next() else {
                    return Err("empty container mapping".to_string());
                };
                match overrides {
                    Value::Object(overrides) => Ok(Container::WithOverrides(name, overrides)),
                    Value::Null => Ok(Container::Named(name)),
                    other => Err(format!(
                        "container '{}' overrides must be a mapping, found {}",
                        name, other
                    )),
                }
            }
        }
    }
}

impl From<Container> for RawContainer {
    fn from(container: Container) -> Self {
        match container {
            Container::Named(name) => RawContainer::Name(name),
            Container::WithOverrides(name, overrides) => {
                let mut map = Map::new();
                map.insert(name, Value::Object(overrides));
                RawContainer::Mapping(map)
            }
        }
    }
}

impl Container {
    pub fn name(&self) -> &str {
        match self {
            Container::Named(name) | Container::WithOverrides(name, _) => name,
        }
    }

    pub fn vars(&self) -> Option<&Value> {
        match self {
            Container::Named(_) => None,
            Container::WithOverrides(_, overrides) => overrides.get("vars"),
        }
    }

    /// `<config-name>-<container>.json`, shared by templates, secrets and output.
    pub fn descriptor_file_name(&self, config_name: &str) -> String {
        descriptor_file_name(config_name, self.name())
    }
}

pub fn descriptor_file_name(config_name: &str, container: &str) -> String {
    format!("{}-{}.json", config_name, container)
}
