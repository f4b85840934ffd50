use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use serde_json::{json, Map, Value};

use porter::config::{AppsConfig, Settings, ToolEnv};
use porter::notify::{Notifier, SlackWebhook};
use porter::scheduler::MarathonScheduler;
use porter::source::{DockerCliBuilder, DockerCliRegistry, GitCli};
use porter::validator::{HttpRoutingSource, ValidationPolicy};
use porter::Services;

pub type CmdResult<T> = porter::Result<(T, i32)>;

#[derive(Args, Debug, Default)]
pub(crate) struct GlobalArgs {
    /// Root directory for porter.yml, templates, secrets and components
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn settings(&self) -> porter::Result<Settings> {
        let settings = Settings::from_env()?;
        Ok(match &self.config_dir {
            Some(dir) => Settings::rooted_at(dir, settings.user),
            None => settings,
        })
    }
}

/// Flags shared by every command that renders descriptors.
#[derive(Args, Debug, Default)]
pub struct RenderArgs {
    /// Secrets file to use instead of the per-template lookup
    #[arg(long, value_name = "FILE")]
    pub secrets_file: Option<String>,

    /// Template variable override (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Skip only the containers that fail deployment checks
    #[arg(long)]
    pub block_container: bool,

    /// Push even when deployment checks fail
    #[arg(short = 'f', long)]
    pub force_push: bool,
}

impl RenderArgs {
    pub fn overrides(&self) -> porter::Result<Map<String, Value>> {
        parse_overrides(&self.vars)
    }

    pub fn validation(&self) -> ValidationPolicy {
        if self.block_container {
            ValidationPolicy::BlockContainer
        } else {
            ValidationPolicy::BlockBatch
        }
    }
}

/// Loaded configuration for one invocation.
pub(crate) struct Workspace {
    pub settings: Settings,
    pub tool: ToolEnv,
    pub config: AppsConfig,
}

impl Workspace {
    pub fn load(global: &GlobalArgs, config_file: &str) -> porter::Result<Self> {
        let settings = global.settings()?;
        let tool = ToolEnv::load(&settings)?;
        let config = AppsConfig::load(&settings, config_file)?;
        Ok(Self {
            settings,
            tool,
            config,
        })
    }
}

/// Default collaborators: docker, git, Marathon, routing config and webhook.
pub(crate) struct DefaultServices {
    registry: DockerCliRegistry,
    source: GitCli,
    builder: DockerCliBuilder,
    scheduler: MarathonScheduler,
    routing: HttpRoutingSource,
    notifier: Option<SlackWebhook>,
}

impl DefaultServices {
    pub fn new(tool: &ToolEnv) -> porter::Result<Self> {
        let mut scheduler = MarathonScheduler::new()?;
        if let Some(header) = tool.act_as_header.as_deref().filter(|h| !h.is_empty()) {
            scheduler = scheduler.with_act_as_header(header);
        }
        Ok(Self {
            registry: DockerCliRegistry,
            source: GitCli,
            builder: DockerCliBuilder,
            scheduler,
            routing: HttpRoutingSource::new()?,
            notifier: SlackWebhook::from_settings(tool.notifications.as_ref()),
        })
    }

    pub fn services(&self) -> Services<'_> {
        Services {
            registry: &self.registry,
            source: &self.source,
            builder: &self.builder,
            scheduler: &self.scheduler,
            routing: &self.routing,
            notifier: self.notifier.as_ref().map(|n| n as &dyn Notifier),
        }
    }
}

/// Parse `KEY=VALUE` overrides into a JSON object.
fn parse_overrides(vars: &[String]) -> porter::Result<Map<String, Value>> {
    let mut obj = Map::new();
    for var in vars {
        let Some((key, value)) = var.split_once('=') else {
            return Err(porter::Error::validation_invalid_argument(
                "var",
                format!("Expected KEY=VALUE, got '{}'", var),
                None,
                None,
            ));
        };
        obj.insert(key.trim().to_string(), parse_value(value));
    }
    Ok(obj)
}

/// Parse repeated `--build-arg KEY=VALUE` flags. Later keys win.
pub(crate) fn parse_build_args(args: &[String]) -> porter::Result<BTreeMap<String, String>> {
    let mut parsed = BTreeMap::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=').filter(|(k, _)| !k.trim().is_empty()) else {
            return Err(porter::Error::validation_invalid_argument(
                "build-arg",
                format!("Expected KEY=VALUE, got '{}'", arg),
                None,
                None,
            ));
        };
        parsed.insert(key.trim().to_string(), value.to_string());
    }
    Ok(parsed)
}

/// Parse a string value into appropriate JSON type.
/// Order: JSON literal → bool → number → string
fn parse_value(s: &str) -> Value {
    if let Ok(v) = serde_json::from_str(s) {
        return v;
    }
    if s == "true" {
        return json!(true);
    }
    if s == "false" {
        return json!(false);
    }
    if let Ok(n) = s.parse::<i64>() {
        return json!(n);
    }
    if let Ok(n) = s.parse::<f64>() {
        return json!(n);
    }
    json!(s)
}

pub mod deploy;
pub mod promote;
pub mod push;
pub mod version;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (porter::Result<serde_json::Value>, i32) {
    crate::tty::status("porter is working...");

    match command {
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Push(args) => dispatch!(args, global, push),
        crate::Commands::Promote(args) => dispatch!(args, global, promote),
        crate::Commands::Version(args) => dispatch!(args, global, version),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_parse_typed_values() {
        let vars = vec![
            "replicas=3".to_string(),
            "debug=true".to_string(),
            "name=kairos".to_string(),
            "ports=[80,443]".to_string(),
        ];
        let parsed = parse_overrides(&vars).unwrap();
        assert_eq!(parsed["replicas"], json!(3));
        assert_eq!(parsed["debug"], json!(true));
        assert_eq!(parsed["name"], json!("kairos"));
        assert_eq!(parsed["ports"], json!([80, 443]));
    }

    #[test]
    fn override_without_equals_is_rejected() {
        assert!(parse_overrides(&["replicas".to_string()]).is_err());
    }

    #[test]
    fn build_args_keep_values_as_strings() {
        let parsed = parse_build_args(&[
            "WORKERS=2".to_string(),
            "OPTS=--a=b".to_string(),
            "WORKERS=4".to_string(),
        ])
        .unwrap();
        assert_eq!(parsed["WORKERS"], "4");
        assert_eq!(parsed["OPTS"], "--a=b");
        assert!(parse_build_args(&["=x".to_string()]).is_err());
    }
}
