//! Chat notifications for completed pipeline phases.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::WebhookSettings;
use crate::error::{Error, Result};
use crate::hooks::{Phase, Stage};

const ALL: &str = "all";

/// Declared interest of an application: which channels hear about which
/// commands in which environments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationRule {
    #[serde(default)]
    pub channels: BTreeSet<String>,
    #[serde(default, alias = "envs")]
    pub environments: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    All,
    Only(BTreeSet<String>),
}

impl Interest {
    /// `None` for an empty declaration. `"all"` only counts as the sole element.
    fn from_values(values: &[String]) -> Option<Self> {
        match values {
            [] => None,
            [only] if only == ALL => Some(Interest::All),
            _ => Some(Interest::Only(values.iter().cloned().collect())),
        }
    }

    fn accepts(&self, candidates: &[&str]) -> bool {
        match self {
            Interest::All => true,
            Interest::Only(set) => candidates.iter().any(|c| set.contains(*c)),
        }
    }
}

/// Names a rule may use for a phase. `pull` is the documented name for gitpull.
fn command_names(phase: Phase) -> &'static [&'static str] {
    match phase {
        Phase::GitPull => &["pull", "gitpull"],
        Phase::Build => &["build"],
        Phase::Push => &["push"],
    }
}

fn command_name(phase: Phase) -> &'static str {
    command_names(phase)[0]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// A pipeline step that just happened.
#[derive(Debug, Clone)]
pub struct Action<'a> {
    pub stage: Stage,
    pub phase: Phase,
    pub application: &'a str,
    pub environment: &'a str,
    pub user: &'a str,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

impl Action<'_> {
    pub fn message(&self) -> String {
        let verb = match self.outcome {
            Outcome::Success => "Completed",
            Outcome::Failure => "Failed",
        };
        format!(
            "{} *{}* of *{}* on *{}* in *{}* milliseconds (triggered by *{}*)",
            verb,
            command_name(self.phase),
            self.application,
            self.environment,
            self.elapsed.as_millis(),
            self.user
        )
    }
}

impl NotificationRule {
    /// Post-phase actions only, with matching environment and command.
    pub fn matches(&self, action: &Action<'_>) -> bool {
        if action.stage != Stage::Post || self.channels.is_empty() {
            return false;
        }
        let (Some(environments), Some(commands)) = (
            Interest::from_values(&self.environments),
            Interest::from_values(&self.commands),
        ) else {
            return false;
        };
        environments.accepts(&[action.environment]) && commands.accepts(command_names(action.phase))
    }
}

/// Delivers one text message to one channel.
pub trait Notifier {
    fn post(&self, channel: &str, text: &str) -> Result<()>;
}

/// Incoming-webhook chat notifier.
pub struct SlackWebhook {
    url: String,
    username: String,
    icon_emoji: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    username: &'a str,
    icon_emoji: &'a str,
    text: &'a str,
}

impl SlackWebhook {
    /// `None` when the webhook URL or username is missing.
    pub fn from_settings(settings: Option<&WebhookSettings>) -> Option<Self> {
        let settings = settings?;
        if settings.webhook_url.trim().is_empty() || settings.username.trim().is_empty() {
            return None;
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            url: settings.webhook_url.clone(),
            username: settings.username.clone(),
            icon_emoji: settings.icon_emoji.clone(),
            client,
        })
    }
}

impl Notifier for SlackWebhook {
    fn post(&self, channel: &str, text: &str) -> Result<()> {
        let payload = WebhookPayload {
            channel,
            username: &self.username,
            icon_emoji: &self.icon_emoji,
            text,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .map_err(|e| Error::notification_failed(channel, e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::notification_failed(
                channel,
                format!("webhook returned HTTP {}", response.status().as_u16()),
            ));
        }
        Ok(())
    }
}

pub struct NotificationDispatcher<'a> {
    notifier: Option<&'a dyn Notifier>,
}

impl<'a> NotificationDispatcher<'a> {
    pub fn new(notifier: Option<&'a dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Send one message per channel when `rule` matches. Returns the channels
    /// that were delivered to; delivery errors are logged, not returned.
    pub fn dispatch(&self, rule: Option<&NotificationRule>, action: &Action<'_>) -> Vec<String> {
        let Some(rule) = rule else {
            return Vec::new();
        };
        if !rule.matches(action) {
            return Vec::new();
        }
        let Some(notifier) = self.notifier else {
            return Vec::new();
        };

        let channels: BTreeSet<String> = rule
            .channels
            .iter()
            .map(|c| {
                if c.starts_with('#') {
                    c.clone()
                } else {
                    format!("#{}", c)
                }
            })
            .collect();

        let text = action.message();
        let mut delivered = Vec::new();
        for channel in channels {
            match notifier.post(&channel, &text) {
                Ok(()) => delivered.push(channel),
                Err(err) => log_status!("notify", "{}: {}", channel, err.details["error"]),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        sent: RefCell<Vec<(String, String)>>,
        fail_on: Option<String>,
    }

    impl Notifier for Recorder {
        fn post(&self, channel: &str, text: &str) -> Result<()> {
            if self.fail_on.as_deref() == Some(channel) {
                return Err(Error::notification_failed(channel, "boom"));
            }
            self.sent.borrow_mut().push((channel.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn rule(channels: &[&str], environments: &[&str], commands: &[&str]) -> NotificationRule {
        NotificationRule {
            channels: channels.iter().map(|s| s.to_string()).collect(),
            environments: environments.iter().map(|s| s.to_string()).collect(),
            commands: commands.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn action(stage: Stage, phase: Phase, environment: &'static str) -> Action<'static> {
        Action {
            stage,
            phase,
            application: "kairos",
            environment,
            user: "alice",
            elapsed: Duration::from_millis(1500),
            outcome: Outcome::Success,
        }
    }

    #[test]
    fn all_environments_match_any_environment() {
        let r = rule(&["deploys"], &["all"], &["push"]);
        for env in ["dev", "stage", "prod"] {
            assert!(r.matches(&action(Stage::Post, Phase::Push, env)));
        }
    }

    #[test]
    fn command_filter_is_respected() {
        let r = rule(&["deploys"], &["all"], &["pull"]);
        assert!(!r.matches(&action(Stage::Post, Phase::Build, "dev")));
        assert!(r.matches(&action(Stage::Post, Phase::GitPull, "dev")));
        assert!(rule(&["c"], &["dev"], &["all"]).matches(&action(Stage::Post, Phase::Build, "dev")));
    }

    #[test]
    fn pre_actions_and_empty_sets_never_match() {
        let r = rule(&["deploys"], &["all"], &["all"]);
        assert!(!r.matches(&action(Stage::Pre, Phase::Push, "dev")));
        assert!(!rule(&[], &["all"], &["all"]).matches(&action(Stage::Post, Phase::Push, "dev")));
        assert!(!rule(&["c"], &[], &["all"]).matches(&action(Stage::Post, Phase::Push, "dev")));
        assert!(!rule(&["c"], &["dev"], &["push"]).matches(&action(Stage::Post, Phase::Push, "prod")));
    }

    #[test]
    fn all_mixed_with_names_is_literal() {
        let r = rule(&["c"], &["all", "dev"], &["push"]);
        assert!(r.matches(&action(Stage::Post, Phase::Push, "dev")));
        assert!(!r.matches(&action(Stage::Post, Phase::Push, "prod")));
    }

    #[test]
    fn dispatch_sends_once_per_channel() {
        let recorder = Recorder::default();
        let dispatcher = NotificationDispatcher::new(Some(&recorder));
        let r = rule(&["deploys", "#ops", "deploys"], &["dev"], &["push"]);

        let delivered = dispatcher.dispatch(Some(&r), &action(Stage::Post, Phase::Push, "dev"));
        assert_eq!(delivered, vec!["#deploys", "#ops"]);
        let sent = recorder.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0].1,
            "Completed *push* of *kairos* on *dev* in *1500* milliseconds (triggered by *alice*)"
        );
    }

    #[test]
    fn missing_rule_and_delivery_errors_are_silent() {
        let recorder = Recorder {
            fail_on: Some("#ops".to_string()),
            ..Default::default()
        };
        let dispatcher = NotificationDispatcher::new(Some(&recorder));
        assert!(dispatcher
            .dispatch(None, &action(Stage::Post, Phase::Push, "dev"))
            .is_empty());

        let r = rule(&["ops", "deploys"], &["dev"], &["push"]);
        let delivered = dispatcher.dispatch(Some(&r), &action(Stage::Post, Phase::Push, "dev"));
        assert_eq!(delivered, vec!["#deploys"]);
    }

    #[test]
    fn rule_accepts_envs_alias() {
        let r: NotificationRule =
            serde_json::from_str(r#"{"channels": ["c"], "envs": ["all"], "commands": ["build"]}"#).unwrap();
        assert_eq!(r.environments, vec!["all"]);
    }

    #[test]
    fn webhook_needs_url_and_username() {
        assert!(SlackWebhook::from_settings(None).is_none());
        let partial = WebhookSettings {
            webhook_url: "https://hooks.example/x".to_string(),
            ..Default::default()
        };
        assert!(SlackWebhook::from_settings(Some(&partial)).is_none());
    }
}
