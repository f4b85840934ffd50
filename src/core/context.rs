//! Request-scoped release state threaded through one pipeline invocation.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha224};

use crate::hooks::Phase;

/// `<unix-seconds>-<first 8 hex chars of sha224("<config>-<user>-<app>")>`.
pub fn release_identifier(config: &str, user: &str, application: &str, at: DateTime<Utc>) -> String {
    let digest = Sha224::digest(format!("{}-{}-{}", config, user, application).as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", at.timestamp(), &hex[..8])
}

/// What is being released. Fixed once the version is resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub application: String,
    pub environment: String,
    pub branch: String,
    pub repository: String,
    /// `<config>-<app>-<revision>/vX.Y.Z`
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTiming {
    pub application: String,
    pub phase: Phase,
    pub millis: u128,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseContext {
    pub identifier: String,
    pub user: String,
    pub started_at: DateTime<Utc>,
    pub timings: Vec<PhaseTiming>,
    pub task_ids: Vec<String>,
}

impl ReleaseContext {
    pub fn new(config: &str, user: &str, selector: &str) -> Self {
        let started_at = Utc::now();
        Self {
            identifier: release_identifier(config, user, selector, started_at),
            user: user.to_string(),
            started_at,
            timings: Vec::new(),
            task_ids: Vec::new(),
        }
    }

    /// Run `f`, recording how long it took under `phase`.
    pub fn time<T>(&mut self, application: &str, phase: Phase, f: impl FnOnce() -> T) -> (T, Duration) {
        let start = Instant::now();
        let value = f();
        let elapsed = start.elapsed();
        self.timings.push(PhaseTiming {
            application: application.to_string(),
            phase,
            millis: elapsed.as_millis(),
        });
        (value, elapsed)
    }

    pub fn record_task_ids(&mut self, ids: impl IntoIterator<Item = String>) {
        self.task_ids.extend(ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn identifier_is_timestamp_and_short_digest() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let id = release_identifier("content", "alice", "kairos", at);
        let (ts, hash) = id.split_once('-').unwrap();
        assert_eq!(ts, "1700000000");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, release_identifier("content", "alice", "kairos", at));
        assert_ne!(id, release_identifier("content", "bob", "kairos", at));
    }

    #[test]
    fn time_records_phase() {
        let mut ctx = ReleaseContext::new("content", "alice", "kairos");
        let (value, _) = ctx.time("kairos", Phase::Push, || 7);
        assert_eq!(value, 7);
        assert_eq!(ctx.timings.len(), 1);
        assert_eq!(ctx.timings[0].phase, Phase::Push);
    }
}
