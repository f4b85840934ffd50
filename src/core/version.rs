//! Next image version resolution from registry tags.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

/// `(major, minor, patch)` plus the source revision it was built from.
///
/// Ordering and equality look at the numeric triple only.
#[derive(Debug, Clone, Serialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: String,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64, revision: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: revision.into(),
        }
    }

    pub fn initial(revision: impl Into<String>) -> Self {
        Self::new(0, 1, 0, revision)
    }

    /// Parse the `X.Y.Z` part that follows the last `/v` of a tag.
    ///
    /// Missing components default to 0; any non-numeric component rejects
    /// the whole tag.
    pub fn parse_suffix(tag: &str) -> Option<Self> {
        let (revision, suffix) = tag.rsplit_once("/v")?;
        let parts: Vec<&str> = suffix.split('.').collect();
        if parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
        {
            return None;
        }
        let component = |i: usize| -> Option<u64> {
            match parts.get(i) {
                Some(p) => p.parse().ok(),
                None => Some(0),
            }
        };
        Some(Self::new(
            component(0)?,
            component(1)?,
            component(2)?,
            revision.rsplit('-').next().unwrap_or(revision),
        ))
    }

    pub fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }

    /// Next version under `policy`. A component already at `u64::MAX` cannot
    /// be bumped.
    pub fn bump(&self, policy: BumpPolicy, revision: impl Into<String>) -> Result<Self> {
        let bumped = match policy {
            BumpPolicy::Major => self.major.checked_add(1).map(|major| (major, 0, 0)),
            BumpPolicy::Patch => self.patch.checked_add(1).map(|patch| (self.major, self.minor, patch)),
            BumpPolicy::Minor => self.minor.checked_add(1).map(|minor| (self.major, minor, 0)),
        };
        let (major, minor, patch) = bumped.ok_or_else(|| {
            Error::validation_invalid_argument(
                "version",
                format!("Version {}.{}.{} cannot take a {:?} bump", self.major, self.minor, self.patch, policy),
                Some(self.to_string()),
                None,
            )
        })?;
        Ok(Self::new(major, minor, patch, revision))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.triple() == other.triple()
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.triple().cmp(&other.triple())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/v{}.{}.{}",
            self.revision, self.major, self.minor, self.patch
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BumpPolicy {
    Major,
    Patch,
    #[default]
    Minor,
}

impl BumpPolicy {
    /// Major wins over patch; neither flag means a minor bump.
    pub fn from_flags(major: bool, patch: bool) -> Self {
        if major {
            BumpPolicy::Major
        } else if patch {
            BumpPolicy::Patch
        } else {
            BumpPolicy::Minor
        }
    }
}

/// Versions of build candidates among registry lines for `<config>-<app>`.
///
/// Each line's first whitespace-separated token is the image name. Images
/// whose infix names a deployment environment were promoted, not built, and
/// are skipped.
pub fn candidates(
    lines: &[String],
    config: &str,
    app: &str,
    environments: &[String],
) -> Result<Vec<Version>> {
    let pattern = format!(
        "^{}-{}-.*/v.*",
        regex::escape(config),
        regex::escape(app)
    );
    let re = Regex::new(&pattern).map_err(|e| {
        Error::validation_invalid_argument("app", e.to_string(), Some(app.to_string()), None)
    })?;

    let mut found = Vec::new();
    for line in lines {
        let Some(image) = line.split_whitespace().next() else {
            continue;
        };
        if !re.is_match(image) {
            continue;
        }
        let promoted = environments
            .iter()
            .any(|env| image.starts_with(&format!("{}-{}-{}", config, app, env)));
        if promoted {
            continue;
        }
        if let Some(version) = Version::parse_suffix(image) {
            found.push(version);
        }
    }
    Ok(found)
}

/// Stable max: the first of several equal maxima is kept.
pub fn latest(versions: &[Version]) -> Option<&Version> {
    versions.iter().fold(None, |best, v| match best {
        Some(b) if v > b => Some(v),
        Some(b) => Some(b),
        None => Some(v),
    })
}

/// Resolve the next version to build for `<config>-<app>` at `revision`.
pub fn next_version(
    tags: &[String],
    config: &str,
    app: &str,
    environments: &[String],
    revision: &str,
    policy: BumpPolicy,
) -> Result<Version> {
    let found = candidates(tags, config, app, environments)?;
    match latest(&found) {
        Some(current) => {
            let next = current.bump(policy, revision)?;
            log_status!("version", "Latest {}.{}.{}, next {}", current.major, current.minor, current.patch, next);
            Ok(next)
        }
        None => {
            let initial = Version::initial(revision);
            log_status!("version", "No version in the registry, starting at {}", initial);
            Ok(initial)
        }
    }
}

/// Image name for a version: `<config>-<app>-<revision>/vX.Y.Z`.
pub fn image_name(config: &str, app: &str, version: &Version) -> String {
    format!("{}-{}-{}", config, app, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    fn envs() -> Vec<String> {
        lines(&["dev", "stage", "prod"])
    }

    #[test]
    fn default_bump_is_next_minor() {
        let tags = lines(&["app-0-sha1/v1.2.0", "app-0-sha1/v1.3.0"]);
        let next = next_version(&tags, "app", "0", &envs(), "sha1", BumpPolicy::Minor).unwrap();
        assert_eq!(next.to_string(), "sha1/v1.4.0");
        assert_eq!(image_name("app", "0", &next), "app-0-sha1/v1.4.0");
    }

    #[test]
    fn major_and_patch_bumps() {
        let tags = lines(&["cfg-web-abc/v2.5.7"]);
        let major = next_version(&tags, "cfg", "web", &envs(), "def", BumpPolicy::Major).unwrap();
        let patch = next_version(&tags, "cfg", "web", &envs(), "def", BumpPolicy::Patch).unwrap();
        assert_eq!(major.to_string(), "def/v3.0.0");
        assert_eq!(patch.to_string(), "def/v2.5.8");
    }

    #[test]
    fn bump_past_u64_max_is_an_error() {
        let tags = lines(&["cfg-web-a/v18446744073709551615.0.0"]);
        let err = next_version(&tags, "cfg", "web", &envs(), "b", BumpPolicy::Major).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationInvalidArgument);
        assert_eq!(err.details["field"], "version");

        let next = next_version(&tags, "cfg", "web", &envs(), "b", BumpPolicy::Patch).unwrap();
        assert_eq!(next.to_string(), "b/v18446744073709551615.0.1");
    }

    #[test]
    fn major_flag_takes_precedence() {
        assert_eq!(BumpPolicy::from_flags(true, true), BumpPolicy::Major);
        assert_eq!(BumpPolicy::from_flags(false, true), BumpPolicy::Patch);
        assert_eq!(BumpPolicy::from_flags(false, false), BumpPolicy::Minor);
    }

    #[test]
    fn empty_registry_yields_initial_version() {
        let next = next_version(&[], "cfg", "web", &envs(), "abc123", BumpPolicy::Major).unwrap();
        assert_eq!(next.to_string(), "abc123/v0.1.0");
    }

    #[test]
    fn malformed_suffixes_are_skipped() {
        let tags = lines(&[
            "cfg-web-a/v1.9.0",
            "cfg-web-b/v1.10.beta",
            "cfg-web-c/v9.x",
            "cfg-web-d/v1.2.3",
        ]);
        let next = next_version(&tags, "cfg", "web", &envs(), "z", BumpPolicy::Minor).unwrap();
        assert_eq!(next.to_string(), "z/v1.10.0");
    }

    #[test]
    fn promoted_and_foreign_images_are_ignored() {
        let tags = lines(&[
            "cfg-web-prod-abc/v7.0.0   Official image   0",
            "cfg-webby-abc/v8.0.0",
            "other-web-abc/v9.0.0",
            "cfg-web-abc/v1.0.0    description",
        ]);
        let found = candidates(&tags, "cfg", "web", &envs()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].triple(), (1, 0, 0));
    }

    #[test]
    fn missing_components_default_to_zero() {
        let v = Version::parse_suffix("cfg-web-abc/v3").unwrap();
        assert_eq!(v.triple(), (3, 0, 0));
        let v = Version::parse_suffix("cfg-web-abc/v3.4").unwrap();
        assert_eq!(v.triple(), (3, 4, 0));
        assert!(Version::parse_suffix("cfg-web-abc").is_none());
    }

    #[test]
    fn ordering_ignores_revision() {
        let a = Version::new(1, 2, 3, "aaa");
        let b = Version::new(1, 2, 3, "bbb");
        assert_eq!(a, b);
        assert!(Version::new(1, 2, 9, "x") < Version::new(1, 3, 0, "x"));
        assert!(Version::new(1, 9, 9, "x") < Version::new(2, 0, 0, "x"));
    }

    #[test]
    fn stable_max_keeps_first_of_equal_maxima() {
        let versions = vec![
            Version::new(1, 0, 0, "first"),
            Version::new(1, 0, 0, "second"),
            Version::new(0, 9, 0, "third"),
        ];
        assert_eq!(latest(&versions).map(|v| v.revision.as_str()), Some("first"));
    }
}
