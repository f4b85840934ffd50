//! Application selector parsing.
//!
//! Deploy: `all`, `app`, `app1:app2`, `app[c1,c2]`, `app1[c1]:app2`.
//! Push: `app` or `app:c1,c2`.

use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSelection {
    pub application: String,
    /// Empty means every configured container.
    pub containers: Vec<String>,
}

impl AppSelection {
    pub fn whole(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            containers: Vec::new(),
        }
    }
}

fn split_containers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(selector: &str, problem: &str) -> Error {
    Error::validation_invalid_argument("application", problem, Some(selector.to_string()), None)
}

/// Parse a deploy selector; `all` expands to `configured` in order.
pub fn parse_deploy(selector: &str, configured: &[String]) -> Result<Vec<AppSelection>> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(invalid(selector, "Application selector is empty"));
    }
    if selector == "all" {
        return Ok(configured.iter().map(AppSelection::whole).collect());
    }

    let mut selections = Vec::new();
    for item in selector.split(':').map(str::trim) {
        if item.is_empty() {
            return Err(invalid(selector, "Empty application name in selector"));
        }
        match item.split_once('[') {
            Some((name, rest)) => {
                let Some(list) = rest.strip_suffix(']') else {
                    return Err(invalid(selector, "Unclosed '[' in selector"));
                };
                if name.trim().is_empty() {
                    return Err(invalid(selector, "Empty application name in selector"));
                }
                selections.push(AppSelection {
                    application: name.trim().to_string(),
                    containers: split_containers(list),
                });
            }
            None => selections.push(AppSelection::whole(item)),
        }
    }
    Ok(selections)
}

/// Parse a push selector: `app` or `app:c1,c2`.
pub fn parse_push(selector: &str) -> Result<AppSelection> {
    let selector = selector.trim();
    let (name, containers) = match selector.split_once(':') {
        Some((name, list)) => (name.trim(), split_containers(list)),
        None => (selector, Vec::new()),
    };
    if name.is_empty() {
        return Err(invalid(selector, "Application selector is empty"));
    }
    Ok(AppSelection {
        application: name.to_string(),
        containers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_expands_to_configured_apps() {
        let parsed = parse_deploy("all", &names(&["api", "web"])).unwrap();
        assert_eq!(parsed, vec![AppSelection::whole("api"), AppSelection::whole("web")]);
    }

    #[test]
    fn colon_separates_apps_and_brackets_pick_containers() {
        let parsed = parse_deploy("api[web,worker]:cron", &[]).unwrap();
        assert_eq!(
            parsed,
            vec![
                AppSelection {
                    application: "api".to_string(),
                    containers: names(&["web", "worker"]),
                },
                AppSelection::whole("cron"),
            ]
        );
    }

    #[test]
    fn malformed_deploy_selectors_are_rejected() {
        assert!(parse_deploy("", &[]).is_err());
        assert!(parse_deploy("api[web", &[]).is_err());
        assert!(parse_deploy("api::web", &[]).is_err());
        assert!(parse_deploy("[web]", &[]).is_err());
    }

    #[test]
    fn push_selector_lists_containers_after_colon() {
        assert_eq!(
            parse_push("api:web,worker").unwrap().containers,
            names(&["web", "worker"])
        );
        assert_eq!(parse_push("api").unwrap(), AppSelection::whole("api"));
        assert!(parse_push(":web").is_err());
    }
}
