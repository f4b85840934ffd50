//! Layered template variables.
//!
//! Layers are applied lowest precedence first, each overwriting same-named
//! keys from the layers before it:
//!
//! 1. `environment` and `image`
//! 2. config-wide `vars`, then application `vars` (each `global`, then `environment.<env>`)
//! 3. container `vars`, scoped the same way
//! 4. extra variables loaded from the application's `extra_variables_path`
//! 5. secrets
//! 6. caller overrides

use serde::Serialize;
use serde_json::{Map, Value};

/// Resolved variables for one container render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VariableSet(Map<String, Value>);

impl VariableSet {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Overlay every key of `layer`.
    pub fn extend(&mut self, layer: &Map<String, Value>) {
        for (key, value) in layer {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Dotted lookup (`db.host`) through nested mappings.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.0.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Inputs to a single resolution.
#[derive(Debug, Clone, Default)]
pub struct VariableSources<'a> {
    pub environment: &'a str,
    pub image: &'a str,
    pub config_vars: Option<&'a Value>,
    pub app_vars: Option<&'a Value>,
    pub container_vars: Option<&'a Value>,
    pub extra: Option<&'a Value>,
    pub secrets: Option<&'a Map<String, Value>>,
    pub overrides: Option<&'a Map<String, Value>>,
}

pub fn resolve(sources: &VariableSources<'_>) -> VariableSet {
    let mut set = VariableSet::new();
    set.insert("environment", Value::String(sources.environment.to_string()));
    set.insert("image", Value::String(sources.image.to_string()));

    for declared in [sources.config_vars, sources.app_vars, sources.container_vars]
        .into_iter()
        .flatten()
    {
        apply_scoped(&mut set, declared, sources.environment);
    }

    if let Some(extra) = sources.extra {
        match extra.as_object() {
            Some(map) => set.extend(map),
            None => log_status!("render", "Extra variables are not a mapping, skipping"),
        }
    }
    if let Some(secrets) = sources.secrets {
        set.extend(secrets);
    }
    if let Some(overrides) = sources.overrides {
        set.extend(overrides);
    }
    set
}

/// Apply `{global: {...}, environment: {<env>: {...}}}`; non-mapping scopes are skipped.
fn apply_scoped(set: &mut VariableSet, declared: &Value, environment: &str) {
    let Some(declared) = declared.as_object() else {
        log_status!("render", "Variable block is not a mapping, skipping");
        return;
    };

    if let Some(global) = declared.get("global") {
        overlay(set, global, "global");
    }
    if let Some(scoped) = declared
        .get("environment")
        .and_then(Value::as_object)
        .and_then(|envs| envs.get(environment))
    {
        overlay(set, scoped, environment);
    }
}

fn overlay(set: &mut VariableSet, scope: &Value, name: &str) {
    match scope {
        Value::Object(map) => set.extend(map),
        Value::Null => {}
        _ => log_status!("render", "Variable scope '{}' is not a mapping, skipping", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn base_variables_are_present() {
        let set = resolve(&VariableSources {
            environment: "dev",
            image: "registry/app-web-abc/v1.0.0",
            ..Default::default()
        });
        assert_eq!(set.get("environment"), Some(&json!("dev")));
        assert_eq!(set.get("image"), Some(&json!("registry/app-web-abc/v1.0.0")));
    }

    #[test]
    fn environment_scope_beats_global_scope() {
        let container = json!({
            "global": {"replicas": 1, "mem": 256},
            "environment": {"prod": {"replicas": 5}}
        });
        let set = resolve(&VariableSources {
            environment: "prod",
            container_vars: Some(&container),
            ..Default::default()
        });
        assert_eq!(set.get("replicas"), Some(&json!(5)));
        assert_eq!(set.get("mem"), Some(&json!(256)));
    }

    #[test]
    fn layers_apply_in_precedence_order() {
        let config = json!({"global": {"a": "config", "b": "config", "c": "config"}});
        let app = json!({"global": {"b": "app"}, "environment": {"dev": {"c": "app-dev"}}});
        let container = json!({"global": {"c": "container", "d": "container"}});
        let extra = json!({"d": "extra", "e": "extra"});
        let secrets = map(json!({"e": "secret", "f": "secret"}));
        let overrides = map(json!({"f": "override"}));

        let set = resolve(&VariableSources {
            environment: "dev",
            image: "img",
            config_vars: Some(&config),
            app_vars: Some(&app),
            container_vars: Some(&container),
            extra: Some(&extra),
            secrets: Some(&secrets),
            overrides: Some(&overrides),
        });

        assert_eq!(set.get("a"), Some(&json!("config")));
        assert_eq!(set.get("b"), Some(&json!("app")));
        assert_eq!(set.get("c"), Some(&json!("container")));
        assert_eq!(set.get("d"), Some(&json!("extra")));
        assert_eq!(set.get("e"), Some(&json!("secret")));
        assert_eq!(set.get("f"), Some(&json!("override")));
    }

    #[test]
    fn override_wins_over_secret() {
        let secrets = map(json!({"db_password": "from-vault"}));
        let overrides = map(json!({"db_password": "from-cli"}));
        let set = resolve(&VariableSources {
            environment: "dev",
            secrets: Some(&secrets),
            overrides: Some(&overrides),
            ..Default::default()
        });
        assert_eq!(set.get("db_password"), Some(&json!("from-cli")));
    }

    #[test]
    fn malformed_scopes_are_skipped() {
        let app = json!({"global": ["not", "a", "map"], "environment": {"dev": {"ok": true}}});
        let config = json!("just a string");
        let set = resolve(&VariableSources {
            environment: "dev",
            config_vars: Some(&config),
            app_vars: Some(&app),
            ..Default::default()
        });
        assert_eq!(set.get("ok"), Some(&json!(true)));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn dotted_lookup_walks_mappings() {
        let mut set = VariableSet::new();
        set.insert("db", json!({"host": "db.internal", "port": 5432}));
        assert_eq!(set.lookup("db.port"), Some(&json!(5432)));
        assert_eq!(set.lookup("db.user"), None);
        assert_eq!(set.lookup("db.port.x"), None);
    }
}
