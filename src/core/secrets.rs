//! Secret loading and `"SECRET"` sentinel substitution.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::document;
use crate::error::{Error, PipelineLocation, Result};

/// Placeholder value that must be replaced from the secret set before push.
pub const SENTINEL: &str = "SECRET";

/// Locates and loads secrets documents under one secrets directory.
#[derive(Debug, Clone)]
pub struct SecretVault {
    root: PathBuf,
    explicit: Option<String>,
}

impl SecretVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            explicit: None,
        }
    }

    /// Use a specific file. Absolute paths are used as-is; relative ones
    /// replace the template file name in the usual search.
    pub fn with_explicit_file(mut self, file: Option<String>) -> Self {
        self.explicit = file.filter(|f| !f.trim().is_empty());
        self
    }

    /// Candidate paths in search order.
    pub fn locate(&self, environment: &str, template_name: &str) -> Vec<PathBuf> {
        let file_name = self.explicit.as_deref().unwrap_or(template_name);
        if Path::new(file_name).is_absolute() {
            return vec![PathBuf::from(file_name)];
        }
        vec![
            self.root.join(file_name),
            self.root.join(environment).join(file_name),
        ]
    }

    /// First document found in the search order, or `None` when no path has one.
    ///
    /// A file that exists but does not parse as a mapping is an error.
    pub fn load(&self, environment: &str, template_name: &str) -> Result<Option<Map<String, Value>>> {
        for path in self.locate(environment, template_name) {
            let loaded = document::load_optional(&path).map_err(|e| {
                let cause = e.details["error"].as_str().unwrap_or(&e.message).to_string();
                Error::secret_load_failed(path.display().to_string(), cause)
            })?;
            match loaded {
                Some(Value::Object(secrets)) => {
                    log_status!("render", "Loaded secrets from {}", path.display());
                    return Ok(Some(secrets));
                }
                Some(Value::Null) => return Ok(Some(Map::new())),
                Some(_) => {
                    return Err(Error::secret_load_failed(
                        path.display().to_string(),
                        "secrets document must be a key/value mapping",
                    ))
                }
                None => continue,
            }
        }
        log_status!("render", "No secrets file found for {}", template_name);
        Ok(None)
    }
}

/// Replace every mapping value equal to the sentinel whose key is in `secrets`.
///
/// Walks nested mappings and sequences.
pub fn substitute(value: &mut Value, secrets: &Map<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if field.as_str() == Some(SENTINEL) {
                    if let Some(secret) = secrets.get(key) {
                        *field = secret.clone();
                        continue;
                    }
                }
                substitute(field, secrets);
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute(item, secrets);
            }
        }
        _ => {}
    }
}

/// JSON-pointer paths where the sentinel still appears, as a key or a string value.
pub fn remaining_sentinels(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_sentinels(value, String::new(), &mut found);
    found
}

fn collect_sentinels(value: &Value, path: String, found: &mut Vec<String>) {
    match value {
        Value::String(s) if s == SENTINEL => found.push(if path.is_empty() {
            "/".to_string()
        } else {
            path
        }),
        Value::Object(map) => {
            for (key, field) in map {
                let child = format!("{}/{}", path, escape_pointer(key));
                if key == SENTINEL {
                    found.push(child.clone());
                }
                collect_sentinels(field, child, found);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_sentinels(item, format!("{}/{}", path, i), found);
            }
        }
        _ => {}
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Fail closed when any sentinel survived substitution.
pub fn ensure_resolved(
    value: &Value,
    secrets_loaded: bool,
    location: &PipelineLocation,
) -> Result<()> {
    let paths = remaining_sentinels(value);
    if paths.is_empty() {
        Ok(())
    } else {
        Err(Error::secret_not_resolved(paths, secrets_loaded, location.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn secrets(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn locate_searches_root_then_environment() {
        let vault = SecretVault::new("/s");
        assert_eq!(
            vault.locate("dev", "cfg-web.json"),
            vec![PathBuf::from("/s/cfg-web.json"), PathBuf::from("/s/dev/cfg-web.json")]
        );
    }

    #[test]
    fn explicit_absolute_file_short_circuits() {
        let vault = SecretVault::new("/s").with_explicit_file(Some("/etc/x.yml".to_string()));
        assert_eq!(vault.locate("dev", "cfg-web.json"), vec![PathBuf::from("/etc/x.yml")]);

        let vault = SecretVault::new("/s").with_explicit_file(Some("x.yml".to_string()));
        assert_eq!(vault.locate("dev", "cfg-web.json")[1], PathBuf::from("/s/dev/x.yml"));
    }

    #[test]
    fn load_falls_back_to_environment_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dev")).unwrap();
        fs::write(dir.path().join("dev/cfg-web.json"), r#"{"db_password": "hunter2"}"#).unwrap();

        let vault = SecretVault::new(dir.path());
        let loaded = vault.load("dev", "cfg-web.json").unwrap().unwrap();
        assert_eq!(loaded["db_password"], "hunter2");
        assert!(vault.load("prod", "cfg-web.json").unwrap().is_none());
    }

    #[test]
    fn yaml_secrets_are_loaded_by_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("web.yml"), "token: abc\n").unwrap();
        let vault = SecretVault::new(dir.path()).with_explicit_file(Some("web.yml".to_string()));
        let loaded = vault.load("dev", "cfg-web.json").unwrap().unwrap();
        assert_eq!(loaded["token"], "abc");
    }

    #[test]
    fn unparsable_secrets_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cfg-web.json"), "{broken").unwrap();
        let err = SecretVault::new(dir.path()).load("dev", "cfg-web.json").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::SecretLoadFailed);
    }

    #[test]
    fn substitute_walks_maps_and_sequences() {
        let mut descriptor = json!({
            "env": {"DB_PASSWORD": "SECRET", "PLAIN": "x"},
            "containers": [{"API_KEY": "SECRET"}, "SECRET"]
        });
        let vault = secrets(json!({"DB_PASSWORD": "pw", "API_KEY": "key"}));
        substitute(&mut descriptor, &vault);

        assert_eq!(descriptor["env"]["DB_PASSWORD"], "pw");
        assert_eq!(descriptor["env"]["PLAIN"], "x");
        assert_eq!(descriptor["containers"][0]["API_KEY"], "key");
        // bare sequence elements have no key to match
        assert_eq!(descriptor["containers"][1], "SECRET");
    }

    #[test]
    fn unresolved_sentinel_fails_closed() {
        let mut descriptor = json!({"env": {"DB_PASSWORD": "SECRET", "TOKEN": "SECRET"}});
        substitute(&mut descriptor, &secrets(json!({"TOKEN": "t"})));

        let location = PipelineLocation {
            container: Some("web".to_string()),
            ..Default::default()
        };
        let err = ensure_resolved(&descriptor, true, &location).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::SecretNotResolved);
        assert_eq!(err.details["paths"], json!(["/env/DB_PASSWORD"]));
        assert_eq!(err.details["container"], "web");
    }

    #[test]
    fn sentinel_keys_are_reported() {
        let descriptor = json!({"labels": {"SECRET": "value"}});
        assert_eq!(remaining_sentinels(&descriptor), vec!["/labels/SECRET"]);
    }

    #[test]
    fn fully_substituted_descriptor_passes() {
        let descriptor = json!({"env": {"A": "secretive", "B": 1}});
        assert!(ensure_resolved(&descriptor, false, &PipelineLocation::default()).is_ok());
    }
}
