//! Structured document loading (YAML or JSON, chosen by file extension).

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// `.yml`/`.yaml` are YAML, everything else is JSON.
    pub fn for_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yml") | Some("yaml") => Format::Yaml,
            _ => Format::Json,
        }
    }
}

/// Parse a string in the given format.
pub fn parse_str<T: DeserializeOwned>(content: &str, format: Format, origin: &str) -> Result<T> {
    match format {
        Format::Yaml => serde_yml::from_str(content)
            .map_err(|e| Error::config_invalid_document(origin, e.to_string())),
        Format::Json => serde_json::from_str(content)
            .map_err(|e| Error::config_invalid_document(origin, e.to_string())),
    }
}

/// Read and parse a document. Missing files surface as IO errors.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;
    parse_str(&content, Format::for_path(path), &path.display().to_string())
}

/// Read a document if it exists. `Ok(None)` when the file is absent.
pub fn load_optional(path: &Path) -> Result<Option<Value>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            parse_str(&content, Format::for_path(path), &path.display().to_string()).map(Some)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::internal_io(
            e.to_string(),
            Some(format!("read {}", path.display())),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn format_is_chosen_by_extension() {
        assert_eq!(Format::for_path(Path::new("a.yml")), Format::Yaml);
        assert_eq!(Format::for_path(Path::new("a.YAML")), Format::Yaml);
        assert_eq!(Format::for_path(Path::new("a.json")), Format::Json);
        assert_eq!(Format::for_path(Path::new("secrets")), Format::Json);
    }

    #[test]
    fn yaml_and_json_load_to_the_same_value() {
        let dir = tempdir().unwrap();
        let yml = dir.path().join("s.yml");
        let json = dir.path().join("s.json");
        fs::write(&yml, "db_password: hunter2\nport: 5432\n").unwrap();
        fs::write(&json, r#"{"db_password": "hunter2", "port": 5432}"#).unwrap();

        let a: Value = load(&yml).unwrap();
        let b: Value = load(&json).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn load_optional_returns_none_for_missing_file() {
        let dir = tempdir().unwrap();
        assert!(load_optional(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let err = load_optional(&path).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigInvalidDocument);
    }
}
