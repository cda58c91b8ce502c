use anyhow::{bail, Context, Result};
use std::path::Path;

/// Maximum size for a document file (10 MB).
pub const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Parse a JSON5 string (plain JSON is valid JSON5).
pub fn parse_json5(content: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value = json5::from_str(content)?;
    Ok(value)
}

/// Parse document text in the given format (`json`, `json5`, `yaml`, `yml`, `toml`).
pub fn parse_document(content: &str, format: &str) -> Result<serde_json::Value> {
    match format {
        "yaml" | "yml" => {
            let value: serde_json::Value = serde_yaml::from_str(content)?;
            Ok(value)
        }
        "toml" => {
            let value: serde_json::Value = toml::from_str(content)?;
            Ok(value)
        }
        "json" | "json5" => parse_json5(content),
        other => bail!("Unsupported document format '{other}'"),
    }
}

/// Read a document into a JSON value, picking the parser by file extension.
///
/// Files without a known extension are parsed as JSON5.
pub fn read_document(path: &Path) -> Result<serde_json::Value> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Cannot stat document '{}'", path.display()))?;

    if metadata.len() > MAX_DOCUMENT_BYTES {
        bail!(
            "Document '{}' is {} bytes, exceeds limit of {} bytes",
            path.display(),
            metadata.len(),
            MAX_DOCUMENT_BYTES,
        );
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document '{}'", path.display()))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("json");

    match ext {
        "yaml" | "yml" | "toml" => parse_document(&content, ext),
        _ => parse_json5(&content),
    }
    .with_context(|| format!("Failed to parse document '{}'", path.display()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_json5_with_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "app.json",
            "{\n  // database\n  password: '{{ op://vault/db/password }}',\n}",
        );
        assert_eq!(
            read_document(&path).unwrap(),
            json!({"password": "{{ op://vault/db/password }}"})
        );
    }

    #[test]
    fn reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "app.yaml",
            "db:\n  password: \"{{ op://vault/db/password }}\"\n  port: 5432\n",
        );
        assert_eq!(
            read_document(&path).unwrap(),
            json!({"db": {"password": "{{ op://vault/db/password }}", "port": 5432}})
        );
    }

    #[test]
    fn reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "app.toml",
            "[db]\npassword = \"{{ op://vault/db/password }}\"\n",
        );
        assert_eq!(
            read_document(&path).unwrap(),
            json!({"db": {"password": "{{ op://vault/db/password }}"}})
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_document(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Cannot stat document"));
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(parse_document("a = 1", "ini").is_err());
    }
}
