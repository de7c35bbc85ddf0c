//! Workflow description files.
//!
//! Reads a [`ParsedWorkflow`] from disk. The format is chosen by extension:
//! `.json` for JSON, `.yaml`/`.yml` for YAML. Structural validation is left
//! to the graph builder.

use std::path::Path;

use anyhow::{Context, bail};
use flowbox_types::workflow::ParsedWorkflow;

/// Supported description formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionFormat {
    Json,
    Yaml,
}

impl DescriptionFormat {
    /// Pick the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some(other) => bail!(
                "unsupported workflow file extension '.{other}' (expected .json, .yaml or .yml)"
            ),
            None => bail!(
                "workflow file {} has no extension (expected .json, .yaml or .yml)",
                path.display()
            ),
        }
    }
}

/// Parse description text in the given format.
pub fn parse_workflow(content: &str, format: DescriptionFormat) -> anyhow::Result<ParsedWorkflow> {
    match format {
        DescriptionFormat::Json => {
            serde_json::from_str(content).context("Failed to parse workflow JSON")
        }
        DescriptionFormat::Yaml => {
            serde_yaml_ng::from_str(content).context("Failed to parse workflow YAML")
        }
    }
}

/// Read and parse a workflow description file.
pub async fn load_workflow_file(path: &Path) -> anyhow::Result<ParsedWorkflow> {
    let format = DescriptionFormat::from_path(path)?;
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;

    let parsed = parse_workflow(&content, format)
        .with_context(|| format!("Invalid workflow file {}", path.display()))?;

    tracing::debug!(
        path = %path.display(),
        boxes = parsed.boxes.len(),
        connections = parsed.connections.len(),
        "workflow file parsed"
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const YAML: &str = r#"
boxes:
  - id: gen
    code: '{"x": 1}'
  - id: add
    inputs: [nums]
    description: adds one
    code: '{"y": nums.x + 1}'
connections:
  - source: gen
    target: add
    target_input: nums
layout:
  gen: { x: 0, y: 0 }
"#;

    #[test]
    fn format_from_extension() {
        assert_eq!(
            DescriptionFormat::from_path(Path::new("a.json")).unwrap(),
            DescriptionFormat::Json
        );
        assert_eq!(
            DescriptionFormat::from_path(Path::new("a.YML")).unwrap(),
            DescriptionFormat::Yaml
        );
        assert!(DescriptionFormat::from_path(Path::new("a.md")).is_err());
        assert!(DescriptionFormat::from_path(Path::new("noext")).is_err());
    }

    #[tokio::test]
    async fn load_yaml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("flow.yaml");
        tokio::fs::write(&path, YAML).await.unwrap();

        let parsed = load_workflow_file(&path).await.unwrap();
        assert_eq!(parsed.boxes.len(), 2);
        assert_eq!(parsed.boxes[1].description, "adds one");
        assert_eq!(parsed.connections[0].source, "gen");
        assert!(parsed.layout.contains_key("gen"));
    }

    #[tokio::test]
    async fn load_json_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("flow.json");
        tokio::fs::write(
            &path,
            r#"{"boxes": [{"id": "only", "code": "{}"}], "connections": []}"#,
        )
        .await
        .unwrap();

        let parsed = load_workflow_file(&path).await.unwrap();
        assert_eq!(parsed.boxes[0].id, "only");
        assert!(parsed.layout.is_empty());
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.json");
        let err = load_workflow_file(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("nope.json"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = parse_workflow("{\"boxes\": [", DescriptionFormat::Json).unwrap_err();
        assert!(err.to_string().contains("workflow JSON"));
    }
}
