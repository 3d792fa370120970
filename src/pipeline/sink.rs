use crate::analysis::Finding;
use console::style;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

const RUN_MARKER: &str = "\n---- NEW RUN ----\n";
const BATCH_MARKER: &str = "\nBATCH:\n";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize finding: {0}")]
    Json(#[from] serde_json::Error),
}

impl SinkError {
    fn io(path: &Path, source: io::Error) -> Self {
        SinkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

async fn open_append(path: &Path) -> Result<File, SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SinkError::io(path, e))?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| SinkError::io(path, e))
}

/// Destination for recovered findings.
pub enum FindingSink {
    /// Pretty-printed to stdout
    Console,
    /// One JSON object per line, appended
    JsonLines { path: PathBuf, file: File },
}

impl FindingSink {
    /// JSON lines file when a path is given, console otherwise
    pub async fn open(path: Option<&Path>) -> Result<Self, SinkError> {
        match path {
            Some(path) => Ok(FindingSink::JsonLines {
                path: path.to_path_buf(),
                file: open_append(path).await?,
            }),
            None => Ok(FindingSink::Console),
        }
    }

    pub async fn write(&mut self, findings: &[Finding]) -> Result<(), SinkError> {
        match self {
            FindingSink::Console => {
                for finding in findings {
                    let label = finding
                        .severity
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "FINDING".to_string());
                    println!("{}", style(label).red().bold());
                    println!("{}", serde_json::to_string_pretty(&finding.to_output()?)?);
                }
                Ok(())
            }
            FindingSink::JsonLines { path, file } => {
                let mut buf = Vec::new();
                for finding in findings {
                    serde_json::to_writer(&mut buf, &finding.to_output()?)?;
                    buf.push(b'\n');
                }
                file.write_all(&buf)
                    .await
                    .map_err(|e| SinkError::io(path, e))?;
                file.flush().await.map_err(|e| SinkError::io(path, e))
            }
        }
    }
}

/// Append-only log of the raw text the service streamed back, for troubleshooting.
pub struct ResponseLog {
    path: PathBuf,
    file: File,
}

impl ResponseLog {
    /// Open (or create) the log and mark the start of a new run.
    pub async fn open(path: &Path) -> Result<Self, SinkError> {
        let mut log = Self {
            path: path.to_path_buf(),
            file: open_append(path).await?,
        };
        log.append(RUN_MARKER).await?;
        Ok(log)
    }

    pub async fn begin_batch(&mut self) -> Result<(), SinkError> {
        self.append(BATCH_MARKER).await
    }

    pub async fn end_batch(&mut self) -> Result<(), SinkError> {
        self.append("\n").await
    }

    pub async fn append(&mut self, text: &str) -> Result<(), SinkError> {
        self.file
            .write_all(text.as_bytes())
            .await
            .map_err(|e| SinkError::io(&self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| SinkError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Severity;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_findings_appended_as_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/findings.jsonl");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"earlier\":true}\n").unwrap();

        let mut sink = FindingSink::open(Some(path.as_path())).await.unwrap();
        let findings = vec![
            Finding {
                category: Some("Auth".to_string()),
                severity: Some(Severity::Dangerous),
                ..Default::default()
            },
            Finding::default(),
        ];
        sink.write(&findings).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "{\"earlier\":true}");

        let first: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first["category"], "Auth");
        assert_eq!(first["severity"], "DANGEROUS");
    }

    #[tokio::test]
    async fn test_emitted_object_written_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("findings.jsonl");

        let object = serde_json::json!({"category": "Scan", "severity": "suspicious", "start": 17});
        let serde_json::Value::Object(object) = object else {
            unreachable!()
        };
        let finding = Finding::from_object(object).unwrap();

        let mut sink = FindingSink::open(Some(path.as_path())).await.unwrap();
        sink.write(&[finding]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let written: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({"category": "Scan", "severity": "suspicious", "start": 17})
        );
    }

    #[tokio::test]
    async fn test_response_log_markers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/llm.log");

        let mut log = ResponseLog::open(&path).await.unwrap();
        log.begin_batch().await.unwrap();
        log.append("Hel").await.unwrap();
        log.append("lo").await.unwrap();
        log.end_batch().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "\n---- NEW RUN ----\n\nBATCH:\nHello\n");
    }
}
