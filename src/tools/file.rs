//! File operations tool: read, write, list, delete, exists.

use crate::tools::Tool;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// File operations rooted at the runtime's working directory.
///
/// Operation failures (missing files, permission errors) are reported
/// inside the result object so the LLM can react to them.
pub struct FileTool {
    workdir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct FileParams {
    operation: String,
    path: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    limit: usize,
}

#[derive(Debug, Default, Serialize)]
struct FileOutput {
    success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    files: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
struct FileEntry {
    name: String,
    path: String,
    size: u64,
    is_dir: bool,
    mod_time: i64,
}

impl FileTool {
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() || self.workdir.as_os_str().is_empty() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    fn read_file(path: &Path, offset: usize, limit: usize) -> FileOutput {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => return FileOutput::failure(err),
        };

        let content = if offset > 0 || limit > 0 {
            let lines: Vec<&str> = data.split('\n').collect();
            let start = offset.min(lines.len());
            let end = if limit > 0 {
                (start + limit).min(lines.len())
            } else {
                lines.len()
            };
            lines[start..end].join("\n")
        } else {
            data
        };

        FileOutput {
            success: true,
            content,
            ..FileOutput::default()
        }
    }

    fn write_file(path: &Path, content: &str) -> FileOutput {
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                return FileOutput::failure(err);
            }
        }
        match std::fs::write(path, content) {
            Ok(()) => FileOutput {
                success: true,
                ..FileOutput::default()
            },
            Err(err) => FileOutput::failure(err),
        }
    }

    fn list_dir(path: &Path) -> FileOutput {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(err) => return FileOutput::failure(err),
        };

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            let mod_time = meta
                .modified()
                .ok()
                .map_or(0, |t| OffsetDateTime::from(t).unix_timestamp());
            files.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path().to_string_lossy().into_owned(),
                size: meta.len(),
                is_dir: meta.is_dir(),
                mod_time,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        FileOutput {
            success: true,
            files,
            ..FileOutput::default()
        }
    }

    fn delete(path: &Path) -> FileOutput {
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        match result {
            Ok(()) => FileOutput {
                success: true,
                ..FileOutput::default()
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => FileOutput {
                success: true,
                ..FileOutput::default()
            },
            Err(err) => FileOutput::failure(err),
        }
    }

    fn exists(path: &Path) -> FileOutput {
        FileOutput {
            success: path.exists(),
            ..FileOutput::default()
        }
    }
}

impl FileOutput {
    fn failure(err: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Tool for FileTool {
    fn name(&self) -> &str {
        "file"
    }

    fn description(&self) -> &str {
        "File operations including read, write, list, and search."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["read", "write", "list", "delete", "exists"],
                    "description": "The file operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "The file or directory path"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write (for write operation)"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line offset to start reading from"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read"
                }
            },
            "required": ["operation", "path"]
        })
    }

    async fn invoke(&self, _cancel: &CancellationToken, args: &[u8]) -> Result<serde_json::Value> {
        let params: FileParams = serde_json::from_slice(args).context("invalid parameters")?;
        let path = self.resolve(&params.path);

        let output = match params.operation.as_str() {
            "read" => Self::read_file(&path, params.offset, params.limit),
            "write" => Self::write_file(&path, &params.content),
            "list" => Self::list_dir(&path),
            "delete" => Self::delete(&path),
            "exists" => Self::exists(&path),
            other => bail!("unknown operation: {other}"),
        };

        Ok(serde_json::to_value(output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, FileTool, CancellationToken) {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileTool::new(dir.path());
        (dir, tool, CancellationToken::new())
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_dir, tool, cancel) = setup();

        let write = tool
            .invoke(
                &cancel,
                br#"{"operation":"write","path":"notes.txt","content":"line1\nline2\nline3"}"#,
            )
            .await
            .unwrap();
        assert_eq!(write["success"], true);

        let read = tool
            .invoke(&cancel, br#"{"operation":"read","path":"notes.txt"}"#)
            .await
            .unwrap();
        assert_eq!(read["success"], true);
        assert_eq!(read["content"], "line1\nline2\nline3");
    }

    #[tokio::test]
    async fn read_with_offset_and_limit() {
        let (_dir, tool, cancel) = setup();
        tool.invoke(
            &cancel,
            br#"{"operation":"write","path":"n.txt","content":"a\nb\nc\nd"}"#,
        )
        .await
        .unwrap();

        let read = tool
            .invoke(
                &cancel,
                br#"{"operation":"read","path":"n.txt","offset":1,"limit":2}"#,
            )
            .await
            .unwrap();
        assert_eq!(read["content"], "b\nc");
    }

    #[tokio::test]
    async fn read_missing_file_reports_error_in_result() {
        let (_dir, tool, cancel) = setup();
        let read = tool
            .invoke(&cancel, br#"{"operation":"read","path":"missing.txt"}"#)
            .await
            .unwrap();
        assert_eq!(read["success"], false);
        assert!(!read["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let (dir, tool, cancel) = setup();
        let write = tool
            .invoke(
                &cancel,
                br#"{"operation":"write","path":"deep/nested/file.txt","content":"x"}"#,
            )
            .await
            .unwrap();
        assert_eq!(write["success"], true);
        assert!(dir.path().join("deep/nested/file.txt").exists());
    }

    #[tokio::test]
    async fn list_returns_entries() {
        let (_dir, tool, cancel) = setup();
        tool.invoke(
            &cancel,
            br#"{"operation":"write","path":"a.txt","content":"1"}"#,
        )
        .await
        .unwrap();
        tool.invoke(
            &cancel,
            br#"{"operation":"write","path":"b.txt","content":"2"}"#,
        )
        .await
        .unwrap();

        let list = tool
            .invoke(&cancel, br#"{"operation":"list","path":"."}"#)
            .await
            .unwrap();
        assert_eq!(list["success"], true);
        let files = list["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["name"], "a.txt");
        assert_eq!(files[0]["is_dir"], false);
    }

    #[tokio::test]
    async fn delete_and_exists() {
        let (_dir, tool, cancel) = setup();
        tool.invoke(
            &cancel,
            br#"{"operation":"write","path":"gone.txt","content":"x"}"#,
        )
        .await
        .unwrap();

        let exists = tool
            .invoke(&cancel, br#"{"operation":"exists","path":"gone.txt"}"#)
            .await
            .unwrap();
        assert_eq!(exists["success"], true);

        let delete = tool
            .invoke(&cancel, br#"{"operation":"delete","path":"gone.txt"}"#)
            .await
            .unwrap();
        assert_eq!(delete["success"], true);

        let exists = tool
            .invoke(&cancel, br#"{"operation":"exists","path":"gone.txt"}"#)
            .await
            .unwrap();
        assert_eq!(exists["success"], false);
    }

    #[tokio::test]
    async fn unknown_operation_is_an_error() {
        let (_dir, tool, cancel) = setup();
        assert!(tool
            .invoke(&cancel, br#"{"operation":"chmod","path":"x"}"#)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn absolute_paths_bypass_the_workdir() {
        let (_dir, tool, cancel) = setup();
        let other = tempfile::tempdir().unwrap();
        let target = other.path().join("abs.txt");
        std::fs::write(&target, "absolute").unwrap();

        let args = format!(
            r#"{{"operation":"read","path":"{}"}}"#,
            target.to_string_lossy()
        );
        let read = tool.invoke(&cancel, args.as_bytes()).await.unwrap();
        assert_eq!(read["content"], "absolute");
    }
}
