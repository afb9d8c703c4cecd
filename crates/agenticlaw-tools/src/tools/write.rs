//! Write tool — create or overwrite a file

use crate::registry::{Tool, ToolResult};
use agenticlaw_core::{Error, ErrorKind};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub struct WriteTool {
    workspace_root: PathBuf,
}

impl WriteTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates parent directories if needed. \
         Overwrites the file if it exists. Prefer edit for modifications."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), Error> {
        if args.get("file_path").or(args.get("path")).and_then(|v| v.as_str()).is_none() {
            return Err(Error::runtime(ErrorKind::InvalidArgument, "missing required parameter: file_path"));
        }
        if args.get("content").and_then(|v| v.as_str()).is_none() {
            return Err(Error::runtime(ErrorKind::InvalidArgument, "missing required parameter: content"));
        }
        Ok(())
    }

    async fn execute(&self, args: Value) -> ToolResult {
        // validate() has already confirmed both fields are present strings.
        let path = args.get("file_path").or(args.get("path")).and_then(|v| v.as_str()).unwrap_or_default();
        let content = args["content"].as_str().unwrap_or_default();

        let full_path = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.workspace_root.join(path)
        };

        if let Some(parent) = full_path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Failed to create directories: {}", e));
            }
        }

        let backup_path = {
            let mut s = full_path.clone().into_os_string();
            s.push(".backup");
            PathBuf::from(s)
        };
        let had_existing = fs::metadata(&full_path).await.is_ok();
        if had_existing {
            if let Err(e) = fs::copy(&full_path, &backup_path).await {
                return ToolResult::error(format!("Failed to snapshot existing file before write: {}", e));
            }
        }

        if let Err(e) = fs::write(&full_path, content).await {
            return ToolResult::error(format!("Failed to write: {}", e));
        }

        match fs::read(&full_path).await {
            Ok(written) if written == content.as_bytes() => {
                debug!("write: {} ({} bytes)", path, content.len());
                ToolResult::text(format!("Wrote {} bytes to {}", content.len(), path))
            }
            Ok(_) => ToolResult::error(format!("Post-write verification failed: {} content mismatch", path)),
            Err(e) => ToolResult::error(format!("Post-write verification failed: {}", e)),
        }
    }
}
