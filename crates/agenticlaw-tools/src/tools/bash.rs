//! Bash tool — execute shell commands with timeout, background support, and cancellation

use crate::registry::{Tool, ToolResult};
use agenticlaw_core::{Error, ErrorKind};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A background command is detached once either threshold is crossed,
/// whichever comes first.
const BACKGROUND_DETACH_AFTER: std::time::Duration = std::time::Duration::from_secs(2);
const BACKGROUND_DETACH_BYTES: usize = 1024;

pub struct BashTool {
    workspace_root: PathBuf,
    default_timeout_secs: u64,
}

impl BashTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
            default_timeout_secs: 120,
        }
    }
}

#[async_trait::async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str { "bash" }

    fn description(&self) -> &str {
        "Execute a bash command. Use for git, npm, docker, system commands. \
         Captures stdout and stderr. Set timeout in seconds (default 120). \
         Set background=true to detach a long-running command after 2s or \
         1KB of output, whichever comes first, instead of waiting for exit. \
         Include a short description of what the command does."
    }

    fn prompt(&self) -> &str {
        "Use the bash tool for terminal operations. Quote paths with spaces. \
         Prefer dedicated tools (read, write, edit, glob, grep) over bash equivalents. \
         Use background=true for long-running processes (servers, watchers) you don't need to block on."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 120, max 600)"
                },
                "background": {
                    "type": "boolean",
                    "description": "Detach the process after 2s or 1KB of output instead of waiting for exit"
                },
                "description": {
                    "type": "string",
                    "description": "Short description of what this command does"
                }
            },
            "required": ["command"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), Error> {
        if args.get("command").and_then(|v| v.as_str()).is_none() {
            return Err(Error::runtime(ErrorKind::InvalidArgument, "missing required parameter: command"));
        }
        Ok(())
    }

    async fn execute(&self, args: Value) -> ToolResult {
        // validate() has already confirmed `command` is a present string.
        let command = args["command"].as_str().unwrap_or_default();

        let timeout_secs = args["timeout"].as_u64()
            .unwrap_or(self.default_timeout_secs)
            .min(600);
        let background = args["background"].as_bool().unwrap_or(false);

        if let Some(desc) = args["description"].as_str() {
            debug!("bash [{}]: {}", desc, command);
        } else {
            debug!("bash: {}", &command[..command.len().min(80)]);
        }

        let mut child = match spawn_piped(&self.workspace_root, command) {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to spawn: {}", e)),
        };

        if background {
            return race_background(child, command).await;
        }

        let output = match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        ).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::error(format!("Failed to execute: {}", e)),
            Err(_) => return ToolResult::error(format!("Command timed out after {}s", timeout_secs)),
        };

        format_output(&output)
    }

    /// Cancellable execution: spawns the process and races against the
    /// CancellationToken. On cancellation, the child process is killed
    /// immediately. `kill_on_drop` is left off for `background=true` calls —
    /// tokio can only fix that flag at spawn time, and a detached process
    /// must survive this function's own `child` handle going out of scope.
    /// An explicit cancellation still kills it either way.
    async fn execute_cancellable(
        &self,
        args: Value,
        cancel: CancellationToken,
    ) -> ToolResult {
        let command = match args["command"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("Missing required parameter: command"),
        };

        let timeout_secs = args["timeout"].as_u64()
            .unwrap_or(self.default_timeout_secs)
            .min(600);
        let background = args["background"].as_bool().unwrap_or(false);

        if let Some(desc) = args["description"].as_str() {
            debug!("bash (cancellable) [{}]: {}", desc, command);
        } else {
            debug!("bash (cancellable): {}", &command[..command.len().min(80)]);
        }

        let mut child = match Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace_root)
            .kill_on_drop(!background)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ToolResult::error(format!("Failed to spawn: {}", e)),
        };

        if background {
            tokio::select! {
                result = race_background_handle(&mut child, command) => {
                    return result;
                }
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return ToolResult::text("[process killed by interrupt]");
                }
            }
        }

        // Race: wait for the process vs cancellation vs timeout.
        // We use wait() + manual stdout/stderr reading instead of wait_with_output()
        // because wait_with_output() takes ownership and prevents kill-on-cancel.
        let timeout_duration = std::time::Duration::from_secs(timeout_secs);

        tokio::select! {
            result = async {
                tokio::time::timeout(timeout_duration, child.wait()).await
            } => {
                match result {
                    Ok(Ok(status)) => {
                        // Process exited — read stdout/stderr
                        let stdout = read_pipe(child.stdout.take()).await;
                        let stderr = read_pipe(child.stderr.take()).await;
                        let output = std::process::Output {
                            status,
                            stdout: stdout.into_bytes(),
                            stderr: stderr.into_bytes(),
                        };
                        format_output(&output)
                    }
                    Ok(Err(e)) => ToolResult::error(format!("Failed to wait: {}", e)),
                    Err(_) => {
                        // Timeout — kill the process
                        let _ = child.kill().await;
                        ToolResult::error(format!("Command timed out after {}s", timeout_secs))
                    }
                }
            }
            _ = cancel.cancelled() => {
                // Interrupted by human — kill the process immediately
                let _ = child.kill().await;
                ToolResult::text("[process killed by interrupt]")
            }
        }
    }
}

fn spawn_piped(workspace_root: &Path, command: &str) -> std::io::Result<tokio::process::Child> {
    Command::new("bash")
        .arg("-c")
        .arg(command)
        .current_dir(workspace_root)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
}

/// Owning-child variant of the background race, used by `execute()` where no
/// cancellation is in play. Consumes `child` and, once detached, lets it drop
/// without `kill_on_drop` ever having been set.
async fn race_background(mut child: tokio::process::Child, command: &str) -> ToolResult {
    race_background_handle(&mut child, command).await
}

/// Pumps stdout/stderr into a shared buffer and returns as soon as either the
/// detach timer elapses, the buffered output reaches the byte threshold, or
/// the process exits on its own (whichever happens first). On detach, the
/// child keeps running; the caller is responsible for not killing it.
async fn race_background_handle(child: &mut tokio::process::Child, command: &str) -> ToolResult {
    let byte_count = Arc::new(AtomicUsize::new(0));
    let buf = Arc::new(Mutex::new(Vec::<u8>::new()));

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_pipe(stdout, byte_count.clone(), buf.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_pipe(stderr, byte_count.clone(), buf.clone()));
    }

    let deadline = tokio::time::sleep(BACKGROUND_DETACH_AFTER);
    tokio::pin!(deadline);
    let mut poll = tokio::time::interval(std::time::Duration::from_millis(20));

    loop {
        tokio::select! {
            biased;
            status = child.wait() => {
                let status = match status {
                    Ok(s) => s,
                    Err(e) => return ToolResult::error(format!("Failed to wait: {}", e)),
                };
                let so_far = String::from_utf8_lossy(&buf.lock().await).to_string();
                let output = std::process::Output {
                    status,
                    stdout: so_far.into_bytes(),
                    stderr: Vec::new(),
                };
                return format_output(&output);
            }
            _ = &mut deadline => {
                return detached_result(child, command, &buf, "2s elapsed").await;
            }
            _ = poll.tick() => {
                if byte_count.load(Ordering::Relaxed) >= BACKGROUND_DETACH_BYTES {
                    return detached_result(child, command, &buf, "1KB of output").await;
                }
            }
        }
    }
}

async fn detached_result(
    child: &tokio::process::Child,
    command: &str,
    buf: &Arc<Mutex<Vec<u8>>>,
    trigger: &str,
) -> ToolResult {
    let pid = child.id().unwrap_or(0);
    let so_far = String::from_utf8_lossy(&buf.lock().await).to_string();
    ToolResult::text(format!(
        "Backgrounded after {trigger} (pid {pid}): {command}\nOutput so far:\n{}",
        so_far.trim()
    ))
}

/// Reads a child pipe to EOF, accumulating bytes into `buf` and tracking the
/// running total in `counter` so the background race can poll it cheaply.
async fn pump_pipe(mut pipe: impl tokio::io::AsyncRead + Unpin, counter: Arc<AtomicUsize>, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 512];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                counter.fetch_add(n, Ordering::Relaxed);
                buf.lock().await.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

/// Read all bytes from an optional child pipe into a string.
async fn read_pipe(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    match pipe {
        Some(mut p) => {
            let mut buf = Vec::new();
            let _ = p.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).to_string()
        }
        None => String::new(),
    }
}

fn format_output(output: &std::process::Output) -> ToolResult {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let result = if output.status.success() {
        if stderr.is_empty() {
            stdout.trim().to_string()
        } else {
            format!("{}\n{}", stdout.trim(), stderr.trim())
        }
    } else {
        format!("Exit code: {}\n{}\n{}",
            output.status.code().unwrap_or(-1),
            stdout.trim(),
            stderr.trim()
        )
    };

    if result.is_empty() {
        ToolResult::text("(no output)")
    } else if result.len() > 30000 {
        ToolResult::text(format!(
            "{}\n... [truncated, {} total chars]",
            &result[..30000],
            result.len()
        ))
    } else {
        ToolResult::text(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path());
        let result = tool.execute(json!({"command": "echo hello"})).await;
        assert!(!result.is_error());
        assert_eq!(result.to_content_string(), "hello");
    }

    #[tokio::test]
    async fn background_detaches_before_a_slow_command_exits() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path());
        let result = tool.execute(json!({
            "command": "sleep 5 && echo done",
            "background": true
        })).await;
        assert!(!result.is_error());
        assert!(result.to_content_string().contains("Backgrounded"));
    }

    #[tokio::test]
    async fn background_detaches_once_output_exceeds_1kb() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path());
        // Emit well over 1KB immediately, then hang — detach should fire on
        // the byte threshold long before the 2s timer would.
        let result = tool.execute(json!({
            "command": "head -c 4096 /dev/zero | tr '\\0' 'x'; sleep 5",
            "background": true
        })).await;
        assert!(!result.is_error());
        assert!(result.to_content_string().contains("Backgrounded"));
        assert!(result.to_content_string().contains("1KB of output"));
    }

    #[tokio::test]
    async fn validate_rejects_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path());
        let err = tool.validate(&json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
