//! Downstream caller that runs an executable per message.
//!
//! The payload is written to the hook's stdin; a zero exit status is success.

use super::{DownstreamCaller, DownstreamError};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

pub struct CommandCaller {
    command: PathBuf,
    queue_name: String,
}

impl CommandCaller {
    /// Relative command paths are resolved against the process CWD up front,
    /// so the hook runs the same binary regardless of later directory changes.
    pub fn new(command: &Path, queue_name: impl Into<String>) -> Result<Self> {
        let command = if command.is_relative() {
            std::env::current_dir()?.join(command)
        } else {
            command.to_path_buf()
        };
        Ok(Self {
            command,
            queue_name: queue_name.into(),
        })
    }
}

#[async_trait]
impl DownstreamCaller for CommandCaller {
    async fn invoke(&self, payload: &str) -> std::result::Result<(), DownstreamError> {
        debug!(command = %self.command.display(), "running downstream hook");

        let mut child = Command::new(&self.command)
            .env("CYCLEQ_QUEUE", &self.queue_name)
            .env("CYCLEQ_PAYLOAD_BYTES", payload.len().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DownstreamError::Failed(format!("spawn {}: {e}", self.command.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| DownstreamError::Failed(format!("write payload: {e}")))?;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownstreamError::Failed(format!("wait for hook: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(DownstreamError::Failed(format!(
                "hook exited with status {}",
                status.code().unwrap_or(-1)
            )))
        }
    }
}
