//! TokioProcessRunner - tokio::process による本番用 ProcessRunner
//!
//! # 学習ポイント
//! - `tokio::time::timeout` で future に期限を付ける
//! - `kill_on_drop(true)`: 期限切れで future を drop すると子プロセスも kill される

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::ports::{CommandLine, ExecContext, ProcessError, ProcessOutput, ProcessRunner};

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        command: &CommandLine,
        timeout: Duration,
        context: &ExecContext,
    ) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &context.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &context.working_dir {
            cmd.current_dir(dir);
        }

        debug!(command = %command, timeout_ms = timeout.as_millis() as u64, "spawning process");
        let started = Instant::now();
        let child = cmd.spawn().map_err(ProcessError::Spawn)?;

        // 期限切れの場合 wait_with_output の future（と child）が drop され、kill される
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(ProcessError::Wait)?,
            Err(_) => {
                return Err(ProcessError::TimedOut {
                    elapsed: started.elapsed(),
                });
            }
        };

        let captured = ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            command = %command,
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "process finished"
        );

        if output.status.success() {
            Ok(captured)
        } else {
            Err(ProcessError::Failed {
                code: output.status.code(),
                output: captured,
            })
        }
    }
}
