//! ProcessRunner port - 外部コマンドの実行
//!
//! バックアップツールは不透明な外部プログラムとして扱います。
//! ここで約束するのは「タイムアウト付きで実行し、成功・失敗・タイムアウトを区別して返す」ことだけです。

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// 実行するコマンド（シェルを通さない argv）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// ExecContext は実行環境（ホストから渡される）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecContext {
    /// 追加の環境変数
    pub env: Vec<(String, String)>,
    /// 作業ディレクトリ（None なら継承）
    pub working_dir: Option<PathBuf>,
}

impl ExecContext {
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// 正常終了したプロセスの出力
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// ログ用の要約（stderr 優先）
    pub fn summary(&self) -> &str {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr;
        }
        self.stdout.trim()
    }
}

/// ProcessError は成功以外の結果
///
/// `TimedOut` と `Failed` はどちらもツールの失敗ですが、ログのために区別します。
#[derive(Debug, Error)]
pub enum ProcessError {
    /// 制限時間を超えたので強制終了した
    #[error("command timed out after {}ms and was killed", elapsed.as_millis())]
    TimedOut { elapsed: Duration },

    /// 0 以外の終了コード（シグナル終了なら None）
    #[error("command exited with code {code:?}: {}", output.summary())]
    Failed {
        code: Option<i32>,
        output: ProcessOutput,
    },

    /// 起動できなかった（実行ファイルがないなど）
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to collect command output: {0}")]
    Wait(#[source] std::io::Error),
}

/// ProcessRunner は外部コマンドを実行
///
/// # 実装
/// - `TokioProcessRunner`: 本番用（tokio::process）
/// - `ScriptedRunner`: テスト用（ツールの振る舞いを差し替える）
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &CommandLine,
        timeout: Duration,
        context: &ExecContext,
    ) -> Result<ProcessOutput, ProcessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_displays_as_shell_string() {
        let cmd = CommandLine::new("influxd")
            .arg("backup")
            .arg("-portable")
            .arg("/tmp/stage");
        assert_eq!(cmd.to_string(), "influxd backup -portable /tmp/stage");
    }

    #[test]
    fn failed_error_prefers_stderr() {
        let err = ProcessError::Failed {
            code: Some(1),
            output: ProcessOutput {
                stdout: "progress...".to_string(),
                stderr: "connection refused\n".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "command exited with code Some(1): connection refused"
        );
    }
}
