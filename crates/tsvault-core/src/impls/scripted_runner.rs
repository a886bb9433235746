//! ScriptedRunner - テスト用の ProcessRunner
//!
//! 実際のバックアップツールを起動せず、決められた振る舞いを返します。
//! 成功時はコマンドラインの最後の引数（ステージングディレクトリ）にファイルを書きます。
//!
//! # 使用例
//! ```ignore
//! let runner = ScriptedRunner::succeeding();
//! let runner = ScriptedRunner::new(ToolBehavior::Timeout);
//! // 1 回目は成功、2 回目以降はタイムアウト
//! let runner = ScriptedRunner::succeeding().then(ToolBehavior::Timeout);
//! ```

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{CommandLine, ExecContext, ProcessError, ProcessOutput, ProcessRunner};

/// ツールの振る舞い
#[derive(Debug, Clone)]
pub enum ToolBehavior {
    /// すぐに成功し、ステージングに `files` を書く
    Succeed { files: Vec<(String, Vec<u8>)> },
    /// 0 以外で終了する
    Fail { code: i32, stderr: String },
    /// 制限時間を使い切ってタイムアウトする
    Timeout,
    /// 何も書かずに成功する
    SucceedEmpty,
}

/// 実行されたコマンドの記録
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: CommandLine,
    pub timeout: Duration,
    pub context: ExecContext,
}

pub struct ScriptedRunner {
    /// n 回目の呼び出しは n 番目の振る舞い。使い切ったら最後のものを繰り返す
    script: Vec<ToolBehavior>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new(behavior: ToolBehavior) -> Self {
        Self {
            script: vec![behavior],
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// portable backup に似たファイルを書いて成功する
    pub fn succeeding() -> Self {
        Self::new(ToolBehavior::Succeed {
            files: vec![
                ("20240101T120000Z.manifest".to_string(), b"{}".to_vec()),
                ("20240101T120000Z.meta".to_string(), vec![0u8; 16]),
                ("20240101T120000Z.s1.tar.gz".to_string(), vec![0u8; 2048]),
            ],
        })
    }

    pub fn then(mut self, behavior: ToolBehavior) -> Self {
        self.script.push(behavior);
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &CommandLine,
        timeout: Duration,
        context: &ExecContext,
    ) -> Result<ProcessOutput, ProcessError> {
        let call = match self.invocations.lock() {
            Ok(mut calls) => {
                calls.push(Invocation {
                    command: command.clone(),
                    timeout,
                    context: context.clone(),
                });
                calls.len() - 1
            }
            Err(_) => 0,
        };

        match &self.script[call.min(self.script.len() - 1)] {
            ToolBehavior::Succeed { files } => {
                // `influxd version` のようにステージングを取らない呼び出しは何も書かない
                let Some(target) = command.args.last().map(PathBuf::from).filter(|p| p.is_dir())
                else {
                    return Ok(ProcessOutput::default());
                };
                for (name, bytes) in files {
                    tokio::fs::write(target.join(name), bytes)
                        .await
                        .map_err(ProcessError::Wait)?;
                }
                Ok(ProcessOutput {
                    stdout: format!("backup complete: {} files", files.len()),
                    stderr: String::new(),
                })
            }
            ToolBehavior::SucceedEmpty => Ok(ProcessOutput::default()),
            ToolBehavior::Fail { code, stderr } => Err(ProcessError::Failed {
                code: Some(*code),
                output: ProcessOutput {
                    stdout: String::new(),
                    stderr: stderr.clone(),
                },
            }),
            ToolBehavior::Timeout => Err(ProcessError::TimedOut { elapsed: timeout }),
        }
    }
}
