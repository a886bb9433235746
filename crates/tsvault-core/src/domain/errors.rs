//! Errors - エラー型と分類
//!
//! すべての操作は `BackupError` を返します。ホスト側は `kind()` で
//! 応答（HTTP ステータスなど）を決められます。

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// ErrorKind は BackupError の運用分類
///
/// # 分類
/// - Configuration: 起動時の設定エラー（プロセスは起動しない）
/// - Staging: ステージング領域を作れない（その create だけ失敗）
/// - Tool: 外部ツールの失敗・タイムアウト（error marker を書く）
/// - NotFound: 該当するバックアップがない
/// - InvalidInput: 呼び出し側の引数が不正
/// - Storage: backups root の I/O エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Staging,
    Tool,
    NotFound,
    InvalidInput,
    Storage,
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("staging area unavailable at {}: {source}", path.display())]
    StagingUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup tool timed out after {}s", timeout.as_secs())]
    ToolTimeout { timeout: Duration },

    #[error("backup tool failed: {message}")]
    ToolExecution { message: String },

    #[error("malformed artifact name: {0}")]
    MalformedName(String),

    #[error("backup not found for id={0}")]
    NotFound(String),

    #[error("invalid external id {0:?}: {1}")]
    InvalidExternalId(String, &'static str),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Configuration(_) => ErrorKind::Configuration,
            BackupError::StagingUnavailable { .. } => ErrorKind::Staging,
            BackupError::ToolTimeout { .. } | BackupError::ToolExecution { .. } => ErrorKind::Tool,
            BackupError::NotFound(_) => ErrorKind::NotFound,
            BackupError::MalformedName(_) | BackupError::InvalidExternalId(..) => {
                ErrorKind::InvalidInput
            }
            BackupError::Io { .. } => ErrorKind::Storage,
        }
    }

    /// I/O エラーに文脈（対象パスなど）を付ける
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BackupError::Io {
            context: context.into(),
            source,
        }
    }
}
