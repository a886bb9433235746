//! StagingManager - create 試行ごとの使い捨て作業ディレクトリ
//!
//! 外部ツールはまずステージングに書き、成功したときだけ backups root にコミットします。
//! 読み手（enumerate）はステージングを見ないので、書きかけのデータは決して見えません。
//!
//! # レイアウト
//! ```text
//! <staging root>/<correlation id>-<ulid>/   ← 試行ごとに一意
//! ```
//!
//! # 学習ポイント
//! - RAII ガード（StagingDir）: release を呼び忘れても Drop で消える

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{BackupError, CorrelationId};
use crate::ports::IdGenerator;

pub struct StagingManager {
    root: PathBuf,
    ids: Arc<dyn IdGenerator>,
}

impl StagingManager {
    pub fn new(root: impl Into<PathBuf>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            root: root.into(),
            ids,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// ステージング root を作る
    pub async fn prepare(&self) -> Result<(), BackupError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| BackupError::StagingUnavailable {
                path: self.root.clone(),
                source,
            })
    }

    /// 前回のプロセスが残したステージングディレクトリを削除
    ///
    /// `<correlation id>-<ulid>` の形の名前だけを対象にします
    /// （staging root に無関係なファイルがあっても消さない）。
    pub async fn sweep(&self) -> Result<usize, BackupError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(BackupError::StagingUnavailable {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut removed = 0;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| BackupError::io(format!("list staging root {}", self.root.display()), e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_staging_name(name) {
                continue;
            }
            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to sweep stale staging dir"),
            }
        }
        if removed > 0 {
            debug!(removed, root = %self.root.display(), "swept stale staging dirs");
        }
        Ok(removed)
    }

    /// 試行用のディレクトリを作る（親ディレクトリも作る。既存でもエラーにしない）
    pub async fn acquire(&self, correlation_id: &CorrelationId) -> Result<StagingDir, BackupError> {
        let attempt = self.ids.generate_attempt_id();
        let path = self.root.join(format!("{correlation_id}-{attempt}"));
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| BackupError::StagingUnavailable {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "staging acquired");
        Ok(StagingDir {
            path,
            released: false,
        })
    }
}

fn is_staging_name(name: &str) -> bool {
    let Some((correlation, attempt)) = name.split_once('-') else {
        return false;
    };
    CorrelationId::parse(correlation).is_ok() && ulid::Ulid::from_string(attempt).is_ok()
}

/// StagingDir は 1 回の create 試行のステージング
///
/// すべての終了経路で `release` を呼びます。
/// 呼ばれずに drop された場合（panic や future のキャンセル）も Drop で削除します。
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    released: bool,
}

impl StagingDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ステージングを再帰的に削除（既に無ければ何もしない）
    pub async fn release(mut self) -> Result<(), BackupError> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "staging released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BackupError::StagingUnavailable {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // async Drop はないので同期 API で消す。ここに来るのは panic やキャンセルの
        // 経路だけで、通常の終了は release（tokio::fs）を通る
        if let Err(e) = std::fs::remove_dir_all(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove abandoned staging dir");
        }
    }
}
