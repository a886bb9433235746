//! ArtifactStore port - backups root の唯一の読み書き窓口
//!
//! backups root に書くのはこの port だけです（commit / delete / error marker）。
//!
//! # 実装
//! - `LocalArtifactStore`: ローカルファイルシステム

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::{ArtifactName, BackupError, BackupStatus, CorrelationId, ExternalId};

/// enumerate で見つかった 1 件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub name: ArtifactName,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ArtifactEntry {
    pub fn external_id(&self) -> &ExternalId {
        self.name.external_id()
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        self.name.correlation_id()
    }

    pub fn to_status(&self) -> BackupStatus {
        BackupStatus::available(
            self.external_id().clone(),
            self.correlation_id().clone(),
            self.path.display().to_string(),
            self.size_bytes,
        )
    }
}

/// ArtifactStore は命名規約だけで構造化されたディレクトリを扱う
///
/// # 設計原則
/// - commit はすべてのバイトを書き終えてから名前を出現させる（途中状態は見えない）
/// - enumerate はデコードできない名前を読み飛ばす（一覧全体を失敗させない）
/// - locate はデコードしたフィールドの完全一致、複数あれば最新の correlation id
/// - 1 つの external id に対応する artifact は最大 1 件（commit 後に古いものを消す）
/// - delete は冪等（存在しなければ false）
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// backups root を作る（親ディレクトリも含めて）
    async fn prepare(&self) -> Result<(), BackupError>;

    /// ステージング済みの出力を backups root に移す
    async fn commit(
        &self,
        staging: &Path,
        external_id: &ExternalId,
        correlation_id: &CorrelationId,
    ) -> Result<ArtifactEntry, BackupError>;

    /// コミット済み artifact の一覧（external id 昇順、同じ id 内は新しい順）
    async fn enumerate(&self) -> Result<Vec<ArtifactEntry>, BackupError>;

    async fn locate(&self, external_id: &ExternalId) -> Result<Option<ArtifactEntry>, BackupError> {
        let entries = self.enumerate().await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.external_id() == external_id)
            .max_by(|a, b| a.correlation_id().cmp(b.correlation_id())))
    }

    /// `external_id` の artifact をすべて削除。1 件もなければ `Ok(false)`
    async fn delete(&self, external_id: &ExternalId) -> Result<bool, BackupError>;

    /// `keep` 以外の `external_id` の artifact を削除し、削除した件数を返す
    async fn retain_only(
        &self,
        external_id: &ExternalId,
        keep: &CorrelationId,
    ) -> Result<usize, BackupError>;

    /// 中断された commit が残した一時ディレクトリを削除し、削除した件数を返す
    async fn sweep_incoming(&self) -> Result<usize, BackupError>;

    async fn write_error_marker(
        &self,
        external_id: &ExternalId,
        correlation_id: &CorrelationId,
    ) -> Result<(), BackupError>;

    async fn has_error_marker(&self, external_id: &ExternalId) -> Result<bool, BackupError>;

    /// error marker を削除。存在しなければ `Ok(false)`
    async fn remove_error_marker(&self, external_id: &ExternalId) -> Result<bool, BackupError>;
}
