//! Status - ホストに返すバックアップの状態

use serde::{Deserialize, Serialize};

use super::ids::{CorrelationId, ExternalId};

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// BackupState は観測できる状態
///
/// コミット済みの artifact は常に `available` です。
/// 失敗した create は error marker だけが残り、一覧には出ません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupState {
    Available,
}

/// BackupStatus は 1 件のバックアップの説明
///
/// JSON 形: `{"id":"job-1","data_id":"20240101120000","status":"available","message":"/var/backups/...","size_mb":1.5}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupStatus {
    pub id: ExternalId,
    pub data_id: CorrelationId,
    pub status: BackupState,
    /// artifact のパス
    pub message: String,
    pub size_mb: f64,
}

impl BackupStatus {
    pub fn available(
        id: ExternalId,
        data_id: CorrelationId,
        location: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            id,
            data_id,
            status: BackupState::Available,
            message: location.into(),
            size_mb: size_bytes as f64 / BYTES_PER_MEGABYTE,
        }
    }
}
