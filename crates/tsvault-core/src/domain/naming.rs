//! Naming - artifact 名のエンコード/デコード
//!
//! backups root には DB もインデックスもありません。
//! ファイル名そのものが唯一のメタデータです。
//!
//! ```text
//! influx---<external id>---<correlation id>
//! <external id>.err
//! ```

use std::fmt;

use super::errors::BackupError;
use super::ids::{CorrelationId, ExternalId};

/// フィールド区切り（ID に現れにくい文字列）
pub const SEPARATOR: &str = "---";

/// 名前の先頭に付く固定セグメント
pub const MARKER: &str = "influx";

/// 失敗した create を表す sentinel ファイルの拡張子
pub const ERROR_MARKER_SUFFIX: &str = ".err";

const FIELD_COUNT: usize = 3;

/// ArtifactName は (external id, correlation id) の組
///
/// `Display` がエンコード結果、`decode` がその逆変換です。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName {
    external_id: ExternalId,
    correlation_id: CorrelationId,
}

impl ArtifactName {
    pub fn new(external_id: ExternalId, correlation_id: CorrelationId) -> Self {
        Self {
            external_id,
            correlation_id,
        }
    }

    pub fn external_id(&self) -> &ExternalId {
        &self.external_id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// 名前を組み立てる（失敗しない）
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// ファイル名を分解する
    ///
    /// フィールド数が 3 でない、marker が違う、各フィールドが不正な場合は
    /// `MalformedName` を返します。呼び出し側（enumerate）はこれを読み飛ばします。
    pub fn decode(name: &str) -> Result<Self, BackupError> {
        let fields: Vec<&str> = name.split(SEPARATOR).collect();
        if fields.len() != FIELD_COUNT {
            return Err(BackupError::MalformedName(format!(
                "{name:?} has {} fields, expected {FIELD_COUNT}",
                fields.len()
            )));
        }
        if fields[0] != MARKER {
            return Err(BackupError::MalformedName(format!(
                "{name:?} does not start with {MARKER:?}"
            )));
        }
        let external_id = ExternalId::parse(fields[1])
            .map_err(|e| BackupError::MalformedName(format!("{name:?}: {e}")))?;
        let correlation_id = CorrelationId::parse(fields[2])?;
        Ok(Self::new(external_id, correlation_id))
    }

    /// `name` が `external_id` の artifact かどうか
    ///
    /// 部分文字列ではなく、デコードしたフィールドの完全一致で判定します
    /// （"a" が "a1" の artifact に一致しないように）。
    pub fn belongs_to(name: &str, external_id: &ExternalId) -> bool {
        Self::decode(name).is_ok_and(|decoded| decoded.external_id == *external_id)
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{MARKER}{SEPARATOR}{}{SEPARATOR}{}",
            self.external_id, self.correlation_id
        )
    }
}

/// error marker のファイル名（`<external id>.err`）
pub fn error_marker_name(external_id: &ExternalId) -> String {
    format!("{external_id}{ERROR_MARKER_SUFFIX}")
}
