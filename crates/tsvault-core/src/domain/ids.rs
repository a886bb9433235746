//! Domain identifiers (strongly-typed IDs).
//!
//! バックアップには 2 種類の ID があります。
//!
//! - **ExternalId**: ホスト（スケジューラ）が付ける ID。論理バックアップ 1 件を表す
//! - **CorrelationId**: 作成時刻から作る内部 ID（`%Y%m%d%H%M%S`, UTC）。物理バックアップの瞬間を表す
//!
//! どちらも中身は文字列ですが、Phantom type パターンで型を分けているので
//! 取り違えるとコンパイルエラーになります。

use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::BackupError;
use super::naming::SEPARATOR;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// ログやエラーで使う名前（例: "external id"）
    fn label() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しません。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    fn new_unchecked(value: String) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", T::label(), self.value)
    }
}

impl<T: IdMarker> AsRef<str> for Id<T> {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum External {}

impl IdMarker for External {
    fn label() -> &'static str {
        "external id"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Correlation {}

impl IdMarker for Correlation {
    fn label() -> &'static str {
        "correlation id"
    }
}

/// Identifier assigned by the host to one logical backup.
pub type ExternalId = Id<External>;

/// Timestamp-derived identifier of one physical backup instant.
pub type CorrelationId = Id<Correlation>;

/// CorrelationId の書式（秒単位でソート可能）
pub const CORRELATION_FORMAT: &str = "%Y%m%d%H%M%S";

impl Id<External> {
    /// ホストから受け取った ID を検証して ExternalId にする
    ///
    /// # 拒否する ID
    /// - 空文字列、`.`、`..`
    /// - 区切り文字 `---` を含む、または `-` で始まる/終わる（名前の分解が曖昧になる）
    /// - パス区切り文字や NUL を含む（backups root の外を指せてしまう）
    pub fn parse(value: impl Into<String>) -> Result<Self, BackupError> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("must not be empty")
        } else if value == "." || value == ".." {
            Some("must not be a relative path component")
        } else if value.contains(SEPARATOR) {
            Some("must not contain the name separator")
        } else if value.starts_with('-') || value.ends_with('-') {
            Some("must not begin or end with '-'")
        } else if value.contains(['/', '\\', '\0']) {
            Some("must not contain path separators")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(BackupError::InvalidExternalId(value, reason)),
            None => Ok(Self::new_unchecked(value)),
        }
    }
}

impl Id<Correlation> {
    /// 時刻から CorrelationId を作る
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self::new_unchecked(at.format(CORRELATION_FORMAT).to_string())
    }

    /// 名前から取り出した文字列を CorrelationId として検証
    pub fn parse(value: impl Into<String>) -> Result<Self, BackupError> {
        let value = value.into();
        let well_formed = value.len() == 14
            && value.bytes().all(|b| b.is_ascii_digit())
            && NaiveDateTime::parse_from_str(&value, CORRELATION_FORMAT).is_ok();
        if !well_formed {
            return Err(BackupError::MalformedName(format!(
                "correlation id {value:?} is not a {CORRELATION_FORMAT} timestamp"
            )));
        }
        Ok(Self::new_unchecked(value))
    }
}
