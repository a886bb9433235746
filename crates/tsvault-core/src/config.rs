//! ProviderConfig - 起動時に一度だけ作る不変の設定
//!
//! グローバル変数ではなく、この構造体を `Arc` でコントローラに渡します。
//! テストでは任意の設定を注入できます。

use std::path::PathBuf;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::domain::BackupError;

pub const DEFAULT_BACKUPS_ROOT: &str = "/var/backups/database";
pub const DEFAULT_PORT: u16 = 8088;
pub const DEFAULT_TOOL: &str = "influxd";

/// 外部バックアップツールに渡す任意パラメータ
///
/// `None` または空文字列の項目はコマンドラインから完全に省きます。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOptions {
    /// Retention policy（未指定なら全 retention policy）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<String>,

    /// バックアップ対象の shard ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<String>,

    /// この時刻以降の point を含める（RFC3339）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    /// この時刻より後の point を除く（RFC3339）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    /// この時刻以降の増分バックアップ（RFC3339）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// コミット済み artifact と error marker を置くディレクトリ
    pub backups_root: PathBuf,

    /// create ごとのステージングディレクトリを作る親ディレクトリ
    pub staging_root: PathBuf,

    pub host: String,
    pub port: u16,
    pub database: String,

    #[serde(default)]
    pub selection: SelectionOptions,

    /// 外部ツールの実行ファイル
    pub tool: String,

    /// initialize 時に `<tool> version` でツールの存在を確認するか
    pub probe_tool: bool,
}

impl ProviderConfig {
    pub fn new(
        backups_root: impl Into<PathBuf>,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        Self {
            backups_root: backups_root.into(),
            staging_root: std::env::temp_dir().join("tsvault-staging"),
            host: host.into(),
            port,
            database: database.into(),
            selection: SelectionOptions::default(),
            tool: DEFAULT_TOOL.to_string(),
            probe_tool: true,
        }
    }

    pub fn with_staging_root(mut self, staging_root: impl Into<PathBuf>) -> Self {
        self.staging_root = staging_root.into();
        self
    }

    pub fn with_selection(mut self, selection: SelectionOptions) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn with_probe_tool(mut self, probe_tool: bool) -> Self {
        self.probe_tool = probe_tool;
        self
    }

    /// `host:port`（ツールの `-host` 引数）
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 必須項目と書式を検証
    ///
    /// # 検証内容
    /// - backups_root / staging_root / host / database / tool が空でない
    /// - port > 0
    /// - start / end / since が RFC3339
    /// - shard が数値
    pub fn validate(&self) -> Result<(), BackupError> {
        if self.backups_root.as_os_str().is_empty() {
            return Err(BackupError::Configuration(
                "backups root (--backup-dir) must be set".to_string(),
            ));
        }
        if self.staging_root.as_os_str().is_empty() {
            return Err(BackupError::Configuration(
                "staging root (--staging-dir) must be set".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(BackupError::Configuration(
                "database host (--host) must be set. It can be an IP address or a domain name"
                    .to_string(),
            ));
        }
        if self.port == 0 {
            return Err(BackupError::Configuration(
                "database port (--port) must be a valid value, such as 8088".to_string(),
            ));
        }
        if self.database.trim().is_empty() {
            return Err(BackupError::Configuration(
                "database (--database) must be set".to_string(),
            ));
        }
        if self.tool.trim().is_empty() {
            return Err(BackupError::Configuration(
                "backup tool (--tool) must be set".to_string(),
            ));
        }

        let timestamps = [
            ("start", &self.selection.start),
            ("end", &self.selection.end),
            ("since", &self.selection.since),
        ];
        for (name, value) in timestamps {
            if let Some(value) = non_empty(value)
                && let Err(e) = DateTime::parse_from_rfc3339(value)
            {
                return Err(BackupError::Configuration(format!(
                    "--{name} must be an RFC3339 timestamp (got {value:?}): {e}"
                )));
            }
        }

        if let Some(shard) = non_empty(&self.selection.shard)
            && shard.parse::<u64>().is_err()
        {
            return Err(BackupError::Configuration(format!(
                "--shard must be a numeric shard id (got {shard:?})"
            )));
        }

        Ok(())
    }
}

/// 空文字列を「未設定」として扱う
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ProviderConfig {
        ProviderConfig::new("/tmp/backups", "influx.local", 8088, "metrics")
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
        assert_eq!(valid().address(), "influx.local:8088");
    }

    #[test]
    fn missing_host_is_rejected() {
        let mut config = valid();
        config.host = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BackupError::Configuration(msg) if msg.contains("--host")));
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = valid();
        config.port = 0;
        assert!(matches!(
            config.validate(),
            Err(BackupError::Configuration(msg)) if msg.contains("--port")
        ));
    }

    #[test]
    fn empty_backups_root_is_rejected() {
        let mut config = valid();
        config.backups_root = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn timestamps_must_be_rfc3339() {
        let config = valid().with_selection(SelectionOptions {
            start: Some("2024-01-01T00:00:00Z".to_string()),
            since: Some("last tuesday".to_string()),
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("--since"));
    }

    #[test]
    fn empty_optionals_are_ignored() {
        let config = valid().with_selection(SelectionOptions {
            shard: Some(String::new()),
            end: Some(String::new()),
            ..Default::default()
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shard_must_be_numeric() {
        let config = valid().with_selection(SelectionOptions {
            shard: Some("abc".to_string()),
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }
}
