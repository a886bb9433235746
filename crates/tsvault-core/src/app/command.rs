//! Command - 設定から外部ツールのコマンドラインを組み立てる
//!
//! ```text
//! influxd backup -portable -database=<db> -host=<host>:<port> [-rp=..] [-shard=..] [-start=..] [-end=..] [-since=..] <staging>
//! ```
//!
//! 未設定（または空）の任意パラメータは引数ごと省きます。

use std::path::Path;

use crate::config::{ProviderConfig, non_empty};
use crate::ports::CommandLine;

/// `influxd backup` のコマンドライン
pub fn backup_command(config: &ProviderConfig, staging: &Path) -> CommandLine {
    let selection = &config.selection;
    let optional = [
        ("rp", &selection.retention),
        ("shard", &selection.shard),
        ("start", &selection.start),
        ("end", &selection.end),
        ("since", &selection.since),
    ];

    let mut cmd = CommandLine::new(&config.tool)
        .arg("backup")
        .arg("-portable")
        .arg(format!("-database={}", config.database))
        .arg(format!("-host={}", config.address()));
    for (flag, value) in optional {
        if let Some(value) = non_empty(value) {
            cmd = cmd.arg(format!("-{flag}={value}"));
        }
    }
    cmd.arg(staging.display().to_string())
}

/// initialize 時のツール確認（`influxd version`）
pub fn version_command(config: &ProviderConfig) -> CommandLine {
    CommandLine::new(&config.tool).arg("version")
}
