//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **LocalArtifactStore**: ローカルファイルシステムの backups root
//! - **StagingManager**: create 試行ごとのステージングディレクトリ
//! - **TokioProcessRunner**: tokio::process による外部コマンド実行
//! - **ScriptedRunner**: テスト用（ツールの成功/失敗/タイムアウトを再現）

pub mod local_store;
pub mod scripted_runner;
pub mod staging;
pub mod tokio_runner;

// 主要な型を再エクスポート
pub use self::local_store::LocalArtifactStore;
pub use self::scripted_runner::{ScriptedRunner, ToolBehavior};
pub use self::staging::{StagingDir, StagingManager};
pub use self::tokio_runner::TokioProcessRunner;
