//! tsvault-core
//!
//! 時系列 DB（InfluxDB）のバックアップのライフサイクルを管理するプロバイダ。
//! ファイルシステムが唯一の正本で、メタデータはすべてファイル名に入っています。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, naming, status, errors）
//! - **config**: 不変の設定（ProviderConfig）
//! - **ports**: 抽象化レイヤー（ArtifactStore, ProcessRunner, Clock, IdGenerator）
//! - **impls**: 実装（LocalArtifactStore, StagingManager, TokioProcessRunner, ScriptedRunner）
//! - **app**: アプリケーションロジック（builder, provider, controller, command）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{BackupProvider, InfluxProvider, ProviderBuilder};
pub use config::{ProviderConfig, SelectionOptions};
pub use domain::{BackupError, BackupStatus, ErrorKind};
pub use ports::ExecContext;
