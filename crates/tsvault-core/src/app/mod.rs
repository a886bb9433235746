//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてバックアップのライフサイクルを実装します。
//!
//! # 主要コンポーネント
//! - **ProviderBuilder**: プロバイダの構築とワイヤリング
//! - **BackupProvider / InfluxProvider**: ホスト向けの契約
//! - **BackupController**: create / get_all / get / delete のオーケストレーション
//! - **command**: 外部ツールのコマンドライン生成
//! - **KeyedLocks**: external id ごとの排他

pub mod builder;
pub mod command;
pub mod controller;
pub mod locks;
pub mod provider;

// 主要な型を再エクスポート
pub use self::builder::ProviderBuilder;
pub use self::controller::BackupController;
pub use self::locks::KeyedLocks;
pub use self::provider::{BackupProvider, InfluxProvider};
