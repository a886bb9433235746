//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部（ファイルシステム、外部プロセス、時計）へのインターフェースで、
//! 実装は `impls` にあります。
//!
//! # 設計原則
//! - ファイルシステムが source of truth（正本）。DB もインデックスも持たない
//! - 外部ツールは不透明なプログラム（argv + timeout）
//! - 時刻と ID 生成は差し替え可能（テストで決定的にするため）

pub mod artifact_store;
pub mod clock;
pub mod id_generator;
pub mod process_runner;

// 主要な trait を再エクスポート
pub use self::artifact_store::{ArtifactEntry, ArtifactStore};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::process_runner::{CommandLine, ExecContext, ProcessError, ProcessOutput, ProcessRunner};
