//! Domain model (ids, naming, status, errors).
//!
//! ファイルシステムにも外部プロセスにも依存しない純粋な部分です。

pub mod errors;
pub mod ids;
pub mod naming;
pub mod status;

pub use self::errors::{BackupError, ErrorKind};
pub use self::ids::{CorrelationId, ExternalId};
pub use self::naming::{ArtifactName, error_marker_name};
pub use self::status::{BackupState, BackupStatus};
