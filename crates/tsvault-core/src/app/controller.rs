//! BackupController - バックアップのライフサイクルを組み立てる
//!
//! ProcessRunner / StagingManager / ArtifactStore を組み合わせて
//! create / get_all / get / delete を実装します。
//!
//! # create の状態遷移
//! ```text
//! START → STAGING_ACQUIRED → TOOL_RUNNING → { COMMITTED | FAILED(error marker) } → STAGING_RELEASED
//! ```
//!
//! ステージングはどの経路でも release されます。
//!
//! 1 つの external id に対応する artifact は常に最大 1 件です。
//! 成功すれば古い artifact を消し、失敗すれば既存の artifact も消して error marker だけを残します。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::app::command::backup_command;
use crate::app::locks::KeyedLocks;
use crate::config::ProviderConfig;
use crate::domain::{BackupError, BackupStatus, CorrelationId, ExternalId};
use crate::impls::{StagingDir, StagingManager};
use crate::ports::{ArtifactStore, Clock, ExecContext, ProcessError, ProcessRunner};

pub struct BackupController {
    config: Arc<ProviderConfig>,
    runner: Arc<dyn ProcessRunner>,
    store: Arc<dyn ArtifactStore>,
    staging: StagingManager,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
}

impl BackupController {
    pub fn new(
        config: Arc<ProviderConfig>,
        runner: Arc<dyn ProcessRunner>,
        store: Arc<dyn ArtifactStore>,
        staging: StagingManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            runner,
            store,
            staging,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn staging(&self) -> &StagingManager {
        &self.staging
    }

    /// 新しいバックアップを作成
    ///
    /// ツールの失敗とタイムアウトは同じ扱いです:
    /// error marker（中身は correlation id）を書いてからエラーを返します。
    pub async fn create(
        &self,
        external_id: &ExternalId,
        timeout: Duration,
        context: &ExecContext,
    ) -> Result<BackupStatus, BackupError> {
        let _guard = self.locks.lock(external_id).await;

        let correlation_id = CorrelationId::from_timestamp(self.clock.now());
        debug!(external_id = %external_id, correlation_id = %correlation_id, "create: start");

        let staging = self.staging.acquire(&correlation_id).await?;
        debug!(external_id = %external_id, path = %staging.path().display(), "create: staging acquired");

        let outcome = self
            .run_and_commit(external_id, &correlation_id, &staging, timeout, context)
            .await;

        // 結果に関係なく release する
        match staging.release().await {
            Ok(()) => debug!(external_id = %external_id, "create: staging released"),
            // コミット済みなら結果は変えない。残骸は次回の initialize で sweep される
            Err(e) => warn!(external_id = %external_id, error = %e, "create: staging release failed"),
        }

        outcome
    }

    async fn run_and_commit(
        &self,
        external_id: &ExternalId,
        correlation_id: &CorrelationId,
        staging: &StagingDir,
        timeout: Duration,
        context: &ExecContext,
    ) -> Result<BackupStatus, BackupError> {
        let command = backup_command(&self.config, staging.path());
        debug!(external_id = %external_id, command = %command, "create: tool running");

        if let Err(e) = self.runner.run(&command, timeout, context).await {
            let err = match e {
                ProcessError::TimedOut { elapsed } => {
                    warn!(
                        external_id = %external_id,
                        elapsed_secs = elapsed.as_secs(),
                        "backup tool timeout enforced"
                    );
                    BackupError::ToolTimeout { timeout }
                }
                other => {
                    warn!(external_id = %external_id, error = %other, "backup tool failed");
                    BackupError::ToolExecution {
                        message: other.to_string(),
                    }
                }
            };
            return Err(self.record_failure(external_id, correlation_id, err).await);
        }

        let entry = match self.store.commit(staging.path(), external_id, correlation_id).await {
            Ok(entry) => entry,
            Err(err) => {
                return Err(self.record_failure(external_id, correlation_id, err).await);
            }
        };

        let replaced = self.store.retain_only(external_id, correlation_id).await?;
        if replaced > 0 {
            debug!(external_id = %external_id, replaced, "create: removed older artifacts");
        }

        // 以前の失敗の marker が残っていれば消す（成功した id は tombstone ではない）
        if self.store.remove_error_marker(external_id).await? {
            debug!(external_id = %external_id, "create: cleared stale error marker");
        }

        info!(
            external_id = %external_id,
            correlation_id = %correlation_id,
            size_bytes = entry.size_bytes,
            "backup committed"
        );
        Ok(entry.to_status())
    }

    /// error marker を書き、同じ id の既存 artifact を消して、返すべきエラーを決める
    ///
    /// marker の書き込みや artifact の削除に失敗した場合はそちらのエラーを返します。
    async fn record_failure(
        &self,
        external_id: &ExternalId,
        correlation_id: &CorrelationId,
        err: BackupError,
    ) -> BackupError {
        if let Err(marker_err) = self.store.write_error_marker(external_id, correlation_id).await {
            error!(
                external_id = %external_id,
                error = %marker_err,
                tool_error = %err,
                "failed to write error marker"
            );
            return marker_err;
        }
        debug!(external_id = %external_id, "create: failed, error marker written");

        match self.store.delete(external_id).await {
            Ok(true) => {
                debug!(external_id = %external_id, "create: removed artifacts of the failed id");
                err
            }
            Ok(false) => err,
            Err(delete_err) => {
                error!(
                    external_id = %external_id,
                    error = %delete_err,
                    tool_error = %err,
                    "failed to remove artifacts of the failed id"
                );
                delete_err
            }
        }
    }

    /// コミット済みバックアップの一覧（すべて available）
    pub async fn get_all(&self) -> Result<Vec<BackupStatus>, BackupError> {
        let entries = self.store.enumerate().await?;
        debug!(count = entries.len(), "get_all");
        Ok(entries.iter().map(|entry| entry.to_status()).collect())
    }

    /// 1 件取得。存在しなければ `Ok(None)`
    pub async fn get(&self, external_id: &ExternalId) -> Result<Option<BackupStatus>, BackupError> {
        let entry = self.store.locate(external_id).await?;
        if entry.is_none() {
            debug!(external_id = %external_id, "get: not found");
        }
        Ok(entry.map(|entry| entry.to_status()))
    }

    /// バックアップを削除
    ///
    /// - error marker がある: marker を消して成功（失敗した create は「削除済み」扱い）
    /// - artifact がない: `NotFound`
    /// - artifact がある: その id の artifact をすべて削除
    pub async fn delete(&self, external_id: &ExternalId) -> Result<(), BackupError> {
        let _guard = self.locks.lock(external_id).await;

        if self.store.has_error_marker(external_id).await? {
            self.store.remove_error_marker(external_id).await?;
            // 古い成功分が残っていれば一緒に消す
            self.store.delete(external_id).await?;
            info!(external_id = %external_id, "delete: removed error marker of failed backup");
            return Ok(());
        }

        if self.store.delete(external_id).await? {
            Ok(())
        } else {
            debug!(external_id = %external_id, "delete: not found");
            Err(BackupError::NotFound(external_id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{LocalArtifactStore, ScriptedRunner, ToolBehavior};
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use tempfile::TempDir;

    struct Harness {
        _tmp: TempDir,
        controller: BackupController,
        runner: Arc<ScriptedRunner>,
    }

    impl Harness {
        async fn new(behavior: ToolBehavior) -> Self {
            Self::with_runner(Arc::new(ScriptedRunner::new(behavior))).await
        }

        async fn with_runner(runner: Arc<ScriptedRunner>) -> Self {
            let tmp = TempDir::new().unwrap();
            let config = ProviderConfig::new(tmp.path().join("backups"), "localhost", 8088, "metrics")
                .with_staging_root(tmp.path().join("staging"));
            let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap());
            let store = Arc::new(LocalArtifactStore::new(&config.backups_root));
            store.prepare().await.unwrap();
            let staging = StagingManager::new(
                &config.staging_root,
                Arc::new(UlidGenerator::new(clock)),
            );
            let controller = BackupController::new(
                Arc::new(config),
                runner.clone(),
                store,
                staging,
                Arc::new(clock),
            );
            Self {
                _tmp: tmp,
                controller,
                runner,
            }
        }

        fn backups_root(&self) -> &Path {
            &self.controller.config().backups_root
        }

        fn staging_is_empty(&self) -> bool {
            let root = &self.controller.config().staging_root;
            !root.exists() || std::fs::read_dir(root).unwrap().next().is_none()
        }
    }

    fn id(raw: &str) -> ExternalId {
        ExternalId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_list_then_delete() {
        let h = Harness::with_runner(Arc::new(ScriptedRunner::succeeding())).await;
        let job = id("job-1");

        let created = h
            .controller
            .create(&job, Duration::from_secs(30), &ExecContext::default())
            .await
            .unwrap();
        assert_eq!(created.data_id.as_str(), "20240501030000");

        let all = h.controller.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, job);

        let got = h.controller.get(&job).await.unwrap().unwrap();
        assert_eq!(got.data_id, created.data_id);
        assert_eq!(got.size_mb, 2048.0 / (1024.0 * 1024.0));

        h.controller.delete(&job).await.unwrap();
        assert!(h.controller.get_all().await.unwrap().is_empty());
        assert!(h.staging_is_empty());
    }

    #[tokio::test]
    async fn test_command_targets_unique_staging_dir() {
        let h = Harness::with_runner(Arc::new(ScriptedRunner::succeeding())).await;
        h.controller
            .create(&id("job-1"), Duration::from_secs(30), &ExecContext::default())
            .await
            .unwrap();

        let calls = h.runner.invocations();
        assert_eq!(calls.len(), 1);
        let staging_arg = calls[0].command.args.last().unwrap();
        assert!(Path::new(staging_arg).starts_with(&h.controller.config().staging_root));
        assert!(staging_arg.contains("20240501030000-"));
        assert_eq!(calls[0].timeout, Duration::from_secs(30));
        assert!(calls[0].command.args.contains(&"-host=localhost:8088".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_writes_marker_and_get_is_none() {
        let h = Harness::new(ToolBehavior::Timeout).await;
        let job = id("job-2");

        let err = h
            .controller
            .create(&job, Duration::from_secs(1), &ExecContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::ToolTimeout { .. }));

        let marker = h.backups_root().join("job-2.err");
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "20240501030000");
        assert!(h.controller.get(&job).await.unwrap().is_none());
        assert!(h.controller.get_all().await.unwrap().is_empty());
        assert!(h.staging_is_empty());

        h.controller.delete(&job).await.unwrap();
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_tool_failure_is_recorded_like_timeout() {
        let h = Harness::new(ToolBehavior::Fail {
            code: 1,
            stderr: "connection refused".to_string(),
        })
        .await;
        let job = id("job-3");

        let err = h
            .controller
            .create(&job, Duration::from_secs(5), &ExecContext::default())
            .await
            .unwrap_err();
        match err {
            BackupError::ToolExecution { message } => assert!(message.contains("connection refused")),
            other => panic!("expected ToolExecution, got {other:?}"),
        }
        assert!(h.backups_root().join("job-3.err").exists());
        assert!(h.staging_is_empty());

        // 失敗した create は削除済み扱い
        h.controller.delete(&job).await.unwrap();
        assert!(matches!(
            h.controller.delete(&job).await,
            Err(BackupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_tool_output_is_a_failure() {
        let h = Harness::new(ToolBehavior::SucceedEmpty).await;
        let job = id("job-4");

        let err = h
            .controller
            .create(&job, Duration::from_secs(5), &ExecContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::ToolExecution { .. }));
        assert!(h.backups_root().join("job-4.err").exists());
        assert!(h.controller.get(&job).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_twice_returns_not_found() {
        let h = Harness::with_runner(Arc::new(ScriptedRunner::succeeding())).await;
        let job = id("job-5");
        h.controller
            .create(&job, Duration::from_secs(30), &ExecContext::default())
            .await
            .unwrap();

        h.controller.delete(&job).await.unwrap();
        let err = h.controller.delete(&job).await.unwrap_err();
        assert!(matches!(err, BackupError::NotFound(ref raw) if raw == "job-5"));
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let h = Harness::new(ToolBehavior::Timeout).await;
        let err = h.controller.delete(&id("never")).await.unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_success_clears_previous_error_marker() {
        let h = Harness::with_runner(Arc::new(ScriptedRunner::succeeding())).await;
        let job = id("job-6");
        std::fs::write(h.backups_root().join("job-6.err"), "20240101000000").unwrap();

        h.controller
            .create(&job, Duration::from_secs(30), &ExecContext::default())
            .await
            .unwrap();
        assert!(!h.backups_root().join("job-6.err").exists());
        assert!(h.controller.get(&job).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_garbage_in_root_does_not_break_listing() {
        let h = Harness::with_runner(Arc::new(ScriptedRunner::succeeding())).await;
        h.controller
            .create(&id("job-7"), Duration::from_secs(30), &ExecContext::default())
            .await
            .unwrap();
        std::fs::write(h.backups_root().join("lost+found---x"), b"??").unwrap();

        let all = h.controller.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id.as_str(), "job-7");
    }

    #[tokio::test]
    async fn test_exec_context_is_forwarded() {
        let h = Harness::with_runner(Arc::new(ScriptedRunner::succeeding())).await;
        let context = ExecContext::default().with_env("INFLUX_USERNAME", "backup");
        h.controller
            .create(&id("job-8"), Duration::from_secs(30), &context)
            .await
            .unwrap();
        assert_eq!(h.runner.invocations()[0].context, context);
    }

    #[tokio::test]
    async fn test_recreate_in_same_second_replaces_artifact() {
        let h = Harness::with_runner(Arc::new(ScriptedRunner::succeeding())).await;
        let job = id("job-1");
        for _ in 0..2 {
            h.controller
                .create(&job, Duration::from_secs(30), &ExecContext::default())
                .await
                .unwrap();
        }

        let all = h.controller.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data_id.as_str(), "20240501030000");
        assert!(!h.backups_root().join("job-1.err").exists());
    }

    #[tokio::test]
    async fn test_create_drops_older_artifacts_of_the_id() {
        let h = Harness::with_runner(Arc::new(ScriptedRunner::succeeding())).await;
        let older = h.backups_root().join("influx---job-1---20240101000000");
        std::fs::create_dir(&older).unwrap();
        std::fs::write(older.join("old.s1.tar.gz"), vec![0u8; 64]).unwrap();

        h.controller
            .create(&id("job-1"), Duration::from_secs(30), &ExecContext::default())
            .await
            .unwrap();

        let all = h.controller.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data_id.as_str(), "20240501030000");
        assert!(!older.exists());
    }

    #[tokio::test]
    async fn test_failed_recreate_hides_previous_backup() {
        let runner = ScriptedRunner::succeeding().then(ToolBehavior::Timeout);
        let h = Harness::with_runner(Arc::new(runner)).await;
        let job = id("job-1");

        h.controller
            .create(&job, Duration::from_secs(30), &ExecContext::default())
            .await
            .unwrap();
        let err = h
            .controller
            .create(&job, Duration::from_secs(1), &ExecContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::ToolTimeout { .. }));

        assert!(h.controller.get(&job).await.unwrap().is_none());
        assert!(h.controller.get_all().await.unwrap().is_empty());
        assert!(h.backups_root().join("job-1.err").exists());

        h.controller.delete(&job).await.unwrap();
        assert!(matches!(
            h.controller.delete(&job).await,
            Err(BackupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_clears_duplicates_left_on_disk() {
        let h = Harness::new(ToolBehavior::Timeout).await;
        for name in [
            "influx---job-9---20240101000000",
            "influx---job-9---20240102000000",
        ] {
            std::fs::create_dir(h.backups_root().join(name)).unwrap();
        }
        let job = id("job-9");

        h.controller.delete(&job).await.unwrap();
        assert!(h.controller.get(&job).await.unwrap().is_none());
        assert!(matches!(
            h.controller.delete(&job).await,
            Err(BackupError::NotFound(_))
        ));
    }
}
