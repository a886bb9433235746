//! Provider - ホスト（スケジューラ / webhook サーバ）向けの契約
//!
//! ホストは文字列の ID と timeout を渡して呼び出します。
//! 実装は `InfluxProvider` で、`ProviderBuilder` で組み立てます。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::app::command::version_command;
use crate::app::controller::BackupController;
use crate::domain::{BackupError, BackupStatus, ExternalId};
use crate::ports::{ExecContext, ProcessRunner};

/// ツール確認（`influxd version`）の制限時間
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// BackupProvider はホストから見たバックアップ操作
#[async_trait]
pub trait BackupProvider: Send + Sync {
    /// 設定を検証し、backups root とステージング root を準備する
    ///
    /// 前回のプロセスが残したステージングと中断された commit もここで片付ける
    async fn initialize(&self) -> Result<(), BackupError>;

    async fn create_backup(
        &self,
        external_id: &str,
        timeout: Duration,
        context: &ExecContext,
    ) -> Result<BackupStatus, BackupError>;

    async fn list_backups(&self) -> Result<Vec<BackupStatus>, BackupError>;

    /// 存在しなければ `Ok(None)`
    async fn get_backup(&self, external_id: &str) -> Result<Option<BackupStatus>, BackupError>;

    /// 存在しなければ `NotFound`。失敗した create（error marker）は成功扱い
    async fn delete_backup(&self, external_id: &str) -> Result<(), BackupError>;
}

pub struct InfluxProvider {
    controller: BackupController,
    runner: Arc<dyn ProcessRunner>,
}

impl InfluxProvider {
    pub(crate) fn new(controller: BackupController, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { controller, runner }
    }

    pub fn controller(&self) -> &BackupController {
        &self.controller
    }

    async fn probe_tool(&self) -> Result<String, BackupError> {
        let command = version_command(self.controller.config());
        let output = self
            .runner
            .run(&command, PROBE_TIMEOUT, &ExecContext::default())
            .await
            .map_err(|e| {
                BackupError::Configuration(format!("backup tool `{command}` is not usable: {e}"))
            })?;
        Ok(output.summary().to_string())
    }
}

#[async_trait]
impl BackupProvider for InfluxProvider {
    async fn initialize(&self) -> Result<(), BackupError> {
        let config = self.controller.config();
        config.validate()?;

        self.controller
            .staging()
            .prepare()
            .await
            .map_err(|e| BackupError::Configuration(format!("cannot create staging root: {e}")))?;
        self.controller.staging().sweep().await?;
        self.controller
            .store()
            .prepare()
            .await
            .map_err(|e| BackupError::Configuration(format!("cannot create backups root: {e}")))?;
        self.controller.store().sweep_incoming().await?;

        let version = if config.probe_tool {
            self.probe_tool().await?
        } else {
            debug!("tool probe disabled");
            "unknown".to_string()
        };

        info!(
            backups_root = %config.backups_root.display(),
            staging_root = %config.staging_root.display(),
            target = %config.address(),
            database = %config.database,
            tool_version = %version,
            "InfluxDB backup provider ready"
        );
        Ok(())
    }

    async fn create_backup(
        &self,
        external_id: &str,
        timeout: Duration,
        context: &ExecContext,
    ) -> Result<BackupStatus, BackupError> {
        info!(external_id, timeout_secs = timeout.as_secs(), "create backup");
        let external_id = ExternalId::parse(external_id)?;
        self.controller.create(&external_id, timeout, context).await
    }

    async fn list_backups(&self) -> Result<Vec<BackupStatus>, BackupError> {
        self.controller.get_all().await
    }

    async fn get_backup(&self, external_id: &str) -> Result<Option<BackupStatus>, BackupError> {
        // 不正な ID の artifact は存在し得ない
        let Ok(external_id) = ExternalId::parse(external_id) else {
            return Ok(None);
        };
        self.controller.get(&external_id).await
    }

    async fn delete_backup(&self, external_id: &str) -> Result<(), BackupError> {
        info!(external_id, "delete backup");
        let Ok(parsed) = ExternalId::parse(external_id) else {
            return Err(BackupError::NotFound(external_id.to_string()));
        };
        self.controller.delete(&parsed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::builder::ProviderBuilder;
    use crate::config::{ProviderConfig, SelectionOptions};
    use crate::domain::ErrorKind;
    use crate::impls::{ScriptedRunner, ToolBehavior};
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> ProviderConfig {
        ProviderConfig::new(tmp.path().join("backups"), "localhost", 8088, "metrics")
            .with_staging_root(tmp.path().join("staging"))
    }

    fn provider(config: ProviderConfig, runner: ScriptedRunner) -> InfluxProvider {
        ProviderBuilder::new(config)
            .with_runner(Arc::new(runner))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_prepares_directories_and_probes_tool() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(ToolBehavior::SucceedEmpty));
        let provider = ProviderBuilder::new(config(&tmp))
            .with_runner(runner.clone())
            .build()
            .unwrap();

        provider.initialize().await.unwrap();

        assert!(tmp.path().join("backups").is_dir());
        assert!(tmp.path().join("staging").is_dir());
        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command.to_string(), "influxd version");
    }

    #[tokio::test]
    async fn test_initialize_fails_when_tool_missing() {
        let tmp = TempDir::new().unwrap();
        let provider = provider(
            config(&tmp),
            ScriptedRunner::new(ToolBehavior::Fail {
                code: 127,
                stderr: "influxd: not found".to_string(),
            }),
        );
        let err = provider.initialize().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_initialize_skips_probe_when_disabled() {
        let tmp = TempDir::new().unwrap();
        let provider = provider(
            config(&tmp).with_probe_tool(false),
            ScriptedRunner::new(ToolBehavior::Timeout),
        );
        provider.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_never_reaches_initialize() {
        let tmp = TempDir::new().unwrap();
        let bad = config(&tmp).with_selection(SelectionOptions {
            start: Some("yesterday".to_string()),
            ..Default::default()
        });
        let result = ProviderBuilder::new(bad)
            .with_runner(Arc::new(ScriptedRunner::succeeding()))
            .build();
        assert!(matches!(result, Err(BackupError::Configuration(msg)) if msg.contains("--start")));
        // ディレクトリも作られない
        assert!(!tmp.path().join("backups").exists());
    }

    #[tokio::test]
    async fn test_job_1_scenario() {
        let tmp = TempDir::new().unwrap();
        let provider = provider(config(&tmp).with_probe_tool(false), ScriptedRunner::succeeding());
        provider.initialize().await.unwrap();
        assert!(provider.list_backups().await.unwrap().is_empty());

        provider
            .create_backup("job-1", Duration::from_secs(30), &ExecContext::default())
            .await
            .unwrap();
        let all = provider.list_backups().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id.as_str(), "job-1");

        provider.delete_backup("job-1").await.unwrap();
        assert!(provider.list_backups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_2_timeout_scenario() {
        let tmp = TempDir::new().unwrap();
        let provider = provider(
            config(&tmp).with_probe_tool(false),
            ScriptedRunner::new(ToolBehavior::Timeout),
        );
        provider.initialize().await.unwrap();

        let err = provider
            .create_backup("job-2", Duration::from_secs(1), &ExecContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tool);
        assert!(provider.get_backup("job-2").await.unwrap().is_none());
        provider.delete_backup("job-2").await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_ids() {
        let tmp = TempDir::new().unwrap();
        let provider = provider(config(&tmp).with_probe_tool(false), ScriptedRunner::succeeding());
        provider.initialize().await.unwrap();

        let err = provider
            .create_backup("a---b", Duration::from_secs(30), &ExecContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(provider.get_backup("../etc").await.unwrap().is_none());
        assert_eq!(
            provider.delete_backup("a---b").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_initialize_cleans_leftovers_of_previous_run() {
        let tmp = TempDir::new().unwrap();
        let backups = tmp.path().join("backups");
        let incoming = backups.join(".incoming-20240101000000-1-0");
        std::fs::create_dir_all(&incoming).unwrap();
        std::fs::write(incoming.join("s1.tar.gz"), b"partial").unwrap();
        let committed = backups.join("influx---job-1---20240101000000");
        std::fs::create_dir(&committed).unwrap();
        let stale_staging = tmp
            .path()
            .join("staging")
            .join("20240101000000-01HQ3V7W8X9Y0Z1A2B3C4D5E6F");
        std::fs::create_dir_all(&stale_staging).unwrap();

        let provider = provider(config(&tmp).with_probe_tool(false), ScriptedRunner::succeeding());
        provider.initialize().await.unwrap();

        assert!(!incoming.exists());
        assert!(!stale_staging.exists());
        assert!(committed.is_dir());
        assert_eq!(provider.list_backups().await.unwrap().len(), 1);
    }
}
