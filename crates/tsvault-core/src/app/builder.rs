//! ProviderBuilder - InfluxProvider の組み立て
//!
//! 設定の検証はディレクトリを作るよりも前（`build()`）に行います。
//! 不正な設定ではファイルシステムに何も残りません。
//!
//! 指定されなかった port は本番用（TokioProcessRunner, LocalArtifactStore,
//! SystemClock）になり、ステージング ID の生成器は同じ Clock を共有します。

use std::sync::Arc;

use crate::app::controller::BackupController;
use crate::app::provider::InfluxProvider;
use crate::config::ProviderConfig;
use crate::domain::BackupError;
use crate::impls::{LocalArtifactStore, StagingManager, TokioProcessRunner};
use crate::ports::{ArtifactStore, Clock, IdGenerator, ProcessRunner, SystemClock, UlidGenerator};

/// ProviderBuilder は InfluxProvider を構築
///
/// # 使用例
/// ```ignore
/// let provider = ProviderBuilder::new(config)
///     .with_runner(Arc::new(ScriptedRunner::succeeding()))
///     .build()?;
/// provider.initialize().await?;
/// ```
pub struct ProviderBuilder {
    config: ProviderConfig,
    runner: Option<Arc<dyn ProcessRunner>>,
    store: Option<Arc<dyn ArtifactStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl ProviderBuilder {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            runner: None,
            store: None,
            clock: None,
            ids: None,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<InfluxProvider, BackupError> {
        self.config.validate()?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let runner: Arc<dyn ProcessRunner> = match self.runner {
            Some(runner) => runner,
            None => Arc::new(TokioProcessRunner::new()),
        };
        let store: Arc<dyn ArtifactStore> = match self.store {
            Some(store) => store,
            None => Arc::new(LocalArtifactStore::new(&self.config.backups_root)),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(clock.clone())),
        };
        let staging = StagingManager::new(&self.config.staging_root, ids);

        let controller = BackupController::new(
            Arc::new(self.config),
            runner.clone(),
            store,
            staging,
            clock,
        );
        Ok(InfluxProvider::new(controller, runner))
    }
}
