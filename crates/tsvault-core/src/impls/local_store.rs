//! LocalArtifactStore - ローカルファイルシステムの ArtifactStore
//!
//! # コミットの手順
//! 1. backups root 内の隠しディレクトリ `.incoming-<corr>-<pid>-<n>` にステージングをコピー
//! 2. 全ファイルのコピーが終わってから `rename` で最終名に変える
//!
//! rename は同一ファイルシステム内でアトミックなので、
//! enumerate が「名前はあるが中身が途中」の artifact を見ることはありません。
//! コピー途中でクラッシュしても残るのはデコードできない隠しディレクトリだけで、
//! 次回の `sweep_incoming` で消えます。
//!
//! 同じ名前の artifact が既にある場合（同じ秒の再作成）は、既存のものを
//! 隠し名に退避してから置き換えます。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::{ArtifactName, BackupError, CorrelationId, ExternalId, error_marker_name};
use crate::ports::{ArtifactEntry, ArtifactStore};

const INCOMING_PREFIX: &str = ".incoming-";

/// サイズを数えるアーカイブの拡張子
pub const PAYLOAD_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".gz", ".tar", ".zst"];

pub struct LocalArtifactStore {
    root: PathBuf,
    incoming_seq: AtomicU64,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            incoming_seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn marker_path(&self, external_id: &ExternalId) -> PathBuf {
        self.root.join(error_marker_name(external_id))
    }

    async fn entries_for(&self, external_id: &ExternalId) -> Result<Vec<ArtifactEntry>, BackupError> {
        Ok(self
            .enumerate()
            .await?
            .into_iter()
            .filter(|entry| entry.external_id() == external_id)
            .collect())
    }

    /// 1 件削除。既に無ければ `Ok(false)`
    async fn remove_artifact(&self, entry: &ArtifactEntry) -> Result<bool, BackupError> {
        match remove_entry(&entry.path).await {
            Ok(()) => {
                info!(
                    external_id = %entry.external_id(),
                    correlation_id = %entry.correlation_id(),
                    "artifact deleted"
                );
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BackupError::io(
                format!("remove artifact {}", entry.path.display()),
                e,
            )),
        }
    }

    fn incoming_path(&self, correlation_id: &CorrelationId) -> PathBuf {
        let seq = self.incoming_seq.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(
            "{INCOMING_PREFIX}{correlation_id}-{}-{seq}",
            std::process::id()
        ))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn prepare(&self) -> Result<(), BackupError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| BackupError::io(format!("create backups root {}", self.root.display()), e))
    }

    async fn commit(
        &self,
        staging: &Path,
        external_id: &ExternalId,
        correlation_id: &CorrelationId,
    ) -> Result<ArtifactEntry, BackupError> {
        let name = ArtifactName::new(external_id.clone(), correlation_id.clone());
        let target = self.root.join(name.encode());
        let incoming = self.incoming_path(correlation_id);

        let root = staging.to_path_buf();
        let copy_to = incoming.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&root, &copy_to))
            .await
            .map_err(|e| BackupError::io("copy staged files", std::io::Error::other(e)))?;

        let files = match copied {
            Ok(files) => files,
            Err(e) => {
                remove_quietly(&incoming).await;
                return Err(e);
            }
        };
        if files == 0 {
            remove_quietly(&incoming).await;
            return Err(BackupError::ToolExecution {
                message: format!(
                    "backup tool reported success but wrote nothing to {}",
                    staging.display()
                ),
            });
        }

        let displaced = match tokio::fs::symlink_metadata(&target).await {
            Ok(_) => {
                let aside = self.incoming_path(correlation_id);
                if let Err(e) = tokio::fs::rename(&target, &aside).await {
                    remove_quietly(&incoming).await;
                    return Err(BackupError::io(
                        format!("displace artifact {}", target.display()),
                        e,
                    ));
                }
                Some(aside)
            }
            Err(_) => None,
        };

        if let Err(e) = tokio::fs::rename(&incoming, &target).await {
            remove_quietly(&incoming).await;
            if let Some(aside) = &displaced {
                remove_quietly(aside).await;
            }
            return Err(BackupError::io(
                format!("publish artifact {}", target.display()),
                e,
            ));
        }
        if let Some(aside) = &displaced {
            debug!(path = %target.display(), "replaced artifact with the same name");
            remove_quietly(aside).await;
        }

        let size_bytes = artifact_size(&target).await?;
        info!(
            external_id = %external_id,
            correlation_id = %correlation_id,
            files,
            size_bytes,
            path = %target.display(),
            "artifact committed"
        );
        Ok(ArtifactEntry {
            name,
            path: target,
            size_bytes,
        })
    }

    async fn enumerate(&self) -> Result<Vec<ArtifactEntry>, BackupError> {
        let context = || format!("list backups root {}", self.root.display());
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| BackupError::io(context(), e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| BackupError::io(context(), e))?
        {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                debug!(name = ?file_name, "skipping non-utf8 entry");
                continue;
            };
            let name = match ArtifactName::decode(file_name) {
                Ok(name) => name,
                Err(e) => {
                    debug!(name = file_name, reason = %e, "skipping entry");
                    continue;
                }
            };
            let path = entry.path();
            // enumerate と delete が競合した場合、消えた entry は数えない
            let size_bytes = match artifact_size(&path).await {
                Ok(size) => size,
                Err(e) if is_not_found(&e) => continue,
                Err(e) => return Err(e),
            };
            entries.push(ArtifactEntry {
                name,
                path,
                size_bytes,
            });
        }

        entries.sort_by(|a, b| {
            a.external_id()
                .cmp(b.external_id())
                .then_with(|| b.correlation_id().cmp(a.correlation_id()))
        });
        Ok(entries)
    }

    async fn delete(&self, external_id: &ExternalId) -> Result<bool, BackupError> {
        let mut removed = 0;
        for entry in self.entries_for(external_id).await? {
            if self.remove_artifact(&entry).await? {
                removed += 1;
            }
        }
        Ok(removed > 0)
    }

    async fn retain_only(
        &self,
        external_id: &ExternalId,
        keep: &CorrelationId,
    ) -> Result<usize, BackupError> {
        let mut removed = 0;
        for entry in self.entries_for(external_id).await? {
            if entry.correlation_id() != keep && self.remove_artifact(&entry).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn sweep_incoming(&self) -> Result<usize, BackupError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(BackupError::io(
                    format!("list backups root {}", self.root.display()),
                    e,
                ));
            }
        };

        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await.map_err(|e| {
            BackupError::io(format!("list backups root {}", self.root.display()), e)
        })? {
            let is_incoming = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(INCOMING_PREFIX));
            if !is_incoming {
                continue;
            }
            match remove_entry(&entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to sweep incoming dir"),
            }
        }
        if removed > 0 {
            info!(removed, root = %self.root.display(), "swept interrupted commits");
        }
        Ok(removed)
    }

    async fn write_error_marker(
        &self,
        external_id: &ExternalId,
        correlation_id: &CorrelationId,
    ) -> Result<(), BackupError> {
        let path = self.marker_path(external_id);
        tokio::fs::write(&path, correlation_id.as_str())
            .await
            .map_err(|e| BackupError::io(format!("write error marker {}", path.display()), e))?;
        restrict_permissions(&path).await;
        debug!(external_id = %external_id, path = %path.display(), "error marker written");
        Ok(())
    }

    async fn has_error_marker(&self, external_id: &ExternalId) -> Result<bool, BackupError> {
        let path = self.marker_path(external_id);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| BackupError::io(format!("stat error marker {}", path.display()), e))
    }

    async fn remove_error_marker(&self, external_id: &ExternalId) -> Result<bool, BackupError> {
        let path = self.marker_path(external_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BackupError::io(
                format!("remove error marker {}", path.display()),
                e,
            )),
        }
    }
}

/// artifact のサイズ
///
/// - ファイル: そのサイズ
/// - ディレクトリ: 中のアーカイブ（PAYLOAD_SUFFIXES）の合計。見つからなければ 0
async fn artifact_size(path: &Path) -> Result<u64, BackupError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| BackupError::io(format!("stat artifact {}", path.display()), e))?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }

    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || payload_size(&owned))
        .await
        .map_err(|e| BackupError::io("measure artifact", std::io::Error::other(e)))?
}

fn payload_size(dir: &Path) -> Result<u64, BackupError> {
    let mut total = 0;
    let read = std::fs::read_dir(dir)
        .map_err(|e| BackupError::io(format!("list artifact {}", dir.display()), e))?;
    for entry in read {
        let entry = entry.map_err(|e| BackupError::io(format!("list artifact {}", dir.display()), e))?;
        let meta = entry
            .metadata()
            .map_err(|e| BackupError::io(format!("stat {}", entry.path().display()), e))?;
        if meta.is_dir() {
            total += payload_size(&entry.path())?;
        } else if is_payload(&entry.file_name().to_string_lossy()) {
            total += meta.len();
        }
    }
    Ok(total)
}

fn is_payload(file_name: &str) -> bool {
    PAYLOAD_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix))
}

/// ステージングの中身を `dst` にコピーし、コピーしたファイル数を返す
fn copy_tree(src: &Path, dst: &Path) -> Result<usize, BackupError> {
    std::fs::create_dir_all(dst)
        .map_err(|e| BackupError::io(format!("create {}", dst.display()), e))?;
    let read = std::fs::read_dir(src)
        .map_err(|e| BackupError::io(format!("list staging {}", src.display()), e))?;

    let mut files = 0;
    for entry in read {
        let entry = entry.map_err(|e| BackupError::io(format!("list staging {}", src.display()), e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| BackupError::io(format!("stat {}", from.display()), e))?;
        if file_type.is_dir() {
            files += copy_tree(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(|e| {
                BackupError::io(format!("copy {} -> {}", from.display(), to.display()), e)
            })?;
            files += 1;
        }
    }

    // rename の前に内容をディスクに落とす
    if let Ok(dir) = std::fs::File::open(dst) {
        let _ = dir.sync_all();
    }
    Ok(files)
}

/// ディレクトリでもファイルでも削除（シンボリックリンクは辿らない）
async fn remove_entry(path: &Path) -> std::io::Result<()> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = remove_entry(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove incoming dir");
    }
}

fn is_not_found(err: &BackupError) -> bool {
    matches!(err, BackupError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await;
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) {}
