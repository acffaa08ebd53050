//! Upload stage: push a local asset tree to object storage.
//!
//! Every file under the tree root lands at `prefix + relative_path` with
//! posix separators. Large files go through the backend's multipart path;
//! the stage itself only decides keys, content types, and retries. Uploads
//! are idempotent, so re-running over the same tree and prefix overwrites
//! identically.

use crate::retry::RetryPolicy;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use vidpipe_core::media::content_type_for;
use vidpipe_core::{UploadReport, UploadSettings};
use vidpipe_storage::keys::object_key;
use vidpipe_storage::{Storage, StorageError};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum UploadError {
    /// Credentials or permissions rejected. Aborts the whole stage on
    /// first sight; retrying cannot help.
    #[error("Storage authorization failed: {0}")]
    Auth(String),

    /// Bad bucket or other backend misconfiguration. Aborts the whole
    /// stage on first sight, like an auth failure.
    #[error("Storage misconfigured: {0}")]
    Config(String),

    /// Every file transfer failed after retries.
    #[error("Uploads exhausted retries: {0}")]
    NetworkExhausted(String),

    /// Some files uploaded, some did not. Carries the failed relative
    /// paths so a re-run can be judged against them.
    #[error("Upload incomplete, {} file(s) failed: {:?}", .0.len(), .0)]
    PartialFailure(Vec<String>),

    #[error("IO error walking local tree: {0}")]
    Io(#[from] std::io::Error),
}

pub struct UploadStage {
    storage: Arc<dyn Storage>,
    retry: RetryPolicy,
    dry_run: bool,
}

impl UploadStage {
    pub fn new(storage: Arc<dyn Storage>, settings: &UploadSettings) -> Self {
        Self {
            storage,
            retry: RetryPolicy::from(&settings.retry),
            dry_run: settings.dry_run,
        }
    }

    /// Upload everything under `local_root` to `storage_prefix`. Either
    /// all files make it (an `UploadReport`) or the stage fails; the
    /// caller must not publish a URL on failure.
    pub async fn upload(
        &self,
        local_root: &Path,
        storage_prefix: &str,
    ) -> Result<UploadReport, UploadError> {
        let start = Instant::now();
        let mut uploaded_count = 0usize;
        let mut total_bytes = 0u64;
        let mut failed: Vec<String> = Vec::new();
        let mut last_error = String::new();

        for entry in WalkDir::new(local_root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                std::io::Error::other(format!("walk {}: {}", local_root.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(local_root) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let relative_display = relative.to_string_lossy().replace('\\', "/");

            let key = match object_key(storage_prefix, relative) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(path = %relative_display, error = %e, "Skipping unmappable file");
                    failed.push(relative_display);
                    continue;
                }
            };
            let content_type = content_type_for(&key);

            if self.dry_run {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                tracing::info!(key = %key, size_bytes = size, "Dry run, skipping upload");
                uploaded_count += 1;
                total_bytes += size;
                continue;
            }

            match self.put_with_retry(&key, entry.path(), content_type).await {
                Ok(bytes) => {
                    uploaded_count += 1;
                    total_bytes += bytes;
                }
                Err(StorageError::AccessDenied(msg)) => {
                    return Err(UploadError::Auth(msg));
                }
                Err(StorageError::ConfigError(msg)) => {
                    return Err(UploadError::Config(msg));
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "File upload failed");
                    last_error = e.to_string();
                    failed.push(relative_display);
                }
            }
        }

        if !failed.is_empty() {
            if uploaded_count == 0 {
                return Err(UploadError::NetworkExhausted(last_error));
            }
            return Err(UploadError::PartialFailure(failed));
        }

        let duration = start.elapsed();
        tracing::info!(
            prefix = %storage_prefix,
            uploaded_count,
            total_bytes,
            duration_ms = duration.as_millis() as u64,
            "Asset tree uploaded"
        );
        Ok(UploadReport {
            uploaded_count,
            total_bytes,
            duration,
        })
    }

    /// One file transfer under the retry policy. Only transient errors are
    /// retried; anything else surfaces immediately.
    async fn put_with_retry(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<u64, StorageError> {
        let mut attempt = 1u32;
        loop {
            match self.storage.put_file(key, path, content_type).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_before(attempt + 1);
                    tracing::warn!(
                        key = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient upload error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;
    use vidpipe_core::{RetrySettings, StorageBackend};
    use vidpipe_storage::local::LocalStorage;
    use vidpipe_storage::traits::{ByteChunkStream, ByteRange, RangedObject, StorageResult};

    fn settings() -> UploadSettings {
        UploadSettings {
            retry: RetrySettings {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
            ..UploadSettings::default()
        }
    }

    async fn make_tree(root: &Path) {
        for (rel, content) in [
            ("playlist.m3u8", "#EXTM3U\n"),
            ("seg_00000.ts", "segment zero"),
            ("variants/480p.m3u8", "#EXTM3U\n"),
        ] {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.unwrap();
            }
            tokio::fs::write(path, content).await.unwrap();
        }
    }

    #[tokio::test]
    async fn uploads_tree_under_prefix() {
        let tree = tempdir().unwrap();
        let store = tempdir().unwrap();
        make_tree(tree.path()).await;

        let storage = Arc::new(LocalStorage::new(store.path()).await.unwrap());
        let stage = UploadStage::new(storage.clone(), &settings());

        let report = stage.upload(tree.path(), "videos/42").await.unwrap();
        assert_eq!(report.uploaded_count, 3);
        assert!(report.total_bytes > 0);

        assert!(storage.exists("videos/42/playlist.m3u8").await.unwrap());
        assert!(storage.exists("videos/42/seg_00000.ts").await.unwrap());
        assert!(storage.exists("videos/42/variants/480p.m3u8").await.unwrap());
    }

    #[tokio::test]
    async fn rerun_overwrites_identically() {
        let tree = tempdir().unwrap();
        let store = tempdir().unwrap();
        make_tree(tree.path()).await;

        let storage = Arc::new(LocalStorage::new(store.path()).await.unwrap());
        let stage = UploadStage::new(storage.clone(), &settings());

        let first = stage.upload(tree.path(), "videos/42").await.unwrap();
        let second = stage.upload(tree.path(), "videos/42").await.unwrap();
        assert_eq!(first.uploaded_count, second.uploaded_count);
        assert_eq!(first.total_bytes, second.total_bytes);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let tree = tempdir().unwrap();
        let store = tempdir().unwrap();
        make_tree(tree.path()).await;

        let storage = Arc::new(LocalStorage::new(store.path()).await.unwrap());
        let stage = UploadStage::new(
            storage.clone(),
            &UploadSettings {
                dry_run: true,
                ..settings()
            },
        );

        let report = stage.upload(tree.path(), "videos/42").await.unwrap();
        assert_eq!(report.uploaded_count, 3);
        assert!(!storage.exists("videos/42/playlist.m3u8").await.unwrap());
    }

    enum Fault {
        Transient(u32),
        Auth,
        Config,
    }

    /// Storage double that fails `put_file` a configured number of times
    /// before succeeding, or always with a given error kind.
    struct FlakyStorage {
        fault: Fault,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyStorage {
        fn new(fault: Fault) -> Self {
            let failures = match fault {
                Fault::Transient(n) => n,
                _ => 0,
            };
            Self {
                fault,
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Storage for FlakyStorage {
        async fn put_file(&self, _key: &str, _path: &Path, _ct: &str) -> StorageResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fault {
                Fault::Auth => Err(StorageError::AccessDenied("bad credentials".to_string())),
                Fault::Config => Err(StorageError::ConfigError(
                    "NoSuchBucket: bucket does not exist".to_string(),
                )),
                Fault::Transient(_) => {
                    let left = self.failures_left.load(Ordering::SeqCst);
                    if left > 0 {
                        self.failures_left.store(left - 1, Ordering::SeqCst);
                        return Err(StorageError::UploadFailed("connection reset".to_string()));
                    }
                    Ok(1)
                }
            }
        }

        async fn put_object(&self, _key: &str, _data: Vec<u8>, _ct: &str) -> StorageResult<()> {
            Ok(())
        }

        async fn download_stream(&self, key: &str) -> StorageResult<ByteChunkStream> {
            Err(StorageError::NotFound(key.to_string()))
        }

        async fn download_range(&self, key: &str, _r: ByteRange) -> StorageResult<RangedObject> {
            Err(StorageError::NotFound(key.to_string()))
        }

        async fn exists(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }

        async fn content_length(&self, key: &str) -> StorageResult<u64> {
            Err(StorageError::NotFound(key.to_string()))
        }

        async fn delete(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }

        fn backend_type(&self) -> StorageBackend {
            StorageBackend::Local
        }
    }

    #[tokio::test]
    async fn transient_errors_retried_until_success() {
        let tree = tempdir().unwrap();
        tokio::fs::write(tree.path().join("seg.ts"), "x").await.unwrap();

        let storage = Arc::new(FlakyStorage::new(Fault::Transient(2)));
        let stage = UploadStage::new(storage.clone(), &settings());

        let report = stage.upload(tree.path(), "videos/42").await.unwrap();
        assert_eq!(report.uploaded_count, 1);
        assert_eq!(storage.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_with_no_successes() {
        let tree = tempdir().unwrap();
        tokio::fs::write(tree.path().join("seg.ts"), "x").await.unwrap();

        let storage = Arc::new(FlakyStorage::new(Fault::Transient(u32::MAX)));
        let stage = UploadStage::new(storage, &settings());

        let result = stage.upload(tree.path(), "videos/42").await;
        assert!(matches!(result, Err(UploadError::NetworkExhausted(_))));
    }

    #[tokio::test]
    async fn auth_error_aborts_without_retry() {
        let tree = tempdir().unwrap();
        tokio::fs::write(tree.path().join("a.ts"), "x").await.unwrap();
        tokio::fs::write(tree.path().join("b.ts"), "x").await.unwrap();

        let storage = Arc::new(FlakyStorage::new(Fault::Auth));
        let stage = UploadStage::new(storage.clone(), &settings());

        let result = stage.upload(tree.path(), "videos/42").await;
        assert!(matches!(result, Err(UploadError::Auth(_))));
        // First file, first attempt; no retries, no second file.
        assert_eq!(storage.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bad_bucket_aborts_without_retry() {
        let tree = tempdir().unwrap();
        tokio::fs::write(tree.path().join("a.ts"), "x").await.unwrap();
        tokio::fs::write(tree.path().join("b.ts"), "x").await.unwrap();
        tokio::fs::write(tree.path().join("c.ts"), "x").await.unwrap();

        let storage = Arc::new(FlakyStorage::new(Fault::Config));
        let stage = UploadStage::new(storage.clone(), &settings());

        let result = stage.upload(tree.path(), "videos/42").await;
        assert!(matches!(result, Err(UploadError::Config(_))));
        assert_eq!(storage.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn partial_failure_message_counts_files() {
        let err = UploadError::PartialFailure(vec![
            "seg_00003.ts".to_string(),
            "seg_00007.ts".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.contains("2 file(s) failed"));
        assert!(text.contains("seg_00003.ts"));
    }
}
