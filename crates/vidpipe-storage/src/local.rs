use crate::traits::{
    ByteChunkStream, ByteRange, RangedObject, Storage, StorageError, StorageResult,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use vidpipe_core::StorageBackend;

/// Local filesystem storage implementation. Used by tests and small
/// single-host deployments where the edge proxy and pipeline share a disk.
///
/// Writes go to a temporary sibling path and are renamed into place, so a
/// concurrent reader never observes a partially written object.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at `base_path`.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    /// Convert a storage key to a filesystem path, rejecting traversal.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        crate::keys::validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write atomically: temp file in the same directory, then rename.
    async fn write_committed(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        self.ensure_parent_dir(path).await?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to commit {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    fn resolve_range(range: ByteRange, size: u64) -> StorageResult<(u64, u64)> {
        let (start, end) = match range {
            ByteRange::FromTo(start, end) => (start, end.min(size.saturating_sub(1))),
            ByteRange::From(start) => (start, size.saturating_sub(1)),
            ByteRange::Suffix(len) => {
                let len = len.min(size);
                (size - len, size.saturating_sub(1))
            }
        };
        if start >= size || start > end {
            return Err(StorageError::RangeNotSatisfiable { size });
        }
        Ok((start, end))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put_file(&self, key: &str, path: &Path, _content_type: &str) -> StorageResult<u64> {
        let dest = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        let data = fs::read(path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let size = data.len() as u64;
        self.write_committed(&dest, &data).await?;

        tracing::info!(
            path = %dest.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(size)
    }

    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<()> {
        let dest = self.key_to_path(key)?;
        self.write_committed(&dest, &data).await?;

        tracing::info!(
            key = %key,
            size_bytes = data.len(),
            "Local storage upload successful"
        );

        Ok(())
    }

    async fn download_stream(&self, key: &str) -> StorageResult<ByteChunkStream> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let stream = tokio_util::io::ReaderStream::new(file)
            .map(|result| result.map_err(|e| StorageError::DownloadFailed(e.to_string())));

        Ok(Box::pin(stream))
    }

    async fn download_range(&self, key: &str, range: ByteRange) -> StorageResult<RangedObject> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let total_size = fs::metadata(&path).await?.len();
        let (start, end) = Self::resolve_range(range, total_size)?;

        let mut file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open {}: {}", path.display(), e))
        })?;
        file.seek(std::io::SeekFrom::Start(start)).await?;

        let limited = file.take(end - start + 1);
        let stream = tokio_util::io::ReaderStream::new(limited)
            .map(|result| result.map_err(|e| StorageError::DownloadFailed(e.to_string())));

        Ok(RangedObject {
            stream: Box::pin(stream),
            total_size,
            start,
            end,
        })
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        Ok(meta.len())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete {}: {}", path.display(), e))
        })?;

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    async fn collect(mut stream: ByteChunkStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn put_object_and_download() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let data = b"#EXTM3U\n".to_vec();
        storage
            .put_object("videos/1/playlist.m3u8", data.clone(), "application/vnd.apple.mpegurl")
            .await
            .unwrap();

        let stream = storage.download_stream("videos/1/playlist.m3u8").await.unwrap();
        assert_eq!(collect(stream).await, data);
        assert_eq!(
            storage.content_length("videos/1/playlist.m3u8").await.unwrap(),
            data.len() as u64
        );
    }

    #[tokio::test]
    async fn put_file_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("store")).await.unwrap();

        let src = dir.path().join("seg.ts");
        tokio::fs::write(&src, b"segment bytes").await.unwrap();

        let size = storage
            .put_file("videos/1/seg_00000.ts", &src, "video/MP2T")
            .await
            .unwrap();
        assert_eq!(size, 13);

        let stream = storage.download_stream("videos/1/seg_00000.ts").await.unwrap();
        assert_eq!(collect(stream).await, b"segment bytes");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.download_stream("videos/1/missing.ts").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert!(!storage.exists("videos/1/missing.ts").await.unwrap());
    }

    #[tokio::test]
    async fn path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.download_stream("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn delete_nonexistent_is_ok() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        assert!(storage.delete("videos/1/gone.ts").await.is_ok());
    }

    #[tokio::test]
    async fn overwrite_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .put_object("videos/1/a.ts", b"one".to_vec(), "video/MP2T")
            .await
            .unwrap();
        storage
            .put_object("videos/1/a.ts", b"two".to_vec(), "video/MP2T")
            .await
            .unwrap();

        let stream = storage.download_stream("videos/1/a.ts").await.unwrap();
        assert_eq!(collect(stream).await, b"two");
    }

    #[tokio::test]
    async fn ranged_download() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .put_object("videos/1/seg.ts", b"0123456789".to_vec(), "video/MP2T")
            .await
            .unwrap();

        let ranged = storage
            .download_range("videos/1/seg.ts", ByteRange::FromTo(2, 5))
            .await
            .unwrap();
        assert_eq!(ranged.total_size, 10);
        assert_eq!((ranged.start, ranged.end), (2, 5));
        assert_eq!(collect(ranged.stream).await, b"2345");

        let suffix = storage
            .download_range("videos/1/seg.ts", ByteRange::Suffix(3))
            .await
            .unwrap();
        assert_eq!((suffix.start, suffix.end), (7, 9));
        assert_eq!(collect(suffix.stream).await, b"789");

        let open_ended = storage
            .download_range("videos/1/seg.ts", ByteRange::From(8))
            .await
            .unwrap();
        assert_eq!(collect(open_ended.stream).await, b"89");
    }

    #[tokio::test]
    async fn range_past_end_not_satisfiable() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .put_object("videos/1/seg.ts", b"0123456789".to_vec(), "video/MP2T")
            .await
            .unwrap();

        let result = storage
            .download_range("videos/1/seg.ts", ByteRange::From(10))
            .await;
        assert!(matches!(
            result,
            Err(StorageError::RangeNotSatisfiable { size: 10 })
        ));
    }
}
