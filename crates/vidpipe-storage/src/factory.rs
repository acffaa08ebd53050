use crate::s3::MultipartTuning;
use crate::{LocalStorage, S3Storage, Storage, StorageError, StorageResult};
use std::sync::Arc;
use vidpipe_core::{StorageBackend, StorageConfig, UploadSettings};

/// Create a storage backend from configuration.
pub async fn create_storage(
    config: &StorageConfig,
    upload: &UploadSettings,
) -> StorageResult<Arc<dyn Storage>> {
    match config.backend {
        StorageBackend::S3 => {
            let bucket = config.bucket.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_BUCKET or R2_BUCKET not configured".to_string())
            })?;
            let region = config.region.clone().unwrap_or_else(|| "auto".to_string());

            let storage = S3Storage::new(
                bucket,
                region,
                config.endpoint.clone(),
                MultipartTuning::from(upload),
            )
            .await?;
            Ok(Arc::new(storage))
        }
        StorageBackend::Local => {
            let base_path = config.local_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;

            let storage = LocalStorage::new(base_path).await?;
            Ok(Arc::new(storage))
        }
    }
}
