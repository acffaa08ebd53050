use crate::traits::{
    ByteChunkStream, ByteRange, RangedObject, Storage, StorageError, StorageResult,
};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::StreamExt;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use vidpipe_core::StorageBackend;

/// Multipart transfer tuning for large files.
#[derive(Debug, Clone, Copy)]
pub struct MultipartTuning {
    /// Files at or above this size use multipart transfer.
    pub threshold_bytes: u64,
    pub part_size_bytes: u64,
    /// Bounded number of in-flight parts for one file.
    pub part_concurrency: usize,
}

impl From<&vidpipe_core::UploadSettings> for MultipartTuning {
    fn from(settings: &vidpipe_core::UploadSettings) -> Self {
        Self {
            threshold_bytes: settings.multipart_threshold_bytes,
            part_size_bytes: settings.part_size_bytes,
            part_concurrency: settings.part_concurrency,
        }
    }
}

/// S3-compatible storage implementation (AWS S3, Cloudflare R2, MinIO).
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    tuning: MultipartTuning,
}

impl S3Storage {
    /// Create a new S3Storage instance.
    ///
    /// `endpoint_url` switches the client to an S3-compatible provider
    /// (e.g. `https://{account}.r2.cloudflarestorage.com` for R2,
    /// `http://localhost:9000` for MinIO) with path-style addressing.
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        tuning: MultipartTuning,
    ) -> StorageResult<Self> {
        let region_provider = RegionProviderChain::first_try(aws_config::Region::new(region));

        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_retry_mode(RetryMode::Standard);

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config.clone())
            .load()
            .await;

        let client = if let Some(ref endpoint) = endpoint_url {
            let mut s3_config_builder = aws_sdk_s3::Config::builder()
                .endpoint_url(endpoint)
                .region(config.region().cloned())
                .retry_config(retry_config);
            if let Some(provider) = config.credentials_provider() {
                s3_config_builder = s3_config_builder.credentials_provider(provider);
            }
            // Path-style addressing is required by most S3-compatible providers.
            s3_config_builder = s3_config_builder.force_path_style(true);
            Client::from_conf(s3_config_builder.build())
        } else {
            Client::new(&config)
        };

        Ok(S3Storage {
            client,
            bucket,
            tuning,
        })
    }

    /// Map a write-path SDK error: auth and bucket problems are permanent,
    /// everything else is a retryable upload failure.
    fn write_error(code: Option<&str>, message: String) -> StorageError {
        match code {
            Some("AccessDenied")
            | Some("InvalidAccessKeyId")
            | Some("SignatureDoesNotMatch")
            | Some("AllAccessDisabled") => StorageError::AccessDenied(message),
            Some("NoSuchBucket") => StorageError::ConfigError(message),
            _ => StorageError::UploadFailed(message),
        }
    }

    async fn multipart_upload(
        &self,
        key: &str,
        path: &Path,
        size: u64,
        content_type: &str,
    ) -> StorageResult<()> {
        let start = std::time::Instant::now();

        let create_result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "Failed to create multipart upload");
                Self::write_error(e.code(), e.to_string())
            })?;

        let upload_id = create_result
            .upload_id()
            .ok_or_else(|| StorageError::UploadFailed("No upload ID returned".to_string()))?
            .to_string();

        match self
            .upload_parts(key, path, size, &upload_id)
            .await
            .map(|mut parts| {
                // Part uploads run unordered; the completion list must not.
                parts.sort_by_key(|p| p.part_number());
                parts
            }) {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();

                if let Err(e) = self
                    .client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                {
                    tracing::error!(error = %e, bucket = %self.bucket, key = %key, "Failed to complete multipart upload");
                    self.abort_multipart(key, &upload_id).await;
                    return Err(Self::write_error(e.code(), e.to_string()));
                }

                tracing::info!(
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 multipart upload successful"
                );
                Ok(())
            }
            Err(e) => {
                self.abort_multipart(key, &upload_id).await;
                Err(e)
            }
        }
    }

    /// Upload all parts of a file with bounded concurrency.
    async fn upload_parts(
        &self,
        key: &str,
        path: &Path,
        size: u64,
        upload_id: &str,
    ) -> StorageResult<Vec<CompletedPart>> {
        let part_size = self.tuning.part_size_bytes;
        let part_count = size.div_ceil(part_size);

        let uploads = (0..part_count).map(|index| {
            let client = self.client.clone();
            let bucket = self.bucket.clone();
            let key = key.to_string();
            let upload_id = upload_id.to_string();
            let path: PathBuf = path.to_path_buf();
            let offset = index * part_size;
            let len = part_size.min(size - offset) as usize;
            // S3 part numbers start at 1.
            let part_number = (index + 1) as i32;

            async move {
                let data = read_file_chunk(&path, offset, len).await?;
                let result = client
                    .upload_part()
                    .bucket(&bucket)
                    .key(&key)
                    .upload_id(&upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(data))
                    .send()
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, bucket = %bucket, key = %key, part_number, "Failed to upload part");
                        Self::write_error(e.code(), e.to_string())
                    })?;

                let etag = result
                    .e_tag()
                    .ok_or_else(|| {
                        StorageError::UploadFailed(format!(
                            "No ETag returned for part {}",
                            part_number
                        ))
                    })?
                    .to_string();

                Ok(CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build())
            }
        });

        futures::stream::iter(uploads)
            .buffer_unordered(self.tuning.part_concurrency.max(1))
            .try_collect()
            .await
    }

    /// Abort an incomplete multipart upload so no orphaned part records are
    /// left behind. Best effort; the original error still propagates.
    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(error = %e, bucket = %self.bucket, key = %key, "Failed to abort multipart upload");
        } else {
            tracing::info!(bucket = %self.bucket, key = %key, "Aborted incomplete multipart upload");
        }
    }
}

/// Read `len` bytes from `path` starting at `offset`.
async fn read_file_chunk(path: &Path, offset: u64, len: usize) -> StorageResult<Bytes> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut buffer = vec![0u8; len];
    file.read_exact(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}

fn range_header(range: ByteRange) -> String {
    match range {
        ByteRange::FromTo(start, end) => format!("bytes={}-{}", start, end),
        ByteRange::From(start) => format!("bytes={}-", start),
        ByteRange::Suffix(len) => format!("bytes=-{}", len),
    }
}

/// Parse a `Content-Range: bytes start-end/total` header.
fn parse_content_range(value: &str) -> Option<(u64, u64, u64)> {
    let rest = value.strip_prefix("bytes ")?;
    let (span, total) = rest.split_once('/')?;
    let (start, end) = span.split_once('-')?;
    Some((
        start.parse().ok()?,
        end.parse().ok()?,
        total.parse().ok()?,
    ))
}

#[async_trait]
impl Storage for S3Storage {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<u64> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| {
                StorageError::UploadFailed(format!("Cannot stat {}: {}", path.display(), e))
            })?
            .len();

        if size >= self.tuning.threshold_bytes {
            self.multipart_upload(key, path, size, content_type).await?;
            return Ok(size);
        }

        let start = std::time::Instant::now();
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    "S3 upload failed"
                );
                Self::write_error(e.code(), e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(size)
    }

    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()> {
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(Bytes::from(data)))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, size_bytes = size, "S3 upload failed");
                Self::write_error(e.code(), e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(())
    }

    async fn download_stream(&self, key: &str) -> StorageResult<ByteChunkStream> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    GetObjectError::NoSuchKey(_) => StorageError::NotFound(key.to_string()),
                    _ => StorageError::DownloadFailed(e.to_string()),
                },
                _ => StorageError::DownloadFailed(e.to_string()),
            })?;

        let reader = response.body.into_async_read();
        let stream = ReaderStream::new(reader)
            .map(|result| result.map_err(|e| StorageError::DownloadFailed(e.to_string())));

        Ok(Box::pin(stream))
    }

    async fn download_range(&self, key: &str, range: ByteRange) -> StorageResult<RangedObject> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(range_header(range))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if let GetObjectError::NoSuchKey(_) = service_err.err() {
                        return Err(StorageError::NotFound(key.to_string()));
                    }
                }
                if e.code() == Some("InvalidRange") {
                    let size = self.content_length(key).await.unwrap_or(0);
                    return Err(StorageError::RangeNotSatisfiable { size });
                }
                return Err(StorageError::DownloadFailed(e.to_string()));
            }
        };

        let (start, end, total_size) = response
            .content_range()
            .and_then(parse_content_range)
            .ok_or_else(|| {
                StorageError::BackendError(format!(
                    "Missing or malformed Content-Range for ranged get of {}",
                    key
                ))
            })?;

        let reader = response.body.into_async_read();
        let stream = ReaderStream::new(reader)
            .map(|result| result.map_err(|e| StorageError::DownloadFailed(e.to_string())));

        Ok(RangedObject {
            stream: Box::pin(stream),
            total_size,
            start,
            end,
        })
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    HeadObjectError::NotFound(_) => Ok(false),
                    _ => Err(StorageError::BackendError(e.to_string())),
                },
                _ => Err(StorageError::BackendError(e.to_string())),
            },
        }
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    HeadObjectError::NotFound(_) => StorageError::NotFound(key.to_string()),
                    _ => StorageError::BackendError(e.to_string()),
                },
                _ => StorageError::BackendError(e.to_string()),
            })?;

        Ok(response.content_length().unwrap_or(0) as u64)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "S3 delete failed");
                StorageError::DeleteFailed(e.to_string())
            })?;

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header_forms() {
        assert_eq!(range_header(ByteRange::FromTo(0, 99)), "bytes=0-99");
        assert_eq!(range_header(ByteRange::From(500)), "bytes=500-");
        assert_eq!(range_header(ByteRange::Suffix(256)), "bytes=-256");
    }

    #[test]
    fn content_range_parsing() {
        assert_eq!(
            parse_content_range("bytes 0-99/1234"),
            Some((0, 99, 1234))
        );
        assert_eq!(parse_content_range("bytes 100-1233/1234"), Some((100, 1233, 1234)));
        assert_eq!(parse_content_range("garbage"), None);
        assert_eq!(parse_content_range("bytes */1234"), None);
    }
}
