//! Pipeline orchestrator.
//!
//! Sequences download, transcode, upload, and the reply for each item.
//! Stages run strictly in order; a stage failure puts the item into a
//! terminal `Failed` state, sends exactly one failure message through the
//! reply sink, and never aborts other items in flight.

use crate::adapter::{AdapterError, ItemEvent, ItemSource};
use crate::upload::UploadStage;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vidpipe_core::{Item, ItemStatus, PipelineConfig, Stage, TranscodeSettings, UploadSettings};
use vidpipe_storage::Storage;
use vidpipe_transcode::{Transcode, TranscodeOptions};

pub struct Orchestrator {
    config: PipelineConfig,
    transcode_options: TranscodeOptions,
    transcoder: Arc<dyn Transcode>,
    upload: UploadStage,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        transcode_settings: &TranscodeSettings,
        upload_settings: &UploadSettings,
        transcoder: Arc<dyn Transcode>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            config,
            transcode_options: TranscodeOptions::from(transcode_settings),
            transcoder,
            upload: UploadStage::new(storage, upload_settings),
        }
    }

    /// Consume the source until it closes or shutdown is requested. Items
    /// run on a bounded worker pool; at shutdown, in-flight items drain to
    /// completion before this returns.
    pub async fn run(
        self: Arc<Self>,
        mut source: impl ItemSource,
        shutdown: CancellationToken,
    ) -> Result<(), AdapterError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_items));
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut source_error = None;

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, draining in-flight items");
                    break;
                }
                event = source.next_event() => match event {
                    Ok(event) => event,
                    // In-flight items still drain to a safe boundary; an
                    // aborted worker could leave half-committed uploads.
                    Err(e) => {
                        tracing::error!(error = %e, "Item source failed, draining in-flight items");
                        source_error = Some(e);
                        break;
                    }
                },
            };
            let Some(event) = event else {
                tracing::info!("Item source closed");
                break;
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let orchestrator = self.clone();
            workers.spawn(async move {
                let _permit = permit;
                orchestrator.process(event).await;
            });

            while let Some(result) = workers.try_join_next() {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Item worker panicked");
                }
            }
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Item worker panicked");
            }
        }
        match source_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run one item through the full pipeline. Always returns the item in
    /// a terminal state; errors are absorbed into `Failed`.
    pub async fn process(&self, event: Box<dyn ItemEvent>) -> Item {
        let item_id = event.item_id().to_string();
        let storage_prefix = format!("{}/{}", self.config.key_root, item_id);
        let mut item = Item::new(&item_id, &storage_prefix);
        let work_dir = self.config.work_dir.join(&item_id);

        tracing::info!(item_id = %item_id, "Item received");

        match self.run_stages(&mut item, event.as_ref(), &work_dir).await {
            Ok(public_url) => {
                item.status = ItemStatus::Completed;
                item.public_url = Some(public_url.clone());
                tracing::info!(item_id = %item_id, url = %public_url, "Item completed");
                self.reply_best_effort(event.as_ref(), &format!("Your video is ready: {}", public_url))
                    .await;
                if self.config.cleanup {
                    self.remove_work_dir(&work_dir).await;
                }
            }
            Err((stage, reason)) => {
                tracing::error!(item_id = %item_id, stage = %stage, reason = %reason, "Item failed");
                item.status = ItemStatus::Failed {
                    stage,
                    reason: reason.clone(),
                };
                self.reply_best_effort(
                    event.as_ref(),
                    &format!("Processing failed at {} stage: {}", stage, reason),
                )
                .await;
                if self.config.cleanup {
                    self.remove_work_dir(&work_dir).await;
                }
            }
        }

        item
    }

    /// The sequential stage chain. Returns the public URL on success, or
    /// the failed stage and reason.
    async fn run_stages(
        &self,
        item: &mut Item,
        event: &dyn ItemEvent,
        work_dir: &std::path::Path,
    ) -> Result<String, (Stage, String)> {
        tokio::fs::create_dir_all(work_dir)
            .await
            .map_err(|e| (Stage::Download, format!("cannot create working directory: {}", e)))?;

        self.reply_best_effort(event, "Downloading your video...").await;
        item.status = ItemStatus::Downloading;
        let input_path = event
            .download(work_dir)
            .await
            .map_err(|e| (Stage::Download, e.to_string()))?;

        // The transcoder must see a complete, non-empty input file.
        let metadata = tokio::fs::metadata(&input_path)
            .await
            .map_err(|e| (Stage::Download, format!("downloaded file missing: {}", e)))?;
        if metadata.len() == 0 {
            return Err((Stage::Download, "downloaded file is empty".to_string()));
        }
        item.input_path = Some(input_path.clone());
        item.status = ItemStatus::Downloaded;
        tracing::info!(
            item_id = %item.item_id,
            size_bytes = metadata.len(),
            "Download complete"
        );

        self.reply_best_effort(event, "Transcoding...").await;
        item.status = ItemStatus::Transcoding;
        let output_root = work_dir.join("hls");
        let tree = self
            .transcoder
            .transcode(&input_path, &output_root, &self.transcode_options)
            .await
            .map_err(|e| (Stage::Transcode, e.to_string()))?;
        item.output_root = Some(tree.root.clone());
        item.status = ItemStatus::Transcoded;

        self.reply_best_effort(event, "Uploading...").await;
        item.status = ItemStatus::Uploading;
        let report = self
            .upload
            .upload(&tree.root, &item.storage_prefix)
            .await
            .map_err(|e| (Stage::Upload, e.to_string()))?;
        tracing::info!(
            item_id = %item.item_id,
            uploaded_count = report.uploaded_count,
            total_bytes = report.total_bytes,
            "Upload complete"
        );

        Ok(format!(
            "{}/{}/{}",
            self.config.base_url, item.storage_prefix, tree.primary_playlist
        ))
    }

    /// Progress messages must never fail the pipeline.
    async fn reply_best_effort(&self, event: &dyn ItemEvent, text: &str) {
        if let Err(e) = event.reply(text).await {
            tracing::warn!(item_id = %event.item_id(), error = %e, "Reply failed");
        }
    }

    async fn remove_work_dir(&self, work_dir: &std::path::Path) {
        if let Err(e) = tokio::fs::remove_dir_all(work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %work_dir.display(), error = %e, "Cleanup failed");
            }
        }
    }
}
