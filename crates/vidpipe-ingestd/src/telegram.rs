//! Telegram Bot API ingestion adapter.
//!
//! Long-polls `getUpdates` for messages carrying a video payload and turns
//! each into an [`ItemEvent`]: the payload is fetched through `getFile`
//! plus a streamed file download with an in-place progress message, and
//! replies go back to the originating chat via `sendMessage`. The session
//! carries an explicit lifecycle; the pipeline never sees the Bot API.

use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use vidpipe_core::media::has_video_extension;
use vidpipe_pipeline::{AdapterError, ItemEvent, ItemSource};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 50;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    video: Option<FileRef>,
    document: Option<FileRef>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
    file_unique_id: String,
    file_size: Option<u64>,
    file_name: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl FileRef {
    /// Documents count as video when their mime type or file name says so.
    fn is_video_document(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with("video/"))
            || self
                .file_name
                .as_deref()
                .is_some_and(|n| has_video_extension(&n.to_lowercase()))
    }
}

/// An authenticated Bot API session. Opened once at startup, shared by the
/// source and every in-flight event.
pub struct TelegramSession {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramSession {
    /// Open a session and verify the token against `getMe`.
    pub async fn open(token: String, api_base: Option<String>) -> Result<Arc<Self>, AdapterError> {
        let session = Arc::new(Self {
            client: reqwest::Client::new(),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            token,
        });

        let me: User = session.call("getMe", &serde_json::json!({})).await?;
        tracing::info!(bot = %me.username.unwrap_or_default(), "Telegram session open");
        Ok(session)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<T, AdapterError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(params)
            .send()
            .await
            .map_err(|e| AdapterError::Source(format!("{}: {}", method, e)))?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| AdapterError::Source(format!("{}: {}", method, e)))?;

        if !body.ok {
            return Err(AdapterError::Source(format!(
                "{}: {}",
                method,
                body.description.unwrap_or_else(|| "request rejected".to_string())
            )));
        }
        body.result
            .ok_or_else(|| AdapterError::Source(format!("{}: empty result", method)))
    }

    async fn send_message(&self, chat_id: i64, reply_to: i64, text: &str) -> Result<i64, AdapterError> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                    "reply_to_message_id": reply_to,
                }),
            )
            .await
            .map_err(|e| AdapterError::ReplyFailed(e.to_string()))?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), AdapterError> {
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &serde_json::json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }

    /// Stream one file to `dest`, verifying the byte count against the
    /// size the Bot API advertised.
    async fn download_file(
        &self,
        file_id: &str,
        expected_size: Option<u64>,
        dest: &Path,
        mut progress: Option<DownloadProgress>,
    ) -> Result<u64, AdapterError> {
        let info: FileInfo = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;
        let file_path = info
            .file_path
            .ok_or_else(|| AdapterError::DownloadFailed("getFile returned no path".to_string()))?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AdapterError::DownloadFailed(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| AdapterError::DownloadFailed(e.to_string()))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AdapterError::DownloadFailed(e.to_string()))?;
            written += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| AdapterError::DownloadFailed(e.to_string()))?;
            if let Some(progress) = progress.as_mut() {
                progress.report(self, written).await;
            }
        }
        file.flush()
            .await
            .map_err(|e| AdapterError::DownloadFailed(e.to_string()))?;

        if let Some(expected) = expected_size {
            if written != expected {
                return Err(AdapterError::Truncated {
                    expected,
                    actual: written,
                });
            }
        }
        Ok(written)
    }
}

/// Edits one chat message in place as a download advances, at whole
/// deciles so the edit rate stays within Bot API limits.
struct DownloadProgress {
    chat_id: i64,
    message_id: i64,
    total: u64,
    last_decile: u32,
}

impl DownloadProgress {
    async fn report(&mut self, session: &TelegramSession, written: u64) {
        let Some(decile) = next_decile(written, self.total, self.last_decile) else {
            return;
        };
        self.last_decile = decile;
        let text = format!("Downloading video... {}%", decile * 10);
        // Progress is cosmetic; a failed edit never fails the download.
        if let Err(e) = session.edit_message(self.chat_id, self.message_id, &text).await {
            tracing::debug!(error = %e, "Progress edit failed");
        }
    }
}

/// Decile reached by `written` out of `total`, when it has advanced past
/// `last`.
fn next_decile(written: u64, total: u64, last: u32) -> Option<u32> {
    if total == 0 {
        return None;
    }
    let decile = (written.min(total).saturating_mul(10) / total) as u32;
    (decile > last).then_some(decile)
}

/// One video message, ready for the pipeline.
pub struct TelegramItemEvent {
    session: Arc<TelegramSession>,
    item_id: String,
    chat_id: i64,
    message_id: i64,
    file_id: String,
    file_size: Option<u64>,
    file_name: Option<String>,
}

impl TelegramItemEvent {
    fn from_message(session: Arc<TelegramSession>, message: Message) -> Option<Self> {
        let file = match (message.video, message.document) {
            (Some(video), _) => video,
            (None, Some(doc)) if doc.is_video_document() => doc,
            _ => return None,
        };

        let item_id = if file.file_unique_id.is_empty() {
            format!("{}_{}", message.chat.id, message.message_id)
        } else {
            file.file_unique_id.clone()
        };

        Some(Self {
            session,
            item_id,
            chat_id: message.chat.id,
            message_id: message.message_id,
            file_id: file.file_id,
            file_size: file.file_size,
            file_name: file.file_name,
        })
    }

    fn local_file_name(&self) -> String {
        match &self.file_name {
            Some(name) if has_video_extension(&name.to_lowercase()) => name.clone(),
            _ => format!("{}.mp4", self.item_id),
        }
    }
}

#[async_trait]
impl ItemEvent for TelegramItemEvent {
    fn item_id(&self) -> &str {
        &self.item_id
    }

    async fn download(&self, dest_dir: &Path) -> Result<PathBuf, AdapterError> {
        let dest = dest_dir.join(self.local_file_name());
        let progress = match self.file_size {
            Some(total) if total > 0 => {
                match self
                    .session
                    .send_message(self.chat_id, self.message_id, "Downloading video... 0%")
                    .await
                {
                    Ok(message_id) => Some(DownloadProgress {
                        chat_id: self.chat_id,
                        message_id,
                        total,
                        last_decile: 0,
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not post progress message");
                        None
                    }
                }
            }
            _ => None,
        };
        let written = self
            .session
            .download_file(&self.file_id, self.file_size, &dest, progress)
            .await?;
        tracing::info!(
            item_id = %self.item_id,
            path = %dest.display(),
            size_bytes = written,
            "Payload downloaded"
        );
        Ok(dest)
    }

    async fn reply(&self, text: &str) -> Result<(), AdapterError> {
        self.session
            .send_message(self.chat_id, self.message_id, text)
            .await?;
        Ok(())
    }
}

/// Long-polling update source. One `getUpdates` batch may contain several
/// video messages; they are queued and handed out one at a time.
pub struct TelegramSource {
    session: Arc<TelegramSession>,
    offset: i64,
    pending: VecDeque<Box<dyn ItemEvent>>,
}

impl TelegramSource {
    pub fn new(session: Arc<TelegramSession>) -> Self {
        Self {
            session,
            offset: 0,
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl ItemSource for TelegramSource {
    async fn next_event(&mut self) -> Result<Option<Box<dyn ItemEvent>>, AdapterError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            let updates: Vec<Update> = match self
                .session
                .call(
                    "getUpdates",
                    &serde_json::json!({
                        "offset": self.offset,
                        "timeout": POLL_TIMEOUT_SECS,
                        "allowed_updates": ["message"],
                    }),
                )
                .await
            {
                Ok(updates) => updates,
                Err(e) => {
                    // Polling hiccups are routine; back off and keep going.
                    tracing::warn!(error = %e, "getUpdates failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                    continue;
                }
            };

            for update in updates {
                self.offset = self.offset.max(update.update_id + 1);
                let Some(message) = update.message else { continue };
                match TelegramItemEvent::from_message(self.session.clone(), message) {
                    Some(event) => {
                        tracing::info!(item_id = %event.item_id, "New video message");
                        self.pending.push_back(Box::new(event));
                    }
                    None => {
                        tracing::debug!("Ignoring non-video message");
                    }
                }
            }
        }
    }
}
