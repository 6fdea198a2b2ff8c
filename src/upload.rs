// Multipart upload channel with progress reporting

use anyhow::Context;
use bytes::Bytes;
use futures::stream;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::auth::CredentialStore;
use crate::error::{GatewayError, Result};
use crate::models::response::parse_json_or_empty;
use crate::transport::DeadlineBoundTransport;

/// Size of the slices the file body is streamed in
const CHUNK_SIZE: usize = 64 * 1024;

/// A file ready to be uploaded
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Read a file from disk
    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::new(file_name, bytes))
    }
}

/// Turns byte counts into percentages, emitting only increases
struct ProgressTracker {
    sent: u64,
    total: u64,
    last: Option<u8>,
    callback: Box<dyn FnMut(u8) + Send>,
}

impl ProgressTracker {
    fn new(total: u64, callback: Box<dyn FnMut(u8) + Send>) -> Self {
        Self {
            sent: 0,
            total,
            last: None,
            callback,
        }
    }

    fn advance(&mut self, bytes: u64) {
        self.sent = (self.sent + bytes).min(self.total);
        if self.total == 0 {
            return;
        }
        let percent = ((self.sent as f64 / self.total as f64) * 100.0).round() as u8;
        self.emit(percent);
    }

    fn finish(&mut self) {
        self.emit(100);
    }

    fn emit(&mut self, percent: u8) {
        if self.last.map_or(true, |last| percent > last) {
            self.last = Some(percent);
            (self.callback)(percent);
        }
    }
}

/// Upload path for binary payloads.
///
/// Attaches the current credential but never refreshes it: a 401 comes back
/// as `GatewayError::Upload { status: 401, .. }`.
pub struct UploadChannel {
    transport: Arc<DeadlineBoundTransport>,
    store: Arc<CredentialStore>,
}

impl UploadChannel {
    pub fn new(transport: Arc<DeadlineBoundTransport>, store: Arc<CredentialStore>) -> Self {
        Self { transport, store }
    }

    /// Upload `file` as the `file` field of a multipart form.
    ///
    /// `on_progress` receives non-decreasing percentages; the last call on
    /// success is always 100.
    pub async fn upload<F>(
        &self,
        path: &str,
        file: UploadFile,
        with_auth: bool,
        on_progress: F,
    ) -> Result<Value>
    where
        F: FnMut(u8) + Send + 'static,
    {
        let url = self.transport.url(path);
        let total = file.bytes.len() as u64;
        let tracker = Arc::new(Mutex::new(ProgressTracker::new(total, Box::new(on_progress))));

        let chunks: Vec<Bytes> = (0..file.bytes.len())
            .step_by(CHUNK_SIZE)
            .map(|start| file.bytes.slice(start..(start + CHUNK_SIZE).min(file.bytes.len())))
            .collect();

        let body_tracker = tracker.clone();
        let body = stream::iter(chunks.into_iter().map(move |chunk| {
            if let Ok(mut t) = body_tracker.lock() {
                t.advance(chunk.len() as u64);
            }
            Ok::<_, std::io::Error>(chunk)
        }));

        let mut part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(file.file_name.clone());
        if let Some(ref mime) = file.mime {
            part = part
                .mime_str(mime)
                .map_err(|e| GatewayError::Internal(anyhow::anyhow!("Invalid MIME type: {}", e)))?;
        }
        let form = Form::new().part("file", part);

        let mut request = self.transport.client().post(&url).multipart(form);
        if with_auth {
            if let Some(token) = self.store.read().await {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }
        }

        tracing::debug!(url = %url, bytes = total, file = %file.file_name, "Uploading file");

        let response = request.send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Upload failed");
            GatewayError::Upload {
                status: 0,
                message: "Network error occurred".to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = status.as_u16(), "Upload rejected");
            return Err(GatewayError::Upload {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Upload failed").to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| GatewayError::Upload {
            status: status.as_u16(),
            message: format!("Failed to read response: {}", e),
        })?;

        if let Ok(mut t) = tracker.lock() {
            t.finish();
        }

        Ok(parse_json_or_empty(&body))
    }
}
