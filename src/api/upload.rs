//! Chunked file upload for knowledge-base training.
//!
//! A file is cut into fixed-size byte ranges that go up one at a time, in
//! order, so the backend can append them without reordering. When the
//! backend reports the file assembled, the upload is finalized by
//! registering it as a training document.

use super::admin::{self, TrainDocRequest};
use super::{ApiError, RequestOptions, TrainingDoc, Transport};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

const CHUNK_ENDPOINT: &str = "/upload/files";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadProgress {
    pub file_id: String,
    /// Whole percent of chunks accepted, rounded up.
    pub progress: u8,
    pub chunks_uploaded: u64,
    pub total_chunks: u64,
    pub status: UploadStatus,
    pub error: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub chunk_size: u64,
    pub max_retries: u32,
    /// Base of the linear backoff: attempt `n` waits `retry_delay * n`.
    pub retry_delay: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File is empty: {0}")]
    EmptyFile(String),
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to upload chunk {chunk} of {total} after {attempts} attempt(s): {source}")]
    Chunk {
        chunk: u64,
        total: u64,
        attempts: u32,
        #[source]
        source: ApiError,
    },
    #[error("Server did not confirm assembly of '{0}'")]
    Incomplete(String),
    #[error("Failed to complete file processing: {0}")]
    Finalize(#[source] ApiError),
}

#[derive(Debug, Deserialize, Default)]
struct ChunkResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(rename = "isComplete", default)]
    is_complete: bool,
    #[serde(default)]
    error: Option<String>,
    filename: Option<String>,
    size: Option<u64>,
    mime_type: Option<String>,
}

/// Where the bytes of an upload come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    File {
        path: PathBuf,
        name: String,
        size: u64,
        mime_type: String,
    },
    Memory {
        name: String,
        mime_type: String,
        data: Vec<u8>,
    },
}

impl UploadSource {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await.map_err(|e| UploadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(UploadSource::File {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            mime_type,
        })
    }

    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        UploadSource::Memory {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            UploadSource::File { name, .. } | UploadSource::Memory { name, .. } => name,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            UploadSource::File { size, .. } => *size,
            UploadSource::Memory { data, .. } => data.len() as u64,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            UploadSource::File { mime_type, .. } | UploadSource::Memory { mime_type, .. } => {
                mime_type
            }
        }
    }

    async fn read_range(&self, start: u64, len: u64) -> Result<Vec<u8>, UploadError> {
        match self {
            UploadSource::Memory { data, .. } => {
                let end = (start + len).min(data.len() as u64) as usize;
                Ok(data[start as usize..end].to_vec())
            }
            UploadSource::File { path, .. } => {
                let io_err = |e| UploadError::Io {
                    path: path.clone(),
                    source: e,
                };
                let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
                file.seek(SeekFrom::Start(start)).await.map_err(io_err)?;
                let mut buf = vec![0u8; len as usize];
                file.read_exact(&mut buf).await.map_err(io_err)?;
                Ok(buf)
            }
        }
    }
}

/// Progress bookkeeping for one upload.
struct UploadJob {
    file_id: String,
    total_chunks: u64,
}

impl UploadJob {
    fn snapshot(&self, status: UploadStatus, chunks_uploaded: u64) -> UploadProgress {
        UploadProgress {
            file_id: self.file_id.clone(),
            progress: percent(chunks_uploaded, self.total_chunks),
            chunks_uploaded,
            total_chunks: self.total_chunks,
            status,
            error: None,
            file_name: None,
            file_size: None,
            mime_type: None,
        }
    }

    fn failed(&self, chunks_uploaded: u64, error: &impl ToString) -> UploadProgress {
        UploadProgress {
            error: Some(error.to_string()),
            ..self.snapshot(UploadStatus::Failed, chunks_uploaded)
        }
    }
}

fn percent(uploaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (uploaded * 100).div_ceil(total).min(100) as u8
}

pub struct ChunkedUploader<'a> {
    transport: &'a Transport,
    options: UploadOptions,
}

impl<'a> ChunkedUploader<'a> {
    pub fn new(transport: &'a Transport, options: UploadOptions) -> Self {
        let options = UploadOptions {
            chunk_size: options.chunk_size.max(1),
            ..options
        };
        Self { transport, options }
    }

    pub fn total_chunks(&self, size: u64) -> u64 {
        size.div_ceil(self.options.chunk_size)
    }

    /// Upload `source` chunk by chunk, then finalize it. `on_progress` sees
    /// every state change, ending in `Completed` or `Failed`.
    pub async fn upload(
        &self,
        source: &UploadSource,
        mut on_progress: impl FnMut(UploadProgress) + Send,
    ) -> Result<TrainingDoc, UploadError> {
        let size = source.size();
        let job = UploadJob {
            file_id: uuid::Uuid::new_v4().to_string(),
            total_chunks: self.total_chunks(size),
        };
        let total = job.total_chunks;

        if total == 0 {
            let err = UploadError::EmptyFile(source.name().to_string());
            on_progress(job.failed(0, &err));
            return Err(err);
        }

        info!(file = source.name(), size, total_chunks = total, "Starting chunked upload");
        on_progress(job.snapshot(UploadStatus::Uploading, 0));

        for index in 0..total {
            let chunk_number = index + 1;
            let start = index * self.options.chunk_size;
            let len = self.options.chunk_size.min(size - start);

            let bytes = match source.read_range(start, len).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    on_progress(job.failed(index, &e));
                    return Err(e);
                }
            };

            let resp = match self
                .upload_chunk_with_retry(source.name(), bytes, chunk_number, total)
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(file = source.name(), chunk = chunk_number, error = %e, "Upload failed");
                    on_progress(job.failed(index, &e));
                    return Err(e);
                }
            };

            on_progress(job.snapshot(UploadStatus::Uploading, chunk_number));

            if resp.is_complete {
                let request = TrainDocRequest {
                    filename: resp.filename.unwrap_or_else(|| source.name().to_string()),
                    size: resp.size.unwrap_or(size),
                    mime_type: resp
                        .mime_type
                        .unwrap_or_else(|| source.mime_type().to_string()),
                };
                return self.finalize(&job, request, &mut on_progress).await;
            }
        }

        let err = UploadError::Incomplete(source.name().to_string());
        on_progress(job.failed(total, &err));
        Err(err)
    }

    async fn finalize(
        &self,
        job: &UploadJob,
        request: TrainDocRequest,
        on_progress: &mut (impl FnMut(UploadProgress) + Send),
    ) -> Result<TrainingDoc, UploadError> {
        let total = job.total_chunks;
        let with_file = |progress: UploadProgress| UploadProgress {
            file_name: Some(request.filename.clone()),
            file_size: Some(request.size),
            mime_type: Some(request.mime_type.clone()),
            ..progress
        };

        on_progress(with_file(job.snapshot(UploadStatus::Processing, total)));
        debug!(file = %request.filename, "Chunks assembled, registering document");

        match admin::train_doc(self.transport, &request).await {
            Ok(doc) => {
                info!(file = %request.filename, doc_id = %doc.id, "Upload completed");
                on_progress(with_file(job.snapshot(UploadStatus::Completed, total)));
                Ok(doc)
            }
            Err(e) => {
                let err = UploadError::Finalize(e);
                on_progress(with_file(job.failed(total, &err)));
                Err(err)
            }
        }
    }

    async fn upload_chunk_with_retry(
        &self,
        name: &str,
        bytes: Vec<u8>,
        chunk_number: u64,
        total: u64,
    ) -> Result<ChunkResponse, UploadError> {
        let mut attempt = 0u32;
        loop {
            match self
                .upload_single_chunk(name, bytes.clone(), chunk_number, total)
                .await
            {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt < self.options.max_retries => {
                    attempt += 1;
                    let delay = self.options.retry_delay * attempt;
                    warn!(
                        chunk = chunk_number,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Chunk upload failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(UploadError::Chunk {
                        chunk: chunk_number,
                        total,
                        attempts: attempt + 1,
                        source: e,
                    })
                }
            }
        }
    }

    async fn upload_single_chunk(
        &self,
        name: &str,
        bytes: Vec<u8>,
        chunk_number: u64,
        total: u64,
    ) -> Result<ChunkResponse, ApiError> {
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(name.to_string()))
            .text("name", name.to_string())
            .text("chunk_number", chunk_number.to_string())
            .text("total_chunks", total.to_string());

        let resp: Option<ChunkResponse> = self
            .transport
            .post_multipart(CHUNK_ENDPOINT, form, RequestOptions::default())
            .await?;
        let resp = resp.unwrap_or_default();

        if resp.success == Some(false) {
            return Err(ApiError::Rejected(
                resp.error
                    .unwrap_or_else(|| format!("chunk {} was not accepted", chunk_number)),
            ));
        }
        debug!(chunk = chunk_number, total, complete = resp.is_complete, "Chunk accepted");
        Ok(resp)
    }
}

/// Human-readable size, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let k = 1024f64;
    let value = bytes as f64;
    let i = ((value.ln() / k.ln()).floor() as usize).min(UNITS.len() - 1);
    let scaled = format!("{:.2}", value / k.powi(i as i32));
    let trimmed = scaled.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[i])
}
