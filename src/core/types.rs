use std::path::Path;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::errors::{QueueError, Result};

/// Identifier of a single upload record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct UploadId(pub Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one `enqueue` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum UploadStatus {
    /// Waiting for dispatch
    Queued,
    /// Handed to the storage client
    Uploading,
    /// Stored, `result_url` is set
    Completed,
    /// Failed, `error` is set
    Error,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Status only moves forward: queued, uploading, then completed or error.
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        use UploadStatus::*;

        matches!(
            (self, next),
            (Queued, Uploading) | (Uploading, Completed) | (Uploading, Error)
        )
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Queued => "queued",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// A candidate file handed to the queue. Its size is always the payload length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Reads a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| QueueError::internal(format!("Invalid file name: {}", path.display())))?
            .to_string();

        let data = tokio::fs::read(path).await?;
        let mime_type = mime_from_file_name(&name);

        Ok(Self::new(name, mime_type, data))
    }

    pub fn info(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size: self.size(),
            mime_type: self.mime_type.clone(),
        }
    }

    /// Lowercased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

pub fn mime_from_file_name(name: &str) -> String {
    let ext = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG.to_string(),
        Some("png") => mime::IMAGE_PNG.to_string(),
        Some("gif") => mime::IMAGE_GIF.to_string(),
        Some("bmp") => mime::IMAGE_BMP.to_string(),
        Some("webp") => "image/webp".to_string(),
        Some("heic") => "image/heic".to_string(),
        Some("pdf") => mime::APPLICATION_PDF.to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}

/// File metadata kept on a record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadTaskRecord {
    pub id: UploadId,
    pub batch_id: BatchId,
    pub file: FileInfo,
    pub status: UploadStatus,
    /// Percentage in `0..=100`, `None` while indeterminate
    pub progress: Option<u8>,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl UploadTaskRecord {
    pub fn new(batch_id: BatchId, file: FileInfo) -> Self {
        Self {
            id: UploadId::new(),
            batch_id,
            file,
            status: UploadStatus::Queued,
            progress: None,
            result_url: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub(crate) fn mark_uploading(&mut self) -> bool {
        if !self.status.can_transition_to(UploadStatus::Uploading) {
            return false;
        }
        self.status = UploadStatus::Uploading;
        self.started_at = Some(Utc::now());
        true
    }

    pub(crate) fn mark_completed(&mut self, url: String) -> bool {
        if !self.status.can_transition_to(UploadStatus::Completed) {
            return false;
        }
        self.status = UploadStatus::Completed;
        self.progress = Some(100);
        self.result_url = Some(url);
        self.finished_at = Some(Utc::now());
        true
    }

    pub(crate) fn mark_error(&mut self, message: String) -> bool {
        if !self.status.can_transition_to(UploadStatus::Error) {
            return false;
        }
        self.status = UploadStatus::Error;
        self.error = Some(message);
        self.finished_at = Some(Utc::now());
        true
    }

    /// Applies a progress report; ignored unless uploading. Never moves backwards.
    pub(crate) fn set_progress(&mut self, percent: u8) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        let percent = percent.min(100);
        if self.progress.is_some_and(|current| current >= percent) {
            return false;
        }
        self.progress = Some(percent);
        true
    }
}

/// Aggregate failure of a finished batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSummary {
    AllFailed {
        total: usize,
    },
    PartialFailure {
        failed: usize,
        total: usize,
    },
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllFailed { .. } => f.write_str("All uploads failed"),
            Self::PartialFailure { failed, total } => {
                write!(f, "{} of {} files failed to upload", failed, total)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBatchResult {
    pub batch_id: BatchId,
    /// Result URLs of completed files, in submission order
    pub succeeded: Vec<String>,
    pub failed_count: usize,
    pub accepted_count: usize,
}

impl UploadBatchResult {
    pub fn summary(&self) -> Option<BatchSummary> {
        if self.failed_count == 0 || self.accepted_count == 0 {
            return None;
        }

        if self.succeeded.is_empty() {
            Some(BatchSummary::AllFailed { total: self.accepted_count })
        } else {
            Some(BatchSummary::PartialFailure {
                failed: self.failed_count,
                total: self.accepted_count,
            })
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count == 0
    }
}

/// Counts per status, plus an overall percentage for a progress bar
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueStats {
    pub queued: usize,
    pub uploading: usize,
    pub completed: usize,
    pub failed: usize,
    pub overall_percentage: f64,
}

impl QueueStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a UploadTaskRecord>) -> Self {
        let mut stats = QueueStats::default();
        let mut progress_sum = 0u64;

        for record in records {
            match record.status {
                UploadStatus::Queued => stats.queued += 1,
                UploadStatus::Uploading => {
                    stats.uploading += 1;
                    progress_sum += u64::from(record.progress.unwrap_or(0));
                }
                UploadStatus::Completed => {
                    stats.completed += 1;
                    progress_sum += 100;
                }
                UploadStatus::Error => {
                    stats.failed += 1;
                    progress_sum += 100;
                }
            }
        }

        let total = stats.total();
        if total > 0 {
            stats.overall_percentage = progress_sum as f64 / total as f64;
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.queued + self.uploading + self.completed + self.failed
    }
}

/// Events published after every state mutation
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// A record was created in `Queued`
    RecordAdded {
        record: UploadTaskRecord,
    },

    StatusChanged {
        upload_id: UploadId,
        old_status: UploadStatus,
        new_status: UploadStatus,
    },

    Progress {
        upload_id: UploadId,
        percent: u8,
    },

    /// Completed records were removed
    Cleared {
        removed: Vec<UploadId>,
    },

    /// A batch failed validation, no records were created
    BatchRejected {
        error: super::errors::ValidationError,
    },

    /// Every record of a batch reached a terminal status
    BatchFinished {
        result: UploadBatchResult,
    },
}

const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<UploadTaskRecord>();
        assert_send::<UploadEvent>();
        assert_send::<UploadFile>();
    }
};
