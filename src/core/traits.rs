use async_trait::async_trait;
use tokio::sync::mpsc;
use super::errors::{Result, ValidationError};
use super::types::{BatchSummary, UploadFile, UploadId, UploadTaskRecord};

/// Where an object is written in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub bucket: String,
    /// Object path inside the bucket, prefix included
    pub path: String,
}

impl Destination {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// Builds `prefix/key`, dropping empty segments and stray slashes.
    pub fn with_prefix(bucket: impl Into<String>, prefix: &str, key: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        let key = key.trim_start_matches('/');
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", prefix, key)
        };

        Self::new(bucket, path)
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub url: String,
}

/// Messages an upload job sends back to the coordinator worker.
#[derive(Debug)]
pub(crate) enum JobMessage {
    Progress {
        upload_id: UploadId,
        percent: u8,
    },
    Finished {
        upload_id: UploadId,
        result: std::result::Result<String, String>,
    },
}

/// Progress sink handed to a [`StorageClient`] for one upload.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    upload_id: Option<UploadId>,
    job_tx: Option<mpsc::UnboundedSender<JobMessage>>,
}

impl ProgressReporter {
    pub(crate) fn new(upload_id: UploadId, job_tx: mpsc::UnboundedSender<JobMessage>) -> Self {
        Self {
            upload_id: Some(upload_id),
            job_tx: Some(job_tx),
        }
    }

    /// A reporter that drops every report.
    pub fn noop() -> Self {
        Self {
            upload_id: None,
            job_tx: None,
        }
    }

    pub fn report(&self, percent: u8) {
        if let (Some(upload_id), Some(job_tx)) = (self.upload_id, &self.job_tx) {
            let _ = job_tx.send(JobMessage::Progress {
                upload_id,
                percent: percent.min(100),
            });
        }
    }

    pub fn report_bytes(&self, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (sent.min(total).saturating_mul(100) / total) as u8;
        self.report(percent);
    }
}

/// Object store the queue uploads into.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Uploads `file` to `destination` and returns the object's public location.
    async fn upload(
        &self,
        file: &UploadFile,
        destination: &Destination,
        progress: ProgressReporter,
    ) -> Result<UploadedObject>;
}

/// Failure notifications. Every method defaults to doing nothing.
pub trait ErrorCallback: Send + Sync {
    fn on_validation_error(&self, _error: &ValidationError) {}

    /// Called once per failed file.
    fn on_upload_error(&self, _record: &UploadTaskRecord) {}

    /// Called once per batch that had at least one failure.
    fn on_batch_failure(&self, _summary: &BatchSummary) {}
}
