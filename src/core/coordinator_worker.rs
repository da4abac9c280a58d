use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::config::QueueConfig;
use super::connectivity::ConnectivityMonitor;
use super::errors::{QueueError, Result};
use super::traits::{Destination, ErrorCallback, JobMessage, ProgressReporter, StorageClient};
use super::types::{
    BatchId,
    QueueStats,
    UploadBatchResult,
    UploadEvent,
    UploadFile,
    UploadId,
    UploadStatus,
    UploadTaskRecord,
};
use super::validator::validate;

pub(crate) enum CoordinatorCommand {
    Enqueue {
        files: Vec<UploadFile>,
        reply: oneshot::Sender<Result<UploadBatchResult>>,
    },

    ClearCompleted {
        reply: oneshot::Sender<usize>,
    },

    Snapshot {
        reply: oneshot::Sender<Vec<UploadTaskRecord>>,
    },

    GetRecord {
        upload_id: UploadId,
        reply: oneshot::Sender<Option<UploadTaskRecord>>,
    },

    Stats {
        reply: oneshot::Sender<QueueStats>,
    },
}

struct RecordHandle {
    record: UploadTaskRecord,
    /// Held until the record is dispatched
    payload: Option<UploadFile>,
    /// Position inside its batch
    batch_index: usize,
}

struct PendingBatch {
    outcomes: Vec<Option<std::result::Result<String, String>>>,
    remaining: usize,
    reply: oneshot::Sender<Result<UploadBatchResult>>,
}

pub(crate) struct CoordinatorWorker {
    config: QueueConfig,
    storage: Arc<dyn StorageClient>,
    connectivity: ConnectivityMonitor,
    error_callback: Option<Arc<dyn ErrorCallback>>,

    records: HashMap<UploadId, RecordHandle>,
    /// Enqueue order of every visible record
    order: Vec<UploadId>,
    queued: VecDeque<UploadId>,
    active_uploads: usize,
    batches: HashMap<BatchId, PendingBatch>,
    offline_deferred: bool,

    event_tx: broadcast::Sender<UploadEvent>,
    job_tx: mpsc::UnboundedSender<JobMessage>,
    job_rx: mpsc::UnboundedReceiver<JobMessage>,
}

impl CoordinatorWorker {
    pub(crate) fn new(
        config: QueueConfig,
        storage: Arc<dyn StorageClient>,
        connectivity: ConnectivityMonitor,
        error_callback: Option<Arc<dyn ErrorCallback>>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        Self {
            config,
            storage,
            connectivity,
            error_callback,
            records: HashMap::new(),
            order: Vec::new(),
            queued: VecDeque::new(),
            active_uploads: 0,
            batches: HashMap::new(),
            offline_deferred: false,
            event_tx,
            job_tx,
            job_rx,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<CoordinatorCommand>,
        shutdown: CancellationToken,
    ) {
        let mut online_rx: watch::Receiver<bool> = self.connectivity.subscribe();
        let mut commands_closed = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Coordinator shutting down");
                    break;
                }
                command = command_rx.recv(), if !commands_closed => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => commands_closed = true,
                    }
                }
                Some(message) = self.job_rx.recv() => {
                    self.handle_job_message(message);
                }
                Ok(()) = online_rx.changed() => {
                    let online = *online_rx.borrow_and_update();
                    debug!(online, queued = self.queued.len(), "Connectivity transition seen by coordinator");
                }
            }

            self.process_queue();

            // Outlive the last handle only while work is left to report on.
            if commands_closed && self.active_uploads == 0 && self.queued.is_empty() {
                break;
            }
        }
    }

    fn handle_command(&mut self, command: CoordinatorCommand) {
        match command {
            CoordinatorCommand::Enqueue { files, reply } => {
                self.enqueue(files, reply);
            }
            CoordinatorCommand::ClearCompleted { reply } => {
                let removed = self.clear_completed();
                let _ = reply.send(removed);
            }
            CoordinatorCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            CoordinatorCommand::GetRecord { upload_id, reply } => {
                let record = self.records
                    .get(&upload_id)
                    .map(|handle| handle.record.clone());
                let _ = reply.send(record);
            }
            CoordinatorCommand::Stats { reply } => {
                let stats = QueueStats::from_records(
                    self.order
                        .iter()
                        .filter_map(|id| self.records.get(id))
                        .map(|handle| &handle.record),
                );
                let _ = reply.send(stats);
            }
        }
    }

    fn enqueue(&mut self, files: Vec<UploadFile>, reply: oneshot::Sender<Result<UploadBatchResult>>) {
        let accepted = match validate(files, &self.config) {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!(%error, "Batch rejected by validation");
                if let Some(callback) = &self.error_callback {
                    callback.on_validation_error(&error);
                }
                let _ = self.event_tx.send(UploadEvent::BatchRejected { error: error.clone() });
                let _ = reply.send(Err(QueueError::Validation(error)));
                return;
            }
        };

        let batch_id = BatchId::new();
        info!(%batch_id, files = accepted.len(), "Batch accepted");

        let total = accepted.len();
        for (batch_index, file) in accepted.into_iter().enumerate() {
            let record = UploadTaskRecord::new(batch_id, file.info());
            let upload_id = record.id;

            self.records.insert(upload_id, RecordHandle {
                record: record.clone(),
                payload: Some(file),
                batch_index,
            });
            self.order.push(upload_id);
            self.queued.push_back(upload_id);
            let _ = self.event_tx.send(UploadEvent::RecordAdded { record });
        }

        self.batches.insert(batch_id, PendingBatch {
            outcomes: vec![None; total],
            remaining: total,
            reply,
        });
    }

    fn process_queue(&mut self) {
        if self.queued.is_empty() {
            self.offline_deferred = false;
            return;
        }

        if !self.connectivity.is_online() {
            if !self.offline_deferred {
                warn!(queued = self.queued.len(), "Offline, uploads will resume when connectivity returns");
                self.offline_deferred = true;
            }
            return;
        }

        if self.offline_deferred {
            info!(queued = self.queued.len(), "Back online, resuming uploads");
            self.offline_deferred = false;
        }

        while self.active_uploads < self.config.max_concurrent {
            let Some(upload_id) = self.queued.pop_front() else {
                break;
            };
            self.start_upload(upload_id);
        }
    }

    fn start_upload(&mut self, upload_id: UploadId) {
        let handle = match self.records.get_mut(&upload_id) {
            Some(handle) => handle,
            None => return,
        };

        let Some(file) = handle.payload.take() else {
            warn!(%upload_id, "Queued record has no payload, skipping");
            return;
        };

        if !handle.record.mark_uploading() {
            return;
        }

        let key = object_key(&file);
        let destination = Destination::with_prefix(
            self.config.bucket.clone(),
            &self.config.path_prefix,
            &key,
        );
        debug!(%upload_id, file = %file.name, %destination, "Dispatching upload");

        self.active_uploads += 1;
        self.emit_status_change(upload_id, UploadStatus::Queued, UploadStatus::Uploading);

        let storage = self.storage.clone();
        let job_tx = self.job_tx.clone();
        let progress = ProgressReporter::new(upload_id, job_tx.clone());

        tokio::spawn(async move {
            let upload = tokio::spawn(async move {
                storage
                    .upload(&file, &destination, progress)
                    .await
                    .map(|object| object.url)
                    .map_err(|err| err.to_string())
            });

            let result = match upload.await {
                Ok(result) => result,
                Err(err) => Err(format!("Upload task panicked: {}", err)),
            };

            let _ = job_tx.send(JobMessage::Finished { upload_id, result });
        });
    }

    fn handle_job_message(&mut self, message: JobMessage) {
        match message {
            JobMessage::Progress { upload_id, percent } => {
                let Some(handle) = self.records.get_mut(&upload_id) else {
                    return;
                };
                if handle.record.set_progress(percent) {
                    let _ = self.event_tx.send(UploadEvent::Progress { upload_id, percent: percent.min(100) });
                }
            }
            JobMessage::Finished { upload_id, result } => {
                self.handle_upload_finished(upload_id, result);
            }
        }
    }

    fn handle_upload_finished(&mut self, upload_id: UploadId, result: std::result::Result<String, String>) {
        let handle = match self.records.get_mut(&upload_id) {
            Some(handle) => handle,
            None => return,
        };

        let applied = match &result {
            Ok(url) => handle.record.mark_completed(url.clone()),
            Err(message) => handle.record.mark_error(message.clone()),
        };
        if !applied {
            return;
        }

        self.active_uploads = self.active_uploads.saturating_sub(1);
        let new_status = handle.record.status;
        let batch_id = handle.record.batch_id;
        let batch_index = handle.batch_index;

        match &result {
            Ok(url) => debug!(%upload_id, url = %url, "Upload completed"),
            Err(message) => {
                warn!(%upload_id, file = %handle.record.file.name, error = %message, "Upload failed");
                if let Some(callback) = &self.error_callback {
                    callback.on_upload_error(&handle.record);
                }
            }
        }

        self.emit_status_change(upload_id, UploadStatus::Uploading, new_status);
        self.record_batch_outcome(batch_id, batch_index, result);
    }

    fn record_batch_outcome(
        &mut self,
        batch_id: BatchId,
        batch_index: usize,
        result: std::result::Result<String, String>,
    ) {
        let finished = match self.batches.get_mut(&batch_id) {
            Some(batch) => {
                if let Some(slot) = batch.outcomes.get_mut(batch_index) {
                    if slot.is_none() {
                        *slot = Some(result);
                        batch.remaining -= 1;
                    }
                }
                batch.remaining == 0
            }
            None => false,
        };

        if finished {
            if let Some(batch) = self.batches.remove(&batch_id) {
                self.finish_batch(batch_id, batch);
            }
        }
    }

    fn finish_batch(&mut self, batch_id: BatchId, batch: PendingBatch) {
        let accepted_count = batch.outcomes.len();
        let mut succeeded = Vec::new();
        let mut failed_count = 0;

        for outcome in batch.outcomes.into_iter().flatten() {
            match outcome {
                Ok(url) => succeeded.push(url),
                Err(_) => failed_count += 1,
            }
        }

        let result = UploadBatchResult {
            batch_id,
            succeeded,
            failed_count,
            accepted_count,
        };

        match result.summary() {
            Some(summary) => {
                warn!(%batch_id, %summary, "Batch finished with failures");
                if let Some(callback) = &self.error_callback {
                    callback.on_batch_failure(&summary);
                }
            }
            None => info!(%batch_id, files = accepted_count, "Batch finished"),
        }

        let _ = self.event_tx.send(UploadEvent::BatchFinished { result: result.clone() });
        if batch.reply.send(Ok(result)).is_err() {
            debug!(%batch_id, "Batch caller no longer waiting");
        }
    }

    fn clear_completed(&mut self) -> usize {
        let removed: Vec<UploadId> = self.order
            .iter()
            .copied()
            .filter(|id| {
                self.records
                    .get(id)
                    .is_some_and(|handle| handle.record.status == UploadStatus::Completed)
            })
            .collect();

        if removed.is_empty() {
            return 0;
        }

        for id in &removed {
            self.records.remove(id);
        }
        self.order.retain(|id| self.records.contains_key(id));

        debug!(removed = removed.len(), "Cleared completed records");
        let count = removed.len();
        let _ = self.event_tx.send(UploadEvent::Cleared { removed });
        count
    }

    fn snapshot(&self) -> Vec<UploadTaskRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(|handle| handle.record.clone())
            .collect()
    }

    fn emit_status_change(&self, upload_id: UploadId, old_status: UploadStatus, new_status: UploadStatus) {
        let _ = self.event_tx.send(UploadEvent::StatusChanged {
            upload_id,
            old_status,
            new_status,
        });
    }
}

/// `{uuid}.{ext}`, or a bare uuid when the name has no usable extension.
/// Only ASCII alphanumerics of the extension are kept.
pub(crate) fn object_key(file: &UploadFile) -> String {
    let id = uuid::Uuid::new_v4();
    let ext: Option<String> = file
        .extension()
        .map(|ext| ext.chars().filter(char::is_ascii_alphanumeric).collect())
        .filter(|ext: &String| !ext.is_empty());

    match ext {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        let key = object_key(&UploadFile::new("Hood.JPEG", "image/jpeg", vec![1u8]));
        assert!(key.ends_with(".jpeg"));
        assert_eq!(key.len(), 36 + ".jpeg".len());

        let key = object_key(&UploadFile::new("scan", "image/png", vec![1u8]));
        assert_eq!(key.len(), 36);
        assert!(!key.contains('.'));
    }

    #[test]
    fn test_object_key_strips_url_delimiters() {
        let key = object_key(&UploadFile::new("door.j#g", "image/jpeg", vec![1u8]));
        assert!(key.ends_with(".jg"));

        let key = object_key(&UploadFile::new("hood.jp?x=1", "image/jpeg", vec![1u8]));
        assert!(key.ends_with(".jpx1"));

        let key = object_key(&UploadFile::new("panel.#?", "image/jpeg", vec![1u8]));
        assert_eq!(key.len(), 36);
    }
}
