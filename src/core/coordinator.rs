use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::config::QueueConfig;
use super::connectivity::ConnectivityMonitor;
use super::coordinator_worker::{CoordinatorCommand, CoordinatorWorker};
use super::errors::{QueueError, Result};
use super::traits::{ErrorCallback, StorageClient};
use super::types::{QueueStats, UploadBatchResult, UploadEvent, UploadFile, UploadId, UploadTaskRecord};

/// Cloneable front of the upload queue.
///
/// Every clone talks to the same worker task, which owns all records.
#[derive(Clone)]
pub struct QueueCoordinator {
    command_tx: mpsc::Sender<CoordinatorCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
    connectivity: ConnectivityMonitor,
}

/// Coordinator plus the worker task driving it
pub struct CoordinatorHandle {
    pub coordinator: QueueCoordinator,
    worker_handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl CoordinatorHandle {
    /// Stops the worker. Pending `enqueue` calls fail with `CoordinatorShutdown`;
    /// uploads already handed to the storage client keep running.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        drop(self.coordinator);
        self.worker_handle
            .await
            .map_err(|err| QueueError::internal(format!("Worker panic: {}", err)))
    }
}

pub struct QueueCoordinatorBuilder {
    storage: Arc<dyn StorageClient>,
    config: QueueConfig,
    connectivity: Option<ConnectivityMonitor>,
    error_callback: Option<Arc<dyn ErrorCallback>>,
}

impl QueueCoordinatorBuilder {
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connectivity(mut self, connectivity: ConnectivityMonitor) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn error_callback(mut self, callback: Arc<dyn ErrorCallback>) -> Self {
        self.error_callback = Some(callback);
        self
    }

    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(self) -> Result<CoordinatorHandle> {
        self.config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity);
        let (event_tx, _) = broadcast::channel(self.config.event_capacity);
        let connectivity = self.connectivity.unwrap_or_default();
        let shutdown = CancellationToken::new();

        let worker = CoordinatorWorker::new(
            self.config,
            self.storage,
            connectivity.clone(),
            self.error_callback,
            event_tx.clone(),
        );
        let worker_handle = tokio::spawn(worker.run(command_rx, shutdown.clone()));

        Ok(CoordinatorHandle {
            coordinator: QueueCoordinator {
                command_tx,
                event_tx,
                connectivity,
            },
            worker_handle,
            shutdown,
        })
    }
}

impl QueueCoordinator {
    pub fn builder(storage: Arc<dyn StorageClient>) -> QueueCoordinatorBuilder {
        QueueCoordinatorBuilder {
            storage,
            config: QueueConfig::default(),
            connectivity: None,
            error_callback: None,
        }
    }

    /// Validates and queues a batch, resolving once every accepted file is
    /// completed or failed.
    ///
    /// A validation failure returns `QueueError::Validation` and creates no
    /// records. Per-file upload failures are reported through the result and the
    /// records, never as `Err`. Dropping the future does not stop the uploads.
    pub async fn enqueue(&self, files: Vec<UploadFile>) -> Result<UploadBatchResult> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::Enqueue { files, reply: reply_tx })
            .await
            .map_err(|_| QueueError::CoordinatorShutdown)?;

        reply_rx
            .await
            .map_err(|_| QueueError::CoordinatorShutdown)?
    }

    /// Removes completed records, returning how many were removed.
    pub async fn clear_completed(&self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::ClearCompleted { reply: reply_tx })
            .await
            .map_err(|_| QueueError::CoordinatorShutdown)?;

        reply_rx.await.map_err(|_| QueueError::CoordinatorShutdown)
    }

    /// All visible records in enqueue order
    pub async fn snapshot(&self) -> Result<Vec<UploadTaskRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| QueueError::CoordinatorShutdown)?;

        reply_rx.await.map_err(|_| QueueError::CoordinatorShutdown)
    }

    pub async fn get_record(&self, upload_id: UploadId) -> Result<Option<UploadTaskRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::GetRecord { upload_id, reply: reply_tx })
            .await
            .map_err(|_| QueueError::CoordinatorShutdown)?;

        reply_rx.await.map_err(|_| QueueError::CoordinatorShutdown)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::Stats { reply: reply_tx })
            .await
            .map_err(|_| QueueError::CoordinatorShutdown)?;

        reply_rx.await.map_err(|_| QueueError::CoordinatorShutdown)
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Subscribe to state changes.
    ///
    /// A receiver that falls more than `event_capacity` events behind gets a
    /// `Lagged` error and should resync from [`QueueCoordinator::snapshot`].
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredEventReceiver<F>
    where
        F: Fn(&UploadEvent) -> bool,
    {
        FilteredEventReceiver {
            receiver: self.event_tx.subscribe(),
            filter,
        }
    }
}

/// Event receiver that skips events rejected by its filter
pub struct FilteredEventReceiver<F> {
    receiver: broadcast::Receiver<UploadEvent>,
    filter: F,
}

impl<F> FilteredEventReceiver<F>
where
    F: Fn(&UploadEvent) -> bool,
{
    pub async fn recv(&mut self) -> Result<UploadEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}
