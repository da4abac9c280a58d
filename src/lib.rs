//! Ordered, offline-aware photo upload queue.
//!
//! A [`QueueCoordinator`] validates batches of files, keeps one
//! [`UploadTaskRecord`] per accepted file and hands the files to a
//! [`StorageClient`] one at a time (or up to `max_concurrent`), holding
//! dispatch while the [`ConnectivityMonitor`] reports offline.

pub mod config;
pub mod core;
pub mod storage;

pub use config::QueueConfig;

pub use crate::core::{
    validate,
    BatchId,
    BatchSummary,
    ConnectivityMonitor,
    CoordinatorHandle,
    Destination,
    ErrorCallback,
    FileInfo,
    ProgressReporter,
    QueueCoordinator,
    QueueError,
    QueueStats,
    Result,
    StorageClient,
    UploadBatchResult,
    UploadEvent,
    UploadFile,
    UploadId,
    UploadStatus,
    UploadTaskRecord,
    UploadedObject,
    ValidationError,
};

pub use storage::{HttpStorageClient, HttpStorageConfig};
