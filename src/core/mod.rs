mod connectivity;
mod coordinator;
mod coordinator_worker;
mod errors;
mod traits;
mod types;
mod validator;

pub use connectivity::ConnectivityMonitor;
pub use coordinator::{CoordinatorHandle, FilteredEventReceiver, QueueCoordinator, QueueCoordinatorBuilder};
pub use errors::{QueueError, Result, ValidationError};
pub use traits::{Destination, ErrorCallback, ProgressReporter, StorageClient, UploadedObject};
pub use types::{
    mime_from_file_name,
    BatchId,
    BatchSummary,
    FileInfo,
    QueueStats,
    UploadBatchResult,
    UploadEvent,
    UploadFile,
    UploadId,
    UploadStatus,
    UploadTaskRecord,
};
pub use validator::validate;
