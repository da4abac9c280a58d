pub mod http;
pub mod progress_stream;

pub use http::{HttpStorageClient, HttpStorageConfig};
pub use progress_stream::ProgressStream;
