use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::core::{QueueError, Result};

pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Queue configuration, every field has a default so partial TOML files load.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Target bucket in the object store
    pub bucket: String,
    /// Prefix placed before every generated object key
    pub path_prefix: String,
    /// Maximum files per batch
    pub max_file_count: usize,
    /// Maximum size of a single file in MB
    pub max_file_size_mb: u64,
    /// Accepted MIME types
    pub allowed_mime_types: Vec<String>,
    /// Uploads allowed in flight at once
    pub max_concurrent: usize,
    /// Broadcast buffer for events
    pub event_capacity: usize,
    /// Command channel buffer
    pub command_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            bucket: "task-photos".to_string(),
            path_prefix: String::new(),
            max_file_count: 10,
            max_file_size_mb: 5,
            allowed_mime_types: vec![
                mime::IMAGE_JPEG.to_string(),
                mime::IMAGE_PNG.to_string(),
                "image/webp".to_string(),
            ],
            max_concurrent: 1,
            event_capacity: 256,
            command_capacity: 64,
        }
    }
}

impl QueueConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: QueueConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(QueueError::InvalidConfig("max_concurrent must be at least 1".to_string()));
        }
        if self.max_file_count == 0 {
            return Err(QueueError::InvalidConfig("max_file_count must be at least 1".to_string()));
        }
        if self.allowed_mime_types.is_empty() {
            return Err(QueueError::InvalidConfig("allowed_mime_types is empty".to_string()));
        }
        if self.event_capacity == 0 || self.command_capacity == 0 {
            return Err(QueueError::InvalidConfig("channel capacities must be non-zero".to_string()));
        }

        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(BYTES_PER_MB)
    }
}
