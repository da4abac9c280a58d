use thiserror::Error;

/// Batch-level rejection produced before any record is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No files selected")]
    NoFilesSelected,

    #[error("Maximum {limit} files allowed")]
    TooManyFiles {
        limit: usize,
    },

    #[error("Files too large (max {limit_mb}MB): {}", files.join(", "))]
    FilesTooLarge {
        files: Vec<String>,
        limit_mb: u64,
    },

    #[error("Invalid file types: {}. Allowed: {}", files.join(", "), allowed.join(", "))]
    InvalidFileTypes {
        files: Vec<String>,
        allowed: Vec<String>,
    },
}

impl ValidationError {
    /// Names of the files that caused the rejection.
    pub fn offending_files(&self) -> &[String] {
        match self {
            Self::FilesTooLarge { files, .. } | Self::InvalidFileTypes { files, .. } => files,
            Self::NoFilesSelected | Self::TooManyFiles { .. } => &[],
        }
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Coordinator shut down")]
    CoordinatorShutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

pub type Result<T, E = QueueError> = std::result::Result<T, E>;
