use thiserror::Error;

/// Rejected input. Nothing was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("task text cannot be empty")]
    EmptyTaskText,
    #[error("group name cannot be empty")]
    EmptyGroupName,
    #[error("group '{0}' already exists")]
    DuplicateGroup(String),
    #[error("workflow task title cannot be empty")]
    EmptyWorkflowTitle,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },
    #[error("authentication required")]
    Unauthorized,
    #[error("stale write rejected: {0}")]
    Conflict(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to load board: {0}")]
    Load(#[source] StorageError),
    #[error("failed to save board: {0}")]
    Save(#[source] StorageError),
    #[error("authentication failed, sign in again")]
    Unauthorized,
    #[error("{0}; reload and retry")]
    StaleWrite(String),
}

impl BoardError {
    /// Errors after which the session cannot continue without new credentials.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BoardError::Unauthorized)
    }
}
