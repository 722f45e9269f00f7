use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SyncError {
    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        SyncError::Configuration(msg.into())
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        SyncError::Schema(msg.into())
    }

    pub fn connection<T: Into<String>>(msg: T) -> Self {
        SyncError::Connection(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        SyncError::Query(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        SyncError::NotFound(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        SyncError::InvalidInput(msg.into())
    }
}
