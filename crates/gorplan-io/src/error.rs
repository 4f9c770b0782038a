use thiserror::Error;

/// Result type local to gorplan-io.
pub type Result<T> = std::result::Result<T, ReadError>;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dictionary '{path}': {message}")]
    Dictionary { path: String, message: String },
}

impl ReadError {
    /// Path the failure is about.
    pub fn path(&self) -> &str {
        match self {
            ReadError::NotFound { path }
            | ReadError::Io { path, .. }
            | ReadError::Dictionary { path, .. } => path,
        }
    }

    pub(crate) fn io(path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            ReadError::NotFound {
                path: path.to_string(),
            }
        } else {
            ReadError::Io {
                path: path.to_string(),
                source,
            }
        }
    }
}

impl From<ReadError> for gorplan_core::Error {
    fn from(e: ReadError) -> Self {
        gorplan_core::Error::resource(e.path().to_string(), e.to_string())
    }
}
