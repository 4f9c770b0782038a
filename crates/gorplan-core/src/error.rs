use thiserror::Error;

/// Canonical result for the planning layer.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unknown placeholder reference, empty names.
    #[error("Parsing error: {message}: '{token}'")]
    Parsing { token: String, message: String },

    /// A file or dictionary signature could not be computed.
    #[error("Resource error: {message}: '{path}'")]
    Resource { path: String, message: String },

    #[error("Macro expansion of '{task}' did not reach a fixed point after {rounds} rounds")]
    ExpansionLimit { task: String, rounds: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    // A macro or fan-out resolver broke the planner's contract. Not recoverable.
    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    pub fn parsing(token: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parsing {
            token: token.into(),
            message: message.into(),
        }
    }

    pub fn resource(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Resource {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_parsing(&self) -> bool {
        matches!(self, Error::Parsing { .. })
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Error::Resource { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
