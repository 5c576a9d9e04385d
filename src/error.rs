use crate::resource::ResourceType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("attempted to create a handle which is already in use: {handle}")]
    AlreadyBound { handle: String },

    #[error("attempted to reuse handle {handle} previously used by a {previous} for a new {requested}")]
    TypeMismatch {
        handle: String,
        previous: ResourceType,
        requested: ResourceType,
    },

    #[error("invalid handle format: {handle}")]
    InvalidHandle { handle: String },

    #[error("handle store error: {0}")]
    Store(String),

    #[error("remote resolver error: {message}")]
    RemoteResolution { message: String, transient: bool },

    #[error("cannot read handle server credential at {path}: {message}")]
    Credential { path: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl HandleError {
    /// True when the caller may retry the operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RemoteResolution { transient: true, .. })
    }

    pub(crate) fn transient(message: impl Into<String>) -> Self {
        Self::RemoteResolution {
            message: message.into(),
            transient: true,
        }
    }

    pub(crate) fn fatal(message: impl Into<String>) -> Self {
        Self::RemoteResolution {
            message: message.into(),
            transient: false,
        }
    }
}

impl From<config::ConfigError> for HandleError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error("unknown hash algorithm: {algorithm}")]
    UnknownAlgorithm { algorithm: String },

    #[error("a hash algorithm is required for a precomputed hash")]
    MissingAlgorithm,

    #[error("invalid hexadecimal encoding: {0}")]
    InvalidHex(String),

    #[error("random source failure: {0}")]
    Entropy(String),
}

impl From<hex::FromHexError> for HashError {
    fn from(err: hex::FromHexError) -> Self {
        Self::InvalidHex(err.to_string())
    }
}

/// Why a task could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("background queue is full")]
    Full,

    #[error("background queue has been shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, HandleError>;

pub type HashResult<T> = std::result::Result<T, HashError>;
