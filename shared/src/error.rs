use lambda_http::http::StatusCode;
use thiserror::Error;

/// Failure reported by a [`crate::storage::BlobStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("storage error: {0}")]
    Other(String),
}

/// Failure reported by a [`crate::notify::Notifier`].
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to deliver message to {target}: {reason}")]
    Delivery { target: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("could not parse {name}={value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// The three outward failure classes of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    User,
    NotFound,
    Server,
}

impl ErrorClass {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorClass::User => StatusCode::BAD_REQUEST,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Server => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Missing parameters, cannot complete request: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Bad parameter format, cannot complete request; size: {0}")]
    BadSizeToken(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Unsupported extension: {0}")]
    UnsupportedExtension(String),

    #[error("File is too large: {size}, {key}")]
    TooLarge { size: u64, key: String },

    #[error("Unsupported file type: {mime}, {key}")]
    UnsupportedType { mime: String, key: String },

    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("staging buffer error: {0}")]
    Staging(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => PipelineError::NotFound { key },
            StoreError::Other(msg) => PipelineError::Storage(msg),
        }
    }
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::MissingFields(_)
            | PipelineError::BadSizeToken(_)
            | PipelineError::InvalidInput(_)
            | PipelineError::UnsupportedExtension(_)
            | PipelineError::TooLarge { .. }
            | PipelineError::UnsupportedType { .. } => ErrorClass::User,
            PipelineError::NotFound { .. } => ErrorClass::NotFound,
            PipelineError::Storage(_)
            | PipelineError::Codec(_)
            | PipelineError::Staging(_)
            | PipelineError::Notify(_)
            | PipelineError::Config(_) => ErrorClass::Server,
        }
    }

    /// Message safe to hand back to the caller. Server errors never leak their cause.
    pub fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::User => self.to_string(),
            ErrorClass::NotFound => "Not found.".to_string(),
            ErrorClass::Server => "Server error".to_string(),
        }
    }
}
