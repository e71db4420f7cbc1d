use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpliftError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid profile update: {reason}")]
    InvalidPatch { reason: String },

    #[error("Assistant unavailable: {reason}")]
    AssistantUnavailable { reason: String },

    #[error("Malformed assistant reply: {reason}")]
    MalformedReply { reason: String },

    #[error("Invalid configuration '{field}': {reason}")]
    Config { field: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type UpliftResult<T> = Result<T, UpliftError>;
