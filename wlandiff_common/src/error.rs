use thiserror::Error;

#[derive(Error, Debug)]
pub enum WlanDiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A snapshot is structurally unusable, so no comparison is attempted
    #[error("Invalid {snapshot} snapshot: {reason}")]
    InvalidSnapshot { snapshot: String, reason: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Comparison cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, WlanDiffError>;

impl WlanDiffError {
    pub fn invalid_snapshot(snapshot: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            snapshot: snapshot.into(),
            reason: reason.into(),
        }
    }
}
