use thiserror::Error;

/// Failures surfaced by the transfer core.
///
/// `NotFound` deliberately does not distinguish "never existed" from
/// "already consumed": no tombstones are kept.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("{0} store is not configured")]
    StoreUnavailable(&'static str),

    #[error("Blob store error: {0}")]
    Blob(#[source] anyhow::Error),

    #[error("Metadata store error: {0}")]
    Metadata(#[source] anyhow::Error),
}

impl TransferError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
