use thiserror::Error;

/// Failure kinds surfaced by every Hunter boundary.
///
/// "No face detected" is deliberately absent: it is a valid outcome, reported
/// through [`EnrollOutcome`](crate::EnrollOutcome) and
/// [`QueryOutcome`](crate::QueryOutcome).
#[derive(Error, Debug)]
pub enum Error {
    /// The submitted bytes could not be decoded as an image. Not retryable.
    #[error("invalid image: {0}")]
    InvalidImage(String),
    /// The backing store could not be reached. Callers may retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("record not found: {0}")]
    NotFound(String),
    /// The signature model is not loaded or its worker is gone.
    #[error("signature extractor unavailable: {0}")]
    ExtractorUnavailable(String),
    /// A loaded model failed on this particular photograph.
    #[error("signature extraction failed: {0}")]
    ExtractionFailed(String),
    /// A stored signature could not be decoded or has the wrong shape.
    #[error("corrupt signature for record {id}: {reason}")]
    CorruptSignature { id: String, reason: String },
    /// Query and stored signature were produced by different model versions.
    #[error("signature version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
}

impl Error {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidImage(_) => "InvalidImage",
            Error::StorageUnavailable(_) => "StorageUnavailable",
            Error::NotFound(_) => "NotFound",
            Error::ExtractorUnavailable(_) => "ExtractorUnavailable",
            Error::ExtractionFailed(_) => "ExtractionFailed",
            Error::CorruptSignature { .. } => "CorruptSignature",
            Error::VersionMismatch { .. } => "VersionMismatch",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
