use std::fmt;

/// Result type for foreman-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the engine layer
#[derive(Debug)]
pub enum Error {
    /// No queued decision under this id
    UnknownDecision(String),

    /// The resolution channel closed before a resolution arrived
    ResolutionChannel(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownDecision(id) => write!(f, "Unknown decision: {}", id),
            Error::ResolutionChannel(id) => {
                write!(f, "Resolution channel closed for decision: {}", id)
            }
        }
    }
}

impl std::error::Error for Error {}
