// citywalk/src/error.rs
//! Error taxonomy for catalog loading, synthesis, and repair.

use thiserror::Error;

use crate::catalog::LibraryId;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("no operation catalog exists for library: {0}")]
    UnknownLibrary(String),

    #[error("unknown operation `{name}` in {library} catalog")]
    UnknownOperation { library: LibraryId, name: String },

    #[error("malformed catalog: {0}")]
    MalformedCatalog(String),

    #[error("parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("no feasible operation could open the sequence")]
    NoFeasibleOperation,

    #[error("step or time budget exhausted before cleanup completed")]
    Exhausted,

    /// Internal invariant violation: `apply` was committed without a passing
    /// feasibility check. Indicates a synthesizer bug, not bad input.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("irreparable sequence: {0}")]
    Irreparable(String),
}

impl SynthError {
    /// Configuration-time errors abort a whole generation run; everything
    /// else is isolated to the sequence that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SynthError::UnknownLibrary(_)
                | SynthError::UnknownOperation { .. }
                | SynthError::MalformedCatalog(_)
                | SynthError::ParseError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(SynthError::UnknownLibrary("png".into()).is_fatal());
        assert!(SynthError::MalformedCatalog("truncated".into()).is_fatal());
        assert!(!SynthError::Exhausted.is_fatal());
        assert!(!SynthError::NoFeasibleOperation.is_fatal());
        assert!(!SynthError::InvalidTransition("h3 freed".into()).is_fatal());
    }

    #[test]
    fn parse_errors_are_format_neutral() {
        let err: SynthError = serde_json::from_str::<u32>("[]").unwrap_err().into();
        assert!(err.is_fatal());
        let message = err.to_string();
        assert!(message.starts_with("parse error"), "{message}");
        assert!(!message.contains("catalog"), "{message}");
    }
}
