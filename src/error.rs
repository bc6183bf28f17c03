//! Error types for the composition pipeline.

use std::fmt;

/// An error surfaced by the composition pipeline.
///
/// There are no partial results: any of these aborts the whole request.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A filtered corpus query returned zero results.
    CorpusExhausted {
        /// Which query came up empty (for diagnostics only).
        query: &'static str,
    },
    /// Generation was requested before global parameters were resolved.
    PreconditionViolated,
    /// Corpus data is internally inconsistent (e.g. a figure's chord list
    /// does not match its declared bars x beats) and it is unsafe to proceed.
    MalformedInput(String),
    /// An external collaborator failed; the message is surfaced verbatim.
    ResourceUnavailable(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CorpusExhausted { query } => {
                write!(f, "corpus exhausted: no entries matched {query}")
            }
            Error::PreconditionViolated => {
                write!(f, "composition requested before parameters were generated")
            }
            Error::MalformedInput(msg) => write!(f, "malformed input: {msg}"),
            Error::ResourceUnavailable(msg) => write!(f, "resource unavailable: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
