//! Error types for the segpipe engine

use std::fmt;

/// Result type alias for segpipe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while building or evaluating a step graph
// Display and std::error::Error are implemented by hand because the
// `source` fields below name a pipeline source (a String), which the
// thiserror derive would wrongly treat as the error's source.
#[derive(Debug)]
pub enum Error {
    /// An adapter references a source that is neither a raw input bundle
    /// nor an upstream step with published output
    UnresolvedReference {
        /// Consuming step
        step: String,
        /// The referenced source name
        source: String,
    },

    /// An adapter references a source that exists but never produced the key
    MissingOutputKey {
        /// Consuming step
        step: String,
        /// The referenced source name
        source: String,
        /// The missing output key
        key: String,
    },

    /// Dependency cycle detected while ordering the graph
    CyclicGraph(Vec<String>),

    /// Requested pipeline / mode combination has no builder
    UnsupportedMode(String),

    /// A transformer failed during evaluation; downstream steps never ran
    TransformerExecution {
        /// Name of the failing step
        step: String,
        /// Underlying failure, propagated unmodified
        source: Box<Error>,
    },

    /// Cache persistence failure (save failures are fatal, load failures
    /// fall back to recomputation before ever surfacing this)
    CacheIo(String),

    /// Graph construction error (duplicate names, malformed wiring)
    Construction(String),

    /// Configuration parsing or validation error
    Config(String),

    /// Invalid input data handed to a transformer (type mismatch, missing key)
    InvalidInput(String),

    /// I/O error
    Io(std::io::Error),

    /// Serialization error
    Serialization(serde_json::Error),

    /// Generic error
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnresolvedReference { step, source } => {
                write!(f, "step '{step}': adapter references unknown source '{source}'")
            }
            Error::MissingOutputKey { step, source, key } => {
                write!(f, "step '{step}': source '{source}' has no output key '{key}'")
            }
            Error::CyclicGraph(path) => {
                write!(f, "cycle detected in step graph: {}", path.join(" -> "))
            }
            Error::UnsupportedMode(mode) => write!(f, "unsupported mode: {mode}"),
            Error::TransformerExecution { step, source } => {
                write!(f, "step '{step}' failed: {source}")
            }
            Error::CacheIo(msg) => write!(f, "cache I/O error: {msg}"),
            Error::Construction(msg) => write!(f, "graph construction error: {msg}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Serialization(err) => write!(f, "serialization error: {err}"),
            Error::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::TransformerExecution { source, .. } => Some(source.as_ref()),
            Error::Io(err) => Some(err),
            Error::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
