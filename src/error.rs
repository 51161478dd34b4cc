//! Error types for the vSphere problem detector
//!
//! Every check returns either success or one aggregated error that lists
//! every failing item it found. The variants below follow the failure
//! taxonomy of the checks: transport problems, lookups that found nothing,
//! storage policy resolution, path length violations, escaping failures
//! and missing VM/node capabilities.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the detector
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Operation {operation} is not supported by this vSphere backend")]
    Unsupported { operation: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("vCenter HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} failed: {reason}")]
    Transport { operation: String, reason: String },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("File {path} was not found")]
    FileNotFound { path: String },

    // =========================================================================
    // Storage Policy Errors
    // =========================================================================
    #[error("error listing storage policy {policy:?}: policy not found")]
    PolicyNotFound { policy: String },

    #[error("error listing storage policy {policy:?}: multiple ({count}) policies found")]
    PolicyAmbiguous { policy: String, count: usize },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error(
        "escaped volume path {path:?} is too long (must be under {limit} characters, got {length})"
    )]
    PathTooLong {
        path: String,
        length: usize,
        limit: usize,
    },

    #[error("error escaping path {path:?}: {reason}")]
    EscapeFailed { path: String, reason: String },

    #[error("{subject}: {reason}")]
    MissingCapability { subject: String, reason: String },

    #[error("{count} nodes have issues")]
    NodesFailed { count: usize },

    /// Context wrapper naming the entity a nested error belongs to
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Aggregate(AggregateError),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Collapse a list of per-item failures into one error.
    ///
    /// Returns `Ok(())` when the list is empty so callers can end a loop
    /// with `Error::aggregate(errs)`.
    pub fn aggregate(errors: Vec<Error>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(AggregateError(errors)))
        }
    }

    /// Prefix this error with the entity it belongs to
    pub fn context(self, context: impl Into<String>) -> Error {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check whether this error (or the error it wraps) is a missing file
    pub fn is_file_not_found(&self) -> bool {
        match self {
            Error::FileNotFound { .. } => true,
            Error::Context { source, .. } => source.is_file_not_found(),
            _ => false,
        }
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(_) | Error::Http(_) | Error::Transport { .. } | Error::Timeout { .. } => {
                true
            }
            Error::Context { source, .. } => source.is_transient(),
            Error::Aggregate(agg) => agg.errors().iter().any(Error::is_transient),
            _ => false,
        }
    }
}

/// A list of independent failures reported as one error
#[derive(Debug)]
pub struct AggregateError(Vec<Error>);

impl AggregateError {
    /// The collected errors, in the order they were found
    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [single] => write!(f, "{}", single),
            many => {
                write!(f, "[")?;
                for (i, err) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Result type alias for the detector
pub type Result<T> = std::result::Result<T, Error>;
