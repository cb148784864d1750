//! Error types for CFG extraction.
//!
//! All analyzer and flattener failures are unrecoverable for the call in
//! which they occur: construction aborts immediately and no partial graph is
//! ever returned. The caller decides whether to abort the whole pipeline or
//! skip the offending input.

use std::path::Path;

/// Errors that can occur during CFG construction or flattening.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The top-level node given to the analyzer is not a closure-like node
    /// (program root, function, arrow function, or method definition).
    #[error("invalid node kind for closure: {0}")]
    InvalidNodeKind(String),

    /// A statement or expression kind outside the supported vocabulary.
    #[error("unsupported syntax: {0}")]
    UnsupportedSyntax(String),

    /// A break/continue label that does not resolve in the scope chain.
    #[error("label not found: {0}")]
    UnresolvedLabel(String),

    /// A labeled continue that targets a switch statement.
    #[error("cannot continue from a switch statement: {0}")]
    IllegalContinueTarget(String),

    /// Flattening requested with a depth below 1.
    #[error("invalid flatten depth {0}, must be at least 1")]
    InvalidDepth(usize),

    /// A syntax node is missing a field its kind requires.
    #[error("malformed syntax tree: {0}")]
    MalformedTree(String),

    /// I/O failure while reading a syntax tree file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A syntax tree file that is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// Create an I/O error annotated with the offending path.
    pub fn io_with_path(err: std::io::Error, path: &Path) -> Self {
        FlowError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FlowError>;
