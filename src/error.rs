//! Error types for the LumenChain node kernel

use std::fmt;

#[derive(Debug, Clone)]
pub enum NodeError {
    /// A config value, config-file line, CLI token or plugin id failed
    /// validation. Fatal, never retried.
    Validation(String),
    /// A config-file read or prefix-directory write failed for a reason
    /// other than the file being absent.
    Io(String),
    /// A plugin's `open` or `close` callback failed.
    Plugin(String),
    /// A lifecycle method was called in the wrong phase.
    Lifecycle(String),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NodeError::Validation(msg) => write!(f, "Validation error: {}", msg),
            NodeError::Io(msg) => write!(f, "IO error: {}", msg),
            NodeError::Plugin(msg) => write!(f, "Plugin error: {}", msg),
            NodeError::Lifecycle(msg) => write!(f, "Lifecycle error: {}", msg),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, NodeError>;
