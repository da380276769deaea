//! Interface address client errors

use thiserror::Error;

/// Errors that can occur when reading or changing interface addresses
#[derive(Debug, Error)]
pub enum AddressError {
    /// Spawning the helper command failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The helper command ran but exited unsuccessfully
    #[error("command `{command}` failed ({status}): {stderr}")]
    Command {
        /// Rendered command line
        command: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// A CIDR prefix could not be parsed
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Backend rejected the operation (used by test doubles)
    #[error("Backend error: {0}")]
    Backend(String),
}
