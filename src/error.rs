//! Error types for cf-ip-guard.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardError {
    /// The range source could not be reached (connect, TLS, timeout, body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The range source answered, but not with a usable payload.
    #[error("Source protocol error: {0}")]
    SourceProtocol(String),

    /// The firewall tool is missing or the process lacks privilege.
    #[error("Preflight check failed: {0}")]
    Preflight(String),

    /// A staging/create/flush/add/swap operation failed.
    #[error("`{op}` failed after {completed} successful operations: {output}")]
    Replacement {
        /// Full command line of the failing operation
        op: String,
        /// Combined stdout/stderr of the failing operation
        output: String,
        /// Number of operations that succeeded before the failure
        completed: usize,
    },
}
