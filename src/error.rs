//! Error definitions shared by the routing subsystem.
//!
//! "No match" is never an error: matchers report it as `Ok(None)`.

use thiserror::Error;

/// Errors raised while building, matching or assembling routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// A named route, chain, plugin or list item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed construction input or an unusable operand.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Structural misuse, e.g. assembling toward a route that does not exist.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type for routing operations.
pub type RouterResult<T> = Result<T, RouterError>;
