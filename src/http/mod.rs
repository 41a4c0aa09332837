//! Request abstraction consumed by the routing subsystem.
//!
//! # Data Flow
//! ```text
//! caller request
//!     → request.rs (UriPath / method capabilities)
//!     → routing (matchers read and temporarily rewrite the path)
//! ```

pub mod request;

pub use request::{HttpRequest, Request, Uri, UriPath};
