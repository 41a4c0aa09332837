//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! routing / config produce:
//!     → tracing events (debug: match and assemble decisions,
//!       trace: partition steps, warn: diagnostic paths)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, text or JSON)
//! ```
//!
//! # Design Decisions
//! - Library code only emits events; the binary installs the subscriber
//! - `RUST_LOG` wins over the configured level

pub mod logging;

pub use logging::init_logging;
