//! Hierarchical HTTP route matching and path assembly.
//!
//! Routes form a tree of [`routing::RouteStack`] nodes, each with an optional
//! leaf matcher, chained matchers and prioritized children. A
//! [`routing::NestedStack`] splits one path into anchored containers and
//! matches each of them independently.

pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod routing;

pub use config::{load_config, ConfigError, RouterConfig};
pub use error::{RouterError, RouterResult};
pub use http::{HttpRequest, Request};
pub use routing::{AssembleOptions, Matcher, RouteDescription, RouteMatch, Router};
