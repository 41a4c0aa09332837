//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (root matcher, terminal call)
//!     → stack.rs (leaf → chains → first matching child)
//!     → nested/ (per-container matches arranged as a tree)
//!     → lazy.rs (stand-in resolved by name on first use)
//!     → Return: RouteMatch tree or no match
//!
//! Route Construction:
//!     RouteConfig / RouteDescription
//!     → plugins.rs (type names, aliases, shared prototypes)
//!     → priority_list.rs (lazy, priority-ordered children)
//! ```
//!
//! # Design Decisions
//! - Children are resolved on first use and kept afterwards
//! - Higher priority first; equal priorities follow insertion order rules
//!   of the owning list
//! - First matching child wins and must consume the rest of the path

pub mod description;
pub mod lazy;
pub mod matcher;
pub mod nested;
pub mod plugins;
pub mod priority_list;
pub mod regex_route;
pub mod route_match;
pub mod router;
pub mod segment;
pub mod stack;

pub use description::{NestedDescription, NodeDescription, RouteDescription, RouteEntry};
pub use lazy::LazyStack;
pub use matcher::{AssembleOptions, ContainerValue, Containers, Literal, Matcher, Method, Wildcard};
pub use nested::{CacheStats, NestedStack};
pub use plugins::PluginManager;
pub use priority_list::{PriorityList, TieBreak};
pub use regex_route::RegexRoute;
pub use route_match::{Child, MatchNode, MatchTree, NodeId, Params, RouteMatch};
pub use router::Router;
pub use segment::Segment;
pub use stack::RouteStack;
