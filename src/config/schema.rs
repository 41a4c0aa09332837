//! Configuration schema definitions.
//!
//! This module defines the declarative route tree as read from config files.
//! All types derive Serde traits; `routing::description` turns them into the
//! runtime [`RouteDescription`](crate::routing::RouteDescription).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::routing::route_match::Params;

/// Root configuration for a router.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Root route node.
    pub router: RouteConfig,

    /// Named prototypes shared by every route that references them.
    pub prototypes: IndexMap<String, RouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// One route description.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RouteConfig {
    /// Plugin type or prototype name.
    Name(String),

    /// Description handed to the plugin resolver as a whole.
    Typed(TypedRouteConfig),

    /// Generic route node.
    Node(NodeConfig),
}

impl Default for RouteConfig {
    fn default() -> Self {
        RouteConfig::Node(NodeConfig::default())
    }
}

impl RouteConfig {
    /// Priority among siblings, if declared.
    pub fn priority(&self) -> Option<i32> {
        match self {
            RouteConfig::Name(_) => None,
            RouteConfig::Typed(typed) => typed.priority,
            RouteConfig::Node(node) => node.priority,
        }
    }
}

/// `{ type = "...", ...options }`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TypedRouteConfig {
    /// Plugin type or alias.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// Remaining keys, interpreted by the plugin.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// Fields of a generic route node.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Leaf matcher.
    pub router: Option<Box<RouteConfig>>,

    /// Named alternative children.
    pub routes: IndexMap<String, RouteConfig>,

    /// Matchers that must all succeed in sequence after the leaf.
    pub chains: IndexMap<String, RouteConfig>,

    /// Params applied when a match leaves them unset.
    pub defaults: Params,

    /// Whether the node may match without descending into a child.
    pub may_terminate: bool,

    /// Prototypes registered while this node is built.
    pub prototypes: IndexMap<String, RouteConfig>,

    pub priority: Option<i32>,
}

/// Options of the `nested` plugin type.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NestedConfig {
    /// Marker character whose repetition encodes container depth.
    pub anchor: char,

    /// Name of the root container.
    pub main_container: String,

    /// Merge root params into the main container when assembling.
    pub use_all_params: bool,

    pub router: Option<Box<RouteConfig>>,
    pub routes: IndexMap<String, RouteConfig>,
    pub chains: IndexMap<String, RouteConfig>,
    pub defaults: Params,
    pub may_terminate: bool,
    pub prototypes: IndexMap<String, RouteConfig>,
    pub priority: Option<i32>,
}

impl Default for NestedConfig {
    fn default() -> Self {
        Self {
            anchor: '~',
            main_container: "content".to_string(),
            use_all_params: false,
            router: None,
            routes: IndexMap::new(),
            chains: IndexMap::new(),
            defaults: Params::new(),
            may_terminate: false,
            prototypes: IndexMap::new(),
            priority: None,
        }
    }
}

impl NestedConfig {
    /// The generic node part of this config.
    pub fn node(&self) -> NodeConfig {
        NodeConfig {
            router: self.router.clone(),
            routes: self.routes.clone(),
            chains: self.chains.clone(),
            defaults: self.defaults.clone(),
            may_terminate: self.may_terminate,
            prototypes: self.prototypes.clone(),
            priority: self.priority,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
