//! Declarative route descriptions.
//!
//! A [`RouteDescription`] is the single tagged shape every builder consumes,
//! whether it came from a config file or was assembled in code.

use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::schema::{NestedConfig, NodeConfig, RouteConfig};
use crate::error::{RouterError, RouterResult};
use crate::routing::matcher::Matcher;
use crate::routing::route_match::Params;

/// Options handed to a plugin factory.
pub type PluginOptions = Map<String, Value>;

/// How to obtain one matcher.
#[derive(Debug, Clone)]
pub enum RouteDescription {
    /// A live matcher used as-is.
    Instance(Rc<dyn Matcher>),
    /// Plugin type or prototype looked up by name.
    Named(String),
    /// Plugin type plus its options, built by the plugin manager.
    Typed { kind: String, options: PluginOptions },
    /// Generic route node.
    Node(NodeDescription),
}

impl RouteDescription {
    pub fn instance(matcher: impl Matcher + 'static) -> Self {
        RouteDescription::Instance(Rc::new(matcher))
    }

    pub fn named(name: impl Into<String>) -> Self {
        RouteDescription::Named(name.into())
    }

    /// `options` should be a JSON object; anything else means no options.
    pub fn typed(kind: impl Into<String>, options: Value) -> Self {
        let options = match options {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        RouteDescription::Typed {
            kind: kind.into(),
            options,
        }
    }
}

impl From<NodeDescription> for RouteDescription {
    fn from(node: NodeDescription) -> Self {
        RouteDescription::Node(node)
    }
}

impl From<Rc<dyn Matcher>> for RouteDescription {
    fn from(matcher: Rc<dyn Matcher>) -> Self {
        RouteDescription::Instance(matcher)
    }
}

impl From<&RouteConfig> for RouteDescription {
    fn from(config: &RouteConfig) -> Self {
        match config {
            RouteConfig::Name(name) => RouteDescription::Named(name.clone()),
            RouteConfig::Typed(typed) => RouteDescription::Typed {
                kind: typed.kind.clone(),
                options: typed.options.clone(),
            },
            RouteConfig::Node(node) => RouteDescription::Node(node.into()),
        }
    }
}

/// Named entry of a children or chain list.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub name: String,
    pub description: RouteDescription,
    pub priority: Option<i32>,
}

/// Fields of a generic route node.
#[derive(Debug, Clone, Default)]
pub struct NodeDescription {
    pub router: Option<Box<RouteDescription>>,
    pub routes: Vec<RouteEntry>,
    pub chains: Vec<RouteEntry>,
    pub defaults: Params,
    pub may_terminate: bool,
    pub prototypes: Vec<(String, RouteDescription)>,
}

impl NodeDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaf(mut self, description: impl Into<RouteDescription>) -> Self {
        self.router = Some(Box::new(description.into()));
        self
    }

    pub fn route(self, name: impl Into<String>, description: impl Into<RouteDescription>) -> Self {
        self.push_route(name, description, None)
    }

    pub fn route_with_priority(
        self,
        name: impl Into<String>,
        description: impl Into<RouteDescription>,
        priority: i32,
    ) -> Self {
        self.push_route(name, description, Some(priority))
    }

    fn push_route(
        mut self,
        name: impl Into<String>,
        description: impl Into<RouteDescription>,
        priority: Option<i32>,
    ) -> Self {
        self.routes.push(RouteEntry {
            name: name.into(),
            description: description.into(),
            priority,
        });
        self
    }

    pub fn chain(mut self, name: impl Into<String>, description: impl Into<RouteDescription>) -> Self {
        self.chains.push(RouteEntry {
            name: name.into(),
            description: description.into(),
            priority: None,
        });
        self
    }

    pub fn defaults(mut self, defaults: Params) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn may_terminate(mut self, may_terminate: bool) -> Self {
        self.may_terminate = may_terminate;
        self
    }

    pub fn prototype(mut self, name: impl Into<String>, description: impl Into<RouteDescription>) -> Self {
        self.prototypes.push((name.into(), description.into()));
        self
    }
}

fn entries(map: &indexmap::IndexMap<String, RouteConfig>) -> Vec<RouteEntry> {
    map.iter()
        .map(|(name, config)| RouteEntry {
            name: name.clone(),
            description: config.into(),
            priority: config.priority(),
        })
        .collect()
}

impl From<&NodeConfig> for NodeDescription {
    fn from(config: &NodeConfig) -> Self {
        Self {
            router: config
                .router
                .as_deref()
                .map(|leaf| Box::new(RouteDescription::from(leaf))),
            routes: entries(&config.routes),
            chains: entries(&config.chains),
            defaults: config.defaults.clone(),
            may_terminate: config.may_terminate,
            prototypes: config
                .prototypes
                .iter()
                .map(|(name, config)| (name.clone(), config.into()))
                .collect(),
        }
    }
}

/// A node that partitions its path into anchored containers.
#[derive(Debug, Clone)]
pub struct NestedDescription {
    pub anchor: char,
    pub main_container: String,
    pub use_all_params: bool,
    pub node: NodeDescription,
}

impl Default for NestedDescription {
    fn default() -> Self {
        (&NestedConfig::default()).into()
    }
}

impl NestedDescription {
    pub fn new(main_container: impl Into<String>, node: NodeDescription) -> Self {
        Self {
            main_container: main_container.into(),
            node,
            ..Self::default()
        }
    }

    pub fn anchor(mut self, anchor: char) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn use_all_params(mut self, use_all_params: bool) -> Self {
        self.use_all_params = use_all_params;
        self
    }
}

impl From<&NestedConfig> for NestedDescription {
    fn from(config: &NestedConfig) -> Self {
        Self {
            anchor: config.anchor,
            main_container: config.main_container.clone(),
            use_all_params: config.use_all_params,
            node: (&config.node()).into(),
        }
    }
}

/// Deserialize plugin options into a typed options struct.
pub(crate) fn parse_options<T: DeserializeOwned>(kind: &str, options: &PluginOptions) -> RouterResult<T> {
    serde_json::from_value(Value::Object(options.clone())).map_err(|e| {
        RouterError::InvalidArgument(format!("invalid options for \"{kind}\" route: {e}"))
    })
}
