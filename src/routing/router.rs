//! Route lookup and path assembly entry point.
//!
//! # Responsibilities
//! - Own the root matcher and the plugin manager that built it
//! - Run terminal matches and hand back an owned [`RouteMatch`]
//! - Assemble paths from params and container overrides
//!
//! # Design Decisions
//! - The root is any matcher; a config root without a type is a route stack
//! - Top-level prototypes are registered before the root is built
//! - Explicit `Ok(None)` for no match rather than a silent default

use std::rc::Rc;

use tracing::debug;

use crate::config::{ConfigError, RouterConfig};
use crate::error::RouterResult;
use crate::http::{HttpRequest, Request};
use crate::routing::description::RouteDescription;
use crate::routing::matcher::{AssembleOptions, Matcher};
use crate::routing::plugins::PluginManager;
use crate::routing::route_match::{MatchTree, Params, RouteMatch};

/// Root matcher plus the plugins it was built with.
#[derive(Debug, Clone)]
pub struct Router {
    root: Rc<dyn Matcher>,
    plugins: Rc<PluginManager>,
}

impl Router {
    pub fn new(root: Rc<dyn Matcher>, plugins: Rc<PluginManager>) -> Self {
        Self { root, plugins }
    }

    /// Build the root from a description using the builtin route types.
    pub fn from_description(description: &RouteDescription) -> RouterResult<Self> {
        let plugins = PluginManager::builtin();
        let root = plugins.build(description)?;
        Ok(Self::new(root, plugins))
    }

    /// Build from a loaded configuration.
    pub fn from_config(config: &RouterConfig) -> Result<Self, ConfigError> {
        let plugins = PluginManager::builtin();
        for (name, prototype) in &config.prototypes {
            plugins.set_prototype(name.clone(), prototype.into());
        }
        let root = plugins.build(&RouteDescription::from(&config.router))?;
        debug!(prototypes = config.prototypes.len(), "router built from config");
        Ok(Self::new(root, plugins))
    }

    pub fn root(&self) -> &Rc<dyn Matcher> {
        &self.root
    }

    pub fn plugins(&self) -> &Rc<PluginManager> {
        &self.plugins
    }

    /// Match the whole request path.
    pub fn match_request(&self, request: &mut dyn Request) -> RouterResult<Option<RouteMatch>> {
        let mut tree = MatchTree::new();
        let found = self.root.match_request(request, None, &mut tree)?;
        Ok(found.map(|root| RouteMatch::new(tree, root)))
    }

    /// Match a method and path pair.
    pub fn match_path(&self, method: &str, path: &str) -> RouterResult<Option<RouteMatch>> {
        let mut request = HttpRequest::new(method, path);
        let found = self.match_request(&mut request)?;
        debug!(method, path, matched = found.is_some(), "match");
        Ok(found)
    }

    pub fn assemble(&self, params: &Params, options: &AssembleOptions) -> RouterResult<String> {
        self.root.assemble(params, options)
    }
}
