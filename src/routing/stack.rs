//! Composable route node.
//!
//! # Responsibilities
//! - Match an optional leaf, then every chain entry in order, then at most
//!   one named child
//! - Assemble the mirror image, descending into children by name
//! - Build nodes from [`NodeDescription`]s through the plugin manager
//!
//! # Data Flow
//! ```text
//! match:    leaf(offset) → chains(running offset, merged) → first matching child
//!           → defaults for unset params
//! assemble: leaf → chains (consumed keys removed) → named child (defaults merged)
//! ```
//!
//! # Design Decisions
//! - Children and chains are resolved lazily from their descriptions
//! - The first child that matches is final; no backtracking into siblings
//! - A terminal call must account for the whole path

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{RouterError, RouterResult};
use crate::http::Request;
use crate::routing::description::{NodeDescription, RouteDescription, RouteEntry};
use crate::routing::matcher::{AssembleOptions, Matcher};
use crate::routing::plugins::PluginManager;
use crate::routing::priority_list::{PriorityList, TieBreak};
use crate::routing::route_match::{MatchTree, MergeOptions, MergeSource, NodeId, Params};

type MatcherList = PriorityList<RouteDescription, Rc<dyn Matcher>>;

/// Route node: leaf + chain + prioritized named children.
#[derive(Debug)]
pub struct RouteStack {
    plugins: Rc<PluginManager>,
    router: Option<Rc<dyn Matcher>>,
    routes: MatcherList,
    chains: MatcherList,
    defaults: Params,
    may_terminate: bool,
    assembled: RefCell<Vec<String>>,
}

impl RouteStack {
    /// Empty node resolving descriptions through `plugins`.
    pub fn new(plugins: Rc<PluginManager>) -> Self {
        let for_routes = plugins.clone();
        let for_chains = plugins.clone();
        Self {
            routes: PriorityList::new(move |description| Self::factory(&description, &for_routes)),
            chains: PriorityList::new(move |description| {
                let chain = Self::factory_router(&description, &for_chains)?;
                if chain.is_composite() {
                    return Err(RouterError::InvalidArgument(
                        "chain routes do not accept route stacks".to_string(),
                    ));
                }
                Ok(chain)
            })
            .with_tie_break(TieBreak::Fifo),
            plugins,
            router: None,
            defaults: Params::new(),
            may_terminate: false,
            assembled: RefCell::new(Vec::new()),
        }
    }

    /// Build a node from its description.
    pub fn from_description(description: NodeDescription, plugins: &Rc<PluginManager>) -> RouterResult<Self> {
        let mut stack = Self::new(plugins.clone());
        stack.configure(description)?;
        Ok(stack)
    }

    /// Apply a description on top of this node.
    pub fn configure(&mut self, description: NodeDescription) -> RouterResult<()> {
        for (name, prototype) in description.prototypes {
            self.plugins.set_prototype(name, prototype);
        }
        self.may_terminate = description.may_terminate;
        self.defaults = description.defaults;
        self.set_routes(description.routes)?;
        self.set_chains(description.chains)?;
        if let Some(router) = description.router {
            self.set_router(*router)?;
        }
        Ok(())
    }

    /// Turn a child description into a node.
    ///
    /// Composites are used as-is; plain matchers become the leaf of a fresh node.
    pub fn factory(description: &RouteDescription, plugins: &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>> {
        let matcher = plugins.build(description)?;
        if matcher.is_composite() {
            return Ok(matcher);
        }
        let mut stack = Self::new(plugins.clone());
        stack.router = Some(matcher);
        Ok(Rc::new(stack))
    }

    /// Turn a leaf or chain description into a matcher. A generic node
    /// without a type is rejected.
    fn factory_router(description: &RouteDescription, plugins: &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>> {
        if let RouteDescription::Node(_) = description {
            return Err(RouterError::InvalidArgument("Missing \"type\" option".to_string()));
        }
        plugins.build(description)
    }

    fn check_name(name: &str) -> RouterResult<()> {
        if name.is_empty() || name.contains('/') {
            return Err(RouterError::InvalidArgument(format!("invalid route name \"{name}\"")));
        }
        Ok(())
    }

    pub fn plugins(&self) -> &Rc<PluginManager> {
        &self.plugins
    }

    pub fn router(&self) -> Option<&Rc<dyn Matcher>> {
        self.router.as_ref()
    }

    pub fn set_router(&mut self, description: RouteDescription) -> RouterResult<()> {
        self.router = Some(Self::factory_router(&description, &self.plugins)?);
        Ok(())
    }

    pub fn clear_router(&mut self) {
        self.router = None;
    }

    pub fn add_route(
        &mut self,
        name: impl Into<String>,
        description: RouteDescription,
        priority: Option<i32>,
    ) -> RouterResult<()> {
        let name = name.into();
        Self::check_name(&name)?;
        self.routes.insert(name, description, priority.unwrap_or(0));
        Ok(())
    }

    pub fn add_routes(&mut self, routes: impl IntoIterator<Item = RouteEntry>) -> RouterResult<()> {
        for entry in routes {
            self.add_route(entry.name, entry.description, entry.priority)?;
        }
        Ok(())
    }

    /// Replace all children.
    pub fn set_routes(&mut self, routes: impl IntoIterator<Item = RouteEntry>) -> RouterResult<()> {
        self.routes.clear();
        self.add_routes(routes)
    }

    pub fn remove_route(&mut self, name: &str) -> bool {
        self.routes.remove(name)
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.routes.has(name)
    }

    /// Child by name, built on first access.
    pub fn route(&self, name: &str) -> RouterResult<Rc<dyn Matcher>> {
        self.routes.get(name)
    }

    /// Child names in matching order.
    pub fn route_names(&self) -> Vec<String> {
        self.routes.names()
    }

    pub fn add_chain(
        &mut self,
        name: impl Into<String>,
        description: RouteDescription,
        priority: Option<i32>,
    ) -> RouterResult<()> {
        let name = name.into();
        Self::check_name(&name)?;
        self.chains.insert(name, description, priority.unwrap_or(0));
        Ok(())
    }

    pub fn add_chains(&mut self, chains: impl IntoIterator<Item = RouteEntry>) -> RouterResult<()> {
        for entry in chains {
            self.add_chain(entry.name, entry.description, entry.priority)?;
        }
        Ok(())
    }

    pub fn set_chains(&mut self, chains: impl IntoIterator<Item = RouteEntry>) -> RouterResult<()> {
        self.chains.clear();
        self.add_chains(chains)
    }

    pub fn remove_chain(&mut self, name: &str) -> bool {
        self.chains.remove(name)
    }

    pub fn has_chain(&self, name: &str) -> bool {
        self.chains.has(name)
    }

    pub fn chain(&self, name: &str) -> RouterResult<Rc<dyn Matcher>> {
        self.chains.get(name)
    }

    pub fn chain_names(&self) -> Vec<String> {
        self.chains.names()
    }

    pub fn defaults(&self) -> &Params {
        &self.defaults
    }

    pub fn set_defaults(&mut self, defaults: Params) {
        self.defaults = defaults;
    }

    pub fn set_default(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.defaults.insert(name.into(), value.into());
    }

    pub fn may_terminate(&self) -> bool {
        self.may_terminate
    }

    pub fn set_may_terminate(&mut self, may_terminate: bool) {
        self.may_terminate = may_terminate;
    }

    fn apply_defaults(&self, tree: &mut MatchTree, id: NodeId) {
        let node = tree.node_mut(id);
        for (name, value) in &self.defaults {
            if node.param(name).is_none() {
                node.set_param(name.clone(), value.clone());
            }
        }
    }
}

impl Matcher for RouteStack {
    fn match_request(
        &self,
        request: &mut dyn Request,
        offset: Option<usize>,
        tree: &mut MatchTree,
    ) -> RouterResult<Option<NodeId>> {
        let Some(path_length) = request.uri().map(|uri| uri.path().len()) else {
            return Ok(None);
        };
        let must_terminate = offset.is_none();
        let offset = offset.unwrap_or(0);
        let mut next_offset = offset;
        let mut matched = None;

        if let Some(router) = &self.router {
            let Some(id) = router.match_request(request, Some(offset), tree)? else {
                return Ok(None);
            };
            next_offset += tree.node(id).length();
            matched = Some(id);
        }

        if !self.chains.is_empty() {
            let accumulator = match matched {
                Some(id) => id,
                None => tree.create(Params::new(), 0),
            };
            for entry in self.chains.iter() {
                let (name, chain) = entry?;
                let Some(id) = chain.match_request(request, Some(next_offset), tree)? else {
                    trace!(chain = %name, offset = next_offset, "chain did not match");
                    return Ok(None);
                };
                let length = tree.node(id).length();
                tree.merge(accumulator, MergeSource::Node(id), MergeOptions::default())?;
                next_offset += length;
            }
            matched = Some(accumulator);
            if must_terminate && next_offset != path_length {
                return Ok(None);
            }
        } else if must_terminate && self.routes.is_empty() && next_offset != path_length {
            return Ok(None);
        }

        if !self.routes.is_empty() {
            if self.may_terminate && next_offset == path_length {
                let id = matched.unwrap_or_else(|| tree.create(Params::new(), 0));
                self.apply_defaults(tree, id);
                return Ok(Some(id));
            }

            let mut accepted = None;
            for entry in self.routes.iter() {
                let (name, route) = entry?;
                let Some(child) = route.match_request(request, Some(next_offset), tree)? else {
                    continue;
                };
                if next_offset + tree.node(child).length() != path_length {
                    debug!(route = %name, offset = next_offset, "child left path unconsumed");
                    return Ok(None);
                }
                let id = match matched {
                    Some(accumulator) => {
                        tree.merge(accumulator, MergeSource::Node(child), MergeOptions::default())?;
                        accumulator
                    }
                    None => child,
                };
                tree.set_matched_name(id, &name);
                accepted = Some(id);
                break;
            }
            let Some(id) = accepted else {
                return Ok(None);
            };
            matched = Some(id);
        }

        let Some(id) = matched else {
            return Ok(None);
        };
        self.apply_defaults(tree, id);
        Ok(Some(id))
    }

    fn assemble(&self, params: &Params, options: &AssembleOptions) -> RouterResult<String> {
        let mut params = params.clone();
        let mut assembled = Vec::new();
        let mut path = String::new();

        let (head, rest) = match options.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => match name.split_once('/') {
                Some((head, rest)) => (Some(head), Some(rest).filter(|r| !r.is_empty())),
                None => (Some(name), None),
            },
            None => (None, None),
        };
        let has_child = head.is_some();

        let mut consume = |matcher: &Rc<dyn Matcher>, params: &mut Params| {
            let used = matcher.assembled_params();
            for key in &used {
                params.shift_remove(key);
            }
            assembled.extend(used);
        };

        if let Some(router) = &self.router {
            let leaf_options = AssembleOptions {
                name: None,
                has_child: has_child || !self.chains.is_empty(),
                containers: options.containers.clone(),
            };
            path.push_str(&router.assemble(&params, &leaf_options)?);
            consume(router, &mut params);
        }

        let chain_count = self.chains.len();
        for (index, entry) in self.chains.iter().enumerate() {
            let (_, chain) = entry?;
            let chain_options = AssembleOptions {
                name: None,
                has_child: has_child || index + 1 < chain_count,
                containers: options.containers.clone(),
            };
            path.push_str(&chain.assemble(&params, &chain_options)?);
            consume(&chain, &mut params);
        }

        match head {
            None => {
                if !self.routes.is_empty() && !self.may_terminate {
                    return Err(RouterError::Runtime(
                        "route with children may not terminate".to_string(),
                    ));
                }
            }
            Some(head) => {
                if self.routes.is_empty() {
                    return Err(RouterError::Runtime(format!(
                        "route with name \"{head}\" does not exist"
                    )));
                }
                if !self.routes.has(head) {
                    return Err(RouterError::Runtime(format!(
                        "route with name \"{head}\" not found"
                    )));
                }
                let route = self.routes.get(head)?;
                let mut child_params = self.defaults.clone();
                child_params.extend(params);
                let child_options = AssembleOptions {
                    name: rest.map(str::to_string),
                    has_child: false,
                    containers: options.containers.clone(),
                };
                path.push_str(&route.assemble(&child_params, &child_options)?);
                assembled.extend(route.assembled_params());
            }
        }

        *self.assembled.borrow_mut() = assembled;
        Ok(path)
    }

    fn assembled_params(&self) -> Vec<String> {
        self.assembled.borrow().clone()
    }

    fn as_stack(&self) -> Option<&RouteStack> {
        Some(self)
    }

    fn as_stack_mut(&mut self) -> Option<&mut RouteStack> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
