//! Matcher capability and the simple leaf matchers.
//!
//! # Responsibilities
//! - Define the contract shared by leaves, chain entries and route nodes
//! - Match literal path prefixes (case-sensitive)
//! - Match HTTP methods (case-insensitive)
//! - Match trailing key/value wildcards
//!
//! # Design Decisions
//! - A request without the needed accessor is a plain no-match
//! - Offsets are byte positions into the path; a terminal (root) call passes `None`
//! - Assembly records the parameter keys it consumed so callers can diff the rest

use std::any::Any;
use std::cell::RefCell;
use std::fmt;

use indexmap::IndexMap;

use crate::error::RouterResult;
use crate::http::Request;
use crate::routing::route_match::{MatchTree, NodeId, Params};
use crate::routing::stack::RouteStack;

/// Value requested for one container during nested assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerValue {
    /// Literal replacement path.
    Path(String),
    /// Path assembled from params through the owning stack, optionally
    /// toward a named child route.
    Route { route: Option<String>, params: Params },
    /// Drop the container and everything nested beneath it.
    Strip,
}

/// Container overrides keyed by hierarchical key (placeholders allowed).
pub type Containers = IndexMap<String, ContainerValue>;

/// Options passed down through `assemble`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Slash-delimited route name to descend into.
    pub name: Option<String>,
    /// Whether more path follows the fragment being assembled.
    pub has_child: bool,
    /// Container overrides for nested stacks.
    pub containers: Option<Containers>,
}

impl AssembleOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_containers(mut self, containers: Containers) -> Self {
        self.containers = Some(containers);
        self
    }
}

/// Trait for matching requests and assembling paths.
pub trait Matcher: fmt::Debug {
    /// Match the request path starting at `offset`.
    ///
    /// `None` for `offset` marks a terminal call that must account for the
    /// whole path. Returns `Ok(None)` when the request does not match.
    fn match_request(
        &self,
        request: &mut dyn Request,
        offset: Option<usize>,
        tree: &mut MatchTree,
    ) -> RouterResult<Option<NodeId>>;

    /// Build the path fragment for `params`.
    fn assemble(&self, params: &Params, options: &AssembleOptions) -> RouterResult<String>;

    /// Parameter keys consumed by the last `assemble` call.
    fn assembled_params(&self) -> Vec<String>;

    /// Composite view, for nodes that carry children and chains.
    fn as_stack(&self) -> Option<&RouteStack> {
        None
    }

    fn as_stack_mut(&mut self) -> Option<&mut RouteStack> {
        None
    }

    /// Composites are used as route nodes directly instead of being
    /// wrapped as the leaf of a fresh node.
    fn is_composite(&self) -> bool {
        self.as_stack().is_some()
    }

    fn as_any(&self) -> &dyn Any;
}

/// Path remainder at `offset`, or the whole path for a terminal call.
pub(crate) fn path_from(request: &dyn Request, offset: Option<usize>) -> Option<&str> {
    let path = request.uri()?.path();
    match offset {
        Some(offset) => path.get(offset..),
        None => Some(path),
    }
}

/// Matches a fixed path fragment.
#[derive(Debug, Clone)]
pub struct Literal {
    route: String,
    defaults: Params,
}

impl Literal {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            defaults: Params::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: Params) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn route(&self) -> &str {
        &self.route
    }
}

impl Matcher for Literal {
    fn match_request(
        &self,
        request: &mut dyn Request,
        offset: Option<usize>,
        tree: &mut MatchTree,
    ) -> RouterResult<Option<NodeId>> {
        let Some(path) = path_from(request, offset) else {
            return Ok(None);
        };
        let matched = match offset {
            Some(_) => path.starts_with(&self.route),
            None => path == self.route,
        };
        if !matched {
            return Ok(None);
        }
        Ok(Some(tree.create(self.defaults.clone(), self.route.len())))
    }

    fn assemble(&self, _params: &Params, _options: &AssembleOptions) -> RouterResult<String> {
        Ok(self.route.clone())
    }

    fn assembled_params(&self) -> Vec<String> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Matches the HTTP method. Consumes no path.
#[derive(Debug, Clone)]
pub struct Method {
    verbs: Vec<String>,
    defaults: Params,
}

impl Method {
    /// Create a method matcher from a comma-separated verb list.
    /// Verbs are normalized to uppercase for case-insensitive matching.
    pub fn new(verbs: &str) -> Self {
        Self {
            verbs: verbs
                .split(',')
                .map(|v| v.trim().to_uppercase())
                .filter(|v| !v.is_empty())
                .collect(),
            defaults: Params::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: Params) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn verbs(&self) -> &[String] {
        &self.verbs
    }
}

impl Matcher for Method {
    fn match_request(
        &self,
        request: &mut dyn Request,
        _offset: Option<usize>,
        tree: &mut MatchTree,
    ) -> RouterResult<Option<NodeId>> {
        let Some(method) = request.method() else {
            return Ok(None);
        };
        let method = method.to_uppercase();
        if !self.verbs.iter().any(|v| *v == method) {
            return Ok(None);
        }
        Ok(Some(tree.create(self.defaults.clone(), 0)))
    }

    fn assemble(&self, _params: &Params, _options: &AssembleOptions) -> RouterResult<String> {
        Ok(String::new())
    }

    fn assembled_params(&self) -> Vec<String> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Captures the rest of the path as delimited key/value pairs.
#[derive(Debug)]
pub struct Wildcard {
    key_value_delimiter: String,
    param_delimiter: String,
    defaults: Params,
    assembled: RefCell<Vec<String>>,
}

impl Default for Wildcard {
    fn default() -> Self {
        Self::new("/", "/")
    }
}

impl Wildcard {
    pub fn new(key_value_delimiter: impl Into<String>, param_delimiter: impl Into<String>) -> Self {
        Self {
            key_value_delimiter: key_value_delimiter.into(),
            param_delimiter: param_delimiter.into(),
            defaults: Params::new(),
            assembled: RefCell::new(Vec::new()),
        }
    }

    pub fn with_defaults(mut self, defaults: Params) -> Self {
        self.defaults = defaults;
        self
    }

    fn parse(&self, body: &str) -> Option<Params> {
        let mut matches = Params::new();
        if body.is_empty() {
            return Some(matches);
        }

        let parts: Vec<&str> = body.split(self.param_delimiter.as_str()).collect();
        if parts.len() < 2 || !parts[0].is_empty() || parts.last() == Some(&"") {
            return None;
        }

        if self.key_value_delimiter == self.param_delimiter {
            for pair in parts[1..].chunks(2) {
                if let [key, value] = pair {
                    matches.insert(key.to_string(), value.to_string());
                }
            }
        } else {
            for part in &parts[1..] {
                if let Some((key, value)) = part.split_once(self.key_value_delimiter.as_str()) {
                    matches.insert(key.to_string(), value.to_string());
                }
            }
        }
        Some(matches)
    }
}

impl Matcher for Wildcard {
    fn match_request(
        &self,
        request: &mut dyn Request,
        offset: Option<usize>,
        tree: &mut MatchTree,
    ) -> RouterResult<Option<NodeId>> {
        let Some(path) = path_from(request, offset) else {
            return Ok(None);
        };
        let body = if path == self.param_delimiter { "" } else { path };
        let Some(matches) = self.parse(body) else {
            return Ok(None);
        };

        let mut params = self.defaults.clone();
        params.extend(matches);
        Ok(Some(tree.create(params, path.len())))
    }

    fn assemble(&self, params: &Params, _options: &AssembleOptions) -> RouterResult<String> {
        let mut merged = self.defaults.clone();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

        *self.assembled.borrow_mut() = merged.keys().cloned().collect();
        if merged.is_empty() {
            return Ok(String::new());
        }

        let elements: Vec<String> = merged
            .iter()
            .map(|(k, v)| format!("{k}{}{v}", self.key_value_delimiter))
            .collect();
        Ok(format!(
            "{}{}",
            self.param_delimiter,
            elements.join(&self.param_delimiter)
        ))
    }

    fn assembled_params(&self) -> Vec<String> {
        self.assembled.borrow().clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
