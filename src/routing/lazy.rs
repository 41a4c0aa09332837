//! Deferred route stack.
//!
//! # Responsibilities
//! - Stand in for a named stack that may not be registered yet
//! - Resolve that stack through the plugin manager on first use
//! - Until then, claim the rest of the path a bounded number of times
//!
//! # Design Decisions
//! - Resolution sticks once it succeeds; a missing name is retried on every call
//! - The offset of the last placeholder match is replayed by the next
//!   resolved match made without an offset, so it resumes in place
//! - Assembling before resolution is an error, not an empty path

use std::any::Any;
use std::cell::{Cell, OnceCell};
use std::rc::Rc;

use tracing::debug;

use crate::error::{RouterError, RouterResult};
use crate::http::Request;
use crate::routing::description::PluginOptions;
use crate::routing::matcher::{path_from, AssembleOptions, Matcher};
use crate::routing::plugins::PluginManager;
use crate::routing::route_match::{MatchTree, NodeId, Params};
use crate::routing::stack::RouteStack;

/// Param carrying the stack name on a placeholder match.
pub const LAZY_PARAM: &str = "__wrapper__";

/// Placeholder matches allowed before the stack resolves.
pub const DEFAULT_MAX_MATCH_COUNT: u32 = 2;

#[derive(Debug)]
pub struct LazyStack {
    plugins: Rc<PluginManager>,
    name: String,
    resolved: OnceCell<Rc<dyn Matcher>>,
    remaining: Cell<u32>,
    pending_offset: Cell<Option<Option<usize>>>,
}

impl LazyStack {
    pub fn new(name: impl Into<String>, plugins: Rc<PluginManager>) -> Self {
        Self {
            plugins,
            name: name.into(),
            resolved: OnceCell::new(),
            remaining: Cell::new(DEFAULT_MAX_MATCH_COUNT),
            pending_offset: Cell::new(None),
        }
    }

    pub fn with_max_match_count(self, count: u32) -> Self {
        self.remaining.set(count);
        self
    }

    /// Name the stack is looked up by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Placeholder matches still allowed.
    pub fn remaining_matches(&self) -> u32 {
        self.remaining.get()
    }

    /// The resolved stack, resolving it now if the name is registered.
    pub fn resolve(&self) -> RouterResult<Option<&Rc<dyn Matcher>>> {
        if self.resolved.get().is_none() {
            if !self.plugins.has(&self.name) {
                return Ok(None);
            }
            let matcher = self.plugins.get(&self.name, &PluginOptions::new())?;
            debug!(stack = %self.name, "deferred stack resolved");
            // Only this method fills the cell, and it was empty above.
            let _ = self.resolved.set(matcher);
        }
        Ok(self.resolved.get())
    }

    /// Composite view of the resolved stack; `None` before resolution.
    pub fn stack(&self) -> Option<&RouteStack> {
        self.resolved.get().and_then(|m| m.as_stack())
    }

    /// Mutable view of the resolved stack.
    ///
    /// `None` before resolution, and also while the stack is shared with
    /// other owners such as a prototype in use elsewhere.
    pub fn stack_mut(&mut self) -> Option<&mut RouteStack> {
        self.resolved
            .get_mut()
            .and_then(Rc::get_mut)
            .and_then(|m| m.as_stack_mut())
    }
}

impl Matcher for LazyStack {
    fn match_request(
        &self,
        request: &mut dyn Request,
        offset: Option<usize>,
        tree: &mut MatchTree,
    ) -> RouterResult<Option<NodeId>> {
        if let Some(stack) = self.resolve()? {
            let offset = match self.pending_offset.take() {
                Some(pending) if offset.is_none() => pending,
                _ => offset,
            };
            return stack.match_request(request, offset, tree);
        }

        let remaining = self.remaining.get();
        if remaining == 0 {
            debug!(stack = %self.name, "deferred stack unresolved, no placeholder matches left");
            return Ok(None);
        }
        let Some(rest) = path_from(request, offset) else {
            return Ok(None);
        };
        self.remaining.set(remaining - 1);
        self.pending_offset.set(Some(offset));

        let params: Params = [(LAZY_PARAM.to_string(), self.name.clone())]
            .into_iter()
            .collect();
        Ok(Some(tree.create(params, rest.len())))
    }

    fn assemble(&self, params: &Params, options: &AssembleOptions) -> RouterResult<String> {
        match self.resolve()? {
            Some(stack) => stack.assemble(params, options),
            None => Err(RouterError::InvalidArgument(format!(
                "cannot assemble without the deferred stack \"{}\"",
                self.name
            ))),
        }
    }

    fn assembled_params(&self) -> Vec<String> {
        self.resolved
            .get()
            .map(|stack| stack.assembled_params())
            .unwrap_or_default()
    }

    fn as_stack(&self) -> Option<&RouteStack> {
        self.stack()
    }

    fn as_stack_mut(&mut self) -> Option<&mut RouteStack> {
        self.stack_mut()
    }

    fn is_composite(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::routing::description::RouteDescription;
    use crate::routing::router::Router;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const CONFIG: &str = r#"
[router.routes.pre]
router = { type = "segment", route = "/:foo" }

[router.routes.pre.routes.lazy]
type = "lazy"
lazy_stack = "deferred"
"#;

    fn router() -> Router {
        Router::from_config(&parse_config(CONFIG).unwrap()).unwrap()
    }

    fn register_deferred(router: &Router) {
        router.plugins().set_prototype(
            "deferred",
            RouteDescription::typed(
                "stack",
                json!({
                    "routes": {
                        "first": { "type": "literal", "route": "/bar", "defaults": { "first": "one" } },
                        "second": { "type": "literal", "route": "/baz", "defaults": { "second": "two" } }
                    }
                }),
            ),
        );
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_placeholder_until_resolved() {
        let router = router();
        for path in ["/test/bar", "/test/baz"] {
            let found = router.match_path("GET", path).unwrap().unwrap();
            assert_eq!(found.length(), 9);
            assert_eq!(found.matched_name(), Some("pre/lazy"));
            assert_eq!(
                found.params(),
                &params(&[("foo", "test"), (LAZY_PARAM, "deferred")])
            );
        }
        assert!(router.match_path("GET", "/test/bar").unwrap().is_none());
    }

    #[test]
    fn test_match_through_resolved_stack() {
        let router = router();
        register_deferred(&router);

        let found = router.match_path("GET", "/test/bar").unwrap().unwrap();
        assert_eq!(found.length(), 9);
        assert_eq!(found.matched_name(), Some("pre/lazy/first"));
        assert_eq!(found.params(), &params(&[("foo", "test"), ("first", "one")]));

        let found = router.match_path("GET", "/test/baz").unwrap().unwrap();
        assert_eq!(found.matched_name(), Some("pre/lazy/second"));
        assert_eq!(found.params(), &params(&[("foo", "test"), ("second", "two")]));
        assert!(router.match_path("GET", "/test/qux").unwrap().is_none());
    }

    #[test]
    fn test_resolves_after_placeholder_matches() {
        let router = router();
        let found = router.match_path("GET", "/test/bar").unwrap().unwrap();
        assert_eq!(found.matched_name(), Some("pre/lazy"));

        register_deferred(&router);
        let found = router.match_path("GET", "/test/bar").unwrap().unwrap();
        assert_eq!(found.matched_name(), Some("pre/lazy/first"));
    }

    #[test]
    fn test_assemble() {
        let router = router();
        let options = AssembleOptions::named("pre/lazy/first");
        let err = router.assemble(&params(&[("foo", "bat")]), &options).unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument(_)));

        register_deferred(&router);
        assert_eq!(
            router.assemble(&params(&[("foo", "bat")]), &options).unwrap(),
            "/bat/bar"
        );
        assert_eq!(
            router
                .assemble(&params(&[("foo", "bat")]), &AssembleOptions::named("pre/lazy/second"))
                .unwrap(),
            "/bat/baz"
        );
    }

    #[test]
    fn test_max_match_count_and_stack_views() {
        let plugins = PluginManager::builtin();
        let mut lazy = LazyStack::new("deferred", plugins.clone()).with_max_match_count(1);
        assert!(lazy.is_composite());
        assert!(lazy.stack().is_none());

        let mut tree = MatchTree::new();
        let mut request = crate::http::HttpRequest::get("/x/y");
        let id = lazy
            .match_request(&mut request, Some(2), &mut tree)
            .unwrap()
            .unwrap();
        assert_eq!(tree.node(id).length(), 2);
        assert_eq!(lazy.remaining_matches(), 0);
        assert!(lazy.match_request(&mut request, Some(2), &mut tree).unwrap().is_none());

        plugins.set_prototype("deferred", RouteDescription::typed("stack", json!({})));
        assert!(lazy.resolve().unwrap().is_some());
        assert!(lazy.stack().is_some());
        // The prototype registry still points at it.
        assert!(lazy.stack_mut().is_none());
    }

    #[test]
    fn test_resolved_match_resumes_placeholder_offset() {
        let plugins = PluginManager::builtin();
        let lazy = LazyStack::new("deferred", plugins.clone());
        let mut tree = MatchTree::new();
        let mut request = crate::http::HttpRequest::get("/test/bar");
        lazy.match_request(&mut request, Some(5), &mut tree).unwrap().unwrap();

        plugins.set_prototype(
            "deferred",
            RouteDescription::typed("literal", json!({ "route": "/bar" })),
        );
        let id = lazy.match_request(&mut request, None, &mut tree).unwrap().unwrap();
        assert_eq!(tree.node(id).length(), 4);
    }

    #[test]
    fn test_stack_mut_on_unshared_stack() {
        let plugins = PluginManager::builtin();
        let mut lazy = LazyStack::new("stack", plugins);
        assert!(lazy.resolve().unwrap().is_some());
        lazy.stack_mut()
            .unwrap()
            .add_route("home", RouteDescription::typed("literal", json!({ "route": "/home" })), None)
            .unwrap();
        assert_eq!(lazy.stack().unwrap().route_names(), vec!["home"]);
    }
}
