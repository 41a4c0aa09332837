//! Path partitioning into independently addressable containers.
//!
//! # Responsibilities
//! - Split a path into anchored containers and match each one through the
//!   wrapped [`RouteStack`]
//! - Arrange containers into a tree by anchor depth
//! - Rebuild paths with some containers replaced or stripped, reusing a
//!   skeleton cached per set of requested keys
//!
//! # Data Flow
//! ```text
//! match:    path → partition (tokens) → RouteStack per fragment
//!           → add_child under the open ancestor → retained RouteMatch
//! assemble: containers → resolve keys → cache hit (skeleton) | tree walk
//! ```
//!
//! # Design Decisions
//! - A failed container is stored as a failure marker; siblings still match
//! - Deeper containers under a failed one are skipped until a shallower anchor
//! - The first match is retained and drives every later `assemble`
//! - Unknown container keys produce an inline diagnostic path, never an error

mod assemble;
mod partition;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::RouterResult;
use crate::http::Request;
use crate::routing::description::NestedDescription;
use crate::routing::matcher::{AssembleOptions, Matcher};
use crate::routing::plugins::PluginManager;
use crate::routing::route_match::{
    option, Child, MatchTree, MergeOptions, MergeSource, NewChild, NodeId, ParamDiff, Params,
    RouteMatch,
};
use crate::routing::stack::RouteStack;

use self::assemble::CacheEntry;
use self::partition::{partition, ContainerToken};

/// Assembly cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub tree_walks: u64,
}

/// Route node whose path is a sequence of anchored containers.
#[derive(Debug)]
pub struct NestedStack {
    stack: RouteStack,
    anchor: char,
    main_container: String,
    use_all_params: bool,
    retained: RefCell<Option<RouteMatch>>,
    current: Cell<Option<NodeId>>,
    cache: RefCell<HashMap<String, CacheEntry>>,
    stats: Cell<CacheStats>,
    assembled: RefCell<Vec<String>>,
}

impl NestedStack {
    pub fn new(stack: RouteStack, main_container: impl Into<String>) -> Self {
        Self {
            stack,
            anchor: '~',
            main_container: main_container.into(),
            use_all_params: false,
            retained: RefCell::new(None),
            current: Cell::new(None),
            cache: RefCell::new(HashMap::new()),
            stats: Cell::new(CacheStats::default()),
            assembled: RefCell::new(Vec::new()),
        }
    }

    pub fn from_description(description: NestedDescription, plugins: &Rc<PluginManager>) -> RouterResult<Self> {
        let stack = RouteStack::from_description(description.node, plugins)?;
        Ok(Self::new(stack, description.main_container)
            .with_anchor(description.anchor)
            .with_use_all_params(description.use_all_params))
    }

    pub fn with_anchor(mut self, anchor: char) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_use_all_params(mut self, use_all_params: bool) -> Self {
        self.use_all_params = use_all_params;
        self
    }

    pub fn anchor(&self) -> char {
        self.anchor
    }

    pub fn main_container(&self) -> &str {
        &self.main_container
    }

    pub fn use_all_params(&self) -> bool {
        self.use_all_params
    }

    pub fn stack(&self) -> &RouteStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut RouteStack {
        &mut self.stack
    }

    /// Forget the retained match, the current pointer and the cache.
    pub fn reset(&self) {
        self.retained.borrow_mut().take();
        self.current.set(None);
        self.cache.borrow_mut().clear();
    }

    /// Snapshot of the match that drives assembly.
    pub fn retained_match(&self) -> Option<RouteMatch> {
        self.retained.borrow().clone()
    }

    /// Edit the retained match in place. Cached skeletons are dropped.
    pub fn with_retained_mut<R>(&self, f: impl FnOnce(&mut RouteMatch) -> R) -> Option<R> {
        let result = self.retained.borrow_mut().as_mut().map(f);
        if result.is_some() {
            self.cache.borrow_mut().clear();
        }
        result
    }

    /// Container that `{current}` and its relatives resolve against.
    pub fn set_current(&self, node: Option<NodeId>) {
        self.current.set(node);
    }

    pub fn current(&self) -> Option<NodeId> {
        self.current.get()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Expand `{default}`, `{current}`, `{parent}`, `{prev_sibling}` and
    /// `{next_sibling}` into container keys.
    ///
    /// Tokens that cannot be resolved become `{err-<token>}`.
    pub fn resolve_container(&self, expr: &str) -> String {
        let mut out = String::new();
        let mut rest = expr;
        while let Some(open) = rest.find('{') {
            let Some(len) = rest[open + 1..].find('}') else {
                break;
            };
            let token = &rest[open + 1..open + 1 + len];
            if token.chars().any(char::is_whitespace) {
                out.push_str(&rest[..open + 1]);
                rest = &rest[open + 1..];
                continue;
            }
            out.push_str(&rest[..open]);
            out.push_str(&self.resolve_token(token));
            rest = &rest[open + len + 2..];
        }
        out.push_str(rest);
        out
    }

    fn resolve_token(&self, token: &str) -> String {
        let retained = self.retained.borrow();
        let resolved = retained.as_ref().and_then(|found| {
            let tree = found.tree();
            let root = found.root();
            let node = match token {
                "default" => tree.child(root, &self.main_container),
                _ => {
                    let current = self.current.get().filter(|id| tree.get(*id).is_some())?;
                    match token {
                        "current" => Some(current),
                        "parent" => tree.node(current).parent().filter(|p| *p != root),
                        "prev_sibling" => sibling(tree, current, false),
                        "next_sibling" => sibling(tree, current, true),
                        _ => None,
                    }
                }
            }?;
            tree.node(node).option_str(option::KEY).map(str::to_string)
        });
        resolved.unwrap_or_else(|| format!("{{err-{token}}}"))
    }

    fn match_tokens(
        &self,
        request: &mut dyn Request,
        tokens: &[ContainerToken],
        root: NodeId,
        tree: &mut MatchTree,
    ) -> RouterResult<()> {
        let mut open: Vec<(usize, NodeId)> = Vec::new();
        let mut lock_depth: Option<usize> = None;

        for token in tokens {
            if let Some(lock) = lock_depth {
                if token.depth > lock {
                    trace!(container = %token.name, depth = token.depth, "skipped under failed container");
                    continue;
                }
                lock_depth = None;
            }
            while open.last().is_some_and(|(depth, _)| *depth >= token.depth) {
                open.pop();
            }
            let parent = open.last().map_or(root, |(_, id)| *id);

            if let Some(uri) = request.uri_mut() {
                uri.set_path(token.fragment.clone());
            }
            match self.stack.match_request(request, None, tree)? {
                Some(id) => {
                    tree.merge(
                        id,
                        MergeSource::Params(ParamDiff::new()),
                        MergeOptions {
                            length: Some(token.consumed),
                        },
                    )?;
                    let node = tree.node_mut(id);
                    node.set_option(option::PATH, token.fragment.clone());
                    node.set_option(option::IS_CLIENT, token.is_client);
                    tree.add_child(parent, &token.name, NewChild::Node(id))?;
                    open.push((token.depth, id));
                }
                None => {
                    debug!(container = %token.name, fragment = %token.fragment, "container did not match");
                    tree.add_child(parent, &token.name, NewChild::Failed)?;
                    lock_depth = Some(token.depth);
                }
            }
        }
        Ok(())
    }
}

fn sibling(tree: &MatchTree, id: NodeId, forward: bool) -> Option<NodeId> {
    let parent = tree.node(id).parent()?;
    let siblings: Vec<NodeId> = tree
        .node(parent)
        .children()
        .values()
        .filter_map(Child::node)
        .collect();
    let index = siblings.iter().position(|s| *s == id)?;
    if forward {
        siblings.get(index + 1).copied()
    } else {
        index.checked_sub(1).and_then(|i| siblings.get(i).copied())
    }
}

impl Matcher for NestedStack {
    fn match_request(
        &self,
        request: &mut dyn Request,
        offset: Option<usize>,
        tree: &mut MatchTree,
    ) -> RouterResult<Option<NodeId>> {
        let Some(original) = request.uri().map(|uri| uri.path().to_string()) else {
            return Ok(None);
        };
        if request.uri_mut().is_none() {
            return Ok(None);
        }
        let full = original.get(offset.unwrap_or(0)..).unwrap_or("");
        let tokens = partition(full, self.anchor, &self.main_container);

        let root = tree.create(Params::new(), full.len());
        let node = tree.node_mut(root);
        node.set_option(option::ANCHOR, self.anchor.to_string());
        node.set_option(option::MAIN_CONTAINER, self.main_container.clone());

        let outcome = self.match_tokens(request, &tokens, root, tree);
        if let Some(uri) = request.uri_mut() {
            uri.set_path(original.clone());
        }
        outcome?;

        let mut retained = self.retained.borrow_mut();
        if retained.is_none() {
            *retained = Some(RouteMatch::new(tree.clone(), root));
        }
        Ok(Some(root))
    }

    fn assemble(&self, params: &Params, options: &AssembleOptions) -> RouterResult<String> {
        let path = self.assemble_containers(params, options.containers.as_ref())?;
        *self.assembled.borrow_mut() = if path.is_empty() {
            Vec::new()
        } else {
            vec!["containers".to_string()]
        };
        Ok(path)
    }

    fn assembled_params(&self) -> Vec<String> {
        self.assembled.borrow().clone()
    }

    fn as_stack(&self) -> Option<&RouteStack> {
        Some(&self.stack)
    }

    fn as_stack_mut(&mut self) -> Option<&mut RouteStack> {
        Some(&mut self.stack)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use crate::routing::description::{NodeDescription, RouteDescription};
    use crate::routing::matcher::{Literal, Wildcard};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn wildcard_stack() -> NestedStack {
        let node = NodeDescription::new()
            .leaf(RouteDescription::instance(
                Wildcard::default().with_defaults(params(&[("bar", "baz")])),
            ))
            .defaults(params(&[("controller", "ccc"), ("action", "aaa")]));
        NestedStack::from_description(NestedDescription::new("k0", node), &PluginManager::builtin())
            .unwrap()
    }

    fn literal_stack() -> NestedStack {
        let node = NodeDescription::new().leaf(RouteDescription::instance(
            Literal::new("/foo").with_defaults(params(&[("p", "v")])),
        ));
        NestedStack::from_description(NestedDescription::new("k0", node), &PluginManager::builtin())
            .unwrap()
    }

    fn run(nested: &NestedStack, path: &str) -> RouteMatch {
        let mut tree = MatchTree::new();
        let mut request = HttpRequest::get(path);
        let root = nested
            .match_request(&mut request, None, &mut tree)
            .unwrap()
            .unwrap();
        assert_eq!(request.path(), path);
        RouteMatch::new(tree, root)
    }

    #[test]
    fn test_match_empty_path() {
        let nested = wildcard_stack();
        let found = run(&nested, "");
        assert_eq!(found.node().option_str(option::ANCHOR), Some("~"));
        assert_eq!(found.node().option_str(option::MAIN_CONTAINER), Some("k0"));
        assert!(found.params().is_empty());

        let k0 = found.container("k0").unwrap();
        assert_eq!(k0.option_str(option::KEY), Some("k0"));
        assert_eq!(k0.option_str(option::PATH), Some("/"));
        assert_eq!(k0.option_str(option::PREFIX), Some(""));
        assert!(!k0.option_bool(option::IS_CLIENT));
        assert_eq!(
            k0.params(),
            &params(&[("bar", "baz"), ("controller", "ccc"), ("action", "aaa")])
        );
        assert!(k0.children().is_empty());
    }

    #[test]
    fn test_match_with_offset() {
        let nested = wildcard_stack();
        let mut tree = MatchTree::new();
        let mut request = HttpRequest::get("xxx/~k0/a0/b0");
        let root = nested
            .match_request(&mut request, Some(4), &mut tree)
            .unwrap()
            .unwrap();
        let found = RouteMatch::new(tree, root);
        assert_eq!(found.length(), 9);
        let k0 = found.container("k0").unwrap();
        assert_eq!(k0.option_str(option::PATH), Some("/a0/b0"));
        assert!(k0.option_bool(option::IS_CLIENT));
        assert_eq!(k0.param("a0"), Some("b0"));
        assert_eq!(request.path(), "xxx/~k0/a0/b0");
    }

    #[test]
    fn test_match_nested_containers() {
        let nested = wildcard_stack();
        let path = "~k0/a0/b0/~~k00/a00/b00/~~~k000/a000/b000/~k1/a1/b1";
        let found = run(&nested, path);
        assert_eq!(found.length(), path.len());

        let k000 = found.container("k0\\k00\\k000").unwrap();
        assert_eq!(k000.option_str(option::PREFIX), Some("/~~~k000"));
        assert_eq!(k000.option_str(option::PATH), Some("/a000/b000"));
        assert_eq!(k000.param("a000"), Some("b000"));
        assert_eq!(k000.param("controller"), Some("ccc"));
        assert_eq!(k000.length(), 18);

        let k1 = found.container("k1").unwrap();
        assert_eq!(k1.option_str(option::PREFIX), Some("/~k1"));
        assert!(k1.option_bool(option::IS_CLIENT));
        let names: Vec<_> = found.node().children().keys().cloned().collect();
        assert_eq!(names, vec!["k0", "k1"]);
    }

    #[test]
    fn test_failed_containers_lock_their_branch() {
        let nested = literal_stack();

        let found = run(&nested, "~k0/xxx/~~k01/foo/~~~k011/foo/~k1/foo");
        assert_eq!(found.node().child("k0"), Some(Child::Failed));
        let k1 = found.container("k1").unwrap();
        assert_eq!(k1.length(), 7);
        assert_eq!(k1.param("p"), Some("v"));
        assert_eq!(found.node().children().len(), 2);

        let found = run(&nested, "~k0/foo/~~k01/xxx/");
        let k0 = found.container("k0").unwrap();
        assert_eq!(k0.length(), 8);
        assert_eq!(k0.child("k01"), Some(Child::Failed));

        let found = run(&nested, "~k0/foo/~k1/xxx/~~k11/zzz/~k2/foo/");
        assert_eq!(found.node().child("k1"), Some(Child::Failed));
        assert_eq!(found.container("k2").unwrap().length(), 8);
        assert!(found.container("k0").unwrap().children().is_empty());

        let found = run(&nested, "~k0/foo/~k1/foo/~~k11/foo/~k2/xxx/~k3/foo");
        assert_eq!(found.container("k1\\k11").unwrap().length(), 10);
        assert_eq!(found.node().child("k2"), Some(Child::Failed));
        assert_eq!(found.container("k3").unwrap().length(), 7);
    }

    #[test]
    fn test_repeated_sibling_name_keeps_links_consistent() {
        let nested = wildcard_stack();
        let path = "~k0/a/b/~k1/x/y/~k1/p/q";
        let found = run(&nested, path);
        assert_eq!(found.length(), path.len());

        let names: Vec<_> = found.node().children().keys().cloned().collect();
        assert_eq!(names, vec!["k0", "k1"]);
        assert_eq!(found.container("k1").unwrap().param("p"), Some("q"));

        let tree = found.tree();
        for id in tree.ids() {
            if let Some(parent) = tree.node(id).parent() {
                let held = tree
                    .node(parent)
                    .children()
                    .values()
                    .any(|c| *c == Child::Matched(id));
                assert!(held, "node {} points at a parent that does not hold it", id.index());
            }
        }
    }

    #[test]
    fn test_failure_does_not_reparent_siblings() {
        let nested = literal_stack();
        let found = run(&nested, "~k0/foo/~~k01/xxx/~~k02/foo");
        let k0 = found.container("k0").unwrap();
        assert_eq!(k0.child("k01"), Some(Child::Failed));
        assert!(found.container("k0\\k02").is_some());
    }

    #[test]
    fn test_first_match_is_retained() {
        let nested = wildcard_stack();
        run(&nested, "~k0/a0/b0");
        run(&nested, "~k0/other/x");
        let retained = nested.retained_match().unwrap();
        assert_eq!(retained.container("k0").unwrap().param("a0"), Some("b0"));

        nested.reset();
        assert!(nested.retained_match().is_none());
        run(&nested, "~k0/other/x");
        let retained = nested.retained_match().unwrap();
        assert_eq!(retained.container("k0").unwrap().param("other"), Some("x"));
    }

    #[test]
    fn test_resolve_container() {
        let nested = wildcard_stack();
        assert_eq!(nested.resolve_container("{default}"), "{err-default}");

        let found = run(&nested, "~k0/a0/~~k01/a01/~~k02/a02/~~k03/a03/~k1/a1");
        assert_eq!(nested.resolve_container("{default}"), "k0");
        assert_eq!(nested.resolve_container("{current}"), "{err-current}");

        nested.set_current(found.container_id("k0\\k02"));
        assert_eq!(nested.resolve_container("{current}"), "k0\\k02");
        assert_eq!(nested.resolve_container("{parent}"), "k0");
        assert_eq!(nested.resolve_container("{prev_sibling}"), "k0\\k01");
        assert_eq!(nested.resolve_container("{next_sibling}"), "k0\\k03");
        assert_eq!(nested.resolve_container("{current}\\x"), "k0\\k02\\x");
        assert_eq!(nested.resolve_container("{nope}"), "{err-nope}");
        assert_eq!(nested.resolve_container("plain"), "plain");

        nested.set_current(found.container_id("k0"));
        assert_eq!(nested.resolve_container("{parent}"), "{err-parent}");
        assert_eq!(nested.resolve_container("{prev_sibling}"), "{err-prev_sibling}");
        assert_eq!(nested.resolve_container("{next_sibling}"), "k1");
    }

    #[test]
    fn test_built_from_plugin_options() {
        let plugins = PluginManager::builtin();
        let options = json!({
            "anchor": "!",
            "main_container": "main",
            "use_all_params": true,
            "router": { "type": "wildcard" },
        });
        let serde_json::Value::Object(options) = options else {
            unreachable!();
        };
        let matcher = plugins.get("NestedStack", &options).unwrap();
        let nested = matcher.as_any().downcast_ref::<NestedStack>().unwrap();
        assert_eq!(nested.anchor(), '!');
        assert_eq!(nested.main_container(), "main");
        assert!(nested.use_all_params());
        assert!(nested.stack().router().is_some());
    }
}
