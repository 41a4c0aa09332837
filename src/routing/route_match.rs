//! Hierarchical match results.
//!
//! # Responsibilities
//! - Hold captured params, consumed length and free-form options per node
//! - Link nodes into a parent/child tree addressed by [`NodeId`]
//! - Merge one result into another, grafting ancestors instead of duplicating
//!
//! # Data Flow
//! ```text
//! leaf / chain / child matchers
//!     → MatchTree::create (fresh root per partial match)
//!     → MatchTree::merge (fold into the accumulator)
//!     → MatchTree::add_child (containers attached under their parent)
//!     → RouteMatch (owned tree + root handed to the caller)
//! ```
//!
//! # Design Decisions
//! - Nodes live in an arena; parent links are ids, never ownership
//! - A node sits in at most one children map; adoption re-points the parent
//! - Merging consumes the source: its children move to the target
//! - Ancestor reconciliation is an explicit worklist with a visited set

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{RouterError, RouterResult};

/// Captured route parameters.
pub type Params = IndexMap<String, String>;

/// Free-form node metadata.
pub type OptionMap = IndexMap<String, Value>;

/// Separator between container names in a hierarchical key.
pub const KEY_SEPARATOR: char = '\\';

/// Anchor used when the tree root does not carry one.
pub const DEFAULT_ANCHOR: &str = "~";

/// Well-known option names.
pub mod option {
    pub const KEY: &str = "key";
    pub const NAME: &str = "name";
    pub const PREFIX: &str = "prefix";
    pub const PATH: &str = "path";
    pub const IS_CLIENT: &str = "is_client";
    pub const ANCHOR: &str = "anch";
    pub const MAIN_CONTAINER: &str = "main_container";
}

/// Handle of a node inside a [`MatchTree`].
///
/// Ids are only meaningful for the tree that issued them (or a clone of it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Entry of a children map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Matched(NodeId),
    /// A branch that was tried and did not match.
    Failed,
}

impl Child {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Child::Matched(id) => Some(*id),
            Child::Failed => None,
        }
    }
}

/// One change in a parameter diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamPatch {
    Set(String),
    Remove,
}

/// Parameter diff applied by [`MatchTree::merge`].
pub type ParamDiff = IndexMap<String, ParamPatch>;

/// Right-hand side of a merge.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeSource {
    Params(ParamDiff),
    Node(NodeId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Force the resulting length instead of summing.
    pub length: Option<usize>,
}

/// What to attach with [`MatchTree::add_child`].
#[derive(Debug, Clone, PartialEq)]
pub enum NewChild {
    Node(NodeId),
    Options { params: Params, options: OptionMap },
    Failed,
}

/// A single match result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchNode {
    params: Params,
    length: usize,
    matched_name: Option<String>,
    options: OptionMap,
    parent: Option<NodeId>,
    children: IndexMap<String, Child>,
    depth: usize,
}

impl MatchNode {
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    /// Number of path bytes this match accounts for.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn matched_name(&self) -> Option<&str> {
        self.matched_name.as_deref()
    }

    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(Value::as_str)
    }

    /// Boolean option; absent or non-boolean values read as `false`.
    pub fn option_bool(&self, name: &str) -> bool {
        self.options.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.options.insert(name.into(), value.into());
    }

    pub fn set_options(&mut self, options: OptionMap) {
        self.options = options;
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn children(&self) -> &IndexMap<String, Child> {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<Child> {
        self.children.get(name).copied()
    }
}

/// Arena holding every node produced while matching one request.
#[derive(Debug, Clone, Default)]
pub struct MatchTree {
    nodes: Vec<MatchNode>,
}

impl MatchTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a parentless node.
    pub fn create(&mut self, params: Params, length: usize) -> NodeId {
        self.nodes.push(MatchNode {
            params,
            length,
            ..MatchNode::default()
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every id issued by this tree, attached or not.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn get(&self, id: NodeId) -> Option<&MatchNode> {
        self.nodes.get(id.0)
    }

    /// Node behind `id`. Panics on an id issued by another tree.
    pub fn node(&self, id: NodeId) -> &MatchNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut MatchNode {
        &mut self.nodes[id.0]
    }

    /// Named matched child of `id`.
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.node(id).child(name).and_then(|c| c.node())
    }

    /// Prepend `name` to the matched name.
    pub fn set_matched_name(&mut self, id: NodeId, name: &str) {
        let node = self.node_mut(id);
        node.matched_name = Some(match node.matched_name.take() {
            Some(existing) => format!("{name}/{existing}"),
            None => name.to_string(),
        });
    }

    /// Merge `source` into `target`.
    ///
    /// A node source adds its params, length, options and children to
    /// `target`, then `target` takes over the source's place among its
    /// ancestors.
    pub fn merge(
        &mut self,
        target: NodeId,
        source: MergeSource,
        options: MergeOptions,
    ) -> RouterResult<()> {
        match source {
            MergeSource::Params(diff) => {
                let params = &mut self.node_mut(target).params;
                for (name, patch) in diff {
                    match patch {
                        ParamPatch::Set(value) => {
                            params.insert(name, value);
                        }
                        ParamPatch::Remove => {
                            params.shift_remove(&name);
                        }
                    }
                }
            }
            MergeSource::Node(source) => {
                if source == target
                    || self.is_ancestor(source, target)
                    || self.is_ancestor(target, source)
                {
                    return Err(RouterError::InvalidArgument(format!(
                        "cannot merge node {} into related node {}",
                        source.0, target.0
                    )));
                }
                self.merge_subtree(target, source, None);
                self.graft(target, source);
            }
        }

        if let Some(length) = options.length {
            self.node_mut(target).length = length;
        }
        Ok(())
    }

    /// Fold `source` and its descendants into `target`, leaving `skip` in place.
    fn merge_subtree(&mut self, target: NodeId, source: NodeId, skip: Option<NodeId>) {
        let mut work = vec![(target, source, skip)];
        let mut visited = HashSet::new();

        while let Some((t, s, skip)) = work.pop() {
            if !visited.insert(s) {
                continue;
            }

            let src = &mut self.nodes[s.0];
            let params = src.params.clone();
            let options = src.options.clone();
            let matched_name = src.matched_name.clone();
            let length = src.length;
            let mut moved = Vec::new();
            for (name, child) in std::mem::take(&mut src.children) {
                if skip.is_some() && child.node() == skip {
                    src.children.insert(name, child);
                } else {
                    moved.push((name, child));
                }
            }

            let dst = &mut self.nodes[t.0];
            dst.params.extend(params);
            dst.length += length;
            dst.matched_name = matched_name;
            dst.options.extend(options);

            for (name, child) in moved {
                match (self.nodes[t.0].children.get(&name).copied(), child) {
                    (Some(Child::Matched(existing)), Child::Matched(incoming)) => {
                        self.nodes[incoming.0].parent = None;
                        work.push((existing, incoming, None));
                    }
                    (Some(Child::Matched(_)), Child::Failed) => {}
                    (_, Child::Matched(incoming)) => {
                        if incoming == t || self.is_ancestor(incoming, t) {
                            continue;
                        }
                        self.nodes[t.0].children.insert(name, Child::Matched(incoming));
                        self.attach(incoming, t);
                    }
                    (_, Child::Failed) => {
                        self.nodes[t.0].children.insert(name, Child::Failed);
                    }
                }
            }
        }
    }

    /// Walk up from a merged pair, reconciling each ancestor pair once.
    fn graft(&mut self, target: NodeId, source: NodeId) {
        let (mut target, mut source) = (target, source);
        let mut visited = HashSet::new();

        while visited.insert(target) {
            let Some(source_parent) = self.nodes[source.0].parent else {
                break;
            };
            match self.nodes[target.0].parent {
                None => {
                    if source_parent == target || self.is_ancestor(target, source_parent) {
                        break;
                    }
                    let holder = &mut self.nodes[source_parent.0];
                    if let Some(slot) = holder
                        .children
                        .values_mut()
                        .find(|c| **c == Child::Matched(source))
                    {
                        *slot = Child::Matched(target);
                    }
                    self.nodes[source.0].parent = None;
                    self.attach(target, source_parent);
                    break;
                }
                Some(target_parent) if target_parent == source_parent => break,
                Some(target_parent) => {
                    if self.is_ancestor(target_parent, source_parent)
                        || self.is_ancestor(source_parent, target_parent)
                    {
                        break;
                    }
                    self.merge_subtree(target_parent, source_parent, Some(source));
                    target = target_parent;
                    source = source_parent;
                }
            }
        }
    }

    /// Attach a child under `parent` and derive its container options.
    ///
    /// Returns the attached node, or `None` when a failure marker was stored.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: &str,
        child: NewChild,
    ) -> RouterResult<Option<NodeId>> {
        let child = match child {
            NewChild::Failed => {
                self.release_slot(parent, name, None);
                self.node_mut(parent)
                    .children
                    .insert(name.to_string(), Child::Failed);
                return Ok(None);
            }
            NewChild::Options { params, options } => {
                let id = self.create(params, 0);
                self.node_mut(id).options = options;
                id
            }
            NewChild::Node(id) => id,
        };

        if child == parent || self.is_ancestor(child, parent) {
            return Err(RouterError::InvalidArgument(format!(
                "node {} cannot become a child of its descendant {}",
                child.0, parent.0
            )));
        }
        if let Some(old) = self.node(child).parent {
            self.node_mut(old)
                .children
                .retain(|_, c| *c != Child::Matched(child));
        }
        self.release_slot(parent, name, Some(child));
        self.node_mut(parent)
            .children
            .insert(name.to_string(), Child::Matched(child));
        self.attach(child, parent);

        if self.node(child).options.contains_key(option::KEY) {
            return Ok(Some(child));
        }

        let key = match self.node(parent).option_str(option::KEY) {
            Some(parent_key) => format!("{parent_key}{KEY_SEPARATOR}{name}"),
            None => name.to_string(),
        };
        let key = key.trim_matches(KEY_SEPARATOR).to_string();

        let root = self.node(self.root_of(parent));
        let prefix = if root.option_str(option::MAIN_CONTAINER) == Some(name) {
            String::new()
        } else {
            let anchor = root.option_str(option::ANCHOR).unwrap_or(DEFAULT_ANCHOR);
            format!("/{}{}", anchor.repeat(self.node(child).depth), name)
        };

        let node = self.node_mut(child);
        node.options.insert(option::NAME.to_string(), name.into());
        node.options.insert(option::KEY.to_string(), key.into());
        node.options.insert(option::PREFIX.to_string(), prefix.into());
        node.options
            .entry(option::IS_CLIENT.to_string())
            .or_insert(Value::Bool(false));
        Ok(Some(child))
    }

    /// Detach whatever node currently holds `parent`'s slot `name`, unless it is `keep`.
    fn release_slot(&mut self, parent: NodeId, name: &str, keep: Option<NodeId>) {
        let Some(Child::Matched(old)) = self.node(parent).child(name) else {
            return;
        };
        if Some(old) == keep {
            return;
        }
        warn!(child = %name, node = old.0, "child slot reused, previous node detached");
        self.nodes[old.0].parent = None;
        self.refresh_depths(old);
    }

    fn attach(&mut self, child: NodeId, parent: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.refresh_depths(child);
    }

    fn refresh_depths(&mut self, child: NodeId) {
        let mut stack = vec![child];
        while let Some(id) = stack.pop() {
            let depth = self.nodes[id.0]
                .parent
                .map_or(0, |p| self.nodes[p.0].depth + 1);
            self.nodes[id.0].depth = depth;
            stack.extend(self.nodes[id.0].children.values().filter_map(Child::node));
        }
    }

    /// Topmost ancestor of `id`.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        let mut steps = 0;
        while let Some(parent) = self.node(current).parent {
            current = parent;
            steps += 1;
            if steps > self.nodes.len() {
                break;
            }
        }
        current
    }

    /// Whether `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.node(id).parent;
        let mut steps = 0;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = self.node(parent).parent;
        }
        false
    }

    /// Matched descendants of `root` in pre-order, with their depth below it.
    pub fn preorder(&self, root: NodeId) -> Vec<(NodeId, usize)> {
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = self
            .node(root)
            .children
            .values()
            .rev()
            .filter_map(|c| c.node().map(|id| (id, 1)))
            .collect();
        while let Some((id, depth)) = stack.pop() {
            out.push((id, depth));
            stack.extend(
                self.node(id)
                    .children
                    .values()
                    .rev()
                    .filter_map(|c| c.node().map(|child| (child, depth + 1))),
            );
        }
        out
    }

    /// Descendant of `root` reached by a separator-joined container key.
    pub fn find_key(&self, root: NodeId, key: &str) -> Option<NodeId> {
        key.split(KEY_SEPARATOR)
            .filter(|s| !s.is_empty())
            .try_fold(root, |id, name| self.child(id, name))
            .filter(|id| *id != root)
    }

    /// JSON view of the subtree rooted at `id`.
    pub fn to_json(&self, id: NodeId) -> Value {
        let node = self.node(id);
        let mut children = Map::new();
        for (name, child) in &node.children {
            let value = match child {
                Child::Matched(child) => self.to_json(*child),
                Child::Failed => Value::Bool(false),
            };
            children.insert(name.clone(), value);
        }

        let mut out = Map::new();
        out.insert(
            "matched_name".to_string(),
            node.matched_name.clone().map_or(Value::Null, Value::String),
        );
        out.insert("length".to_string(), Value::from(node.length));
        out.insert(
            "params".to_string(),
            Value::Object(
                node.params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        );
        out.insert(
            "options".to_string(),
            Value::Object(node.options.clone().into_iter().collect()),
        );
        out.insert("children".to_string(), Value::Object(children));
        Value::Object(out)
    }
}

/// Successful match handed back to callers: the arena plus its root.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    tree: MatchTree,
    root: NodeId,
}

impl RouteMatch {
    pub fn new(tree: MatchTree, root: NodeId) -> Self {
        Self { tree, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn tree(&self) -> &MatchTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut MatchTree {
        &mut self.tree
    }

    pub fn node(&self) -> &MatchNode {
        self.tree.node(self.root)
    }

    pub fn params(&self) -> &Params {
        self.node().params()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.node().param(name)
    }

    pub fn matched_name(&self) -> Option<&str> {
        self.node().matched_name()
    }

    pub fn length(&self) -> usize {
        self.node().length()
    }

    /// Container node by hierarchical key, e.g. `k0\k01`.
    pub fn container(&self, key: &str) -> Option<&MatchNode> {
        self.container_id(key).map(|id| self.tree.node(id))
    }

    pub fn container_id(&self, key: &str) -> Option<NodeId> {
        self.tree.find_key(self.root, key)
    }

    pub fn to_json(&self) -> Value {
        self.tree.to_json(self.root)
    }

    pub fn into_parts(self) -> (MatchTree, NodeId) {
        (self.tree, self.root)
    }
}
