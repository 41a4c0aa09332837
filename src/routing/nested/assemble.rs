//! Container assembly with a per-key skeleton cache.
//!
//! A tree walk over the retained match produces the path plus a skeleton:
//! the text between requested containers. Later requests for the same set
//! of keys splice new values into the skeleton without walking again.

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{debug, trace, warn};

use crate::error::RouterResult;
use crate::routing::matcher::{AssembleOptions, ContainerValue, Containers, Matcher};
use crate::routing::route_match::{option, MatchNode, Params};

use super::NestedStack;

/// Requested containers by resolved key. `None` strips the container.
type Requested = IndexMap<String, Option<String>>;

#[derive(Debug, Clone)]
pub(super) enum CacheEntry {
    /// Some requested key had no matching container.
    Failed,
    Skeleton(Vec<CacheSlot>),
}

#[derive(Debug, Clone, Default)]
pub(super) struct CacheSlot {
    key: Option<String>,
    left: String,
    prefix: String,
    right: String,
}

impl NestedStack {
    pub(super) fn assemble_containers(
        &self,
        params: &Params,
        containers: Option<&Containers>,
    ) -> RouterResult<String> {
        if params.is_empty() && containers.is_none() {
            return Ok(String::new());
        }

        let requested = self.resolve_values(params, containers)?;
        let key = cache_key(&requested);

        if let Some(entry) = self.cache.borrow().get(&key) {
            self.bump(|stats| stats.hits += 1);
            trace!(key = %key, "container skeleton cache hit");
            return Ok(match entry {
                CacheEntry::Failed => {
                    warn!(key = %key, "unknown container requested");
                    diagnostic(&key, &requested)
                }
                CacheEntry::Skeleton(slots) => fill(slots, &requested),
            });
        }

        self.bump(|stats| stats.misses += 1);
        Ok(self.walk(&key, &requested))
    }

    /// Turn container values into paths and placeholders into keys.
    fn resolve_values(&self, params: &Params, containers: Option<&Containers>) -> RouterResult<Requested> {
        let mut containers = containers.cloned().unwrap_or_default();
        if self.use_all_params && !params.is_empty() {
            match containers.get_mut(&self.main_container) {
                Some(ContainerValue::Route { params: own, .. }) => {
                    *own = params
                        .iter()
                        .chain(own.iter())
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                }
                Some(_) => {}
                None => {
                    containers.insert(
                        self.main_container.clone(),
                        ContainerValue::Route {
                            route: None,
                            params: params.clone(),
                        },
                    );
                }
            }
        }

        let mut requested = Requested::new();
        for (key, value) in containers {
            let path = match value {
                ContainerValue::Path(path) => Some(path),
                ContainerValue::Strip => None,
                ContainerValue::Route { route, params } => {
                    let options = AssembleOptions {
                        name: route,
                        ..AssembleOptions::default()
                    };
                    Some(self.stack.assemble(&params, &options)?)
                }
            };
            requested.insert(
                self.resolve_container(&key),
                path.filter(|p| !p.is_empty()),
            );
        }
        Ok(requested)
    }

    fn walk(&self, key: &str, requested: &Requested) -> String {
        let retained = self.retained.borrow();
        let Some(found) = retained.as_ref() else {
            debug!(key = %key, "no retained match to assemble against");
            return diagnostic(key, requested);
        };
        self.bump(|stats| stats.tree_walks += 1);

        let tree = found.tree();
        let root = found.root();
        let mut path = String::new();
        let mut pending = String::new();
        let mut slots = Vec::new();
        let mut processed = 0;
        let mut lock: Option<usize> = None;

        for (id, depth) in tree.preorder(root) {
            let node = tree.node(id);
            if lock.is_some_and(|level| level >= depth) {
                lock = None;
            }
            let node_key = node.option_str(option::KEY).unwrap_or_default();
            let value = requested.get(node_key);
            if value.is_some() {
                processed += 1;
            }
            let is_client = match lock {
                Some(level) if depth > level => false,
                _ => node.option_bool(option::IS_CLIENT),
            };

            match (is_client, value) {
                (true, None) => {
                    let own = build(node, None);
                    pending.push_str(&own);
                    path.push_str(&own);
                }
                (true, Some(value)) => {
                    if let Some(value) = value {
                        path.push_str(&build(node, Some(value.as_str())));
                    }
                    slots.push(CacheSlot {
                        key: Some(node_key.to_string()),
                        left: format!("{}/", pending.trim_end_matches('/')),
                        prefix: node.option_str(option::PREFIX).unwrap_or_default().to_string(),
                        right: String::new(),
                    });
                    pending.clear();
                    lock = Some(lock.map_or(depth, |level| level.max(depth)));
                }
                (false, Some(value)) => {
                    let mut ancestors = String::new();
                    if value.is_some() {
                        let mut parent = node.parent().filter(|p| *p != root);
                        while let Some(parent_id) = parent {
                            let parent_node = tree.node(parent_id);
                            if parent_node.option_bool(option::IS_CLIENT) {
                                break;
                            }
                            let replaced = parent_node
                                .option_str(option::KEY)
                                .and_then(|k| requested.get(k))
                                .is_some_and(Option::is_some);
                            if !replaced {
                                ancestors.insert_str(0, &build(parent_node, None));
                            }
                            parent = parent_node.parent().filter(|p| *p != root);
                        }
                    }

                    let between = ancestors.trim_matches('/');
                    let left = if between.is_empty() {
                        format!("{}/", pending.trim_end_matches('/'))
                    } else {
                        format!("{}/{between}/", pending.trim_end_matches('/'))
                    };
                    slots.push(CacheSlot {
                        key: Some(node_key.to_string()),
                        left,
                        prefix: node.option_str(option::PREFIX).unwrap_or_default().to_string(),
                        right: String::new(),
                    });
                    pending.clear();
                    path.push_str(&ancestors);
                    if let Some(value) = value {
                        path.push_str(&build(node, Some(value.as_str())));
                    }
                    lock = Some(lock.map_or(depth, |level| level.max(depth)));
                }
                (false, None) => {}
            }
        }

        if processed != requested.len() {
            warn!(key = %key, "unknown container requested");
            self.cache
                .borrow_mut()
                .insert(key.to_string(), CacheEntry::Failed);
            return diagnostic(key, requested);
        }

        match slots.last_mut() {
            Some(last) => last.right = pending,
            None => slots.push(CacheSlot {
                right: pending,
                ..CacheSlot::default()
            }),
        }
        self.cache
            .borrow_mut()
            .insert(key.to_string(), CacheEntry::Skeleton(slots));
        path
    }
}

/// Node prefix followed by the given path, or by the path it matched.
fn build(node: &MatchNode, path: Option<&str>) -> String {
    let prefix = node.option_str(option::PREFIX).unwrap_or_default();
    let path = path
        .or_else(|| node.option_str(option::PATH))
        .unwrap_or_default()
        .trim_matches('/');
    if path.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}/{path}")
    }
}

fn cache_key(requested: &Requested) -> String {
    let mut keys: Vec<&str> = requested.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys.iter().map(|key| format!("{key};")).collect()
}

fn fill(slots: &[CacheSlot], requested: &Requested) -> String {
    let mut out = String::new();
    for slot in slots {
        let value = slot
            .key
            .as_ref()
            .and_then(|key| requested.get(key))
            .and_then(Option::as_deref);
        let mut pieces = vec![slot.left.as_str()];
        if let Some(value) = value {
            pieces.push(&slot.prefix);
            pieces.push(value);
        }
        pieces.push(&slot.right);
        for piece in pieces {
            let piece = piece.trim_matches('/');
            if !piece.is_empty() {
                out.push('/');
                out.push_str(piece);
            }
        }
    }
    out
}

/// Inline marker returned in place of a path that cannot be built.
fn diagnostic(key: &str, requested: &Requested) -> String {
    let containers: Map<String, Value> = requested
        .iter()
        .map(|(k, v)| (k.clone(), v.clone().map_or(Value::Null, Value::String)))
        .collect();
    format!(
        "/{{=errPathInfo:{}=}}",
        json!({ "key": key, "containers": containers })
    )
}
