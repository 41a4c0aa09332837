//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every referenced route type or prototype exists
//! - Check route and chain names, nested anchors and container names
//! - Check that deferred stacks name what they stand in for
//! - Check the configured log level
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::{NestedConfig, NodeConfig, RouteConfig, RouterConfig};
use crate::routing::plugins::PluginManager;

/// One semantic problem, located by a dotted config path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

struct Validator {
    plugins: std::rc::Rc<PluginManager>,
    prototypes: HashSet<String>,
    errors: Vec<ValidationError>,
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut prototypes = HashSet::new();
    collect_prototypes(&config.prototypes, &mut prototypes);
    collect_route_prototypes(&config.router, &mut prototypes);

    let mut validator = Validator {
        plugins: PluginManager::builtin(),
        prototypes,
        errors: Vec::new(),
    };

    validator.route("router", &config.router);
    for (name, prototype) in &config.prototypes {
        validator.route(&format!("prototypes.{name}"), prototype);
    }

    if EnvFilter::try_new(&config.observability.log_level).is_err() {
        validator.errors.push(ValidationError::new(
            "observability.log_level",
            format!("invalid log level \"{}\"", config.observability.log_level),
        ));
    }

    if validator.errors.is_empty() {
        Ok(())
    } else {
        Err(validator.errors)
    }
}

fn collect_prototypes(map: &IndexMap<String, RouteConfig>, out: &mut HashSet<String>) {
    for (name, config) in map {
        out.insert(name.clone());
        collect_route_prototypes(config, out);
    }
}

fn collect_route_prototypes(config: &RouteConfig, out: &mut HashSet<String>) {
    let RouteConfig::Node(node) = config else {
        return;
    };
    collect_prototypes(&node.prototypes, out);
    let nested = node.router.iter().map(|leaf| leaf.as_ref());
    for child in nested.chain(node.routes.values()).chain(node.chains.values()) {
        collect_route_prototypes(child, out);
    }
}

fn is_container_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl Validator {
    fn known(&self, name: &str) -> bool {
        self.prototypes.contains(name) || self.plugins.has(name)
    }

    fn route(&mut self, path: &str, config: &RouteConfig) {
        match config {
            RouteConfig::Name(name) => {
                if !self.known(name) {
                    self.errors.push(ValidationError::new(
                        path,
                        format!("unknown route type or prototype \"{name}\""),
                    ));
                }
            }
            RouteConfig::Typed(typed) => {
                if !self.known(&typed.kind) {
                    self.errors.push(ValidationError::new(
                        path,
                        format!("unknown route type \"{}\"", typed.kind),
                    ));
                    return;
                }
                if self.prototypes.contains(&typed.kind) {
                    return;
                }
                let options = serde_json::Value::Object(typed.options.clone());
                match self.plugins.canonical(&typed.kind).as_str() {
                    "stack" => match serde_json::from_value::<NodeConfig>(options) {
                        Ok(node) => self.node(path, &node),
                        Err(e) => self.errors.push(ValidationError::new(path, e.to_string())),
                    },
                    "nested" => match serde_json::from_value::<NestedConfig>(options) {
                        Ok(nested) => self.nested(path, &nested),
                        Err(e) => self.errors.push(ValidationError::new(path, e.to_string())),
                    },
                    "lazy" => {
                        let target = typed.options.get("lazy_stack").and_then(|v| v.as_str());
                        if target.map_or(true, str::is_empty) {
                            self.errors.push(ValidationError::new(
                                &format!("{path}.lazy_stack"),
                                "deferred stack needs a name",
                            ));
                        }
                    }
                    _ => {}
                }
            }
            RouteConfig::Node(node) => self.node(path, node),
        }
    }

    fn nested(&mut self, path: &str, nested: &NestedConfig) {
        if nested.anchor.is_alphanumeric() || nested.anchor == '/' {
            self.errors.push(ValidationError::new(
                &format!("{path}.anchor"),
                format!("anchor \"{}\" cannot be told apart from path text", nested.anchor),
            ));
        }
        if !is_container_name(&nested.main_container) {
            self.errors.push(ValidationError::new(
                &format!("{path}.main_container"),
                format!("invalid container name \"{}\"", nested.main_container),
            ));
        }
        self.node(path, &nested.node());
    }

    fn node(&mut self, path: &str, node: &NodeConfig) {
        if let Some(leaf) = &node.router {
            if matches!(leaf.as_ref(), RouteConfig::Node(_)) {
                self.errors.push(ValidationError::new(
                    &format!("{path}.router"),
                    "leaf route needs a \"type\"",
                ));
            } else {
                self.route(&format!("{path}.router"), leaf);
            }
        }
        for (name, route) in &node.routes {
            let route_path = format!("{path}.routes.{name}");
            self.name(&route_path, name);
            self.route(&route_path, route);
        }
        for (name, chain) in &node.chains {
            let chain_path = format!("{path}.chains.{name}");
            self.name(&chain_path, name);
            if matches!(chain, RouteConfig::Node(_)) {
                self.errors
                    .push(ValidationError::new(&chain_path, "chain entry needs a \"type\""));
            } else {
                self.route(&chain_path, chain);
            }
        }
        for (name, prototype) in &node.prototypes {
            self.route(&format!("{path}.prototypes.{name}"), prototype);
        }
    }

    fn name(&mut self, path: &str, name: &str) {
        if name.is_empty() || name.contains('/') {
            self.errors.push(ValidationError::new(
                path,
                format!("route name \"{name}\" must be non-empty and contain no '/'"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> RouterConfig {
        toml::from_str(text).unwrap()
    }

    fn paths(config: &RouterConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.path)
            .collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_valid_config() {
        let config = parse(
            r#"
[prototypes.home]
type = "literal"
route = "/"

[router.routes.index]
router = "home"

[router.routes.blog]
type = "Segment"
route = "/blog/:slug"

[router.chains.verb]
type = "method"
verb = "get"
"#,
        );
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_unknown_types() {
        let config = parse(
            r#"
[router.routes.a]
type = "teleport"

[router.routes.b]
router = "nowhere"
"#,
        );
        assert_eq!(paths(&config), vec!["router.routes.a", "router.routes.b.router"]);
    }

    #[test]
    fn test_route_names() {
        let config = parse(
            r#"
[router.routes."a/b"]
type = "literal"
route = "/x"

[router.chains.""]
type = "method"
verb = "get"
"#,
        );
        assert_eq!(paths(&config), vec!["router.routes.a/b", "router.chains."]);
    }

    #[test]
    fn test_chain_without_type() {
        let config = parse(
            r#"
[router.chains.inner]
may_terminate = true
"#,
        );
        assert_eq!(paths(&config), vec!["router.chains.inner"]);
    }

    #[test]
    fn test_nested_options() {
        let config = parse(
            r#"
[router]
type = "nested"
anchor = "a"
main_container = "bad name"

[router.routes.page]
type = "unknown"
"#,
        );
        assert_eq!(
            paths(&config),
            vec![
                "router.anchor",
                "router.main_container",
                "router.routes.page",
            ]
        );
    }

    #[test]
    fn test_prototypes_declared_in_nodes_are_known() {
        let config = parse(
            r#"
[router.prototypes.shared]
type = "wildcard"

[router.routes.a]
type = "nested"
router = "shared"
"#,
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_lazy_needs_stack_name() {
        let config = parse(
            r#"
[router.routes.later]
type = "lazy"
max_match_count = 1

[router.routes.fine]
type = "lazy"
lazy_stack = "registered_later"
"#,
        );
        assert_eq!(paths(&config), vec!["router.routes.later.lazy_stack"]);
    }

    #[test]
    fn test_log_level() {
        let mut config = RouterConfig::default();
        config.observability.log_level = "route_stack=loud".to_string();
        assert_eq!(paths(&config), vec!["observability.log_level"]);
    }
}
