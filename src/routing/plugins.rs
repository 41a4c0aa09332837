//! Route plugin resolver.
//!
//! # Responsibilities
//! - Map type names and their aliases to matcher factories
//! - Keep named prototypes and hand out one shared instance per prototype
//! - Turn a [`RouteDescription`] into a live matcher
//!
//! # Design Decisions
//! - Type names are case-insensitive; prototype names are exact
//! - Prototypes win over types with the same name
//! - Factories receive the manager so composites can build their own children
//! - The registry only holds shared prototypes weakly; the routes using an
//!   instance own it, and a dropped instance is rebuilt from its description

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::config::schema::{NestedConfig, NodeConfig};
use crate::error::{RouterError, RouterResult};
use crate::routing::description::{parse_options, PluginOptions, RouteDescription};
use crate::routing::lazy::{LazyStack, DEFAULT_MAX_MATCH_COUNT};
use crate::routing::matcher::{Literal, Matcher, Method, Wildcard};
use crate::routing::nested::NestedStack;
use crate::routing::regex_route::RegexRoute;
use crate::routing::route_match::Params;
use crate::routing::segment::Segment;
use crate::routing::stack::RouteStack;

/// Builds a matcher from plugin options.
pub type PluginFactory =
    Rc<dyn Fn(&PluginOptions, &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>>>;

enum Prototype {
    Pending(RouteDescription),
    Building,
    Shared {
        description: RouteDescription,
        instance: Weak<dyn Matcher>,
    },
}

/// Registry of route types, aliases and prototypes.
#[derive(Default)]
pub struct PluginManager {
    factories: RefCell<IndexMap<String, PluginFactory>>,
    aliases: RefCell<IndexMap<String, String>>,
    prototypes: RefCell<IndexMap<String, Prototype>>,
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("types", &self.factories.borrow().keys().collect::<Vec<_>>())
            .field("aliases", &*self.aliases.borrow())
            .field("prototypes", &self.prototypes.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginManager {
    /// Empty manager without any route types.
    pub fn empty() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Manager with every builtin route type registered.
    pub fn builtin() -> Rc<Self> {
        let manager = Self::default();
        manager.register("literal", Rc::new(literal));
        manager.register("method", Rc::new(method));
        manager.register("segment", Rc::new(segment));
        manager.register("regex", Rc::new(regex));
        manager.register("wildcard", Rc::new(wildcard));
        manager.register("stack", Rc::new(stack));
        manager.register("nested", Rc::new(nested));
        manager.register("lazy", Rc::new(lazy));

        manager.alias("routestack", "stack");
        manager.alias("route_stack", "stack");
        manager.alias("nestedstack", "nested");
        manager.alias("nested_stack", "nested");
        manager.alias("routestacklazy", "lazy");
        manager.alias("lazy_stack", "lazy");
        Rc::new(manager)
    }

    /// Register a factory under a (case-insensitive) type name.
    pub fn register(&self, kind: &str, factory: PluginFactory) {
        self.factories.borrow_mut().insert(kind.to_lowercase(), factory);
    }

    pub fn alias(&self, alias: &str, kind: &str) {
        self.aliases
            .borrow_mut()
            .insert(alias.to_lowercase(), kind.to_lowercase());
    }

    /// Register a prototype. A previously shared instance is dropped.
    pub fn set_prototype(&self, name: impl Into<String>, description: RouteDescription) {
        self.prototypes
            .borrow_mut()
            .insert(name.into(), Prototype::Pending(description));
    }

    /// Whether `name` is a prototype or a known type.
    pub fn has(&self, name: &str) -> bool {
        self.prototypes.borrow().contains_key(name)
            || self.factories.borrow().contains_key(&self.canonical(name))
    }

    /// Registered type name behind `name` after alias lookup.
    pub fn canonical(&self, name: &str) -> String {
        let name = name.to_lowercase();
        self.aliases.borrow().get(&name).cloned().unwrap_or(name)
    }

    /// Resolve a prototype or build a fresh matcher of type `name`.
    pub fn get(self: &Rc<Self>, name: &str, options: &PluginOptions) -> RouterResult<Rc<dyn Matcher>> {
        if let Some(shared) = self.prototype(name)? {
            return Ok(shared);
        }

        let kind = self.canonical(name);
        let factory = self
            .factories
            .borrow()
            .get(&kind)
            .cloned()
            .ok_or_else(|| RouterError::NotFound(format!("route type \"{name}\" is not registered")))?;
        debug!(route_type = %kind, "building route plugin");
        factory(options, self)
    }

    fn prototype(self: &Rc<Self>, name: &str) -> RouterResult<Option<Rc<dyn Matcher>>> {
        let description = {
            let mut prototypes = self.prototypes.borrow_mut();
            let Some(slot) = prototypes.get_mut(name) else {
                return Ok(None);
            };
            match std::mem::replace(slot, Prototype::Building) {
                Prototype::Shared {
                    description,
                    instance,
                } => {
                    if let Some(shared) = instance.upgrade() {
                        *slot = Prototype::Shared {
                            description,
                            instance,
                        };
                        return Ok(Some(shared));
                    }
                    description
                }
                Prototype::Building => {
                    return Err(RouterError::InvalidArgument(format!(
                        "prototype \"{name}\" refers to itself"
                    )));
                }
                Prototype::Pending(description) => description,
            }
        };

        debug!(prototype = %name, "building shared prototype");
        match self.build(&description) {
            Ok(shared) => {
                let instance = Rc::downgrade(&shared);
                self.prototypes.borrow_mut().insert(
                    name.to_string(),
                    Prototype::Shared {
                        description,
                        instance,
                    },
                );
                Ok(Some(shared))
            }
            Err(err) => {
                self.prototypes
                    .borrow_mut()
                    .insert(name.to_string(), Prototype::Pending(description));
                Err(err)
            }
        }
    }

    /// Build the matcher a description stands for.
    pub fn build(self: &Rc<Self>, description: &RouteDescription) -> RouterResult<Rc<dyn Matcher>> {
        match description {
            RouteDescription::Instance(matcher) => Ok(matcher.clone()),
            RouteDescription::Named(name) => self.get(name, &PluginOptions::new()),
            RouteDescription::Typed { kind, options } => self.get(kind, options),
            RouteDescription::Node(node) => {
                Ok(Rc::new(RouteStack::from_description(node.clone(), self)?))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct LiteralOptions {
    route: String,
    #[serde(default)]
    defaults: Params,
}

#[derive(Debug, Deserialize)]
struct MethodOptions {
    verb: String,
    #[serde(default)]
    defaults: Params,
}

#[derive(Debug, Deserialize)]
struct SegmentOptions {
    route: String,
    #[serde(default)]
    constraints: IndexMap<String, String>,
    #[serde(default)]
    defaults: Params,
}

#[derive(Debug, Deserialize)]
struct RegexOptions {
    regex: String,
    #[serde(default)]
    spec: String,
    #[serde(default)]
    defaults: Params,
}

#[derive(Debug, Deserialize)]
struct LazyOptions {
    lazy_stack: String,
    #[serde(default = "default_max_match_count")]
    max_match_count: u32,
}

fn default_max_match_count() -> u32 {
    DEFAULT_MAX_MATCH_COUNT
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct WildcardOptions {
    key_value_delimiter: String,
    param_delimiter: String,
    defaults: Params,
}

impl Default for WildcardOptions {
    fn default() -> Self {
        Self {
            key_value_delimiter: "/".to_string(),
            param_delimiter: "/".to_string(),
            defaults: Params::new(),
        }
    }
}

fn literal(options: &PluginOptions, _: &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>> {
    let opts: LiteralOptions = parse_options("literal", options)?;
    Ok(Rc::new(Literal::new(opts.route).with_defaults(opts.defaults)))
}

fn method(options: &PluginOptions, _: &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>> {
    let opts: MethodOptions = parse_options("method", options)?;
    Ok(Rc::new(Method::new(&opts.verb).with_defaults(opts.defaults)))
}

fn segment(options: &PluginOptions, _: &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>> {
    let opts: SegmentOptions = parse_options("segment", options)?;
    Ok(Rc::new(Segment::new(&opts.route, &opts.constraints, opts.defaults)?))
}

fn regex(options: &PluginOptions, _: &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>> {
    let opts: RegexOptions = parse_options("regex", options)?;
    Ok(Rc::new(RegexRoute::new(&opts.regex, opts.spec, opts.defaults)?))
}

fn wildcard(options: &PluginOptions, _: &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>> {
    let opts: WildcardOptions = parse_options("wildcard", options)?;
    Ok(Rc::new(
        Wildcard::new(opts.key_value_delimiter, opts.param_delimiter).with_defaults(opts.defaults),
    ))
}

fn stack(options: &PluginOptions, plugins: &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>> {
    let config: NodeConfig = parse_options("stack", options)?;
    Ok(Rc::new(RouteStack::from_description((&config).into(), plugins)?))
}

fn nested(options: &PluginOptions, plugins: &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>> {
    let config: NestedConfig = parse_options("nested", options)?;
    Ok(Rc::new(NestedStack::from_description((&config).into(), plugins)?))
}

fn lazy(options: &PluginOptions, plugins: &Rc<PluginManager>) -> RouterResult<Rc<dyn Matcher>> {
    let opts: LazyOptions = parse_options("lazy", options)?;
    Ok(Rc::new(
        LazyStack::new(opts.lazy_stack, plugins.clone()).with_max_match_count(opts.max_match_count),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts(value: serde_json::Value) -> PluginOptions {
        match value {
            serde_json::Value::Object(map) => map,
            _ => PluginOptions::new(),
        }
    }

    #[test]
    fn test_builtin_types_and_aliases() {
        let plugins = PluginManager::builtin();
        for name in ["literal", "Literal", "SEGMENT", "RouteStack", "route_stack", "NestedStack"] {
            assert!(plugins.has(name), "{name} should be known");
        }
        assert!(!plugins.has("hostname"));

        let literal = plugins.get("Literal", &opts(json!({ "route": "/foo" }))).unwrap();
        assert!(literal.as_any().downcast_ref::<Literal>().is_some());

        let stack = plugins.get("RouteStack", &PluginOptions::new()).unwrap();
        assert!(stack.as_stack().is_some());
        let nested = plugins.get("nested_stack", &opts(json!({ "main_container": "k0" }))).unwrap();
        assert!(nested.as_any().downcast_ref::<NestedStack>().is_some());
    }

    #[test]
    fn test_unknown_type_is_not_found() {
        let plugins = PluginManager::builtin();
        let err = plugins.get("hostname", &PluginOptions::new()).unwrap_err();
        assert!(matches!(err, RouterError::NotFound(_)));
    }

    #[test]
    fn test_bad_options_are_invalid() {
        let plugins = PluginManager::builtin();
        let err = plugins.get("literal", &PluginOptions::new()).unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument(_)));
    }

    #[test]
    fn test_prototypes_are_shared() {
        let plugins = PluginManager::builtin();
        plugins.set_prototype(
            "home",
            RouteDescription::typed("literal", json!({ "route": "/" })),
        );
        assert!(plugins.has("home"));

        let first = plugins.get("home", &PluginOptions::new()).unwrap();
        let second = plugins.build(&RouteDescription::named("home")).unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        plugins.set_prototype(
            "home",
            RouteDescription::typed("literal", json!({ "route": "/home" })),
        );
        let third = plugins.get("home", &PluginOptions::new()).unwrap();
        assert!(!Rc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_prototype_rebuilt_once_unused() {
        let plugins = PluginManager::builtin();
        plugins.set_prototype("home", RouteDescription::typed("literal", json!({ "route": "/" })));

        let first = plugins.get("home", &PluginOptions::new()).unwrap();
        let weak = Rc::downgrade(&first);
        drop(first);
        assert!(weak.upgrade().is_none());

        let rebuilt = plugins.get("home", &PluginOptions::new()).unwrap();
        let again = plugins.get("home", &PluginOptions::new()).unwrap();
        assert!(Rc::ptr_eq(&rebuilt, &again));
        assert_eq!(rebuilt.as_any().downcast_ref::<Literal>().unwrap().route(), "/");
    }

    #[test]
    fn test_lazy_type() {
        let plugins = PluginManager::builtin();
        assert!(plugins.has("RouteStackLazy"));
        let lazy = plugins
            .get("lazy", &opts(json!({ "lazy_stack": "later", "max_match_count": 5 })))
            .unwrap();
        assert!(lazy.is_composite());
        let lazy = lazy.as_any().downcast_ref::<LazyStack>().unwrap();
        assert_eq!(lazy.name(), "later");
        assert_eq!(lazy.remaining_matches(), 5);

        let err = plugins.get("lazy", &PluginOptions::new()).unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument(_)));
    }

    #[test]
    fn test_self_referencing_prototype() {
        let plugins = PluginManager::builtin();
        plugins.set_prototype("loop", RouteDescription::named("loop"));
        let err = plugins.get("loop", &PluginOptions::new()).unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument(_)));
    }

    #[test]
    fn test_custom_factory() {
        let plugins = PluginManager::empty();
        assert!(!plugins.has("literal"));
        plugins.register(
            "Root",
            Rc::new(|_: &PluginOptions, _: &Rc<PluginManager>| -> RouterResult<Rc<dyn Matcher>> {
                Ok(Rc::new(Literal::new("/")))
            }),
        );
        plugins.alias("home", "root");
        assert!(plugins.get("HOME", &PluginOptions::new()).is_ok());
    }
}
