//! Route tree behaviour driven through config files.

use pretty_assertions::assert_eq;
use route_stack::routing::{AssembleOptions, Params};
use route_stack::RouterError;
use rstest::rstest;

mod common;

const ROUTES: &str = r#"
[prototypes.home]
type = "literal"
route = "/"
defaults = { controller = "index" }

[router.routes.index]
router = "home"

[router.routes.about]
type = "literal"
route = "/about"
priority = 10

[router.routes.page]
type = "segment"
route = "/:page"
constraints = { page = "[a-z]+" }

[router.routes.blog]
router = { type = "literal", route = "/blog" }
may_terminate = true
defaults = { section = "blog" }

[router.routes.blog.routes.post]
type = "segment"
route = "/:slug"

[router.routes.shop]
router = { type = "literal", route = "/shop" }

[router.routes.shop.chains.verb]
type = "method"
verb = "GET"

[router.routes.shop.routes.item]
type = "segment"
route = "/item/:id"
"#;

#[rstest]
#[case("/", "index")]
#[case("/about", "about")]
#[case("/contact", "page")]
#[case("/blog", "blog")]
#[case("/blog/hello", "blog/post")]
#[case("/shop/item/3", "shop/item")]
fn test_matched_names(#[case] path: &str, #[case] expected: &str) {
    let router = common::router_from_toml(ROUTES);
    let found = router.match_path("GET", path).unwrap().unwrap();
    assert_eq!(found.matched_name(), Some(expected));
    assert_eq!(found.length(), path.len());
}

#[rstest]
#[case("GET", "/blog/hello/extra")]
#[case("POST", "/shop/item/3")]
#[case("GET", "/shop/other")]
#[case("GET", "/Contact")]
fn test_no_match(#[case] method: &str, #[case] path: &str) {
    let router = common::router_from_toml(ROUTES);
    assert!(router.match_path(method, path).unwrap().is_none());
}

const LITERALS: &str = r#"
[router.routes.about]
type = "literal"
route = "/about"

[router.routes.blog]
router = { type = "literal", route = "/blog" }
may_terminate = true

[router.routes.blog.routes.post]
type = "literal"
route = "/post"

[router.routes.docs]
router = { type = "literal", route = "/docs" }

[router.routes.docs.routes.api]
router = { type = "literal", route = "/api" }

[router.routes.docs.routes.api.routes.v1]
type = "literal"
route = "/v1"
"#;

#[rstest]
#[case("/about")]
#[case("/blog")]
#[case("/blog/post")]
#[case("/docs/api/v1")]
fn test_literal_paths_assemble_back_from_their_match(#[case] path: &str) {
    let router = common::router_from_toml(LITERALS);
    let found = router.match_path("GET", path).unwrap().unwrap();
    let name = found.matched_name().unwrap();

    let assembled = router
        .assemble(found.params(), &AssembleOptions::named(name))
        .unwrap();
    assert_eq!(assembled, path);
}

#[test]
fn test_defaults_fill_missing_params() {
    let router = common::router_from_toml(ROUTES);
    let found = router.match_path("GET", "/blog/hello").unwrap().unwrap();
    assert_eq!(found.param("slug"), Some("hello"));
    assert_eq!(found.param("section"), Some("blog"));

    let found = router.match_path("GET", "/").unwrap().unwrap();
    assert_eq!(found.param("controller"), Some("index"));
}

#[test]
fn test_assemble_named_routes() {
    let router = common::router_from_toml(ROUTES);
    let assemble = |name: &str, params: Params| router.assemble(&params, &AssembleOptions::named(name));

    assert_eq!(assemble("blog", Params::new()).unwrap(), "/blog");
    assert_eq!(
        assemble("blog/post", common::params(&[("slug", "first")])).unwrap(),
        "/blog/first"
    );
    assert_eq!(
        assemble("shop/item", common::params(&[("id", "9")])).unwrap(),
        "/shop/item/9"
    );
    assert_eq!(assemble("about", Params::new()).unwrap(), "/about");

    assert!(matches!(
        assemble("shop", Params::new()).unwrap_err(),
        RouterError::Runtime(_)
    ));
    assert!(matches!(
        assemble("nowhere", Params::new()).unwrap_err(),
        RouterError::Runtime(_)
    ));
    assert!(matches!(
        assemble("shop/item", Params::new()).unwrap_err(),
        RouterError::InvalidArgument(_)
    ));
}

#[test]
fn test_prototype_is_shared_across_uses() {
    let router = common::router_from_toml(ROUTES);
    let first = router.plugins().get("home", &Default::default()).unwrap();
    let second = router.plugins().get("home", &Default::default()).unwrap();
    assert!(std::rc::Rc::ptr_eq(&first, &second));
}

#[test]
fn test_match_tree_json() {
    let router = common::router_from_toml(ROUTES);
    let found = router.match_path("GET", "/blog/hello").unwrap().unwrap();
    let json = found.to_json();
    assert_eq!(json["matched_name"], "blog/post");
    assert_eq!(json["params"]["slug"], "hello");
    assert_eq!(json["length"], 11);
}

const DEFERRED: &str = r#"
[prototypes.admin]
type = "stack"

[prototypes.admin.routes.users]
type = "literal"
route = "/users"

[router.routes.admin]
router = { type = "literal", route = "/admin" }

[router.routes.admin.routes.panel]
type = "lazy"
lazy_stack = "admin"
max_match_count = 0
"#;

#[test]
fn test_lazy_route_resolves_declared_prototype() {
    let router = common::router_from_toml(DEFERRED);
    let found = router.match_path("GET", "/admin/users").unwrap().unwrap();
    assert_eq!(found.matched_name(), Some("admin/panel/users"));
    assert_eq!(
        router
            .assemble(&Params::new(), &AssembleOptions::named("admin/panel/users"))
            .unwrap(),
        "/admin/users"
    );
    assert!(router.match_path("GET", "/admin/other").unwrap().is_none());
}
