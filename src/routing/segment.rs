//! Segment routes: `/literal/:param[/:optional]` patterns.
//!
//! # Responsibilities
//! - Parse a route pattern into literals, parameters and optional groups
//! - Compile it once into an anchored regex (prefix and full-match forms)
//! - Rebuild a path from params, omitting optional groups left at their defaults
//!
//! # Design Decisions
//! - Parameters match `[^/]+` unless constrained or given `{delimiters}`
//! - Regex group names are generated; parameter names may hold any
//!   character except `:/{[]`
//! - Percent-encoding is left to the caller

use std::any::Any;
use std::cell::RefCell;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::{RouterError, RouterResult};
use crate::http::Request;
use crate::routing::matcher::{path_from, AssembleOptions, Matcher};
use crate::routing::route_match::{MatchTree, NodeId, Params};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Parameter {
        name: String,
        delimiters: Option<String>,
    },
    Optional(Vec<Part>),
}

/// Route matching a pattern such as `/blog[/:year[/:month]]`.
#[derive(Debug)]
pub struct Segment {
    route: String,
    parts: Vec<Part>,
    group_names: Vec<String>,
    prefix_regex: Regex,
    full_regex: Regex,
    defaults: Params,
    assembled: RefCell<Vec<String>>,
}

impl Segment {
    /// Compile `route`. `constraints` maps parameter names to regex bodies.
    pub fn new(
        route: &str,
        constraints: &IndexMap<String, String>,
        defaults: Params,
    ) -> RouterResult<Self> {
        let parts = parse(route)?;
        let mut group_names = Vec::new();
        let body = build_regex(&parts, constraints, &mut group_names);

        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| {
                RouterError::InvalidArgument(format!("invalid segment route \"{route}\": {e}"))
            })
        };

        Ok(Self {
            route: route.to_string(),
            prefix_regex: compile(format!("^(?:{body})"))?,
            full_regex: compile(format!("^(?:{body})$"))?,
            parts,
            group_names,
            defaults,
            assembled: RefCell::new(Vec::new()),
        })
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    fn build_path(
        &self,
        parts: &[Part],
        params: &Params,
        is_optional: bool,
        has_child: bool,
        assembled: &mut Vec<String>,
    ) -> RouterResult<String> {
        let mut path = String::new();
        let mut skip = true;
        let mut skippable = false;

        for part in parts {
            match part {
                Part::Literal(text) => path.push_str(text),
                Part::Parameter { name, .. } => {
                    skippable = true;
                    let Some(value) = params.get(name) else {
                        if !is_optional || has_child {
                            return Err(RouterError::InvalidArgument(format!(
                                "Missing parameter \"{name}\""
                            )));
                        }
                        return Ok(String::new());
                    };
                    if !is_optional || has_child || self.defaults.get(name) != Some(value) {
                        skip = false;
                    }
                    path.push_str(value);
                    assembled.push(name.clone());
                }
                Part::Optional(inner) => {
                    skippable = true;
                    let optional = self.build_path(inner, params, true, has_child, assembled)?;
                    if !optional.is_empty() {
                        path.push_str(&optional);
                        skip = false;
                    }
                }
            }
        }

        if is_optional && skippable && skip {
            return Ok(String::new());
        }
        Ok(path)
    }
}

impl Matcher for Segment {
    fn match_request(
        &self,
        request: &mut dyn Request,
        offset: Option<usize>,
        tree: &mut MatchTree,
    ) -> RouterResult<Option<NodeId>> {
        let Some(path) = path_from(request, offset) else {
            return Ok(None);
        };
        let regex = match offset {
            Some(_) => &self.prefix_regex,
            None => &self.full_regex,
        };
        let Some(captures) = regex.captures(path) else {
            return Ok(None);
        };

        let mut params = self.defaults.clone();
        for (index, name) in self.group_names.iter().enumerate() {
            if let Some(value) = captures.name(&format!("p{index}")) {
                if !value.as_str().is_empty() {
                    params.insert(name.clone(), value.as_str().to_string());
                }
            }
        }
        let length = captures.get(0).map_or(0, |m| m.len());
        Ok(Some(tree.create(params, length)))
    }

    fn assemble(&self, params: &Params, options: &AssembleOptions) -> RouterResult<String> {
        let mut merged = self.defaults.clone();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut assembled = Vec::new();
        let result = self.build_path(&self.parts, &merged, false, options.has_child, &mut assembled);
        *self.assembled.borrow_mut() = assembled;
        result
    }

    fn assembled_params(&self) -> Vec<String> {
        self.assembled.borrow().clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn parse(route: &str) -> RouterResult<Vec<Part>> {
    let mut outer: Vec<Vec<Part>> = Vec::new();
    let mut current: Vec<Part> = Vec::new();
    let mut literal = String::new();
    let mut chars = route.chars().peekable();

    fn flush(literal: &mut String, level: &mut Vec<Part>) {
        if !literal.is_empty() {
            level.push(Part::Literal(std::mem::take(literal)));
        }
    }

    while let Some(c) = chars.next() {
        match c {
            ':' => {
                flush(&mut literal, &mut current);
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if matches!(next, ':' | '/' | '{' | '[' | ']') {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                if name.is_empty() {
                    return Err(RouterError::InvalidArgument(format!(
                        "empty parameter name in route \"{route}\""
                    )));
                }
                let mut delimiters = None;
                if chars.next_if_eq(&'{').is_some() {
                    let mut delims = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(d) => delims.push(d),
                            None => {
                                return Err(RouterError::InvalidArgument(format!(
                                    "unterminated delimiter list in route \"{route}\""
                                )))
                            }
                        }
                    }
                    delimiters = Some(delims);
                }
                chars.next_if_eq(&':');
                current.push(Part::Parameter { name, delimiters });
            }
            '[' => {
                flush(&mut literal, &mut current);
                outer.push(std::mem::take(&mut current));
            }
            ']' => {
                let Some(mut parent) = outer.pop() else {
                    return Err(RouterError::InvalidArgument(format!(
                        "found closing bracket without matching opening bracket in route \"{route}\""
                    )));
                };
                flush(&mut literal, &mut current);
                parent.push(Part::Optional(std::mem::take(&mut current)));
                current = parent;
            }
            other => literal.push(other),
        }
    }

    if !outer.is_empty() {
        return Err(RouterError::InvalidArgument(format!(
            "found unbalanced brackets in route \"{route}\""
        )));
    }
    flush(&mut literal, &mut current);
    Ok(current)
}

fn build_regex(
    parts: &[Part],
    constraints: &IndexMap<String, String>,
    group_names: &mut Vec<String>,
) -> String {
    let mut regex = String::new();
    for part in parts {
        match part {
            Part::Literal(text) => regex.push_str(&regex::escape(text)),
            Part::Parameter { name, delimiters } => {
                let group = format!("p{}", group_names.len());
                group_names.push(name.clone());
                let body = match (constraints.get(name), delimiters) {
                    (Some(constraint), _) => format!("(?:{constraint})"),
                    (None, Some(delims)) => {
                        let escaped: String = delims
                            .chars()
                            .map(|c| regex::escape(&c.to_string()))
                            .collect();
                        format!("[^{escaped}]+")
                    }
                    (None, None) => "[^/]+".to_string(),
                };
                regex.push_str(&format!("(?P<{group}>{body})"));
            }
            Part::Optional(inner) => {
                regex.push_str(&format!("(?:{})?", build_regex(inner, constraints, group_names)));
            }
        }
    }
    regex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use rstest::rstest;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn segment(route: &str, defaults: &[(&str, &str)]) -> Segment {
        Segment::new(route, &IndexMap::new(), params(defaults)).unwrap()
    }

    #[rstest]
    #[case("/:foo", "/bar", Some(vec![("foo", "bar")]))]
    #[case("/:foo", "/bar/baz", None)]
    #[case("/foo[/:bar]", "/foo", Some(vec![]))]
    #[case("/foo[/:bar]", "/foo/baz", Some(vec![("bar", "baz")]))]
    #[case("/[:controller[/:action]]", "/fo-fo/index", Some(vec![("controller", "fo-fo"), ("action", "index")]))]
    #[case("/:foo{-}-:bar", "/a-b", Some(vec![("foo", "a"), ("bar", "b")]))]
    fn test_segment_terminal_match(
        #[case] route: &str,
        #[case] path: &str,
        #[case] expected: Option<Vec<(&str, &str)>>,
    ) {
        let route = segment(route, &[]);
        let mut tree = MatchTree::new();
        let mut req = HttpRequest::get(path);
        let result = route.match_request(&mut req, None, &mut tree).unwrap();
        match expected {
            Some(pairs) => {
                let id = result.expect("route should match");
                assert_eq!(tree.node(id).params(), &params(&pairs));
                assert_eq!(tree.node(id).length(), path.len());
            }
            None => assert!(result.is_none()),
        }
    }

    #[test]
    fn test_segment_prefix_match_at_offset() {
        let route = segment("/bat[/:foo]", &[("foo", "bar")]);
        let mut tree = MatchTree::new();
        let mut req = HttpRequest::get("/foo/bat/bar/bat");
        let id = route.match_request(&mut req, Some(4), &mut tree).unwrap().unwrap();
        assert_eq!(tree.node(id).length(), 8);
        assert_eq!(tree.node(id).param("foo"), Some("bar"));
    }

    #[test]
    fn test_segment_constraints() {
        let constraints = IndexMap::from([("id".to_string(), "\\d+".to_string())]);
        let route = Segment::new("/item/:id", &constraints, Params::new()).unwrap();
        let mut tree = MatchTree::new();
        assert!(route
            .match_request(&mut HttpRequest::get("/item/12"), None, &mut tree)
            .unwrap()
            .is_some());
        assert!(route
            .match_request(&mut HttpRequest::get("/item/ab"), None, &mut tree)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_segment_assemble() {
        let route = segment("/foo[/:bar]", &[("bar", "baz")]);
        let none = AssembleOptions::default();
        assert_eq!(route.assemble(&Params::new(), &none).unwrap(), "/foo");
        assert_eq!(route.assemble(&params(&[("bar", "x")]), &none).unwrap(), "/foo/x");
        assert_eq!(route.assembled_params(), vec!["bar"]);

        let with_child = AssembleOptions {
            has_child: true,
            ..AssembleOptions::default()
        };
        assert_eq!(route.assemble(&Params::new(), &with_child).unwrap(), "/foo/baz");
    }

    #[test]
    fn test_segment_assemble_nested_optionals() {
        let route = segment("/[:controller[/:action]]", &[]);
        let none = AssembleOptions::default();
        assert_eq!(
            route
                .assemble(&params(&[("controller", "c"), ("action", "a")]), &none)
                .unwrap(),
            "/c/a"
        );
        assert_eq!(route.assemble(&params(&[("controller", "c")]), &none).unwrap(), "/c");
        assert_eq!(route.assemble(&Params::new(), &none).unwrap(), "/");
    }

    #[test]
    fn test_segment_missing_parameter() {
        let route = segment("/:foo", &[]);
        let err = route
            .assemble(&Params::new(), &AssembleOptions::default())
            .unwrap_err();
        assert_eq!(err, RouterError::InvalidArgument("Missing parameter \"foo\"".to_string()));
    }

    #[rstest]
    #[case("/foo[/:bar")]
    #[case("/foo]/:bar")]
    #[case("/foo/:")]
    fn test_segment_rejects_malformed_routes(#[case] route: &str) {
        let err = Segment::new(route, &IndexMap::new(), Params::new()).unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument(_)));
    }
}
