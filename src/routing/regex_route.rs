//! Regex routes with a `%param%` assembly template.

use std::any::Any;
use std::cell::RefCell;

use regex::Regex;

use crate::error::{RouterError, RouterResult};
use crate::http::Request;
use crate::routing::matcher::{path_from, AssembleOptions, Matcher};
use crate::routing::route_match::{MatchTree, NodeId, Params};

/// Matches a raw regex; named groups become params.
#[derive(Debug)]
pub struct RegexRoute {
    prefix_regex: Regex,
    full_regex: Regex,
    spec: String,
    defaults: Params,
    assembled: RefCell<Vec<String>>,
}

impl RegexRoute {
    /// `spec` is the assembly template, e.g. `/blog/%id%.html`.
    pub fn new(regex: &str, spec: impl Into<String>, defaults: Params) -> RouterResult<Self> {
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| {
                RouterError::InvalidArgument(format!("invalid regex route \"{regex}\": {e}"))
            })
        };
        Ok(Self {
            prefix_regex: compile(format!("^(?:{regex})"))?,
            full_regex: compile(format!("^(?:{regex})$"))?,
            spec: spec.into(),
            defaults,
            assembled: RefCell::new(Vec::new()),
        })
    }
}

impl Matcher for RegexRoute {
    fn match_request(
        &self,
        request: &mut dyn Request,
        offset: Option<usize>,
        tree: &mut MatchTree,
    ) -> RouterResult<Option<NodeId>> {
        let Some(path) = path_from(request, offset) else {
            return Ok(None);
        };
        let regex = if offset.is_some() {
            &self.prefix_regex
        } else {
            &self.full_regex
        };
        let Some(captures) = regex.captures(path) else {
            return Ok(None);
        };

        let mut params = self.defaults.clone();
        for name in regex.capture_names().flatten() {
            if let Some(value) = captures.name(name).filter(|m| !m.as_str().is_empty()) {
                params.insert(name.to_string(), value.as_str().to_string());
            }
        }
        let length = captures.get(0).map_or(0, |m| m.len());
        Ok(Some(tree.create(params, length)))
    }

    fn assemble(&self, params: &Params, _options: &AssembleOptions) -> RouterResult<String> {
        let mut merged = self.defaults.clone();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut url = self.spec.clone();
        let mut assembled = Vec::new();
        for (key, value) in &merged {
            let placeholder = format!("%{key}%");
            if url.contains(&placeholder) {
                url = url.replace(&placeholder, value);
                assembled.push(key.clone());
            }
        }
        *self.assembled.borrow_mut() = assembled;
        Ok(url)
    }

    fn assembled_params(&self) -> Vec<String> {
        self.assembled.borrow().clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
