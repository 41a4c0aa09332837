//! Request accessor contract.
//!
//! # Responsibilities
//! - Expose the mutable URI path that matchers consume
//! - Expose the HTTP method for verb-based leaves
//!
//! # Design Decisions
//! - Both accessors are optional capabilities: a request without them makes
//!   the corresponding matcher report no match instead of failing
//! - Containers temporarily rewrite the path, so the path accessor is mutable

/// Mutable access to the path component of a request URI.
pub trait UriPath {
    /// Current path.
    fn path(&self) -> &str;

    /// Replace the path.
    fn set_path(&mut self, path: String);
}

/// A request as seen by route matchers.
pub trait Request {
    /// Path accessor, when the request carries a URI.
    fn uri(&self) -> Option<&dyn UriPath>;

    /// Mutable path accessor, when the request carries a URI.
    fn uri_mut(&mut self) -> Option<&mut dyn UriPath>;

    /// HTTP method, when the request has one.
    fn method(&self) -> Option<&str> {
        None
    }
}

/// Path of an [`HttpRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Uri {
    path: String,
}

impl Uri {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl UriPath for Uri {
    fn path(&self) -> &str {
        &self.path
    }

    fn set_path(&mut self, path: String) {
        self.path = path;
    }
}

/// In-memory HTTP request carrying a method and a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: String,
    uri: Uri,
}

impl HttpRequest {
    /// Create a request. The method is normalized to uppercase.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            uri: Uri::new(path),
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

impl Request for HttpRequest {
    fn uri(&self) -> Option<&dyn UriPath> {
        Some(&self.uri)
    }

    fn uri_mut(&mut self) -> Option<&mut dyn UriPath> {
        Some(&mut self.uri)
    }

    fn method(&self) -> Option<&str> {
        Some(&self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_is_normalized() {
        let req = HttpRequest::new("post", "/foo");
        assert_eq!(req.method(), Some("POST"));
        assert_eq!(req.path(), "/foo");
    }

    #[test]
    fn test_path_is_mutable() {
        let mut req = HttpRequest::get("/foo");
        if let Some(uri) = req.uri_mut() {
            uri.set_path("/bar".to_string());
        }
        assert_eq!(req.uri().map(|u| u.path()), Some("/bar"));
    }
}
