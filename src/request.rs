//! The request envelope the front-end hands to the processor.
//!
//! The core does not speak HTTP; the front-end parses the wire request and
//! passes this value object alongside the parsed [`FileObject`]. The body is
//! one-shot, like a response body, and is taken by the PUT path.

use crate::response::Body;
use http::{HeaderMap, Method};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// An incoming request.
pub struct Request {
    pub method: Method,
    /// Original request path.
    pub path: String,
    /// Parsed query parameters.
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    /// Declared body length; `-1` when unknown.
    pub content_length: i64,
    /// Set when the request passed server-side authentication for listings;
    /// such responses must not be cached downstream.
    pub authenticated: bool,
    /// Cancellation handle of the incoming connection. The processor derives
    /// its deadline token from this, so a client disconnect propagates.
    pub cancel: CancellationToken,
    body: Mutex<Option<Body>>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            headers: HeaderMap::new(),
            content_length: -1,
            authenticated: false,
            cancel: CancellationToken::new(),
            body: Mutex::new(None),
        }
    }

    /// Attaches a one-shot body with its declared length.
    pub fn with_body(self, body: Body, content_length: i64) -> Self {
        *self.body.lock().unwrap() = Some(body);
        Self {
            content_length,
            ..self
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    /// Takes the body for one-shot consumption.
    pub fn take_body(&self) -> Option<Body> {
        self.body.lock().unwrap().take()
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn has_query(&self, name: &str) -> bool {
        self.query.contains_key(name)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("content_length", &self.content_length)
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_request_defaults() {
        let req = Request::new(Method::GET, "/media/image.jpg");
        assert_eq!(req.content_length, -1);
        assert!(!req.authenticated);
        assert!(req.take_body().is_none());
    }

    #[test]
    fn test_body_taken_once() {
        let req = Request::new(Method::PUT, "/media/image.jpg")
            .with_body(Body::from_bytes(Bytes::from_static(b"img")), 3);
        assert_eq!(req.content_length, 3);
        assert!(req.take_body().is_some());
        assert!(req.take_body().is_none());
    }

    #[test]
    fn test_query_params() {
        let req = Request::new(Method::GET, "/media/")
            .with_query("max-keys", "10")
            .with_query("location", "");
        assert_eq!(req.query_param("max-keys"), Some("10"));
        assert!(req.has_query("location"));
        assert!(!req.has_query("marker"));
    }
}
