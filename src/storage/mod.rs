//! The storage backend interface.
//!
//! Backends are external collaborators; the core only consumes this trait.
//! Failures are encoded into [`Response`] values (status plus error message)
//! rather than a separate error channel, so storage results flow through the
//! pipeline like any other response.

use crate::object::FileObject;
use crate::response::{Body, Response};
use http::HeaderMap;
use std::future::Future;

/// Options for bucket listing requests.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub max_keys: usize,
    pub delimeter: String,
    pub prefix: String,
    pub marker: String,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            max_keys: 1000,
            delimeter: String::new(),
            prefix: String::new(),
            marker: String::new(),
        }
    }
}

/// A storage backend bound to a bucket.
pub trait Storage: Send + Sync + 'static {
    /// Fetches an object. Missing objects come back as `404` responses.
    fn get(&self, obj: &FileObject) -> impl Future<Output = Response> + Send;

    /// Fetches object metadata only; the response carries headers and
    /// content length but no body.
    fn head(&self, obj: &FileObject) -> impl Future<Output = Response> + Send;

    /// Writes an object from a one-shot body stream.
    fn set(
        &self,
        obj: &FileObject,
        headers: &HeaderMap,
        content_length: i64,
        body: Body,
    ) -> impl Future<Output = Response> + Send;

    /// Deletes an object.
    fn delete(&self, obj: &FileObject) -> impl Future<Output = Response> + Send;

    /// Lists a bucket; the response body is the backend's listing XML
    /// verbatim.
    fn list(&self, obj: &FileObject, opts: ListOptions) -> impl Future<Output = Response> + Send;
}
