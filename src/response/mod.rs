//! The streaming result envelope.
//!
//! A [`Response`] is produced by storage, the transform engine, or the error
//! path, and flows back to the front-end. Its body is consumable exactly
//! once unless it is buffered: [`Response::read_body`] converts a stream
//! body into an in-memory buffer in place, and [`Response::to_buffered`]
//! snapshots the whole response into a clonable [`BufferedResponse`] - the
//! form the collapse lock broadcasts and the caches store, so every consumer
//! gets an independent stream.
//!
//! Every branch that does not consume a body must release it; dropping the
//! response does that, and [`Response::close`] exists for paths that must
//! release the stream before handing the value on.

use crate::transforms::TransformChain;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use http::HeaderMap;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Errors from response lifecycle operations.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("failed to read response body: {0}")]
    Read(#[from] std::io::Error),
}

/// A response body: an in-memory buffer that may be re-streamed, or a byte
/// stream consumable exactly once.
pub enum Body {
    Buffer(Bytes),
    Stream(Pin<Box<dyn AsyncRead + Send>>),
}

impl Body {
    pub fn from_bytes(bytes: Bytes) -> Self {
        Body::Buffer(bytes)
    }

    pub fn from_reader(reader: impl AsyncRead + Send + 'static) -> Self {
        Body::Stream(Box::pin(reader))
    }

    /// Consumes the body, reading a stream to its end.
    pub async fn read_to_end(self) -> Result<Bytes, ResponseError> {
        match self {
            Body::Buffer(bytes) => Ok(bytes),
            Body::Stream(mut stream) => {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A streaming result envelope.
pub struct Response {
    /// HTTP status code. `499` marks client/context cancellation.
    pub status: u16,
    pub headers: HeaderMap,
    /// Body length in bytes; `-1` when unknown.
    pub content_length: i64,
    body: Option<Body>,
    error: Option<String>,
    transforms: Vec<TransformChain>,
}

impl Response {
    /// Creates a bodyless response (HEAD results, storage acknowledgements).
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content_length: 0,
            body: None,
            error: None,
            transforms: Vec::new(),
        }
    }

    /// Creates a response over an in-memory buffer.
    pub fn new_buf(status: u16, buf: Bytes) -> Self {
        let content_length = buf.len() as i64;
        Self {
            status,
            headers: HeaderMap::new(),
            content_length,
            body: Some(Body::Buffer(buf)),
            error: None,
            transforms: Vec::new(),
        }
    }

    /// Creates a response over a UTF-8 string body.
    pub fn new_string(status: u16, body: &str) -> Self {
        Self::new_buf(status, Bytes::copy_from_slice(body.as_bytes()))
    }

    /// Creates a response over a one-shot byte stream.
    pub fn new_stream(
        status: u16,
        content_length: i64,
        reader: impl AsyncRead + Send + 'static,
    ) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content_length,
            body: Some(Body::Stream(Box::pin(reader))),
            error: None,
            transforms: Vec::new(),
        }
    }

    /// Creates an error response with a JSON body carrying the message.
    pub fn from_error(status: u16, err: impl std::fmt::Display) -> Self {
        let message = err.to_string();
        let body = serde_json::json!({ "error": message }).to_string();
        let mut res = Self::new_buf(status, Bytes::from(body.into_bytes()));
        res.error = Some(message);
        res.set_content_type("application/json");
        res
    }

    /// True when this response was produced by the error path.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets a header from string parts. Invalid names or values are dropped;
    /// they can only come from configuration.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        if let Ok(value) = HeaderValue::try_from(content_type) {
            self.headers.insert(CONTENT_TYPE, value);
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// True when the content type marks an image.
    pub fn is_image(&self) -> bool {
        self.content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false)
    }

    /// True when the response may be stored in the response cache.
    pub fn is_cacheable(&self) -> bool {
        if self.status != 200 {
            return false;
        }
        match self.headers.get(CACHE_CONTROL).and_then(|v| v.to_str().ok()) {
            None => true,
            Some(value) => {
                let value = value.to_ascii_lowercase();
                !(value.contains("no-cache")
                    || value.contains("no-store")
                    || value.contains("private"))
            }
        }
    }

    /// Records the transform chain that produced this response, for
    /// observability and cache metadata.
    pub fn set_transforms(&mut self, transforms: Vec<TransformChain>) {
        self.transforms = transforms;
    }

    pub fn transforms(&self) -> &[TransformChain] {
        &self.transforms
    }

    /// Takes the body out for one-shot consumption (e.g. handing a stream to
    /// a storage backend).
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Releases the body without consuming it. Dropping the response has the
    /// same effect; this is for paths that keep the envelope alive.
    pub fn close(&mut self) {
        self.body = None;
    }

    /// Reads the whole body, converting a stream into a re-streamable buffer
    /// in place. Subsequent calls return the buffer again.
    ///
    /// On a read error the partially consumed stream is released.
    pub async fn read_body(&mut self) -> Result<Bytes, ResponseError> {
        match self.body.take() {
            None => Ok(Bytes::new()),
            Some(Body::Buffer(bytes)) => {
                self.body = Some(Body::Buffer(bytes.clone()));
                Ok(bytes)
            }
            Some(Body::Stream(mut stream)) => {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf).await?;
                let bytes = Bytes::from(buf);
                self.body = Some(Body::Buffer(bytes.clone()));
                Ok(bytes)
            }
        }
    }

    /// Buffers the body in place and snapshots the response into a clonable
    /// form with an independent body per clone.
    pub async fn to_buffered(&mut self) -> Result<BufferedResponse, ResponseError> {
        let body = self.read_body().await?;
        let content_length = if self.content_length >= 0 {
            self.content_length
        } else {
            body.len() as i64
        };
        Ok(BufferedResponse {
            status: self.status,
            headers: self.headers.clone(),
            content_length,
            body,
            error: self.error.clone(),
            transforms: self.transforms.clone(),
        })
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("error", &self.error)
            .field(
                "body",
                &match &self.body {
                    None => "<closed>",
                    Some(Body::Buffer(_)) => "<buffer>",
                    Some(Body::Stream(_)) => "<stream>",
                },
            )
            .finish()
    }
}

/// A fully buffered, clonable snapshot of a response.
///
/// This is what the collapse lock broadcasts to waiters and what the
/// response cache stores; [`BufferedResponse::into_response`] mints a fresh
/// [`Response`] with its own re-streamable body.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub content_length: i64,
    pub body: Bytes,
    pub error: Option<String>,
    pub transforms: Vec<TransformChain>,
}

impl BufferedResponse {
    /// Converts the snapshot back into a response.
    pub fn into_response(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            content_length: self.content_length,
            body: Some(Body::Buffer(self.body)),
            error: self.error,
            transforms: self.transforms,
        }
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffer_body_rereadable() {
        let mut res = Response::new_buf(200, Bytes::from_static(b"hello"));
        assert_eq!(res.content_length, 5);
        assert_eq!(res.read_body().await.unwrap(), "hello");
        assert_eq!(res.read_body().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_stream_body_buffers_in_place() {
        let reader = std::io::Cursor::new(b"streamed bytes".to_vec());
        let mut res = Response::new_stream(200, -1, reader);

        assert_eq!(res.read_body().await.unwrap(), "streamed bytes");
        // second read comes from the in-place buffer
        assert_eq!(res.read_body().await.unwrap(), "streamed bytes");
    }

    #[tokio::test]
    async fn test_closed_body_reads_empty() {
        let mut res = Response::new_buf(200, Bytes::from_static(b"data"));
        res.close();
        assert_eq!(res.read_body().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_to_buffered_clones_are_independent() {
        let mut res = Response::new_buf(200, Bytes::from_static(b"shared"));
        res.set_content_type("image/jpeg");

        let buffered = res.to_buffered().await.unwrap();
        let mut a = buffered.clone().into_response();
        let mut b = buffered.into_response();

        assert_eq!(a.read_body().await.unwrap(), "shared");
        assert_eq!(b.read_body().await.unwrap(), "shared");
        assert_eq!(a.content_type(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_to_buffered_fills_unknown_length() {
        let reader = std::io::Cursor::new(b"12345".to_vec());
        let mut res = Response::new_stream(200, -1, reader);
        let buffered = res.to_buffered().await.unwrap();
        assert_eq!(buffered.content_length, 5);
    }

    #[test]
    fn test_from_error_carries_json_body() {
        let res = Response::from_error(503, "throttled");
        assert_eq!(res.status, 503);
        assert!(res.has_error());
        assert_eq!(res.error_message(), Some("throttled"));
        assert_eq!(res.content_type(), Some("application/json"));
    }

    #[test]
    fn test_is_image() {
        let mut res = Response::new(200);
        assert!(!res.is_image());
        res.set_content_type("image/png");
        assert!(res.is_image());
        res.set_content_type("text/html");
        assert!(!res.is_image());
    }

    #[test]
    fn test_is_cacheable() {
        let mut res = Response::new_buf(200, Bytes::from_static(b"x"));
        assert!(res.is_cacheable());

        res.set_header("Cache-Control", "no-store");
        assert!(!res.is_cacheable());

        res.set_header("Cache-Control", "public, max-age=60");
        assert!(res.is_cacheable());

        let err = Response::from_error(404, "missing");
        assert!(!err.is_cacheable());
    }

    #[test]
    fn test_set_header_ignores_invalid() {
        let mut res = Response::new(200);
        res.set_header("X-Ok", "yes");
        res.set_header("bad header\n", "value");
        assert_eq!(res.header("X-Ok"), Some("yes"));
        assert_eq!(res.headers.len(), 1);
    }
}
