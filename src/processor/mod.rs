//! The request processor: the orchestrator wiring cache, collapse lock,
//! throttler, storage, and the transform engine into the per-request
//! pipeline.
//!
//! # Flow
//!
//! ```text
//! process() ── deadline ──┐
//!                         ▼
//!   worker: dispatch ── GET/HEAD → cache → collapse/direct → headers → async cache set
//!                    ── PUT      → async invalidate + storage.set
//!                    ── DELETE   → async invalidate + storage.delete
//!                    ── other    → 405
//! ```
//!
//! The worker hands its response to the orchestrator over a oneshot channel.
//! On deadline the orchestrator cancels the request context and answers
//! `499`; the worker probes the context before the handoff and closes any
//! response it cannot deliver, so a body is never left open in a channel
//! nobody drains.

mod get;
mod headers;
mod listing;

use crate::cache::ResponseCache;
use crate::config::ServerConfig;
use crate::engine::TransformEngine;
use crate::lock::{Lock, LockOutcome};
use crate::object::FileObject;
use crate::plugins::PluginsManager;
use crate::request::Request;
use crate::response::{Body, Response};
use crate::storage::Storage;
use crate::throttler::Throttler;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Errors the processor emits directly, encoded into error responses.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Waited out the collapse lock without a broadcast.
    #[error("timeout")]
    Timeout,

    /// The request context was canceled or the deadline passed.
    #[error("context canceled")]
    ContextCanceled,

    /// Transform capacity exhausted while the context expired.
    #[error("throttled")]
    Throttled,

    #[error("method not allowed")]
    MethodNotAllowed,

    /// A storage failure propagated with the backend's status.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Handles incoming requests. One instance serves the whole process; the
/// injected cache, lock, and throttler are the process-wide singletons.
pub struct RequestProcessor<S, E, L, C> {
    storage: Arc<S>,
    engine: Arc<E>,
    collapse: Arc<L>,
    cache: Arc<C>,
    throttler: Arc<Throttler>,
    plugins: Arc<PluginsManager>,
    config: Arc<ServerConfig>,
    process_timeout: Duration,
    /// Collapse waiters give up one second before the request deadline so
    /// the fallback still has a chance to answer.
    lock_timeout: Duration,
}

impl<S, E, L, C> Clone for RequestProcessor<S, E, L, C> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            engine: Arc::clone(&self.engine),
            collapse: Arc::clone(&self.collapse),
            cache: Arc::clone(&self.cache),
            throttler: Arc::clone(&self.throttler),
            plugins: Arc::clone(&self.plugins),
            config: Arc::clone(&self.config),
            process_timeout: self.process_timeout,
            lock_timeout: self.lock_timeout,
        }
    }
}

impl<S, E, L, C> RequestProcessor<S, E, L, C>
where
    S: Storage,
    E: TransformEngine,
    L: Lock,
    C: ResponseCache,
{
    /// Creates a request processor from its collaborators.
    pub fn new(
        config: ServerConfig,
        storage: Arc<S>,
        engine: Arc<E>,
        collapse: Arc<L>,
        throttler: Arc<Throttler>,
        cache: Arc<C>,
        plugins: PluginsManager,
    ) -> Self {
        let process_timeout = config.request_timeout;
        let lock_timeout = process_timeout.saturating_sub(Duration::from_secs(1));
        Self {
            storage,
            engine,
            collapse,
            cache,
            throttler,
            plugins: Arc::new(plugins),
            config: Arc::new(config),
            process_timeout,
            lock_timeout,
        }
    }

    /// Handles one request and produces its response.
    ///
    /// The whole pipeline runs under a deadline derived from the request's
    /// cancellation token; on expiry the caller gets a `499` and in-flight
    /// workers release their responses.
    pub async fn process(&self, request: Request, mut obj: FileObject) -> Response {
        let cancel = request.cancel.child_token();
        obj.attach_context(cancel.clone());

        self.plugins.pre_process(&mut obj, &request);

        let request = Arc::new(request);
        let obj = Arc::new(obj);
        let (tx, rx) = oneshot::channel::<Response>();

        {
            let this = self.clone();
            let request = Arc::clone(&request);
            let obj = Arc::clone(&obj);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut res = this.dispatch(&request, &obj).await;
                // The orchestrator may have observed the deadline while we
                // worked; probe before the handoff so the response is closed
                // rather than parked in a channel nobody drains.
                if cancel.is_cancelled() {
                    res.close();
                    return;
                }
                if let Err(mut res) = tx.send(res) {
                    res.close();
                }
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(bucket = %obj.bucket, key = %obj.key, "request context canceled");
                self.reply_with_error(&obj, 499, ProcessError::ContextCanceled)
            }
            _ = tokio::time::sleep(self.process_timeout) => {
                cancel.cancel();
                warn!(bucket = %obj.bucket, key = %obj.key, "process timeout");
                self.reply_with_error(&obj, 499, ProcessError::ContextCanceled)
            }
            res = rx => match res {
                Ok(mut res) => {
                    self.plugins.post_process(&obj, &request, &mut res);
                    res
                }
                Err(_) => {
                    // worker dropped its sender without a response
                    cancel.cancel();
                    self.reply_with_error(&obj, 499, ProcessError::ContextCanceled)
                }
            },
        }
    }

    /// Dispatches by method and runs the GET pipeline.
    async fn dispatch(&self, req: &Request, obj: &FileObject) -> Response {
        match req.method.as_str() {
            "GET" | "HEAD" => {
                if obj.key.is_empty() {
                    return self.handle_bucket_list(req, obj).await;
                }

                if let Some(res) = self.cache.get(obj) {
                    info!(bucket = %obj.bucket, key = %obj.key, "response cache hit");
                    return res;
                }

                let mut res = if obj.has_transform() {
                    self.collapse_get(obj).await
                } else {
                    self.handle_get(obj).await
                };

                self.update_headers(obj, &mut res, req.authenticated);
                self.schedule_cache_set(obj, &mut res).await;
                res
            }
            "PUT" => {
                let invalidate = self.spawn_invalidate(obj);
                let res = self.handle_put(req, obj).await;
                let _ = invalidate.await;
                res
            }
            "DELETE" => {
                let invalidate = self.spawn_invalidate(obj);
                let res = self.storage.delete(obj).await;
                let _ = invalidate.await;
                res
            }
            _ => Response::from_error(405, ProcessError::MethodNotAllowed),
        }
    }

    async fn handle_put(&self, req: &Request, obj: &FileObject) -> Response {
        let body = req
            .take_body()
            .unwrap_or_else(|| Body::from_bytes(Bytes::new()));
        self.storage
            .set(obj, &req.headers, req.content_length, body)
            .await
    }

    /// Invalidates the cache entry concurrently with the storage operation.
    /// The caller joins the handle before returning, so the invalidation
    /// happens-before the response reaches the client.
    fn spawn_invalidate(&self, obj: &FileObject) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let obj = obj.clone();
        tokio::spawn(async move {
            cache.delete(&obj);
        })
    }

    /// Copies a cacheable response and populates the cache off the request
    /// path.
    async fn schedule_cache_set(&self, obj: &FileObject, res: &mut Response) {
        if !res.is_cacheable()
            || res.content_length < 0
            || res.content_length >= self.config.cache.max_item_size
        {
            return;
        }

        match res.to_buffered().await {
            Ok(buffered) => {
                let cache = Arc::clone(&self.cache);
                let obj = obj.clone();
                tokio::spawn(async move {
                    if let Err(err) = cache.set(&obj, buffered) {
                        error!(bucket = %obj.bucket, key = %obj.key, error = %err, "response cache set failed");
                    }
                });
            }
            Err(err) => {
                warn!(bucket = %obj.bucket, key = %obj.key, error = %err, "could not buffer response for caching");
            }
        }
    }

    /// Builds an error response, substituting the configured placeholder
    /// image when the request asked for a transform.
    ///
    /// The placeholder keeps the original status code. A transformed variant
    /// is rendered asynchronously under the collapse lock and cached for
    /// subsequent errors; the current caller gets the raw placeholder bytes
    /// immediately.
    fn reply_with_error(&self, obj: &FileObject, status: u16, err: ProcessError) -> Response {
        let Some(placeholder) = self.config.placeholder.as_ref() else {
            return Response::from_error(status, &err);
        };
        if !obj.has_transform() || obj.debug {
            return Response::from_error(status, &err);
        }

        let error_obj = match FileObject::error_object(&placeholder.path, obj) {
            Ok(error_obj) => error_obj,
            Err(_) => return Response::from_error(status, &err),
        };

        if let Some(mut cached) = self.cache.get(&error_obj) {
            cached.status = status;
            return cached;
        }

        self.spawn_placeholder_render(obj, error_obj, status, placeholder.buf.clone());

        let mut res = Response::new_buf(status, placeholder.buf.clone());
        res.set_content_type(&placeholder.content_type);
        res
    }

    fn spawn_placeholder_render(
        &self,
        obj: &FileObject,
        error_obj: FileObject,
        status: u16,
        placeholder_buf: Bytes,
    ) {
        let this = self.clone();
        let obj = obj.clone();
        tokio::spawn(async move {
            match this.collapse.lock(&error_obj.key) {
                LockOutcome::Acquired => {
                    info!(key = %error_obj.key, "lock acquired for error response");
                    let parent = Response::new_buf(200, placeholder_buf);
                    let chains = vec![obj.transforms.clone()];

                    match this.engine.process(&obj, parent, &chains).await {
                        Ok(mut res) => {
                            res.status = status;
                            this.update_headers(&error_obj, &mut res, false);
                            match res.to_buffered().await {
                                Ok(buffered) => {
                                    if let Err(err) = this.cache.set(&error_obj, buffered) {
                                        error!(key = %error_obj.key, error = %err, "error response cache set failed");
                                    }
                                }
                                Err(err) => {
                                    warn!(key = %error_obj.key, error = %err, "could not buffer placeholder response");
                                }
                            }
                        }
                        Err(err) => {
                            warn!(key = %error_obj.key, error = %err, "placeholder transform failed");
                        }
                    }
                    this.collapse.release(&error_obj.key);
                }
                LockOutcome::Waiting(rx) => {
                    // another request is already rendering this variant; the
                    // caller holds the raw placeholder, so withdraw
                    drop(rx);
                }
            }
        });
    }
}
