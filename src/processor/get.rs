//! The GET pipeline: direct fetch, request collapsing, not-found recovery,
//! and transform execution.

use super::{ProcessError, RequestProcessor};
use crate::cache::ResponseCache;
use crate::engine::TransformEngine;
use crate::lock::{Lock, LockOutcome};
use crate::object::FileObject;
use crate::response::{Body, Response, ResponseError};
use crate::storage::Storage;
use crate::transforms::{self, TransformChain};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

impl<S, E, L, C> RequestProcessor<S, E, L, C>
where
    S: Storage,
    E: TransformEngine,
    L: Lock,
    C: ResponseCache,
{
    /// Collapsed GET for transformed objects, keyed by the object key.
    ///
    /// The winner performs the full fetch and broadcasts; waiters wait for
    /// the broadcast, fall back to fetching locally when the winner released
    /// without one, and give up at the lock timeout after a last-chance
    /// cache lookup.
    pub(super) async fn collapse_get(&self, obj: &FileObject) -> Response {
        match self.collapse.lock(&obj.key) {
            LockOutcome::Acquired => {
                info!(bucket = %obj.bucket, key = %obj.key, "lock acquired");
                let mut res = self.handle_get(obj).await;
                self.collapse.notify_and_release(&obj.key, &mut res).await;
                res
            }
            LockOutcome::Waiting(mut rx) => {
                info!(bucket = %obj.bucket, key = %obj.key, "lock not acquired, waiting for winner");
                let ctx = obj.ctx();

                // returning from any branch drops the receiver, which
                // withdraws this waiter without affecting the rest
                tokio::select! {
                    _ = ctx.cancelled() => {
                        self.reply_with_error(obj, 504, ProcessError::ContextCanceled)
                    }
                    outcome = rx.recv() => match outcome {
                        Ok(buffered) => buffered.into_response(),
                        // winner released without a broadcast: do the work
                        // locally
                        Err(_) => self.handle_get(obj).await,
                    },
                    _ = tokio::time::sleep(self.lock_timeout) => {
                        if let Some(cached) = self.cache.get(obj) {
                            return cached;
                        }
                        self.reply_with_error(obj, 504, ProcessError::Timeout)
                    }
                }
            }
        }
    }

    /// Direct GET: fetch the object and, when requested, check the root
    /// parent concurrently.
    pub(super) async fn handle_get(&self, obj: &FileObject) -> Response {
        let ctx = obj.ctx().clone();

        // walk to the root parent, collecting transform chains child-first
        let mut transforms_tab: Vec<TransformChain> = Vec::new();
        let mut curr = obj;
        while let Some(parent) = curr.parent.as_deref() {
            if curr.has_transform() {
                transforms_tab.push(curr.transforms.clone());
            }
            curr = parent;
        }
        let parent_obj: Option<FileObject> = if std::ptr::eq(curr, obj) {
            None
        } else {
            Some(curr.clone())
        };

        let (res_tx, mut res_rx) = mpsc::channel::<Response>(1);
        {
            let storage = Arc::clone(&self.storage);
            let obj = obj.clone();
            let ctx = ctx.clone();
            let tx = res_tx.clone();
            tokio::spawn(async move {
                let mut res = storage.get(&obj).await;
                // Checking cancellation and sending in one select would
                // deliver the response about half the time even after
                // cancellation; probe first, then attempt a non-blocking
                // send, and close whatever cannot be delivered.
                if ctx.is_cancelled() {
                    res.close();
                    return;
                }
                if let Err(TrySendError::Full(mut res) | TrySendError::Closed(mut res)) =
                    tx.try_send(res)
                {
                    res.close();
                }
            });
        }

        let (parent_tx, mut parent_rx) = mpsc::channel::<Response>(1);
        match (obj.check_parent, parent_obj.clone()) {
            (true, Some(parent)) => {
                let storage = Arc::clone(&self.storage);
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = ctx.cancelled() => {}
                        res = storage.head(&parent) => {
                            let _ = parent_tx.send(res).await;
                        }
                    }
                });
            }
            _ => drop(parent_tx),
        }

        let mut parent_res: Option<Response> = None;
        let mut requeued = false;

        loop {
            // biased so a parent 404 already delivered always wins over a
            // simultaneously ready object result
            tokio::select! {
                biased;

                _ = ctx.cancelled() => {
                    return self.reply_with_error(obj, 499, ProcessError::ContextCanceled);
                }
                Some(parent) = parent_rx.recv() => {
                    if parent.status == 404 {
                        return parent;
                    }
                    parent_res = Some(parent);
                }
                Some(res) = res_rx.recv() => {
                    if obj.check_parent && parent_obj.is_some() && parent_res.is_none() && !requeued {
                        // requeue once to give the parent check a chance to
                        // land; a second pass proceeds regardless
                        requeued = true;
                        let _ = res_tx.try_send(res);
                    } else if res.status == 404 {
                        let res = self
                            .handle_not_found(obj, parent_obj.as_ref(), &transforms_tab, parent_res.take(), res)
                            .await;
                        if ctx.is_cancelled() {
                            let mut res = res;
                            res.close();
                            return res;
                        }
                        return res;
                    } else {
                        debug!(bucket = %obj.bucket, key = %obj.key, status = res.status, "serving storage response");
                        return res;
                    }
                }
            }
        }
    }

    /// Not-found recovery: when the derivative is absent but a parent
    /// exists, transform the parent on the fly.
    async fn handle_not_found(
        &self,
        obj: &FileObject,
        parent_obj: Option<&FileObject>,
        transforms_tab: &[TransformChain],
        parent_res: Option<Response>,
        res: Response,
    ) -> Response {
        // the derivative body is not used past this point
        let mut res = res;
        res.close();

        let Some(parent_obj) = parent_obj else {
            return res;
        };

        let mut parent_res = match parent_res {
            Some(parent_res) => parent_res,
            None => self.storage.head(parent_obj).await,
        };

        if parent_res.has_error() {
            let message = parent_res
                .error_message()
                .unwrap_or("parent lookup failed")
                .to_string();
            return self.reply_with_error(obj, parent_res.status, ProcessError::Storage(message));
        }
        if parent_res.status == 404 {
            warn!(bucket = %obj.bucket, key = %obj.key, parent = %parent_obj.key, "missing parent for object");
            return parent_res;
        }

        let parent_status = parent_res.status;
        let parent_is_image = parent_res.is_image();
        parent_res.close();
        if parent_status != 200 || !parent_is_image {
            return res;
        }

        // the HEAD confirmed an image parent; now fetch the bytes
        let parent_res = self.storage.get(parent_obj).await;
        if obj.has_transform() {
            return self.process_image(obj, parent_res, transforms_tab).await;
        }
        parent_res
    }

    /// Runs the transform engine over the parent bytes under the throttler,
    /// and persists the derivative in the background.
    pub(super) async fn process_image(
        &self,
        obj: &FileObject,
        parent: Response,
        transforms_tab: &[TransformChain],
    ) -> Response {
        let Some(_permit) = self.throttler.take(obj.ctx()).await else {
            warn!(bucket = %obj.bucket, key = %obj.key, "transform throttled");
            return self.reply_with_error(obj, 503, ProcessError::Throttled);
        };

        let merged = transforms::merge(transforms_tab);
        info!(
            bucket = %obj.bucket,
            key = %obj.key,
            chains = transforms_tab.len(),
            merged_ops = merged.iter().map(|c| c.len()).sum::<usize>(),
            "performing transforms"
        );

        let mut res = match self.engine.process(obj, parent, &merged).await {
            Ok(res) => res,
            Err(err) => {
                let mut res = Response::from_error(400, &err);
                res.set_transforms(merged);
                return res;
            }
        };
        res.set_transforms(merged);

        if let Err(err) = self.store_derivative(&mut res, obj).await {
            warn!(bucket = %obj.bucket, key = %obj.key, error = %err, "failed to copy derivative for storing");
        }

        res
    }

    /// Copies the freshly produced derivative and persists it off the
    /// request path.
    async fn store_derivative(
        &self,
        res: &mut Response,
        obj: &FileObject,
    ) -> Result<(), ResponseError> {
        let copy = res.to_buffered().await?;
        let storage = Arc::clone(&self.storage);
        let obj = obj.clone();
        tokio::spawn(async move {
            let headers = copy.headers.clone();
            let content_length = copy.body.len() as i64;
            let store_res = storage
                .set(&obj, &headers, content_length, Body::from_bytes(copy.body))
                .await;
            if store_res.has_error() {
                warn!(bucket = %obj.bucket, key = %obj.key, status = store_res.status, "derivative store failed");
            } else {
                debug!(bucket = %obj.bucket, key = %obj.key, "derivative stored");
            }
        });
        Ok(())
    }
}
