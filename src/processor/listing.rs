//! Bucket-listing requests (GET with an empty object key).

use super::RequestProcessor;
use crate::cache::ResponseCache;
use crate::engine::TransformEngine;
use crate::lock::Lock;
use crate::object::FileObject;
use crate::request::Request;
use crate::response::Response;
use crate::storage::{ListOptions, Storage};

/// Fixed body answered for `?location` queries.
const S3_LOCATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><LocationConstraint xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">EU</LocationConstraint>";

impl<S, E, L, C> RequestProcessor<S, E, L, C>
where
    S: Storage,
    E: TransformEngine,
    L: Lock,
    C: ResponseCache,
{
    /// Answers a bucket-listing request: the fixed location XML for
    /// `?location`, otherwise the storage listing bounded by the query.
    pub(super) async fn handle_bucket_list(&self, req: &Request, obj: &FileObject) -> Response {
        if req.has_query("location") {
            let mut res = Response::new_string(200, S3_LOCATION);
            res.set_content_type("application/xml");
            return res;
        }

        let mut opts = ListOptions::default();
        if let Some(value) = req.query_param("max-keys") {
            // a malformed value resets the limit to 0 rather than keeping
            // the default
            opts.max_keys = value.parse().unwrap_or(0);
        }
        if let Some(value) = req.query_param("delimeter") {
            opts.delimeter = value.to_string();
        }
        if let Some(value) = req.query_param("prefix") {
            opts.prefix = value.to_string();
        }
        if let Some(value) = req.query_param("marker") {
            opts.marker = value.to_string();
        }

        self.storage.list(obj, opts).await
    }
}
