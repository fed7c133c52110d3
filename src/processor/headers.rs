//! Header decoration for chosen responses.

use super::RequestProcessor;
use crate::cache::ResponseCache;
use crate::engine::TransformEngine;
use crate::lock::Lock;
use crate::object::FileObject;
use crate::response::Response;
use crate::storage::Storage;

impl<S, E, L, C> RequestProcessor<S, E, L, C>
where
    S: Storage,
    E: TransformEngine,
    L: Lock,
    C: ResponseCache,
{
    /// Applies bucket header defaults and per-status header policies, then
    /// forces `Cache-Control: no-cache` on authenticated listings.
    pub(super) fn update_headers(&self, obj: &FileObject, res: &mut Response, authenticated: bool) {
        if let Some(bucket) = self.config.buckets.get(&obj.bucket) {
            for (name, value) in &bucket.headers {
                if res.header(name).is_none() {
                    res.set_header(name, value);
                }
            }
        }

        // the first matching policy finishes decoration; the authenticated
        // check only applies when no policy fired
        for policy in &self.config.headers {
            if policy.status_codes.contains(&res.status) {
                for (name, value) in &policy.values {
                    if policy.override_headers || res.header(name).is_none() {
                        res.set_header(name, value);
                    }
                }
                return;
            }
        }

        if authenticated {
            res.set_header("Cache-Control", "no-cache");
        }
    }
}
