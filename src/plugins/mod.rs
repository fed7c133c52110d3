//! Advisory plug-in hooks around request processing.
//!
//! Plugins observe or tweak the request descriptor before dispatch and the
//! chosen response before it returns. They are advisory: neither hook can
//! replace the response, and the processor ignores whatever they do beyond
//! the mutations they make in place.

use crate::object::FileObject;
use crate::request::Request;
use crate::response::Response;

/// A processing hook pair.
pub trait Plugin: Send + Sync {
    /// Runs before dispatch. May adjust the descriptor (e.g. rewrite the
    /// transform chain based on Accept headers).
    fn pre_process(&self, _obj: &mut FileObject, _req: &Request) {}

    /// Runs after the response is chosen, before it returns to the caller.
    fn post_process(&self, _obj: &FileObject, _req: &Request, _res: &mut Response) {}
}

/// Runs registered plugins in registration order.
#[derive(Default)]
pub struct PluginsManager {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn pre_process(&self, obj: &mut FileObject, req: &Request) {
        for plugin in &self.plugins {
            plugin.pre_process(obj, req);
        }
    }

    pub fn post_process(&self, obj: &FileObject, req: &Request, res: &mut Response) {
        for plugin in &self.plugins {
            plugin.post_process(obj, req, res);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingPlugin {
        pre: Arc<AtomicUsize>,
        post: Arc<AtomicUsize>,
    }

    impl Plugin for CountingPlugin {
        fn pre_process(&self, _obj: &mut FileObject, _req: &Request) {
            self.pre.fetch_add(1, Ordering::Relaxed);
        }

        fn post_process(&self, _obj: &FileObject, _req: &Request, _res: &mut Response) {
            self.post.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_hooks_run_for_each_plugin() {
        let pre = Arc::new(AtomicUsize::new(0));
        let post = Arc::new(AtomicUsize::new(0));

        let mut manager = PluginsManager::new();
        for _ in 0..2 {
            manager.register(Box::new(CountingPlugin {
                pre: Arc::clone(&pre),
                post: Arc::clone(&post),
            }));
        }

        let mut obj = FileObject::new("media", "/a.jpg");
        let req = Request::new(Method::GET, "/media/a.jpg");
        let mut res = Response::new(200);

        manager.pre_process(&mut obj, &req);
        manager.post_process(&obj, &req, &mut res);

        assert_eq!(pre.load(Ordering::Relaxed), 2);
        assert_eq!(post.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_empty_manager_is_noop() {
        let manager = PluginsManager::new();
        assert!(manager.is_empty());

        let mut obj = FileObject::new("media", "/a.jpg");
        let req = Request::new(Method::GET, "/media/a.jpg");
        manager.pre_process(&mut obj, &req);
    }
}
