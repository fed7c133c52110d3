//! The request-scoped object descriptor.
//!
//! A [`FileObject`] is what the URL parser produces and the processor
//! consumes: the bucket, the canonical cache/storage key, the transform
//! chain, the storage binding, and - for derivatives - a back-reference to
//! the parent (source) object. Descriptors are immutable after parsing apart
//! from the cancellation context attached at dispatch time.

pub mod preset;

use crate::config::StorageBinding;
use crate::transforms::TransformChain;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from deriving objects.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// Only objects carrying transforms have a derivable error key.
    #[error("object has no transforms to derive an error object from")]
    NoTransforms,
}

/// A parsed request for an image or file.
///
/// Derivatives hold their parent for their own lifetime; the parent never
/// references its children, so there is no cycle. Only one level of
/// parentage is meaningful for transform lookup.
#[derive(Debug, Clone)]
pub struct FileObject {
    /// Logical bucket this request matched.
    pub bucket: String,
    /// Canonical cache/storage key. Empty only for bucket-listing requests.
    pub key: String,
    /// Transforms to apply when constructing the derivative.
    pub transforms: TransformChain,
    /// Storage backend binding for this object.
    pub storage: StorageBinding,
    /// Source object for a derivative.
    pub parent: Option<Box<FileObject>>,
    /// Issue a concurrent existence check on the parent during GET.
    pub check_parent: bool,
    /// Debug requests bypass placeholder substitution.
    pub debug: bool,
    /// Per-request cancellation handle, attached at dispatch time.
    ctx: CancellationToken,
}

impl FileObject {
    /// Creates a plain descriptor with no transforms and no parent.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            transforms: TransformChain::new(),
            storage: StorageBinding::default(),
            parent: None,
            check_parent: false,
            debug: false,
            ctx: CancellationToken::new(),
        }
    }

    /// True when this object is a derivative of another.
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// True when this object carries transform operations.
    pub fn has_transform(&self) -> bool {
        self.transforms.not_empty()
    }

    /// Attaches the per-request cancellation context to this object and its
    /// parent chain.
    pub fn attach_context(&mut self, ctx: CancellationToken) {
        self.ctx = ctx.clone();
        if let Some(parent) = self.parent.as_deref_mut() {
            parent.attach_context(ctx);
        }
    }

    /// The cancellation context attached at dispatch time.
    pub fn ctx(&self) -> &CancellationToken {
        &self.ctx
    }

    /// Derives a key for a transformed object from its chain hash and the
    /// parent key.
    pub fn hashed_key(transforms: &TransformChain, parent_key: &str) -> String {
        format!(
            "/{:x}-{}",
            transforms.hash(),
            parent_key.trim_start_matches('/')
        )
    }

    /// Derives the descriptor under which a transformed placeholder is
    /// cached for `obj`'s error responses.
    ///
    /// The derived object shares `obj`'s bucket, storage binding, and
    /// transforms; its key is the chain hash merged with the placeholder
    /// source name, so distinct transform chains get distinct error entries.
    pub fn error_object(placeholder_path: &str, obj: &FileObject) -> Result<FileObject, ObjectError> {
        if !obj.has_transform() {
            return Err(ObjectError::NoTransforms);
        }
        let stem = placeholder_path
            .rsplit('/')
            .next()
            .unwrap_or(placeholder_path);
        Ok(FileObject {
            bucket: obj.bucket.clone(),
            key: Self::hashed_key(&obj.transforms, stem),
            transforms: obj.transforms.clone(),
            storage: obj.storage.clone(),
            parent: None,
            check_parent: false,
            debug: false,
            ctx: obj.ctx.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformed_object() -> FileObject {
        let mut obj = FileObject::new("media", "/image.jpg-small");
        obj.transforms.resize(100, 100, false).unwrap();
        obj.parent = Some(Box::new(FileObject::new("media", "/image.jpg")));
        obj
    }

    #[test]
    fn test_plain_object_has_no_parent() {
        let obj = FileObject::new("media", "/image.jpg");
        assert!(!obj.has_parent());
        assert!(!obj.has_transform());
    }

    #[test]
    fn test_transformed_object_predicates() {
        let obj = transformed_object();
        assert!(obj.has_parent());
        assert!(obj.has_transform());
        assert!(!obj.parent.as_ref().unwrap().has_parent());
    }

    #[test]
    fn test_attach_context_reaches_parent() {
        let mut obj = transformed_object();
        let token = CancellationToken::new();
        obj.attach_context(token.clone());
        token.cancel();

        assert!(obj.ctx().is_cancelled());
        assert!(obj.parent.as_ref().unwrap().ctx().is_cancelled());
    }

    #[test]
    fn test_hashed_key_stable() {
        let obj = transformed_object();
        let a = FileObject::hashed_key(&obj.transforms, "/image.jpg");
        let b = FileObject::hashed_key(&obj.transforms, "image.jpg");
        assert_eq!(a, b);
        assert!(a.starts_with('/'));
        assert!(a.ends_with("-image.jpg"));
    }

    #[test]
    fn test_error_object_derivation() {
        let obj = transformed_object();
        let err_obj = FileObject::error_object("/assets/placeholder.png", &obj).unwrap();

        assert_eq!(err_obj.bucket, obj.bucket);
        assert!(err_obj.key.ends_with("-placeholder.png"));
        assert!(err_obj.parent.is_none());
        assert_eq!(err_obj.transforms, obj.transforms);
    }

    #[test]
    fn test_error_object_requires_transforms() {
        let obj = FileObject::new("media", "/image.jpg");
        assert!(FileObject::error_object("/placeholder.png", &obj).is_err());
    }

    #[test]
    fn test_error_object_keys_differ_by_chain() {
        let a = transformed_object();
        let mut b = transformed_object();
        b.transforms.quality(10).unwrap();

        let ka = FileObject::error_object("p.png", &a).unwrap().key;
        let kb = FileObject::error_object("p.png", &b).unwrap().key;
        assert_ne!(ka, kb);
    }
}
