//! The transform engine interface.
//!
//! The engine maps source bytes plus a merged transform chain to derivative
//! bytes. It is an external collaborator (the real implementation wraps an
//! imaging library); the core treats it as opaque and only relies on this
//! contract.

use crate::object::FileObject;
use crate::response::Response;
use crate::transforms::TransformChain;
use std::future::Future;
use thiserror::Error;

/// Errors a transform engine can report.
///
/// The processor turns these into `400` responses with the merged transform
/// chain tagged for observability.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("image encode failed: {0}")]
    Encode(String),
}

/// Applies transform chains to source images.
pub trait TransformEngine: Send + Sync + 'static {
    /// Consumes the parent response (the source bytes) and produces the
    /// derivative response for `obj`.
    ///
    /// The chains in `transforms` are already merged into application order.
    fn process(
        &self,
        obj: &FileObject,
        parent: Response,
        transforms: &[TransformChain],
    ) -> impl Future<Output = Result<Response, EngineError>> + Send;
}
