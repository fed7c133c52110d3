//! Pixgate - on-demand image transformation and delivery for object storage.
//!
//! This library is the request-processing core of an image delivery service
//! that sits in front of durable object storage. For every request it decides
//! whether the requested derivative already exists, fetches or constructs it,
//! and streams the result back to the caller.
//!
//! # Architecture
//!
//! ```text
//! Request → RequestProcessor → Response cache → [hit] → Response
//!                            → [miss] → Collapse lock → Storage fetch
//!                                                     → Transform engine
//!                                                     → Background store
//! ```
//!
//! The HTTP front-end, the transform engine, and the storage backends are
//! external collaborators consumed through the [`storage::Storage`],
//! [`engine::TransformEngine`], [`lock::Lock`], and [`cache::ResponseCache`]
//! traits. The [`processor::RequestProcessor`] wires them together and owns
//! the per-request deadline, request collapsing, transform throttling, and
//! asynchronous cache population.

pub mod cache;
pub mod config;
pub mod engine;
pub mod lock;
pub mod logging;
pub mod object;
pub mod plugins;
pub mod processor;
pub mod request;
pub mod response;
pub mod storage;
pub mod throttler;
pub mod transforms;

/// Version of the pixgate library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
