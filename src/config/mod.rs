//! Server and bucket configuration.
//!
//! These are pure data types with no parsing logic; the front-end owns
//! loading and validation and hands the processor a ready value object.

use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

/// Default deadline for a single request, end to end.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default cap on the size of a single cached response body.
pub const DEFAULT_MAX_CACHE_ITEM_SIZE: i64 = 5 * 1024 * 1024;

/// Default total size of the in-memory response cache.
pub const DEFAULT_CACHE_SIZE_BYTES: usize = 50 * 1024 * 1024;

/// Default number of transforms allowed to run concurrently.
///
/// Transform work is CPU-bound, so the default tracks the core count.
pub fn default_transform_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

/// Complete server configuration consumed by the request processor.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Deadline for processing a single request.
    pub request_timeout: Duration,
    /// Capacity of the transform throttler.
    pub transform_concurrency: usize,
    /// Response cache limits.
    pub cache: CacheConfig,
    /// Fallback image served in place of raw error responses.
    pub placeholder: Option<Placeholder>,
    /// Bucket configurations keyed by bucket name.
    pub buckets: HashMap<String, BucketConfig>,
    /// Per-status-code header policies.
    pub headers: Vec<HeaderPolicy>,
    /// Debug mode disables placeholder substitution so raw errors surface.
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transform_concurrency: default_transform_concurrency(),
            cache: CacheConfig::default(),
            placeholder: None,
            buckets: HashMap::new(),
            headers: Vec::new(),
            debug: false,
        }
    }
}

/// Response cache limits.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Responses with a known content length above this are never cached.
    pub max_item_size: i64,
    /// Total size budget for cached response bodies.
    pub max_size_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_item_size: DEFAULT_MAX_CACHE_ITEM_SIZE,
            max_size_bytes: DEFAULT_CACHE_SIZE_BYTES,
        }
    }
}

/// A configured fallback image for error responses.
///
/// The bytes are loaded by the front-end at startup; the core only serves
/// them.
#[derive(Debug, Clone)]
pub struct Placeholder {
    /// Source path or URL the placeholder was loaded from. Used to derive
    /// cache keys for transformed variants.
    pub path: String,
    /// Raw image bytes.
    pub buf: Bytes,
    /// Content type of `buf`.
    pub content_type: String,
}

/// Per-bucket configuration.
#[derive(Debug, Clone, Default)]
pub struct BucketConfig {
    /// Default response headers, applied where the response does not already
    /// define the header.
    pub headers: HashMap<String, String>,
    /// Transform policy; buckets without one serve objects verbatim.
    pub transform: Option<TransformPolicy>,
}

/// How derivatives are keyed and where their parents live.
#[derive(Debug, Clone, Default)]
pub struct TransformPolicy {
    /// Named transform presets referenced by URL patterns.
    pub presets: HashMap<String, Preset>,
    /// Bucket holding the source objects.
    pub parent_bucket: String,
    /// Storage binding for the source objects.
    pub parent_storage: String,
    /// Derivative key derivation scheme.
    pub result_key: ResultKey,
    /// Issue a concurrent existence check on the parent for every
    /// derivative GET.
    pub check_parent: bool,
}

/// Derivative cache/storage key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultKey {
    /// Keep the key parsed from the request path.
    #[default]
    Original,
    /// Key derived from the transform-chain hash merged with the parent key.
    Hash,
}

/// A named transform chain definition.
#[derive(Debug, Clone)]
pub struct Preset {
    /// Output quality, 0-100.
    pub quality: u8,
    /// Output format override (e.g. "webp").
    pub format: Option<String>,
    /// Filter set applied in a fixed order.
    pub filters: Filters,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            quality: 80,
            format: None,
            filters: Filters::default(),
        }
    }
}

/// Filters a preset may enable.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub thumbnail: Option<Geometry>,
    pub smart_crop: Option<Geometry>,
    pub crop: Option<Geometry>,
    pub interlace: bool,
    pub strip: bool,
    pub blur: Option<Blur>,
    pub watermark: Option<Watermark>,
}

/// Target geometry for resize and crop filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub mode: FitMode,
}

/// How a geometry fits the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Fit inside the box, preserving aspect ratio.
    #[default]
    Inbound,
    /// Cover the box, cropping overflow.
    Outbound,
}

/// Gaussian blur parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blur {
    pub sigma: f32,
    pub min_ampl: f32,
}

/// Watermark overlay parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub image: String,
    pub position: String,
    pub opacity: f32,
}

/// Binding to one storage backend from a bucket's configured set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageBinding {
    /// Backend kind tag (e.g. "local", "s3").
    pub kind: String,
    /// Backend-specific root: a directory, a bucket name, an endpoint.
    pub root: String,
}

/// Header policy applied by response status code.
#[derive(Debug, Clone, Default)]
pub struct HeaderPolicy {
    /// Status codes this policy applies to.
    pub status_codes: Vec<u16>,
    /// Header values to apply.
    pub values: HashMap<String, String>,
    /// Overwrite headers the response already defines instead of filling
    /// gaps only.
    pub override_headers: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.cache.max_item_size, DEFAULT_MAX_CACHE_ITEM_SIZE);
        assert!(config.placeholder.is_none());
        assert!(!config.debug);
        assert!(config.transform_concurrency >= 1);
    }

    #[test]
    fn test_preset_default_quality() {
        let preset = Preset::default();
        assert_eq!(preset.quality, 80);
        assert!(preset.format.is_none());
    }

    #[test]
    fn test_result_key_default() {
        assert_eq!(ResultKey::default(), ResultKey::Original);
    }
}
