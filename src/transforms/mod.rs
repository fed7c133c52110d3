//! Transform chains: the ordered operations a derivative applies to its
//! parent image.
//!
//! A [`TransformChain`] is built through validating methods, hashed into a
//! stable content key for derivative lookup, and merged with the chains of
//! ancestor objects before being handed to the transform engine. The engine
//! itself is an external collaborator; this module only models the
//! operations.

use rustc_hash::FxHasher;
use std::hash::Hasher;
use thiserror::Error;

/// Watermark anchor positions accepted by [`TransformChain::watermark`].
const WATERMARK_POSITIONS: &[&str] = &[
    "top-left",
    "top-center",
    "top-right",
    "center-left",
    "center",
    "center-right",
    "bottom-left",
    "bottom-center",
    "bottom-right",
];

/// Output formats accepted by [`TransformChain::format`].
const FORMATS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "tiff", "bmp"];

/// Errors from building a transform chain.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("invalid quality {0}, expected 0-100")]
    InvalidQuality(u8),

    #[error("unsupported format {0:?}")]
    UnsupportedFormat(String),

    #[error("invalid blur sigma {0}")]
    InvalidBlur(f32),

    #[error("invalid watermark position {0:?}")]
    InvalidWatermarkPosition(String),

    #[error("invalid watermark opacity {0}, expected 0.0-1.0")]
    InvalidWatermarkOpacity(f32),
}

/// A single transform operation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    Resize {
        width: u32,
        height: u32,
        outbound: bool,
    },
    Crop {
        width: u32,
        height: u32,
        outbound: bool,
    },
    Quality(u8),
    Interlace,
    StripMetadata,
    Format(String),
    Blur {
        sigma: f32,
        min_ampl: f32,
    },
    Watermark {
        image: String,
        position: String,
        opacity: f32,
    },
}

impl TransformOp {
    /// Feeds the operation into a hasher. Floats hash by bit pattern so the
    /// result is deterministic for equal inputs.
    fn hash_into(&self, hasher: &mut impl Hasher) {
        match self {
            TransformOp::Resize {
                width,
                height,
                outbound,
            } => {
                hasher.write_u8(1);
                hasher.write_u32(*width);
                hasher.write_u32(*height);
                hasher.write_u8(*outbound as u8);
            }
            TransformOp::Crop {
                width,
                height,
                outbound,
            } => {
                hasher.write_u8(2);
                hasher.write_u32(*width);
                hasher.write_u32(*height);
                hasher.write_u8(*outbound as u8);
            }
            TransformOp::Quality(q) => {
                hasher.write_u8(3);
                hasher.write_u8(*q);
            }
            TransformOp::Interlace => hasher.write_u8(4),
            TransformOp::StripMetadata => hasher.write_u8(5),
            TransformOp::Format(f) => {
                hasher.write_u8(6);
                hasher.write(f.as_bytes());
            }
            TransformOp::Blur { sigma, min_ampl } => {
                hasher.write_u8(7);
                hasher.write_u32(sigma.to_bits());
                hasher.write_u32(min_ampl.to_bits());
            }
            TransformOp::Watermark {
                image,
                position,
                opacity,
            } => {
                hasher.write_u8(8);
                hasher.write(image.as_bytes());
                hasher.write(position.as_bytes());
                hasher.write_u32(opacity.to_bits());
            }
        }
    }
}

/// An ordered list of transform operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformChain {
    ops: Vec<TransformOp>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the chain carries at least one operation.
    pub fn not_empty(&self) -> bool {
        !self.ops.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[TransformOp] {
        &self.ops
    }

    /// Appends a resize operation.
    pub fn resize(&mut self, width: u32, height: u32, outbound: bool) -> Result<(), TransformError> {
        if width == 0 && height == 0 {
            return Err(TransformError::InvalidDimensions { width, height });
        }
        self.ops.push(TransformOp::Resize {
            width,
            height,
            outbound,
        });
        Ok(())
    }

    /// Appends a crop operation.
    pub fn crop(&mut self, width: u32, height: u32, outbound: bool) -> Result<(), TransformError> {
        if width == 0 || height == 0 {
            return Err(TransformError::InvalidDimensions { width, height });
        }
        self.ops.push(TransformOp::Crop {
            width,
            height,
            outbound,
        });
        Ok(())
    }

    /// Appends an output-quality operation.
    pub fn quality(&mut self, quality: u8) -> Result<(), TransformError> {
        if quality > 100 {
            return Err(TransformError::InvalidQuality(quality));
        }
        self.ops.push(TransformOp::Quality(quality));
        Ok(())
    }

    /// Enables progressive encoding.
    pub fn interlace(&mut self) -> Result<(), TransformError> {
        self.ops.push(TransformOp::Interlace);
        Ok(())
    }

    /// Drops EXIF and other metadata from the output.
    pub fn strip_metadata(&mut self) -> Result<(), TransformError> {
        self.ops.push(TransformOp::StripMetadata);
        Ok(())
    }

    /// Appends an output-format conversion.
    pub fn format(&mut self, format: &str) -> Result<(), TransformError> {
        let format = format.to_ascii_lowercase();
        if !FORMATS.contains(&format.as_str()) {
            return Err(TransformError::UnsupportedFormat(format));
        }
        self.ops.push(TransformOp::Format(format));
        Ok(())
    }

    /// Appends a gaussian blur.
    pub fn blur(&mut self, sigma: f32, min_ampl: f32) -> Result<(), TransformError> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(TransformError::InvalidBlur(sigma));
        }
        self.ops.push(TransformOp::Blur { sigma, min_ampl });
        Ok(())
    }

    /// Appends a watermark overlay.
    pub fn watermark(
        &mut self,
        image: &str,
        position: &str,
        opacity: f32,
    ) -> Result<(), TransformError> {
        if !WATERMARK_POSITIONS.contains(&position) {
            return Err(TransformError::InvalidWatermarkPosition(position.to_string()));
        }
        if !(0.0..=1.0).contains(&opacity) {
            return Err(TransformError::InvalidWatermarkOpacity(opacity));
        }
        self.ops.push(TransformOp::Watermark {
            image: image.to_string(),
            position: position.to_string(),
            opacity,
        });
        Ok(())
    }

    /// Content hash of the chain, used to derive derivative keys.
    ///
    /// Deterministic for equal chains within and across processes.
    pub fn hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        for op in &self.ops {
            op.hash_into(&mut hasher);
        }
        hasher.finish()
    }
}

/// Merges the transform chains collected while walking a derivative's parent
/// chain.
///
/// `chains` is in child-first order (the order the parent walk discovers
/// them). The merge reverses that into application order, so the root's
/// operations run first and each descendant composes over its ancestor, then
/// collapses composable neighbors:
///
/// - consecutive resizes keep the final geometry
/// - repeated scalar operations (quality, format) keep the last value
/// - repeated flag operations (interlace, strip) deduplicate
pub fn merge(chains: &[TransformChain]) -> Vec<TransformChain> {
    let mut merged: Vec<TransformOp> = Vec::new();

    for chain in chains.iter().rev() {
        for op in chain.ops() {
            match (merged.last_mut(), op) {
                (Some(last @ TransformOp::Resize { .. }), TransformOp::Resize { .. })
                | (Some(last @ TransformOp::Quality(_)), TransformOp::Quality(_))
                | (Some(last @ TransformOp::Format(_)), TransformOp::Format(_)) => {
                    *last = op.clone();
                }
                (Some(TransformOp::Interlace), TransformOp::Interlace)
                | (Some(TransformOp::StripMetadata), TransformOp::StripMetadata) => {}
                _ => merged.push(op.clone()),
            }
        }
    }

    vec![TransformChain { ops: merged }]
}
