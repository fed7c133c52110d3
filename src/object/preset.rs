//! Preset-to-transform-chain conversion.
//!
//! Presets are named transform definitions from bucket configuration. The
//! conversion result is memoized process-wide because presets do not change
//! between requests; the memo map is behind an `RwLock` since parses can
//! race on a cold name.

use crate::config::{FitMode, Preset};
use crate::transforms::{TransformChain, TransformError};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

static PRESET_CACHE: OnceLock<RwLock<HashMap<String, TransformChain>>> = OnceLock::new();

fn cache() -> &'static RwLock<HashMap<String, TransformChain>> {
    PRESET_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Returns the transform chain for a named preset, converting and memoizing
/// it on first use.
pub fn transforms_for(name: &str, preset: &Preset) -> Result<TransformChain, TransformError> {
    if let Some(chain) = cache().read().unwrap().get(name) {
        return Ok(chain.clone());
    }

    let chain = preset_to_chain(preset)?;
    cache()
        .write()
        .unwrap()
        .insert(name.to_string(), chain.clone());
    Ok(chain)
}

/// Converts a preset definition into a transform chain, filter by filter.
fn preset_to_chain(preset: &Preset) -> Result<TransformChain, TransformError> {
    let mut chain = TransformChain::new();
    let filters = &preset.filters;

    if let Some(thumbnail) = &filters.thumbnail {
        chain.resize(
            thumbnail.width,
            thumbnail.height,
            thumbnail.mode == FitMode::Outbound,
        )?;
    }

    if let Some(smart_crop) = &filters.smart_crop {
        chain.crop(
            smart_crop.width,
            smart_crop.height,
            smart_crop.mode == FitMode::Outbound,
        )?;
    }

    if let Some(crop) = &filters.crop {
        chain.crop(crop.width, crop.height, crop.mode == FitMode::Outbound)?;
    }

    chain.quality(preset.quality)?;

    if filters.interlace {
        chain.interlace()?;
    }

    if filters.strip {
        chain.strip_metadata()?;
    }

    if let Some(format) = &preset.format {
        chain.format(format)?;
    }

    if let Some(blur) = &filters.blur {
        chain.blur(blur.sigma, blur.min_ampl)?;
    }

    if let Some(watermark) = &filters.watermark {
        chain.watermark(&watermark.image, &watermark.position, watermark.opacity)?;
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Blur, Filters, Geometry};
    use crate::transforms::TransformOp;

    fn small_preset() -> Preset {
        Preset {
            quality: 75,
            format: Some("webp".to_string()),
            filters: Filters {
                thumbnail: Some(Geometry {
                    width: 100,
                    height: 100,
                    mode: FitMode::Outbound,
                }),
                interlace: true,
                ..Filters::default()
            },
        }
    }

    #[test]
    fn test_preset_to_chain_op_order() {
        let chain = preset_to_chain(&small_preset()).unwrap();
        assert_eq!(
            chain.ops(),
            &[
                TransformOp::Resize {
                    width: 100,
                    height: 100,
                    outbound: true
                },
                TransformOp::Quality(75),
                TransformOp::Interlace,
                TransformOp::Format("webp".to_string()),
            ]
        );
    }

    #[test]
    fn test_preset_blur_and_strip() {
        let preset = Preset {
            filters: Filters {
                strip: true,
                blur: Some(Blur {
                    sigma: 2.0,
                    min_ampl: 0.1,
                }),
                ..Filters::default()
            },
            ..Preset::default()
        };
        let chain = preset_to_chain(&preset).unwrap();
        assert!(chain
            .ops()
            .iter()
            .any(|op| matches!(op, TransformOp::StripMetadata)));
        assert!(chain
            .ops()
            .iter()
            .any(|op| matches!(op, TransformOp::Blur { .. })));
    }

    #[test]
    fn test_invalid_preset_propagates_error() {
        let preset = Preset {
            format: Some("heic".to_string()),
            ..Preset::default()
        };
        assert!(preset_to_chain(&preset).is_err());
    }

    #[test]
    fn test_transforms_for_memoizes() {
        let preset = small_preset();
        let first = transforms_for("memo-test-small", &preset).unwrap();

        // a different definition under the same name returns the memo
        let changed = Preset {
            quality: 10,
            ..small_preset()
        };
        let second = transforms_for("memo-test-small", &changed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_transforms_for_concurrent_access() {
        let preset = small_preset();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let preset = preset.clone();
                std::thread::spawn(move || transforms_for("memo-test-concurrent", &preset).unwrap())
            })
            .collect();

        let chains: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(chains.windows(2).all(|w| w[0] == w[1]));
    }
}
