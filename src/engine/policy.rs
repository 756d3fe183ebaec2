// src/engine/policy.rs
//
// Pipeline configuration threaded explicitly through every call:
// quality floors, sharpening and the decode strategy.

use crate::ops::{OutputFormat, UseCase};

const JPEG_FLOOR_COMPRESSION: f32 = 0.90;
const JPEG_FLOOR_CONVERSION: f32 = 0.92;
const JPEG_FLOOR_CROP: f32 = 0.98;
const WEBP_FLOOR: f32 = 0.90;
const PNG_LOSSLESS_THRESHOLD: f32 = 0.99;
const DEFAULT_SHARPEN_AMOUNT: f32 = 0.3;
const MAX_SHARPEN_AMOUNT: f32 = 2.0;

/// Fidelity-versus-size policy. One value is shared by every encode of a
/// processor so all tools agree on the same trade-off.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityPolicy {
    pub jpeg_floor_compression: f32,
    pub jpeg_floor_conversion: f32,
    pub jpeg_floor_crop: f32,
    pub webp_floor: f32,
    /// PNG compression below this quality is quantized to 256 colours.
    pub png_lossless_threshold: f32,
    /// Carry the source ICC profile into the output.
    pub preserve_icc: bool,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self::max_fidelity()
    }
}

impl QualityPolicy {
    pub fn max_fidelity() -> Self {
        Self {
            jpeg_floor_compression: JPEG_FLOOR_COMPRESSION,
            jpeg_floor_conversion: JPEG_FLOOR_CONVERSION,
            jpeg_floor_crop: JPEG_FLOOR_CROP,
            webp_floor: WEBP_FLOOR,
            png_lossless_threshold: PNG_LOSSLESS_THRESHOLD,
            preserve_icc: true,
        }
    }

    /// No floors; the requested quality is used as-is.
    pub fn unrestricted() -> Self {
        Self {
            jpeg_floor_compression: 0.0,
            jpeg_floor_conversion: 0.0,
            jpeg_floor_crop: 0.0,
            webp_floor: 0.0,
            png_lossless_threshold: PNG_LOSSLESS_THRESHOLD,
            preserve_icc: false,
        }
    }

    /// Lossless formats have no floor.
    pub fn floor(&self, format: OutputFormat, use_case: UseCase) -> f32 {
        if !format.is_lossy() {
            return 0.0;
        }
        match format {
            OutputFormat::Jpeg => match use_case {
                UseCase::Compression => self.jpeg_floor_compression,
                UseCase::Conversion | UseCase::Resize | UseCase::Preset => {
                    self.jpeg_floor_conversion
                }
                UseCase::Crop | UseCase::ExifStrip => self.jpeg_floor_crop,
            },
            _ => self.webp_floor,
        }
    }

    /// Requested quality clamped to 0..=1 and lifted to the floor.
    pub fn effective_quality(&self, format: OutputFormat, use_case: UseCase, requested: f32) -> f32 {
        let requested = if requested.is_finite() {
            requested.clamp(0.0, 1.0)
        } else {
            1.0
        };
        requested.max(self.floor(format, use_case)).min(1.0)
    }

    /// Palette quantization is a compression-tool feature only, and only
    /// for formats that can hold a palette.
    pub fn wants_quantization(&self, format: OutputFormat, use_case: UseCase, quality: f32) -> bool {
        format.can_quantize()
            && use_case == UseCase::Compression
            && quality < self.png_lossless_threshold
    }
}

/// Post-downscale sharpening.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SharpenConfig {
    /// Kernel mix; `None` disables sharpening.
    pub amount: Option<f32>,
}

impl Default for SharpenConfig {
    fn default() -> Self {
        Self {
            amount: Some(DEFAULT_SHARPEN_AMOUNT),
        }
    }
}

impl SharpenConfig {
    pub fn disabled() -> Self {
        Self { amount: None }
    }

    pub fn with_amount(amount: f32) -> Self {
        Self {
            amount: Some(amount),
        }
    }

    /// Usable mix amount, if sharpening is on.
    pub fn effective_amount(&self) -> Option<f32> {
        self.amount
            .filter(|a| a.is_finite() && *a > 0.0)
            .map(|a| a.min(MAX_SHARPEN_AMOUNT))
    }
}

/// How orientation is applied while decoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Decoder applies EXIF orientation itself; manual path only on failure.
    #[default]
    Auto,
    /// Always decode raw pixels and orient them in the transform engine.
    ManualOrientation,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PipelineConfig {
    pub quality: QualityPolicy,
    pub sharpen: SharpenConfig,
    pub decode: DecodeStrategy,
}

impl PipelineConfig {
    pub fn max_fidelity() -> Self {
        Self::default()
    }

    /// Cheap previews: no floors, no sharpening.
    pub fn fast_preview() -> Self {
        Self {
            quality: QualityPolicy::unrestricted(),
            sharpen: SharpenConfig::disabled(),
            decode: DecodeStrategy::Auto,
        }
    }

    pub fn with_quality_policy(mut self, quality: QualityPolicy) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_sharpen(mut self, sharpen: SharpenConfig) -> Self {
        self.sharpen = sharpen;
        self
    }

    pub fn with_decode_strategy(mut self, decode: DecodeStrategy) -> Self {
        self.decode = decode;
        self
    }
}
