// lib.rs
//
// pixel-press: on-device image conversion, compression and cropping.
//
// Design goals:
// - Pixels that display the way the camera meant (EXIF orientation)
// - Quality floors so no tool silently degrades an image
// - Outputs that never grow a PNG on recompression
// - One file failing never takes a batch down with it

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod crop;
pub mod engine;
pub mod error;
pub mod ops;

pub use crop::{CropConstraints, CropEditor, Gesture, Handle, PixelRect, Point, Rect, Viewport};
pub use engine::{
    BatchItem, BatchReport, DecodeStrategy, ImageProcessor, InputFile, OptimizeStatus, Orientation,
    PipelineConfig, ProcessingResult, QualityPolicy, SharpenConfig, Source,
};
pub use error::{ErrorCategory, PixelPressError, Result};
pub use ops::{FitMode, OutputFormat, Preset, TransformOptions, UseCase};

/// Library version.
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Input formats the decoder accepts.
pub fn supported_input_formats() -> Vec<&'static str> {
    vec!["jpeg", "png", "webp", "bmp", "tiff"]
}

/// Output formats the encoder produces.
pub fn supported_output_formats() -> Vec<&'static str> {
    OutputFormat::ALL.iter().map(|f| f.as_str()).collect()
}

/// Metrics payload version.
pub const PROCESSING_METRICS_VERSION: &str = "1.0.0";

/// Per-call timings and sizes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingMetrics {
    /// Schema version for compatibility negotiation
    pub version: String,
    /// Decode stage duration in milliseconds
    pub decode_ms: f64,
    /// Transform (orient, crop, fit, sharpen) duration in milliseconds
    pub transform_ms: f64,
    /// Encode stage duration in milliseconds
    pub encode_ms: f64,
    /// Total wall-clock duration in milliseconds
    pub total_ms: f64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// bytes_out / bytes_in
    pub compression_ratio: f64,
    /// Detected input format (lowercase: jpeg, png, webp, bmp, tiff)
    pub format_in: Option<String>,
    pub format_out: String,
    /// True when an ICC profile was carried into the output
    pub icc_preserved: bool,
    /// True when a PNG re-encode came out larger and the input bytes were kept
    pub kept_original: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_supported_formats() {
        assert!(supported_input_formats().contains(&"bmp"));
        assert_eq!(supported_output_formats(), vec!["jpeg", "png", "webp"]);
    }

    #[test]
    fn test_default_metrics_are_empty() {
        let m = ProcessingMetrics::default();
        assert_eq!(m.bytes_in, 0);
        assert!(m.format_in.is_none());
        assert!(!m.kept_original);
    }
}
