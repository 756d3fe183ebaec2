// src/engine.rs
//
// The image engine. One call runs decode -> transform -> encode in
// sequence; the submodules below each own one stage or one supporting
// concern, and ImageProcessor (api.rs) ties them together.

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub mod api;
pub mod batch;
pub mod common;
pub mod decoder;
pub mod encoder;
pub mod io;
pub mod metadata;
pub mod optimizer;
pub mod orientation;
pub mod pipeline;
pub mod policy;
pub mod pool;
pub mod preview;
pub mod quantize;
pub mod sharpen;
pub mod tasks;

pub use api::{ImageProcessor, OptimizedResult, PendingProcess, ProcessingResult};
pub use batch::{process_batch, BatchItem, BatchReport, MAX_BATCH_FILES};
pub use decoder::{check_dimensions, decode, inspect_header, DecodedImage, ImageInfo};
pub use encoder::{encode, encode_with, never_regress, PngMode, QualitySettings};
pub use io::{extract_icc_profile, InputFile, Source};
pub use metadata::{inspect_exif, strip_exif_lossless, ExifEntry, ExifSummary};
pub use optimizer::{optimize_png_to_size, optimize_to_size, OptimizeOutcome, OptimizeStatus};
pub use orientation::{
    get_oriented_dimensions, read_orientation, Orientation, ORIENTATION_SCAN_LIMIT,
};
pub use pipeline::{apply_transform, calc_resize_dimensions, plan_draw, DrawPlan, TransformedImage};
pub use policy::{DecodeStrategy, PipelineConfig, QualityPolicy, SharpenConfig};
pub use pool::BATCH_CONCURRENCY;
pub use preview::ObjectUrlRegistry;
pub use tasks::{write_atomic, PendingResult, ProcessTask, TaskOutput};
