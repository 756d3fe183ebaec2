// src/engine/api.rs
//
// ImageProcessor: the public facade. Each tool method builds a
// TransformOptions for its use case and runs one ProcessTask; results are
// published in the processor's object-URL registry.

use crate::crop::PixelRect;
use crate::engine::batch::{self, BatchReport};
use crate::engine::decoder::{self, ImageInfo};
use crate::engine::encoder::{encode_with, PngMode};
use crate::engine::io::InputFile;
use crate::engine::metadata::{self, ExifSummary};
use crate::engine::optimizer::{self, OptimizeStatus};
use crate::engine::orientation::{read_orientation, Orientation};
use crate::engine::policy::PipelineConfig;
use crate::engine::preview::ObjectUrlRegistry;
use crate::engine::tasks::{PendingResult, ProcessTask, TaskOutput};
use crate::error::PixelPressError;
use crate::ops::{FitMode, OutputFormat, Preset, TransformOptions, UseCase};
use crate::ProcessingMetrics;
use image::ImageFormat;
use std::sync::Arc;
use tracing::debug;

type ApiResult<T> = std::result::Result<T, PixelPressError>;

/// Requested quality for tools that do not expose a quality knob. The
/// policy floor for the use case applies on top.
const DEFAULT_TOOL_QUALITY: f32 = 0.92;

/// Encoded output of one tool call.
#[derive(Clone, Debug)]
pub struct ProcessingResult {
    pub data: Arc<Vec<u8>>,
    /// Object URL; live until `ImageProcessor::revoke`.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub size: usize,
    pub mime: &'static str,
    pub quality: f32,
    pub metrics: ProcessingMetrics,
}

/// Result of a target-size search.
#[derive(Clone, Debug)]
pub struct OptimizedResult {
    pub result: ProcessingResult,
    pub status: OptimizeStatus,
    pub attempts: u32,
}

impl OptimizedResult {
    pub fn reached(&self) -> bool {
        self.status == OptimizeStatus::TargetReached
    }
}

/// Off-thread call in flight. Dropping it discards the result.
#[derive(Debug)]
pub struct PendingProcess {
    pending: PendingResult,
    urls: Arc<ObjectUrlRegistry>,
}

impl PendingProcess {
    pub fn wait(self) -> ApiResult<ProcessingResult> {
        let output = self.pending.wait()?;
        Ok(publish(&self.urls, output))
    }

    pub fn try_result(&self) -> Option<ApiResult<ProcessingResult>> {
        self.pending
            .try_result()
            .map(|r| r.map(|output| publish(&self.urls, output)))
    }
}

fn publish(urls: &ObjectUrlRegistry, output: TaskOutput) -> ProcessingResult {
    let mime = output.format.mime_type();
    let size = output.data.len();
    let data = Arc::new(output.data);
    let url = urls.create(Arc::clone(&data), mime);
    ProcessingResult {
        data,
        url,
        width: output.width,
        height: output.height,
        size,
        mime,
        quality: output.quality,
        metrics: output.metrics,
    }
}

/// Output format that keeps the source format where it can be encoded.
fn same_format_or_jpeg(bytes: &[u8]) -> OutputFormat {
    decoder::detect_format(bytes)
        .and_then(OutputFormat::from_image_format)
        .unwrap_or(OutputFormat::Jpeg)
}

#[derive(Clone, Debug, Default)]
pub struct ImageProcessor {
    config: PipelineConfig,
    urls: Arc<ObjectUrlRegistry>,
}

impl ImageProcessor {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            urls: Arc::new(ObjectUrlRegistry::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn urls(&self) -> &Arc<ObjectUrlRegistry> {
        &self.urls
    }

    /// Release a result's object URL.
    pub fn revoke(&self, url: &str) -> bool {
        self.urls.revoke(url)
    }

    fn task(&self, input: &InputFile, options: TransformOptions) -> ProcessTask {
        ProcessTask::new(input.clone(), options, self.config)
    }

    /// Run one decode -> transform -> encode call.
    pub fn process(&self, input: &InputFile, options: &TransformOptions) -> ApiResult<ProcessingResult> {
        let output = self.task(input, options.clone()).run()?;
        Ok(publish(&self.urls, output))
    }

    /// Same as `process`, on the shared pool.
    pub fn process_async(&self, input: &InputFile, options: &TransformOptions) -> PendingProcess {
        PendingProcess {
            pending: self.task(input, options.clone()).spawn(),
            urls: Arc::clone(&self.urls),
        }
    }

    // =========================================================================
    // TOOLS
    // =========================================================================

    pub fn convert(&self, input: &InputFile, format: OutputFormat) -> ApiResult<ProcessingResult> {
        let options = TransformOptions::new(format)
            .with_quality(DEFAULT_TOOL_QUALITY)
            .with_use_case(UseCase::Conversion);
        self.process(input, &options)
    }

    /// Re-encode in the source format (JPEG for BMP/TIFF sources).
    pub fn compress(&self, input: &InputFile, quality: f32) -> ApiResult<ProcessingResult> {
        let format = same_format_or_jpeg(input.bytes());
        let options = TransformOptions::new(format)
            .with_quality(quality)
            .with_use_case(UseCase::Compression);
        self.process(input, &options)
    }

    /// Cut `rect` (display pixel space) out at its own size.
    pub fn crop(
        &self,
        input: &InputFile,
        rect: PixelRect,
        format: OutputFormat,
    ) -> ApiResult<ProcessingResult> {
        let options = TransformOptions::new(format)
            .with_crop(rect)
            .with_quality(DEFAULT_TOOL_QUALITY)
            .with_use_case(UseCase::Crop);
        self.process(input, &options)
    }

    pub fn resize(
        &self,
        input: &InputFile,
        width: Option<u32>,
        height: Option<u32>,
        fit: FitMode,
        format: OutputFormat,
    ) -> ApiResult<ProcessingResult> {
        let options = TransformOptions::new(format)
            .with_size(width, height)
            .with_fit(fit)
            .with_quality(DEFAULT_TOOL_QUALITY)
            .with_use_case(UseCase::Resize);
        self.process(input, &options)
    }

    /// Cover-fit to the preset's exact size.
    pub fn apply_preset(
        &self,
        input: &InputFile,
        preset: &Preset,
        format: OutputFormat,
    ) -> ApiResult<ProcessingResult> {
        if preset.width == 0 || preset.height == 0 {
            return Err(PixelPressError::invalid_preset(preset.name));
        }
        let options = TransformOptions::new(format)
            .with_size(Some(preset.width), Some(preset.height))
            .with_fit(FitMode::Cover)
            .with_quality(preset.quality)
            .with_use_case(UseCase::Preset);
        self.process(input, &options)
    }

    /// Search for the highest quality that fits `target_bytes`. Decodes and
    /// transforms once; only the encode is repeated. Quality floors do not
    /// apply here.
    pub fn optimize_to_size(
        &self,
        input: &InputFile,
        target_bytes: usize,
        format: OutputFormat,
    ) -> ApiResult<OptimizedResult> {
        let options = TransformOptions::new(format).with_use_case(UseCase::Compression);
        let prepared = self.task(input, options).prepare()?;
        let img = &prepared.transformed.image;
        let icc = prepared.icc.as_deref();

        let outcome = if format.can_quantize() {
            optimizer::optimize_png_to_size(
                || encode_with(img, format, 1.0, PngMode::Lossless, icc),
                |q| encode_with(img, format, q, PngMode::Quantized, icc),
                target_bytes,
            )?
        } else {
            optimizer::optimize_to_size(
                |q| encode_with(img, format, q, PngMode::Lossless, icc),
                target_bytes,
            )?
        };
        debug!(
            target: "pixel_press::optimize",
            target_bytes,
            size = outcome.data.len(),
            quality = outcome.quality,
            reached = outcome.reached(),
            "size search finished"
        );

        let (width, height) = (prepared.transformed.width, prepared.transformed.height);
        let metrics = prepared
            .recorder
            .finalize(format, outcome.data.len(), icc.is_some(), false);
        let output = TaskOutput {
            data: outcome.data,
            format,
            width,
            height,
            quality: outcome.quality,
            metrics,
        };
        Ok(OptimizedResult {
            result: publish(&self.urls, output),
            status: outcome.status,
            attempts: outcome.attempts,
        })
    }

    pub fn process_batch(
        &self,
        inputs: Vec<InputFile>,
        options: &TransformOptions,
    ) -> ApiResult<BatchReport> {
        batch::process_batch(inputs, options, &self.config)
    }

    // =========================================================================
    // METADATA
    // =========================================================================

    pub fn inspect_exif(&self, input: &InputFile) -> ApiResult<ExifSummary> {
        metadata::inspect_exif(input.bytes())
    }

    /// Header-only dimensions and format.
    pub fn inspect_header(&self, input: &InputFile) -> ApiResult<ImageInfo> {
        decoder::inspect_header(input.bytes())
    }

    /// Remove EXIF. Upright JPEG/PNG/WebP files lose the EXIF block without
    /// a re-encode; rotated ones are re-encoded with the orientation baked
    /// into the pixels.
    pub fn strip_exif(&self, input: &InputFile) -> ApiResult<ProcessingResult> {
        let bytes = input.bytes();
        let orientation = metadata::inspect_exif(bytes)
            .map(|summary| summary.orientation)
            .unwrap_or_else(|_| read_orientation(bytes));
        let detected = decoder::detect_format(bytes);
        let lossless_container = matches!(
            detected,
            Some(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP)
        );

        if orientation == Orientation::Normal && lossless_container {
            let info = decoder::inspect_header(bytes)?;
            let data = metadata::strip_exif_lossless(bytes)?;
            let format = same_format_or_jpeg(bytes);
            let mut metrics = ProcessingMetrics {
                version: crate::PROCESSING_METRICS_VERSION.to_string(),
                bytes_in: bytes.len() as u64,
                bytes_out: data.len() as u64,
                format_in: Some(format.as_str().to_string()),
                format_out: format.as_str().to_string(),
                ..ProcessingMetrics::default()
            };
            if metrics.bytes_in > 0 {
                metrics.compression_ratio = metrics.bytes_out as f64 / metrics.bytes_in as f64;
            }
            let output = TaskOutput {
                data,
                format,
                width: info.width,
                height: info.height,
                quality: 1.0,
                metrics,
            };
            return Ok(publish(&self.urls, output));
        }

        let options = TransformOptions::new(same_format_or_jpeg(bytes))
            .with_quality(1.0)
            .with_use_case(UseCase::ExifStrip);
        self.process(input, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn input(name: &str, width: u32, height: u32, format: ImageFormat) -> InputFile {
        let mut buf = Vec::new();
        create_test_image(width, height)
            .write_to(&mut Cursor::new(&mut buf), format)
            .unwrap();
        InputFile::from_bytes(name, buf)
    }

    mod tool_tests {
        use super::*;

        #[test]
        fn test_convert_publishes_url() {
            let processor = ImageProcessor::default();
            let result = processor
                .convert(&input("a.png", 20, 10, ImageFormat::Png), OutputFormat::WebP)
                .unwrap();
            assert_eq!(result.mime, "image/webp");
            assert_eq!((result.width, result.height), (20, 10));
            assert_eq!(result.size, result.data.len());
            let (data, mime) = processor.urls().resolve(&result.url).unwrap();
            assert_eq!(mime, "image/webp");
            assert!(Arc::ptr_eq(&data, &result.data));
            assert!(processor.revoke(&result.url));
            assert_eq!(processor.urls().live_count(), 0);
        }

        #[test]
        fn test_compress_keeps_source_format() {
            let processor = ImageProcessor::default();
            let jpeg = processor
                .compress(&input("a.jpg", 16, 16, ImageFormat::Jpeg), 0.5)
                .unwrap();
            assert_eq!(jpeg.mime, "image/jpeg");
            assert!((jpeg.quality - 0.90).abs() < 1e-6);

            let bmp = processor
                .compress(&input("a.bmp", 16, 16, ImageFormat::Bmp), 0.95)
                .unwrap();
            assert_eq!(bmp.mime, "image/jpeg");
        }

        #[test]
        fn test_crop_uses_crop_floor() {
            let processor = ImageProcessor::default();
            let result = processor
                .crop(
                    &input("a.png", 40, 30, ImageFormat::Png),
                    PixelRect::new(5, 5, 20, 10),
                    OutputFormat::Jpeg,
                )
                .unwrap();
            assert_eq!((result.width, result.height), (20, 10));
            assert!(result.quality >= 0.98);
        }

        #[test]
        fn test_resize_and_preset() {
            let processor = ImageProcessor::default();
            let file = input("a.png", 400, 300, ImageFormat::Png);
            let resized = processor
                .resize(&file, Some(100), None, FitMode::Contain, OutputFormat::Png)
                .unwrap();
            assert_eq!((resized.width, resized.height), (100, 75));

            let preset = Preset::new("tiny-portrait", 108, 135, 0.8);
            let fitted = processor.apply_preset(&file, &preset, OutputFormat::Jpeg).unwrap();
            assert_eq!((fitted.width, fitted.height), (108, 135));
        }

        #[test]
        fn test_zero_sized_preset_rejected() {
            let processor = ImageProcessor::default();
            let preset = Preset::new("broken", 0, 10, 0.9);
            let err = processor
                .apply_preset(&input("a.png", 4, 4, ImageFormat::Png), &preset, OutputFormat::Png)
                .unwrap_err();
            assert!(matches!(err, PixelPressError::InvalidPreset { .. }));
        }

        #[test]
        fn test_process_async() {
            let processor = ImageProcessor::default();
            let pending = processor.process_async(
                &input("a.png", 12, 12, ImageFormat::Png),
                &TransformOptions::new(OutputFormat::Jpeg),
            );
            let result = pending.wait().unwrap();
            assert!(processor.urls().resolve(&result.url).is_some());
        }
    }

    mod optimize_tests {
        use super::*;

        #[test]
        fn test_jpeg_search_fits_generous_target() {
            let processor = ImageProcessor::default();
            let file = input("a.png", 64, 64, ImageFormat::Png);
            let out = processor
                .optimize_to_size(&file, 1_000_000, OutputFormat::Jpeg)
                .unwrap();
            assert!(out.reached());
            assert!(out.result.size <= 1_000_000);
            assert!(out.result.quality > 0.99);
        }

        #[test]
        fn test_impossible_target_is_soft() {
            let processor = ImageProcessor::default();
            let file = input("a.png", 64, 64, ImageFormat::Png);
            let out = processor.optimize_to_size(&file, 10, OutputFormat::WebP).unwrap();
            assert!(!out.reached());
            assert!(out.result.size > 10);
        }
    }

    mod exif_tests {
        use super::*;

        #[test]
        fn test_strip_without_exif_is_lossless() {
            let processor = ImageProcessor::default();
            let file = input("a.png", 10, 8, ImageFormat::Png);
            let result = processor.strip_exif(&file).unwrap();
            assert_eq!(result.mime, "image/png");
            assert_eq!((result.width, result.height), (10, 8));
            assert_eq!(result.quality, 1.0);
            assert!(processor.inspect_exif(&file).unwrap().is_empty());
        }

        #[test]
        fn test_inspect_header() {
            let processor = ImageProcessor::default();
            let info = processor
                .inspect_header(&input("a.webp", 7, 5, ImageFormat::WebP))
                .unwrap();
            assert_eq!((info.width, info.height), (7, 5));
            assert_eq!(info.format, Some(ImageFormat::WebP));
        }
    }
}
