// src/engine/tasks.rs
//
// One pipeline call as a unit of work: decode -> transform -> encode with
// per-stage metrics. Tasks run inline, or off-thread on the shared pool.

use crate::engine::decoder::{check_declared_mime, decode, inspect_header};
use crate::engine::encoder::{encode_with, never_regress, PngMode};
use crate::engine::io::{extract_icc_profile, InputFile};
use crate::engine::pipeline::{apply_transform, TransformedImage};
use crate::engine::policy::PipelineConfig;
use crate::engine::pool;
use crate::error::PixelPressError;
use crate::ops::{OutputFormat, TransformOptions, UseCase};
use crate::{ProcessingMetrics, PROCESSING_METRICS_VERSION};
use image::ImageFormat;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc;
use std::time::Instant;
use tracing::debug;

type TaskResult<T> = std::result::Result<T, PixelPressError>;

fn format_to_string(fmt: ImageFormat) -> String {
    match fmt {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        other => other.to_mime_type(),
    }
    .to_string()
}

/// Measures decode -> transform -> encode in milliseconds and fills the
/// size fields in one place.
pub(crate) struct MetricsRecorder {
    metrics: ProcessingMetrics,
    start_total: Instant,
    stage_start: Instant,
}

impl MetricsRecorder {
    pub(crate) fn new(input_size: usize) -> Self {
        let now = Instant::now();
        Self {
            metrics: ProcessingMetrics {
                bytes_in: input_size as u64,
                ..ProcessingMetrics::default()
            },
            start_total: now,
            stage_start: now,
        }
    }

    fn lap(&mut self) -> f64 {
        let ms = self.stage_start.elapsed().as_secs_f64() * 1000.0;
        self.stage_start = Instant::now();
        ms
    }

    pub(crate) fn mark_decode_done(&mut self, input_format: Option<ImageFormat>) {
        self.metrics.decode_ms = self.lap();
        self.metrics.format_in = input_format.map(format_to_string);
    }

    pub(crate) fn mark_transform_done(&mut self) {
        self.metrics.transform_ms = self.lap();
    }

    pub(crate) fn finalize(
        mut self,
        output_format: OutputFormat,
        output_len: usize,
        icc_preserved: bool,
        kept_original: bool,
    ) -> ProcessingMetrics {
        let encode_ms = self.lap();
        let m = &mut self.metrics;
        m.encode_ms = encode_ms;
        m.total_ms = self.start_total.elapsed().as_secs_f64() * 1000.0;
        m.version = PROCESSING_METRICS_VERSION.to_string();
        m.bytes_out = output_len as u64;
        m.compression_ratio = if m.bytes_in > 0 {
            m.bytes_out as f64 / m.bytes_in as f64
        } else {
            0.0
        };
        m.format_out = output_format.as_str().to_string();
        m.icc_preserved = icc_preserved;
        m.kept_original = kept_original;
        self.metrics
    }
}

/// Transformed pixels ready for one or more encodes.
pub(crate) struct Prepared {
    pub transformed: TransformedImage,
    pub source_format: Option<ImageFormat>,
    pub icc: Option<Vec<u8>>,
    pub recorder: MetricsRecorder,
}

/// Encoded output of a task.
#[derive(Clone, Debug)]
pub struct TaskOutput {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// Quality handed to the encoder after the floor was applied.
    pub quality: f32,
    pub metrics: ProcessingMetrics,
}

/// A single decode -> transform -> encode call.
#[derive(Clone, Debug)]
pub struct ProcessTask {
    pub input: InputFile,
    pub options: TransformOptions,
    pub config: PipelineConfig,
}

impl ProcessTask {
    pub fn new(input: InputFile, options: TransformOptions, config: PipelineConfig) -> Self {
        Self {
            input,
            options,
            config,
        }
    }

    /// Decode and transform, stopping before the encode.
    pub(crate) fn prepare(&self) -> TaskResult<Prepared> {
        if let Some(mime) = self.input.mime.as_deref() {
            check_declared_mime(mime)?;
        }
        let bytes = self.input.bytes();
        let mut recorder = MetricsRecorder::new(bytes.len());

        let decoded = decode(bytes, self.config.decode)?;
        let source_format = decoded.format;
        recorder.mark_decode_done(source_format);

        let transformed = apply_transform(decoded, &self.options, &self.config)?;
        recorder.mark_transform_done();

        let icc = if self.config.quality.preserve_icc {
            extract_icc_profile(bytes)
        } else {
            None
        };

        Ok(Prepared {
            transformed,
            source_format,
            icc,
            recorder,
        })
    }

    /// Run the whole pipeline on the calling thread.
    pub fn run(&self) -> TaskResult<TaskOutput> {
        let prepared = self.prepare()?;
        let format = self.options.format;
        let use_case = self.options.use_case;
        let policy = &self.config.quality;

        let quality = policy.effective_quality(format, use_case, self.options.quality);
        let png_mode = if policy.wants_quantization(format, use_case, self.options.quality) {
            PngMode::Quantized
        } else {
            PngMode::Lossless
        };
        debug!(
            target: "pixel_press::encode",
            format = format.as_str(),
            requested = self.options.quality,
            effective = quality,
            ?use_case,
            "quality resolved"
        );

        let encoded = encode_with(
            &prepared.transformed.image,
            format,
            quality,
            png_mode,
            prepared.icc.as_deref(),
        )?;

        // Lossless recompression into the source's own format must not grow.
        let lossless_recompress = !format.is_lossy()
            && use_case == UseCase::Compression
            && prepared.source_format.and_then(OutputFormat::from_image_format) == Some(format);
        let (data, kept_original) = if lossless_recompress {
            never_regress(self.input.bytes(), encoded)
        } else {
            (encoded, false)
        };

        // Kept bytes carry their own stored dimensions.
        let transformed = (prepared.transformed.width, prepared.transformed.height);
        let (width, height) = if kept_original {
            inspect_header(&data)
                .map(|info| (info.width, info.height))
                .unwrap_or(transformed)
        } else {
            transformed
        };

        let metrics = prepared.recorder.finalize(
            format,
            data.len(),
            prepared.icc.is_some(),
            kept_original,
        );

        Ok(TaskOutput {
            data,
            format,
            width,
            height,
            quality,
            metrics,
        })
    }

    /// Run on the shared pool. Falls back to a plain thread when the pool
    /// could not be built.
    pub fn spawn(self) -> PendingResult {
        let (tx, rx) = mpsc::channel();
        let job = move || {
            // A dropped receiver means the caller lost interest.
            let _ = tx.send(self.run());
        };
        match pool::shared_pool() {
            Some(pool) => pool.spawn(job),
            None => {
                std::thread::spawn(job);
            }
        }
        PendingResult { rx }
    }
}

/// Handle to an off-thread task. There is no cancellation: a caller that
/// no longer wants the result simply drops the handle.
#[derive(Debug)]
pub struct PendingResult {
    rx: mpsc::Receiver<TaskResult<TaskOutput>>,
}

impl PendingResult {
    /// Block until the task finishes.
    pub fn wait(self) -> TaskResult<TaskOutput> {
        self.rx.recv().map_err(|_| {
            PixelPressError::internal_panic("worker exited without sending a result")
        })?
    }

    /// Non-blocking poll. `None` while the task is still running.
    pub fn try_result(&self) -> Option<TaskResult<TaskOutput>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(PixelPressError::internal_panic(
                "worker exited without sending a result",
            ))),
        }
    }
}

/// Write `data` to `path` atomically: a temp file in the same directory
/// is synced and then renamed over the target.
pub fn write_atomic(path: &Path, data: &[u8]) -> TaskResult<()> {
    use tempfile::NamedTempFile;

    let output_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => {
            return Err(PixelPressError::invalid_argument(
                "path",
                path.display().to_string(),
                "output path must include a file name",
            ))
        }
    };

    let mut temp_file = NamedTempFile::new_in(output_dir).map_err(|e| {
        PixelPressError::file_write_failed(output_dir.display().to_string(), e)
    })?;
    let temp_path = temp_file.path().display().to_string();
    temp_file
        .write_all(data)
        .map_err(|e| PixelPressError::file_write_failed(temp_path.clone(), e))?;
    temp_file
        .as_file_mut()
        .sync_all()
        .map_err(|e| PixelPressError::file_write_failed(temp_path, e))?;

    temp_file
        .persist(path)
        .map_err(|e| PixelPressError::file_write_failed(path.display().to_string(), e.error))?;
    Ok(())
}
