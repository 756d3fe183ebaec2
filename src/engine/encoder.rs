// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng, optionally
// palette-quantized), WebP (libwebp). Quality arrives already resolved
// through QualityPolicy, as a fraction in 0..=1.

use crate::engine::common::run_with_panic_policy;
use crate::engine::quantize::quantize;
use crate::engine::MAX_DIMENSION;
use crate::error::PixelPressError;
use crate::ops::OutputFormat;
use image::{DynamicImage, ImageFormat};
use img_parts::{jpeg::Jpeg, png::Png, ImageICC};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::{debug, info};

type EncoderResult<T> = std::result::Result<T, PixelPressError>;

/// How a PNG is written. Quality is not a continuous knob for PNG.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PngMode {
    #[default]
    Lossless,
    /// Remap to at most 256 colours before the lossless pack.
    Quantized,
}

/// Per-format encoder settings derived from one quality value.
///
/// Bands (on the 0-100 scale):
/// - High (>=85)
/// - Balanced (70-84)
/// - Fast (50-69)
/// - Fastest (<50)
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    /// `quality` is a fraction; out-of-range values are clamped.
    pub fn new(quality: f32) -> Self {
        let q = if quality.is_finite() { quality.clamp(0.0, 1.0) } else { 1.0 };
        // Tenths of a percent; keeps 0.90 from landing on 89.99998.
        Self {
            quality: (q * 1000.0).round() / 10.0,
        }
    }

    /// Quality on the 0-100 scale libjpeg and libwebp expect.
    pub fn scaled(&self) -> f32 {
        self.quality
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    /// Full-resolution chroma at the fidelity floors.
    pub fn jpeg_full_chroma(&self) -> bool {
        self.quality >= 90.0
    }

    pub fn jpeg_smoothing(&self) -> u8 {
        if self.quality >= 90.0 {
            0
        } else if self.quality >= 70.0 {
            5
        } else if self.quality >= 60.0 {
            10
        } else {
            18
        }
    }

    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_pass(&self) -> i32 {
        1
    }

    pub fn webp_preprocessing(&self) -> i32 {
        0
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }
}

/// Encode `img` as `format`. PNG is written losslessly.
pub fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: f32,
    icc: Option<&[u8]>,
) -> EncoderResult<Vec<u8>> {
    encode_with(img, format, quality, PngMode::Lossless, icc)
}

/// Encode with an explicit PNG mode. `png_mode` is ignored for lossy formats.
pub fn encode_with(
    img: &DynamicImage,
    format: OutputFormat,
    quality: f32,
    png_mode: PngMode,
    icc: Option<&[u8]>,
) -> EncoderResult<Vec<u8>> {
    let data = match format {
        OutputFormat::Jpeg => encode_jpeg(img, quality, icc)?,
        OutputFormat::WebP => encode_webp(img, quality, icc)?,
        OutputFormat::Png => match png_mode {
            PngMode::Lossless => encode_png(img, icc)?,
            PngMode::Quantized => encode_png_quantized(img, quality, icc)?,
        },
    };
    if data.is_empty() {
        return Err(PixelPressError::encode_failed(
            format.as_str(),
            "encoder produced no data",
        ));
    }
    debug!(
        target: "pixel_press::encode",
        format = format.as_str(),
        quality,
        ?png_mode,
        bytes = data.len(),
        "encoded"
    );
    Ok(data)
}

/// Keep `original` when re-encoding made the file bigger.
/// Returns the chosen bytes and whether the original won.
pub fn never_regress(original: &[u8], encoded: Vec<u8>) -> (Vec<u8>, bool) {
    if encoded.len() > original.len() {
        info!(
            target: "pixel_press::encode",
            original = original.len(),
            encoded = encoded.len(),
            "re-encode larger than input; keeping original bytes"
        );
        (original.to_vec(), true)
    } else {
        (encoded, false)
    }
}

fn check_encode_dimensions(format: &'static str, w: u32, h: u32) -> EncoderResult<()> {
    if w == 0 || h == 0 {
        return Err(PixelPressError::encode_failed(
            format,
            "invalid image dimensions: width or height is zero",
        ));
    }
    if w > MAX_DIMENSION || h > MAX_DIMENSION {
        return Err(PixelPressError::dimension_exceeds_limit(
            w.max(h),
            MAX_DIMENSION,
        ));
    }
    Ok(())
}

/// Encode to JPEG using mozjpeg: progressive, optimized scans, 4:4:4
/// chroma at quality >= 0.90 and 4:2:0 below.
pub fn encode_jpeg(img: &DynamicImage, quality: f32, icc: Option<&[u8]>) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let settings = QualitySettings::new(quality);

        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();
        check_encode_dimensions("jpeg", w, h)?;

        let expected_len = (w as usize) * (h as usize) * 3;
        if pixels.len() != expected_len {
            return Err(PixelPressError::corrupted_image());
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.scaled());

        if settings.jpeg_full_chroma() {
            comp.set_chroma_sampling_pixel_sizes((1, 1), (1, 1));
        } else {
            comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        }
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        let encoded = {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                PixelPressError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    PixelPressError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                PixelPressError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;

            output
        };

        match icc {
            Some(icc_data) => embed_icc_jpeg(encoded, icc_data),
            None => Ok(encoded),
        }
    })
}

/// Embed ICC profile into JPEG using img-parts
pub fn embed_icc_jpeg(jpeg_data: Vec<u8>, icc: &[u8]) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg:embed_icc", || {
        use img_parts::jpeg::{markers::APP2, JpegSegment};
        use img_parts::Bytes;

        let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_data)).map_err(|e| {
            PixelPressError::encode_failed("jpeg", format!("failed to parse JPEG for ICC: {e}"))
        })?;

        let mut marker_data = Vec::with_capacity(14 + icc.len());
        marker_data.extend_from_slice(b"ICC_PROFILE\0");
        marker_data.push(1);
        marker_data.push(1);
        marker_data.extend_from_slice(icc);

        let segment = JpegSegment::new_with_contents(APP2, Bytes::from(marker_data));
        jpeg.segments_mut().insert(0, segment);

        let mut output = Vec::new();
        jpeg.encoder().write_to(&mut output).map_err(|e| {
            PixelPressError::encode_failed("jpeg", format!("failed to write JPEG with ICC: {e}"))
        })?;

        Ok(output)
    })
}

fn write_png_optimized(img: &DynamicImage) -> EncoderResult<Vec<u8>> {
    check_encode_dimensions("png", img.width(), img.height())?;
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| PixelPressError::encode_failed("png", format!("PNG encode failed: {e}")))?;

    // Lossless re-pack; oxipng also reduces bit depth, colour type and palette.
    let mut options = oxipng::Options::from_preset(4);
    options.strip = oxipng::StripChunks::None;

    oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
        PixelPressError::encode_failed("png", format!("oxipng optimization failed: {e}"))
    })
}

/// Lossless PNG.
pub fn encode_png(img: &DynamicImage, icc: Option<&[u8]>) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let optimized = write_png_optimized(img)?;
        match icc {
            Some(icc_data) => embed_icc_png(optimized, icc_data),
            None => Ok(optimized),
        }
    })
}

/// PNG remapped to at most 256 colours, then packed losslessly.
pub fn encode_png_quantized(
    img: &DynamicImage,
    quality: f32,
    icc: Option<&[u8]>,
) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png:quantized", || {
        let reduced = DynamicImage::ImageRgba8(quantize(img, quality));
        let optimized = write_png_optimized(&reduced)?;
        match icc {
            Some(icc_data) => embed_icc_png(optimized, icc_data),
            None => Ok(optimized),
        }
    })
}

/// Embed ICC profile into PNG using img-parts
pub fn embed_icc_png(png_data: Vec<u8>, icc: &[u8]) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png:embed_icc", || {
        use img_parts::Bytes;

        let mut png = Png::from_bytes(Bytes::from(png_data)).map_err(|e| {
            PixelPressError::encode_failed("png", format!("failed to parse PNG for ICC: {e}"))
        })?;

        png.set_icc_profile(Some(Bytes::from(icc.to_vec())));

        let mut output = Vec::new();
        png.encoder().write_to(&mut output).map_err(|e| {
            PixelPressError::encode_failed("png", format!("failed to write PNG with ICC: {e}"))
        })?;

        Ok(output)
    })
}

/// Encode to WebP with libwebp's advanced config. RGBA input keeps its alpha.
pub fn encode_webp(img: &DynamicImage, quality: f32, icc: Option<&[u8]>) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let settings = QualitySettings::new(quality);
        let (w, h) = (img.width(), img.height());
        check_encode_dimensions("webp", w, h)?;

        let mut config = webp::WebPConfig::new()
            .map_err(|_| PixelPressError::encode_failed("webp", "failed to create WebPConfig"))?;
        config.quality = settings.scaled();
        config.method = settings.webp_method();
        config.pass = settings.webp_pass();
        config.preprocessing = settings.webp_preprocessing();
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let mem = (if img.color().has_alpha() {
            let rgba: Cow<'_, image::RgbaImage> = match img {
                DynamicImage::ImageRgba8(rgba_img) => Cow::Borrowed(rgba_img),
                _ => Cow::Owned(img.to_rgba8()),
            };
            webp::Encoder::from_rgba(&rgba, w, h).encode_advanced(&config)
        } else {
            let rgb: Cow<'_, image::RgbImage> = match img {
                DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
                _ => Cow::Owned(img.to_rgb8()),
            };
            webp::Encoder::from_rgb(&rgb, w, h).encode_advanced(&config)
        })
        .map_err(|e| PixelPressError::encode_failed("webp", format!("WebP encode failed: {e:?}")))?;

        let encoded = mem.to_vec();
        match icc {
            Some(icc_data) => embed_icc_webp(encoded, icc_data),
            None => Ok(encoded),
        }
    })
}

/// Embed ICC profile into WebP using img-parts
pub fn embed_icc_webp(webp_data: Vec<u8>, icc: &[u8]) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp:embed_icc", || {
        use img_parts::webp::WebP;
        use img_parts::Bytes;

        let mut webp = WebP::from_bytes(Bytes::from(webp_data)).map_err(|e| {
            PixelPressError::encode_failed("webp", format!("failed to parse WebP for ICC: {e}"))
        })?;

        webp.set_icc_profile(Some(Bytes::from(icc.to_vec())));

        let mut output = Vec::new();
        webp.encoder().write_to(&mut output).map_err(|e| {
            PixelPressError::encode_failed("webp", format!("failed to write WebP with ICC: {e}"))
        })?;

        Ok(output)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn noisy_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(2654435761).wrapping_add(y.wrapping_mul(97_003));
            Rgb([(v >> 5) as u8, (v >> 13) as u8, (v >> 21) as u8])
        }))
    }

    mod quality_settings_tests {
        use super::*;

        #[test]
        fn test_scaled_and_clamped() {
            assert_eq!(QualitySettings::new(0.92).scaled().round(), 92.0);
            assert_eq!(QualitySettings::new(3.0).scaled(), 100.0);
            assert_eq!(QualitySettings::new(f32::NAN).scaled(), 100.0);
        }

        #[test]
        fn test_chroma_switch_at_floor() {
            assert!(QualitySettings::new(0.90).jpeg_full_chroma());
            assert!(!QualitySettings::new(0.89).jpeg_full_chroma());
        }

        #[test]
        fn test_webp_bands() {
            assert_eq!(QualitySettings::new(0.95).webp_sns_strength(), 50);
            assert_eq!(QualitySettings::new(0.75).webp_sns_strength(), 70);
            assert_eq!(QualitySettings::new(0.3).webp_filter_strength(), 40);
        }
    }

    mod jpeg_tests {
        use super::*;

        #[test]
        fn test_encode_jpeg_roundtrip_dimensions() {
            let img = create_test_image(40, 30);
            let data = encode(&img, OutputFormat::Jpeg, 0.92, None).unwrap();
            assert_eq!(&data[..2], &[0xFF, 0xD8]);
            let decoded = image::load_from_memory(&data).unwrap();
            assert_eq!(decoded.dimensions(), (40, 30));
        }

        #[test]
        fn test_higher_quality_is_larger() {
            let img = noisy_image(64, 64);
            let low = encode(&img, OutputFormat::Jpeg, 0.2, None).unwrap();
            let high = encode(&img, OutputFormat::Jpeg, 0.98, None).unwrap();
            assert!(high.len() > low.len());
        }

        #[test]
        fn test_icc_embedded_in_jpeg() {
            let icc = vec![7u8; 64];
            let data = encode(&create_test_image(8, 8), OutputFormat::Jpeg, 0.9, Some(&icc)).unwrap();
            let jpeg = Jpeg::from_bytes(data.into()).unwrap();
            assert_eq!(jpeg.icc_profile().map(|b| b.to_vec()), Some(icc));
        }
    }

    mod png_tests {
        use super::*;

        #[test]
        fn test_png_is_lossless() {
            let img = create_test_image(33, 17);
            let data = encode(&img, OutputFormat::Png, 0.1, None).unwrap();
            let decoded = image::load_from_memory(&data).unwrap();
            assert_eq!(decoded.to_rgb8().as_raw(), img.to_rgb8().as_raw());
        }

        #[test]
        fn test_quantized_png_is_smaller_for_noise() {
            let img = noisy_image(96, 96);
            let lossless = encode_with(&img, OutputFormat::Png, 0.5, PngMode::Lossless, None).unwrap();
            let quantized = encode_with(&img, OutputFormat::Png, 0.5, PngMode::Quantized, None).unwrap();
            assert!(quantized.len() < lossless.len());
        }

        #[test]
        fn test_png_keeps_alpha() {
            let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 77])));
            let data = encode(&img, OutputFormat::Png, 1.0, None).unwrap();
            let decoded = image::load_from_memory(&data).unwrap();
            assert_eq!(decoded.to_rgba8().get_pixel(0, 0).0, [1, 2, 3, 77]);
        }

        #[test]
        fn test_never_regress_prefers_smaller() {
            let (kept, original_won) = never_regress(&[1, 2, 3], vec![1, 2, 3, 4]);
            assert!(original_won);
            assert_eq!(kept, vec![1, 2, 3]);
            let (kept, original_won) = never_regress(&[1, 2, 3], vec![9]);
            assert!(!original_won);
            assert_eq!(kept, vec![9]);
        }
    }

    mod webp_tests {
        use super::*;

        #[test]
        fn test_webp_rgb_and_rgba() {
            let data = encode(&create_test_image(16, 8), OutputFormat::WebP, 0.9, None).unwrap();
            assert_eq!(&data[..4], b"RIFF");
            assert_eq!(image::load_from_memory(&data).unwrap().dimensions(), (16, 8));

            let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 0])));
            let data = encode(&rgba, OutputFormat::WebP, 0.9, None).unwrap();
            let decoded = image::load_from_memory(&data).unwrap();
            assert!(decoded.color().has_alpha());
        }
    }

    #[test]
    fn test_zero_sized_image_is_encode_error() {
        let img = DynamicImage::new_rgb8(0, 0);
        for format in OutputFormat::ALL {
            assert!(encode(&img, format, 0.9, None).is_err(), "{format:?}");
        }
    }
}
