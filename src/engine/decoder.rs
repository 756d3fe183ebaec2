// src/engine/decoder.rs
//
// Decoder operations. The preferred path lets the image crate apply EXIF
// orientation while decoding; the fallback decodes raw pixels through the
// format-specific codecs (mozjpeg, zune-png, libwebp) and leaves orientation
// to the transform engine.

use crate::engine::common::run_with_panic_policy;
use crate::engine::orientation::{get_oriented_dimensions, read_orientation, Orientation};
use crate::engine::policy::DecodeStrategy;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::PixelPressError;
#[cfg(test)]
use image::GenericImageView;
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageDecoder, ImageFormat, ImageReader, RgbImage,
    RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use tracing::{debug, warn};
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

type DecoderResult<T> = std::result::Result<T, PixelPressError>;

/// MIME types that are recognised at the boundary but need a decoder or a
/// rasterizer this pipeline does not carry.
const UNSUPPORTED_MIME_TYPES: &[&str] = &["image/heic", "image/heif", "image/avif", "image/svg+xml"];

/// Decoded pixels plus what is known about how they must be displayed.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: Option<ImageFormat>,
    /// Orientation found in the container (Normal when absent).
    pub orientation: Orientation,
    /// True when `image` already has the orientation applied.
    pub orientation_handled: bool,
}

impl DecodedImage {
    /// Intrinsic pixel dimensions of the decoded buffer.
    pub fn source_dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Dimensions after orientation.
    pub fn display_dimensions(&self) -> (u32, u32) {
        let (w, h) = self.source_dimensions();
        if self.orientation_handled {
            (w, h)
        } else {
            get_oriented_dimensions(w, h, self.orientation)
        }
    }

    /// Pixels as the viewer should see them.
    pub fn into_display_image(self) -> DynamicImage {
        if self.orientation_handled {
            self.image
        } else {
            self.orientation.apply(self.image)
        }
    }
}

/// Header-level facts read without decoding pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: Option<ImageFormat>,
    pub orientation: Orientation,
}

impl ImageInfo {
    pub fn display_dimensions(&self) -> (u32, u32) {
        get_oriented_dimensions(self.width, self.height, self.orientation)
    }
}

/// Decode `bytes`, preferring the auto-orienting path.
pub fn decode(bytes: &[u8], strategy: DecodeStrategy) -> DecoderResult<DecodedImage> {
    if bytes.is_empty() {
        return Err(PixelPressError::decode_failed("empty input"));
    }
    match strategy {
        DecodeStrategy::Auto => match decode_auto_oriented(bytes) {
            Ok(decoded) => Ok(decoded),
            Err(err) if is_limit_error(&err) => Err(err),
            Err(err) => {
                warn!(
                    target: "pixel_press::decode",
                    error = %err,
                    "auto-orienting decode failed; falling back to manual orientation"
                );
                decode_manual(bytes)
            }
        },
        DecodeStrategy::ManualOrientation => decode_manual(bytes),
    }
}

fn is_limit_error(err: &PixelPressError) -> bool {
    matches!(
        err,
        PixelPressError::DimensionExceedsLimit { .. } | PixelPressError::PixelCountExceedsLimit { .. }
    )
}

/// Decode through the image crate, which reads the container orientation
/// and rotates the pixels itself.
pub fn decode_auto_oriented(bytes: &[u8]) -> DecoderResult<DecodedImage> {
    let format = detect_format(bytes);
    let orientation = read_orientation(bytes);
    let image = run_with_panic_policy("decode:auto", || {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PixelPressError::decode_failed(format!("format sniff failed: {e}")))?;
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| PixelPressError::decode_failed(format!("decoder init failed: {e}")))?;
        let (width, height) = decoder.dimensions();
        check_dimensions(width, height)?;
        let exif_orientation = decoder
            .orientation()
            .map_err(|e| PixelPressError::decode_failed(format!("orientation read failed: {e}")))?;
        let mut image = DynamicImage::from_decoder(decoder)
            .map_err(|e| PixelPressError::decode_failed(format!("decode failed: {e}")))?;
        image.apply_orientation(exif_orientation);
        Ok(image)
    })?;
    debug!(
        target: "pixel_press::decode",
        width = image.width(),
        height = image.height(),
        orientation = orientation.exif_value(),
        "decoded with auto orientation"
    );
    Ok(DecodedImage {
        image,
        format,
        orientation,
        orientation_handled: true,
    })
}

/// Decode raw stored pixels; the caller applies `orientation`.
pub fn decode_manual(bytes: &[u8]) -> DecoderResult<DecodedImage> {
    let format = detect_format(bytes);
    let image = match format {
        Some(ImageFormat::Jpeg) => decode_jpeg_mozjpeg(bytes)?,
        Some(ImageFormat::Png) => decode_png_zune(bytes)?,
        Some(ImageFormat::WebP) => decode_webp_libwebp(bytes)?,
        Some(ImageFormat::Bmp) | Some(ImageFormat::Tiff) => decode_with_image_crate(bytes)?,
        Some(other) => {
            return Err(PixelPressError::unsupported_format(format!("{other:?}")));
        }
        None => return Err(PixelPressError::decode_failed("unrecognised image data")),
    };
    Ok(DecodedImage {
        image,
        format,
        orientation: read_orientation(bytes),
        orientation_handled: false,
    })
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo).
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(PixelPressError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            PixelPressError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            PixelPressError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = u32::try_from(decompress.width())
            .map_err(|_| PixelPressError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        let height = u32::try_from(decompress.height())
            .map_err(|_| PixelPressError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            PixelPressError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image = RgbImage::from_raw(width, height, flat_pixels).ok_or_else(|| {
            PixelPressError::decode_failed("mozjpeg: failed to create image from raw data")
        })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode BMP/TIFF (and anything else the image crate knows) under the panic policy.
pub fn decode_with_image_crate(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        ensure_dimensions_safe(data)?;
        image::load_from_memory(data)
            .map_err(|e| PixelPressError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8 bits.
pub fn decode_png_zune(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(zune_core::bytestream::ZCursor::new(data), options);
        decoder
            .decode_headers()
            .map_err(|e| PixelPressError::decode_failed(format!("png: header decode failed: {e}")))?;
        let info = decoder
            .info()
            .ok_or_else(|| PixelPressError::decode_failed("png: missing header info"))?;
        let width = u32::try_from(info.width)
            .map_err(|_| PixelPressError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        let height = u32::try_from(info.height)
            .map_err(|_| PixelPressError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        check_dimensions(width, height)?;

        let pixels = decoder
            .decode()
            .map_err(|e| PixelPressError::decode_failed(format!("png: decode failed: {e}")))?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(PixelPressError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| PixelPressError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| PixelPressError::decode_failed("png: failed to build RGB image"))?,
            ColorSpace::RGBA => RgbaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| PixelPressError::decode_failed("png: failed to build RGBA image"))?,
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| PixelPressError::decode_failed("png: failed to build Luma image"))?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| {
                    PixelPressError::decode_failed("png: failed to build LumaA image")
                })?,
            other => {
                return Err(PixelPressError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };

        Ok(img)
    })
}

/// Decode WebP using libwebp. Animated WebP goes through the image crate.
pub fn decode_webp_libwebp(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            PixelPressError::decode_failed("webp: failed to read bitstream features")
        })?;

        check_dimensions(features.width(), features.height())?;

        if features.has_animation() {
            return image::load_from_memory(data).map_err(|e| {
                PixelPressError::decode_failed(format!("webp (animated) decode failed: {e}"))
            });
        }

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| PixelPressError::decode_failed("webp: decode failed"))?;

        check_dimensions(decoded.width(), decoded.height())?;

        Ok(decoded.to_image())
    })
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Reject declared MIME types this pipeline cannot decode. Anything else
/// is left to content sniffing.
pub fn check_declared_mime(mime: &str) -> DecoderResult<()> {
    let normalized = mime.trim().to_ascii_lowercase();
    let essence = normalized.split(';').next().unwrap_or("").trim();
    if UNSUPPORTED_MIME_TYPES.contains(&essence) {
        return Err(PixelPressError::unsupported_format(essence.to_string()));
    }
    Ok(())
}

/// Check if image dimensions are within safe limits.
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    if width == 0 || height == 0 {
        return Err(PixelPressError::decode_failed(format!(
            "image has empty dimensions {width}x{height}"
        )));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(PixelPressError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(PixelPressError::pixel_count_exceeds_limit(
            pixels, MAX_PIXELS,
        ));
    }
    Ok(())
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> DecoderResult<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}

/// Read width, height and format from the header only.
pub fn inspect_header(bytes: &[u8]) -> DecoderResult<ImageInfo> {
    let format = detect_format(bytes)
        .ok_or_else(|| PixelPressError::decode_failed("unrecognised image data"))?;
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| PixelPressError::decode_failed(format!("header read failed: {e}")))?;
    Ok(ImageInfo {
        width,
        height,
        format: Some(format),
        orientation: read_orientation(bytes),
    })
}
