// src/engine/pipeline.rs
//
// Canvas transform: orient, crop, fit, resample, sharpen and composite one
// decoded image onto an output surface of the requested size.

use crate::crop::{cover_crop_rect, PixelRect, Rect};
use crate::engine::decoder::DecodedImage;
use crate::engine::policy::PipelineConfig;
use crate::engine::sharpen::sharpen;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::PixelPressError;
use crate::ops::{FitMode, TransformOptions};
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};
use tracing::debug;

// Use DynamicImage::width()/height() (inherent methods) rather than
// GenericImageView so the trait does not leak into this module's scope.

type PipelineResult<T> = std::result::Result<T, PixelPressError>;

const EPSILON: f64 = 1e-9;

/// Output of the transform engine.
#[derive(Clone, Debug)]
pub struct TransformedImage {
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    /// Source region drawn by a cover fit, in display pixel space.
    pub cover_crop: Option<Rect>,
    pub sharpened: bool,
}

/// Geometry of one draw: which source rectangle lands where on the canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawPlan {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Source rectangle in display (post-orientation) pixel space.
    pub source: Rect,
    pub draw_x: u32,
    pub draw_y: u32,
    pub draw_width: u32,
    pub draw_height: u32,
}

impl DrawPlan {
    fn filling(canvas_width: u32, canvas_height: u32, source: Rect) -> Self {
        Self {
            canvas_width,
            canvas_height,
            source,
            draw_x: 0,
            draw_y: 0,
            draw_width: canvas_width,
            draw_height: canvas_height,
        }
    }

    /// True when the drawn region covers the whole canvas.
    pub fn covers_canvas(&self) -> bool {
        self.draw_x == 0
            && self.draw_y == 0
            && self.draw_width == self.canvas_width
            && self.draw_height == self.canvas_height
    }

    /// Source pixels map 1:1 onto the drawn region.
    pub fn is_exact_copy(&self) -> bool {
        let s = self.source;
        is_whole(s.x)
            && is_whole(s.y)
            && (s.width - self.draw_width as f64).abs() < EPSILON
            && (s.height - self.draw_height as f64).abs() < EPSILON
    }

    /// The drawn region is smaller than the source on either axis.
    pub fn is_downscale(&self) -> bool {
        (self.draw_width as f64) < self.source.width - EPSILON
            || (self.draw_height as f64) < self.source.height - EPSILON
    }
}

fn is_whole(v: f64) -> bool {
    (v - v.round()).abs() < EPSILON
}

/// Calculate resize dimensions maintaining aspect ratio (fit = inside semantics)
pub fn calc_resize_dimensions(
    orig_w: u32,
    orig_h: u32,
    target_w: Option<u32>,
    target_h: Option<u32>,
) -> (u32, u32) {
    match (target_w, target_h) {
        (Some(w), Some(h)) => {
            let orig_ratio = orig_w as f64 / orig_h as f64;
            let target_ratio = w as f64 / h as f64;

            if orig_ratio > target_ratio {
                // Wider than the box: fit to width.
                let ratio = w as f64 / orig_w as f64;
                (w, (orig_h as f64 * ratio).round() as u32)
            } else {
                let ratio = h as f64 / orig_h as f64;
                ((orig_w as f64 * ratio).round() as u32, h)
            }
        }
        (Some(w), None) => {
            let ratio = w as f64 / orig_w as f64;
            (w, (orig_h as f64 * ratio).round() as u32)
        }
        (None, Some(h)) => {
            let ratio = h as f64 / orig_h as f64;
            ((orig_w as f64 * ratio).round() as u32, h)
        }
        (None, None) => (orig_w, orig_h),
    }
}

fn validate_crop(crop: PixelRect, display_w: u32, display_h: u32) -> PipelineResult<PixelRect> {
    if crop.width == 0 || crop.height == 0 {
        return Err(PixelPressError::invalid_crop_dimensions(
            crop.width,
            crop.height,
        ));
    }
    if !crop.fits_within(display_w, display_h) {
        return Err(PixelPressError::invalid_crop_bounds(
            crop.x,
            crop.y,
            crop.width,
            crop.height,
            display_w,
            display_h,
        ));
    }
    Ok(crop)
}

/// Work out the canvas size and the source-to-canvas mapping for a
/// `display_w x display_h` image.
pub fn plan_draw(
    display_w: u32,
    display_h: u32,
    options: &TransformOptions,
) -> PipelineResult<DrawPlan> {
    let region = match options.crop {
        Some(crop) => validate_crop(crop, display_w, display_h)?,
        None => PixelRect::new(0, 0, display_w, display_h),
    };
    let (rw, rh) = (region.width, region.height);

    match (options.width, options.height) {
        (Some(0), _) | (_, Some(0)) => Err(PixelPressError::invalid_resize_dimensions(
            options.width,
            options.height,
        )),
        (Some(w), Some(h)) => match options.fit {
            FitMode::Fill => Ok(DrawPlan::filling(w, h, region.to_rect())),
            FitMode::Cover => {
                let r = cover_crop_rect(rw, rh, w, h);
                let source = Rect::new(region.x as f64 + r.x, region.y as f64 + r.y, r.width, r.height);
                Ok(DrawPlan::filling(w, h, source))
            }
            FitMode::Contain => {
                let (iw, ih) = calc_resize_dimensions(rw, rh, Some(w), Some(h));
                let (iw, ih) = (iw.clamp(1, w), ih.clamp(1, h));
                Ok(DrawPlan {
                    canvas_width: w,
                    canvas_height: h,
                    source: region.to_rect(),
                    draw_x: (w - iw) / 2,
                    draw_y: (h - ih) / 2,
                    draw_width: iw,
                    draw_height: ih,
                })
            }
        },
        (w, h) => {
            let (ow, oh) = calc_resize_dimensions(rw, rh, w, h);
            Ok(DrawPlan::filling(ow.max(1), oh.max(1), region.to_rect()))
        }
    }
}

/// Allocate a zeroed `width x height x channels` output surface.
pub fn acquire_surface(width: u32, height: u32, channels: usize) -> PipelineResult<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(PixelPressError::context_failed(width, height, "empty surface"));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(PixelPressError::context_failed(
            width,
            height,
            format!("surface side exceeds {MAX_DIMENSION}"),
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(PixelPressError::context_failed(
            width,
            height,
            format!("surface exceeds {MAX_PIXELS} pixels"),
        ));
    }
    let len = usize::try_from(pixels)
        .ok()
        .and_then(|p| p.checked_mul(channels))
        .ok_or_else(|| PixelPressError::context_failed(width, height, "surface size overflow"))?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        PixelPressError::context_failed(width, height, format!("surface allocation failed: {e}"))
    })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Run the full transform for one decoded image.
pub fn apply_transform(
    decoded: DecodedImage,
    options: &TransformOptions,
    config: &PipelineConfig,
) -> PipelineResult<TransformedImage> {
    let (display_w, display_h) = decoded.display_dimensions();
    let plan = plan_draw(display_w, display_h, options)?;

    let background = options.effective_background();
    let source_alpha = decoded.image.color().has_alpha();
    let letterboxed = !plan.covers_canvas();
    let output_alpha = options.format.supports_alpha()
        && (source_alpha || (letterboxed && background[3] < 255));
    let channels = if output_alpha { 4 } else { 3 };
    let surface = acquire_surface(plan.canvas_width, plan.canvas_height, channels)?;

    let display = normalize_layout(decoded.into_display_image());
    let drawn = draw_region(display, &plan)?;

    let (drawn, sharpened) = match config.sharpen.effective_amount() {
        Some(amount) if plan.is_downscale() => (sharpen(&drawn, amount), true),
        _ => (drawn, false),
    };

    let image = compose(drawn, &plan, background, output_alpha, surface)?;

    debug!(
        target: "pixel_press::transform",
        display_w,
        display_h,
        out_w = plan.canvas_width,
        out_h = plan.canvas_height,
        fit = ?options.fit,
        sharpened,
        "transform applied"
    );

    let cover_crop = match (options.fit, options.width, options.height) {
        (FitMode::Cover, Some(_), Some(_)) => Some(plan.source),
        _ => None,
    };

    Ok(TransformedImage {
        width: plan.canvas_width,
        height: plan.canvas_height,
        image,
        cover_crop,
        sharpened,
    })
}

/// RGB8 for opaque sources, RGBA8 for anything with alpha.
fn normalize_layout(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Produce the `draw_width x draw_height` image for the plan's source rect.
/// Equal sizes copy pixels exactly; anything else is resampled.
fn draw_region(display: DynamicImage, plan: &DrawPlan) -> PipelineResult<DynamicImage> {
    let s = plan.source;
    if plan.is_exact_copy() {
        let (x, y) = (s.x.round() as u32, s.y.round() as u32);
        if x == 0 && y == 0 && display.width() == plan.draw_width && display.height() == plan.draw_height
        {
            return Ok(display);
        }
        return Ok(display.crop_imm(x, y, plan.draw_width, plan.draw_height));
    }
    resize_region(display, s, plan.draw_width, plan.draw_height)
        .map_err(ResizeError::into_pixel_press_error)
}

/// Paint `drawn` onto the surface filled with `background`.
fn compose(
    drawn: DynamicImage,
    plan: &DrawPlan,
    background: [u8; 4],
    output_alpha: bool,
    mut surface: Vec<u8>,
) -> PipelineResult<DynamicImage> {
    let channels = if output_alpha { 4 } else { 3 };
    let (cw, ch) = (plan.canvas_width, plan.canvas_height);
    let drawn_alpha = matches!(drawn, DynamicImage::ImageRgba8(_));

    // Straight copy when nothing shows through the drawn pixels.
    let direct = plan.covers_canvas()
        && drawn_alpha == output_alpha
        && (!drawn_alpha || background[3] == 0);

    if direct {
        let raw = match drawn {
            DynamicImage::ImageRgb8(buf) => buf.into_raw(),
            DynamicImage::ImageRgba8(buf) => buf.into_raw(),
            other => other.to_rgb8().into_raw(),
        };
        if raw.len() != surface.len() {
            return Err(PixelPressError::context_failed(cw, ch, "surface size mismatch"));
        }
        surface.copy_from_slice(&raw);
    } else {
        for px in surface.chunks_exact_mut(channels) {
            px.copy_from_slice(&background[..channels]);
        }
        let src = drawn.to_rgba8();
        let row_len = cw as usize * channels;
        for (y, src_row) in src.rows().enumerate() {
            let dst_y = plan.draw_y as usize + y;
            let start = dst_y * row_len + plan.draw_x as usize * channels;
            let dst_row = &mut surface[start..start + plan.draw_width as usize * channels];
            for (dst, s) in dst_row.chunks_exact_mut(channels).zip(src_row) {
                blend_over(dst, s.0);
            }
        }
    }

    let image = if output_alpha {
        RgbaImage::from_raw(cw, ch, surface).map(DynamicImage::ImageRgba8)
    } else {
        RgbImage::from_raw(cw, ch, surface).map(DynamicImage::ImageRgb8)
    };
    image.ok_or_else(|| PixelPressError::context_failed(cw, ch, "surface size mismatch"))
}

/// Source-over compositing of straight-alpha `src` onto `dst` (RGB or RGBA).
fn blend_over(dst: &mut [u8], src: [u8; 4]) {
    let sa = src[3] as u32;
    if sa == 255 {
        dst[..3].copy_from_slice(&src[..3]);
        if dst.len() == 4 {
            dst[3] = 255;
        }
        return;
    }
    let da = if dst.len() == 4 { dst[3] as u32 } else { 255 };
    // Everything scaled by 255*255.
    let out_a = sa * 255 + da * (255 - sa);
    if out_a == 0 {
        dst.fill(0);
        return;
    }
    for c in 0..3 {
        let v = src[c] as u32 * sa * 255 + dst[c] as u32 * da * (255 - sa);
        dst[c] = ((v + out_a / 2) / out_a) as u8;
    }
    if dst.len() == 4 {
        dst[3] = ((out_a + 127) / 255) as u8;
    }
}

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }

    pub fn into_pixel_press_error(self) -> PixelPressError {
        PixelPressError::resize_failed(self.source_dims, self.target_dims, self.reason)
    }
}

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

/// Resample `region` of `img` (sub-pixel offsets allowed) to
/// `dst_width x dst_height` with Lanczos3.
pub fn resize_region(
    img: DynamicImage,
    region: Rect,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, ResizeError> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ResizeError::new(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    // Take ownership of the pixel buffer; only exotic layouts are converted.
    let (pixel_type, src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        other => (PixelType::U8x4, other.to_rgba8().into_raw()),
    };

    let options = default_resize_options().crop(region.x, region.y, region.width, region.height);
    resize_pixels(
        src_width, src_height, src_pixels, pixel_type, region, dst_width, dst_height, options,
    )
    .map_err(|reason| ResizeError::new((src_width, src_height), (dst_width, dst_height), reason))
}

/// Decide whether alpha premultiplication is required for a given pixel layout.
#[inline]
fn requires_premultiply(pixel_type: PixelType) -> bool {
    matches!(pixel_type, PixelType::U8x4)
}

#[allow(clippy::too_many_arguments)]
fn resize_pixels(
    src_width: u32,
    src_height: u32,
    mut src_pixels: Vec<u8>,
    pixel_type: PixelType,
    region: Rect,
    dst_width: u32,
    dst_height: u32,
    options: ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let pixel_count = (src_width as usize)
        .checked_mul(src_height as usize)
        .ok_or_else(|| "image dimensions overflow during resize".to_string())?;
    let required_bytes = pixel_count
        .checked_mul(pixel_type.size())
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;

    if src_pixels.len() < required_bytes {
        return Err(format!(
            "fir source image invalid buffer size. expected {required_bytes} bytes, got {} bytes",
            src_pixels.len()
        ));
    }

    let primary_result = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => {
            resize_with_source_image(src_image, pixel_type, dst_width, dst_height, &options)
        }
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let aligned_image = copy_pixels_to_aligned_image(
                src_width,
                src_height,
                pixel_type,
                &src_pixels,
                required_bytes,
            )?;
            resize_with_source_image(aligned_image, pixel_type, dst_width, dst_height, &options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary_result {
        Ok(img) => Ok(img),
        Err(err) => {
            debug!(target: "pixel_press::transform", %err, "fir resize failed; using image crate");
            resize_with_image_crate_fallback(
                &src_pixels,
                src_width,
                src_height,
                pixel_type,
                region,
                dst_width,
                dst_height,
            )
            .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}"))
        }
    }
}

fn copy_pixels_to_aligned_image(
    width: u32,
    height: u32,
    pixel_type: PixelType,
    src_pixels: &[u8],
    required_bytes: usize,
) -> std::result::Result<fir::images::Image<'static>, String> {
    let mut aligned_image = fir::images::Image::new(width, height, pixel_type);
    let aligned_buffer = aligned_image.buffer_mut();
    if aligned_buffer.len() != required_bytes {
        return Err(format!(
            "fir alignment fallback buffer mismatch. expected {required_bytes} bytes, got {} bytes",
            aligned_buffer.len()
        ));
    }
    aligned_buffer.copy_from_slice(&src_pixels[..required_bytes]);
    Ok(aligned_image)
}

fn resize_with_image_crate_fallback(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    region: Rect,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let filter = FilterType::Lanczos3;
    let crop = region.to_pixel_rect(src_width, src_height);
    match pixel_type {
        PixelType::U8x3 => {
            let rgb = RgbImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgb image for fallback resize".to_string())?;
            let region =
                image::imageops::crop_imm(&rgb, crop.x, crop.y, crop.width, crop.height).to_image();
            Ok(DynamicImage::ImageRgb8(image::imageops::resize(
                &region, dst_width, dst_height, filter,
            )))
        }
        PixelType::U8x4 => {
            let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
            let region =
                image::imageops::crop_imm(&rgba, crop.x, crop.y, crop.width, crop.height).to_image();
            Ok(DynamicImage::ImageRgba8(image::imageops::resize(
                &region, dst_width, dst_height, filter,
            )))
        }
        _ => Err("fallback resize supports only U8x3/U8x4 pixel types".to_string()),
    }
}

/// Check if an RGBA image is fully opaque (all alpha values are 255).
///
/// Only checks images of at least 1MP; below that the SIMD premultiply is
/// cheaper than the scan.
fn is_fully_opaque(image: &fir::images::Image, pixel_type: PixelType, width: u32, height: u32) -> bool {
    if pixel_type != PixelType::U8x4 {
        return true;
    }

    const THRESHOLD_PIXELS: u64 = 1_000_000;
    if (width as u64).saturating_mul(height as u64) < THRESHOLD_PIXELS {
        return false;
    }

    image.buffer().iter().skip(3).step_by(4).all(|&alpha| alpha == 255)
}

fn resize_with_source_image<'a>(
    mut src_image: fir::images::Image<'a>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: &ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let src_width = src_image.width();
    let src_height = src_image.height();
    let needs_premultiply = requires_premultiply(pixel_type)
        && !is_fully_opaque(&src_image, pixel_type, src_width, src_height);

    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => {
            let rgb_image = RgbImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgb image from resized data")?;
            Ok(DynamicImage::ImageRgb8(rgb_image))
        }
        PixelType::U8x4 => {
            let rgba_image = RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgba image from resized data")?;
            Ok(DynamicImage::ImageRgba8(rgba_image))
        }
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}
