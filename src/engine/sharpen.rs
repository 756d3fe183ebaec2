// src/engine/sharpen.rs
//
// 3x3 unsharp kernel applied after downscaling:
//
//     [  0, -m,    0 ]
//     [ -m, 1+4m, -m ]
//     [  0, -m,    0 ]
//
// Colour channels only; alpha is copied through. Edge pixels sample with
// clamp-to-edge. Rows are processed in parallel.

use image::{DynamicImage, ImageBuffer, Pixel, Rgb, Rgba};
use rayon::prelude::*;

/// Sharpen `img` with mix amount `amount`. Non-8-bit images are converted
/// to RGB8/RGBA8 first.
pub fn sharpen(img: &DynamicImage, amount: f32) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(sharpen_buffer::<Rgb<u8>>(buf, amount)),
        DynamicImage::ImageRgba8(buf) => {
            DynamicImage::ImageRgba8(sharpen_buffer::<Rgba<u8>>(buf, amount))
        }
        other if other.color().has_alpha() => {
            DynamicImage::ImageRgba8(sharpen_buffer::<Rgba<u8>>(&other.to_rgba8(), amount))
        }
        other => DynamicImage::ImageRgb8(sharpen_buffer::<Rgb<u8>>(&other.to_rgb8(), amount)),
    }
}

fn sharpen_buffer<P>(src: &ImageBuffer<P, Vec<u8>>, amount: f32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    let (width, height) = src.dimensions();
    let channels = P::CHANNEL_COUNT as usize;
    // Alpha is always the last channel for the pixel types we accept.
    let colour_channels = if channels == 4 { 3 } else { channels };
    let stride = width as usize * channels;
    let raw = src.as_raw();
    let center = 1.0 + 4.0 * amount;

    let mut out = raw.clone();
    if width == 0 || height == 0 {
        return ImageBuffer::from_raw(width, height, out).unwrap_or_else(|| src.clone());
    }

    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let up = y.saturating_sub(1) * stride;
        let here = y * stride;
        let down = (y + 1).min(height as usize - 1) * stride;
        for x in 0..width as usize {
            let left = x.saturating_sub(1) * channels;
            let mid = x * channels;
            let right = (x + 1).min(width as usize - 1) * channels;
            for c in 0..colour_channels {
                let neighbours = raw[up + mid + c] as f32
                    + raw[down + mid + c] as f32
                    + raw[here + left + c] as f32
                    + raw[here + right + c] as f32;
                let value = center * raw[here + mid + c] as f32 - amount * neighbours;
                row[mid + c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    });

    // Same dimensions and layout as `src`, so this cannot fail.
    ImageBuffer::from_raw(width, height, out).unwrap_or_else(|| src.clone())
}
