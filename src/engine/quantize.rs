// src/engine/quantize.rs
//
// Palette reduction for lossy PNG compression: NeuQuant maps the image to
// at most 256 RGBA colours. oxipng later stores the result as an indexed PNG.

use color_quant::NeuQuant;
use image::{DynamicImage, RgbaImage};
use std::collections::HashSet;

pub const MAX_PALETTE_COLORS: usize = 256;

/// NeuQuant sampling factor: 1 is slowest and best, 30 fastest.
fn sample_factor(quality: f32) -> i32 {
    // Map quality 0..1 onto 30..1.
    let q = quality.clamp(0.0, 1.0);
    (30.0 - q * 29.0).round() as i32
}

/// True when the image already fits in a 256-colour palette.
pub fn fits_palette(img: &RgbaImage) -> bool {
    let mut seen = HashSet::with_capacity(MAX_PALETTE_COLORS + 1);
    for px in img.pixels() {
        seen.insert(px.0);
        if seen.len() > MAX_PALETTE_COLORS {
            return false;
        }
    }
    true
}

/// Remap `img` to at most 256 colours. Images that already fit are
/// returned unchanged (as RGBA8).
pub fn quantize(img: &DynamicImage, quality: f32) -> RgbaImage {
    let rgba = img.to_rgba8();
    if fits_palette(&rgba) {
        return rgba;
    }
    let nq = NeuQuant::new(sample_factor(quality), MAX_PALETTE_COLORS, rgba.as_raw());
    let palette = nq.color_map_rgba();
    let mut out = rgba;
    for px in out.pixels_mut() {
        let idx = nq.index_of(&px.0) * 4;
        px.0.copy_from_slice(&palette[idx..idx + 4]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn noisy(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(2654435761).wrapping_add(y.wrapping_mul(40503));
            Rgba([(v >> 3) as u8, (v >> 11) as u8, (v >> 19) as u8, 255])
        })
    }

    #[test]
    fn test_quantized_image_has_at_most_256_colors() {
        let src = noisy(64, 64);
        assert!(!fits_palette(&src));
        let out = quantize(&DynamicImage::ImageRgba8(src), 0.5);
        assert!(fits_palette(&out));
        assert_eq!(out.dimensions(), (64, 64));
    }

    #[test]
    fn test_small_palette_is_untouched() {
        let src = RgbaImage::from_fn(16, 16, |x, _| Rgba([(x * 10) as u8, 0, 0, 255]));
        let out = quantize(&DynamicImage::ImageRgba8(src.clone()), 0.1);
        assert_eq!(out.as_raw(), src.as_raw());
    }

    #[test]
    fn test_sample_factor_range() {
        assert_eq!(sample_factor(1.0), 1);
        assert_eq!(sample_factor(0.0), 30);
        assert_eq!(sample_factor(7.0), 1);
    }
}
