#![no_main]

//! Fuzz target for the encoders: JPEG (mozjpeg), PNG (lossless and
//! quantized) and WebP, with arbitrary pixels and quality.

use arbitrary::{Arbitrary, Unstructured};
use image::{DynamicImage, RgbaImage};
use libfuzzer_sys::fuzz_target;
use pixel_press::engine::{encode_with, PngMode};
use pixel_press::ops::OutputFormat;

#[derive(Arbitrary, Debug)]
struct EncodeSeed {
    format: u8,
    quality: u8,
    width: u8,
    height: u8,
    quantize: bool,
}

fn build_image(data: &[u8], width: u8, height: u8) -> Option<DynamicImage> {
    // Limit dimensions to avoid OOM (max 128x128 = 64KB RGBA)
    let w = (width as u32 % 128).max(1);
    let h = (height as u32 % 128).max(1);
    let pixel_count = (w * h * 4) as usize;

    let mut buffer = vec![0u8; pixel_count];
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = data.get(i % data.len().max(1)).copied().unwrap_or(128);
    }
    RgbaImage::from_raw(w, h, buffer).map(DynamicImage::ImageRgba8)
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 5 {
        return;
    }

    let mut unstructured = Unstructured::new(data);
    let seed: EncodeSeed = match EncodeSeed::arbitrary(&mut unstructured) {
        Ok(s) => s,
        Err(_) => return,
    };
    let Some(img) = build_image(data, seed.width, seed.height) else {
        return;
    };
    let quality = seed.quality as f32 / 255.0;
    let format = OutputFormat::ALL[seed.format as usize % OutputFormat::ALL.len()];
    let png_mode = if seed.quantize {
        PngMode::Quantized
    } else {
        PngMode::Lossless
    };

    // Encoding errors are fine; panics and empty outputs are not.
    if let Ok(bytes) = encode_with(&img, format, quality, png_mode, None) {
        assert!(!bytes.is_empty());
    }
});
