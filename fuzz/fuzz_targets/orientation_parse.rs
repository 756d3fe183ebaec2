#![no_main]

//! Fuzz target for the EXIF orientation reader and the kamadak-exif
//! inspection path. The reader must never panic and always return a
//! valid orientation.

use libfuzzer_sys::fuzz_target;
use pixel_press::engine::{inspect_exif, read_orientation};

fuzz_target!(|data: &[u8]| {
    let orientation = read_orientation(data);
    assert!((1..=8).contains(&orientation.exif_value()));

    // Also run it behind a JPEG SOI + APP1 header so the TIFF walker sees
    // the fuzzer's bytes.
    let mut framed = vec![0xFF, 0xD8, 0xFF, 0xE1];
    let len = (data.len() + 8).min(u16::MAX as usize) as u16;
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(b"Exif\0\0");
    framed.extend_from_slice(data);
    let _ = read_orientation(&framed);
    let _ = inspect_exif(&framed);
});
