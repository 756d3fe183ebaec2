#![no_main]

use libfuzzer_sys::fuzz_target;
use pixel_press::engine::{decode, inspect_header, DecodeStrategy};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let _ = inspect_header(data);
    let _ = decode(data, DecodeStrategy::Auto);
    let _ = decode(data, DecodeStrategy::ManualOrientation);
});
