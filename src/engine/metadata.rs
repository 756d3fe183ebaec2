// src/engine/metadata.rs
//
// EXIF inspection (kamadak-exif) and lossless EXIF removal (img-parts).

use crate::engine::orientation::Orientation;
use crate::error::PixelPressError;
use exif::{Context, In, Reader, Tag};
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::webp::WebP;
use img_parts::{Bytes, ImageEXIF};
use std::io::Cursor;

type MetadataResult<T> = std::result::Result<T, PixelPressError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExifEntry {
    pub tag: String,
    /// "primary" or "thumbnail".
    pub ifd: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExifSummary {
    pub entries: Vec<ExifEntry>,
    pub orientation: Orientation,
    pub has_gps: bool,
}

impl ExifSummary {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.tag == tag && e.ifd == "primary")
            .map(|e| e.value.as_str())
    }
}

fn ifd_name(ifd: In) -> &'static str {
    if ifd == In::PRIMARY {
        "primary"
    } else if ifd == In::THUMBNAIL {
        "thumbnail"
    } else {
        "other"
    }
}

/// List every EXIF field with a human-readable value. Images without EXIF
/// give an empty summary.
pub fn inspect_exif(bytes: &[u8]) -> MetadataResult<ExifSummary> {
    let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(ExifSummary::default()),
        Err(e) => return Err(PixelPressError::decode_failed(format!("exif: {e}"))),
    };

    let entries = exif
        .fields()
        .map(|f| ExifEntry {
            tag: f.tag.to_string(),
            ifd: ifd_name(f.ifd_num),
            value: f.display_value().with_unit(&exif).to_string(),
        })
        .collect();

    let orientation = exif
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .and_then(|v| u16::try_from(v).ok())
        .and_then(Orientation::from_exif)
        .unwrap_or_default();

    let has_gps = exif.fields().any(|f| f.tag.context() == Context::Gps);

    Ok(ExifSummary {
        entries,
        orientation,
        has_gps,
    })
}

/// Remove the EXIF block from a JPEG, PNG or WebP without touching pixels.
pub fn strip_exif_lossless(bytes: &[u8]) -> MetadataResult<Vec<u8>> {
    let data = Bytes::copy_from_slice(bytes);
    let mut out = Vec::with_capacity(bytes.len());

    let written = if bytes.starts_with(&[0xFF, 0xD8]) {
        let mut jpeg = Jpeg::from_bytes(data)
            .map_err(|e| PixelPressError::decode_failed(format!("jpeg container: {e}")))?;
        jpeg.set_exif(None);
        jpeg.encoder().write_to(&mut out)
    } else if bytes.starts_with(b"\x89PNG") {
        let mut png = Png::from_bytes(data)
            .map_err(|e| PixelPressError::decode_failed(format!("png container: {e}")))?;
        png.set_exif(None);
        png.encoder().write_to(&mut out)
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        let mut webp = WebP::from_bytes(data)
            .map_err(|e| PixelPressError::decode_failed(format!("webp container: {e}")))?;
        webp.set_exif(None);
        webp.encoder().write_to(&mut out)
    } else {
        return Err(PixelPressError::unsupported_format(
            "lossless EXIF removal supports JPEG, PNG and WebP",
        ));
    };

    written.map_err(|e| PixelPressError::encode_failed("container", format!("rewrite failed: {e}")))?;
    Ok(out)
}
