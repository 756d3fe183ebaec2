// src/engine/io.rs
//
// I/O: input sources (in-memory or memory-mapped), named input files with
// their declared MIME type, and ICC profile extraction.

use crate::error::PixelPressError;
use img_parts::{jpeg::Jpeg, png::Png, ImageICC};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Image bytes, either owned or mapped from disk.
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory image data.
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access).
    Mapped(Arc<Mmap>),
}

impl Source {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Source::Memory(Arc::new(bytes.into()))
    }

    /// Map `path` into memory. Empty files are read as an empty buffer,
    /// since a zero-length mapping is an error on some platforms.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PixelPressError> {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PixelPressError::file_not_found(display.clone())
            } else {
                PixelPressError::file_read_failed(display.clone(), e)
            }
        })?;
        let len = file
            .metadata()
            .map_err(|e| PixelPressError::file_read_failed(display.clone(), e))?
            .len();
        if len == 0 {
            return Ok(Source::Memory(Arc::new(Vec::new())));
        }

        // Safety: the file is assumed not to change while mapped. If it does,
        // decoding may fail or read torn data.
        let mmap = unsafe { Mmap::map(&file).map_err(|e| PixelPressError::mmap_failed(display, e))? };
        Ok(Source::Mapped(Arc::new(mmap)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Source::Memory(data) => data.as_slice(),
            Source::Mapped(mmap) => mmap.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One file handed to the pipeline: a display name, the MIME type the
/// caller declared (if any) and the bytes.
#[derive(Clone, Debug)]
pub struct InputFile {
    pub name: String,
    pub mime: Option<String>,
    pub source: Source,
}

impl InputFile {
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        let name = name.into();
        let mime = mime_from_extension(&name).map(str::to_string);
        Self { name, mime, source }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(name, Source::from_bytes(bytes))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PixelPressError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(Self::new(name, Source::from_path(path)?))
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[..idx],
            _ => &self.name,
        }
    }
}

/// MIME type for the image extensions the tools accept.
pub fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    Some(mime)
}

/// Extract ICC profile from image data.
/// Supports JPEG (APP2 marker), PNG (iCCP chunk), and WebP (ICCP chunk).
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 12 {
        return None;
    }

    let icc_data = if data[0] == 0xFF && data[1] == 0xD8 {
        extract_icc_from_jpeg(data)?
    } else if data.starts_with(b"\x89PNG") {
        extract_icc_from_png(data)?
    } else if &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        extract_icc_from_webp(data)?
    } else {
        return None;
    };

    if validate_icc_profile(&icc_data) {
        Some(icc_data)
    } else {
        None
    }
}

fn is_signature(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| (32..=126).contains(&b) || b == 0)
}

/// Validate the 128-byte ICC header: declared size, ASCII signatures and a
/// plausible major version.
pub(crate) fn validate_icc_profile(icc_data: &[u8]) -> bool {
    if icc_data.len() < 128 {
        return false;
    }

    let profile_size =
        u32::from_be_bytes([icc_data[0], icc_data[1], icc_data[2], icc_data[3]]) as usize;
    if profile_size != icc_data.len() {
        return false;
    }

    // CMM type, profile class, data colour space and PCS are four-char codes.
    if !is_signature(&icc_data[4..8]) {
        return false;
    }
    if icc_data[8] > 10 {
        return false;
    }
    is_signature(&icc_data[12..16]) && is_signature(&icc_data[16..20]) && is_signature(&icc_data[20..24])
}

pub(crate) fn extract_icc_from_jpeg(data: &[u8]) -> Option<Vec<u8>> {
    let jpeg = Jpeg::from_bytes(data.to_vec().into()).ok()?;
    jpeg.icc_profile().map(|icc| icc.to_vec())
}

pub(crate) fn extract_icc_from_png(data: &[u8]) -> Option<Vec<u8>> {
    let png = Png::from_bytes(data.to_vec().into()).ok()?;
    png.icc_profile().map(|icc| icc.to_vec())
}

pub(crate) fn extract_icc_from_webp(data: &[u8]) -> Option<Vec<u8>> {
    use img_parts::webp::WebP;
    let webp = WebP::from_bytes(data.to_vec().into()).ok()?;
    webp.icc_profile().map(|icc| icc.to_vec())
}
