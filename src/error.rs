// src/error.rs
//
// Unified error handling for pixel-press
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input, recoverable
// - CodecError: Format/encoding issues
// - ResourceLimit: Memory/surface/dimension limits
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by callers to decide how to present a failure.
///
/// - UserError: Invalid input, recoverable by user
/// - CodecError: Format/encoding issues
/// - ResourceLimit: Memory/surface/dimension limits
/// - InternalBug: Library bugs (should not happen)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Memory/surface/dimension limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// pixel-press error types
#[derive(Debug, Error)]
pub enum PixelPressError {
    // File I/O Errors
    #[error("File not found: {path}")]
    FileNotFound { path: Cow<'static, str> },

    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to memory-map file '{path}': {source}")]
    MmapFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Corrupted image data")]
    CorruptedImage,

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Failed to acquire a {width}x{height} drawing surface: {message}")]
    ContextFailed {
        width: u32,
        height: u32,
        message: Cow<'static, str>,
    },

    // Operation Errors
    #[error("Crop bounds ({x}+{width}, {y}+{height}) exceed image dimensions ({img_width}x{img_height})")]
    InvalidCropBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },

    #[error("Invalid crop dimensions: width={width}, height={height}")]
    InvalidCropDimensions { width: u32, height: u32 },

    #[error("Invalid resize dimensions: width={width:?}, height={height:?}")]
    InvalidResizeDimensions {
        width: Option<u32>,
        height: Option<u32>,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Failed to build archive: {message}")]
    ArchiveFailed { message: Cow<'static, str> },

    // Configuration Errors
    #[error("Unknown preset: '{name}'")]
    InvalidPreset { name: Cow<'static, str> },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

fn clone_io_error(source: &std::io::Error) -> std::io::Error {
    std::io::Error::new(source.kind(), source.to_string())
}

impl Clone for PixelPressError {
    fn clone(&self) -> Self {
        match self {
            Self::FileNotFound { path } => Self::FileNotFound { path: path.clone() },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: clone_io_error(source),
            },
            Self::MmapFailed { path, source } => Self::MmapFailed {
                path: path.clone(),
                source: clone_io_error(source),
            },
            Self::FileWriteFailed { path, source } => Self::FileWriteFailed {
                path: path.clone(),
                source: clone_io_error(source),
            },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::CorruptedImage => Self::CorruptedImage,
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::ContextFailed {
                width,
                height,
                message,
            } => Self::ContextFailed {
                width: *width,
                height: *height,
                message: message.clone(),
            },
            Self::InvalidCropBounds {
                x,
                y,
                width,
                height,
                img_width,
                img_height,
            } => Self::InvalidCropBounds {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
                img_width: *img_width,
                img_height: *img_height,
            },
            Self::InvalidCropDimensions { width, height } => Self::InvalidCropDimensions {
                width: *width,
                height: *height,
            },
            Self::InvalidResizeDimensions { width, height } => Self::InvalidResizeDimensions {
                width: *width,
                height: *height,
            },
            Self::ResizeFailed {
                source_width,
                source_height,
                target_width,
                target_height,
                message,
            } => Self::ResizeFailed {
                source_width: *source_width,
                source_height: *source_height,
                target_width: *target_width,
                target_height: *target_height,
                message: message.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::ArchiveFailed { message } => Self::ArchiveFailed {
                message: message.clone(),
            },
            Self::InvalidPreset { name } => Self::InvalidPreset { name: name.clone() },
            Self::InvalidArgument {
                name,
                value,
                reason,
            } => Self::InvalidArgument {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl PixelPressError {
    pub fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn mmap_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::MmapFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn corrupted_image() -> Self {
        Self::CorruptedImage
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn context_failed(width: u32, height: u32, message: impl Into<Cow<'static, str>>) -> Self {
        Self::ContextFailed {
            width,
            height,
            message: message.into(),
        }
    }

    pub fn invalid_crop_bounds(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    ) -> Self {
        Self::InvalidCropBounds {
            x,
            y,
            width,
            height,
            img_width,
            img_height,
        }
    }

    pub fn invalid_crop_dimensions(width: u32, height: u32) -> Self {
        Self::InvalidCropDimensions { width, height }
    }

    pub fn invalid_resize_dimensions(width: Option<u32>, height: Option<u32>) -> Self {
        Self::InvalidResizeDimensions { width, height }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn archive_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::ArchiveFailed {
            message: message.into(),
        }
    }

    pub fn invalid_preset(name: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidPreset { name: name.into() }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are
    /// recoverable, CodecError and InternalBug are not.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FileNotFound { .. }
            | Self::InvalidCropBounds { .. }
            | Self::InvalidCropDimensions { .. }
            | Self::InvalidResizeDimensions { .. }
            | Self::InvalidPreset { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::UserError,

            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::CorruptedImage
            | Self::EncodeFailed { .. }
            | Self::ResizeFailed { .. } => ErrorCategory::CodecError,

            // I/O failures land here because the user can usually fix them
            // (permissions, disk space) rather than because they are codec bugs.
            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::ContextFailed { .. }
            | Self::FileReadFailed { .. }
            | Self::MmapFailed { .. }
            | Self::FileWriteFailed { .. }
            | Self::ArchiveFailed { .. } => ErrorCategory::ResourceLimit,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, PixelPressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PixelPressError::file_not_found("/path/to/file.jpg");
        assert!(err.to_string().contains("/path/to/file.jpg"));

        let err = PixelPressError::context_failed(0, 10, "zero-sized surface");
        assert_eq!(
            err.to_string(),
            "Failed to acquire a 0x10 drawing surface: zero-sized surface"
        );
    }

    #[test]
    fn test_error_recoverable() {
        assert!(PixelPressError::file_not_found("test.jpg").is_recoverable());
        assert!(PixelPressError::invalid_crop_bounds(0, 0, 100, 100, 50, 50).is_recoverable());
        assert!(PixelPressError::invalid_crop_dimensions(0, 100).is_recoverable());
        assert!(PixelPressError::context_failed(1, 1, "oom").is_recoverable());
        assert!(!PixelPressError::decode_failed("test").is_recoverable());
        assert!(!PixelPressError::encode_failed("png", "empty").is_recoverable());
        assert!(!PixelPressError::internal_panic("test").is_recoverable());
    }

    #[test]
    fn test_error_category_user_error() {
        for err in [
            PixelPressError::file_not_found("test.jpg"),
            PixelPressError::invalid_crop_bounds(0, 0, 100, 100, 50, 50),
            PixelPressError::invalid_crop_dimensions(0, 100),
            PixelPressError::invalid_resize_dimensions(Some(0), None),
            PixelPressError::invalid_preset("unknown"),
            PixelPressError::invalid_argument("quality", "2.0", "must be within 0..=1"),
        ] {
            assert_eq!(err.category(), ErrorCategory::UserError, "{err}");
        }
    }

    #[test]
    fn test_error_category_codec_error() {
        for err in [
            PixelPressError::unsupported_format("image/heic"),
            PixelPressError::decode_failed("test"),
            PixelPressError::corrupted_image(),
            PixelPressError::encode_failed("jpeg", "test"),
            PixelPressError::resize_failed((100, 100), (50, 50), "test"),
        ] {
            assert_eq!(err.category(), ErrorCategory::CodecError, "{err}");
        }
    }

    #[test]
    fn test_error_category_resource_limit() {
        for err in [
            PixelPressError::dimension_exceeds_limit(40000, 32768),
            PixelPressError::pixel_count_exceeds_limit(1_000_000_000, 100_000_000),
            PixelPressError::context_failed(10, 10, "allocation failed"),
            PixelPressError::archive_failed("zip writer closed"),
            PixelPressError::file_write_failed(
                "out.zip",
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ),
        ] {
            assert_eq!(err.category(), ErrorCategory::ResourceLimit, "{err}");
        }
    }

    #[test]
    fn test_error_category_internal_bug() {
        assert_eq!(
            PixelPressError::internal_panic("test").category(),
            ErrorCategory::InternalBug
        );
        assert_eq!(ErrorCategory::InternalBug.as_str(), "InternalBug");
    }

    #[test]
    fn test_clone_preserves_io_error_kind() {
        let err = PixelPressError::file_read_failed(
            "missing.png",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        match err.clone() {
            PixelPressError::FileReadFailed { path, source } => {
                assert_eq!(path, "missing.png");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected clone result: {other:?}"),
        }
    }
}
