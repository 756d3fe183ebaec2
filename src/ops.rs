// src/ops.rs
//
// Transform options, output formats and presets.
// These are cheap to create and copy around - the expensive work happens
// when the engine decodes, draws and encodes.

use crate::crop::PixelRect;
use bitflags::bitflags;
use image::ImageFormat;

bitflags! {
    /// Capabilities of an output format, looked up once per encode.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FormatCaps: u8 {
        /// Format stores an alpha channel.
        const ALPHA = 1 << 0;
        /// Encoder honours a continuous quality parameter.
        const LOSSY_QUALITY = 1 << 1;
        /// Encoder can reduce the palette to 256 colours.
        const QUANTIZE = 1 << 2;
    }
}

/// Static per-format behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatPolicy {
    pub mime: &'static str,
    pub extension: &'static str,
    pub caps: FormatCaps,
}

/// Output format for encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::WebP];

    pub fn policy(self) -> FormatPolicy {
        match self {
            OutputFormat::Jpeg => FormatPolicy {
                mime: "image/jpeg",
                extension: "jpg",
                caps: FormatCaps::LOSSY_QUALITY,
            },
            OutputFormat::Png => FormatPolicy {
                mime: "image/png",
                extension: "png",
                caps: FormatCaps::ALPHA | FormatCaps::QUANTIZE,
            },
            OutputFormat::WebP => FormatPolicy {
                mime: "image/webp",
                extension: "webp",
                caps: FormatCaps::ALPHA | FormatCaps::LOSSY_QUALITY,
            },
        }
    }

    pub fn mime_type(self) -> &'static str {
        self.policy().mime
    }

    pub fn extension(self) -> &'static str {
        self.policy().extension
    }

    pub fn supports_alpha(self) -> bool {
        self.policy().caps.contains(FormatCaps::ALPHA)
    }

    /// Quality is a continuous knob; quality floors apply.
    pub fn is_lossy(self) -> bool {
        self.policy().caps.contains(FormatCaps::LOSSY_QUALITY)
    }

    pub fn can_quantize(self) -> bool {
        self.policy().caps.contains(FormatCaps::QUANTIZE)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    /// Parse a format name or MIME type ("jpg", "image/webp", ...).
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("image/").unwrap_or(&lowered);
        match name {
            "jpeg" | "jpg" | "pjpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Map a detected container format onto an encodable output format.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }
}

/// How the source is mapped onto the destination rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FitMode {
    /// Scale and crop so the destination is filled with no empty space.
    #[default]
    Cover,
    /// Scale so the whole source is visible, letterboxed on the background.
    Contain,
    /// Stretch the whole source onto the whole destination.
    Fill,
}

impl FitMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cover" => Some(Self::Cover),
            "contain" | "inside" | "letterbox" => Some(Self::Contain),
            "fill" | "stretch" => Some(Self::Fill),
            _ => None,
        }
    }
}

/// The tool an encode is performed for. Selects the quality floor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UseCase {
    #[default]
    Compression,
    Conversion,
    Resize,
    Preset,
    Crop,
    ExifStrip,
}

/// Parameters for one decode -> draw -> encode invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: FitMode,
    /// Crop in display (post-orientation) pixel space, applied before fitting.
    pub crop: Option<PixelRect>,
    /// RGBA background. `None` means white for opaque formats, transparent otherwise.
    pub background: Option<[u8; 4]>,
    pub format: OutputFormat,
    /// Requested quality in 0..=1; the policy floor is applied on top.
    pub quality: f32,
    pub use_case: UseCase,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            fit: FitMode::Cover,
            crop: None,
            background: None,
            format: OutputFormat::Jpeg,
            quality: 1.0,
            use_case: UseCase::Conversion,
        }
    }
}

impl TransformOptions {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_fit(mut self, fit: FitMode) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_crop(mut self, crop: PixelRect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_background(mut self, rgba: [u8; 4]) -> Self {
        self.background = Some(rgba);
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_use_case(mut self, use_case: UseCase) -> Self {
        self.use_case = use_case;
        self
    }

    /// Background actually painted behind the source for this format.
    pub fn effective_background(&self) -> [u8; 4] {
        match self.background {
            Some([r, g, b, a]) if !self.format.supports_alpha() => {
                // Opaque formats cannot carry a translucent background.
                if a == 255 {
                    [r, g, b, 255]
                } else {
                    blend_over_white([r, g, b, a])
                }
            }
            Some(rgba) => rgba,
            None if self.format.supports_alpha() => [0, 0, 0, 0],
            None => [255, 255, 255, 255],
        }
    }
}

fn blend_over_white([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let blend = |c: u8| -> u8 {
        let c = c as u32;
        let a = a as u32;
        ((c * a + 255 * (255 - a) + 127) / 255) as u8
    };
    [blend(r), blend(g), blend(b), 255]
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` into RGBA.
pub fn parse_hex_color(value: &str) -> Option<[u8; 4]> {
    let hex = value.trim().strip_prefix('#').unwrap_or(value.trim());
    let nibble = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => Some([nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17, 255]),
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Some([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
        _ => None,
    }
}

// =============================================================================
// PRESETS - Social media target sizes
// =============================================================================

/// A named target size. The engine consumes only width, height and quality.
#[derive(Clone, Debug, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub quality: f32,
    pub aspect_label: &'static str,
}

const BUILTIN_PRESETS: &[Preset] = &[
    Preset::builtin("instagram-square", 1080, 1080, "1:1"),
    Preset::builtin("instagram-portrait", 1080, 1350, "4:5"),
    Preset::builtin("instagram-story", 1080, 1920, "9:16"),
    Preset::builtin("facebook-cover", 820, 312, "205:78"),
    Preset::builtin("facebook-post", 1200, 630, "1.91:1"),
    Preset::builtin("twitter-post", 1600, 900, "16:9"),
    Preset::builtin("twitter-header", 1500, 500, "3:1"),
    Preset::builtin("linkedin-banner", 1584, 396, "4:1"),
    Preset::builtin("youtube-thumbnail", 1280, 720, "16:9"),
    Preset::builtin("pinterest-pin", 1000, 1500, "2:3"),
];

impl Preset {
    const fn builtin(name: &'static str, width: u32, height: u32, aspect_label: &'static str) -> Self {
        Self {
            name,
            width,
            height,
            quality: 0.92,
            aspect_label,
        }
    }

    pub fn new(name: &'static str, width: u32, height: u32, quality: f32) -> Self {
        Self {
            name,
            width,
            height,
            quality,
            aspect_label: "",
        }
    }

    /// Look up a built-in preset by name (case-insensitive, `_` or ` ` accepted for `-`).
    pub fn get(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase().replace([' ', '_'], "-");
        BUILTIN_PRESETS.iter().find(|p| p.name == wanted).cloned()
    }

    pub fn all() -> &'static [Preset] {
        BUILTIN_PRESETS
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}
