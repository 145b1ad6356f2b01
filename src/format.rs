// src/format.rs
//
// Output formats and per-image compression settings.
// Settings are plain values: an update builds a new value instead of mutating in place.

use std::fmt;

/// MIME type of vector sources. These are always rasterized.
pub const SVG_MIME: &str = "image/svg+xml";

/// Default quality for new images (0.0 - 1.0).
pub const DEFAULT_QUALITY: f64 = 0.8;

/// Requested output format.
///
/// `Original` and `Ico` are symbolic: the pipeline resolves them to a concrete
/// encoder target before encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Original,
    Jpeg,
    Png,
    WebP,
    Avif,
    Jxl,
    Qoi,
    Ico,
}

impl ImageFormat {
    /// Every selectable format, in menu order.
    pub const ALL: [ImageFormat; 8] = [
        ImageFormat::Original,
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::WebP,
        ImageFormat::Avif,
        ImageFormat::Jxl,
        ImageFormat::Qoi,
        ImageFormat::Ico,
    ];

    /// Raster formats that can be kept as-is when `Original` is requested.
    pub const ENCODABLE: [ImageFormat; 6] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::WebP,
        ImageFormat::Avif,
        ImageFormat::Jxl,
        ImageFormat::Qoi,
    ];

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Original => "original",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Avif => "image/avif",
            ImageFormat::Jxl => "image/jxl",
            ImageFormat::Qoi => "image/qoi",
            ImageFormat::Ico => "image/x-icon",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "original" => Some(ImageFormat::Original),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/webp" => Some(ImageFormat::WebP),
            "image/avif" => Some(ImageFormat::Avif),
            "image/jxl" => Some(ImageFormat::Jxl),
            "image/qoi" => Some(ImageFormat::Qoi),
            "image/x-icon" | "image/vnd.microsoft.icon" => Some(ImageFormat::Ico),
            _ => None,
        }
    }

    /// File extension for downloads. `Original` has none of its own.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ImageFormat::Original => None,
            ImageFormat::Jpeg => Some("jpg"),
            ImageFormat::Png => Some("png"),
            ImageFormat::WebP => Some("webp"),
            ImageFormat::Avif => Some("avif"),
            ImageFormat::Jxl => Some("jxl"),
            ImageFormat::Qoi => Some("qoi"),
            ImageFormat::Ico => Some("ico"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImageFormat::Original => "Original",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::WebP => "WebP",
            ImageFormat::Avif => "AVIF",
            ImageFormat::Jxl => "JXL",
            ImageFormat::Qoi => "QOI",
            ImageFormat::Ico => "ICO",
        }
    }

    /// Lossy encoders take the quality percentage.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            ImageFormat::Jpeg | ImageFormat::WebP | ImageFormat::Avif | ImageFormat::Jxl
        )
    }

    pub fn is_encodable(&self) -> bool {
        Self::ENCODABLE.contains(self)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pixel dimensions. `(0, 0)` marks an image whose size could not be probed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_known(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Height that keeps this aspect ratio for a new width.
    pub fn height_for_width(&self, width: u32) -> Option<u32> {
        if !self.is_known() {
            return None;
        }
        let ratio = self.width as f64 / self.height as f64;
        Some((width as f64 / ratio).round() as u32)
    }

    /// Width that keeps this aspect ratio for a new height.
    pub fn width_for_height(&self, height: u32) -> Option<u32> {
        if !self.is_known() {
            return None;
        }
        let ratio = self.width as f64 / self.height as f64;
        Some((height as f64 * ratio).round() as u32)
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Compression settings owned by one image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressionSettings {
    pub format: ImageFormat,
    /// 0.0 - 1.0, only used by lossy encoders
    pub quality: f64,
    /// Trades PNG optimization effort for speed
    pub auto_mode: bool,
    pub resize_enabled: bool,
    pub resize_width: u32,
    pub resize_height: u32,
    /// UI constraint only; the pipeline resizes to exactly resize_width x resize_height
    pub maintain_aspect_ratio: bool,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            format: ImageFormat::Original,
            quality: DEFAULT_QUALITY,
            auto_mode: true,
            resize_enabled: false,
            resize_width: 0,
            resize_height: 0,
            maintain_aspect_ratio: true,
        }
    }
}

impl CompressionSettings {
    /// Settings for a freshly added image of the given natural size.
    pub fn for_image(format: ImageFormat, quality: f64, natural: Dimensions) -> Self {
        Self {
            format,
            quality,
            resize_width: natural.width,
            resize_height: natural.height,
            ..Self::default()
        }
    }

    /// Quality as the integer percentage lossy encoders expect.
    pub fn quality_percent(&self) -> u8 {
        quality_percent(self.quality)
    }

    /// Dimensions the image will actually be encoded at.
    pub fn output_dimensions(&self, natural: Dimensions) -> Dimensions {
        if self.resize_enabled {
            Dimensions::new(self.resize_width, self.resize_height)
        } else {
            natural
        }
    }

    pub fn with_update(&self, update: &SettingsUpdate) -> Self {
        Self {
            format: update.format.unwrap_or(self.format),
            quality: update.quality.unwrap_or(self.quality),
            auto_mode: update.auto_mode.unwrap_or(self.auto_mode),
            resize_enabled: update.resize_enabled.unwrap_or(self.resize_enabled),
            resize_width: update.resize_width.unwrap_or(self.resize_width),
            resize_height: update.resize_height.unwrap_or(self.resize_height),
            maintain_aspect_ratio: update
                .maintain_aspect_ratio
                .unwrap_or(self.maintain_aspect_ratio),
        }
    }
}

/// `round(clamp(quality, 0, 1) * 100)`. NaN maps to 0.
pub fn quality_percent(quality: f64) -> u8 {
    if quality.is_nan() {
        return 0;
    }
    (quality.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Partial settings change. Unset fields keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SettingsUpdate {
    pub format: Option<ImageFormat>,
    pub quality: Option<f64>,
    pub auto_mode: Option<bool>,
    pub resize_enabled: Option<bool>,
    pub resize_width: Option<u32>,
    pub resize_height: Option<u32>,
    pub maintain_aspect_ratio: Option<bool>,
}

impl SettingsUpdate {
    pub fn format(format: ImageFormat) -> Self {
        Self {
            format: Some(format),
            ..Self::default()
        }
    }

    pub fn quality(quality: f64) -> Self {
        Self {
            quality: Some(quality),
            ..Self::default()
        }
    }

    pub fn resize(width: u32, height: u32) -> Self {
        Self {
            resize_enabled: Some(true),
            resize_width: Some(width),
            resize_height: Some(height),
            ..Self::default()
        }
    }

    pub fn resize_enabled(enabled: bool) -> Self {
        Self {
            resize_enabled: Some(enabled),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_round_trip_for_every_format() {
        for format in ImageFormat::ALL {
            assert_eq!(ImageFormat::from_mime(format.mime_type()), Some(format));
        }
        assert_eq!(ImageFormat::from_mime("image/jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime(SVG_MIME), None);
        assert_eq!(ImageFormat::from_mime("image/gif"), None);
    }

    #[test]
    fn extensions_match_download_convention() {
        assert_eq!(ImageFormat::Jpeg.extension(), Some("jpg"));
        assert_eq!(ImageFormat::Jxl.extension(), Some("jxl"));
        assert_eq!(ImageFormat::Ico.extension(), Some("ico"));
        assert_eq!(ImageFormat::Original.extension(), None);
    }

    #[test]
    fn quality_percent_rounds_and_clamps() {
        assert_eq!(quality_percent(0.8), 80);
        assert_eq!(quality_percent(0.555), 56);
        assert_eq!(quality_percent(1.7), 100);
        assert_eq!(quality_percent(-0.2), 0);
        assert_eq!(quality_percent(f64::NAN), 0);
    }

    #[test]
    fn only_lossy_formats_take_quality() {
        let lossy: Vec<_> = ImageFormat::ALL.iter().filter(|f| f.is_lossy()).collect();
        assert_eq!(
            lossy,
            vec![
                &ImageFormat::Jpeg,
                &ImageFormat::WebP,
                &ImageFormat::Avif,
                &ImageFormat::Jxl
            ]
        );
    }

    #[test]
    fn output_dimensions_follow_resize_gate() {
        let natural = Dimensions::new(800, 600);
        let mut settings = CompressionSettings::for_image(ImageFormat::Png, 0.8, natural);
        settings.resize_width = 400;
        settings.resize_height = 300;
        assert_eq!(settings.output_dimensions(natural), natural);
        settings.resize_enabled = true;
        assert_eq!(settings.output_dimensions(natural), Dimensions::new(400, 300));
    }

    #[test]
    fn update_only_touches_set_fields() {
        let base = CompressionSettings::default();
        let next = base.with_update(&SettingsUpdate::quality(0.5));
        assert_eq!(next.quality, 0.5);
        assert_eq!(next.format, base.format);
        assert_eq!(next.auto_mode, base.auto_mode);
    }

    #[test]
    fn aspect_ratio_helpers() {
        let natural = Dimensions::new(1000, 800);
        assert_eq!(natural.height_for_width(500), Some(400));
        assert_eq!(natural.width_for_height(400), Some(500));
        assert_eq!(Dimensions::default().height_for_width(10), None);
    }
}
