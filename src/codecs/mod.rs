// src/codecs/mod.rs
//
// Codec capabilities and the registry that maps a format to them.
//
// The registry is built once at startup and shared read-only by every pipeline run.
// Decoders are kept as an ordered list per format: the loader tries them in
// registration order after the native path fails.

pub mod avif_safe;

use crate::engine::decoder::{LibwebpDecoder, MozjpegDecoder, QoiDecoder, ZunePngDecoder};
use crate::engine::encoder::{
    AvifEncoder, JpegEncoder, PngEncoder, QoiEncoder, WebpEncoder,
};
use crate::engine::raster::PixelBuffer;
use crate::error::{OptiImageError, Result};
use crate::format::{CompressionSettings, ImageFormat};
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::Arc;

/// Turns encoded bytes of one format into a decoded image.
pub trait Decoder: Send + Sync {
    fn name(&self) -> &'static str;
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage>;
}

/// Turns an RGBA pixel buffer into encoded bytes of one format.
pub trait Encoder: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, pixels: &PixelBuffer, settings: &CompressionSettings) -> Result<Vec<u8>>;
}

#[derive(Clone, Default)]
pub struct CodecRegistry {
    decoders: HashMap<ImageFormat, Vec<Arc<dyn Decoder>>>,
    encoders: HashMap<ImageFormat, Arc<dyn Encoder>>,
}

impl CodecRegistry {
    /// Empty registry. Only the native decode path will work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every codec this build was compiled with.
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register_decoder(ImageFormat::Jpeg, Arc::new(MozjpegDecoder));
        registry.register_decoder(ImageFormat::Png, Arc::new(ZunePngDecoder));
        registry.register_decoder(ImageFormat::WebP, Arc::new(LibwebpDecoder));
        registry.register_decoder(ImageFormat::Qoi, Arc::new(QoiDecoder));
        #[cfg(feature = "avif-decode")]
        registry.register_decoder(
            ImageFormat::Avif,
            Arc::new(crate::engine::decoder::AvifDecoder),
        );
        #[cfg(feature = "jxl")]
        registry.register_decoder(ImageFormat::Jxl, Arc::new(crate::engine::decoder::JxlDecoder));

        registry.register_encoder(ImageFormat::Jpeg, Arc::new(JpegEncoder));
        registry.register_encoder(ImageFormat::Png, Arc::new(PngEncoder));
        registry.register_encoder(ImageFormat::WebP, Arc::new(WebpEncoder));
        registry.register_encoder(ImageFormat::Avif, Arc::new(AvifEncoder));
        registry.register_encoder(ImageFormat::Qoi, Arc::new(QoiEncoder));
        #[cfg(feature = "jxl")]
        registry.register_encoder(ImageFormat::Jxl, Arc::new(crate::engine::encoder::JxlEncoder));

        registry
    }

    /// Append a fallback decoder for `format`.
    pub fn register_decoder(&mut self, format: ImageFormat, decoder: Arc<dyn Decoder>) -> &mut Self {
        self.decoders.entry(format).or_default().push(decoder);
        self
    }

    /// Set the encoder for `format`, replacing any previous one.
    pub fn register_encoder(&mut self, format: ImageFormat, encoder: Arc<dyn Encoder>) -> &mut Self {
        self.encoders.insert(format, encoder);
        self
    }

    pub fn decoders(&self, format: ImageFormat) -> &[Arc<dyn Decoder>] {
        self.decoders.get(&format).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn encoder(&self, format: ImageFormat) -> Option<&Arc<dyn Encoder>> {
        self.encoders.get(&format)
    }

    pub fn can_encode(&self, format: ImageFormat) -> bool {
        self.encoders.contains_key(&format)
    }

    /// Formats with a registered encoder, in menu order.
    pub fn encodable_formats(&self) -> Vec<ImageFormat> {
        ImageFormat::ALL
            .into_iter()
            .filter(|f| self.can_encode(*f))
            .collect()
    }

    /// Encode `pixels` as `target`. Symbolic formats and formats without an encoder
    /// are rejected with `UnsupportedFormat`.
    pub fn encode(
        &self,
        pixels: &PixelBuffer,
        target: ImageFormat,
        settings: &CompressionSettings,
    ) -> Result<Vec<u8>> {
        let encoder = self
            .encoder(target)
            .ok_or_else(|| OptiImageError::unsupported_format(target.mime_type()))?;
        tracing::debug!(format = %target, encoder = encoder.name(), "encoding");
        encoder.encode(pixels, settings)
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let decoders: HashMap<_, Vec<_>> = self
            .decoders
            .iter()
            .map(|(fmt, list)| (fmt.label(), list.iter().map(|d| d.name()).collect()))
            .collect();
        let encoders: HashMap<_, _> = self
            .encoders
            .iter()
            .map(|(fmt, e)| (fmt.label(), e.name()))
            .collect();
        f.debug_struct("CodecRegistry")
            .field("decoders", &decoders)
            .field("encoders", &encoders)
            .finish()
    }
}
