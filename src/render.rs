//! Rendering a payload into a QR image.
//!
//! The pipeline only decides the payload and the [`QrRenderSpec`]; turning
//! them into pixels is the job of a [`QrRenderer`]. [`ModuleRenderer`] is the
//! in-process implementation: the `qrcode` crate builds the module matrix and
//! this module rasterises it.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, RgbaImage};
use qrcode::types::QrError;
use qrcode::{Color, QrCode};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::RenderError;
use crate::selector::{EcLevel, QrRenderSpec};

/// Prefix of a PNG data URL.
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Quiet zone around the symbol, in modules.
pub const DEFAULT_MARGIN: u32 = 2;

/// A rendered QR code as a self-contained PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl QrImage {
    /// Wraps already-encoded PNG bytes, reading the dimensions from them.
    pub fn from_png(png: Vec<u8>) -> Result<Self, image::ImageError> {
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)?;
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            png,
        })
    }

    /// Encodes a raster as PNG.
    pub fn from_image(img: &DynamicImage) -> Result<Self, image::ImageError> {
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(Self {
            png: buffer.into_inner(),
            width: img.width(),
            height: img.height(),
        })
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn into_png_bytes(self) -> Vec<u8> {
        self.png
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn to_rgba(&self) -> Result<RgbaImage, image::ImageError> {
        Ok(image::load_from_memory_with_format(&self.png, ImageFormat::Png)?.to_rgba8())
    }

    /// `data:image/png;base64,…`, ready for an `<img src>`.
    pub fn to_data_url(&self) -> String {
        format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(&self.png))
    }
}

impl Serialize for QrImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("QrImage", 3)?;
        state.serialize_field("width", &self.width)?;
        state.serialize_field("height", &self.height)?;
        state.serialize_field("data_url", &self.to_data_url())?;
        state.end()
    }
}

/// Turns a payload and a render spec into an image.
///
/// Implementations report capacity problems as [`RenderError::DataTooLong`];
/// the fallback controller treats every error as grounds to try the next tier.
pub trait QrRenderer {
    fn render(&self, payload: &str, spec: &QrRenderSpec) -> Result<QrImage, RenderError>;
}

impl<F> QrRenderer for F
where
    F: Fn(&str, &QrRenderSpec) -> Result<QrImage, RenderError>,
{
    fn render(&self, payload: &str, spec: &QrRenderSpec) -> Result<QrImage, RenderError> {
        self(payload, spec)
    }
}

impl From<EcLevel> for qrcode::EcLevel {
    fn from(level: EcLevel) -> Self {
        match level {
            EcLevel::L => qrcode::EcLevel::L,
            EcLevel::M => qrcode::EcLevel::M,
            EcLevel::Q => qrcode::EcLevel::Q,
            EcLevel::H => qrcode::EcLevel::H,
        }
    }
}

/// In-process renderer: black modules on white with a quiet zone, scaled to
/// the requested pixel width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleRenderer {
    margin: u32,
}

impl Default for ModuleRenderer {
    fn default() -> Self {
        Self { margin: DEFAULT_MARGIN }
    }
}

impl ModuleRenderer {
    pub fn with_margin(margin: u32) -> Self {
        Self { margin }
    }

    fn encode_symbol(&self, payload: &str, level: EcLevel) -> Result<QrCode, RenderError> {
        QrCode::with_error_correction_level(payload.as_bytes(), level.into()).map_err(|e| match e {
            QrError::DataTooLong => RenderError::DataTooLong {
                len: payload.len(),
                level,
            },
            other => RenderError::Encode(other.to_string()),
        })
    }

    /// Rasterises the symbol so the output is exactly `pixel_width` wide,
    /// unless the symbol plus quiet zone needs more pixels than that, in
    /// which case each module gets one pixel.
    ///
    /// # Arguments
    ///
    /// * `code` - The encoded symbol.
    /// * `pixel_width` - Requested image side.
    pub fn rasterize(&self, code: &QrCode, pixel_width: u32) -> GrayImage {
        let modules = code.width() as u32;
        let total = modules + 2 * self.margin;
        let side = pixel_width.max(total);
        let mut img: GrayImage = ImageBuffer::new(side, side);

        for (x, y, pixel) in img.enumerate_pixels_mut() {
            // Integer mapping keeps every module within one pixel of the same size.
            let mx = (x as u64 * total as u64 / side as u64) as i64 - self.margin as i64;
            let my = (y as u64 * total as u64 / side as u64) as i64 - self.margin as i64;
            let dark = (0..modules as i64).contains(&mx)
                && (0..modules as i64).contains(&my)
                && code[(mx as usize, my as usize)] == Color::Dark;
            *pixel = if dark { Luma([0u8]) } else { Luma([255u8]) };
        }
        img
    }

    /// SVG rendering of the same symbol, one unit per module.
    ///
    /// The string always uses Unix newlines (`\n`).
    pub fn render_svg(&self, payload: &str, spec: &QrRenderSpec) -> Result<String, RenderError> {
        let code = self.encode_symbol(payload, spec.ec_level)?;
        let modules = code.width();
        let border = self.margin as usize;
        let dimension = modules + border * 2;

        let mut result = String::new();
        result += "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
        result += &format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" width=\"{1}\" height=\"{1}\" viewBox=\"0 0 {0} {0}\" stroke=\"none\">\n",
            dimension, spec.pixel_width
        );
        result += "\t<rect width=\"100%\" height=\"100%\" fill=\"#FFFFFF\"/>\n";
        result += "\t<path d=\"";
        let mut first = true;
        for y in 0..modules {
            for x in 0..modules {
                if code[(x, y)] == Color::Dark {
                    if !first {
                        result += " ";
                    }
                    first = false;
                    result += &format!("M{},{}h1v1h-1z", x + border, y + border);
                }
            }
        }
        result += "\" fill=\"#000000\"/>\n";
        result += "</svg>\n";
        Ok(result)
    }
}

impl QrRenderer for ModuleRenderer {
    fn render(&self, payload: &str, spec: &QrRenderSpec) -> Result<QrImage, RenderError> {
        let code = self.encode_symbol(payload, spec.ec_level)?;
        let img = self.rasterize(&code, spec.pixel_width);
        tracing::debug!(
            modules = code.width(),
            pixel_width = img.width(),
            ec_level = %spec.ec_level,
            "Rendered QR symbol"
        );
        QrImage::from_image(&DynamicImage::ImageLuma8(img))
            .map_err(|e| RenderError::Backend(e.to_string()))
    }
}

// Tests
#[cfg(test)]
mod tests {
    use super::*;

    fn spec(pixel_width: u32, ec_level: EcLevel) -> QrRenderSpec {
        QrRenderSpec { pixel_width, ec_level }
    }

    #[test]
    fn test_render_png_at_requested_width() {
        let img = ModuleRenderer::default()
            .render("Hello, World!", &spec(512, EcLevel::H))
            .unwrap();
        assert_eq!((img.width(), img.height()), (512, 512));
        assert!(img.png_bytes().starts_with(&[0x89, 0x50, 0x4E, 0x47]));
        assert!(img.to_data_url().starts_with(PNG_DATA_URL_PREFIX));
    }

    #[test]
    fn test_quiet_zone_and_finder_pattern() {
        let renderer = ModuleRenderer::default();
        let code = QrCode::with_error_correction_level(b"HELLO", qrcode::EcLevel::L).unwrap();
        // Version 1: 21 modules + 2 * 2 quiet zone = 25 units.
        let img = renderer.rasterize(&code, 250);
        assert_eq!(img.dimensions(), (250, 250));
        // Quiet zone is white, the first finder module is dark.
        assert_eq!(img.get_pixel(5, 5).0[0], 255);
        assert_eq!(img.get_pixel(25, 25).0[0], 0);
    }

    #[test]
    fn test_tiny_width_falls_back_to_one_pixel_per_module() {
        let renderer = ModuleRenderer::default();
        let code = QrCode::with_error_correction_level(b"HELLO", qrcode::EcLevel::L).unwrap();
        assert_eq!(renderer.rasterize(&code, 10).dimensions(), (25, 25));
    }

    #[test]
    fn test_data_too_long_is_typed() {
        let payload = "x".repeat(3000);
        let err = ModuleRenderer::default()
            .render(&payload, &spec(1024, EcLevel::H))
            .unwrap_err();
        assert_eq!(err, RenderError::DataTooLong { len: 3000, level: EcLevel::H });
    }

    #[test]
    fn test_svg_string() {
        let svg = ModuleRenderer::default()
            .render_svg("HELLO WORLD", &spec(256, EcLevel::L))
            .unwrap();
        assert!(svg.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(svg.contains("viewBox=\"0 0 25 25\""));
    }

    #[test]
    fn test_closures_are_renderers() {
        let failing = |_: &str, _: &QrRenderSpec| -> Result<QrImage, RenderError> {
            Err(RenderError::Backend("offline".into()))
        };
        assert!(failing.render("x", &spec(512, EcLevel::H)).is_err());
    }

    #[test]
    fn test_from_png_reads_dimensions() {
        let img = ModuleRenderer::default().render("abc", &spec(300, EcLevel::M)).unwrap();
        let again = QrImage::from_png(img.png_bytes().to_vec()).unwrap();
        assert_eq!(again, img);
    }
}
