//! Photo handling: decoding uploads, cutting the square logo, and drawing it
//! over a finished QR image.
//!
//! Overlay is decoration only. It runs after a tier has already rendered and
//! never touches pixels outside the central disc, so the symbol's own error
//! correction has to absorb the covered modules.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba};

use crate::config::{LogoConfig, MAX_UPLOAD_BYTES};
use crate::error::{DecodeError, OverlayError};
use crate::render::QrImage;

/// Upload formats accepted for the contact photo.
pub const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// A decoded upload.
#[derive(Debug, Clone)]
pub struct RawImage {
    image: DynamicImage,
    format: ImageFormat,
}

impl RawImage {
    pub fn new(image: DynamicImage, format: ImageFormat) -> Self {
        Self { image, format }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Decodes image bytes of one of the [`SUPPORTED_FORMATS`].
pub fn decode(bytes: &[u8]) -> Result<RawImage, DecodeError> {
    decode_upload(bytes, MAX_UPLOAD_BYTES)
}

/// Like [`decode`], with an explicit upload size limit checked first.
pub fn decode_upload(bytes: &[u8], max_bytes: usize) -> Result<RawImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(DecodeError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    let format = image::guess_format(bytes).map_err(|_| DecodeError::UnsupportedFormat)?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(DecodeError::UnsupportedFormat);
    }
    let image = image::load_from_memory_with_format(bytes, format)?;
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        format = ?format,
        "Decoded photo"
    );
    Ok(RawImage { image, format })
}

/// The two derived forms of a contact photo.
///
/// The logo is what gets embedded in the vCard and drawn over the QR image.
/// The preview is for display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoAsset {
    logo_png: Vec<u8>,
    preview_jpeg: Vec<u8>,
}

impl PhotoAsset {
    /// Wraps already-encoded assets: a PNG logo and a JPEG preview.
    pub fn from_encoded(logo_png: Vec<u8>, preview_jpeg: Vec<u8>) -> Self {
        Self { logo_png, preview_jpeg }
    }

    pub fn logo_bytes(&self) -> &[u8] {
        &self.logo_png
    }

    /// vCard `TYPE` parameter of the logo encoding.
    pub fn logo_type(&self) -> &'static str {
        "PNG"
    }

    pub fn preview_bytes(&self) -> &[u8] {
        &self.preview_jpeg
    }

    pub fn preview_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(&self.preview_jpeg))
    }
}

/// Centre-crops `source` to a square and scales it to the logo and preview
/// sizes. The crop is always square, so nothing is stretched.
pub fn make_logo(source: &RawImage, config: &LogoConfig) -> Result<PhotoAsset, DecodeError> {
    let (width, height) = (source.width(), source.height());
    let side = width.min(height);
    let square = source
        .image
        .crop_imm((width - side) / 2, (height - side) / 2, side, side);

    let logo = square.resize_exact(config.logo_size, config.logo_size, FilterType::Lanczos3);
    let mut logo_png = Cursor::new(Vec::new());
    logo.write_to(&mut logo_png, ImageFormat::Png)
        .map_err(DecodeError::Encode)?;

    // JPEG has no alpha channel.
    let preview = DynamicImage::ImageRgb8(
        square
            .resize_exact(config.preview_size, config.preview_size, FilterType::Triangle)
            .to_rgb8(),
    );
    let mut preview_jpeg = Vec::new();
    preview
        .write_with_encoder(JpegEncoder::new_with_quality(
            &mut preview_jpeg,
            config.preview_quality,
        ))
        .map_err(DecodeError::Encode)?;

    let asset = PhotoAsset {
        logo_png: logo_png.into_inner(),
        preview_jpeg,
    };
    tracing::debug!(
        source_width = width,
        source_height = height,
        logo_size = config.logo_size,
        logo_bytes = asset.logo_png.len(),
        "Created photo logo"
    );
    Ok(asset)
}

/// Draws `logo` in a white-backed circle at the centre of `qr`.
///
/// The logo side is `min(width * logo_ratio, logo_size)`. The white disc has
/// radius `side / 2 + padding`; the logo is clipped to radius `side / 2`.
pub fn overlay(qr: &QrImage, logo: &PhotoAsset, config: &LogoConfig) -> Result<QrImage, OverlayError> {
    let mut canvas = qr.to_rgba().map_err(OverlayError::QrImage)?;
    let logo_img = image::load_from_memory(logo.logo_bytes()).map_err(OverlayError::Logo)?;

    let (width, height) = canvas.dimensions();
    let side = ((width as f32 * config.logo_ratio) as u32)
        .min(config.logo_size)
        .max(1);
    let scaled = logo_img
        .resize_exact(side, side, FilterType::Lanczos3)
        .to_rgba8();

    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let logo_radius = side as f32 / 2.0;
    let backing_radius = logo_radius + config.padding as f32;
    let origin_x = width.saturating_sub(side) / 2;
    let origin_y = height.saturating_sub(side) / 2;

    let x_range = disc_span(cx, backing_radius, width);
    let y_range = disc_span(cy, backing_radius, height);
    for y in y_range {
        for x in x_range.clone() {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance > backing_radius {
                continue;
            }
            let mut pixel = Rgba([255, 255, 255, 255]);
            if distance <= logo_radius {
                let (lx, ly) = (x.wrapping_sub(origin_x), y.wrapping_sub(origin_y));
                if lx < side && ly < side {
                    pixel = over_white(*scaled.get_pixel(lx, ly));
                }
            }
            canvas.put_pixel(x, y, pixel);
        }
    }

    tracing::debug!(qr_width = width, logo_side = side, "Composited logo");
    QrImage::from_image(&DynamicImage::ImageRgba8(canvas)).map_err(OverlayError::Encode)
}

fn disc_span(centre: f32, radius: f32, limit: u32) -> std::ops::Range<u32> {
    let start = (centre - radius).floor().max(0.0) as u32;
    let end = ((centre + radius).ceil() as u32).min(limit);
    start..end
}

fn over_white(Rgba([r, g, b, a]): Rgba<u8>) -> Rgba<u8> {
    let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
    Rgba([blend(r), blend(g), blend(b), 255])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ModuleRenderer, QrRenderer};
    use crate::selector::{EcLevel, QrRenderSpec};
    use image::{Rgb, RgbImage};

    fn png_of(img: RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    // Red with a green square in the middle.
    fn banner() -> Vec<u8> {
        png_of(RgbImage::from_fn(400, 100, |x, _| {
            if (150..250).contains(&x) {
                Rgb([0, 255, 0])
            } else {
                Rgb([255, 0, 0])
            }
        }))
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(decode(&[]), Err(DecodeError::Empty)));
        assert!(matches!(decode(b"definitely not an image"), Err(DecodeError::UnsupportedFormat)));
        assert!(matches!(
            decode_upload(&banner(), 10),
            Err(DecodeError::TooLarge { limit: 10, .. })
        ));
    }

    #[test]
    fn test_decode_png() {
        let raw = decode(&banner()).unwrap();
        assert_eq!((raw.width(), raw.height()), (400, 100));
        assert_eq!(raw.format(), ImageFormat::Png);
    }

    #[test]
    fn test_make_logo_center_crops() {
        let raw = decode(&banner()).unwrap();
        let asset = make_logo(&raw, &LogoConfig::default()).unwrap();

        let logo = image::load_from_memory(asset.logo_bytes()).unwrap().to_rgb8();
        assert_eq!(logo.dimensions(), (120, 120));
        for (x, y) in [(0, 0), (60, 60), (119, 119), (0, 119)] {
            let Rgb([r, g, _]) = *logo.get_pixel(x, y);
            assert!(g > 200 && r < 60, "pixel ({x}, {y}) is not green: {r},{g}");
        }

        let preview = image::load_from_memory(asset.preview_bytes()).unwrap();
        assert_eq!((preview.width(), preview.height()), (150, 150));
        assert!(asset.preview_data_url().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_overlay_only_touches_centre_disc() {
        let spec = QrRenderSpec { pixel_width: 512, ec_level: EcLevel::H };
        let qr = ModuleRenderer::default().render("BEGIN:VCARD", &spec).unwrap();
        let asset = make_logo(&decode(&banner()).unwrap(), &LogoConfig::default()).unwrap();

        let config = LogoConfig::default();
        let out = overlay(&qr, &asset, &config).unwrap();
        assert_eq!((out.width(), out.height()), (512, 512));

        let before = qr.to_rgba().unwrap();
        let after = out.to_rgba().unwrap();
        // side = min(512 * 0.2, 120) = 102, backing radius = 51 + 6.
        let radius = 57.0 + 1.0;
        let mut changed_inside = 0;
        for (x, y, pixel) in after.enumerate_pixels() {
            let dx = x as f32 + 0.5 - 256.0;
            let dy = y as f32 + 0.5 - 256.0;
            if (dx * dx + dy * dy).sqrt() > radius {
                assert_eq!(pixel, before.get_pixel(x, y), "pixel ({x}, {y}) changed");
            } else if pixel != before.get_pixel(x, y) {
                changed_inside += 1;
            }
        }
        assert!(changed_inside > 0);
        // Centre shows the logo, the ring shows white backing.
        let Rgba([r, g, _, _]) = *after.get_pixel(256, 256);
        assert!(g > 200 && r < 60);
        assert_eq!(*after.get_pixel(256 + 54, 256), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_overlay_reports_bad_logo() {
        let spec = QrRenderSpec { pixel_width: 256, ec_level: EcLevel::H };
        let qr = ModuleRenderer::default().render("x", &spec).unwrap();
        let broken = PhotoAsset::from_encoded(vec![1, 2, 3], Vec::new());
        assert!(matches!(
            overlay(&qr, &broken, &LogoConfig::default()),
            Err(OverlayError::Logo(_))
        ));
    }
}
