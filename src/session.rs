//! Per-form session state.
//!
//! Holds the single photo slot and the last generated vCard for one form.
//! [`Session::generate`] takes `&mut self`, so only one attempt chain can be
//! in flight per session.

use serde::Serialize;

use crate::config::Config;
use crate::contact::ContactRecord;
use crate::error::{ConfigError, DecodeError, GenerateError};
use crate::fallback::{Degradation, FallbackController, TierAttempt, TierPlan};
use crate::logo::{self, PhotoAsset};
use crate::render::{QrImage, QrRenderer};
use crate::selector::QrRenderSpec;
use crate::vcard::{Tier, VCardEncoder, VCardPayload};

/// Returned to the UI after a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct Generated {
    pub image: QrImage,
    pub tier_used: Tier,
    pub degraded: bool,
    pub reason: Option<Degradation>,
    pub message: String,
    /// Length of the encoded vCard, in bytes.
    pub data_len: usize,
    pub spec: QrRenderSpec,
    pub logo_applied: bool,
    pub attempts: Vec<TierAttempt>,
}

#[derive(Debug, Default)]
pub struct Session {
    config: Config,
    photo: Option<PhotoAsset>,
    last_vcard: Option<VCardPayload>,
}

impl Session {
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`Config::validate`], so a session
    /// never runs with a band table that breaks monotonicity.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            photo: None,
            last_vcard: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validates and decodes an upload and replaces the current photo.
    ///
    /// On error the existing photo is left in place.
    pub fn attach_photo(&mut self, bytes: &[u8]) -> Result<&PhotoAsset, DecodeError> {
        let raw = logo::decode_upload(bytes, self.config.max_upload_bytes)?;
        let asset = logo::make_logo(&raw, &self.config.logo)?;
        tracing::info!(
            width = raw.width(),
            height = raw.height(),
            "Photo uploaded"
        );
        Ok(self.photo.insert(asset))
    }

    pub fn photo(&self) -> Option<&PhotoAsset> {
        self.photo.as_ref()
    }

    pub fn remove_photo(&mut self) -> Option<PhotoAsset> {
        self.photo.take()
    }

    /// Drops the photo and the last vCard.
    pub fn clear(&mut self) {
        self.photo = None;
        self.last_vcard = None;
    }

    /// Text of the last successfully rendered vCard.
    pub fn last_vcard(&self) -> Option<&VCardPayload> {
        self.last_vcard.as_ref()
    }

    /// Runs one attempt chain for `contact`.
    ///
    /// Validation failures abort before encoding. Tier failures are handled by
    /// the fallback controller; only exhaustion comes back as an error. When a
    /// photo is present it is drawn over the result, and a failure there
    /// leaves the plain QR image in place.
    pub fn generate<R>(&mut self, contact: &ContactRecord, renderer: &R) -> Result<Generated, GenerateError>
    where
        R: QrRenderer + ?Sized,
    {
        let contact = contact.clone().normalized();
        contact.validate()?;

        let embed = self.config.embed_photo && self.photo.is_some();
        let plan = TierPlan::for_photo(embed);
        let controller = FallbackController::new(
            VCardEncoder::new(self.config.photo_embed_limit),
            &self.config.capacity,
        )
        .with_overlay_floor(self.photo.is_some());

        let run = controller.run(&plan, &contact, self.photo.as_ref(), renderer);
        let success = run.outcome?;

        let mut image = success.image;
        let mut logo_applied = false;
        if let Some(photo) = &self.photo {
            match logo::overlay(&image, photo, &self.config.logo) {
                Ok(decorated) => {
                    image = decorated;
                    logo_applied = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to add logo, using plain QR code");
                }
            }
        }

        let reason = Degradation::between(plan.first(), success.tier);
        let message = match reason {
            Some(degradation) => degradation.message().to_string(),
            None if logo_applied => "QR Code generated with your photo as center logo!".to_string(),
            None => "QR Code generated successfully!".to_string(),
        };

        let data_len = success.payload.len();
        self.last_vcard = Some(success.payload);
        Ok(Generated {
            image,
            tier_used: success.tier,
            degraded: reason.is_some(),
            reason,
            message,
            data_len,
            spec: success.spec,
            logo_applied,
            attempts: run.attempts,
        })
    }
}

/// File name offered for download: the full name with anything but ASCII
/// letters, digits and whitespace removed, whitespace runs turned into `-`,
/// lowercased, and `-qr-code.png` appended.
pub fn download_filename(full_name: &str) -> String {
    let cleaned: String = full_name
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let slug = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();
    if slug.is_empty() {
        "vcard-qr-code.png".to_string()
    } else {
        format!("{slug}-qr-code.png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapacityBand, PHOTO_EMBED_LIMIT};
    use crate::error::{RenderError, ValidationError};
    use crate::render::ModuleRenderer;
    use crate::selector::EcLevel;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn jane() -> ContactRecord {
        ContactRecord::new("Jane Doe", "+1 (555) 123-4567", "jane@x.com")
    }

    // Noise, so the PNG logo stays far above the embed limit.
    fn photo_png() -> Vec<u8> {
        let img = RgbImage::from_fn(200, 160, |x, y| {
            let v = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)).wrapping_mul(2_246_822_519);
            Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_plain_generation() {
        let mut session = Session::default();
        let generated = session.generate(&jane(), &ModuleRenderer::default()).unwrap();
        assert_eq!(generated.tier_used, Tier::NoPhoto);
        assert!(!generated.degraded);
        assert!(!generated.logo_applied);
        assert_eq!(generated.message, "QR Code generated successfully!");
        assert!(session.last_vcard().unwrap().as_str().contains("TEL;TYPE=CELL:+15551234567"));
    }

    #[test]
    fn test_validation_aborts_before_rendering() {
        let mut session = Session::default();
        let renderer = |_: &str, _: &QrRenderSpec| -> Result<QrImage, RenderError> {
            panic!("renderer must not be called")
        };
        let bad = ContactRecord::new("Jane Doe", "abc", "jane@x.com");
        let err = session.generate(&bad, &renderer).unwrap_err();
        assert!(matches!(err, GenerateError::Validation(ValidationError::InvalidPhone(_))));
        assert!(session.last_vcard().is_none());
    }

    #[test]
    fn test_photo_is_overlaid_and_reported() {
        let mut session = Session::default();
        session.attach_photo(&photo_png()).unwrap();
        let generated = session.generate(&jane(), &ModuleRenderer::default()).unwrap();
        assert!(generated.logo_applied);
        // A 120px PNG logo never fits the default embed limit.
        assert_eq!(generated.tier_used, Tier::NoPhoto);
        assert_eq!(generated.reason, Some(Degradation::PhotoDropped));
        assert_eq!(generated.attempts.len(), 2);
    }

    // Flat colour, so the PNG logo is small enough to embed.
    fn flat_photo_png() -> Vec<u8> {
        let img = RgbImage::from_pixel(200, 160, Rgb([30, 120, 200]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_small_photo_is_embedded_at_full_tier() {
        let mut session = Session::default();
        let asset = session.attach_photo(&flat_photo_png()).unwrap();
        assert!(asset.logo_bytes().len() * 4 / 3 + 4 <= PHOTO_EMBED_LIMIT);

        let generated = session.generate(&jane(), &ModuleRenderer::default()).unwrap();
        assert_eq!(generated.tier_used, Tier::Full);
        assert!(!generated.degraded);
        assert_eq!(generated.reason, None);
        assert!(generated.logo_applied);
        assert_eq!(generated.message, "QR Code generated with your photo as center logo!");
        assert_eq!(generated.attempts.len(), 1);
        assert!(generated.spec.ec_level >= EcLevel::M);

        let card = session.last_vcard().unwrap();
        assert_eq!(card.tier(), Tier::Full);
        assert!(card.as_str().contains("\r\nPHOTO;ENCODING=b;TYPE=PNG:"));
    }

    #[test]
    fn test_multibyte_contact_is_sized_by_bytes() {
        let contact = jane().with_notes(&"漢".repeat(400));
        let mut session = Session::default();
        let generated = session.generate(&contact, &ModuleRenderer::default()).unwrap();
        assert_eq!(generated.tier_used, Tier::NoPhoto);
        assert!(!generated.degraded);
        let card = session.last_vcard().unwrap();
        assert_eq!(generated.data_len, card.as_str().len());
        assert!(generated.data_len > 1000 && card.char_count() < 1000);
        assert_eq!(generated.spec, QrRenderSpec { pixel_width: 512, ec_level: EcLevel::Q });
    }

    #[test]
    fn test_new_rejects_ascending_bands() {
        let mut config = Config::default();
        // Payloads over 2000 would hit the first band and get H.
        config.capacity.bands = vec![
            CapacityBand::new(1000, 512, EcLevel::H),
            CapacityBand::new(2000, 1024, EcLevel::L),
            CapacityBand::new(0, 512, EcLevel::H),
        ];
        assert!(matches!(
            Session::new(config),
            Err(ConfigError::NonMonotoneBands { .. })
        ));
        assert!(Session::new(Config::default()).is_ok());
    }

    #[test]
    fn test_photo_used_only_as_logo_when_embedding_disabled() {
        let config = Config {
            embed_photo: false,
            ..Config::default()
        };
        let mut session = Session::new(config).unwrap();
        session.attach_photo(&photo_png()).unwrap();
        let generated = session.generate(&jane(), &ModuleRenderer::default()).unwrap();
        assert!(!generated.degraded);
        assert!(generated.logo_applied);
        assert_eq!(generated.message, "QR Code generated with your photo as center logo!");
    }

    #[test]
    fn test_overlay_failure_keeps_plain_image() {
        let mut session = Session::default();
        session.photo = Some(PhotoAsset::from_encoded(vec![0xde, 0xad], Vec::new()));
        let generated = session.generate(&jane(), &ModuleRenderer::default()).unwrap();
        assert!(!generated.logo_applied);
        assert_eq!(generated.image.width(), 512);
    }

    #[test]
    fn test_bad_upload_keeps_previous_photo() {
        let mut session = Session::default();
        session.attach_photo(&photo_png()).unwrap();
        let before = session.photo().cloned();
        assert!(session.attach_photo(b"GIF89a-not-really").is_err());
        assert_eq!(session.photo().cloned(), before);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut session = Session::default();
        session.attach_photo(&photo_png()).unwrap();
        session.generate(&jane(), &ModuleRenderer::default()).unwrap();
        assert!(session.remove_photo().is_some());
        assert!(session.photo().is_none());
        session.clear();
        assert!(session.last_vcard().is_none());
    }

    #[test]
    fn test_exhaustion_reaches_caller() {
        let mut session = Session::default();
        let renderer = |_: &str, _: &QrRenderSpec| -> Result<QrImage, RenderError> {
            Err(RenderError::Backend("HTTP 500".into()))
        };
        let err = session.generate(&jane(), &renderer).unwrap_err();
        assert!(matches!(err, GenerateError::Exhausted { tier: Tier::Minimal, .. }));
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_download_filename() {
        assert_eq!(download_filename("Jane O'Doe Jr."), "jane-odoe-jr-qr-code.png");
        assert_eq!(download_filename("  Ana   Maria "), "ana-maria-qr-code.png");
        assert_eq!(download_filename("???"), "vcard-qr-code.png");
    }
}
