//! Runtime configuration.
//!
//! The capacity thresholds are empirically chosen policy rather than QR
//! protocol law, so every one of them can be overridden from a JSON file or
//! from `VCARD_QR_*` environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `VCARD_QR_MAX_PAYLOAD_LEN` | 6000 |
//! | `VCARD_QR_PHOTO_EMBED_LIMIT` | 2048 |
//! | `VCARD_QR_EMBED_PHOTO` | true |
//! | `VCARD_QR_OVERLAY_MIN_EC` | M |
//! | `VCARD_QR_MAX_UPLOAD_BYTES` | 2097152 |
//! | `VCARD_QR_LOGO_SIZE` | 120 |
//! | `VCARD_QR_PREVIEW_SIZE` | 150 |

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::selector::EcLevel;

/// Payloads strictly longer than this are rejected before rendering.
pub const MAX_PAYLOAD_LEN: usize = 6000;

/// Longest base64 PHOTO block the encoder will embed.
pub const PHOTO_EMBED_LIMIT: usize = 2048;

/// Largest accepted photo upload.
pub const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

/// Side of the square logo used for embedding and overlay.
pub const LOGO_SIZE: u32 = 120;

/// Side of the square on-screen preview.
pub const PREVIEW_SIZE: u32 = 150;

/// Overlay logo side as a fraction of the QR image width.
pub const LOGO_RATIO: f32 = 0.2;

/// White ring around the overlaid logo, in pixels.
pub const LOGO_PADDING: u32 = 6;

/// JPEG quality of the preview image.
pub const PREVIEW_JPEG_QUALITY: u8 = 80;

/// One row of the length-to-render-parameters table.
///
/// A payload matches the first band (in table order) whose `above` it
/// strictly exceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityBand {
    pub above: usize,
    pub pixel_width: u32,
    pub ec_level: EcLevel,
}

impl CapacityBand {
    pub const fn new(above: usize, pixel_width: u32, ec_level: EcLevel) -> Self {
        Self { above, pixel_width, ec_level }
    }
}

/// Capacity policy consumed by the strategy selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityPolicy {
    pub max_payload_len: usize,
    /// Ordered from the largest payloads to the smallest.
    pub bands: Vec<CapacityBand>,
    /// Lowest level used when a logo will be drawn over the symbol.
    pub overlay_min_ec: EcLevel,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            max_payload_len: MAX_PAYLOAD_LEN,
            bands: vec![
                CapacityBand::new(3000, 1024, EcLevel::L),
                CapacityBand::new(2000, 768, EcLevel::M),
                CapacityBand::new(1000, 512, EcLevel::Q),
                CapacityBand::new(0, 512, EcLevel::H),
            ],
            overlay_min_ec: EcLevel::M,
        }
    }
}

impl CapacityPolicy {
    /// Checks that the band table covers every length and that a larger
    /// payload never gets a higher error-correction level or a narrower
    /// image than a smaller one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_len == 0 {
            return Err(ConfigError::Zero("max_payload_len"));
        }
        let last = self.bands.last().ok_or(ConfigError::EmptyBands)?;
        if last.above != 0 {
            return Err(ConfigError::NonMonotoneBands {
                index: self.bands.len() - 1,
                reason: "last band must start at zero",
            });
        }
        for (index, band) in self.bands.iter().enumerate() {
            if band.pixel_width == 0 {
                return Err(ConfigError::Zero("pixel_width"));
            }
            if index == 0 {
                continue;
            }
            let larger = &self.bands[index - 1];
            if band.above >= larger.above {
                return Err(ConfigError::NonMonotoneBands {
                    index,
                    reason: "thresholds must strictly decrease",
                });
            }
            if band.ec_level < larger.ec_level {
                return Err(ConfigError::NonMonotoneBands {
                    index,
                    reason: "smaller payloads must not get a lower error correction level",
                });
            }
            if band.pixel_width > larger.pixel_width {
                return Err(ConfigError::NonMonotoneBands {
                    index,
                    reason: "smaller payloads must not get a wider image",
                });
            }
        }
        Ok(())
    }
}

/// Sizes used when turning an upload into a logo and drawing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoConfig {
    pub logo_size: u32,
    pub preview_size: u32,
    pub logo_ratio: f32,
    pub padding: u32,
    pub preview_quality: u8,
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            logo_size: LOGO_SIZE,
            preview_size: PREVIEW_SIZE,
            logo_ratio: LOGO_RATIO,
            padding: LOGO_PADDING,
            preview_quality: PREVIEW_JPEG_QUALITY,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capacity: CapacityPolicy,
    pub logo: LogoConfig,
    /// Whether a photo is embedded in the vCard at all. When off, the plan
    /// starts at `NoPhoto` and the photo is only used as an overlay.
    pub embed_photo: bool,
    pub photo_embed_limit: usize,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: CapacityPolicy::default(),
            logo: LogoConfig::default(),
            embed_photo: true,
            photo_embed_limit: PHOTO_EMBED_LIMIT,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    /// Defaults overridden by `VCARD_QR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        override_with(&lookup, "VCARD_QR_MAX_PAYLOAD_LEN", &mut config.capacity.max_payload_len)?;
        override_with(&lookup, "VCARD_QR_PHOTO_EMBED_LIMIT", &mut config.photo_embed_limit)?;
        override_with(&lookup, "VCARD_QR_EMBED_PHOTO", &mut config.embed_photo)?;
        override_with(&lookup, "VCARD_QR_OVERLAY_MIN_EC", &mut config.capacity.overlay_min_ec)?;
        override_with(&lookup, "VCARD_QR_MAX_UPLOAD_BYTES", &mut config.max_upload_bytes)?;
        override_with(&lookup, "VCARD_QR_LOGO_SIZE", &mut config.logo.logo_size)?;
        override_with(&lookup, "VCARD_QR_PREVIEW_SIZE", &mut config.logo.preview_size)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file; missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capacity.validate()?;
        if self.logo.logo_size == 0 {
            return Err(ConfigError::Zero("logo_size"));
        }
        if self.logo.preview_size == 0 {
            return Err(ConfigError::Zero("preview_size"));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Zero("max_upload_bytes"));
        }
        Ok(())
    }
}

fn override_with<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { key, value })?;
    }
    Ok(())
}
