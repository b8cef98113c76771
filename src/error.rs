//! Error types for every stage of the contact-to-QR pipeline.
//!
//! Only [`GenerateError`] ever reaches the user. Everything else is either
//! raised before encoding starts ([`ValidationError`]) or caught by the
//! fallback controller and turned into a tier transition ([`TierFailure`]).

use thiserror::Error;

use crate::selector::EcLevel;
use crate::vcard::Tier;

/// A contact field failed validation. Raised before any encoding attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Full name is required")]
    MissingFullName,

    #[error("Name must be at least {min} characters")]
    FullNameTooShort { min: usize },

    #[error("Phone number is required")]
    MissingPhone,

    #[error("Please enter a valid phone number: {0}")]
    InvalidPhone(String),

    #[error("Email is required")]
    MissingEmail,

    #[error("Please enter a valid email address: {0}")]
    InvalidEmail(String),

    #[error("Please enter a valid URL: {0}")]
    InvalidWebsite(String),
}

/// The vCard encoder refused to produce a payload for the requested tier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The base64 photo block is longer than the configured embed limit.
    #[error("photo is too large to embed: {encoded_len} base64 characters (limit: {limit})")]
    PhotoTooLarge { encoded_len: usize, limit: usize },

    /// `Tier::Full` was requested without a photo.
    #[error("the full tier requires a photo")]
    MissingPhoto,
}

/// The strategy selector rejected the payload before rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("The amount of data is too big to be stored in a QR Code (data size: {len} bytes, max: {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

/// The render collaborator could not produce an image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The payload does not fit any symbol version at the requested level.
    #[error("data too long for a QR code at error correction level {level}: {len} bytes")]
    DataTooLong { len: usize, level: EcLevel },

    /// The symbol encoder failed for a reason other than capacity.
    #[error("failed to encode QR symbol: {0}")]
    Encode(String),

    /// Rasterising or writing the image failed.
    #[error("failed to produce QR image: {0}")]
    Backend(String),
}

/// A recoverable failure at one tier. Drives the transition to the next tier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TierFailure {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Rejected(#[from] SelectError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl TierFailure {
    /// Short machine-readable kind, used in structured logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            TierFailure::Encode(EncodeError::PhotoTooLarge { .. }) => "photo_too_large",
            TierFailure::Encode(EncodeError::MissingPhoto) => "missing_photo",
            TierFailure::Rejected(SelectError::PayloadTooLarge { .. }) => "payload_too_large",
            TierFailure::Render(_) => "render_failure",
        }
    }
}

/// Decoding or validating an uploaded image failed.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("no image data")]
    Empty,

    #[error("Image size should be less than {limit} bytes (got {size})")]
    TooLarge { size: usize, limit: usize },

    #[error("Please select a valid image file (JPG, PNG, GIF, WebP)")]
    UnsupportedFormat,

    #[error("Failed to load image: {0}")]
    Image(#[from] image::ImageError),

    /// Writing the derived logo or preview failed.
    #[error("Failed to encode logo image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Compositing the logo over a rendered QR image failed.
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Failed to load QR code image: {0}")]
    QrImage(#[source] image::ImageError),

    #[error("Failed to load logo image: {0}")]
    Logo(#[source] image::ImageError),

    #[error("Failed to encode composited image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Invalid configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("capacity bands must not be empty")]
    EmptyBands,

    #[error("capacity bands are not monotone at band {index}: {reason}")]
    NonMonotoneBands { index: usize, reason: &'static str },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Terminal error of a generation request, surfaced to the user verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Every tier in the plan failed. Carries the last tier and its reason.
    #[error("Error generating QR code: {last}")]
    Exhausted { tier: Tier, last: TierFailure },
}

impl GenerateError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerateError::Validation(_) => "validation_error",
            GenerateError::Exhausted { .. } => "exhausted",
        }
    }
}
