//! # vcard-qr
//!
//! Turn a contact into a scannable QR code carrying a vCard 3.0 card.
//!
//! `vcard-qr` encodes contact details as vCard text, picks QR render settings
//! from the payload size, and falls back to poorer encodings when the payload
//! does not fit. An optional photo can be embedded in the card and drawn as a
//! round logo in the centre of the finished code.
//!
//! ## Features
//!
//! - vCard 3.0 output with CRLF line breaks and property escaping.
//! - Three encoding tiers: full (with photo), no photo, minimal.
//! - Error correction level and image width chosen from the payload length.
//! - Hard payload ceiling checked before any render is attempted.
//! - Centre-cropped square logos and circular logo overlay.
//! - Configurable thresholds via JSON or `VCARD_QR_*` environment variables.
//!
//! ## Installation
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! vcard-qr = "0.1" # Replace with the latest version
//! ```
//!
//! ## Example
//!
//! Generate a QR code for a contact:
//!
//! ```rust
//! use vcard_qr::{ContactRecord, ModuleRenderer, Session, Tier};
//!
//! let contact = ContactRecord::new("Jane Doe", "+1 (555) 123-4567", "jane@x.com")
//!     .with_company("Acme");
//!
//! let mut session = Session::default();
//! let generated = session.generate(&contact, &ModuleRenderer::default()).unwrap();
//!
//! assert_eq!(generated.tier_used, Tier::NoPhoto);
//! assert!(!generated.degraded);
//! std::fs::write(std::env::temp_dir().join("jane.png"), generated.image.png_bytes()).unwrap();
//! ```
//!
//! Encode a vCard without rendering:
//!
//! ```rust
//! use vcard_qr::{vcard, ContactRecord, Tier};
//!
//! let contact = ContactRecord::new("Jane Doe", "555-123-4567", "jane@x.com");
//! let card = vcard::encode(&contact, Tier::Minimal, None).unwrap();
//! assert!(card.as_str().contains("TEL:5551234567"));
//! ```
//!
//! ## Modules
//!
//! - [`vcard`]: vCard encoding and escaping.
//! - [`selector`]: render settings from payload length.
//! - [`fallback`]: the tier fallback state machine.
//! - [`logo`]: photo decoding, logo creation and overlay.
//! - [`render`]: the renderer trait and the in-process renderer.
//! - [`session`]: per-form state tying it all together.

#![forbid(unsafe_code)]

pub mod config;
pub mod contact;
pub mod error;
pub mod fallback;
pub mod logo;
pub mod render;
pub mod selector;
pub mod session;
pub mod vcard;

pub use config::{CapacityPolicy, Config, LogoConfig};
pub use contact::ContactRecord;
pub use error::{
    DecodeError, EncodeError, GenerateError, OverlayError, RenderError, SelectError, TierFailure,
    ValidationError,
};
pub use fallback::{AttemptState, Degradation, FallbackController, TierPlan};
pub use logo::{PhotoAsset, RawImage};
pub use render::{ModuleRenderer, QrImage, QrRenderer};
pub use selector::{EcLevel, QrRenderSpec};
pub use session::{download_filename, Generated, Session};
pub use vcard::{Tier, VCardEncoder, VCardPayload};
