//! vCard 3.0 encoding.
//!
//! The encoder produces one of three payload tiers for a contact. Output is
//! the one bit-exact artifact of the crate: property order, CRLF line breaks
//! and escaping must stay exactly as below for third-party readers.
//!
//! ```text
//! BEGIN:VCARD
//! VERSION:3.0
//! FN:Jane Doe
//! N:Jane Doe;;;;
//! TEL;TYPE=CELL:+15551234567
//! EMAIL:jane@x.com
//! REV:2026-01-01T00:00:00.000Z
//! END:VCARD
//! ```

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PHOTO_EMBED_LIMIT;
use crate::contact::ContactRecord;
use crate::error::EncodeError;
use crate::logo::PhotoAsset;

const CRLF: &str = "\r\n";

/// Encoding richness, ordered richest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Every field plus the embedded photo.
    Full,
    /// Every field, no photo.
    NoPhoto,
    /// Name, phone and email only.
    Minimal,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Full, Tier::NoPhoto, Tier::Minimal];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Full => "full",
            Tier::NoPhoto => "no_photo",
            Tier::Minimal => "minimal",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encoded vCard, tagged with the tier that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VCardPayload {
    text: String,
    tier: Tier,
}

impl VCardPayload {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Length in UTF-8 bytes. QR byte mode is limited by bytes, so this is
    /// what the strategy selector measures.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// The payload with its `REV` line removed, for comparisons that must
    /// ignore generation time.
    pub fn without_rev(&self) -> String {
        self.text
            .split(CRLF)
            .filter(|line| !line.starts_with("REV:"))
            .collect::<Vec<_>>()
            .join(CRLF)
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for VCardPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Escapes a free-text property value.
///
/// Backslashes go first so the ones introduced for the other characters are
/// not escaped again.
pub fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Inverse of [`escape`]. Unknown escape sequences are kept verbatim.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some(';') => out.push(';'),
            Some(',') => out.push(','),
            Some('n') | Some('N') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Builds vCard payloads for a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VCardEncoder {
    photo_embed_limit: usize,
}

impl Default for VCardEncoder {
    fn default() -> Self {
        Self::new(PHOTO_EMBED_LIMIT)
    }
}

impl VCardEncoder {
    pub fn new(photo_embed_limit: usize) -> Self {
        Self { photo_embed_limit }
    }

    /// Encodes `contact` at `tier`, stamping `REV` with the current time.
    pub fn encode(
        &self,
        contact: &ContactRecord,
        tier: Tier,
        photo: Option<&PhotoAsset>,
    ) -> Result<VCardPayload, EncodeError> {
        self.encode_at(contact, tier, photo, Utc::now())
    }

    /// Encodes `contact` at `tier` with an explicit `REV` timestamp.
    ///
    /// # Errors
    ///
    /// * [`EncodeError::MissingPhoto`] when `tier` is `Full` and there is no photo.
    /// * [`EncodeError::PhotoTooLarge`] when the base64 photo block exceeds the
    ///   embed limit. Nothing is truncated.
    pub fn encode_at(
        &self,
        contact: &ContactRecord,
        tier: Tier,
        photo: Option<&PhotoAsset>,
        rev: DateTime<Utc>,
    ) -> Result<VCardPayload, EncodeError> {
        let photo_line = match tier {
            Tier::Full => Some(self.photo_property(photo.ok_or(EncodeError::MissingPhoto)?)?),
            _ => None,
        };

        let mut lines: Vec<String> = vec!["BEGIN:VCARD".into(), "VERSION:3.0".into()];
        let phone = contact.normalized_phone();

        if tier == Tier::Minimal {
            lines.push(format!("FN:{}", escape(&contact.full_name)));
            lines.push(format!("TEL:{}", phone));
            lines.push(format!("EMAIL:{}", contact.email));
        } else {
            let name = escape(&contact.full_name);
            lines.push(format!("FN:{}", name));
            lines.push(format!("N:{};;;;", name));
            lines.push(format!("TEL;TYPE=CELL:{}", phone));
            lines.push(format!("EMAIL:{}", contact.email));

            if contact.company.is_some() || contact.job_title.is_some() {
                lines.push(format!("ORG:{}", escape(contact.company.as_deref().unwrap_or(""))));
                if let Some(title) = &contact.job_title {
                    lines.push(format!("TITLE:{}", escape(title)));
                }
            }
            if let Some(website) = &contact.website {
                lines.push(format!("URL:{}", website));
            }
            if let Some(address) = &contact.address {
                lines.push(format!("ADR;TYPE=HOME:;;{};;;;", escape(address)));
            }
            if let Some(notes) = &contact.notes {
                lines.push(format!("NOTE:{}", escape(notes)));
            }
            if let Some(photo_line) = photo_line {
                lines.push(photo_line);
            }
            lines.push(format!("REV:{}", rev.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }

        lines.push("END:VCARD".into());
        let payload = VCardPayload { text: lines.join(CRLF), tier };
        tracing::debug!(tier = %tier, payload_len = payload.len(), "Encoded vCard");
        Ok(payload)
    }

    fn photo_property(&self, photo: &PhotoAsset) -> Result<String, EncodeError> {
        let encoded = STANDARD.encode(photo.logo_bytes());
        if encoded.len() > self.photo_embed_limit {
            tracing::debug!(
                encoded_len = encoded.len(),
                limit = self.photo_embed_limit,
                "Photo exceeds embed limit"
            );
            return Err(EncodeError::PhotoTooLarge {
                encoded_len: encoded.len(),
                limit: self.photo_embed_limit,
            });
        }
        Ok(format!("PHOTO;ENCODING=b;TYPE={}:{}", photo.logo_type(), encoded))
    }
}

/// Encodes with the default photo embed limit.
pub fn encode(
    contact: &ContactRecord,
    tier: Tier,
    photo: Option<&PhotoAsset>,
) -> Result<VCardPayload, EncodeError> {
    VCardEncoder::default().encode(contact, tier, photo)
}
