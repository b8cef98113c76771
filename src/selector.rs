//! Capacity-aware choice of QR render parameters.
//!
//! Larger payloads need higher symbol versions, so they get a wider image and
//! a lower error-correction level. Anything above the hard ceiling is rejected
//! before a render is attempted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::CapacityPolicy;
use crate::error::SelectError;

/// QR error-correction level, ordered by redundancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EcLevel {
    /// About 7% of codewords recoverable. Maximum capacity.
    #[serde(alias = "l")]
    L,
    /// About 15%.
    #[serde(alias = "m")]
    M,
    /// About 25%.
    #[serde(alias = "q")]
    Q,
    /// About 30%.
    #[serde(alias = "h")]
    H,
}

impl fmt::Display for EcLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EcLevel::L => "L",
            EcLevel::M => "M",
            EcLevel::Q => "Q",
            EcLevel::H => "H",
        };
        f.write_str(s)
    }
}

impl FromStr for EcLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(EcLevel::L),
            "m" | "medium" => Ok(EcLevel::M),
            "q" | "quartile" => Ok(EcLevel::Q),
            "h" | "high" => Ok(EcLevel::H),
            other => Err(format!("unknown error correction level: {other}")),
        }
    }
}

/// Parameters handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrRenderSpec {
    pub pixel_width: u32,
    pub ec_level: EcLevel,
}

// Used only when a policy was built by hand with no bands at all.
const UNBANDED_SPEC: QrRenderSpec = QrRenderSpec {
    pixel_width: 512,
    ec_level: EcLevel::H,
};

/// Picks the render spec for a payload of `payload_len` bytes.
///
/// # Errors
///
/// [`SelectError::PayloadTooLarge`] when `payload_len` exceeds
/// `policy.max_payload_len`. This check runs before the band lookup.
///
/// # Example
///
/// ```rust
/// use vcard_qr::config::CapacityPolicy;
/// use vcard_qr::selector::{select_spec, EcLevel};
///
/// let spec = select_spec(800, &CapacityPolicy::default()).unwrap();
/// assert_eq!((spec.pixel_width, spec.ec_level), (512, EcLevel::H));
/// assert!(select_spec(6001, &CapacityPolicy::default()).is_err());
/// ```
pub fn select_spec(payload_len: usize, policy: &CapacityPolicy) -> Result<QrRenderSpec, SelectError> {
    if payload_len > policy.max_payload_len {
        tracing::debug!(
            payload_len,
            max = policy.max_payload_len,
            "Payload over hard ceiling"
        );
        return Err(SelectError::PayloadTooLarge {
            len: payload_len,
            max: policy.max_payload_len,
        });
    }

    let spec = policy
        .bands
        .iter()
        .find(|band| payload_len > band.above)
        .or_else(|| policy.bands.last())
        .map(|band| QrRenderSpec {
            pixel_width: band.pixel_width,
            ec_level: band.ec_level,
        })
        .unwrap_or(UNBANDED_SPEC);

    tracing::debug!(
        payload_len,
        pixel_width = spec.pixel_width,
        ec_level = %spec.ec_level,
        "Selected QR settings"
    );
    Ok(spec)
}

/// Like [`select_spec`], but never returns a level below
/// `policy.overlay_min_ec`. Used when a logo will cover the centre modules.
pub fn select_spec_for_overlay(
    payload_len: usize,
    policy: &CapacityPolicy,
) -> Result<QrRenderSpec, SelectError> {
    let mut spec = select_spec(payload_len, policy)?;
    spec.ec_level = spec.ec_level.max(policy.overlay_min_ec);
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CapacityPolicy {
        CapacityPolicy::default()
    }

    fn pick(len: usize) -> (u32, EcLevel) {
        let spec = select_spec(len, &policy()).unwrap();
        (spec.pixel_width, spec.ec_level)
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(pick(0), (512, EcLevel::H));
        assert_eq!(pick(1000), (512, EcLevel::H));
        assert_eq!(pick(1001), (512, EcLevel::Q));
        assert_eq!(pick(2000), (512, EcLevel::Q));
        assert_eq!(pick(2001), (768, EcLevel::M));
        assert_eq!(pick(3000), (768, EcLevel::M));
        assert_eq!(pick(3001), (1024, EcLevel::L));
        assert_eq!(pick(6000), (1024, EcLevel::L));
    }

    #[test]
    fn test_ceiling_rejects_everything_above() {
        for len in [6001, 6500, 100_000] {
            assert_eq!(
                select_spec(len, &policy()),
                Err(SelectError::PayloadTooLarge { len, max: 6000 })
            );
        }
    }

    #[test]
    fn test_smaller_payload_never_gets_weaker_level() {
        let mut previous = pick(0);
        for len in (0..=6000).step_by(7) {
            let current = pick(len);
            assert!(current.1 <= previous.1, "level rose at {len}");
            assert!(current.0 >= previous.0, "width shrank at {len}");
            previous = current;
        }
    }

    #[test]
    fn test_overlay_floor() {
        let spec = select_spec_for_overlay(4000, &policy()).unwrap();
        assert_eq!(spec.ec_level, EcLevel::M);
        assert_eq!(spec.pixel_width, 1024);
        let spec = select_spec_for_overlay(500, &policy()).unwrap();
        assert_eq!(spec.ec_level, EcLevel::H);
        assert!(select_spec_for_overlay(7000, &policy()).is_err());
    }

    #[test]
    fn test_ec_level_parse_and_order() {
        assert_eq!("h".parse::<EcLevel>(), Ok(EcLevel::H));
        assert_eq!("Quartile".parse::<EcLevel>(), Ok(EcLevel::Q));
        assert!("x".parse::<EcLevel>().is_err());
        assert!(EcLevel::L < EcLevel::M && EcLevel::Q < EcLevel::H);
        assert_eq!(EcLevel::Q.to_string(), "Q");
    }
}
