//! Tier fallback as an explicit state machine.
//!
//! A run walks an ordered [`TierPlan`] from the richest tier down. Each
//! attempt encodes the vCard, asks the selector for render parameters and
//! renders; any failure moves to the next tier. A tier is never attempted
//! twice and the plan is never reordered, so a run makes at most
//! `plan.len()` attempts.

use serde::Serialize;

use crate::config::CapacityPolicy;
use crate::contact::ContactRecord;
use crate::error::{GenerateError, TierFailure};
use crate::logo::PhotoAsset;
use crate::render::{QrImage, QrRenderer};
use crate::selector::{select_spec, select_spec_for_overlay, QrRenderSpec};
use crate::vcard::{Tier, VCardEncoder, VCardPayload};

/// Ordered, duplicate-free list of tiers to try.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierPlan {
    tiers: Vec<Tier>,
}

impl TierPlan {
    /// `[Full, NoPhoto, Minimal]` with a photo, `[NoPhoto, Minimal]` without.
    pub fn for_photo(has_photo: bool) -> Self {
        let tiers = if has_photo {
            vec![Tier::Full, Tier::NoPhoto, Tier::Minimal]
        } else {
            vec![Tier::NoPhoto, Tier::Minimal]
        };
        Self { tiers }
    }

    /// A custom plan. Duplicates are dropped, keeping the first occurrence.
    /// Returns `None` for an empty list.
    pub fn new(tiers: impl IntoIterator<Item = Tier>) -> Option<Self> {
        let mut unique: Vec<Tier> = Vec::new();
        for tier in tiers {
            if !unique.contains(&tier) {
                unique.push(tier);
            }
        }
        (!unique.is_empty()).then_some(Self { tiers: unique })
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// The richest tier requested.
    pub fn first(&self) -> Tier {
        self.tiers[0]
    }

    pub fn next_after(&self, tier: Tier) -> Option<Tier> {
        let index = self.tiers.iter().position(|t| *t == tier)?;
        self.tiers.get(index + 1).copied()
    }
}

/// A tier that rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Success {
    pub image: QrImage,
    pub tier: Tier,
    pub spec: QrRenderSpec,
    pub payload: VCardPayload,
}

/// Every tier failed. `tier` is the last one tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub tier: Tier,
    pub last: TierFailure,
}

impl From<Exhausted> for GenerateError {
    fn from(e: Exhausted) -> Self {
        GenerateError::Exhausted {
            tier: e.tier,
            last: e.last,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Attempting(Tier),
    Succeeded(Success),
    Exhausted(Exhausted),
}

impl AttemptState {
    pub fn start(plan: &TierPlan) -> Self {
        AttemptState::Attempting(plan.first())
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptState::Attempting(_))
    }

    /// Applies the outcome of the current attempt. Terminal states are
    /// returned unchanged.
    pub fn advance(self, plan: &TierPlan, outcome: Result<Success, TierFailure>) -> Self {
        let tier = match self {
            AttemptState::Attempting(tier) => tier,
            terminal => return terminal,
        };
        match outcome {
            Ok(success) => AttemptState::Succeeded(success),
            Err(last) => match plan.next_after(tier) {
                Some(next) => AttemptState::Attempting(next),
                None => AttemptState::Exhausted(Exhausted { tier, last }),
            },
        }
    }
}

/// Record of one attempt, kept for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierAttempt {
    pub tier: Tier,
    pub payload_len: Option<usize>,
    #[serde(serialize_with = "serialize_failure")]
    pub failure: Option<TierFailure>,
}

fn serialize_failure<S: serde::Serializer>(
    failure: &Option<TierFailure>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match failure {
        Some(f) => serializer.serialize_some(&f.to_string()),
        None => serializer.serialize_none(),
    }
}

/// What the user is told when the run settled below the richest tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    /// The photo could not be embedded; every other field is present.
    PhotoDropped,
    /// Only name, phone and email were kept.
    EssentialsOnly,
}

impl Degradation {
    pub fn between(requested: Tier, used: Tier) -> Option<Self> {
        match (requested, used) {
            (r, u) if r == u => None,
            (_, Tier::Minimal) => Some(Degradation::EssentialsOnly),
            (Tier::Full, Tier::NoPhoto) => Some(Degradation::PhotoDropped),
            _ => None,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Degradation::PhotoDropped => {
                "QR Code generated without the embedded photo (too large for a QR code)"
            }
            Degradation::EssentialsOnly => "QR Code generated with essential contact info!",
        }
    }
}

/// Result of one run: the terminal outcome plus the attempt log.
#[derive(Debug, Clone)]
pub struct FallbackRun {
    pub outcome: Result<Success, Exhausted>,
    pub attempts: Vec<TierAttempt>,
}

/// Drives [`AttemptState`] through a plan.
#[derive(Debug, Clone)]
pub struct FallbackController<'a> {
    encoder: VCardEncoder,
    policy: &'a CapacityPolicy,
    overlay_floor: bool,
}

impl<'a> FallbackController<'a> {
    /// `policy` is used as given; check it with [`CapacityPolicy::validate`]
    /// first ([`Session::new`](crate::Session::new) does).
    pub fn new(encoder: VCardEncoder, policy: &'a CapacityPolicy) -> Self {
        Self {
            encoder,
            policy,
            overlay_floor: false,
        }
    }

    /// Keep the error-correction level at or above the policy's overlay
    /// floor, because a logo will be drawn over the result.
    pub fn with_overlay_floor(mut self, enabled: bool) -> Self {
        self.overlay_floor = enabled;
        self
    }

    pub fn run<R>(
        &self,
        plan: &TierPlan,
        contact: &ContactRecord,
        photo: Option<&PhotoAsset>,
        renderer: &R,
    ) -> FallbackRun
    where
        R: QrRenderer + ?Sized,
    {
        let mut attempts = Vec::with_capacity(plan.len());
        let mut state = AttemptState::start(plan);
        loop {
            match state {
                AttemptState::Attempting(tier) => {
                    let (payload_len, outcome) = self.attempt(tier, contact, photo, renderer);
                    if let Err(failure) = &outcome {
                        tracing::warn!(
                            tier = %tier,
                            kind = failure.kind(),
                            error = %failure,
                            "Tier failed, falling back"
                        );
                    }
                    attempts.push(TierAttempt {
                        tier,
                        payload_len,
                        failure: outcome.as_ref().err().cloned(),
                    });
                    state = AttemptState::Attempting(tier).advance(plan, outcome);
                }
                AttemptState::Succeeded(success) => {
                    tracing::info!(
                        tier = %success.tier,
                        attempts = attempts.len(),
                        payload_len = success.payload.len(),
                        "QR code generated"
                    );
                    return FallbackRun {
                        outcome: Ok(success),
                        attempts,
                    };
                }
                AttemptState::Exhausted(exhausted) => {
                    tracing::warn!(
                        attempts = attempts.len(),
                        error = %exhausted.last,
                        "All QR generation strategies failed"
                    );
                    return FallbackRun {
                        outcome: Err(exhausted),
                        attempts,
                    };
                }
            }
        }
    }

    fn attempt<R>(
        &self,
        tier: Tier,
        contact: &ContactRecord,
        photo: Option<&PhotoAsset>,
        renderer: &R,
    ) -> (Option<usize>, Result<Success, TierFailure>)
    where
        R: QrRenderer + ?Sized,
    {
        let payload = match self.encoder.encode(contact, tier, photo) {
            Ok(payload) => payload,
            Err(e) => return (None, Err(e.into())),
        };
        let len = payload.len();
        let result = self.select(len).map_err(TierFailure::from).and_then(|spec| {
            tracing::debug!(
                tier = %tier,
                payload_len = len,
                pixel_width = spec.pixel_width,
                ec_level = %spec.ec_level,
                "Rendering tier"
            );
            let image = renderer.render(payload.as_str(), &spec)?;
            Ok(Success {
                image,
                tier,
                spec,
                payload,
            })
        });
        (Some(len), result)
    }

    fn select(&self, len: usize) -> Result<QrRenderSpec, crate::error::SelectError> {
        if self.overlay_floor {
            select_spec_for_overlay(len, self.policy)
        } else {
            select_spec(len, self.policy)
        }
    }
}
