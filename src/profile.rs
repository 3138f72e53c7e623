//! Conversion profiles and target-dimension resolution.
//!
//! A [`ConversionProfile`] is a stateless descriptor: target format, quality
//! tier, bitrate, an optional target [`Dimension`] and a [`ConstraintSet`].
//! Given the dimension of the frame a stage receives, the profile decides
//! which dimension the stage should produce.
//!
//! ## Resolution algorithm
//!
//! ```text
//! no target dimension            → current (no-op)
//! should_convert(current) false  → current (no-op)
//! otherwise                      → ConstraintSet::apply(target)
//! ```
//!
//! `should_convert` refuses when the target has more pixels than the current
//! frame and scale-up is not allowed, or when the target falls outside the
//! `max`/`min` bounds on either axis. [`ConstraintSet::apply`] then clamps the
//! target into `max` and, if scale-up is allowed, enlarges it to meet `min`.
//!
//! A target below `min` with scale-up disabled cannot satisfy its own
//! constraints. [`ConstraintSet::apply`] returns it unchanged with a
//! [`ConstraintWarning::BelowMinimum`] attached, and logs at `warn`.
//! [`ConversionProfile::resolve`] never gets that far: `should_convert`
//! already refuses such a target, so the warning only reaches callers that
//! use a constraint set directly and pipelines never carry one.
//!
//! Every built-in preset (see [`crate::presets`]) goes through exactly this
//! code; none of them special-case it.

use crate::dimension::Dimension;
use crate::format::VideoFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("unknown conversion profile '{0}'")]
    Unknown(String),
    #[error("conversion profile '{0}' is already registered")]
    Duplicate(String),
    #[error("invalid conversion profile '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Encoder quality tier carried by a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
    Ultra,
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Ultra => "ultra",
        })
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "ultra" => Ok(Self::Ultra),
            other => Err(format!(
                "unknown quality tier '{other}' (expected low, medium, high or ultra)"
            )),
        }
    }
}

/// Scaling rules attached to exactly one profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub allow_scale_up: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_dimension: Option<Dimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_dimension: Option<Dimension>,
    pub maintain_aspect_ratio: bool,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            allow_scale_up: false,
            max_dimension: None,
            min_dimension: None,
            maintain_aspect_ratio: true,
        }
    }
}

/// Constraints that could not be honoured for a resolved dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintWarning {
    /// Below `min` but scale-up is disabled: returned as-is.
    BelowMinimum { dimension: Dimension, min: Dimension },
}

impl fmt::Display for ConstraintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelowMinimum { dimension, min } => write!(
                f,
                "{dimension} is below the minimum {min} and scale-up is not allowed"
            ),
        }
    }
}

/// Outcome of resolving a profile (or a constraint set) against a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub dimension: Dimension,
    /// False when the profile declined to convert and `dimension` is the input.
    pub converted: bool,
    /// Only set by a direct [`ConstraintSet::apply`].
    pub warning: Option<ConstraintWarning>,
}

impl Resolution {
    fn unchanged(current: Dimension) -> Self {
        Self {
            dimension: current,
            converted: false,
            warning: None,
        }
    }
}

impl ConstraintSet {
    /// Clamp `target` into `max_dimension`, then lift it to `min_dimension`.
    ///
    /// Clamping uses [`Dimension::scale_to_bounds`] with
    /// `maintain_aspect_ratio`. Lifting multiplies both axes by
    /// `max(min_w / w, min_h / h)` and only happens when `allow_scale_up`
    /// is set; otherwise the dimension is kept and a warning is attached.
    pub fn apply(&self, target: Dimension) -> Resolution {
        let mut dimension = target;
        let mut warning = None;

        if let Some(max) = self.max_dimension {
            if dimension.exceeds(max) {
                dimension = dimension.scale_to_bounds(max.width, max.height, self.maintain_aspect_ratio);
            }
        }

        if let Some(min) = self.min_dimension {
            if dimension.below(min) {
                if self.allow_scale_up {
                    let factor = (f64::from(min.width) / f64::from(dimension.width))
                        .max(f64::from(min.height) / f64::from(dimension.height));
                    dimension = dimension.scale_by_factor(factor);
                } else {
                    log::warn!(
                        "{dimension} is below minimum {min} and scale-up is disabled; keeping it"
                    );
                    warning = Some(ConstraintWarning::BelowMinimum { dimension, min });
                }
            }
        }

        Resolution {
            dimension,
            converted: true,
            warning,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ProfileError> {
        let invalid = |reason: String| ProfileError::Invalid {
            name: name.to_string(),
            reason,
        };
        if let Some(max) = self.max_dimension {
            if max.is_empty() {
                return Err(invalid(format!("max dimension {max} has a zero axis")));
            }
        }
        if let Some(min) = self.min_dimension {
            if min.is_empty() {
                return Err(invalid(format!("min dimension {min} has a zero axis")));
            }
            if let Some(max) = self.max_dimension {
                if min.exceeds(max) {
                    return Err(invalid(format!("min dimension {min} exceeds max {max}")));
                }
            }
        }
        Ok(())
    }
}

/// A named conversion preset.
///
/// Immutable once built: the builder methods consume and return `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionProfile {
    name: String,
    format: VideoFormat,
    quality: QualityTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_bitrate_kbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_dimension: Option<Dimension>,
    #[serde(default)]
    constraints: ConstraintSet,
}

impl ConversionProfile {
    pub fn new(name: impl Into<String>, format: VideoFormat, quality: QualityTier) -> Self {
        Self {
            name: name.into(),
            format,
            quality,
            target_bitrate_kbps: None,
            target_dimension: None,
            constraints: ConstraintSet::default(),
        }
    }

    pub fn with_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.target_bitrate_kbps = Some(kbps);
        self
    }

    pub fn with_target(mut self, target: Dimension) -> Self {
        self.target_dimension = Some(target);
        self
    }

    pub fn with_constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn quality(&self) -> QualityTier {
        self.quality
    }

    pub fn target_bitrate_kbps(&self) -> Option<u32> {
        self.target_bitrate_kbps
    }

    pub fn target_dimension(&self) -> Option<Dimension> {
        self.target_dimension
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Reject profiles whose parameters can never describe a valid target.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::Invalid {
                name: self.name.clone(),
                reason: "name must not be empty".into(),
            });
        }
        if let Some(target) = self.target_dimension {
            if target.is_empty() {
                return Err(ProfileError::Invalid {
                    name: self.name.clone(),
                    reason: format!("target dimension {target} has a zero axis"),
                });
            }
        }
        if self.target_bitrate_kbps == Some(0) {
            return Err(ProfileError::Invalid {
                name: self.name.clone(),
                reason: "target bitrate must be positive".into(),
            });
        }
        self.constraints.validate(&self.name)
    }

    /// Whether converting a `current`-sized frame to this profile's target
    /// is permitted by its constraints.
    pub fn should_convert(&self, current: Dimension) -> bool {
        let Some(target) = self.target_dimension else {
            return false;
        };
        let c = &self.constraints;

        if target.pixel_count() > current.pixel_count() && !c.allow_scale_up {
            return false;
        }
        if c.max_dimension.is_some_and(|max| target.exceeds(max)) {
            return false;
        }
        if c.min_dimension.is_some_and(|min| target.below(min)) {
            return false;
        }
        true
    }

    /// True iff the raw target has more pixels than `current`.
    ///
    /// Independent of the constraints: callers use it to warn before an
    /// upscale is launched.
    pub fn would_scale_up(&self, current: Dimension) -> bool {
        self.target_dimension
            .is_some_and(|target| target.pixel_count() > current.pixel_count())
    }

    /// Resolve the dimension a stage applying this profile should produce.
    pub fn resolve(&self, current: Dimension) -> Resolution {
        let Some(target) = self.target_dimension else {
            return Resolution::unchanged(current);
        };
        if !self.should_convert(current) {
            log::debug!(
                "profile {}: keeping {current}, target {target} not permitted",
                self.name
            );
            return Resolution::unchanged(current);
        }
        self.constraints.apply(target)
    }

    pub fn calculate_final_dimension(&self, current: Dimension) -> Dimension {
        self.resolve(current).dimension
    }
}
