//! Pluggable scale strategies.
//!
//! A [`ScaleStrategy`] turns the dimension of the frame a stage receives into
//! the dimension the stage should produce. The generic scale stage
//! ([`Operation::ScaleByStrategy`](crate::Operation::ScaleByStrategy)) runs
//! any strategy; built-ins cover the usual cases, and
//! [`ConversionProfile`] is itself a strategy.

use crate::dimension::Dimension;
use crate::profile::ConversionProfile;
use serde_json::{Map, Value, json};
use std::fmt::Debug;

/// Algorithm mapping a current dimension to a final one.
///
/// Implementations must be pure: the same input always yields the same
/// output, with no I/O. They are shared between threads when several
/// pipelines are planned in parallel, hence the `Send + Sync` bound.
pub trait ScaleStrategy: Debug + Send + Sync {
    /// Short identifier shown in pipeline descriptions.
    fn name(&self) -> &str;

    fn final_dimension(&self, current: Dimension) -> Dimension;

    /// Reject parameters that would collapse the frame to zero pixels.
    ///
    /// [`Operation::scale_by`](crate::Operation::scale_by) calls this before
    /// the strategy becomes a stage. The error is a human-readable reason.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Parameters for diagnostics. Empty by default.
    fn describe(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// Fit inside a box, keeping aspect ratio. Never enlarges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitWithin {
    pub bounds: Dimension,
}

impl ScaleStrategy for FitWithin {
    fn name(&self) -> &str {
        "fit_within"
    }

    fn final_dimension(&self, current: Dimension) -> Dimension {
        if current.fits_within(self.bounds) {
            return current;
        }
        current.scale_to_bounds(self.bounds.width, self.bounds.height, true)
    }

    fn validate(&self) -> Result<(), String> {
        non_empty("bounds", self.bounds)
    }

    fn describe(&self) -> Map<String, Value> {
        object(json!({ "bounds": self.bounds }))
    }
}

/// Uniform multiply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    pub factor: f64,
}

impl ScaleStrategy for ScaleFactor {
    fn name(&self) -> &str {
        "scale_factor"
    }

    fn final_dimension(&self, current: Dimension) -> Dimension {
        current.scale_by_factor(self.factor)
    }

    fn validate(&self) -> Result<(), String> {
        if self.factor.is_finite() && self.factor > 0.0 {
            Ok(())
        } else {
            Err(format!("factor must be positive and finite (got {})", self.factor))
        }
    }

    fn describe(&self) -> Map<String, Value> {
        object(json!({ "factor": self.factor }))
    }
}

/// Fixed width, height from the current aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWidth {
    pub width: u32,
}

impl ScaleStrategy for FixedWidth {
    fn name(&self) -> &str {
        "fixed_width"
    }

    fn final_dimension(&self, current: Dimension) -> Dimension {
        current.with_width(self.width)
    }

    fn validate(&self) -> Result<(), String> {
        positive("width", self.width)
    }

    fn describe(&self) -> Map<String, Value> {
        object(json!({ "width": self.width }))
    }
}

/// Fixed height, width from the current aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeight {
    pub height: u32,
}

impl ScaleStrategy for FixedHeight {
    fn name(&self) -> &str {
        "fixed_height"
    }

    fn final_dimension(&self, current: Dimension) -> Dimension {
        current.with_height(self.height)
    }

    fn validate(&self) -> Result<(), String> {
        positive("height", self.height)
    }

    fn describe(&self) -> Map<String, Value> {
        object(json!({ "height": self.height }))
    }
}

/// Exact dimension regardless of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exact {
    pub dimension: Dimension,
}

impl ScaleStrategy for Exact {
    fn name(&self) -> &str {
        "exact"
    }

    fn final_dimension(&self, _current: Dimension) -> Dimension {
        self.dimension
    }

    fn validate(&self) -> Result<(), String> {
        non_empty("dimension", self.dimension)
    }

    fn describe(&self) -> Map<String, Value> {
        object(json!({ "dimension": self.dimension }))
    }
}

impl ScaleStrategy for ConversionProfile {
    fn name(&self) -> &str {
        ConversionProfile::name(self)
    }

    fn final_dimension(&self, current: Dimension) -> Dimension {
        self.calculate_final_dimension(current)
    }

    fn validate(&self) -> Result<(), String> {
        ConversionProfile::validate(self).map_err(|e| e.to_string())
    }

    fn describe(&self) -> Map<String, Value> {
        object(json!({ "profile": self }))
    }
}

fn positive(field: &str, value: u32) -> Result<(), String> {
    if value == 0 {
        return Err(format!("{field} must be greater than zero"));
    }
    Ok(())
}

fn non_empty(field: &str, value: Dimension) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} {value} has an empty axis"));
    }
    Ok(())
}

pub(crate) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;

    #[test]
    fn fit_within_shrinks_only() {
        let fit = FitWithin {
            bounds: Dimension::new(1280, 720),
        };
        assert_eq!(fit.final_dimension(Dimension::new(1920, 1080)), Dimension::new(1280, 720));
        assert_eq!(fit.final_dimension(Dimension::new(640, 360)), Dimension::new(640, 360));
        assert_eq!(fit.final_dimension(Dimension::new(1080, 1920)), Dimension::new(405, 720));
    }

    #[test]
    fn factor_halves() {
        let half = ScaleFactor { factor: 0.5 };
        assert_eq!(half.final_dimension(Dimension::new(1920, 1080)), Dimension::new(960, 540));
    }

    #[test]
    fn fixed_axes_follow_aspect() {
        let src = Dimension::new(1920, 1080);
        assert_eq!(FixedWidth { width: 640 }.final_dimension(src), Dimension::new(640, 360));
        assert_eq!(FixedHeight { height: 720 }.final_dimension(src), Dimension::new(1280, 720));
    }

    #[test]
    fn exact_ignores_input() {
        let exact = Exact {
            dimension: Dimension::new(100, 100),
        };
        assert_eq!(exact.final_dimension(Dimension::new(1920, 1080)), Dimension::new(100, 100));
    }

    #[test]
    fn profile_is_a_strategy() {
        let profile = presets::p720();
        let strategy: &dyn ScaleStrategy = &profile;
        assert_eq!(strategy.name(), "720p");
        assert_eq!(strategy.final_dimension(Dimension::new(3840, 2160)), Dimension::new(1280, 720));
        assert!(strategy.describe().contains_key("profile"));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn zero_fixed_axes_are_invalid() {
        assert!(FixedWidth { width: 0 }.validate().is_err());
        assert!(FixedHeight { height: 0 }.validate().is_err());
        assert!(FixedWidth { width: 1 }.validate().is_ok());
    }

    #[test]
    fn empty_boxes_are_invalid() {
        let fit = FitWithin {
            bounds: Dimension::new(0, 100),
        };
        assert!(fit.validate().unwrap_err().contains("0x100"));
        let exact = Exact {
            dimension: Dimension::new(0, 0),
        };
        assert!(exact.validate().is_err());
    }

    #[test]
    fn factor_must_be_positive_and_finite() {
        for factor in [-3.0, 0.0, f64::NAN, f64::INFINITY] {
            assert!(ScaleFactor { factor }.validate().is_err(), "{factor}");
        }
        assert!(ScaleFactor { factor: 0.01 }.validate().is_ok());
    }

    #[test]
    fn profile_validation_is_forwarded() {
        let broken = crate::ConversionProfile::new(
            "broken",
            crate::VideoFormat::X264,
            crate::QualityTier::Low,
        )
        .with_target(Dimension::new(0, 720));
        assert!(ScaleStrategy::validate(&broken).is_err());
        assert!(ScaleStrategy::validate(&presets::p720()).is_ok());
    }

    #[test]
    fn describe_reports_parameters() {
        let map = ScaleFactor { factor: 0.25 }.describe();
        assert_eq!(map.get("factor"), Some(&json!(0.25)));
    }
}
