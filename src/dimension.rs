//! Frame geometry: the [`Dimension`] value type and pure scaling math.
//!
//! Everything in this module is a pure function of its inputs. There is no
//! I/O, no logging and no mutation: a `Dimension` is created, transformed
//! into a new `Dimension`, and dropped.
//!
//! ## Rounding
//!
//! Every derived axis is computed in `f64` and rounded with [`round_axis`],
//! which rounds half **away from zero** (`f64::round`). A scaled axis never
//! collapses below one pixel: `1x1000` scaled by `0.0001` is `1x1`, not `0x0`.
//!
//! ## Empty dimensions
//!
//! A zero on either axis marks a dimension as "not applicable". Such values
//! are allowed to exist (an operation built with a zero width simply never
//! runs) but the scaling functions require non-empty input. Callers check
//! [`Dimension::is_empty`] first; that is a precondition, not a branch here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DimensionError {
    #[error("dimension axes must not be negative (got {width}x{height})")]
    Negative { width: i64, height: i64 },
    #[error("dimension axis out of range: {0}")]
    OutOfRange(i64),
    #[error("invalid dimension '{0}', expected WIDTHxHEIGHT")]
    Parse(String),
}

/// Width and height of a video frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Build a dimension from signed input (job files, CLI flags).
    ///
    /// Negative axes are a construction error. Zero is accepted and yields
    /// an empty dimension.
    pub fn from_signed(width: i64, height: i64) -> Result<Self, DimensionError> {
        if width < 0 || height < 0 {
            return Err(DimensionError::Negative { width, height });
        }
        let w = u32::try_from(width).map_err(|_| DimensionError::OutOfRange(width))?;
        let h = u32::try_from(height).map_err(|_| DimensionError::OutOfRange(height))?;
        Ok(Self::new(w, h))
    }

    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// True when either axis is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width divided by height.
    pub fn aspect_ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    /// True when either axis is larger than the matching axis of `bounds`.
    pub fn exceeds(self, bounds: Dimension) -> bool {
        self.width > bounds.width || self.height > bounds.height
    }

    /// True when either axis is smaller than the matching axis of `floor`.
    pub fn below(self, floor: Dimension) -> bool {
        self.width < floor.width || self.height < floor.height
    }

    pub fn fits_within(self, bounds: Dimension) -> bool {
        !self.exceeds(bounds)
    }

    /// Largest dimension inside a `max_width` x `max_height` box.
    ///
    /// With `preserve_aspect`, both axes are multiplied by the same ratio
    /// (the smaller of the two axis ratios), so the result touches the box on
    /// at least one axis and never exceeds it on either. This may enlarge the
    /// frame if it is smaller than the box. Without `preserve_aspect` the box
    /// itself is returned.
    ///
    /// ```
    /// # use vidplan::Dimension;
    /// let d = Dimension::new(1920, 1080).scale_to_bounds(1280, 1280, true);
    /// assert_eq!(d, Dimension::new(1280, 720));
    ///
    /// let d = Dimension::new(1920, 1080).scale_to_bounds(1280, 1280, false);
    /// assert_eq!(d, Dimension::new(1280, 1280));
    /// ```
    pub fn scale_to_bounds(self, max_width: u32, max_height: u32, preserve_aspect: bool) -> Dimension {
        if !preserve_aspect {
            return Dimension::new(max_width, max_height);
        }

        let ratio_w = f64::from(max_width) / f64::from(self.width);
        let ratio_h = f64::from(max_height) / f64::from(self.height);
        let ratio = ratio_w.min(ratio_h);

        // The limiting axis lands exactly on the box; the other is rounded and
        // clamped so rounding can never push it past the box edge.
        Dimension::new(
            round_axis(f64::from(self.width) * ratio).min(max_width),
            round_axis(f64::from(self.height) * ratio).min(max_height),
        )
    }

    /// Multiply both axes by `factor`, rounding each to the nearest pixel.
    pub fn scale_by_factor(self, factor: f64) -> Dimension {
        Dimension::new(
            round_axis(f64::from(self.width) * factor),
            round_axis(f64::from(self.height) * factor),
        )
    }

    /// Set the width and derive the height from this dimension's aspect ratio.
    pub fn with_width(self, width: u32) -> Dimension {
        let height = round_axis(f64::from(width) / self.aspect_ratio());
        Dimension::new(width, height)
    }

    /// Set the height and derive the width from this dimension's aspect ratio.
    pub fn with_height(self, height: u32) -> Dimension {
        let width = round_axis(f64::from(height) * self.aspect_ratio());
        Dimension::new(width, height)
    }

    /// Round both axes down to the nearest even value (minimum 2).
    ///
    /// 4:2:0 chroma subsampling needs even frame sizes, so encoder filter
    /// strings are rendered from this.
    pub fn even(self) -> Dimension {
        Dimension::new(even_axis(self.width), even_axis(self.height))
    }

    /// Like [`with_width`](Self::with_width), with both axes even: the width
    /// rounds down and the height goes to the nearest even value, which is
    /// what ffmpeg's `scale=W:-2` produces.
    pub fn with_even_width(self, width: u32) -> Dimension {
        let width = even_axis(width);
        let half = round_axis(f64::from(width) / self.aspect_ratio() / 2.0);
        Dimension::new(width, half.saturating_mul(2))
    }

    /// Mirror of [`with_even_width`](Self::with_even_width) for `scale=-2:H`.
    pub fn with_even_height(self, height: u32) -> Dimension {
        let height = even_axis(height);
        let half = round_axis(f64::from(height) * self.aspect_ratio() / 2.0);
        Dimension::new(half.saturating_mul(2), height)
    }
}

/// Round an axis down to even, never below 2.
pub fn even_axis(value: u32) -> u32 {
    (value & !1).max(2)
}

/// Round a derived axis half away from zero, never below one pixel.
pub fn round_axis(value: f64) -> u32 {
    if !value.is_finite() || value <= 1.0 {
        return 1;
    }
    if value >= f64::from(u32::MAX) {
        return u32::MAX;
    }
    value.round() as u32
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Dimension {
    type Err = DimensionError;

    /// Parse `1920x1080` (also accepts `X` and `:` as the separator).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || DimensionError::Parse(s.to_string());
        let (w, h) = s
            .trim()
            .split_once(['x', 'X', ':'])
            .ok_or_else(parse_err)?;
        let width: i64 = w.trim().parse().map_err(|_| parse_err())?;
        let height: i64 = h.trim().parse().map_err(|_| parse_err())?;
        Dimension::from_signed(width, height)
    }
}

impl TryFrom<String> for Dimension {
    type Error = DimensionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dimension> for String {
    fn from(value: Dimension) -> Self {
        value.to_string()
    }
}
