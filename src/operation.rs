//! Pipeline operations.
//!
//! [`Operation`] is a closed set of transformation stages. Each one knows its
//! own name, reports its parameters for diagnostics, decides from those
//! parameters alone whether it applies ([`Operation::can_execute`]), and
//! applies its effect to an [`ExportSession`] ([`Operation::execute`]).
//!
//! | Operation | Applies when | Effect |
//! |---|---|---|
//! | `Convert` | a format was given | sets format (and bitrate, if given) |
//! | `Resize` | width > 0 and height > 0 | scale filter (exact, or fitted to the box) |
//! | `ResizeToWidth` | width > 0 | scale filter, height derived from aspect |
//! | `ResizeToHeight` | height > 0 | scale filter, width derived from aspect |
//! | `Crop` | x ≥ 0, y ≥ 0, width > 0, height > 0 | crop filter |
//! | `Trim` | start ≥ 0 and duration > 0 | trim filter |
//! | `Watermark` | asset readable and 0 ≤ opacity ≤ 1 | overlay filter |
//! | `ScaleByStrategy` | always | scale filter if the strategy changes the frame |
//! | `ApplyProfile` | always | format + bitrate, scale filter if the profile resolves to a new size |
//!
//! ## Construction vs. applicability
//!
//! Parameters that can never be valid (a negative width, an opacity of 1.5,
//! a NaN trim point) are rejected by the constructors with an
//! [`OperationError`]. Parameters that are merely not applicable (a zero
//! width, a negative crop offset, a missing watermark file) construct fine
//! and make `can_execute` return false; the pipeline then skips the stage.
//! Variants with validated parameters are `#[non_exhaustive]`, so code
//! outside this crate has to go through the constructors.

use crate::dimension::{Dimension, DimensionError};
use crate::format::{UnknownFormat, VideoFormat};
use crate::profile::{ConversionProfile, ProfileError};
use crate::session::{Anchor, DERIVE_FROM_ASPECT, ExportSession, Filter};
use crate::strategy::{ScaleStrategy, object};
use serde_json::{Map, Value, json};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("{operation}: {source}")]
    Dimension {
        operation: &'static str,
        #[source]
        source: DimensionError,
    },
    #[error("{operation}: {field} must be a finite number")]
    NotFinite {
        operation: &'static str,
        field: &'static str,
    },
    #[error("watermark opacity must be within 0..=1 (got {0})")]
    Opacity(f64),
    #[error("watermark asset path is empty")]
    EmptyAsset,
    #[error(transparent)]
    Format(#[from] UnknownFormat),
    #[error("{0}")]
    Anchor(String),
    #[error("{strategy}: {reason}")]
    Strategy { strategy: String, reason: String },
    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// One stage of a pipeline.
#[derive(Debug, Clone)]
pub enum Operation {
    Convert {
        format: Option<VideoFormat>,
        bitrate_kbps: Option<u32>,
    },
    #[non_exhaustive]
    Resize {
        dimension: Dimension,
        preserve_aspect: bool,
    },
    #[non_exhaustive]
    ResizeToWidth { width: u32 },
    #[non_exhaustive]
    ResizeToHeight { height: u32 },
    #[non_exhaustive]
    Crop { x: i64, y: i64, dimension: Dimension },
    #[non_exhaustive]
    Trim { start: f64, duration: f64 },
    #[non_exhaustive]
    Watermark {
        asset: PathBuf,
        anchor: Anchor,
        opacity: f64,
    },
    ScaleByStrategy(Arc<dyn ScaleStrategy>),
    ApplyProfile(ConversionProfile),
}

impl Operation {
    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn convert(format: VideoFormat) -> Self {
        Self::Convert {
            format: Some(format),
            bitrate_kbps: None,
        }
    }

    pub fn convert_with_bitrate(format: VideoFormat, bitrate_kbps: u32) -> Self {
        Self::Convert {
            format: Some(format),
            bitrate_kbps: Some(bitrate_kbps),
        }
    }

    /// Resize to `width` x `height`.
    ///
    /// With `preserve_aspect` the frame is fitted inside that box instead of
    /// stretched to it.
    pub fn resize(width: i64, height: i64, preserve_aspect: bool) -> Result<Self, OperationError> {
        let dimension = Dimension::from_signed(width, height).map_err(|source| {
            OperationError::Dimension {
                operation: "resize",
                source,
            }
        })?;
        Ok(Self::Resize {
            dimension,
            preserve_aspect,
        })
    }

    pub fn resize_to_width(width: i64) -> Result<Self, OperationError> {
        let d = Dimension::from_signed(width, 0).map_err(|source| OperationError::Dimension {
            operation: "resize_to_width",
            source,
        })?;
        Ok(Self::ResizeToWidth { width: d.width })
    }

    pub fn resize_to_height(height: i64) -> Result<Self, OperationError> {
        let d = Dimension::from_signed(0, height).map_err(|source| OperationError::Dimension {
            operation: "resize_to_height",
            source,
        })?;
        Ok(Self::ResizeToHeight { height: d.height })
    }

    /// Crop a `width` x `height` region with its top-left corner at `x`,`y`.
    ///
    /// A negative size is an error; a negative origin only makes the stage
    /// inapplicable.
    pub fn crop(x: i64, y: i64, width: i64, height: i64) -> Result<Self, OperationError> {
        let dimension = Dimension::from_signed(width, height).map_err(|source| {
            OperationError::Dimension {
                operation: "crop",
                source,
            }
        })?;
        Ok(Self::Crop { x, y, dimension })
    }

    /// Keep `duration` seconds starting at `start` seconds.
    pub fn trim(start: f64, duration: f64) -> Result<Self, OperationError> {
        for (field, value) in [("start", start), ("duration", duration)] {
            if !value.is_finite() {
                return Err(OperationError::NotFinite {
                    operation: "trim",
                    field,
                });
            }
        }
        Ok(Self::Trim { start, duration })
    }

    /// Overlay the image at `asset`. `opacity` must be within `0..=1`.
    pub fn watermark(
        asset: impl Into<PathBuf>,
        anchor: Anchor,
        opacity: f64,
    ) -> Result<Self, OperationError> {
        let asset = asset.into();
        if asset.as_os_str().is_empty() {
            return Err(OperationError::EmptyAsset);
        }
        if !(0.0..=1.0).contains(&opacity) {
            return Err(OperationError::Opacity(opacity));
        }
        Ok(Self::Watermark {
            asset,
            anchor,
            opacity,
        })
    }

    /// Wrap a strategy as a stage, after [`ScaleStrategy::validate`].
    pub fn scale_by(strategy: impl ScaleStrategy + 'static) -> Result<Self, OperationError> {
        strategy
            .validate()
            .map_err(|reason| OperationError::Strategy {
                strategy: strategy.name().to_string(),
                reason,
            })?;
        Ok(Self::ScaleByStrategy(Arc::new(strategy)))
    }

    pub fn apply_profile(profile: ConversionProfile) -> Result<Self, OperationError> {
        profile.validate()?;
        Ok(Self::ApplyProfile(profile))
    }

    // =========================================================================
    // Stage contract
    // =========================================================================

    pub fn name(&self) -> &'static str {
        match self {
            Self::Convert { .. } => "convert",
            Self::Resize { .. } => "resize",
            Self::ResizeToWidth { .. } => "resize_to_width",
            Self::ResizeToHeight { .. } => "resize_to_height",
            Self::Crop { .. } => "crop",
            Self::Trim { .. } => "trim",
            Self::Watermark { .. } => "watermark",
            Self::ScaleByStrategy(_) => "scale_by_strategy",
            Self::ApplyProfile(_) => "apply_profile",
        }
    }

    /// Whether this stage's effect should run.
    ///
    /// Looks only at the operation's own parameters (plus, for watermarks,
    /// whether the asset can be opened). Never at the session.
    pub fn can_execute(&self) -> bool {
        match self {
            Self::Convert { format, .. } => format.is_some(),
            Self::Resize { dimension, .. } => !dimension.is_empty(),
            Self::ResizeToWidth { width } => *width > 0,
            Self::ResizeToHeight { height } => *height > 0,
            Self::Crop { x, y, dimension } => *x >= 0 && *y >= 0 && !dimension.is_empty(),
            Self::Trim { start, duration } => *start >= 0.0 && *duration > 0.0,
            Self::Watermark { asset, opacity, .. } => {
                asset_is_readable(asset) && (0.0..=1.0).contains(opacity)
            }
            Self::ScaleByStrategy(_) | Self::ApplyProfile(_) => true,
        }
    }

    /// Apply this stage to `session` and hand it back.
    ///
    /// Does not check [`can_execute`](Self::can_execute); the pipeline does.
    pub fn execute(&self, mut session: ExportSession) -> ExportSession {
        let current = session.dimension();
        match self {
            Self::Convert {
                format,
                bitrate_kbps,
            } => {
                if let Some(format) = format {
                    session.set_format(*format);
                }
                if bitrate_kbps.is_some() {
                    session.set_bitrate_kbps(*bitrate_kbps);
                }
            }
            Self::Resize {
                dimension,
                preserve_aspect,
            } => {
                let target = if *preserve_aspect {
                    current.scale_to_bounds(dimension.width, dimension.height, true)
                } else {
                    *dimension
                };
                push_scale(&mut session, target);
            }
            Self::ResizeToWidth { width } => {
                let target = current.with_even_width(*width);
                session.push_filter(
                    Filter::Scale {
                        width: i64::from(target.width),
                        height: DERIVE_FROM_ASPECT,
                    },
                    target,
                );
            }
            Self::ResizeToHeight { height } => {
                let target = current.with_even_height(*height);
                session.push_filter(
                    Filter::Scale {
                        width: DERIVE_FROM_ASPECT,
                        height: i64::from(target.height),
                    },
                    target,
                );
            }
            Self::Crop { x, y, dimension } => {
                let (filter, cropped) = crop_within(current, *x, *y, *dimension);
                session.push_filter(filter, cropped);
            }
            Self::Trim { start, duration } => {
                session.push_neutral_filter(Filter::Trim {
                    start: *start,
                    duration: *duration,
                });
            }
            Self::Watermark {
                asset,
                anchor,
                opacity,
            } => {
                session.push_neutral_filter(Filter::Watermark {
                    asset: asset.clone(),
                    anchor: *anchor,
                    opacity: *opacity,
                });
            }
            Self::ScaleByStrategy(strategy) => {
                let target = strategy.final_dimension(current);
                if target.is_empty() {
                    log::warn!(
                        "strategy {} produced {target} from {current}, ignored",
                        strategy.name()
                    );
                } else if target != current {
                    push_scale(&mut session, target);
                } else {
                    log::debug!("strategy {} keeps {current}", strategy.name());
                }
            }
            Self::ApplyProfile(profile) => {
                let resolution = profile.resolve(current);
                session.set_format(profile.format());
                if profile.target_bitrate_kbps().is_some() {
                    session.set_bitrate_kbps(profile.target_bitrate_kbps());
                }
                if resolution.dimension != current {
                    push_scale(&mut session, resolution.dimension);
                }
            }
        }
        session
    }

    /// Parameters of this operation, for diagnostics.
    pub fn metadata(&self) -> Map<String, Value> {
        match self {
            Self::Convert {
                format,
                bitrate_kbps,
            } => object(json!({ "format": format, "bitrate_kbps": bitrate_kbps })),
            Self::Resize {
                dimension,
                preserve_aspect,
            } => object(json!({
                "width": dimension.width,
                "height": dimension.height,
                "preserve_aspect": preserve_aspect,
            })),
            Self::ResizeToWidth { width } => object(json!({ "width": width })),
            Self::ResizeToHeight { height } => object(json!({ "height": height })),
            Self::Crop { x, y, dimension } => object(json!({
                "x": x,
                "y": y,
                "width": dimension.width,
                "height": dimension.height,
            })),
            Self::Trim { start, duration } => {
                object(json!({ "start": start, "duration": duration }))
            }
            Self::Watermark {
                asset,
                anchor,
                opacity,
            } => object(json!({
                "asset": asset,
                "anchor": anchor,
                "opacity": opacity,
            })),
            Self::ScaleByStrategy(strategy) => {
                let mut map = Map::new();
                map.insert("strategy".into(), Value::String(strategy.name().to_string()));
                map.extend(strategy.describe());
                map
            }
            Self::ApplyProfile(profile) => object(json!({
                "profile": profile.name(),
                "format": profile.format(),
                "quality": profile.quality(),
                "bitrate_kbps": profile.target_bitrate_kbps(),
                "target": profile.target_dimension(),
            })),
        }
    }

    /// Watermark asset referenced by this stage, if any.
    pub fn asset(&self) -> Option<&Path> {
        match self {
            Self::Watermark { asset, .. } => Some(asset),
            _ => None,
        }
    }
}

fn asset_is_readable(path: &Path) -> bool {
    File::open(path)
        .and_then(|f| f.metadata())
        .is_ok_and(|m| m.is_file())
}

/// Scale to `target` rounded down to even, recording the size the encoder
/// will actually produce.
fn push_scale(session: &mut ExportSession, target: Dimension) {
    let target = target.even();
    session.push_filter(
        Filter::Scale {
            width: i64::from(target.width),
            height: i64::from(target.height),
        },
        target,
    );
}

/// Clamp a crop region into the frame it is applied to, then round its size
/// down to even. A 1px axis stays 1px.
///
/// Only called for applicable crops, so `x`/`y` are non-negative and the
/// size is non-empty.
fn crop_within(frame: Dimension, x: i64, y: i64, size: Dimension) -> (Filter, Dimension) {
    let max_x = frame.width.saturating_sub(1);
    let max_y = frame.height.saturating_sub(1);
    let x = u32::try_from(x).unwrap_or(u32::MAX).min(max_x);
    let y = u32::try_from(y).unwrap_or(u32::MAX).min(max_y);
    let width = even_crop(size.width.min(frame.width - x));
    let height = even_crop(size.height.min(frame.height - y));
    if width != size.width || height != size.height {
        log::debug!("crop {size} at {x},{y} clamped to {width}x{height} inside {frame}");
    }
    (
        Filter::Crop {
            x,
            y,
            width,
            height,
        },
        Dimension::new(width, height),
    )
}

fn even_crop(axis: u32) -> u32 {
    if axis > 1 { axis & !1 } else { axis }
}
