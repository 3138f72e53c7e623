//! Job files.
//!
//! A job describes one pipeline in TOML or JSON: the probed source
//! dimension, optionally a profile to apply first, and an ordered list of
//! operations.
//!
//! ```toml
//! source = "1920x1080"
//! profile = "720p"
//!
//! [[operations]]
//! kind = "crop"
//! x = 0
//! y = 0
//! width = 1080
//! height = 1080
//!
//! [[operations]]
//! kind = "watermark"
//! asset = "logo.png"
//! anchor = "bottom-right"
//! opacity = 0.6
//! ```
//!
//! Sizes and offsets are read as signed integers and validated by the
//! operation constructors, so a negative width fails here instead of being
//! wrapped or skipped at run time.

use crate::dimension::Dimension;
use crate::format::VideoFormat;
use crate::operation::{Operation, OperationError};
use crate::pipeline::{Pipeline, PipelineError};
use crate::presets::ProfileRegistry;
use crate::session::Anchor;
use crate::strategy::{Exact, FitWithin, FixedHeight, FixedWidth, ScaleFactor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub source: Dimension,
    /// Format of the session before any stage runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Profile key applied as the first stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

/// One `[[operations]]` entry, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationSpec {
    Convert {
        format: String,
        #[serde(default)]
        bitrate_kbps: Option<u32>,
    },
    Resize {
        width: i64,
        height: i64,
        #[serde(default)]
        preserve_aspect: bool,
    },
    ResizeToWidth {
        width: i64,
    },
    ResizeToHeight {
        height: i64,
    },
    Crop {
        #[serde(default)]
        x: i64,
        #[serde(default)]
        y: i64,
        width: i64,
        height: i64,
    },
    Trim {
        #[serde(default)]
        start: f64,
        duration: f64,
    },
    Watermark {
        asset: PathBuf,
        #[serde(default)]
        anchor: Option<String>,
        #[serde(default = "default_opacity")]
        opacity: f64,
    },
    FitWithin {
        bounds: Dimension,
    },
    ScaleFactor {
        factor: f64,
    },
    FixedWidth {
        width: u32,
    },
    FixedHeight {
        height: u32,
    },
    Exact {
        dimension: Dimension,
    },
    Profile {
        name: String,
    },
}

fn default_opacity() -> f64 {
    1.0
}

impl OperationSpec {
    /// Build the operation, validating its parameters.
    pub fn to_operation(&self, registry: &ProfileRegistry) -> Result<Operation, PipelineError> {
        let op = match self {
            Self::Convert {
                format,
                bitrate_kbps,
            } => {
                let format = parse_format(format)?;
                match bitrate_kbps {
                    Some(kbps) => Operation::convert_with_bitrate(format, *kbps),
                    None => Operation::convert(format),
                }
            }
            Self::Resize {
                width,
                height,
                preserve_aspect,
            } => Operation::resize(*width, *height, *preserve_aspect)?,
            Self::ResizeToWidth { width } => Operation::resize_to_width(*width)?,
            Self::ResizeToHeight { height } => Operation::resize_to_height(*height)?,
            Self::Crop {
                x,
                y,
                width,
                height,
            } => Operation::crop(*x, *y, *width, *height)?,
            Self::Trim { start, duration } => Operation::trim(*start, *duration)?,
            Self::Watermark {
                asset,
                anchor,
                opacity,
            } => {
                let anchor = match anchor {
                    Some(a) => a.parse::<Anchor>().map_err(OperationError::Anchor)?,
                    None => Anchor::default(),
                };
                Operation::watermark(asset.clone(), anchor, *opacity)?
            }
            Self::FitWithin { bounds } => Operation::scale_by(FitWithin { bounds: *bounds })?,
            Self::ScaleFactor { factor } => Operation::scale_by(ScaleFactor { factor: *factor })?,
            Self::FixedWidth { width } => Operation::scale_by(FixedWidth { width: *width })?,
            Self::FixedHeight { height } => Operation::scale_by(FixedHeight { height: *height })?,
            Self::Exact { dimension } => Operation::scale_by(Exact {
                dimension: *dimension,
            })?,
            Self::Profile { name } => Operation::apply_profile(registry.build(name)?)?,
        };
        Ok(op)
    }
}

fn parse_format(s: &str) -> Result<VideoFormat, OperationError> {
    Ok(s.parse::<VideoFormat>()?)
}

impl JobSpec {
    /// Build the pipeline this job describes.
    ///
    /// `default_format` is used when the job does not set `format`.
    pub fn into_pipeline(
        &self,
        registry: &ProfileRegistry,
        default_format: VideoFormat,
    ) -> Result<Pipeline, PipelineError> {
        let mut pipeline = match &self.profile {
            Some(key) => Pipeline::from_profile_key(self.source, key, registry)?,
            None => Pipeline::new(self.source)?,
        };
        let format = match &self.format {
            Some(f) => parse_format(f)?,
            None => default_format,
        };
        pipeline = pipeline.with_initial_format(format);
        for spec in &self.operations {
            pipeline.push(spec.to_operation(registry)?);
        }
        Ok(pipeline)
    }
}

/// Parse a job from `content`; JSON when `json` is set, TOML otherwise.
pub fn parse_job(content: &str, json: bool) -> Result<JobSpec, JobError> {
    if json {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(toml::from_str(content)?)
    }
}

/// Load a job file. `.json` files are read as JSON, anything else as TOML.
pub fn load_job(path: &Path) -> Result<JobSpec, JobError> {
    let content = fs::read_to_string(path)?;
    let json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    parse_job(&content, json)
}
