//! Target video formats.
//!
//! A [`VideoFormat`] names the encoder and container a plan targets. Only
//! the identifiers the external encoder needs are modelled here; codec
//! tuning lives with the encoder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown video format '{0}' (expected one of: x264, x265, vp9, av1)")]
pub struct UnknownFormat(pub String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    X264,
    X265,
    Vp9,
    Av1,
}

impl VideoFormat {
    pub const ALL: [VideoFormat; 4] = [Self::X264, Self::X265, Self::Vp9, Self::Av1];

    /// Short identifier used in config and job files.
    pub fn key(self) -> &'static str {
        match self {
            Self::X264 => "x264",
            Self::X265 => "x265",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
        }
    }

    /// ffmpeg encoder name.
    pub fn codec(self) -> &'static str {
        match self {
            Self::X264 => "libx264",
            Self::X265 => "libx265",
            Self::Vp9 => "libvpx-vp9",
            Self::Av1 => "libsvtav1",
        }
    }

    /// Container extension without the dot.
    pub fn container(self) -> &'static str {
        match self {
            Self::Vp9 => "webm",
            Self::X264 | Self::X265 | Self::Av1 => "mp4",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for VideoFormat {
    type Err = UnknownFormat;

    /// Accepts the short key, the encoder name and common codec aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x264" | "h264" | "avc" | "libx264" | "mp4" => Ok(Self::X264),
            "x265" | "h265" | "hevc" | "libx265" => Ok(Self::X265),
            "vp9" | "libvpx-vp9" | "webm" => Ok(Self::Vp9),
            "av1" | "libsvtav1" | "svtav1" => Ok(Self::Av1),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}
