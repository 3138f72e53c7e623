//! The export session: the accumulator a pipeline threads through its stages.
//!
//! An [`ExportSession`] starts from the probed source dimension and a default
//! format. Each stage takes the session by value and returns it, appending
//! [`Filter`]s and adjusting format or bitrate. Filters are only ever
//! appended; nothing in this module removes or reorders them.
//!
//! When the last stage has run, [`ExportSession::commit`] freezes the session
//! into an [`EncodeRequest`], the plain descriptor handed to the external
//! encoder. The request can be rendered as ffmpeg arguments and
//! fingerprinted, but this crate never runs the encoder.
//!
//! ## Geometry tracking
//!
//! Besides the encoder fields the session tracks the dimension of the frame
//! *after* the filters appended so far. Stages that depend on geometry
//! (resize, crop, scale strategies) read it; filters record the concrete
//! result so the final output dimension is known without running ffmpeg.

use crate::dimension::Dimension;
use crate::format::VideoFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Scale axis value meaning "derive from the input aspect ratio".
pub const DERIVE_FROM_ASPECT: i64 = -1;

/// Margin in pixels between an anchored watermark and the frame edge.
pub const WATERMARK_MARGIN: u32 = 10;

/// Where a watermark is placed on the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl Anchor {
    /// ffmpeg `overlay` position expression.
    fn overlay_position(self) -> String {
        let m = WATERMARK_MARGIN;
        match self {
            Self::TopLeft => format!("{m}:{m}"),
            Self::TopRight => format!("W-w-{m}:{m}"),
            Self::BottomLeft => format!("{m}:H-h-{m}"),
            Self::BottomRight => format!("W-w-{m}:H-h-{m}"),
            Self::Center => "(W-w)/2:(H-h)/2".to_string(),
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
            Self::Center => "center",
        })
    }
}

impl FromStr for Anchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "top-left" => Ok(Self::TopLeft),
            "top-right" => Ok(Self::TopRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-right" => Ok(Self::BottomRight),
            "center" | "centre" => Ok(Self::Center),
            other => Err(format!("unknown watermark anchor '{other}'")),
        }
    }
}

/// One entry of the planned filter chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum Filter {
    /// Scale to `width` x `height`; either axis may be [`DERIVE_FROM_ASPECT`].
    Scale { width: i64, height: i64 },
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Keep `duration` seconds starting at `start`.
    Trim { start: f64, duration: f64 },
    Watermark {
        asset: PathBuf,
        anchor: Anchor,
        opacity: f64,
    },
}

impl Filter {
    /// ffmpeg filter expression for everything but watermarks, which need a
    /// second input and are assembled by [`EncodeRequest::to_ffmpeg_args`].
    fn to_ffmpeg(&self) -> Option<String> {
        match self {
            Filter::Scale { width, height } => {
                Some(format!("scale={}:{}", scale_axis(*width), scale_axis(*height)))
            }
            Filter::Crop {
                x,
                y,
                width,
                height,
            } => Some(format!("crop={width}:{height}:{x}:{y}")),
            Filter::Trim { start, duration } => Some(format!(
                "trim=start={start}:duration={duration},setpts=PTS-STARTPTS"
            )),
            Filter::Watermark { .. } => None,
        }
    }
}

/// Derived axes render as `-2` so ffmpeg keeps them even. Explicit axes are
/// already even when operations build the filter.
fn scale_axis(value: i64) -> i64 {
    if value == DERIVE_FROM_ASPECT { -2 } else { value }
}

/// The mutable plan built up by a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSession {
    source: Dimension,
    dimension: Dimension,
    format: VideoFormat,
    bitrate_kbps: Option<u32>,
    filters: Vec<Filter>,
}

impl ExportSession {
    pub fn new(source: Dimension) -> Self {
        Self::with_format(source, VideoFormat::default())
    }

    pub fn with_format(source: Dimension, format: VideoFormat) -> Self {
        Self {
            source,
            dimension: source,
            format,
            bitrate_kbps: None,
            filters: Vec::new(),
        }
    }

    pub fn source(&self) -> Dimension {
        self.source
    }

    /// Frame dimension after the filters appended so far.
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn bitrate_kbps(&self) -> Option<u32> {
        self.bitrate_kbps
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn set_format(&mut self, format: VideoFormat) {
        self.format = format;
    }

    pub fn set_bitrate_kbps(&mut self, kbps: Option<u32>) {
        self.bitrate_kbps = kbps;
    }

    /// Append a filter that leaves the frame at `resulting`.
    pub fn push_filter(&mut self, filter: Filter, resulting: Dimension) {
        self.filters.push(filter);
        self.dimension = resulting;
    }

    /// Append a filter that does not change the frame geometry.
    pub fn push_neutral_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Freeze the plan into the descriptor handed to the encoder.
    pub fn commit(self) -> EncodeRequest {
        EncodeRequest {
            format: self.format,
            codec: self.format.codec().to_string(),
            container: self.format.container().to_string(),
            bitrate_kbps: self.bitrate_kbps,
            source_dimension: self.source,
            output_dimension: self.dimension,
            filters: self.filters,
        }
    }
}

/// Committed encode plan: the opaque descriptor passed to the encoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodeRequest {
    pub format: VideoFormat,
    pub codec: String,
    pub container: String,
    pub bitrate_kbps: Option<u32>,
    pub source_dimension: Dimension,
    pub output_dimension: Dimension,
    pub filters: Vec<Filter>,
}

impl EncodeRequest {
    /// Canonical JSON form. Field order is fixed by the struct definition,
    /// so equal plans serialize to identical bytes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// SHA-256 of the canonical JSON, as a hex string.
    ///
    /// Fails when the request cannot be serialized, e.g. a watermark path
    /// that is not valid UTF-8.
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Watermark assets in the order they appear in the filter chain.
    pub fn watermark_assets(&self) -> impl Iterator<Item = &PathBuf> {
        self.filters.iter().filter_map(|f| match f {
            Filter::Watermark { asset, .. } => Some(asset),
            _ => None,
        })
    }

    /// Render an ffmpeg command line (without the `ffmpeg` program name).
    ///
    /// Filters without a watermark become a single `-vf` chain. Each
    /// watermark adds an input and turns the chain into a `-filter_complex`
    /// graph: the chain so far is overlaid with the (opacity-adjusted)
    /// watermark and the remaining filters continue from the overlay output.
    pub fn to_ffmpeg_args(&self, input: &str, output: &str) -> Vec<String> {
        let mut args: Vec<String> = vec!["-nostdin".into(), "-i".into(), input.into()];
        for asset in self.watermark_assets() {
            args.extend(["-i".into(), asset.to_string_lossy().into_owned()]);
        }

        if self.watermark_assets().next().is_none() {
            let chain: Vec<String> = self.filters.iter().filter_map(Filter::to_ffmpeg).collect();
            if !chain.is_empty() {
                args.extend(["-vf".into(), chain.join(",")]);
            }
        } else {
            let (graph, label) = self.filter_graph();
            args.extend([
                "-filter_complex".into(),
                graph,
                "-map".into(),
                format!("[{label}]"),
                "-map".into(),
                "0:a?".into(),
            ]);
        }

        args.extend(["-c:v".into(), self.codec.clone()]);
        if let Some(kbps) = self.bitrate_kbps {
            args.extend([
                "-b:v".into(),
                format!("{kbps}k"),
                "-maxrate".into(),
                format!("{kbps}k"),
                "-bufsize".into(),
                format!("{}k", kbps.saturating_mul(2)),
            ]);
        }
        if self.container == "mp4" {
            args.extend(["-movflags".into(), "+faststart".into()]);
        }
        args.push(output.into());
        args
    }

    /// Build the `-filter_complex` graph; returns it with its output label.
    fn filter_graph(&self) -> (String, String) {
        let mut statements = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        let mut label = "0:v".to_string();
        let mut next = 0usize;
        let mut overlay_input = 0usize;

        let mut flush = |pending: &mut Vec<String>, label: &mut String, statements: &mut Vec<String>| {
            if pending.is_empty() {
                return;
            }
            let out = format!("v{next}");
            next += 1;
            statements.push(format!("[{label}]{}[{out}]", pending.join(",")));
            pending.clear();
            *label = out;
        };

        for filter in &self.filters {
            match filter {
                Filter::Watermark {
                    anchor, opacity, ..
                } => {
                    flush(&mut pending, &mut label, &mut statements);
                    overlay_input += 1;
                    let wm = format!("wm{overlay_input}");
                    statements.push(format!(
                        "[{overlay_input}:v]format=rgba,colorchannelmixer=aa={opacity}[{wm}]"
                    ));
                    let out = format!("o{overlay_input}");
                    statements.push(format!(
                        "[{label}][{wm}]overlay={}[{out}]",
                        anchor.overlay_position()
                    ));
                    label = out;
                }
                other => {
                    if let Some(expr) = other.to_ffmpeg() {
                        pending.push(expr);
                    }
                }
            }
        }
        flush(&mut pending, &mut label, &mut statements);

        (statements.join(";"), label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ExportSession {
        ExportSession::new(Dimension::new(1920, 1080))
    }

    #[test]
    fn new_session_starts_at_source() {
        let s = session();
        assert_eq!(s.dimension(), s.source());
        assert_eq!(s.format(), VideoFormat::X264);
        assert_eq!(s.bitrate_kbps(), None);
        assert!(s.filters().is_empty());
    }

    #[test]
    fn push_filter_tracks_geometry() {
        let mut s = session();
        s.push_filter(
            Filter::Crop {
                x: 0,
                y: 0,
                width: 1080,
                height: 1080,
            },
            Dimension::new(1080, 1080),
        );
        s.push_neutral_filter(Filter::Trim {
            start: 1.0,
            duration: 2.0,
        });
        assert_eq!(s.dimension(), Dimension::new(1080, 1080));
        assert_eq!(s.filters().len(), 2);
    }

    #[test]
    fn commit_carries_every_field() {
        let mut s = session();
        s.set_format(VideoFormat::Vp9);
        s.set_bitrate_kbps(Some(900));
        let req = s.commit();
        assert_eq!(req.codec, "libvpx-vp9");
        assert_eq!(req.container, "webm");
        assert_eq!(req.bitrate_kbps, Some(900));
        assert_eq!(req.output_dimension, Dimension::new(1920, 1080));
    }

    #[test]
    fn json_shape_is_stable() {
        let mut s = session();
        s.push_filter(
            Filter::Scale {
                width: 1280,
                height: DERIVE_FROM_ASPECT,
            },
            Dimension::new(1280, 720),
        );
        let json = s.commit().to_json().unwrap();
        assert_eq!(
            json,
            r#"{"format":"x264","codec":"libx264","container":"mp4","bitrate_kbps":null,"source_dimension":"1920x1080","output_dimension":"1280x720","filters":[{"filter":"scale","width":1280,"height":-1}]}"#
        );
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let a = session().commit().fingerprint().unwrap();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, session().commit().fingerprint().unwrap());

        let mut s = session();
        s.set_bitrate_kbps(Some(1));
        assert_ne!(a, s.commit().fingerprint().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn unserializable_request_has_no_fingerprint() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let with_asset = |bytes: &[u8]| {
            let mut s = session();
            s.push_neutral_filter(Filter::Watermark {
                asset: PathBuf::from(OsStr::from_bytes(bytes)),
                anchor: Anchor::TopLeft,
                opacity: 0.5,
            });
            s.commit()
        };
        assert!(with_asset(b"logo\xff.png").fingerprint().is_err());
        assert!(with_asset(b"other\xfe.png").fingerprint().is_err());
    }

    // =========================================================================
    // ffmpeg rendering
    // =========================================================================

    #[test]
    fn ffmpeg_without_filters() {
        let args = session().commit().to_ffmpeg_args("in.mov", "out.mp4");
        assert_eq!(
            args,
            [
                "-nostdin", "-i", "in.mov", "-c:v", "libx264", "-movflags", "+faststart", "out.mp4"
            ]
        );
    }

    #[test]
    fn ffmpeg_simple_chain_uses_vf() {
        let mut s = session();
        s.push_filter(
            Filter::Crop {
                x: 10,
                y: 20,
                width: 1280,
                height: 720,
            },
            Dimension::new(1280, 720),
        );
        s.push_filter(
            Filter::Scale {
                width: 852,
                height: DERIVE_FROM_ASPECT,
            },
            Dimension::new(852, 480),
        );
        s.set_bitrate_kbps(Some(1200));
        let args = s.commit().to_ffmpeg_args("in.mov", "out.mp4");
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "crop=1280:720:10:20,scale=852:-2");
        let bv = args.iter().position(|a| a == "-b:v").unwrap();
        assert_eq!(args[bv + 1], "1200k");
        assert!(args.contains(&"2400k".to_string()));
    }

    #[test]
    fn ffmpeg_watermark_builds_filter_complex() {
        let mut s = session();
        s.push_filter(
            Filter::Scale {
                width: 1280,
                height: 720,
            },
            Dimension::new(1280, 720),
        );
        s.push_neutral_filter(Filter::Watermark {
            asset: PathBuf::from("logo.png"),
            anchor: Anchor::TopRight,
            opacity: 0.5,
        });
        s.push_neutral_filter(Filter::Trim {
            start: 0.0,
            duration: 5.0,
        });
        let args = s.commit().to_ffmpeg_args("in.mov", "out.mp4");

        assert_eq!(&args[1..5], ["-i", "in.mov", "-i", "logo.png"]);
        let fc = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert_eq!(
            args[fc + 1],
            "[0:v]scale=1280:720[v0];\
             [1:v]format=rgba,colorchannelmixer=aa=0.5[wm1];\
             [v0][wm1]overlay=W-w-10:10[o1];\
             [o1]trim=start=0:duration=5,setpts=PTS-STARTPTS[v1]"
        );
        assert_eq!(args[fc + 3], "[v1]");
    }

    #[test]
    fn anchor_parses_both_spellings() {
        assert_eq!("bottom_left".parse::<Anchor>(), Ok(Anchor::BottomLeft));
        assert_eq!("Top-Right".parse::<Anchor>(), Ok(Anchor::TopRight));
        assert!("middle".parse::<Anchor>().is_err());
    }
}
