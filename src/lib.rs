//! # vidplan
//!
//! Planning for video transcodes. Given the dimension of a probed source
//! and either a named conversion profile or an ordered list of operations,
//! vidplan works out the exact encode: output geometry, format, bitrate and
//! the filter chain the encoder should run. It never touches video data.
//!
//! # Architecture: Fold Over Stages
//!
//! ```text
//! Pipeline::new(source)          ordered stages, priority = insertion index
//!     ↓ run()
//! ExportSession                  accumulator threaded through each stage
//!     ↓ commit()
//! EncodeRequest                  frozen plan: JSON, ffmpeg args, fingerprint
//!     ↓ Encoder::encode()
//! external encoder               outside this crate
//! ```
//!
//! Each stage takes the session by value and returns it. A stage whose
//! parameters do not apply (a zero width, a negative crop origin, a missing
//! watermark file) is skipped and the session passes through unchanged.
//! Runs are deterministic: the same pipeline always produces a byte-identical
//! request.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`dimension`] | `Dimension` value type, rounding, bounded and factor scaling, `WxH` parsing |
//! | [`format`] | Target formats with their encoder and container names |
//! | [`profile`] | Conversion profiles, constraint sets, target-dimension resolution |
//! | [`presets`] | Built-in presets and the profile registry |
//! | [`strategy`] | The `ScaleStrategy` trait and built-in strategies |
//! | [`operation`] | The closed set of pipeline operations |
//! | [`session`] | The export session accumulator and the committed encode request |
//! | [`pipeline`] | Ordered stages, execution, asset validation, parallel planning |
//! | [`encoder`] | The seam to the external encoder |
//! | [`job`] | TOML/JSON job files describing one pipeline |
//! | [`config`] | `config.toml` loading, validation, custom profiles |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Closed Operation Set
//!
//! [`Operation`] is an enum with one `match`-based dispatcher for
//! applicability and effect. Extension happens at the [`ScaleStrategy`]
//! seam instead: any strategy can be wrapped in
//! [`Operation::ScaleByStrategy`].
//!
//! ## Explicit Registry
//!
//! Presets are plain constructor functions collected in a
//! [`ProfileRegistry`] that callers build once and pass around. There is no
//! global preset table.
//!
//! ## Geometry Without Decoding
//!
//! The session tracks the frame dimension after each filter, so stages that
//! depend on the current size (aspect-derived resizes, crops, strategies)
//! see the right input and the output dimension is known before any encode.

pub mod config;
pub mod dimension;
pub mod encoder;
pub mod format;
pub mod job;
pub mod operation;
pub mod output;
pub mod pipeline;
pub mod presets;
pub mod profile;
pub mod session;
pub mod strategy;

pub use dimension::{Dimension, DimensionError};
pub use encoder::{Encoder, EncoderError, SpoolEncoder};
pub use format::VideoFormat;
pub use operation::{Operation, OperationError};
pub use pipeline::{
    Pipeline, PipelineError, ProfilePlan, Stage, check_source, plan_profiles, resolve_source,
};
pub use presets::ProfileRegistry;
pub use profile::{
    ConstraintSet, ConstraintWarning, ConversionProfile, ProfileError, QualityTier, Resolution,
};
pub use session::{Anchor, EncodeRequest, ExportSession, Filter};
pub use strategy::ScaleStrategy;
