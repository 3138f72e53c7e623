//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Profiles
//!
//! ```text
//! Profiles
//! 001 144p → x264 low, 256x144 at 150k
//!     Constraints: max 256x144, no scale-up
//! 006 1080p → x264 high, 1920x1080 at 5000k
//!     Constraints: max 1920x1080, min 640x360, scale-up
//! ```
//!
//! ## Resolve
//!
//! ```text
//! 1080p: 640x360 → 1920x1080
//!     Format: x264 (libx264, mp4) at 5000k
//!     Upscale: target has more pixels than the source
//! ```
//!
//! ## Plan
//!
//! ```text
//! Stages
//! 001 crop
//!     height: 1080, width: 1080, x: 0, y: 0
//! 002 watermark (skipped)
//!     anchor: bottom-right, asset: logo.png, opacity: 0.6
//!
//! Request
//!     Output: 1080x1080 x264 (libx264, mp4)
//!     Filters: crop 1080x1080 at 0,0
//!     Fingerprint: 3f0c…
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::dimension::Dimension;
use crate::pipeline::ProfilePlan;
use crate::presets::ProfileRegistry;
use crate::profile::{ConversionProfile, Resolution};
use crate::session::{DERIVE_FROM_ASPECT, EncodeRequest, Filter};
use serde_json::{Map, Value};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn optional_dimension(d: Option<Dimension>) -> String {
    d.map(|d| d.to_string()).unwrap_or_else(|| "source".to_string())
}

fn bitrate(kbps: Option<u32>) -> String {
    kbps.map(|k| format!(" at {k}k")).unwrap_or_default()
}

fn scale_axis(value: i64) -> String {
    if value == DERIVE_FROM_ASPECT {
        "auto".to_string()
    } else {
        value.to_string()
    }
}

/// One-line description of a planned filter.
fn filter_line(filter: &Filter) -> String {
    match filter {
        Filter::Scale { width, height } => {
            format!("scale {}x{}", scale_axis(*width), scale_axis(*height))
        }
        Filter::Crop {
            x,
            y,
            width,
            height,
        } => format!("crop {width}x{height} at {x},{y}"),
        Filter::Trim { start, duration } => format!("trim {duration}s from {start}s"),
        Filter::Watermark {
            asset,
            anchor,
            opacity,
        } => format!("watermark {} {anchor} opacity {opacity}", asset.display()),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Profiles
// ============================================================================

fn constraint_line(profile: &ConversionProfile) -> String {
    let c = profile.constraints();
    let mut parts = Vec::new();
    if let Some(max) = c.max_dimension {
        parts.push(format!("max {max}"));
    }
    if let Some(min) = c.min_dimension {
        parts.push(format!("min {min}"));
    }
    let scale_up = if c.allow_scale_up { "scale-up" } else { "no scale-up" };
    parts.push(scale_up.to_string());
    if !c.maintain_aspect_ratio {
        parts.push("stretch".to_string());
    }
    format!("{}Constraints: {}", indent(1), parts.join(", "))
}

pub fn format_profiles(registry: &ProfileRegistry) -> Vec<String> {
    let mut lines = vec!["Profiles".to_string()];
    for (i, key) in registry.keys().enumerate() {
        let Ok(profile) = registry.build(key) else {
            continue;
        };
        lines.push(format!(
            "{} {} → {} {}, {}{}",
            format_index(i + 1),
            key,
            profile.format(),
            profile.quality(),
            optional_dimension(profile.target_dimension()),
            bitrate(profile.target_bitrate_kbps())
        ));
        lines.push(constraint_line(&profile));
    }
    lines
}

pub fn print_profiles(registry: &ProfileRegistry) {
    for line in format_profiles(registry) {
        println!("{}", line);
    }
}

// ============================================================================
// Resolve
// ============================================================================

pub fn format_resolution(
    profile: &ConversionProfile,
    source: Dimension,
    resolution: &Resolution,
) -> Vec<String> {
    let format = profile.format();
    let mut lines = vec![format!(
        "{}: {} → {}",
        profile.name(),
        source,
        resolution.dimension
    )];
    lines.push(format!(
        "{}Format: {} ({}, {}){}",
        indent(1),
        format,
        format.codec(),
        format.container(),
        bitrate(profile.target_bitrate_kbps())
    ));
    if !resolution.converted {
        if let Some(target) = profile.target_dimension() {
            lines.push(format!("{}Kept: target {} not permitted", indent(1), target));
        }
    }
    if profile.would_scale_up(source) {
        lines.push(format!(
            "{}Upscale: target has more pixels than the source",
            indent(1)
        ));
    }
    if let Some(warning) = &resolution.warning {
        lines.push(format!("{}Warning: {}", indent(1), warning));
    }
    lines
}

pub fn print_resolution(profile: &ConversionProfile, source: Dimension, resolution: &Resolution) {
    for line in format_resolution(profile, source, resolution) {
        println!("{}", line);
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Render `Pipeline::describe` output, one header per stage.
pub fn format_describe(stages: &[Map<String, Value>]) -> Vec<String> {
    let mut lines = vec!["Stages".to_string()];
    for (i, stage) in stages.iter().enumerate() {
        let name = stage.get("name").map(value_text).unwrap_or_default();
        let skipped = stage.get("can_execute") == Some(&Value::Bool(false));
        lines.push(format!(
            "{} {}{}",
            format_index(i + 1),
            name,
            if skipped { " (skipped)" } else { "" }
        ));
        let params: Vec<String> = stage
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "name" | "priority" | "can_execute"))
            .map(|(k, v)| format!("{k}: {}", value_text(v)))
            .collect();
        if !params.is_empty() {
            lines.push(format!("{}{}", indent(1), params.join(", ")));
        }
    }
    lines
}

pub fn format_request(request: &EncodeRequest) -> Vec<String> {
    let mut lines = vec!["Request".to_string()];
    lines.push(format!(
        "{}Output: {} {} ({}, {}){}",
        indent(1),
        request.output_dimension,
        request.format,
        request.codec,
        request.container,
        bitrate(request.bitrate_kbps)
    ));
    if request.filters.is_empty() {
        lines.push(format!("{}Filters: none", indent(1)));
    } else {
        lines.push(format!("{}Filters:", indent(1)));
        for filter in &request.filters {
            lines.push(format!("{}{}", indent(2), filter_line(filter)));
        }
    }
    match request.fingerprint() {
        Ok(fingerprint) => lines.push(format!("{}Fingerprint: {}", indent(1), fingerprint)),
        Err(e) => lines.push(format!("{}Fingerprint: unavailable ({})", indent(1), e)),
    }
    lines
}

pub fn print_plan(stages: &[Map<String, Value>], request: &EncodeRequest) {
    for line in format_describe(stages) {
        println!("{}", line);
    }
    println!();
    for line in format_request(request) {
        println!("{}", line);
    }
}

// ============================================================================
// Plan all
// ============================================================================

pub fn format_plan_all(source: Dimension, plans: &[ProfilePlan]) -> Vec<String> {
    let mut lines = vec![format!("Source {source}")];
    for (i, plan) in plans.iter().enumerate() {
        match &plan.result {
            Ok(request) => lines.push(format!(
                "{} {} → {} {}{}",
                format_index(i + 1),
                plan.key,
                request.output_dimension,
                request.format,
                bitrate(request.bitrate_kbps)
            )),
            Err(e) => lines.push(format!("{} {} → error: {}", format_index(i + 1), plan.key, e)),
        }
    }
    let failed = plans.iter().filter(|p| p.result.is_err()).count();
    lines.push(String::new());
    lines.push(format!(
        "Planned {} profile(s), {} failed",
        plans.len() - failed,
        failed
    ));
    lines
}

pub fn print_plan_all(source: Dimension, plans: &[ProfilePlan]) {
    for line in format_plan_all(source, plans) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use crate::pipeline::{Pipeline, plan_profiles};
    use crate::presets;
    use crate::session::Anchor;

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(100), "100");
    }

    #[test]
    fn filter_lines() {
        assert_eq!(
            filter_line(&Filter::Scale {
                width: 1280,
                height: DERIVE_FROM_ASPECT
            }),
            "scale 1280xauto"
        );
        assert_eq!(
            filter_line(&Filter::Trim {
                start: 1.5,
                duration: 4.0
            }),
            "trim 4s from 1.5s"
        );
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    #[test]
    fn profiles_list_every_key() {
        let registry = ProfileRegistry::builtin();
        let lines = format_profiles(&registry);
        assert_eq!(lines.len(), 1 + 2 * registry.len());
        assert_eq!(lines[1], "001 144p → x264 low, 256x144 at 150k");
        assert_eq!(lines[2], "    Constraints: max 256x144, no scale-up");
        assert!(lines.iter().any(|l| l.contains("max 1920x1080, min 640x360, scale-up")));
    }

    // =========================================================================
    // Resolve
    // =========================================================================

    #[test]
    fn resolution_reports_upscale() {
        let profile = presets::p1080();
        let source = Dimension::new(640, 360);
        let lines = format_resolution(&profile, source, &profile.resolve(source));
        assert_eq!(lines[0], "1080p: 640x360 → 1920x1080");
        assert_eq!(lines[1], "    Format: x264 (libx264, mp4) at 5000k");
        assert!(lines[2].starts_with("    Upscale"));
    }

    #[test]
    fn resolution_reports_kept_target() {
        let profile = presets::uhd_4k();
        let source = Dimension::new(640, 360);
        let lines = format_resolution(&profile, source, &profile.resolve(source));
        assert_eq!(lines[0], "4K: 640x360 → 640x360");
        assert!(lines.iter().any(|l| l.contains("Kept: target 3840x2160")));
    }

    // =========================================================================
    // Plan
    // =========================================================================

    #[test]
    fn describe_marks_skipped_stages() {
        let pipeline = Pipeline::new(Dimension::new(1920, 1080))
            .unwrap()
            .try_then(Operation::crop(0, 0, 1080, 1080))
            .unwrap()
            .try_then(Operation::watermark("/missing/logo.png", Anchor::TopLeft, 0.5))
            .unwrap();
        let lines = format_describe(&pipeline.describe());
        assert_eq!(lines[0], "Stages");
        assert_eq!(lines[1], "001 crop");
        assert_eq!(lines[2], "    height: 1080, width: 1080, x: 0, y: 0");
        assert_eq!(lines[3], "002 watermark (skipped)");
    }

    #[test]
    fn request_lists_filters_and_fingerprint() {
        let request = Pipeline::from_profile(Dimension::new(1920, 1080), presets::p720())
            .unwrap()
            .plan();
        let lines = format_request(&request);
        assert_eq!(lines[1], "    Output: 1280x720 x264 (libx264, mp4) at 2500k");
        assert_eq!(lines[2], "    Filters:");
        assert_eq!(lines[3], "        scale 1280x720");
        assert_eq!(
            lines.last().unwrap(),
            &format!("    Fingerprint: {}", request.fingerprint().unwrap())
        );
    }

    #[test]
    fn plan_all_summarizes_failures() {
        let keys = vec!["720p".to_string(), "nope".to_string()];
        let source = Dimension::new(1920, 1080);
        let plans = plan_profiles(source, &keys, &ProfileRegistry::builtin());
        let lines = format_plan_all(source, &plans);
        assert_eq!(lines[0], "Source 1920x1080");
        assert_eq!(lines[1], "001 720p → 1280x720 x264 at 2500k");
        assert!(lines[2].starts_with("002 nope → error:"));
        assert_eq!(lines.last().unwrap(), "Planned 1 profile(s), 1 failed");
    }
}
