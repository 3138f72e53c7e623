//! Planner configuration.
//!
//! Handles loading and validating `config.toml`. Every section and key has a
//! default, so a config file only needs the keys it wants to change and a
//! missing file is the same as an empty one.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [defaults]
//! format = "x264"           # Format of a fresh export session
//!
//! [processing]
//! max_processes = 4         # Max parallel planners (omit for auto = CPU cores)
//!
//! [profiles.web-720]        # Custom profile, registered next to the built-ins
//! format = "vp9"
//! quality = "medium"
//! bitrate_kbps = 1800
//! target = "1280x720"
//! allow_scale_up = false
//! max = "1280x720"
//! min = "426x240"
//! maintain_aspect_ratio = true
//! ```
//!
//! Custom profiles go through the same resolution algorithm as the built-in
//! presets. A custom key that collides with a built-in key is rejected.
//! Unknown keys are rejected to catch typos early.

use crate::dimension::Dimension;
use crate::format::VideoFormat;
use crate::presets::ProfileRegistry;
use crate::profile::{ConstraintSet, ConversionProfile, QualityTier};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Planner configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    /// Session defaults.
    pub defaults: DefaultsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Custom conversion profiles keyed by registry name.
    pub profiles: BTreeMap<String, ProfileSpec>,
}

impl PlannerConfig {
    /// Validate config values and custom profiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        self.registry().map(|_| ())
    }

    /// Built-in presets plus every custom profile from `[profiles]`.
    pub fn registry(&self) -> Result<ProfileRegistry, ConfigError> {
        let mut registry = ProfileRegistry::builtin();
        for (key, spec) in &self.profiles {
            registry
                .register(key, spec.to_profile(key))
                .map_err(|e| ConfigError::Validation(format!("profiles.{key}: {e}")))?;
        }
        Ok(registry)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    pub format: VideoFormat,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of pipelines planned in parallel.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// One `[profiles.<key>]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSpec {
    pub format: VideoFormat,
    pub quality: QualityTier,
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,
    #[serde(default)]
    pub target: Option<Dimension>,
    #[serde(default)]
    pub allow_scale_up: bool,
    #[serde(default)]
    pub max: Option<Dimension>,
    #[serde(default)]
    pub min: Option<Dimension>,
    #[serde(default = "default_maintain_aspect_ratio")]
    pub maintain_aspect_ratio: bool,
}

fn default_maintain_aspect_ratio() -> bool {
    true
}

impl ProfileSpec {
    /// Build the profile; the registry validates it on registration.
    pub fn to_profile(&self, name: &str) -> ConversionProfile {
        let mut profile = ConversionProfile::new(name, self.format, self.quality).with_constraints(
            ConstraintSet {
                allow_scale_up: self.allow_scale_up,
                max_dimension: self.max,
                min_dimension: self.min,
                maintain_aspect_ratio: self.maintain_aspect_ratio,
            },
        );
        if let Some(kbps) = self.bitrate_kbps {
            profile = profile.with_bitrate_kbps(kbps);
        }
        if let Some(target) = self.target {
            profile = profile.with_target(target);
        }
        profile
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Parse `config.toml` content and validate it. Absent keys keep their
/// defaults.
pub fn parse_config(content: &str) -> Result<PlannerConfig, ConfigError> {
    let config: PlannerConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`. A missing file means all defaults.
pub fn load_config(path: &Path) -> Result<PlannerConfig, ConfigError> {
    let config = match fs::read_to_string(path) {
        Ok(content) => parse_config(&content)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("no config at {}, using defaults", path.display());
            PlannerConfig::default()
        }
        Err(e) => return Err(e.into()),
    };
    log::debug!(
        "config from {}: {} custom profile(s)",
        path.display(),
        config.profiles.len()
    );
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# vidplan Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# vidplan reads ./config.toml unless --config points elsewhere.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Session defaults
# ---------------------------------------------------------------------------
[defaults]
# Format of a fresh export session, before any convert or profile stage.
# One of: x264, x265, vp9, av1.
format = "x264"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum pipelines planned in parallel by `plan-all`.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Custom profiles
# ---------------------------------------------------------------------------
# Each [profiles.<key>] table adds a conversion profile under <key>.
# Keys must not collide with the built-in presets (see `vidplan profiles`).
#
# [profiles.web-720]
# format = "vp9"              # x264, x265, vp9, av1
# quality = "medium"          # low, medium, high, ultra
# bitrate_kbps = 1800
# target = "1280x720"         # omit to keep the input geometry
# allow_scale_up = false
# max = "1280x720"
# min = "426x240"
# maintain_aspect_ratio = true
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_targets_x264() {
        let config = PlannerConfig::default();
        assert_eq!(config.defaults.format, VideoFormat::X264);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[defaults]
format = "vp9"
"#;
        let config: PlannerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.defaults.format, VideoFormat::Vp9);
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn parse_custom_profile() {
        let toml = r#"
[profiles.web-720]
format = "vp9"
quality = "medium"
bitrate_kbps = 1800
target = "1280x720"
max = "1280x720"
"#;
        let config: PlannerConfig = toml::from_str(toml).unwrap();
        let spec = &config.profiles["web-720"];
        assert_eq!(spec.target, Some(Dimension::new(1280, 720)));
        assert!(!spec.allow_scale_up);
        assert!(spec.maintain_aspect_ratio);

        let profile = spec.to_profile("web-720");
        assert_eq!(profile.name(), "web-720");
        assert_eq!(profile.target_bitrate_kbps(), Some(1800));
        assert_eq!(
            profile.calculate_final_dimension(Dimension::new(1920, 1080)),
            Dimension::new(1280, 720)
        );
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.defaults.format, VideoFormat::X264);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[defaults]
format = "av1"

[processing]
max_processes = 2
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.defaults.format, VideoFormat::Av1);
        assert_eq!(config.processing.max_processes, Some(2));
    }

    #[test]
    fn load_config_keeps_defaults_for_absent_sections() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[processing]\nmax_processes = 3\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.defaults.format, VideoFormat::X264);
        assert_eq!(config.processing.max_processes, Some(3));
    }

    #[test]
    fn load_config_on_directory_is_io_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Io(_))));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_registers_custom_profiles() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[profiles.archive]
format = "av1"
quality = "ultra"
"#,
        )
        .unwrap();

        let registry = load_config(&path).unwrap().registry().unwrap();
        assert!(registry.contains("archive"));
        assert!(registry.contains("1080p"));
        assert_eq!(registry.keys().last(), Some("archive"));
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let toml = r#"
[defaults]
formatt = "x264"
"#;
        assert!(toml::from_str::<PlannerConfig>(toml).is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let toml = r#"
[images]
quality = 90
"#;
        assert!(toml::from_str::<PlannerConfig>(toml).is_err());
    }

    #[test]
    fn unknown_profile_key_rejected() {
        let toml = r#"
[profiles.x]
format = "x264"
quality = "low"
crf = 23
"#;
        assert!(toml::from_str::<PlannerConfig>(toml).is_err());
    }

    #[test]
    fn profile_colliding_with_builtin_is_rejected() {
        let result = parse_config(
            r#"
[profiles.720p]
format = "x264"
quality = "low"
"#,
        );
        match result {
            Err(ConfigError::Validation(msg)) => assert!(msg.contains("720p")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn profile_with_min_above_max_is_rejected() {
        let result = parse_config(
            r#"
[profiles.broken]
format = "x264"
quality = "low"
max = "640x360"
min = "1280x720"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_max_processes_is_rejected() {
        let result = parse_config("[processing]\nmax_processes = 0");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(PlannerConfig::default().validate().is_ok());
    }

    // =========================================================================
    // stock config tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: PlannerConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config.defaults.format, VideoFormat::X264);
        assert_eq!(config.processing.max_processes, None);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        assert!(content.contains("[defaults]"));
        assert!(content.contains("[processing]"));
        assert!(content.contains("[profiles.web-720]"));
    }

    #[test]
    fn empty_config_is_default() {
        let config = parse_config("").unwrap();
        assert_eq!(config.defaults.format, VideoFormat::X264);
        assert_eq!(config.processing.max_processes, None);
    }
}
