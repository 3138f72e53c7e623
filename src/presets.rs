//! Built-in conversion presets and the profile registry.
//!
//! | Key | Target | Bitrate | Format | Scale-up | Max | Min |
//! |---|---|---|---|---|---|---|
//! | `144p` | 256x144 | 150k | x264 | no | 256x144 | – |
//! | `240p` | 426x240 | 400k | x264 | no | 426x240 | – |
//! | `360p` | 640x360 | 800k | x264 | no | 640x360 | – |
//! | `480p` | 854x480 | 1200k | x264 | no | 854x480 | – |
//! | `720p` | 1280x720 | 2500k | x264 | no | 1280x720 | – |
//! | `1080p` | 1920x1080 | 5000k | x264 | yes | 1920x1080 | 640x360 |
//! | `1440p` | 2560x1440 | 9000k | x265 | no | 2560x1440 | – |
//! | `4k` | 3840x2160 | 16000k | x265 | no | 3840x2160 | – |
//! | `mobile-landscape` | 1280x720 | 1500k | x264 | no | 1280x720 | 426x240 |
//! | `mobile-portrait` | 720x1280 | 1500k | x264 | no | 720x1280 | 240x426 |
//! | `mobile-square` | 720x720 | 1200k | x264 | no | 720x720 | 240x240 |
//!
//! The mobile preset is one preset with three orientations, each registered
//! under its own key. Presets are plain constructor functions: each call
//! returns a fresh [`ConversionProfile`].
//!
//! [`ProfileRegistry`] maps keys to those constructors. It is built once by
//! the caller and passed around explicitly; there is no global registry.
//! Custom profiles from `config.toml` can be added next to the built-ins.

use crate::dimension::Dimension;
use crate::format::VideoFormat;
use crate::profile::{ConstraintSet, ConversionProfile, ProfileError, QualityTier};
use std::collections::BTreeMap;

/// Orientation of the mobile preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobileOrientation {
    Landscape,
    Portrait,
    Square,
}

fn fixed(
    name: &str,
    format: VideoFormat,
    quality: QualityTier,
    kbps: u32,
    target: Dimension,
) -> ConversionProfile {
    ConversionProfile::new(name, format, quality)
        .with_bitrate_kbps(kbps)
        .with_target(target)
        .with_constraints(ConstraintSet {
            allow_scale_up: false,
            max_dimension: Some(target),
            min_dimension: None,
            maintain_aspect_ratio: true,
        })
}

pub fn p144() -> ConversionProfile {
    fixed("144p", VideoFormat::X264, QualityTier::Low, 150, Dimension::new(256, 144))
}

pub fn p240() -> ConversionProfile {
    fixed("240p", VideoFormat::X264, QualityTier::Low, 400, Dimension::new(426, 240))
}

pub fn p360() -> ConversionProfile {
    fixed("360p", VideoFormat::X264, QualityTier::Medium, 800, Dimension::new(640, 360))
}

pub fn p480() -> ConversionProfile {
    fixed("480p", VideoFormat::X264, QualityTier::Medium, 1200, Dimension::new(854, 480))
}

pub fn p720() -> ConversionProfile {
    fixed("720p", VideoFormat::X264, QualityTier::High, 2500, Dimension::new(1280, 720))
}

/// Full HD. The only preset that may upscale, down to a 360p floor.
pub fn p1080() -> ConversionProfile {
    ConversionProfile::new("1080p", VideoFormat::X264, QualityTier::High)
        .with_bitrate_kbps(5000)
        .with_target(Dimension::new(1920, 1080))
        .with_constraints(ConstraintSet {
            allow_scale_up: true,
            max_dimension: Some(Dimension::new(1920, 1080)),
            min_dimension: Some(Dimension::new(640, 360)),
            maintain_aspect_ratio: true,
        })
}

pub fn p1440() -> ConversionProfile {
    fixed("1440p", VideoFormat::X265, QualityTier::Ultra, 9000, Dimension::new(2560, 1440))
}

pub fn uhd_4k() -> ConversionProfile {
    fixed("4K", VideoFormat::X265, QualityTier::Ultra, 16000, Dimension::new(3840, 2160))
}

pub fn mobile(orientation: MobileOrientation) -> ConversionProfile {
    let (name, kbps, target, min) = match orientation {
        MobileOrientation::Landscape => (
            "Mobile (landscape)",
            1500,
            Dimension::new(1280, 720),
            Dimension::new(426, 240),
        ),
        MobileOrientation::Portrait => (
            "Mobile (portrait)",
            1500,
            Dimension::new(720, 1280),
            Dimension::new(240, 426),
        ),
        MobileOrientation::Square => (
            "Mobile (square)",
            1200,
            Dimension::new(720, 720),
            Dimension::new(240, 240),
        ),
    };
    ConversionProfile::new(name, VideoFormat::X264, QualityTier::Medium)
        .with_bitrate_kbps(kbps)
        .with_target(target)
        .with_constraints(ConstraintSet {
            allow_scale_up: false,
            max_dimension: Some(target),
            min_dimension: Some(min),
            maintain_aspect_ratio: true,
        })
}

fn mobile_landscape() -> ConversionProfile {
    mobile(MobileOrientation::Landscape)
}

fn mobile_portrait() -> ConversionProfile {
    mobile(MobileOrientation::Portrait)
}

fn mobile_square() -> ConversionProfile {
    mobile(MobileOrientation::Square)
}

/// Keys and constructors of every built-in preset, in display order.
pub const BUILTIN: &[(&str, fn() -> ConversionProfile)] = &[
    ("144p", p144),
    ("240p", p240),
    ("360p", p360),
    ("480p", p480),
    ("720p", p720),
    ("1080p", p1080),
    ("1440p", p1440),
    ("4k", uhd_4k),
    ("mobile-landscape", mobile_landscape),
    ("mobile-portrait", mobile_portrait),
    ("mobile-square", mobile_square),
];

#[derive(Debug, Clone)]
enum Entry {
    Builtin(fn() -> ConversionProfile),
    Custom(ConversionProfile),
}

/// Name → profile lookup.
///
/// Keys are matched case-insensitively (`4K` and `4k` are the same preset).
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    entries: BTreeMap<String, Entry>,
    order: Vec<String>,
}

impl ProfileRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    /// Registry holding every built-in preset.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for &(key, build) in BUILTIN {
            registry.order.push(key.to_string());
            registry.entries.insert(key.to_string(), Entry::Builtin(build));
        }
        registry
    }

    /// Add a custom profile under `key`.
    ///
    /// The profile is validated first; keys already in use are rejected.
    pub fn register(&mut self, key: &str, profile: ConversionProfile) -> Result<(), ProfileError> {
        let key = normalize_key(key);
        if self.entries.contains_key(&key) {
            return Err(ProfileError::Duplicate(key));
        }
        profile.validate()?;
        self.order.push(key.clone());
        self.entries.insert(key, Entry::Custom(profile));
        Ok(())
    }

    /// Build a fresh profile for `key`.
    pub fn build(&self, key: &str) -> Result<ConversionProfile, ProfileError> {
        match self.entries.get(&normalize_key(key)) {
            Some(Entry::Builtin(build)) => Ok(build()),
            Some(Entry::Custom(profile)) => Ok(profile.clone()),
            None => Err(ProfileError::Unknown(key.to_string())),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize_key(key))
    }

    /// Registered keys: built-ins first, then custom profiles in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_presets_are_valid() {
        for &(key, build) in BUILTIN {
            assert_eq!(build().validate(), Ok(()), "preset {key}");
        }
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        let registry = ProfileRegistry::builtin();
        assert_eq!(registry.build("4K").unwrap().name(), "4K");
        assert_eq!(registry.build(" 720P ").unwrap().name(), "720p");
    }

    #[test]
    fn registry_rejects_unknown_key() {
        let registry = ProfileRegistry::builtin();
        assert_eq!(
            registry.build("8k"),
            Err(ProfileError::Unknown("8k".to_string()))
        );
    }

    #[test]
    fn registry_keys_keep_display_order() {
        let registry = ProfileRegistry::builtin();
        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(keys.first(), Some(&"144p"));
        assert_eq!(keys.last(), Some(&"mobile-square"));
        assert_eq!(keys.len(), BUILTIN.len());
    }

    #[test]
    fn register_custom_profile() {
        let mut registry = ProfileRegistry::builtin();
        let custom = ConversionProfile::new("Archive", VideoFormat::Av1, QualityTier::Ultra);
        registry.register("Archive", custom.clone()).unwrap();
        assert_eq!(registry.build("archive").unwrap(), custom);
        assert_eq!(registry.keys().last(), Some("archive"));
    }

    #[test]
    fn register_rejects_builtin_collision() {
        let mut registry = ProfileRegistry::builtin();
        let custom = ConversionProfile::new("mine", VideoFormat::X264, QualityTier::Low);
        assert_eq!(
            registry.register("1080P", custom),
            Err(ProfileError::Duplicate("1080p".to_string()))
        );
    }

    #[test]
    fn register_rejects_invalid_profile() {
        let mut registry = ProfileRegistry::empty();
        let bad = ConversionProfile::new("bad", VideoFormat::X264, QualityTier::Low)
            .with_target(Dimension::new(1280, 0));
        assert!(registry.register("bad", bad).is_err());
        assert!(registry.is_empty());
    }

    // =========================================================================
    // Preset behaviour through the shared resolution algorithm
    // =========================================================================

    #[test]
    fn p1080_upscales_small_source() {
        assert_eq!(
            p1080().calculate_final_dimension(Dimension::new(640, 360)),
            Dimension::new(1920, 1080)
        );
    }

    #[test]
    fn uhd_keeps_small_source() {
        assert_eq!(
            uhd_4k().calculate_final_dimension(Dimension::new(640, 360)),
            Dimension::new(640, 360)
        );
    }

    #[test]
    fn p720_downscales_full_hd() {
        assert_eq!(
            p720().calculate_final_dimension(Dimension::new(1920, 1080)),
            Dimension::new(1280, 720)
        );
    }

    #[test]
    fn fixed_presets_never_upscale() {
        let src = Dimension::new(320, 180);
        for &(key, build) in BUILTIN {
            let profile = build();
            if profile.constraints().allow_scale_up {
                continue;
            }
            if profile.would_scale_up(src) {
                assert_eq!(profile.calculate_final_dimension(src), src, "preset {key}");
            }
        }
    }

    #[test]
    fn mobile_portrait_targets_tall_frame() {
        let profile = mobile(MobileOrientation::Portrait);
        assert_eq!(
            profile.calculate_final_dimension(Dimension::new(1080, 1920)),
            Dimension::new(720, 1280)
        );
    }
}
