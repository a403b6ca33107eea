use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Main gym configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GymConfig {
    /// Backend random seed. Leave unset if not desired.
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,
    /// Action clipping configuration
    #[serde(default)]
    pub clip: ClipConfig,
}

impl Default for GymConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            clip: ClipConfig::default(),
        }
    }
}

fn default_seed() -> Option<u64> {
    Some(423_423_423)
}

/// Configuration of the bounded action transform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    /// Use min/max instead of the smooth transform for limiting actions by
    /// their bounds. Recommended for debugging only.
    #[serde(default)]
    pub hard_clip: bool,
    /// Apply a hard guard at `outer_clip_cut_off` times the boundaries
    /// before the smooth transform.
    #[serde(default = "default_outer_clip")]
    pub outer_clip: bool,
    /// Multiplier on the bounds for the outer guard. Must be >= 1.
    #[serde(default = "default_outer_clip_cut_off")]
    pub outer_clip_cut_off: f64,
    /// Softness of bounding actions between their lower and upper bounds.
    /// Smaller values approach a hard clip. Must be > 0.
    #[serde(default = "default_hinge_softness")]
    pub hinge_softness: f64,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            hard_clip: false,
            outer_clip: default_outer_clip(),
            outer_clip_cut_off: default_outer_clip_cut_off(),
            hinge_softness: default_hinge_softness(),
        }
    }
}

fn default_outer_clip() -> bool {
    true
}

fn default_outer_clip_cut_off() -> f64 {
    10.0
}

fn default_hinge_softness() -> f64 {
    1.0
}

impl GymConfig {
    /// Load configuration from a file, with `HEDGEGYM__`-prefixed environment
    /// variables taking precedence.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("HEDGEGYM").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = GymConfig::default();

        assert_eq!(config.seed, Some(423_423_423));
        assert!(!config.clip.hard_clip);
        assert!(config.clip.outer_clip);
        assert_eq!(config.clip.outer_clip_cut_off, 10.0);
        assert_eq!(config.clip.hinge_softness, 1.0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("hedgegym_config_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gym.toml");
        fs::write(
            &path,
            "seed = 7\n\n[clip]\nhard_clip = true\nhinge_softness = 0.25\n",
        )
        .unwrap();

        let config = GymConfig::load(&path).unwrap();

        assert_eq!(config.seed, Some(7));
        assert!(config.clip.hard_clip);
        assert_eq!(config.clip.hinge_softness, 0.25);
        // Unset fields fall back to defaults
        assert!(config.clip.outer_clip);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = GymConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: GymConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.seed, config.seed);
        assert_eq!(parsed.clip.outer_clip_cut_off, config.clip.outer_clip_cut_off);
    }
}
