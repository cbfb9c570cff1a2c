//! Filter configuration and file I/O for configuration structs.
//!
//! Configurations are plain serde structs. They can be read from and written to JSON, YAML or TOML
//! files; the format is chosen from the file extension.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::{FilterError, Result};
use crate::particle::{DEFAULT_NUM_PARTICLES, ParticleAveragingStrategy};

fn default_num_particles() -> usize {
    DEFAULT_NUM_PARTICLES
}

/// Construction-time parameters of a [`crate::ParticleFilter`].
///
/// ## Example
///
/// ```
/// use localization::config::FilterConfig;
///
/// let cfg: FilterConfig = toml::from_str("num_particles = 500\nseed = 7").unwrap();
/// assert_eq!(cfg.num_particles, 500);
/// assert_eq!(cfg.seed, Some(7));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Fixed population size.
    #[serde(default = "default_num_particles")]
    pub num_particles: usize,

    /// Seed for the filter's random number generator. `None` seeds from system entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    /// How the population is collapsed into a single pose estimate.
    #[serde(default)]
    pub averaging: ParticleAveragingStrategy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: default_num_particles(),
            seed: None,
            averaging: ParticleAveragingStrategy::default(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(FilterError::Config(
                "num_particles must be positive".to_string(),
            ));
        }
        Ok(())
    }
    /// Read the configuration from a `.json`, `.yaml`/`.yml` or `.toml` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = read_config(path)?;
        config.validate()?;
        Ok(config)
    }
    /// Write the configuration, choosing the format by file extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_config(self, path)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

fn format_of(path: &Path) -> Result<ConfigFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    match ext.as_deref() {
        Some("json") => Ok(ConfigFormat::Json),
        Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
        Some("toml") => Ok(ConfigFormat::Toml),
        _ => Err(FilterError::Config(format!(
            "unsupported file extension: {}",
            path.display()
        ))),
    }
}

/// Deserialize any configuration struct from a file.
pub fn read_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let p = path.as_ref();
    match format_of(p)? {
        ConfigFormat::Json => {
            let file = File::open(p)?;
            serde_json::from_reader(file).map_err(|e| FilterError::Config(e.to_string()))
        }
        ConfigFormat::Yaml => {
            let file = File::open(p)?;
            serde_yaml::from_reader(file).map_err(|e| FilterError::Config(e.to_string()))
        }
        ConfigFormat::Toml => {
            let s = fs::read_to_string(p)?;
            toml::from_str(&s).map_err(|e| FilterError::Config(e.to_string()))
        }
    }
}

/// Serialize any configuration struct to a file.
pub fn write_config<T: Serialize, P: AsRef<Path>>(config: &T, path: P) -> Result<()> {
    let p = path.as_ref();
    let s = match format_of(p)? {
        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map_err(|e| FilterError::Config(e.to_string()))?,
        ConfigFormat::Yaml => {
            serde_yaml::to_string(config).map_err(|e| FilterError::Config(e.to_string()))?
        }
        ConfigFormat::Toml => {
            toml::to_string(config).map_err(|e| FilterError::Config(e.to_string()))?
        }
    };
    let mut file = File::create(p)?;
    file.write_all(s.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    fn sample() -> FilterConfig {
        FilterConfig {
            num_particles: 250,
            seed: Some(1234),
            averaging: ParticleAveragingStrategy::HighestWeight,
        }
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: FilterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, FilterConfig::default());
        assert_eq!(cfg.num_particles, 20);
        assert!(cfg.seed.is_none());
    }

    #[test]
    fn file_round_trip_all_formats() {
        for ext in ["json", "yaml", "toml"] {
            let path = temp_dir().join(format!("pf_localization_filter_config.{ext}"));
            sample().to_file(&path).unwrap();
            let loaded = FilterConfig::from_file(&path).unwrap();
            assert_eq!(loaded, sample());
            let _ = std::fs::remove_file(&path);
        }
    }

    #[test]
    fn unsupported_extension() {
        let err = FilterConfig::from_file("filter.ini").unwrap_err();
        assert!(matches!(err, FilterError::Config(_)));
    }

    #[test]
    fn zero_particles_rejected() {
        let cfg = FilterConfig {
            num_particles: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn averaging_uses_snake_case() {
        let cfg: FilterConfig = toml::from_str("averaging = \"highest_weight\"").unwrap();
        assert_eq!(cfg.averaging, ParticleAveragingStrategy::HighestWeight);
    }
}
