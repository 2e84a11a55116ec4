//! Configuration for opening and tuning a database.
//!
//! Layered the same way the rest of the ambient stack expects: defaults,
//! overridden by an optional TOML file, overridden by `CVECTOR_*`
//! environment variables, overridden by runtime builder calls.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::distance::DistanceMetric;

/// Largest vector dimension a database will accept.
pub const MAX_DIMENSION: usize = 4096;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration source could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// The offending key.
        key: String,
        /// Why it is invalid.
        message: String,
    },
}

/// HNSW graph construction/search tuning. See [`crate::index::hnsw`] for
/// the meaning of each field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswTuning {
    /// Connections kept per node per level above level 0 (`M`).
    pub m: usize,
    /// Candidate list width during construction.
    pub ef_construction: usize,
    /// Default candidate list width during search.
    pub ef_search: usize,
    /// Level-assignment decay parameter.
    pub level_mult: f32,
}

impl Default for HnswTuning {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            level_mult: 1.0 / std::f32::consts::LN_2,
        }
    }
}

/// Top-level database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Dimension every vector in this database must match.
    pub dimension: usize,
    /// Default similarity metric.
    pub metric: DistanceMetric,
    /// Advisory hint that the underlying file should be memory-mapped by
    /// a future storage backend; the append-only log backend in this
    /// crate always uses buffered file I/O regardless of this flag.
    pub memory_mapped: bool,
    /// Soft cap on the number of live vectors, `0` meaning unbounded.
    pub max_vectors: u64,
    /// HNSW tuning parameters.
    pub hnsw: HnswTuning,
    /// Log level: error, warn, info, debug, trace.
    pub log_level: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dimension: 0,
            metric: DistanceMetric::Cosine,
            memory_mapped: false,
            max_vectors: 0,
            hnsw: HnswTuning::default(),
            log_level: "info".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Creates a configuration for the given dimension and metric, with
    /// every other field at its default.
    #[must_use]
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            ..Self::default()
        }
    }

    /// Loads configuration layered as defaults < TOML file < environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file contents can't be parsed as TOML or
    /// coerced into this struct's shape.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CVECTOR_").split("_").lowercase(false));

        figment
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is out of its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(ConfigError::InvalidValue {
                key: "dimension".to_string(),
                message: format!("must be in [1, {MAX_DIMENSION}], got {}", self.dimension),
            });
        }

        if self.hnsw.m == 0 {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.m".to_string(),
                message: "must be >= 1".to_string(),
            });
        }

        if self.hnsw.ef_construction == 0 {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.ef_construction".to_string(),
                message: "must be >= 1".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "log_level".to_string(),
                message: format!("must be one of {valid_levels:?}"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation_once_dimension_is_set() {
        let cfg = DatabaseConfig::new(128, DistanceMetric::Cosine);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let cfg = DatabaseConfig::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oversized_dimension_is_rejected() {
        let cfg = DatabaseConfig::new(MAX_DIMENSION + 1, DistanceMetric::Cosine);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cvector.toml");
        std::fs::write(&path, "dimension = 256\nlog_level = \"debug\"\n").unwrap();
        let cfg = DatabaseConfig::load_from_path(&path).unwrap();
        assert_eq!(cfg.dimension, 256);
        assert_eq!(cfg.log_level, "debug");
    }
}
