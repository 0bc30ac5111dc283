//! Builder configuration types.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::BuilderError;

/// Configuration for the tree builder.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct BuilderConfig {
    /// Package group sources, one group per entry.
    #[builder(default)]
    #[serde(default)]
    pub package_sources: Vec<PathBuf>,

    /// Workers allowed per available core.
    #[builder(default = "4")]
    #[serde(default = "default_worker_multiplier")]
    pub worker_multiplier: usize,

    /// Explicit worker ceiling, overriding the multiplier.
    #[builder(default)]
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Buffered events per subscriber before it starts lagging.
    #[builder(default = "1024")]
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Fallback wake interval for the resubmission loop, in milliseconds.
    #[builder(default = "25")]
    #[serde(default = "default_resubmit_interval_ms")]
    pub resubmit_interval_ms: u64,

    /// Stop filtering a listfile at the first miss after a run of matches.
    #[builder(default = "false")]
    #[serde(default)]
    pub assume_sorted_listfiles: bool,

    /// Separator between path segments inside a package.
    #[builder(default = "'\\\\'")]
    #[serde(default = "default_separator")]
    pub separator: char,
}

fn default_worker_multiplier() -> usize {
    4
}

fn default_event_capacity() -> usize {
    1024
}

fn default_resubmit_interval_ms() -> u64 {
    25
}

fn default_separator() -> char {
    '\\'
}

impl BuilderConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.worker_multiplier == Some(0) {
            return Err("Worker multiplier must be at least 1".to_string());
        }
        if let Some(Some(0)) = self.max_workers {
            return Err("Maximum worker count must be at least 1".to_string());
        }
        if self.event_capacity == Some(0) {
            return Err("Event capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

impl BuilderConfig {
    /// Create a new builder config builder.
    pub fn builder() -> BuilderConfigBuilder {
        BuilderConfigBuilder::default()
    }

    /// Create a simple config for the given package sources.
    pub fn new<I, P>(sources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            package_sources: sources.into_iter().map(Into::into).collect(),
            worker_multiplier: default_worker_multiplier(),
            max_workers: None,
            event_capacity: default_event_capacity(),
            resubmit_interval_ms: default_resubmit_interval_ms(),
            assume_sorted_listfiles: false,
            separator: default_separator(),
        }
    }

    /// Maximum number of workers allowed to run at once.
    ///
    /// Always at least 1.
    pub fn concurrency_ceiling(&self) -> usize {
        if let Some(max) = self.max_workers {
            return max.max(1);
        }
        let cores = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        cores.saturating_mul(self.worker_multiplier.max(1))
    }

    /// Fallback wake interval for the resubmission loop.
    pub fn resubmit_interval(&self) -> Duration {
        Duration::from_millis(self.resubmit_interval_ms.max(1))
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self::new(Vec::<PathBuf>::new())
    }
}

impl From<BuilderConfigBuilderError> for BuilderError {
    fn from(error: BuilderConfigBuilderError) -> Self {
        Self::InvalidConfig {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = BuilderConfig::builder()
            .package_sources(vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")])
            .max_workers(Some(4usize))
            .assume_sorted_listfiles(true)
            .build()
            .unwrap();

        assert_eq!(config.package_sources.len(), 2);
        assert_eq!(config.concurrency_ceiling(), 4);
        assert!(config.assume_sorted_listfiles);
        assert_eq!(config.separator, '\\');
    }

    #[test]
    fn test_config_rejects_zero_workers() {
        let result = BuilderConfig::builder().max_workers(Some(0usize)).build();
        assert!(result.is_err());

        let result = BuilderConfig::builder().worker_multiplier(0usize).build();
        let err = BuilderError::from(result.unwrap_err());
        assert!(err.to_string().contains("Worker multiplier must be at least 1"));
    }

    #[test]
    fn test_ceiling_scales_with_multiplier() {
        let single = BuilderConfig::builder()
            .worker_multiplier(1usize)
            .build()
            .unwrap();
        let double = BuilderConfig::builder()
            .worker_multiplier(2usize)
            .build()
            .unwrap();

        assert!(single.concurrency_ceiling() >= 1);
        assert_eq!(double.concurrency_ceiling(), single.concurrency_ceiling() * 2);
    }

    #[test]
    fn test_config_simple() {
        let config = BuilderConfig::new(["/data/wow"]);
        assert_eq!(config.package_sources, vec![PathBuf::from("/data/wow")]);
        assert_eq!(config.worker_multiplier, 4);
        assert_eq!(config.event_capacity, 1024);
        assert!(config.max_workers.is_none());
        assert!(!config.assume_sorted_listfiles);
    }
}
