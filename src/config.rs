//! YAML-backed reader configuration
//!
//! Readers can be configured in code through their builders or declaratively:
//!
//! ```rust
//! use signal_reader::config::{ReaderConfig, ReaderKind};
//!
//! let config = ReaderConfig::from_yaml(
//!     "kind:\n  type: block\n  block_size: 16\nvalue_read_type: Float64\ntimeout_ms: 50\n",
//! )
//! .unwrap();
//! assert_eq!(config.kind, ReaderKind::Block { block_size: 16 });
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::codec::{check_domain_read_type, check_value_read_type};
use crate::reader::ReaderOptions;
use crate::types::{Ratio, ReadMode, SampleType, TimeoutType};
use crate::{ReaderError, Result};

/// Which single-signal reader a [`ReaderConfig`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReaderKind {
    #[default]
    Stream,
    Block { block_size: usize },
    Tail { history_size: usize },
}

/// Configuration of a stream, block or tail reader.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub kind: ReaderKind,
    pub value_read_type: SampleType,
    pub domain_read_type: SampleType,
    pub read_mode: ReadMode,
    pub skip_events: bool,
    /// Default timeout for reads driven by this configuration
    pub timeout_ms: u64,
}

impl ReaderConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ReaderConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        check_value_read_type(self.value_read_type)?;
        check_domain_read_type(self.domain_read_type)?;
        match self.kind {
            ReaderKind::Block { block_size: 0 } => {
                Err(ReaderError::invalid_parameter("block_size", "must be at least 1"))
            }
            ReaderKind::Tail { history_size: 0 } => {
                Err(ReaderError::invalid_parameter("history_size", "must be at least 1"))
            }
            _ => Ok(()),
        }
    }

    pub fn options(&self) -> ReaderOptions {
        ReaderOptions {
            value_read_type: self.value_read_type,
            domain_read_type: self.domain_read_type,
            read_mode: self.read_mode,
            skip_events: self.skip_events,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration of a [`MultiReader`](crate::reader::MultiReader).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiReaderConfig {
    pub value_read_type: SampleType,
    /// Must be set to a concrete type; the default `Undefined` is rejected.
    pub domain_read_type: SampleType,
    pub read_mode: ReadMode,
    pub timeout_type: TimeoutType,
    pub required_common_sample_rate: Option<Ratio>,
    pub start_on_full_unit_of_domain: bool,
    pub timeout_ms: u64,
}

impl MultiReaderConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: MultiReaderConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_value_read_type(self.value_read_type)?;
        if self.domain_read_type == SampleType::Undefined {
            return Err(ReaderError::invalid_parameter(
                "domain_read_type",
                "a multi reader needs a defined domain read type",
            ));
        }
        check_domain_read_type(self.domain_read_type)?;
        if let Some(rate) = self.required_common_sample_rate {
            if !rate.is_positive() {
                return Err(ReaderError::invalid_parameter(
                    "required_common_sample_rate",
                    format!("must be positive, got {rate}"),
                ));
            }
        }
        Ok(())
    }

    /// Options applied to every signal of the reader.
    pub fn options(&self) -> ReaderOptions {
        ReaderOptions {
            value_read_type: self.value_read_type,
            domain_read_type: self.domain_read_type,
            read_mode: self.read_mode,
            skip_events: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
