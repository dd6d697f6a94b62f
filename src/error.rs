//! Error types for signal reading.
//!
//! Every failure a reader can report has its own variant so callers can react to
//! the specific kind instead of matching on message text.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: invalid block/history sizes, unsupported read types,
//!   an undefined domain type on a multi reader
//! - **Descriptor Errors**: domains that cannot be converted to time, invalid descriptor state
//! - **Alignment Errors**: sample rates or domains that cannot share a time base
//! - **Buffer Errors**: caller buffers that are too small or misshaped
//! - **Transient Errors**: no descriptor received yet, timeouts while waiting for one
//!
//! Partial reads and descriptor-change events are *not* errors. They are reported
//! through [`ReaderStatus`](crate::ReaderStatus).
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use signal_reader::ReaderError;
//!
//! let error = ReaderError::UndefinedTypeNoDescriptor;
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::types::SampleType;

/// Result type alias for reader operations.
pub type Result<T, E = ReaderError> = std::result::Result<T, E>;

/// Main error type for reader operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReaderError {
    #[error("Sample type {sample_type:?} is not supported {context}")]
    UnsupportedSampleType { sample_type: SampleType, context: String },

    #[error("Read type is undefined and no descriptor has been received yet")]
    UndefinedTypeNoDescriptor,

    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Domain quantity must be \"time\", found \"{quantity}\"")]
    InvalidDomainQuantity { quantity: String },

    #[error("Domain unit must be seconds (\"s\"), found \"{symbol}\"")]
    UnsupportedTimeUnit { symbol: String },

    #[error("Domain sample type {sample_type:?} cannot be converted to time")]
    UnsupportedDomainSampleType { sample_type: SampleType },

    #[error("Invalid descriptor state: {reason}")]
    InvalidDescriptorState { reason: String },

    #[error("Incompatible sample rates: {details}")]
    IncompatibleSampleRates { details: String },

    #[error("Incompatible domains: {details}")]
    IncompatibleDomains { details: String },

    #[error("Type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch { expected: SampleType, actual: SampleType },

    #[error("Buffer error in {context}: required {required}, provided {provided}")]
    Buffer { context: String, required: usize, provided: usize },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Configuration error: {context}")]
    Config {
        context: String,
        #[source]
        source: serde_yaml_ng::Error,
    },
}

impl ReaderError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReaderError::UndefinedTypeNoDescriptor => true,
            ReaderError::Timeout { .. } => true,
            ReaderError::UnsupportedSampleType { .. } => false,
            ReaderError::InvalidParameter { .. } => false,
            ReaderError::InvalidDomainQuantity { .. } => false,
            ReaderError::UnsupportedTimeUnit { .. } => false,
            ReaderError::UnsupportedDomainSampleType { .. } => false,
            ReaderError::InvalidDescriptorState { .. } => false,
            ReaderError::IncompatibleSampleRates { .. } => false,
            ReaderError::IncompatibleDomains { .. } => false,
            ReaderError::TypeMismatch { .. } => false,
            ReaderError::Buffer { .. } => false,
            ReaderError::Parse { .. } => false,
            ReaderError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ReaderError::UnsupportedSampleType { .. } => vec![
                "Read complex, binary and string signals with a dedicated reader",
                "Use a numeric or struct value read type",
                "Leave the read type undefined to follow the signal's descriptor",
            ],
            ReaderError::UndefinedTypeNoDescriptor => vec![
                "Wait until the signal publishes its first descriptor",
                "Retry the read after the producer has started",
                "Configure an explicit value read type",
            ],
            ReaderError::InvalidParameter { .. } => vec![
                "Check block and history sizes are at least 1",
                "Give multi readers a concrete domain read type",
                "Verify buffer lengths match the requested sample count",
            ],
            ReaderError::Timeout { .. } => vec![
                "Increase the read timeout",
                "Check that the producer is still sending packets",
            ],
            ReaderError::InvalidDomainQuantity { .. } => vec![
                "Only time domains can be converted to time points",
                "Read raw domain values instead of time points",
            ],
            ReaderError::UnsupportedTimeUnit { .. } => vec![
                "Publish the domain unit in seconds",
                "Read raw domain values and convert them manually",
            ],
            ReaderError::UnsupportedDomainSampleType { .. } => vec![
                "Use an integer, float or range domain sample type",
                "Read raw domain values instead of time points",
            ],
            ReaderError::InvalidDescriptorState { .. } => vec![
                "Check the producer publishes complete descriptors",
                "Verify the domain descriptor carries a tick resolution and origin",
            ],
            ReaderError::IncompatibleSampleRates { .. } => vec![
                "Choose a required common sample rate every signal rate divides",
                "Use linear domain rules on all signals",
                "Read the signals with separate stream readers",
            ],
            ReaderError::IncompatibleDomains { .. } => vec![
                "Make sure all signals share the same domain unit",
                "Verify all domain origins are valid timestamps",
            ],
            ReaderError::TypeMismatch { .. } => vec![
                "Read with the element type the reader was configured for",
                "Use the typed reader front-end to dispatch on the runtime type",
            ],
            ReaderError::Buffer { .. } => vec![
                "Allocate buffers for the full requested sample count",
                "Use a multiple of the block size for block reads",
            ],
            ReaderError::Parse { .. } => vec![
                "Check the origin string is an ISO-8601 timestamp",
                "Verify the configuration syntax",
            ],
            ReaderError::Config { .. } => vec![
                "Check the YAML syntax of the configuration",
                "Verify field names and enum spellings",
            ],
        }
    }

    /// Helper constructor for unsupported sample types.
    pub fn unsupported_sample_type(sample_type: SampleType, context: impl Into<String>) -> Self {
        ReaderError::UnsupportedSampleType { sample_type, context: context.into() }
    }

    /// Helper constructor for invalid parameters.
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        ReaderError::InvalidParameter { parameter: parameter.into(), reason: reason.into() }
    }

    /// Helper constructor for invalid descriptor state.
    pub fn invalid_descriptor(reason: impl Into<String>) -> Self {
        ReaderError::InvalidDescriptorState { reason: reason.into() }
    }

    /// Helper constructor for incompatible sample rates.
    pub fn incompatible_rates(details: impl Into<String>) -> Self {
        ReaderError::IncompatibleSampleRates { details: details.into() }
    }

    /// Helper constructor for incompatible domains.
    pub fn incompatible_domains(details: impl Into<String>) -> Self {
        ReaderError::IncompatibleDomains { details: details.into() }
    }

    /// Helper constructor for buffer size errors.
    pub fn buffer_too_small(context: impl Into<String>, required: usize, provided: usize) -> Self {
        ReaderError::Buffer { context: context.into(), required, provided }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        ReaderError::Parse { context: context.into(), details: details.into() }
    }
}

impl From<serde_yaml_ng::Error> for ReaderError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        ReaderError::Config { context: "YAML".to_string(), source: err }
    }
}
