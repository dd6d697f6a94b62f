//! Read mode and timeout policy

use serde::{Deserialize, Serialize};

/// How values are taken from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadMode {
    /// Raw stored values, converted to the read type, post-scaling ignored.
    Unscaled,
    /// Post-scaling applied, then converted to the read type.
    #[default]
    Scaled,
    /// Raw stored values copied verbatim; the read type must equal the stored type.
    RawValue,
}

/// When a multi reader stops waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeoutType {
    /// Wait until every signal can supply the full count (or an event/timeout).
    #[default]
    All,
    /// Return as soon as every signal can supply at least one aligned sample.
    Any,
}
