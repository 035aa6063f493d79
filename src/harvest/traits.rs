//! Core types shared by the extractor, the pipeline and the exporters.
//!
//! - Flat record cells via [`Field`]
//! - Fixed-schema rows via [`Record`]
//! - Sentinel values substituted for absent or unresolved data
//! - Terminal states of a harvest via [`Termination`]

use serde::Serialize;
use std::fmt;

// ============================================================================
// Sentinels
// ============================================================================

/// Attribute the platform did not report.
pub const NO_INFORMATION: &str = "no information";

/// "About" text missing or its lookup failed.
pub const NO_DESCRIPTION: &str = "no description";

/// Optional link or reference that does not exist.
pub const NONE: &str = "none";

/// Value that exists but could not be determined.
pub const UNKNOWN: &str = "unknown";

/// Forwarded message whose origin could not be resolved.
pub const UNKNOWN_SOURCE: &str = "unknown source";

/// Sentinel for a sub-lookup that failed with `cause`.
pub fn error_sentinel(cause: impl fmt::Display) -> Field {
    Field::Text(format!("error: {cause}"))
}

// ============================================================================
// Field
// ============================================================================

/// A single scalar cell of a flat record.
///
/// There is no "absent" variant: missing data is always a [`Field::Text`]
/// sentinel so every row of a batch carries the same columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Field {
    Text(String),
    Integer(i64),
    Flag(bool),
}

impl Field {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Text value, or `fallback` when absent.
    pub fn text_or(value: Option<&str>, fallback: &str) -> Self {
        Self::Text(value.unwrap_or(fallback).to_string())
    }

    /// Flag value, or `fallback` text when absent.
    pub fn flag_or(value: Option<bool>, fallback: &str) -> Self {
        match value {
            Some(flag) => Self::Flag(flag),
            None => Self::text(fallback),
        }
    }

    pub fn is_sentinel(&self, sentinel: &str) -> bool {
        matches!(self, Self::Text(text) if text == sentinel)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Flag(flag) => write!(f, "{flag}"),
        }
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Field {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

// ============================================================================
// Record Trait
// ============================================================================

/// A flat row with a schema fixed at compile time.
///
/// `row()` must return exactly one cell per entry of `COLUMNS`, in order.
pub trait Record: Send + Sync {
    /// Column names, in export order.
    const COLUMNS: &'static [&'static str];

    /// Kind label used in output file names (e.g. `"contacts"`).
    const KIND: &'static str;

    fn row(&self) -> Vec<&Field>;
}

// ============================================================================
// Termination
// ============================================================================

/// Why a single conversation harvest stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The platform had nothing further to return.
    Exhausted,

    /// A message older than the stop boundary was reached.
    BoundaryReached,

    /// The configured maximum number of records was collected.
    QuotaReached,

    /// A non-recoverable failure ended the harvest early; records gathered
    /// before it are kept.
    Aborted { reason: String },
}

impl Termination {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("history exhausted"),
            Self::BoundaryReached => f.write_str("stop boundary reached"),
            Self::QuotaReached => f.write_str("maximum reached"),
            Self::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}
