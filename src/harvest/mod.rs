//! Harvest module - conversation member and message extraction pipeline.
//!
//! This module provides the core of the harvester:
//! - **Traits**: [`Record`] fixed-schema rows built from [`Field`] cells
//! - **Extraction**: [`RecordExtractor`] with per-field sentinel fallback
//! - **Backoff**: rate-limit retry shared by every platform call
//! - **Pipeline**: paginated async harvest via [`pipeline::HarvestPipeline`]

pub mod backoff;
pub mod extract;
pub mod pipeline;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use traits::{
    error_sentinel, Field, Record, Termination, NONE, NO_DESCRIPTION, NO_INFORMATION, UNKNOWN,
    UNKNOWN_SOURCE,
};

pub use extract::{MemberRecord, MessageRecord, ProfileFields, RecordExtractor, SenderFields};

pub use pipeline::{HarvestPipeline, HarvestResult, HarvestStats};
