//! Core domain model types for listingflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Records with derived-field provenance
//! - Shapes describing what an artifact guarantees
//! - Step kind, scope and run state enums
//! - Artifacts and step summaries

mod artifact;
mod record;
#[cfg(test)]
mod record_tests;
mod shape;
mod status;
mod summary;

pub use artifact::{artifact_file_name, Artifact};
pub use record::{fields, DerivedValue, Record, RecordId, RecordStatus, StepStamp};
pub use shape::Shape;
pub use status::{FailurePolicy, RunState, StepKind, StepScope};
pub use summary::StepSummary;
