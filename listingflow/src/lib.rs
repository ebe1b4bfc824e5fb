//! # Listingflow
//!
//! A resumable listing-enrichment pipeline.
//!
//! Listingflow discovers candidate listings for a search term, enriches them
//! with structured page data, filters them per country, classifies them with
//! pluggable models and ranks the survivors. Every step writes an artifact,
//! so any step can be re-run alone or used as the starting point of a later
//! run.
//!
//! - **Steps**: a uniform validate / execute / summarize contract over ordered records
//! - **Registry**: step lookup with global, country and organization configuration layers
//! - **Orchestrator**: single-step, extraction and full runs with restart
//! - **Artifacts**: per-step persistence with shape descriptors and run manifests
//! - **Cancellation**: run-wide token honoured between and within steps
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use listingflow::prelude::*;
//!
//! let settings = Settings::load(None)?;
//! let registry = Arc::new(StepRegistry::with_builtin_steps(&settings));
//! let store = Arc::new(FileArtifactStore::new(&settings.output_dir));
//!
//! let ctx = RunContext::new(SearchTarget::infer("aspirin"), "analyst")
//!     .with_scope(settings.resolve_scope(Some("ch"), None)?)
//!     .with_clients(settings.build_clients().await?);
//!
//! let outcome = Orchestrator::new(registry, store)
//!     .with_definition(settings.pipeline.clone())
//!     .run(&ctx, &RunRequest::full())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapters;
pub mod cancellation;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod registry;
pub mod settings;
pub mod steps;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::adapters::{
        ClassificationModel, DiscoverySource, KeywordExpander, PageFetcher, RawListing,
        SearchQuery,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{
        Clients, RunContext, RunEntry, RunId, RunOptions, RunScope, SearchTarget, StepContext,
    };
    pub use crate::core::{
        Artifact, FailurePolicy, Record, RecordStatus, RunState, Shape, StepKind, StepScope,
        StepSummary,
    };
    pub use crate::errors::{ListingflowError, Result};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        Orchestrator, PipelineDefinition, RestartPoint, RunMode, RunOutcome, RunRequest,
    };
    pub use crate::registry::StepRegistry;
    pub use crate::settings::Settings;
    pub use crate::steps::{Step, StepDescriptor, StepOutput};
    pub use crate::store::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore};
}
