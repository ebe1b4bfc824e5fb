//! Testing utilities for listingflow pipelines.
//!
//! This module provides:
//! - Scripted discovery sources, fetchers, expanders and models
//! - Fixtures for records, run contexts and registries

mod fixtures;
mod mocks;

pub use fixtures::{discovered, keyword_run, product_page, registry_with, scoped};
pub use mocks::{listing, FailingSource, ScriptedModel, StaticExpander, StaticFetcher, StaticSource};
