//! Persistence of step artifacts and run manifests.
//!
//! An artifact is addressed by (run id, step id). Re-persisting a step's
//! artifact within a run replaces that artifact only; other steps' artifacts
//! are never touched.

mod file;
mod memory;

pub use file::FileArtifactStore;
pub use memory::InMemoryArtifactStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Artifact;
use crate::errors::Result;
use crate::pipeline::RunManifest;

/// Where an artifact lives, as listed by [`ArtifactStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Ordinal of the producing step.
    pub ordinal: usize,
    /// Producing step.
    pub step_id: String,
    /// Store-specific location.
    pub location: String,
}

/// Storage backend for artifacts and manifests.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Reserves storage for a new run and returns its location.
    ///
    /// Fails with a configuration error if the run already exists.
    async fn create_run(&self, run_id: &str) -> Result<String>;

    /// Writes `artifact`, replacing a previous artifact of the same step.
    async fn persist(&self, artifact: &Artifact) -> Result<String>;

    /// Loads the artifact of `step_id` in `run_id`.
    async fn load(&self, run_id: &str, step_id: &str) -> Result<Artifact>;

    /// Writes the run manifest.
    async fn persist_manifest(&self, manifest: &RunManifest) -> Result<String>;

    /// Loads the run manifest.
    async fn load_manifest(&self, run_id: &str) -> Result<RunManifest>;

    /// Lists the artifacts of a run ordered by ordinal.
    async fn list(&self, run_id: &str) -> Result<Vec<ArtifactRef>>;
}
