//! In-memory artifact store for tests and dry runs.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ArtifactRef, ArtifactStore};
use crate::core::Artifact;
use crate::errors::{ArtifactNotFoundError, ConfigurationError, Result};
use crate::pipeline::RunManifest;

#[derive(Debug, Default)]
struct RunSlot {
    artifacts: Vec<Artifact>,
    manifest: Option<RunManifest>,
}

/// Keeps artifacts in a concurrent map keyed by run id.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    runs: DashMap<String, RunSlot>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    fn location(run_id: &str, artifact: &Artifact) -> String {
        format!("memory://{run_id}/{}", artifact.file_name())
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn create_run(&self, run_id: &str) -> Result<String> {
        if self.runs.contains_key(run_id) {
            return Err(ConfigurationError::new(format!("run '{run_id}' already exists"))
                .with_parameter("run_id")
                .into());
        }
        self.runs.insert(run_id.to_string(), RunSlot::default());
        Ok(format!("memory://{run_id}"))
    }

    async fn persist(&self, artifact: &Artifact) -> Result<String> {
        let mut slot = self.runs.entry(artifact.run_id.clone()).or_default();
        slot.artifacts.retain(|a| a.step_id != artifact.step_id);
        slot.artifacts.push(artifact.clone());
        slot.artifacts.sort_by_key(|a| a.ordinal);
        Ok(Self::location(&artifact.run_id, artifact))
    }

    async fn load(&self, run_id: &str, step_id: &str) -> Result<Artifact> {
        self.runs
            .get(run_id)
            .and_then(|slot| slot.artifacts.iter().find(|a| a.step_id == step_id).cloned())
            .ok_or_else(|| {
                ArtifactNotFoundError {
                    run_id: run_id.to_string(),
                    step_id: step_id.to_string(),
                }
                .into()
            })
    }

    async fn persist_manifest(&self, manifest: &RunManifest) -> Result<String> {
        let mut slot = self.runs.entry(manifest.run_id.clone()).or_default();
        slot.manifest = Some(manifest.clone());
        Ok(format!("memory://{}/run.json", manifest.run_id))
    }

    async fn load_manifest(&self, run_id: &str) -> Result<RunManifest> {
        self.runs
            .get(run_id)
            .and_then(|slot| slot.manifest.clone())
            .ok_or_else(|| {
                ArtifactNotFoundError {
                    run_id: run_id.to_string(),
                    step_id: "run.json".to_string(),
                }
                .into()
            })
    }

    async fn list(&self, run_id: &str) -> Result<Vec<ArtifactRef>> {
        Ok(self
            .runs
            .get(run_id)
            .map(|slot| {
                slot.artifacts
                    .iter()
                    .map(|a| ArtifactRef {
                        ordinal: a.ordinal,
                        step_id: a.step_id.clone(),
                        location: Self::location(run_id, a),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
