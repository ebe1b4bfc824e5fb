//! Artifact store backed by one directory per run.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::{ArtifactRef, ArtifactStore};
use crate::core::{artifact_file_name, Artifact};
use crate::errors::{ArtifactNotFoundError, ConfigurationError, Result};
use crate::pipeline::RunManifest;

const MANIFEST_FILE: &str = "run.json";

/// Writes `{root}/{run_id}/{ordinal:02}_{step_id}.json` as pretty JSON.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one run.
    #[must_use]
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    /// Splits `NN_step_id.json` into its ordinal and step id.
    fn parse_file_name(name: &str) -> Option<(usize, &str)> {
        let stem = name.strip_suffix(".json")?;
        let (ordinal, step_id) = stem.split_once('_')?;
        if step_id.is_empty() || !ordinal.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some((ordinal.parse().ok()?, step_id))
    }

    async fn scan(&self, run_id: &str) -> Result<Vec<ArtifactRef>> {
        let dir = self.run_dir(run_id);
        let mut found = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some((ordinal, step_id)) = Self::parse_file_name(name) {
                found.push(ArtifactRef {
                    ordinal,
                    step_id: step_id.to_string(),
                    location: entry.path().display().to_string(),
                });
            }
        }
        found.sort();
        Ok(found)
    }

    /// Writes `contents` to a temporary sibling and renames it into place.
    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn create_run(&self, run_id: &str) -> Result<String> {
        let dir = self.run_dir(run_id);
        if fs::try_exists(&dir).await? {
            return Err(ConfigurationError::new(format!(
                "run directory {} already exists",
                dir.display()
            ))
            .with_parameter("run_id")
            .into());
        }
        fs::create_dir_all(&dir).await?;
        info!(run_id, dir = %dir.display(), "Created run directory");
        Ok(dir.display().to_string())
    }

    async fn persist(&self, artifact: &Artifact) -> Result<String> {
        let dir = self.run_dir(&artifact.run_id);
        fs::create_dir_all(&dir).await?;

        for stale in self.scan(&artifact.run_id).await? {
            if stale.step_id == artifact.step_id && stale.ordinal != artifact.ordinal {
                debug!(location = %stale.location, "Removing stale artifact");
                fs::remove_file(&stale.location).await?;
            }
        }

        let path = dir.join(artifact.file_name());
        let json = serde_json::to_vec_pretty(artifact)?;
        Self::write_atomic(&path, &json).await?;
        debug!(
            step = %artifact.step_id,
            records = artifact.records.len(),
            path = %path.display(),
            "Persisted artifact"
        );
        Ok(path.display().to_string())
    }

    async fn load(&self, run_id: &str, step_id: &str) -> Result<Artifact> {
        let found = self
            .scan(run_id)
            .await?
            .into_iter()
            .find(|r| r.step_id == step_id)
            .ok_or_else(|| ArtifactNotFoundError {
                run_id: run_id.to_string(),
                step_id: step_id.to_string(),
            })?;
        let bytes = fs::read(&found.location).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn persist_manifest(&self, manifest: &RunManifest) -> Result<String> {
        let dir = self.run_dir(&manifest.run_id);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(manifest)?;
        Self::write_atomic(&path, &json).await?;
        Ok(path.display().to_string())
    }

    async fn load_manifest(&self, run_id: &str) -> Result<RunManifest> {
        let path = self.run_dir(run_id).join(MANIFEST_FILE);
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ArtifactNotFoundError {
                run_id: run_id.to_string(),
                step_id: MANIFEST_FILE.to_string(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, run_id: &str) -> Result<Vec<ArtifactRef>> {
        self.scan(run_id).await
    }
}
