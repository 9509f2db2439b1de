//! Recorded artifacts and the handles that expose them for download
//!
//! A handle stays resolvable until it is explicitly revoked. The recorder
//! revokes the previous session's handle before starting a new session, so
//! repeated record/stop cycles keep at most one artifact alive.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Stable reference to a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    fn new(id: Uuid) -> Self {
        Self(format!("blob:screencam/{}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The concatenated output of one recording session
#[derive(Debug, Clone)]
pub struct Artifact {
    id: Uuid,
    mime_type: String,
    data: Arc<Vec<u8>>,
    chunk_count: usize,
    created_at: DateTime<Utc>,
}

impl Artifact {
    /// Concatenate chunks in order into a single artifact
    pub fn from_chunks(chunks: Vec<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        let chunk_count = chunks.len();
        let data = chunks.concat();
        Self {
            id: Uuid::new_v4(),
            mime_type: mime_type.into(),
            data: Arc::new(data),
            chunk_count,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Registry of downloadable artifacts
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    artifacts: Arc<Mutex<HashMap<ArtifactHandle, Artifact>>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact and return its handle
    pub fn create(&self, artifact: Artifact) -> ArtifactHandle {
        let handle = ArtifactHandle::new(artifact.id());
        info!(
            "Artifact created: {} ({} bytes, {})",
            handle,
            artifact.size(),
            artifact.mime_type()
        );
        self.artifacts.lock().insert(handle.clone(), artifact);
        handle
    }

    pub fn resolve(&self, handle: &ArtifactHandle) -> Option<Artifact> {
        self.artifacts.lock().get(handle).cloned()
    }

    /// Release the artifact behind `handle`. Returns false if already revoked.
    pub fn revoke(&self, handle: &ArtifactHandle) -> bool {
        let removed = self.artifacts.lock().remove(handle).is_some();
        if removed {
            debug!("Artifact revoked: {}", handle);
        }
        removed
    }

    /// Number of artifacts currently held
    pub fn live_handles(&self) -> usize {
        self.artifacts.lock().len()
    }

    /// Write the artifact to `dir/filename`
    pub fn save(&self, handle: &ArtifactHandle, dir: &Path, filename: &str) -> Result<PathBuf> {
        let artifact = self
            .resolve(handle)
            .with_context(|| format!("Artifact not found: {}", handle))?;

        std::fs::create_dir_all(dir).context("Failed to create output directory")?;
        let path = dir.join(filename);
        std::fs::write(&path, artifact.data())
            .with_context(|| format!("Failed to write artifact to {}", path.display()))?;

        info!("Saved {} to {}", handle, path.display());
        Ok(path)
    }
}
