//! Recording state machine
//!
//! `Idle -> Recording -> Finalizing -> Complete`, and back to `Recording`
//! only through a new start request.

use serde::{Deserialize, Serialize};

use super::artifact::ArtifactHandle;

/// Current state of the recording pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// No recording in progress
    #[default]
    Idle,
    /// Encoder running, chunks accumulating
    Recording,
    /// Stop requested, waiting for the encoder to flush
    Finalizing,
    /// Artifact assembled and available
    Complete,
}

impl RecorderState {
    pub fn is_active(&self) -> bool {
        matches!(self, RecorderState::Recording | RecorderState::Finalizing)
    }
}

/// Snapshot published on every transition and every received chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    pub state: RecorderState,
    /// Chunks received in the current session
    pub chunk_count: usize,
    /// Total bytes across those chunks
    pub bytes_buffered: usize,
    /// Handle of the assembled artifact once `Complete`
    pub artifact: Option<ArtifactHandle>,
}
