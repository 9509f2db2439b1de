use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recorder::RecorderState;

/// Snapshot of a capture/recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Whether the recorder is recording or finalizing
    pub is_recording: bool,

    /// Recorder state at the time of the snapshot
    pub state: RecorderState,

    /// When the current recording started, if one has
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Non-empty chunks received in the current recording
    pub chunks_count: usize,

    /// Bytes across those chunks
    pub bytes_recorded: usize,

    pub has_camera: bool,
    pub has_screen: bool,

    /// Frames drawn by the compositor so far
    pub frames_composited: u64,
}
