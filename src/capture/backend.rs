use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::error::CaptureError;
use crate::media::{AudioTrack, VideoTrack};

/// Kind of capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// User-facing camera (with microphone)
    Camera,
    /// Display capture (with system audio when available)
    Display,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Camera => write!(f, "camera"),
            SourceKind::Display => write!(f, "display"),
        }
    }
}

/// Requested capture properties (ideal values, not hard requirements)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<u32>,
    /// Capture the paired audio (microphone or system audio)
    pub audio: bool,
    /// Prefer the user-facing camera
    pub facing_user: bool,
    /// Prefer whole-monitor sharing over a single window
    pub prefer_monitor: bool,
}

impl CaptureConstraints {
    pub fn camera() -> Self {
        Self {
            width: Some(640),
            height: Some(480),
            frame_rate: None,
            audio: true,
            facing_user: true,
            prefer_monitor: false,
        }
    }

    pub fn display() -> Self {
        Self {
            width: None,
            height: None,
            frame_rate: None,
            audio: true,
            facing_user: false,
            prefer_monitor: true,
        }
    }

    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Camera => Self::camera(),
            SourceKind::Display => Self::display(),
        }
    }
}

/// A live capture: one video track plus zero or more audio tracks
#[derive(Debug, Clone)]
pub struct CaptureSource {
    id: Uuid,
    kind: SourceKind,
    video: VideoTrack,
    audio: Vec<AudioTrack>,
}

impl CaptureSource {
    pub fn new(kind: SourceKind, video: VideoTrack, audio: Vec<AudioTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            video,
            audio,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn video(&self) -> &VideoTrack {
        &self.video
    }

    pub fn audio_tracks(&self) -> &[AudioTrack] {
        &self.audio
    }

    /// True while at least one audio track is still live
    pub fn has_audio(&self) -> bool {
        self.audio.iter().any(|t| t.is_live())
    }

    /// Live until the video track ends
    pub fn is_live(&self) -> bool {
        !self.video.is_ended()
    }

    /// Stop every track of this source
    pub fn stop(&self) {
        info!("Stopping {} source {}", self.kind, self.id);
        self.video.end();
        for track in &self.audio {
            track.end();
        }
    }

    /// Resolves when the underlying device is stopped or revoked
    pub async fn terminated(&self) {
        self.video.ended().await
    }
}

/// Run `callback` once the source terminates
pub fn on_terminated<F>(source: &CaptureSource, callback: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    let source = source.clone();
    tokio::spawn(async move {
        source.terminated().await;
        callback();
    })
}

/// Capture device backend
///
/// Implementations:
/// - `SyntheticCapture`: test-pattern video and tone audio (tests, demo)
/// - platform backends wrap the OS camera/display pickers
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Acquire a live source of the given kind
    async fn request_source(
        &self,
        kind: SourceKind,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureSource, CaptureError>;

    /// Release a source acquired from this backend
    async fn stop(&self, source: &CaptureSource) {
        source.stop();
    }

    /// Get backend name for logging
    fn name(&self) -> &str;
}
