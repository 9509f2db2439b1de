//! Live media tracks
//!
//! A track is a cloneable handle to a continuously-updating feed. Capture
//! backends hold one clone and push into it; the compositor, mixer and
//! encoder hold others and read from it. Ending a track is permanent.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use uuid::Uuid;

use super::frame::{AudioFrame, VideoFrame};

/// Audio frames buffered per subscriber before the slowest one starts lagging
const AUDIO_TRACK_CAPACITY: usize = 256;

/// Observable state of a video track
#[derive(Debug, Clone, Default)]
pub struct VideoTrackState {
    /// Most recent frame, if any has arrived yet
    pub frame: Option<Arc<VideoFrame>>,
    /// Set once the producing device is stopped or revoked
    pub ended: bool,
}

#[derive(Debug)]
struct VideoTrackInner {
    id: Uuid,
    label: String,
    state: watch::Sender<VideoTrackState>,
}

/// Live video feed
///
/// Readers only ever see the latest frame; intermediate frames that nobody
/// sampled are overwritten.
#[derive(Debug, Clone)]
pub struct VideoTrack {
    inner: Arc<VideoTrackInner>,
}

impl VideoTrack {
    pub fn new(label: impl Into<String>) -> Self {
        let (state, _) = watch::channel(VideoTrackState::default());
        Self {
            inner: Arc::new(VideoTrackInner {
                id: Uuid::new_v4(),
                label: label.into(),
                state,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Replace the current frame. Returns false once the track has ended.
    pub fn push_frame(&self, frame: impl Into<Arc<VideoFrame>>) -> bool {
        let frame = frame.into();
        self.inner.state.send_if_modified(|state| {
            if state.ended {
                return false;
            }
            state.frame = Some(frame);
            true
        })
    }

    /// Mark the track as ended. Idempotent.
    pub fn end(&self) {
        let changed = self.inner.state.send_if_modified(|state| {
            if state.ended {
                return false;
            }
            state.ended = true;
            state.frame = None;
            true
        });
        if changed {
            info!("Video track ended: {} ({})", self.inner.label, self.inner.id);
        }
    }

    pub fn is_ended(&self) -> bool {
        self.inner.state.borrow().ended
    }

    /// A track is ready once it has a usable current frame and has not ended
    pub fn is_ready(&self) -> bool {
        let state = self.inner.state.borrow();
        !state.ended && state.frame.as_ref().is_some_and(|f| !f.is_degenerate())
    }

    /// Native pixel dimensions of the current frame
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.current_frame().map(|f| (f.width, f.height))
    }

    pub fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        let state = self.inner.state.borrow();
        if state.ended {
            return None;
        }
        state.frame.clone()
    }

    /// Change notifications for every pushed frame (latest wins)
    pub fn subscribe(&self) -> watch::Receiver<VideoTrackState> {
        self.inner.state.subscribe()
    }

    /// Resolves when the track ends
    pub async fn ended(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|state| state.ended).await;
    }
}

#[derive(Debug)]
struct AudioTrackInner {
    id: Uuid,
    label: String,
    frames: broadcast::Sender<AudioFrame>,
    ended: watch::Sender<bool>,
}

/// Live audio feed with fan-out to every subscriber
#[derive(Debug, Clone)]
pub struct AudioTrack {
    inner: Arc<AudioTrackInner>,
}

impl AudioTrack {
    pub fn new(label: impl Into<String>) -> Self {
        let (frames, _) = broadcast::channel(AUDIO_TRACK_CAPACITY);
        let (ended, _) = watch::channel(false);
        Self {
            inner: Arc::new(AudioTrackInner {
                id: Uuid::new_v4(),
                label: label.into(),
                frames,
                ended,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Deliver a frame to current subscribers. Returns false once ended.
    pub fn push(&self, frame: AudioFrame) -> bool {
        if *self.inner.ended.borrow() {
            return false;
        }
        // No subscribers is not an error: nobody is listening yet.
        if self.inner.frames.send(frame).is_err() {
            debug!("Audio frame dropped on {}: no subscribers", self.inner.label);
        }
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.inner.frames.subscribe()
    }

    pub fn end(&self) {
        let changed = self.inner.ended.send_if_modified(|ended| {
            if *ended {
                return false;
            }
            *ended = true;
            true
        });
        if changed {
            info!("Audio track ended: {} ({})", self.inner.label, self.inner.id);
        }
    }

    pub fn is_live(&self) -> bool {
        !*self.inner.ended.borrow()
    }

    /// Resolves when the track ends
    pub async fn ended(&self) {
        let mut rx = self.inner.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }
}
