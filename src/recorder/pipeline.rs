//! Recording pipeline
//!
//! Owns the recording state machine. `start` and `stop` are the two request
//! entry points; the per-session pump task reacts to encoder events (chunks,
//! then `Stopped`) and is the only place the `Complete` transition happens.
//! Every change is published through a `watch` channel so callers can await
//! completion instead of polling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::artifact::{Artifact, ArtifactHandle, ArtifactStore};
use super::capture::{capture_stream, SurfaceCapture};
use super::encoder::{Encoder, EncoderEvent, EncoderFactory};
use super::state::{RecorderState, RecorderStatus};
use crate::audio::{AudioMixer, MixGraph};
use crate::capture::CaptureSource;
use crate::compositor::SurfaceFeed;
use crate::config::RecorderConfig;
use crate::error::RecorderError;
use crate::media::{AudioTrack, MediaStream};

/// Resources owned by one recording session
struct ActiveSession {
    generation: u64,
    encoder: Box<dyn Encoder>,
    capture: SurfaceCapture,
    mixed_audio: Option<AudioTrack>,
    pump: JoinHandle<()>,
}

impl ActiveSession {
    /// Drop the session without finalizing: chunks are discarded
    fn abandon(mut self) {
        debug!("Abandoning recording session {}", self.generation);
        self.encoder.stop();
        // Aborting the pump drops its chunks and its mix graph
        self.pump.abort();
        self.capture.stop();
        if let Some(track) = &self.mixed_audio {
            track.end();
        }
    }
}

/// Records the compositor output plus mixed audio into chunked artifacts
pub struct Recorder {
    config: RecorderConfig,
    factory: Arc<dyn EncoderFactory>,
    mixer: AudioMixer,
    store: ArtifactStore,
    status: Arc<watch::Sender<RecorderStatus>>,
    generation: Arc<AtomicU64>,
    active: Option<ActiveSession>,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        factory: Arc<dyn EncoderFactory>,
        mixer: AudioMixer,
        store: ArtifactStore,
    ) -> Self {
        let (status, _) = watch::channel(RecorderStatus::default());
        Self {
            config,
            factory,
            mixer,
            store,
            status: Arc::new(status),
            generation: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn status(&self) -> RecorderStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> RecorderState {
        self.status.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.status.subscribe()
    }

    /// Mixed audio track of the current session, if any source had audio
    pub fn mixed_audio(&self) -> Option<&AudioTrack> {
        self.active.as_ref().and_then(|s| s.mixed_audio.as_ref())
    }

    /// Begin a new session recording `feed` and the audio of `sources`
    ///
    /// Any previous session is torn down and its artifact revoked first. On
    /// error the recorder is left `Idle`.
    pub fn start(
        &mut self,
        feed: Option<&SurfaceFeed>,
        sources: &[CaptureSource],
    ) -> Result<(), RecorderError> {
        let feed = feed.ok_or(RecorderError::NoSurface)?;

        if let Some(previous) = self.active.take() {
            warn!("Recording started while a session was active; discarding it");
            previous.abandon();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.status.send_replace(RecorderStatus::default());
        if let Some(handle) = previous.artifact {
            self.store.revoke(&handle);
        }

        let mut encoder = self.factory.create(&self.config.mime_type)?;

        let mut capture = capture_stream(feed, self.config.capture_fps);
        let mut stream = MediaStream::new(Some(capture.track().clone()));

        let graph = self.mixer.build_mix(sources);
        let mixed_audio = graph.as_ref().map(|g| g.output().clone());
        if let Some(track) = &mixed_audio {
            stream.add_track(track.clone());
        }

        let events = match encoder.start(stream, self.config.timeslice()) {
            Ok(events) => events,
            Err(e) => {
                error!("Failed to start encoder: {}", e);
                capture.stop();
                drop(graph);
                return Err(e);
            }
        };

        let pump = tokio::spawn(pump_events(Pump {
            generation,
            current: Arc::clone(&self.generation),
            status: Arc::clone(&self.status),
            store: self.store.clone(),
            artifact_mime: self.config.artifact_mime.clone(),
            graph,
            video: capture.track().clone(),
            events,
        }));

        self.active = Some(ActiveSession {
            generation,
            encoder,
            capture,
            mixed_audio,
            pump,
        });
        self.status.send_modify(|status| status.state = RecorderState::Recording);

        info!(
            "Recording session {} started ({}, {:?} timeslice)",
            generation,
            self.config.mime_type,
            self.config.timeslice()
        );
        Ok(())
    }

    /// Request the encoder to stop. No-op when nothing is recording.
    pub fn stop(&mut self) {
        let Some(session) = self.active.as_mut() else {
            debug!("Stop requested with no active recording");
            return;
        };
        if !session.encoder.is_active() {
            debug!("Stop requested but encoder already inactive");
            return;
        }

        info!("Stopping recording session {}", session.generation);
        self.status
            .send_modify(|status| status.state = RecorderState::Finalizing);
        session.encoder.stop();
    }

    /// Wait until the current session settles
    ///
    /// Returns the artifact handle once `Complete`, or `None` if the recorder
    /// is idle.
    pub async fn wait_complete(&self) -> Option<ArtifactHandle> {
        let mut rx = self.status.subscribe();
        let status = rx.wait_for(|s| !s.state.is_active()).await.ok()?;
        status.artifact.clone()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(session) = self.active.take() {
            session.abandon();
        }
    }
}

struct Pump {
    generation: u64,
    current: Arc<AtomicU64>,
    status: Arc<watch::Sender<RecorderStatus>>,
    store: ArtifactStore,
    artifact_mime: String,
    graph: Option<MixGraph>,
    video: crate::media::VideoTrack,
    events: mpsc::Receiver<EncoderEvent>,
}

impl Pump {
    /// Apply `update` only while this session is still the current one
    fn publish(&self, update: impl FnOnce(&mut RecorderStatus)) -> bool {
        self.status.send_if_modified(|status| {
            if self.current.load(Ordering::SeqCst) != self.generation {
                return false;
            }
            update(status);
            true
        })
    }
}

async fn pump_events(mut pump: Pump) {
    let mut chunks: Vec<Vec<u8>> = Vec::new();

    while let Some(event) = pump.events.recv().await {
        match event {
            EncoderEvent::Data(chunk) => {
                if chunk.is_empty() {
                    continue;
                }
                let len = chunk.len();
                chunks.push(chunk);
                pump.publish(|status| {
                    status.chunk_count += 1;
                    status.bytes_buffered += len;
                });
                debug!("Chunk {} received ({} bytes)", chunks.len(), len);
            }
            EncoderEvent::Stopped => break,
        }
    }

    pump.video.end();
    if let Some(mut graph) = pump.graph.take() {
        graph.close();
    }

    let artifact = Artifact::from_chunks(chunks, pump.artifact_mime.clone());
    let store = pump.store.clone();
    let mut created = None;
    let published = pump.publish(|status| {
        let handle = store.create(artifact);
        status.artifact = Some(handle.clone());
        status.state = RecorderState::Complete;
        created = Some(handle);
    });

    match created {
        Some(handle) if published => info!("Recording complete: {}", handle),
        _ => debug!("Session {} superseded before finalizing", pump.generation),
    }
}
