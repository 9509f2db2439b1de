use super::stats::SessionStats;
use crate::audio::{AudioMixer, MixerConfig};
use crate::capture::{on_terminated, CaptureBackend, CaptureConstraints, CaptureSource, SourceKind};
use crate::compositor::{Compositor, SoftwareCanvas, SurfaceFeed};
use crate::config::Config;
use crate::error::{CaptureError, RecorderError};
use crate::recorder::{
    Artifact, ArtifactHandle, ArtifactStore, AudioFormat, EncoderFactory, Recorder,
    RecorderStatus, WebmEncoderFactory,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Wires capture, compositing and recording into one session
pub struct SessionController {
    backend: Arc<dyn CaptureBackend>,
    compositor: Compositor,
    feed: SurfaceFeed,
    recorder: Recorder,
    camera: Option<CaptureSource>,
    screen: Option<CaptureSource>,
    watchers: Vec<JoinHandle<()>>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

impl SessionController {
    /// Create a controller recording with the built-in WebM encoder
    pub fn new(config: &Config, backend: Arc<dyn CaptureBackend>) -> Result<Self> {
        let factory = Arc::new(WebmEncoderFactory::new(AudioFormat {
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels,
        }));
        Self::with_encoder_factory(config, backend, factory)
    }

    pub fn with_encoder_factory(
        config: &Config,
        backend: Arc<dyn CaptureBackend>,
        factory: Arc<dyn EncoderFactory>,
    ) -> Result<Self> {
        let compositor = Compositor::new(&config.compositor)?;
        let canvas = SoftwareCanvas::new(config.compositor.width, config.compositor.height);
        let feed = canvas.feed();
        compositor.attach_context(Box::new(canvas));

        let mixer = AudioMixer::new(MixerConfig::from(&config.audio));
        let recorder = Recorder::new(
            config.recorder.clone(),
            factory,
            mixer,
            ArtifactStore::new(),
        );

        info!(
            "Session controller ready: {}x{} output, capture backend '{}'",
            config.compositor.width,
            config.compositor.height,
            backend.name()
        );

        Ok(Self {
            backend,
            compositor,
            feed,
            recorder,
            camera: None,
            screen: None,
            watchers: Vec::new(),
            error: None,
            started_at: None,
        })
    }

    /// Acquire the camera (with microphone) and show it in the bubble
    pub async fn start_camera(&mut self) -> Result<(), CaptureError> {
        let source = self.acquire(SourceKind::Camera).await?;
        if let Some(previous) = self.camera.replace(source.clone()) {
            self.backend.stop(&previous).await;
        }
        self.compositor.set_overlay(Some(source.video().clone()));
        Ok(())
    }

    /// Acquire a display (with system audio when offered) as the background
    ///
    /// A dismissed picker returns `Err(Cancelled)` without setting an error
    /// message.
    pub async fn start_screen(&mut self) -> Result<(), CaptureError> {
        let source = self.acquire(SourceKind::Display).await?;
        if let Some(previous) = self.screen.replace(source.clone()) {
            self.backend.stop(&previous).await;
        }
        self.compositor.set_background(Some(source.video().clone()));
        self.compositor.start();
        Ok(())
    }

    async fn acquire(&mut self, kind: SourceKind) -> Result<CaptureSource, CaptureError> {
        let constraints = CaptureConstraints::for_kind(kind);
        match self.backend.request_source(kind, &constraints).await {
            Ok(source) => {
                info!(
                    "Acquired {} source {} ({} audio tracks)",
                    kind,
                    source.id(),
                    source.audio_tracks().len()
                );
                let id = source.id();
                self.watchers.push(on_terminated(&source, move || {
                    // The compositor reads readiness every tick; nothing to rewire.
                    warn!("{} source {} terminated", kind, id);
                }));
                Ok(source)
            }
            Err(e) if e.is_user_cancellation() => {
                info!("{} selection cancelled by user", kind);
                Err(e)
            }
            Err(e) => {
                error!("Error accessing {}: {}", kind, e);
                self.error = e.user_message();
                Err(e)
            }
        }
    }

    /// Both feeds are present and nothing is recording
    pub fn can_record(&self) -> bool {
        self.camera.is_some() && self.screen.is_some() && !self.recorder.state().is_active()
    }

    /// Start recording the composited output plus the mixed audio
    pub fn start_recording(&mut self) -> Result<(), RecorderError> {
        let sources: Vec<CaptureSource> = self
            .screen
            .iter()
            .chain(self.camera.iter())
            .filter(|s| s.is_live())
            .cloned()
            .collect();

        match self.recorder.start(Some(&self.feed), &sources) {
            Ok(()) => {
                self.started_at = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                error!("Failed to start recording: {}", e);
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop recording and release every capture source
    pub async fn stop_recording(&mut self) {
        self.recorder.stop();
        self.stop_all().await;
    }

    /// Release both sources and halt the compositor
    pub async fn stop_all(&mut self) {
        for source in self.camera.take().into_iter().chain(self.screen.take()) {
            self.backend.stop(&source).await;
        }
        self.compositor.clear_overlay();
        self.compositor.clear_background();
        self.compositor.stop();
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
    }

    /// Wait for the recorder to finish finalizing
    pub async fn wait_complete(&self) -> Option<ArtifactHandle> {
        self.recorder.wait_complete().await
    }

    /// Handle of the last completed recording, while it is still live
    pub fn recorded_artifact(&self) -> Option<ArtifactHandle> {
        self.recorder.status().artifact
    }

    pub fn artifact(&self, handle: &ArtifactHandle) -> Option<Artifact> {
        self.recorder.store().resolve(handle)
    }

    pub fn artifact_store(&self) -> &ArtifactStore {
        self.recorder.store()
    }

    /// Last user-visible error, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    pub fn has_screen(&self) -> bool {
        self.screen.is_some()
    }

    pub fn camera(&self) -> Option<&CaptureSource> {
        self.camera.as_ref()
    }

    pub fn screen(&self) -> Option<&CaptureSource> {
        self.screen.as_ref()
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn surface_feed(&self) -> &SurfaceFeed {
        &self.feed
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RecorderStatus> {
        self.recorder.subscribe()
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        let status = self.recorder.status();
        let duration_secs = self
            .started_at
            .map(|started| {
                Utc::now().signed_duration_since(started).num_milliseconds() as f64 / 1000.0
            })
            .unwrap_or(0.0);

        SessionStats {
            is_recording: status.state.is_active(),
            state: status.state,
            started_at: self.started_at,
            duration_secs,
            chunks_count: status.chunk_count,
            bytes_recorded: status.bytes_buffered,
            has_camera: self.has_camera(),
            has_screen: self.has_screen(),
            frames_composited: self.compositor.frames_drawn(),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
    }
}
