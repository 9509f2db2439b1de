//! Synthetic capture backend
//!
//! Produces a moving test pattern and a sine tone for each requested source.
//! Failures and OS-level revocation can be scripted, which makes the backend
//! usable both for the demo binary and for exercising error paths in tests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::backend::{CaptureBackend, CaptureConstraints, CaptureSource, SourceKind};
use crate::audio::AudioFile;
use crate::error::CaptureError;
use crate::media::{AudioFrame, AudioTrack, Color, VideoFrame, VideoTrack};

/// Tunables for generated media
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub display_size: (u32, u32),
    pub camera_size: (u32, u32),
    pub frame_rate: u32,
    pub sample_rate: u32,
    /// Audio frame duration in milliseconds
    pub audio_frame_ms: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            display_size: (1280, 720),
            camera_size: (640, 480),
            frame_rate: 30,
            sample_rate: 48000,
            audio_frame_ms: 20,
        }
    }
}

/// Capture backend generating test media on tokio tasks
pub struct SyntheticCapture {
    config: SyntheticConfig,
    scripted_failures: Mutex<HashMap<SourceKind, CaptureError>>,
    live: Mutex<Vec<CaptureSource>>,
    display_audio: Mutex<Option<Arc<AudioFile>>>,
}

impl SyntheticCapture {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            scripted_failures: Mutex::new(HashMap::new()),
            live: Mutex::new(Vec::new()),
            display_audio: Mutex::new(None),
        }
    }

    /// Play `file` as the system audio of display sources instead of a tone
    pub fn set_display_audio(&self, file: AudioFile) {
        info!("Display audio will play from {}", file.path);
        *self.display_audio.lock() = Some(Arc::new(file));
    }

    /// Make the next request for `kind` fail with `error`
    pub fn fail_next(&self, kind: SourceKind, error: CaptureError) {
        self.scripted_failures.lock().insert(kind, error);
    }

    /// Simulate the OS revoking access (e.g. "Stop sharing")
    pub fn revoke(&self, kind: SourceKind) -> usize {
        let mut live = self.live.lock();
        let mut revoked = 0;
        live.retain(|source| {
            if source.kind() == kind {
                info!("Revoking {} source {}", kind, source.id());
                source.stop();
                revoked += 1;
                false
            } else {
                true
            }
        });
        revoked
    }

    fn spawn_producer(&self, kind: SourceKind, size: (u32, u32), audio: Option<AudioTrack>) -> VideoTrack {
        let video = VideoTrack::new(format!("{}:synthetic", kind));
        let config = self.config.clone();
        let track = video.clone();

        let (width, height) = size;
        let base = Arc::new(test_pattern(kind, width, height));
        // First frame is available before the request resolves
        track.push_frame(VideoFrame::clone(&base));

        tokio::spawn(async move {
            let frame_period = Duration::from_millis(1000 / config.frame_rate.max(1) as u64);
            let mut frame_tick = interval(frame_period);
            frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut audio_tick = interval(Duration::from_millis(config.audio_frame_ms.max(1)));
            audio_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let (tone_hz, channels) = match kind {
                SourceKind::Display => (440.0, 2),
                SourceKind::Camera => (220.0, 1),
            };
            let mut frame_index: u64 = 0;
            let mut audio_position: u64 = 0;

            let ended = track.ended();
            tokio::pin!(ended);

            loop {
                tokio::select! {
                    _ = &mut ended => break,
                    _ = frame_tick.tick() => {
                        frame_index += 1;
                        track.push_frame(moving_bar(&base, frame_index));
                    }
                    _ = audio_tick.tick(), if audio.is_some() => {
                        if let Some(audio) = &audio {
                            let frame = tone(
                                tone_hz,
                                config.sample_rate,
                                channels,
                                config.audio_frame_ms,
                                audio_position,
                            );
                            audio_position += frame.frame_count() as u64;
                            audio.push(frame);
                        }
                    }
                }
            }

            if let Some(audio) = &audio {
                audio.end();
            }
            debug!("Synthetic {} producer stopped after {} frames", kind, frame_index);
        });

        video
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

#[async_trait::async_trait]
impl CaptureBackend for SyntheticCapture {
    async fn request_source(
        &self,
        kind: SourceKind,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureSource, CaptureError> {
        if let Some(error) = self.scripted_failures.lock().remove(&kind) {
            debug!("Scripted {} failure: {}", kind, error);
            return Err(error);
        }

        let default_size = match kind {
            SourceKind::Display => self.config.display_size,
            SourceKind::Camera => self.config.camera_size,
        };
        let size = (
            constraints.width.unwrap_or(default_size.0),
            constraints.height.unwrap_or(default_size.1),
        );

        let audio = constraints
            .audio
            .then(|| AudioTrack::new(format!("{}-audio:synthetic", kind)));
        let file_audio = match kind {
            SourceKind::Display => self.display_audio.lock().clone(),
            SourceKind::Camera => None,
        };
        let tone_track = if file_audio.is_some() { None } else { audio.clone() };
        let video = self.spawn_producer(kind, size, tone_track);
        if let (Some(file), Some(track)) = (file_audio, &audio) {
            file.play_into(track.clone(), self.config.audio_frame_ms);
        }

        let source = CaptureSource::new(kind, video, audio.into_iter().collect());
        info!(
            "Acquired synthetic {} source {} ({}x{}, audio: {})",
            kind,
            source.id(),
            size.0,
            size.1,
            source.has_audio()
        );

        self.live.lock().push(source.clone());
        Ok(source)
    }

    async fn stop(&self, source: &CaptureSource) {
        source.stop();
        self.live.lock().retain(|s| s.id() != source.id());
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

fn test_pattern(kind: SourceKind, width: u32, height: u32) -> VideoFrame {
    match kind {
        // Horizontal gradient
        SourceKind::Display => VideoFrame::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let b = (y * 255 / height.max(1)) as u8;
            Color::rgb(r, 96, b)
        }),
        // Vertical colour bars
        SourceKind::Camera => {
            const BARS: [Color; 7] = [
                Color::rgb(192, 192, 192),
                Color::rgb(192, 192, 0),
                Color::rgb(0, 192, 192),
                Color::rgb(0, 192, 0),
                Color::rgb(192, 0, 192),
                Color::rgb(192, 0, 0),
                Color::rgb(0, 0, 192),
            ];
            VideoFrame::from_fn(width, height, |x, _| {
                BARS[(x as usize * BARS.len() / width.max(1) as usize).min(BARS.len() - 1)]
            })
        }
    }
}

/// Overlay a white vertical bar whose position advances every frame
fn moving_bar(base: &VideoFrame, frame_index: u64) -> VideoFrame {
    let mut frame = base.clone();
    if frame.is_degenerate() {
        return frame;
    }
    let bar_width = (frame.width / 32).max(1);
    let start = ((frame_index * 8) % frame.width as u64) as u32;
    for y in 0..frame.height {
        for x in start..(start + bar_width).min(frame.width) {
            frame.pixels[(y * frame.width + x) as usize] = Color::WHITE;
        }
    }
    frame
}

fn tone(hz: f32, sample_rate: u32, channels: u16, duration_ms: u64, position: u64) -> AudioFrame {
    let count = (sample_rate as u64 * duration_ms / 1000) as usize;
    let mut samples = Vec::with_capacity(count * channels as usize);
    for i in 0..count {
        let t = (position + i as u64) as f32 / sample_rate as f32;
        let value = ((t * hz * TAU).sin() * 3000.0) as i16;
        for _ in 0..channels {
            samples.push(value);
        }
    }
    AudioFrame {
        samples,
        sample_rate,
        channels,
        timestamp_ms: position * 1000 / sample_rate as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_camera_source() {
        let backend = SyntheticCapture::default();
        let source = backend
            .request_source(SourceKind::Camera, &CaptureConstraints::camera())
            .await
            .unwrap();

        assert_eq!(source.kind(), SourceKind::Camera);
        assert!(source.video().is_ready());
        assert_eq!(source.video().dimensions(), Some((640, 480)));
        assert_eq!(source.audio_tracks().len(), 1);

        backend.stop(&source).await;
        assert!(!source.is_live());
    }

    #[tokio::test]
    async fn test_scripted_failure_is_consumed() {
        let backend = SyntheticCapture::default();
        backend.fail_next(SourceKind::Display, CaptureError::Cancelled(SourceKind::Display));

        let err = backend
            .request_source(SourceKind::Display, &CaptureConstraints::display())
            .await
            .unwrap_err();
        assert!(err.is_user_cancellation());
        assert!(err.user_message().is_none());

        assert!(backend
            .request_source(SourceKind::Display, &CaptureConstraints::display())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_revoke_ends_source() {
        let backend = SyntheticCapture::default();
        let source = backend
            .request_source(SourceKind::Display, &CaptureConstraints::display())
            .await
            .unwrap();

        assert_eq!(backend.revoke(SourceKind::Display), 1);
        source.terminated().await;
        assert!(!source.video().is_ready());
        assert_eq!(backend.revoke(SourceKind::Display), 0);
    }

    #[test]
    fn test_tone_frame_shape() {
        let frame = tone(440.0, 48000, 2, 20, 0);
        assert_eq!(frame.frame_count(), 960);
        assert_eq!(frame.samples.len(), 1920);
        assert_eq!(frame.timestamp_ms, 0);
    }
}
