use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::media::{AudioFrame, AudioTrack};

/// A 16-bit PCM WAV file loaded into memory
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Arc<Vec<i16>>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples: Arc::new(samples),
        })
    }

    /// Split the file into frames of `frame_ms` milliseconds
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let channels = self.channels.max(1) as usize;
        let per_frame = ((self.sample_rate as u64 * frame_ms.max(1) / 1000) as usize).max(1);

        self.samples
            .chunks(per_frame * channels)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }

    /// Stream the file into `track` in real time, ending the track at EOF
    pub fn play_into(&self, track: AudioTrack, frame_ms: u64) -> JoinHandle<()> {
        let frames = self.frames(frame_ms);
        let path = self.path.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(frame_ms.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let total = frames.len();

            for frame in frames {
                ticker.tick().await;
                if !track.push(frame) {
                    info!("Playback of {} stopped: track ended", path);
                    return;
                }
            }

            info!("Playback of {} finished ({} frames)", path, total);
            track.end();
        })
    }
}
