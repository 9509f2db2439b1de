use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub compositor: CompositorConfig,
    pub recorder: RecorderConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Output surface width, fixed for the lifetime of a session
    pub width: u32,
    pub height: u32,
    /// Draw ticks per second (display refresh)
    pub tick_hz: u32,
    pub bubble_diameter: f32,
    pub bubble_padding: f32,
    pub border_width: f32,
    pub border_color: String,
    pub placeholder_color: String,
    pub placeholder_label: String,
    pub label_color: String,
    pub label_size: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            tick_hz: 60,
            bubble_diameter: 300.0,
            bubble_padding: 50.0,
            border_width: 5.0,
            border_color: "#ffffff".to_string(),
            placeholder_color: "#333333".to_string(),
            placeholder_label: "Waiting for screen share...".to_string(),
            label_color: "#ffffff".to_string(),
            label_size: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Rate at which the output surface is sampled into the recorded stream
    pub capture_fps: u32,
    /// Interval between encoder chunk deliveries
    pub timeslice_ms: u64,
    /// Encoder container/codec request
    pub mime_type: String,
    /// Type tag of the assembled artifact
    pub artifact_mime: String,
    /// Suggested download name
    pub filename: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capture_fps: 30,
            timeslice_ms: 1000,
            mime_type: "video/webm".to_string(),
            artifact_mime: "video/webm".to_string(),
            filename: "recording.webm".to_string(),
        }
    }
}

impl RecorderConfig {
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Mix destination sample rate
    pub sample_rate: u32,
    /// Mix destination channel count
    pub channels: u16,
    /// Audio queued per mix input beyond this is dropped, oldest first
    pub max_buffer_delay_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            max_buffer_delay_ms: 200,
        }
    }
}

/// Highest tick or capture rate accepted
pub const MAX_RATE_HZ: u32 = 1000;

/// Period of a rate in Hz, clamped to `1..=MAX_RATE_HZ`
pub fn rate_period(hz: u32) -> Duration {
    Duration::from_micros(1_000_000 / hz.clamp(1, MAX_RATE_HZ) as u64)
}

impl Config {
    /// Load from an optional file (any format `config` understands) with
    /// `SCREENCAM__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SCREENCAM").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let rates = [
            ("compositor.tick_hz", self.compositor.tick_hz),
            ("recorder.capture_fps", self.recorder.capture_fps),
        ];
        for (key, hz) in rates {
            if !(1..=MAX_RATE_HZ).contains(&hz) {
                bail!("{} must be between 1 and {}, got {}", key, MAX_RATE_HZ, hz);
            }
        }
        Ok(())
    }
}
