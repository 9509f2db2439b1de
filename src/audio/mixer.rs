// Audio mixer for combining display audio and microphone streams
//
// Each recording session builds a fresh mix graph: every live audio track of
// every contributing source is connected to a single destination track. The
// graph buffers frames per input and, whenever every contributing input has a
// frame queued, sums one frame from each with clipping. An input whose format
// cannot be mapped onto the destination stops contributing on its first
// rejected frame, and each queue is capped at `max_buffer_delay_ms` of audio.
//
// Known limitation: inputs are summed as-is. There is no gain control or
// ducking, and no drift correction between the display and microphone
// clocks; frames are paired by arrival order, not by timestamp.

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::CaptureSource;
use crate::config::AudioConfig;
use crate::media::{AudioFrame, AudioTrack};

/// Configuration for the mix destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixerConfig {
    /// Sample rate of the destination track (inputs are never resampled)
    pub sample_rate: u32,
    /// Channel count of the destination track
    pub channels: u16,
    /// Maximum audio queued per input (default: 200ms)
    /// Older frames are dropped so a faster input cannot buffer without bound
    pub max_buffer_delay_ms: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            max_buffer_delay_ms: 200,
        }
    }
}

impl From<&AudioConfig> for MixerConfig {
    fn from(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            max_buffer_delay_ms: config.max_buffer_delay_ms,
        }
    }
}

/// Builds per-session mix graphs
#[derive(Debug, Clone, Default)]
pub struct AudioMixer {
    config: MixerConfig,
}

impl AudioMixer {
    pub fn new(config: MixerConfig) -> Self {
        info!(
            "Audio mixer initialized: {}Hz, {} channels, {}ms max buffer",
            config.sample_rate, config.channels, config.max_buffer_delay_ms
        );
        Self { config }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Connect every live audio track of `sources` into a new graph
    ///
    /// Returns `None` when no source contributed audio.
    pub fn build_mix<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a CaptureSource>,
    ) -> Option<MixGraph> {
        let inputs: Vec<AudioTrack> = sources
            .into_iter()
            .flat_map(|source| source.audio_tracks().iter())
            .filter(|track| track.is_live())
            .cloned()
            .collect();

        self.build_from_tracks(inputs)
    }

    /// Same as `build_mix`, from bare tracks
    pub fn build_from_tracks(&self, inputs: Vec<AudioTrack>) -> Option<MixGraph> {
        if inputs.is_empty() {
            debug!("No audio inputs; skipping mix graph");
            return None;
        }
        Some(MixGraph::spawn(self.config.clone(), inputs))
    }
}

/// Event from one connected input
#[derive(Debug)]
enum MixInput {
    Frame(usize, AudioFrame),
    Ended(usize),
}

/// A session-scoped routing graph with a single output track
///
/// Closing the graph (explicitly or on drop) stops the mixing task and ends
/// the output track. A closed graph is never reused.
pub struct MixGraph {
    id: Uuid,
    output: AudioTrack,
    input_count: usize,
    task: Option<JoinHandle<()>>,
}

impl MixGraph {
    fn spawn(config: MixerConfig, inputs: Vec<AudioTrack>) -> Self {
        let id = Uuid::new_v4();
        let output = AudioTrack::new(format!("mix:{}", id));
        let input_count = inputs.len();

        info!(
            "Mix graph {} built with {} input(s): {}",
            id,
            input_count,
            inputs
                .iter()
                .map(|t| t.label().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let streams: Vec<BoxStream<'static, MixInput>> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, track)| input_stream(index, track))
            .collect();

        let task = tokio::spawn(run_mix(config, streams, input_count, output.clone()));

        Self {
            id,
            output,
            input_count,
            task: Some(task),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The destination's single mixed track
    pub fn output(&self) -> &AudioTrack {
        &self.output
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Release the graph. Idempotent.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.output.end();
            info!("Mix graph {} closed", self.id);
        }
    }
}

impl Drop for MixGraph {
    fn drop(&mut self) {
        self.close();
    }
}

fn input_stream(index: usize, track: AudioTrack) -> BoxStream<'static, MixInput> {
    let rx = track.subscribe();
    stream::unfold(Some((rx, track)), move |state| async move {
        let (mut rx, track) = state?;
        loop {
            tokio::select! {
                // Drain queued frames before honouring the end of the track
                biased;
                result = rx.recv() => match result {
                    Ok(frame) => return Some((MixInput::Frame(index, frame), Some((rx, track)))),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Mix input {} lagged, {} frames skipped", track.label(), skipped);
                    }
                    Err(RecvError::Closed) => return Some((MixInput::Ended(index), None)),
                },
                _ = track.ended() => return Some((MixInput::Ended(index), None)),
            }
        }
    })
    .boxed()
}

async fn run_mix(
    config: MixerConfig,
    streams: Vec<BoxStream<'static, MixInput>>,
    input_count: usize,
    output: AudioTrack,
) {
    let mut merged = stream::select_all(streams);
    let mut buffers: Vec<VecDeque<AudioFrame>> = vec![VecDeque::new(); input_count];
    // Inputs still feeding the mix: cleared on end or on an unusable format
    let mut live = vec![true; input_count];
    let mut trimmed = vec![0u64; input_count];
    let mut mixed_count: u64 = 0;

    while let Some(input) = merged.next().await {
        match input {
            MixInput::Frame(index, _) if !live[index] => {}
            MixInput::Frame(index, frame) => match conform(frame, &config) {
                Ok(frame) => {
                    buffers[index].push_back(frame);
                    let dropped = trim_backlog(&mut buffers[index], config.max_buffer_delay_ms);
                    if dropped > 0 && trimmed[index] == 0 {
                        warn!(
                            "Mix input {} is {}ms+ ahead of the others; dropping oldest frames",
                            index, config.max_buffer_delay_ms
                        );
                    }
                    trimmed[index] += dropped as u64;
                }
                Err(reason) => {
                    warn!("Removing input {} from the mix: {}", index, reason);
                    live[index] = false;
                    buffers[index].clear();
                }
            },
            MixInput::Ended(index) => {
                debug!("Mix input {} ended", index);
                live[index] = false;
            }
        }

        while let Some(mixed) = next_mix(&mut buffers, &live) {
            mixed_count += 1;
            output.push(mixed);
        }
    }

    info!(
        "All mix inputs ended after {} mixed frames ({} stale frames dropped)",
        mixed_count,
        trimmed.iter().sum::<u64>()
    );
    output.end();
}

/// Pop and mix one frame per input once every live input has one queued
fn next_mix(buffers: &mut [VecDeque<AudioFrame>], live: &[bool]) -> Option<AudioFrame> {
    let all_live_ready = buffers
        .iter()
        .zip(live)
        .all(|(buffer, &live)| !live || !buffer.is_empty());
    if !all_live_ready {
        return None;
    }

    let frames: Vec<AudioFrame> = buffers.iter_mut().filter_map(|b| b.pop_front()).collect();
    match frames.len() {
        0 => None,
        1 => frames.into_iter().next(),
        _ => Some(mix_frames(&frames)),
    }
}

/// Drop frames from the front until at most `max_delay_ms` of audio is queued
///
/// The newest frame is always kept. Returns how many frames were dropped.
fn trim_backlog(buffer: &mut VecDeque<AudioFrame>, max_delay_ms: u64) -> usize {
    let mut queued_ms: u64 = buffer.iter().map(frame_duration_ms).sum();
    let mut dropped = 0;
    while queued_ms > max_delay_ms && buffer.len() > 1 {
        let Some(frame) = buffer.pop_front() else {
            break;
        };
        queued_ms -= frame_duration_ms(&frame);
        dropped += 1;
    }
    dropped
}

fn frame_duration_ms(frame: &AudioFrame) -> u64 {
    if frame.sample_rate == 0 {
        return 0;
    }
    frame.frame_count() as u64 * 1000 / frame.sample_rate as u64
}

/// Sum frames sample-by-sample with clipping
///
/// The output is as long as the longest input; shorter inputs contribute
/// silence past their end. Frames must already share rate and channel count.
pub(crate) fn mix_frames(frames: &[AudioFrame]) -> AudioFrame {
    let timestamp_ms = frames.iter().map(|f| f.timestamp_ms).min().unwrap_or(0);
    let max_len = frames.iter().map(|f| f.samples.len()).max().unwrap_or(0);
    let mut samples = Vec::with_capacity(max_len);

    for i in 0..max_len {
        let sum: i32 = frames
            .iter()
            .map(|f| f.samples.get(i).copied().unwrap_or(0) as i32)
            .sum();
        samples.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }

    AudioFrame {
        samples,
        sample_rate: frames.first().map(|f| f.sample_rate).unwrap_or(0),
        channels: frames.first().map(|f| f.channels).unwrap_or(0),
        timestamp_ms,
    }
}

/// Map a frame onto the destination channel layout
///
/// Only channel mapping is performed: mono is duplicated to stereo and stereo
/// is folded to mono. Sample-rate mismatches are rejected.
fn conform(frame: AudioFrame, config: &MixerConfig) -> Result<AudioFrame, String> {
    if frame.sample_rate != config.sample_rate {
        return Err(format!(
            "sample rate {}Hz does not match mix rate {}Hz",
            frame.sample_rate, config.sample_rate
        ));
    }

    match (frame.channels, config.channels) {
        (from, to) if from == to => Ok(frame),
        (1, 2) => Ok(AudioFrame {
            samples: frame.samples.iter().flat_map(|&s| [s, s]).collect(),
            channels: 2,
            ..frame
        }),
        (2, 1) => Ok(AudioFrame {
            samples: frame
                .samples
                .chunks_exact(2)
                .map(|lr| (lr[0] as i32 + lr[1] as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
                .collect(),
            channels: 1,
            ..frame
        }),
        (from, to) => Err(format!("cannot map {} channels onto {}", from, to)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, channels: u16) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 48000,
            channels,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_mix_frames_equal_length() {
        let mixed = mix_frames(&[frame(vec![100, 200, 300], 1), frame(vec![50, 100, 150], 1)]);
        assert_eq!(mixed.samples, vec![150, 300, 450]);
    }

    #[test]
    fn test_mix_frames_with_clipping() {
        let mixed = mix_frames(&[frame(vec![i16::MAX - 100, i16::MIN + 10], 1), frame(vec![200, -200], 1)]);
        assert_eq!(mixed.samples, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_mix_frames_different_lengths() {
        let mixed = mix_frames(&[frame(vec![100, 200], 1), frame(vec![50, 100, 150, 200], 1)]);
        assert_eq!(mixed.samples, vec![150, 300, 150, 200]);
    }

    #[test]
    fn test_mix_frames_uses_earliest_timestamp() {
        let mut a = frame(vec![1], 1);
        a.timestamp_ms = 40;
        let mut b = frame(vec![1], 1);
        b.timestamp_ms = 20;
        assert_eq!(mix_frames(&[a, b]).timestamp_ms, 20);
    }

    #[test]
    fn test_conform_mono_to_stereo() {
        let config = MixerConfig::default();
        let out = conform(frame(vec![1, 2, 3], 1), &config).unwrap();
        assert_eq!(out.channels, 2);
        assert_eq!(out.samples, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_conform_stereo_to_mono() {
        let config = MixerConfig {
            channels: 1,
            ..MixerConfig::default()
        };
        let out = conform(frame(vec![100, 50, i16::MAX, 10], 2), &config).unwrap();
        assert_eq!(out.samples, vec![150, i16::MAX]);
    }

    #[test]
    fn test_conform_rejects_rate_mismatch() {
        let mut f = frame(vec![0; 4], 2);
        f.sample_rate = 44100;
        assert!(conform(f, &MixerConfig::default()).is_err());
    }

    #[test]
    fn test_next_mix_waits_for_every_live_input() {
        let mut buffers = vec![VecDeque::new(), VecDeque::new()];
        buffers[0].push_back(frame(vec![1, 1], 2));
        assert!(next_mix(&mut buffers, &[true, true]).is_none());

        // Once the second input ends, the first is emitted alone
        let mixed = next_mix(&mut buffers, &[true, false]).unwrap();
        assert_eq!(mixed.samples, vec![1, 1]);
        assert!(next_mix(&mut buffers, &[true, false]).is_none());
    }

    #[test]
    fn test_trim_backlog_keeps_newest_frames() {
        // 20ms stereo frames at 48kHz
        let mut buffer: VecDeque<AudioFrame> = (0..15)
            .map(|i| AudioFrame {
                timestamp_ms: i * 20,
                ..frame(vec![0; 1920], 2)
            })
            .collect();

        assert_eq!(trim_backlog(&mut buffer, 200), 5);
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.front().map(|f| f.timestamp_ms), Some(100));
        assert_eq!(trim_backlog(&mut buffer, 200), 0);

        // A single oversized frame is never dropped
        let mut long = VecDeque::from(vec![frame(vec![0; 48000], 2)]);
        assert_eq!(trim_backlog(&mut long, 200), 0);
    }

    #[test]
    fn test_build_mix_without_audio_returns_none() {
        let mixer = AudioMixer::default();
        assert!(mixer.build_from_tracks(Vec::new()).is_none());
    }
}
