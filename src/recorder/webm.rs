//! Streaming WebM muxer
//!
//! Writes an EBML stream with DocType `webm`: a header (EBML + unknown-size
//! Segment + Info + Tracks) followed by unknown-size Clusters of
//! SimpleBlocks. Each delivered chunk starts a new cluster, so the
//! concatenation of all chunks is a playable live-style stream.
//!
//! Payloads are not compressed: video is raw RGBA (`V_UNCOMPRESSED`) and
//! audio is little-endian 16-bit PCM (`A_PCM/INT/LIT`).

use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::encoder::{Encoder, EncoderEvent, EncoderFactory, MimeType};
use crate::error::RecorderError;
use crate::media::{AudioFrame, MediaStream, VideoFrame};

const EBML: u32 = 0x1A45_DFA3;
const EBML_VERSION: u32 = 0x4286;
const EBML_READ_VERSION: u32 = 0x42F7;
const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
const DOC_TYPE: u32 = 0x4282;
const DOC_TYPE_VERSION: u32 = 0x4287;
const DOC_TYPE_READ_VERSION: u32 = 0x4285;

const SEGMENT: u32 = 0x1853_8067;
const INFO: u32 = 0x1549_A966;
const TIMESTAMP_SCALE: u32 = 0x2A_D7B1;
const MUXING_APP: u32 = 0x4D80;
const WRITING_APP: u32 = 0x5741;

const TRACKS: u32 = 0x1654_AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const TRACK_NUMBER: u32 = 0xD7;
const TRACK_UID: u32 = 0x73C5;
const TRACK_TYPE: u32 = 0x83;
const FLAG_LACING: u32 = 0x9C;
const CODEC_ID: u32 = 0x86;
const VIDEO: u32 = 0xE0;
const PIXEL_WIDTH: u32 = 0xB0;
const PIXEL_HEIGHT: u32 = 0xBA;
const COLOUR_SPACE: u32 = 0x2E_B524;
const AUDIO: u32 = 0xE1;
const SAMPLING_FREQUENCY: u32 = 0xB5;
const CHANNELS: u32 = 0x9F;
const BIT_DEPTH: u32 = 0x6264;

const CLUSTER: u32 = 0x1F43_B675;
const CLUSTER_TIMESTAMP: u32 = 0xE7;
const SIMPLE_BLOCK: u32 = 0xA3;

/// Size marker for elements whose length is not known up front
const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

const VIDEO_TRACK: u64 = 1;
const AUDIO_TRACK: u64 = 2;

/// Write an element id (ids carry their own length marker)
fn write_id(out: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(3);
    out.extend_from_slice(&bytes[skip..]);
}

/// Write a data size as the shortest EBML variable-length integer
pub(crate) fn write_size(out: &mut Vec<u8>, size: u64) {
    // All-ones values are reserved for "unknown"
    let len = (1..=8u32)
        .find(|&len| size < (1u64 << (7 * len)) - 1)
        .unwrap_or(8);
    let marked = size | (1u64 << (7 * len));
    out.extend_from_slice(&marked.to_be_bytes()[(8 - len as usize)..]);
}

fn element(out: &mut Vec<u8>, id: u32, payload: &[u8]) {
    write_id(out, id);
    write_size(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

fn uint_element(out: &mut Vec<u8>, id: u32, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    element(out, id, &bytes[skip..]);
}

fn float_element(out: &mut Vec<u8>, id: u32, value: f64) {
    element(out, id, &value.to_be_bytes());
}

fn string_element(out: &mut Vec<u8>, id: u32, value: &str) {
    element(out, id, value.as_bytes());
}

fn nested(out: &mut Vec<u8>, id: u32, build: impl FnOnce(&mut Vec<u8>)) {
    let mut body = Vec::new();
    build(&mut body);
    element(out, id, &body);
}

/// Audio layout of the PCM track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// EBML block writer for one stream
pub(crate) struct WebmMuxer {
    width: u32,
    height: u32,
    audio: Option<AudioFormat>,
    cluster_start_ms: Option<u64>,
}

impl WebmMuxer {
    pub(crate) fn new(width: u32, height: u32, audio: Option<AudioFormat>) -> Self {
        Self {
            width,
            height,
            audio,
            cluster_start_ms: None,
        }
    }

    /// EBML header, Segment start, Info and Tracks
    pub(crate) fn header(&self) -> Vec<u8> {
        let mut out = Vec::new();
        nested(&mut out, EBML, |b| {
            uint_element(b, EBML_VERSION, 1);
            uint_element(b, EBML_READ_VERSION, 1);
            uint_element(b, EBML_MAX_ID_LENGTH, 4);
            uint_element(b, EBML_MAX_SIZE_LENGTH, 8);
            string_element(b, DOC_TYPE, "webm");
            uint_element(b, DOC_TYPE_VERSION, 4);
            uint_element(b, DOC_TYPE_READ_VERSION, 2);
        });

        write_id(&mut out, SEGMENT);
        out.extend_from_slice(&UNKNOWN_SIZE);

        nested(&mut out, INFO, |b| {
            uint_element(b, TIMESTAMP_SCALE, 1_000_000);
            string_element(b, MUXING_APP, "screencam");
            string_element(b, WRITING_APP, "screencam");
        });

        nested(&mut out, TRACKS, |b| {
            nested(b, TRACK_ENTRY, |t| {
                uint_element(t, TRACK_NUMBER, VIDEO_TRACK);
                uint_element(t, TRACK_UID, VIDEO_TRACK);
                uint_element(t, TRACK_TYPE, 1);
                uint_element(t, FLAG_LACING, 0);
                string_element(t, CODEC_ID, "V_UNCOMPRESSED");
                nested(t, VIDEO, |v| {
                    uint_element(v, PIXEL_WIDTH, self.width as u64);
                    uint_element(v, PIXEL_HEIGHT, self.height as u64);
                    element(v, COLOUR_SPACE, b"RGBA");
                });
            });
            if let Some(audio) = self.audio {
                nested(b, TRACK_ENTRY, |t| {
                    uint_element(t, TRACK_NUMBER, AUDIO_TRACK);
                    uint_element(t, TRACK_UID, AUDIO_TRACK);
                    uint_element(t, TRACK_TYPE, 2);
                    uint_element(t, FLAG_LACING, 0);
                    string_element(t, CODEC_ID, "A_PCM/INT/LIT");
                    nested(t, AUDIO, |a| {
                        float_element(a, SAMPLING_FREQUENCY, audio.sample_rate as f64);
                        uint_element(a, CHANNELS, audio.channels as u64);
                        uint_element(a, BIT_DEPTH, 16);
                    });
                });
            }
        });

        out
    }

    /// Next block starts a fresh cluster
    pub(crate) fn close_cluster(&mut self) {
        self.cluster_start_ms = None;
    }

    fn write_block(&mut self, out: &mut Vec<u8>, track: u64, timestamp_ms: u64, data: &[u8]) {
        let start = match self.cluster_start_ms {
            Some(start) if timestamp_ms >= start && timestamp_ms - start <= i16::MAX as u64 => start,
            _ => {
                write_id(out, CLUSTER);
                out.extend_from_slice(&UNKNOWN_SIZE);
                uint_element(out, CLUSTER_TIMESTAMP, timestamp_ms);
                self.cluster_start_ms = Some(timestamp_ms);
                timestamp_ms
            }
        };

        let relative = (timestamp_ms - start) as i16;
        let mut header = Vec::with_capacity(4);
        write_size(&mut header, track);
        header.extend_from_slice(&relative.to_be_bytes());
        header.push(0x80); // keyframe

        write_id(out, SIMPLE_BLOCK);
        write_size(out, (header.len() + data.len()) as u64);
        out.extend_from_slice(&header);
        out.extend_from_slice(data);
    }

    pub(crate) fn write_video(&mut self, out: &mut Vec<u8>, timestamp_ms: u64, frame: &VideoFrame) {
        if frame.is_degenerate() || frame.width != self.width || frame.height != self.height {
            warn!(
                "Dropping {}x{} frame on {}x{} video track",
                frame.width, frame.height, self.width, self.height
            );
            return;
        }
        self.write_block(out, VIDEO_TRACK, timestamp_ms, &frame.to_rgba_bytes());
    }

    pub(crate) fn write_audio(&mut self, out: &mut Vec<u8>, timestamp_ms: u64, frame: &AudioFrame) {
        let Some(format) = self.audio else {
            return;
        };
        if frame.sample_rate != format.sample_rate || frame.channels != format.channels {
            debug!(
                "Dropping {}Hz/{}ch audio on {}Hz/{}ch track",
                frame.sample_rate, frame.channels, format.sample_rate, format.channels
            );
            return;
        }
        let pcm: Vec<u8> = frame.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.write_block(out, AUDIO_TRACK, timestamp_ms, &pcm);
    }
}

/// Encoder producing the WebM stream above
pub struct WebmEncoder {
    mime_type: String,
    audio_format: AudioFormat,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WebmEncoder {
    pub fn new(mime_type: impl Into<String>, audio_format: AudioFormat) -> Self {
        Self {
            mime_type: mime_type.into(),
            audio_format,
            stop_tx: None,
            task: None,
        }
    }
}

impl Encoder for WebmEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn start(
        &mut self,
        stream: MediaStream,
        timeslice: Duration,
    ) -> Result<mpsc::Receiver<EncoderEvent>, RecorderError> {
        if self.task.is_some() {
            return Err(RecorderError::EncoderStart("encoder already started".into()));
        }
        let video = stream
            .video_track()
            .cloned()
            .ok_or_else(|| RecorderError::EncoderStart("stream has no video track".into()))?;
        let (width, height) = video
            .dimensions()
            .ok_or_else(|| RecorderError::EncoderStart("video track has no frames".into()))?;

        let audio = stream.audio_tracks().first().cloned();
        let muxer = WebmMuxer::new(width, height, audio.as_ref().map(|_| self.audio_format));

        let (events_tx, events_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = oneshot::channel();

        info!(
            "WebM encoder started: {}x{}, audio: {}, timeslice {:?}",
            width,
            height,
            audio.is_some(),
            timeslice
        );

        let video_rx = video.subscribe();
        let audio_rx = audio.map(|track| track.subscribe());
        self.task = Some(tokio::spawn(run_encoder(
            muxer, video_rx, audio_rx, timeslice, stop_rx, events_tx,
        )));
        self.stop_tx = Some(stop_tx);

        Ok(events_rx)
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            debug!("WebM encoder stop requested");
            let _ = stop_tx.send(());
        }
    }

    fn is_active(&self) -> bool {
        self.stop_tx.is_some()
    }
}

impl Drop for WebmEncoder {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn recv_audio(rx: &mut Option<broadcast::Receiver<AudioFrame>>) -> Option<AudioFrame> {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match receiver.recv().await {
            Ok(frame) => return Some(frame),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Encoder audio input lagged, {} frames skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn run_encoder(
    mut muxer: WebmMuxer,
    mut video_rx: tokio::sync::watch::Receiver<crate::media::VideoTrackState>,
    mut audio_rx: Option<broadcast::Receiver<AudioFrame>>,
    timeslice: Duration,
    mut stop_rx: oneshot::Receiver<()>,
    events: mpsc::Sender<EncoderEvent>,
) {
    let started = Instant::now();
    let mut flush = interval_at(started + timeslice, timeslice);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending = muxer.header();
    let mut video_open = true;
    let mut chunks = 0usize;

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            changed = video_rx.changed(), if video_open => {
                if changed.is_err() {
                    video_open = false;
                    continue;
                }
                let frame = video_rx.borrow_and_update().frame.clone();
                if let Some(frame) = frame {
                    let ts = started.elapsed().as_millis() as u64;
                    muxer.write_video(&mut pending, ts, &frame);
                }
            }
            frame = recv_audio(&mut audio_rx) => match frame {
                Some(frame) => {
                    let ts = started.elapsed().as_millis() as u64;
                    muxer.write_audio(&mut pending, ts, &frame);
                }
                None => audio_rx = None,
            },
            _ = flush.tick() => {
                chunks += 1;
                muxer.close_cluster();
                if events.send(EncoderEvent::Data(std::mem::take(&mut pending))).await.is_err() {
                    debug!("Encoder event receiver dropped");
                    return;
                }
            }
        }
    }

    // Final chunk carries whatever accumulated since the last timeslice
    if !pending.is_empty() {
        chunks += 1;
        let _ = events.send(EncoderEvent::Data(pending)).await;
    }
    let _ = events.send(EncoderEvent::Stopped).await;
    info!("WebM encoder stopped after {} chunks", chunks);
}

/// Factory for `WebmEncoder`
///
/// Accepts `video/webm` with no codec list or `codecs=raw`. Anything else is
/// reported as unavailable.
#[derive(Debug, Clone)]
pub struct WebmEncoderFactory {
    audio_format: AudioFormat,
}

impl WebmEncoderFactory {
    pub fn new(audio_format: AudioFormat) -> Self {
        Self { audio_format }
    }
}

impl EncoderFactory for WebmEncoderFactory {
    fn create(&self, mime_type: &str) -> Result<Box<dyn Encoder>, RecorderError> {
        let unavailable = |reason: &str| RecorderError::EncoderUnavailable {
            mime_type: mime_type.to_string(),
            reason: reason.to_string(),
        };

        let mime = MimeType::parse(mime_type).ok_or_else(|| unavailable("malformed MIME type"))?;
        if mime.essence != "video/webm" {
            return Err(unavailable("only video/webm is supported"));
        }
        if let Some(codec) = mime.codecs.iter().find(|c| c.as_str() != "raw") {
            return Err(unavailable(&format!("codec '{}' is not supported", codec)));
        }

        Ok(Box::new(WebmEncoder::new(mime.essence, self.audio_format)))
    }
}
