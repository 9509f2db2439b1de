// Integration tests for the recording pipeline
//
// All timing runs on tokio's paused clock, so a "three second" recording
// completes instantly and chunk boundaries land exactly on the timeslice.

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use screencam::audio::{AudioFile, AudioMixer};
use screencam::capture::{CaptureBackend, CaptureConstraints, SourceKind, SyntheticCapture, SyntheticConfig};
use screencam::compositor::{Compositor, SoftwareCanvas, SurfaceFeed};
use screencam::config::{CompositorConfig, RecorderConfig};
use screencam::error::RecorderError;
use screencam::media::{Color, VideoFrame, VideoTrack};
use screencam::recorder::{
    ArtifactStore, AudioFormat, Recorder, RecorderState, WebmEncoderFactory,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

fn recorder(mime_type: &str) -> Recorder {
    let config = RecorderConfig {
        mime_type: mime_type.to_string(),
        ..RecorderConfig::default()
    };
    let factory = Arc::new(WebmEncoderFactory::new(AudioFormat {
        sample_rate: 48000,
        channels: 2,
    }));
    Recorder::new(config, factory, AudioMixer::default(), ArtifactStore::new())
}

/// A running compositor over a small surface showing a solid display
fn surface() -> (Compositor, SurfaceFeed) {
    let mut compositor = Compositor::new(&CompositorConfig::default()).unwrap();
    let canvas = SoftwareCanvas::new(64, 36);
    let feed = canvas.feed();
    compositor.attach_context(Box::new(canvas));

    let display = VideoTrack::new("display");
    display.push_frame(VideoFrame::solid(64, 36, Color::rgb(10, 20, 30)));
    compositor.set_background(Some(display));
    compositor.start();
    (compositor, feed)
}

fn small_backend() -> SyntheticCapture {
    SyntheticCapture::new(SyntheticConfig {
        display_size: (64, 36),
        camera_size: (32, 24),
        ..SyntheticConfig::default()
    })
}

/// Read an EBML variable-length integer at `pos`, returning (value, length)
fn read_vint(data: &[u8], pos: usize, keep_marker: bool) -> Option<(u64, usize)> {
    let first = *data.get(pos)?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 {
        return None;
    }
    let bytes = data.get(pos..pos + len)?;
    let mut value = if keep_marker {
        first as u64
    } else {
        (first & (0xFFu16 >> len) as u8) as u64
    };
    for &byte in &bytes[1..] {
        value = (value << 8) | byte as u64;
    }
    Some((value, len))
}

/// Count the SimpleBlocks of `track` in a WebM stream
fn count_blocks(data: &[u8], track: u64) -> usize {
    const SEGMENT: u64 = 0x1853_8067;
    const CLUSTER: u64 = 0x1F43_B675;
    const SIMPLE_BLOCK: u64 = 0xA3;

    let mut count = 0;
    let mut pos = 0;
    while let Some((id, id_len)) = read_vint(data, pos, true) {
        let Some((size, size_len)) = read_vint(data, pos + id_len, false) else {
            break;
        };
        pos += id_len + size_len;
        // Segment and clusters are written with unknown size: step inside
        if id == SEGMENT || id == CLUSTER {
            continue;
        }
        if id == SIMPLE_BLOCK && read_vint(data, pos, false).map(|(n, _)| n) == Some(track) {
            count += 1;
        }
        pos += size as usize;
    }
    count
}

fn write_wav(dir: &Path, sample_rate: u32, seconds: u32) -> Result<PathBuf> {
    let path = dir.join("system.wav");
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    for i in 0..sample_rate * seconds {
        let sample = ((i % 100) as i16 - 50) * 100;
        writer.write_sample(sample)?;
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(path)
}

#[tokio::test(start_paused = true)]
async fn test_three_second_recording_delivers_chunk_per_second() -> Result<()> {
    let (_compositor, feed) = surface();
    let mut recorder = recorder("video/webm");

    recorder.start(Some(&feed), &[])?;
    assert_eq!(recorder.state(), RecorderState::Recording);

    sleep(Duration::from_millis(3500)).await;
    let before_stop = recorder.status();
    assert_eq!(before_stop.chunk_count, 3, "one chunk per elapsed second");
    assert!(before_stop.bytes_buffered > 0);

    recorder.stop();
    let handle = recorder.wait_complete().await.expect("artifact after stop");

    let status = recorder.status();
    assert_eq!(status.state, RecorderState::Complete);
    // Final partial timeslice is flushed on stop
    assert_eq!(status.chunk_count, 4);

    let artifact = recorder.store().resolve(&handle).expect("handle resolves");
    assert_eq!(artifact.size(), status.bytes_buffered);
    assert_eq!(artifact.chunk_count(), 4);
    assert_eq!(artifact.mime_type(), "video/webm");
    assert_eq!(recorder.store().live_handles(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_restart_discards_previous_session() -> Result<()> {
    let (_compositor, feed) = surface();
    let mut recorder = recorder("video/webm");

    recorder.start(Some(&feed), &[])?;
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(recorder.status().chunk_count, 1);

    // Second start without stop: old chunks must not carry over
    recorder.start(Some(&feed), &[])?;
    assert_eq!(recorder.status().chunk_count, 0);
    assert_eq!(recorder.state(), RecorderState::Recording);

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(recorder.status().chunk_count, 1);

    recorder.stop();
    let first = recorder.wait_complete().await.expect("artifact");
    assert_eq!(recorder.status().chunk_count, 2);
    assert_eq!(recorder.store().live_handles(), 1);

    // A new session revokes the previous artifact
    recorder.start(Some(&feed), &[])?;
    assert!(recorder.store().resolve(&first).is_none());
    assert_eq!(recorder.store().live_handles(), 0);

    sleep(Duration::from_millis(500)).await;
    recorder.stop();
    let second = recorder.wait_complete().await.expect("artifact");
    assert_ne!(first, second);
    assert_eq!(recorder.store().live_handles(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_recording_is_noop() {
    let mut recorder = recorder("video/webm");
    let before = recorder.status();

    recorder.stop();
    recorder.stop();

    assert_eq!(recorder.status(), before);
    assert_eq!(recorder.state(), RecorderState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_codec_fails_without_fallback() {
    let (_compositor, feed) = surface();
    let mut recorder = recorder("video/webm;codecs=vp9");

    match recorder.start(Some(&feed), &[]) {
        Err(RecorderError::EncoderUnavailable { mime_type, .. }) => {
            assert_eq!(mime_type, "video/webm;codecs=vp9");
        }
        other => panic!("expected EncoderUnavailable, got {:?}", other),
    }
    assert_eq!(recorder.state(), RecorderState::Idle);
    assert_eq!(recorder.wait_complete().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_audio_recorded_and_released() -> Result<()> {
    let (_compositor, feed) = surface();
    let backend = small_backend();
    let display = backend
        .request_source(SourceKind::Display, &CaptureConstraints::display())
        .await?;
    let camera = backend
        .request_source(SourceKind::Camera, &CaptureConstraints::camera())
        .await?;

    let mut recorder = recorder("video/webm");
    recorder.start(Some(&feed), &[display.clone(), camera.clone()])?;
    let mixed = recorder.mixed_audio().cloned().expect("both sources have audio");
    assert!(mixed.is_live());

    sleep(Duration::from_millis(1200)).await;
    recorder.stop();
    let handle = recorder.wait_complete().await.expect("artifact");

    let artifact = recorder.store().resolve(&handle).expect("handle resolves");
    let data = artifact.data();
    assert!(data.windows(13).any(|w| w == b"A_PCM/INT/LIT"));
    assert!(data.windows(14).any(|w| w == b"V_UNCOMPRESSED"));
    assert!(count_blocks(data, 1) > 0);
    assert!(count_blocks(data, 2) > 0, "mixed audio frames are written");

    // Routing graph is released with the session
    assert!(!mixed.is_live());
    // Capture sources are untouched by the recorder
    assert!(display.is_live());
    assert!(camera.is_live());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_microphone_recorded_beside_mismatched_system_audio() -> Result<()> {
    let dir = TempDir::new()?;
    let wav = write_wav(dir.path(), 44100, 5)?;

    let (_compositor, feed) = surface();
    let backend = small_backend();
    // 44.1kHz system audio cannot join the 48kHz mix
    backend.set_display_audio(AudioFile::open(&wav)?);
    let display = backend
        .request_source(SourceKind::Display, &CaptureConstraints::display())
        .await?;
    let camera = backend
        .request_source(SourceKind::Camera, &CaptureConstraints::camera())
        .await?;

    let mut recorder = recorder("video/webm");
    recorder.start(Some(&feed), &[display.clone(), camera.clone()])?;
    sleep(Duration::from_millis(1200)).await;
    // The system audio file is still playing
    assert!(display.audio_tracks()[0].is_live());

    recorder.stop();
    let handle = recorder.wait_complete().await.expect("artifact");
    let artifact = recorder.store().resolve(&handle).expect("handle resolves");

    // About 60 microphone frames of 20ms; allow for the final partial slice
    let audio_blocks = count_blocks(artifact.data(), 2);
    assert!(audio_blocks >= 50, "only {} audio blocks written", audio_blocks);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sources_without_audio_record_video_only() -> Result<()> {
    let (_compositor, feed) = surface();
    let backend = small_backend();
    let constraints = CaptureConstraints {
        audio: false,
        ..CaptureConstraints::display()
    };
    let display = backend.request_source(SourceKind::Display, &constraints).await?;

    let mut recorder = recorder("video/webm");
    recorder.start(Some(&feed), &[display])?;
    assert!(recorder.mixed_audio().is_none());

    sleep(Duration::from_millis(1200)).await;
    recorder.stop();
    let handle = recorder.wait_complete().await.expect("artifact");
    let artifact = recorder.store().resolve(&handle).expect("handle resolves");
    assert!(!artifact.data().windows(13).any(|w| w == b"A_PCM/INT/LIT"));

    Ok(())
}
