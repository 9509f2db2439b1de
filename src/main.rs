// Record a synthetic screen + camera session to a WebM file
//
// The display and camera are generated test patterns. A WAV file can stand
// in for system audio, and the display can be revoked partway through to
// watch the compositor fall back to its placeholder.
//
// Usage: cargo run -- --duration 5 --system-audio meeting.wav

use anyhow::{bail, Context, Result};
use clap::Parser;
use screencam::capture::{SyntheticCapture, SyntheticConfig};
use screencam::{AudioFile, Config, SessionController, SourceKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "screencam")]
#[command(about = "Composite a screen and camera bubble and record it to WebM")]
struct Args {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/screencam")]
    config: String,

    /// Duration to record in seconds
    #[arg(short, long, default_value = "5")]
    duration: u64,

    /// Output directory
    #[arg(short, long, default_value = "~/.screencam/recordings")]
    output_dir: String,

    /// Record the screen only
    #[arg(long)]
    no_camera: bool,

    /// 16-bit WAV file played as the display's system audio
    #[arg(long)]
    system_audio: Option<PathBuf>,

    /// Revoke the display this many seconds into the recording
    #[arg(long)]
    revoke_screen_after: Option<u64>,

    /// Print final session statistics as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    info!("Screencam v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Output surface {}x{} at {} Hz, recording {} fps in {} ms chunks",
        config.compositor.width,
        config.compositor.height,
        config.compositor.tick_hz,
        config.recorder.capture_fps,
        config.recorder.timeslice_ms
    );

    let backend = Arc::new(SyntheticCapture::new(SyntheticConfig {
        sample_rate: config.audio.sample_rate,
        ..SyntheticConfig::default()
    }));
    if let Some(path) = &args.system_audio {
        backend.set_display_audio(AudioFile::open(path)?);
    }

    let mut session = SessionController::new(&config, backend.clone())?;

    if !args.no_camera && session.start_camera().await.is_err() {
        bail!(session.error().unwrap_or("Camera unavailable").to_string());
    }
    if let Err(e) = session.start_screen().await {
        if e.is_user_cancellation() {
            info!("Screen share cancelled; nothing to record");
            return Ok(());
        }
        bail!(session.error().unwrap_or("Failed to share screen.").to_string());
    }

    session
        .start_recording()
        .context("Failed to start recording")?;
    info!("Recording for {} seconds", args.duration);

    let total = Duration::from_secs(args.duration);
    match args.revoke_screen_after.map(Duration::from_secs) {
        Some(revoke_at) if revoke_at < total => {
            sleep(revoke_at).await;
            warn!("Simulating OS revocation of the display");
            backend.revoke(SourceKind::Display);
            sleep(total - revoke_at).await;
        }
        _ => sleep(total).await,
    }

    info!("Stopping recording...");
    session.stop_recording().await;

    let handle = session
        .wait_complete()
        .await
        .context("Recording did not produce an artifact")?;

    let output_dir = shellexpand::tilde(&args.output_dir);
    let output_dir = PathBuf::from(output_dir.as_ref());
    let path = session.artifact_store().save(
        &handle,
        &output_dir,
        &config.recorder.filename,
    )?;

    let stats = session.stats();
    info!("Recording complete!");
    info!(
        "Saved {} ({} chunks, {} bytes, {} frames composited)",
        path.display(),
        stats.chunks_count,
        stats.bytes_recorded,
        stats.frames_composited
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Ok(())
}
