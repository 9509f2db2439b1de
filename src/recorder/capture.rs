use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::compositor::SurfaceFeed;
use crate::config::rate_period;
use crate::media::{Color, VideoFrame, VideoTrack};

/// Video track derived by sampling an output surface at a fixed rate
///
/// The track always carries a frame: until the compositor presents its
/// first frame the sampler pushes black at the surface resolution.
pub struct SurfaceCapture {
    track: VideoTrack,
    task: Option<JoinHandle<()>>,
}

impl SurfaceCapture {
    pub fn track(&self) -> &VideoTrack {
        &self.track
    }

    /// End the derived track and stop sampling. Idempotent.
    pub fn stop(&mut self) {
        self.track.end();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SurfaceCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start sampling `feed` at `fps` frames per second
pub fn capture_stream(feed: &SurfaceFeed, fps: u32) -> SurfaceCapture {
    let (width, height) = feed.dimensions();
    let track = VideoTrack::new(format!("surface:{}x{}", width, height));
    let period = rate_period(fps);

    let sample = {
        let feed = feed.clone();
        move || {
            feed.latest()
                .unwrap_or_else(|| VideoFrame::solid(width, height, Color::BLACK).into())
        }
    };

    track.push_frame(sample());

    let producer = track.clone();
    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately; the initial frame is already out.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !producer.push_frame(sample()) {
                break;
            }
        }
        debug!("Surface sampler exited");
    });

    SurfaceCapture {
        track,
        task: Some(task),
    }
}
