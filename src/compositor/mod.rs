//! Frame compositor
//!
//! On every tick the compositor draws the display feed stretched over the
//! whole output surface (or a placeholder while it is not ready) and, when
//! the camera feed is ready, a circular camera bubble in the bottom-right
//! corner. Readiness is read on every tick, so a revoked source degrades the
//! output on the next frame without any notification plumbing.

pub mod canvas;
pub mod font;
pub mod layout;
pub mod surface;

pub use canvas::{RenderContext, SoftwareCanvas};
pub use layout::{cover_fit, BubbleLayout, Point, Rect};
pub use surface::{OutputSurface, SurfaceFeed};

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::config::{rate_period, CompositorConfig};
use crate::media::{Color, VideoTrack};

/// Why a tick drew nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No rendering context (and therefore no output surface) attached
    NoContext,
    /// No display source attached
    NoBackground,
}

/// Result of a single compositor tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Drawn {
        /// Background was the placeholder rather than the display feed
        placeholder: bool,
        /// Camera bubble was drawn
        overlay: bool,
    },
    Skipped(SkipReason),
}

/// Resolved drawing style
#[derive(Debug, Clone)]
struct Style {
    bubble: BubbleLayout,
    border_color: Color,
    placeholder_color: Color,
    label: String,
    label_color: Color,
    label_size: f32,
}

impl Style {
    fn from_config(config: &CompositorConfig) -> Result<Self> {
        Ok(Self {
            bubble: BubbleLayout {
                diameter: config.bubble_diameter,
                padding: config.bubble_padding,
                border_width: config.border_width,
            },
            border_color: Color::from_hex(&config.border_color)?,
            placeholder_color: Color::from_hex(&config.placeholder_color)?,
            label: config.placeholder_label.clone(),
            label_color: Color::from_hex(&config.label_color)?,
            label_size: config.label_size,
        })
    }
}

struct Scene {
    running: bool,
    style: Style,
    context: Option<Box<dyn RenderContext>>,
    background: Option<VideoTrack>,
    overlay: Option<VideoTrack>,
    frames_drawn: u64,
}

impl Scene {
    fn tick(&mut self) -> TickOutcome {
        let Some(ctx) = self.context.as_mut() else {
            trace!("Compositor tick skipped: no render context");
            return TickOutcome::Skipped(SkipReason::NoContext);
        };
        let Some(background) = &self.background else {
            trace!("Compositor tick skipped: no display source");
            return TickOutcome::Skipped(SkipReason::NoBackground);
        };

        let (width, height) = ctx.size();
        let full = Rect::new(0.0, 0.0, width as f32, height as f32);
        let style = &self.style;
        ctx.reset_clip();

        // 1. Background
        let placeholder = match background.current_frame().filter(|f| !f.is_degenerate()) {
            Some(frame) => {
                ctx.draw_image(&frame, full);
                false
            }
            None => {
                ctx.fill_rect(full, style.placeholder_color);
                ctx.fill_text(&style.label, full.center(), style.label_size, style.label_color);
                true
            }
        };

        // 2. Camera bubble
        let overlay = match &self.overlay {
            Some(track) => draw_bubble(&mut **ctx, track, style, width, height),
            None => false,
        };

        ctx.present();
        self.frames_drawn += 1;
        TickOutcome::Drawn {
            placeholder,
            overlay,
        }
    }
}

fn draw_bubble(
    ctx: &mut dyn RenderContext,
    track: &VideoTrack,
    style: &Style,
    width: u32,
    height: u32,
) -> bool {
    let Some(frame) = track.current_frame().filter(|f| !f.is_degenerate()) else {
        return false;
    };
    let layout = &style.bubble;
    let Some(fit) = cover_fit(frame.width, frame.height, layout.diameter) else {
        debug!(
            "Skipping camera overlay: degenerate source {}x{}",
            frame.width, frame.height
        );
        return false;
    };

    let bounds = layout.bounds(width, height);
    let center = bounds.center();
    let radius = layout.radius();

    ctx.clip_to_circle(center, radius);
    ctx.draw_image(&frame, fit.offset(bounds.x, bounds.y));
    ctx.stroke_circle(center, radius, layout.border_width, style.border_color);
    ctx.reset_clip();
    true
}

/// Per-tick compositor driving a `RenderContext`
pub struct Compositor {
    scene: Arc<Mutex<Scene>>,
    tick_interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl Compositor {
    pub fn new(config: &CompositorConfig) -> Result<Self> {
        Ok(Self {
            scene: Arc::new(Mutex::new(Scene {
                running: false,
                style: Style::from_config(config)?,
                context: None,
                background: None,
                overlay: None,
                frames_drawn: 0,
            })),
            tick_interval: rate_period(config.tick_hz),
            task: None,
        })
    }

    pub fn attach_context(&self, context: Box<dyn RenderContext>) {
        let (width, height) = context.size();
        info!("Compositor render context attached ({}x{})", width, height);
        self.scene.lock().context = Some(context);
    }

    pub fn detach_context(&self) -> Option<Box<dyn RenderContext>> {
        self.scene.lock().context.take()
    }

    /// Display feed drawn as the background
    pub fn set_background(&self, track: Option<VideoTrack>) {
        self.scene.lock().background = track;
    }

    /// Camera feed drawn in the bubble
    pub fn set_overlay(&self, track: Option<VideoTrack>) {
        self.scene.lock().overlay = track;
    }

    pub fn clear_background(&self) {
        self.set_background(None);
    }

    pub fn clear_overlay(&self) {
        self.set_overlay(None);
    }

    /// Start the draw loop. Idempotent.
    pub fn start(&mut self) {
        {
            let mut scene = self.scene.lock();
            if scene.running {
                return;
            }
            scene.running = true;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let shared = Arc::clone(&self.scene);
        let period = self.tick_interval;
        info!("Compositor started ({:?} per tick)", period);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                // Rasterising is CPU-bound: keep it off the async workers.
                let scene = Arc::clone(&shared);
                let drew = tokio::task::spawn_blocking(move || {
                    let mut scene = scene.lock();
                    // Checked under the same lock `stop` takes, so no frame is
                    // drawn once `stop` has returned.
                    if !scene.running {
                        return false;
                    }
                    scene.tick();
                    true
                })
                .await;
                if !matches!(drew, Ok(true)) {
                    break;
                }
            }
            debug!("Compositor loop exited");
        }));
    }

    /// Halt the draw loop. Idempotent.
    pub fn stop(&mut self) {
        let was_running = {
            let mut scene = self.scene.lock();
            std::mem::replace(&mut scene.running, false)
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if was_running {
            info!("Compositor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.scene.lock().running
    }

    /// Draw a single frame now, independent of the loop
    pub fn render_once(&self) -> TickOutcome {
        self.scene.lock().tick()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.scene.lock().frames_drawn
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
