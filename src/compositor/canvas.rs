//! Rendering contexts
//!
//! `RenderContext` is the drawing seam the compositor talks to.
//! `SoftwareCanvas` implements it on the CPU over an `OutputSurface` and
//! publishes each presented frame to a `SurfaceFeed`.

use std::sync::Arc;
use tokio::sync::watch;

use super::font;
use super::layout::{Point, Rect};
use super::surface::{OutputSurface, SurfaceFeed};
use crate::media::{Color, VideoFrame};

/// Drawing operations used by the compositor
pub trait RenderContext: Send {
    /// Surface size in pixels
    fn size(&self) -> (u32, u32);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Draw `frame` scaled to exactly fill `dest` (no aspect preservation)
    fn draw_image(&mut self, frame: &VideoFrame, dest: Rect);

    /// Restrict subsequent drawing to a circle
    fn clip_to_circle(&mut self, center: Point, radius: f32);

    fn reset_clip(&mut self);

    /// Stroke a circle outline centred on its boundary
    fn stroke_circle(&mut self, center: Point, radius: f32, width: f32, color: Color);

    /// Draw `text` centred on `center` with glyph height `size_px`
    fn fill_text(&mut self, text: &str, center: Point, size_px: f32, color: Color);

    /// Called once the frame is complete
    fn present(&mut self) {}
}

#[derive(Debug, Clone, Copy)]
struct CircleClip {
    center: Point,
    radius: f32,
}

impl CircleClip {
    fn contains(&self, x: u32, y: u32) -> bool {
        let dx = x as f32 + 0.5 - self.center.x;
        let dy = y as f32 + 0.5 - self.center.y;
        dx * dx + dy * dy <= self.radius * self.radius
    }

    fn bounds(&self) -> Rect {
        Rect::new(
            self.center.x - self.radius,
            self.center.y - self.radius,
            self.radius * 2.0,
            self.radius * 2.0,
        )
    }
}

/// CPU rasteriser over an `OutputSurface`
pub struct SoftwareCanvas {
    surface: OutputSurface,
    clip: Option<CircleClip>,
    frames: watch::Sender<Option<Arc<VideoFrame>>>,
}

impl SoftwareCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        let (frames, _) = watch::channel(None);
        Self {
            surface: OutputSurface::new(width, height),
            clip: None,
            frames,
        }
    }

    pub fn surface(&self) -> &OutputSurface {
        &self.surface
    }

    /// Read side for the recorder; frames appear on every `present`
    pub fn feed(&self) -> SurfaceFeed {
        SurfaceFeed::new(
            self.surface.width(),
            self.surface.height(),
            self.frames.subscribe(),
        )
    }

    /// Pixel ranges covered by `rect`, intersected with the surface and clip
    fn pixel_span(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let rect = match &self.clip {
            Some(clip) => intersect(rect, clip.bounds())?,
            None => rect,
        };
        if rect.is_empty() {
            return None;
        }
        let x0 = rect.x.floor().max(0.0) as u32;
        let y0 = rect.y.floor().max(0.0) as u32;
        let x1 = (rect.x + rect.w).ceil().min(self.surface.width() as f32).max(0.0) as u32;
        let y1 = (rect.y + rect.h).ceil().min(self.surface.height() as f32).max(0.0) as u32;
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    fn clipped(&self, x: u32, y: u32) -> bool {
        self.clip.map_or(false, |clip| !clip.contains(x, y))
    }
}

fn intersect(a: Rect, b: Rect) -> Option<Rect> {
    let x0 = a.x.max(b.x);
    let y0 = a.y.max(b.y);
    let x1 = (a.x + a.w).min(b.x + b.w);
    let y1 = (a.y + a.h).min(b.y + b.h);
    (x1 > x0 && y1 > y0).then(|| Rect::new(x0, y0, x1 - x0, y1 - y0))
}

/// Pixel-centre containment, half-open on the far edges
fn covers(rect: &Rect, x: u32, y: u32) -> bool {
    let cx = x as f32 + 0.5;
    let cy = y as f32 + 0.5;
    cx >= rect.x && cx < rect.x + rect.w && cy >= rect.y && cy < rect.y + rect.h
}

impl RenderContext for SoftwareCanvas {
    fn size(&self) -> (u32, u32) {
        (self.surface.width(), self.surface.height())
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let Some((x0, y0, x1, y1)) = self.pixel_span(rect) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                if covers(&rect, x, y) && !self.clipped(x, y) {
                    self.surface.blend(x, y, color);
                }
            }
        }
    }

    fn draw_image(&mut self, frame: &VideoFrame, dest: Rect) {
        if frame.is_degenerate() {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.pixel_span(dest) else {
            return;
        };
        let x_scale = frame.width as f32 / dest.w;
        let y_scale = frame.height as f32 / dest.h;

        for y in y0..y1 {
            let sy = ((y as f32 + 0.5 - dest.y) * y_scale) as u32;
            let sy = sy.min(frame.height - 1);
            for x in x0..x1 {
                if !covers(&dest, x, y) || self.clipped(x, y) {
                    continue;
                }
                let sx = ((x as f32 + 0.5 - dest.x) * x_scale) as u32;
                let sx = sx.min(frame.width - 1);
                if let Some(color) = frame.pixel(sx, sy) {
                    self.surface.blend(x, y, color);
                }
            }
        }
    }

    fn clip_to_circle(&mut self, center: Point, radius: f32) {
        self.clip = Some(CircleClip { center, radius });
    }

    fn reset_clip(&mut self) {
        self.clip = None;
    }

    fn stroke_circle(&mut self, center: Point, radius: f32, width: f32, color: Color) {
        let half = width / 2.0;
        let outer = radius + half;
        let bounds = Rect::new(center.x - outer, center.y - outer, outer * 2.0, outer * 2.0);
        let Some((x0, y0, x1, y1)) = self.pixel_span(bounds) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - center.x;
                let dy = y as f32 + 0.5 - center.y;
                let distance = (dx * dx + dy * dy).sqrt();
                if (distance - radius).abs() <= half && !self.clipped(x, y) {
                    self.surface.blend(x, y, color);
                }
            }
        }
    }

    fn fill_text(&mut self, text: &str, center: Point, size_px: f32, color: Color) {
        let cell = (size_px / font::GLYPH_HEIGHT as f32).round().max(1.0);
        let width = font::text_width(text) as f32 * cell;
        let height = font::GLYPH_HEIGHT as f32 * cell;
        let left = (center.x - width / 2.0).round();
        let top = (center.y - height / 2.0).round();

        for (col, row) in font::lit_cells(text) {
            let rect = Rect::new(left + col as f32 * cell, top + row as f32 * cell, cell, cell);
            self.fill_rect(rect, color);
        }
    }

    fn present(&mut self) {
        self.frames.send_replace(Some(Arc::new(self.surface.snapshot())));
    }
}
