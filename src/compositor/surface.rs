use std::sync::Arc;
use tokio::sync::watch;

use crate::media::{Color, VideoFrame};

/// Fixed-resolution render target
///
/// The resolution is chosen at construction and never changes.
#[derive(Debug, Clone)]
pub struct OutputSurface {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl OutputSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::BLACK; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[self.index(x, y)])
    }

    /// Source-over blend of `color` onto pixel (x, y)
    pub(crate) fn blend(&mut self, x: u32, y: u32, color: Color) {
        let index = self.index(x, y);
        let dst = &mut self.pixels[index];
        match color.a {
            255 => *dst = color,
            0 => {}
            a => {
                let a = a as u32;
                let mix = |s: u8, d: u8| ((s as u32 * a + d as u32 * (255 - a)) / 255) as u8;
                *dst = Color {
                    r: mix(color.r, dst.r),
                    g: mix(color.g, dst.g),
                    b: mix(color.b, dst.b),
                    a: (a + dst.a as u32 * (255 - a) / 255) as u8,
                };
            }
        }
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> VideoFrame {
        VideoFrame {
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Read side of an output surface
///
/// Each presented frame replaces the previous one; the recorder's sampler is
/// the only consumer.
#[derive(Debug, Clone)]
pub struct SurfaceFeed {
    width: u32,
    height: u32,
    frames: watch::Receiver<Option<Arc<VideoFrame>>>,
}

impl SurfaceFeed {
    pub(crate) fn new(
        width: u32,
        height: u32,
        frames: watch::Receiver<Option<Arc<VideoFrame>>>,
    ) -> Self {
        Self {
            width,
            height,
            frames,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Most recently presented frame, if any tick has drawn yet
    pub fn latest(&self) -> Option<Arc<VideoFrame>> {
        self.frames.borrow().clone()
    }

    /// Wait for the next presented frame. Returns false once the surface is gone.
    pub async fn changed(&mut self) -> bool {
        self.frames.changed().await.is_ok()
    }
}
