use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// 8-bit RGBA colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    /// Placeholder background shown while the display feed is not ready
    pub const PLACEHOLDER: Color = Color::rgb(0x33, 0x33, 0x33);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`
    pub fn from_hex(value: &str) -> Result<Self> {
        let hex = value.trim().trim_start_matches('#');
        let digit = |i: usize| -> Result<u8> {
            let c = hex.as_bytes()[i] as char;
            match c.to_digit(16) {
                Some(d) => Ok(d as u8),
                None => bail!("Invalid hex colour: {}", value),
            }
        };

        match hex.len() {
            3 => {
                let (r, g, b) = (digit(0)?, digit(1)?, digit(2)?);
                Ok(Color::rgb(r * 17, g * 17, b * 17))
            }
            6 | 8 => {
                let byte = |i: usize| -> Result<u8> { Ok(digit(i)? * 16 + digit(i + 1)?) };
                let a = if hex.len() == 8 { byte(6)? } else { 255 };
                Ok(Color {
                    r: byte(0)?,
                    g: byte(2)?,
                    b: byte(4)?,
                    a,
                })
            }
            _ => bail!("Invalid hex colour: {}", value),
        }
    }
}

/// A single decoded video frame (RGBA, row-major)
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
}

impl VideoFrame {
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    /// Build a frame by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Color) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// A frame with no area, or whose pixel buffer does not match its
    /// dimensions, cannot be sampled
    pub fn is_degenerate(&self) -> bool {
        self.width == 0
            || self.height == 0
            || self.pixels.len() != self.width as usize * self.height as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Raw RGBA bytes
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|c| [c.r, c.g, c.b, c.a])
            .collect()
    }
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the producing source started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Samples per channel
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_hex() {
        assert_eq!(Color::from_hex("#333").unwrap(), Color::PLACEHOLDER);
        assert_eq!(Color::from_hex("ffffff").unwrap(), Color::WHITE);
        assert_eq!(
            Color::from_hex("#10203040").unwrap(),
            Color {
                r: 0x10,
                g: 0x20,
                b: 0x30,
                a: 0x40
            }
        );
        assert!(Color::from_hex("#12").is_err());
        assert!(Color::from_hex("#zzzzzz").is_err());
    }

    #[test]
    fn test_frame_pixel_lookup() {
        let frame = VideoFrame::from_fn(4, 2, |x, y| Color::rgb(x as u8, y as u8, 0));
        assert_eq!(frame.pixel(3, 1), Some(Color::rgb(3, 1, 0)));
        assert_eq!(frame.pixel(4, 0), None);
        assert!(!frame.is_degenerate());
        assert!(VideoFrame::solid(0, 10, Color::BLACK).is_degenerate());

        let mut short = VideoFrame::solid(4, 4, Color::BLACK);
        short.pixels.truncate(5);
        assert!(short.is_degenerate());
    }

    #[test]
    fn test_audio_frame_count() {
        let frame = AudioFrame {
            samples: vec![0; 960],
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: 0,
        };
        assert_eq!(frame.frame_count(), 480);
    }
}
