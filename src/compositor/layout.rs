//! Output geometry: the camera bubble and cover-fit cropping

/// Point in surface pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in surface pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        !(self.w > 0.0 && self.h > 0.0)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.w, self.h)
    }
}

/// Placement of the circular camera overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BubbleLayout {
    pub diameter: f32,
    /// Distance from the right and bottom edges of the surface
    pub padding: f32,
    pub border_width: f32,
}

impl Default for BubbleLayout {
    fn default() -> Self {
        Self {
            diameter: 300.0,
            padding: 50.0,
            border_width: 5.0,
        }
    }
}

impl BubbleLayout {
    /// Bounding square of the bubble, anchored bottom-right
    pub fn bounds(&self, surface_width: u32, surface_height: u32) -> Rect {
        Rect::new(
            surface_width as f32 - self.diameter - self.padding,
            surface_height as f32 - self.diameter - self.padding,
            self.diameter,
            self.diameter,
        )
    }

    pub fn radius(&self) -> f32 {
        self.diameter / 2.0
    }
}

/// Cover-fit a `src_width` x `src_height` image into a square of side `size`
///
/// The returned rect is relative to the square's top-left corner. The scale
/// comes from the smaller source dimension, so the square is always fully
/// covered and the larger dimension is cropped evenly on both sides.
/// Degenerate sources yield `None`.
pub fn cover_fit(src_width: u32, src_height: u32, size: f32) -> Option<Rect> {
    if src_width == 0 || src_height == 0 || !(size > 0.0) || !size.is_finite() {
        return None;
    }

    let (w, h) = (src_width as f32, src_height as f32);
    let scale = size / w.min(h);
    // Rounding in `scale` must never undercover the square
    let draw_w = (w * scale).max(size);
    let draw_h = (h * scale).max(size);

    Some(Rect::new(
        -(draw_w - size) / 2.0,
        -(draw_h - size) / 2.0,
        draw_w,
        draw_h,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bubble_bounds_bottom_right() {
        let layout = BubbleLayout::default();
        let bounds = layout.bounds(1920, 1080);
        assert_eq!(bounds, Rect::new(1570.0, 730.0, 300.0, 300.0));
        assert_eq!(bounds.center(), Point::new(1720.0, 880.0));
        assert_eq!(layout.radius(), 150.0);
    }

    #[test]
    fn test_cover_fit_landscape_crops_width() {
        let fit = cover_fit(640, 480, 300.0).unwrap();
        assert_eq!(fit.h, 300.0);
        assert_eq!(fit.w, 400.0);
        assert_eq!(fit.x, -50.0);
        assert_eq!(fit.y, 0.0);
    }

    #[test]
    fn test_cover_fit_portrait_crops_height() {
        let fit = cover_fit(480, 960, 300.0).unwrap();
        assert_eq!(fit.w, 300.0);
        assert_eq!(fit.h, 600.0);
        assert_eq!(fit.x, 0.0);
        assert_eq!(fit.y, -150.0);
    }

    #[test]
    fn test_cover_fit_never_undercovers() {
        let sizes = [1u32, 2, 3, 7, 99, 480, 481, 640, 1079, 1080, 1920, 4096, 65535];
        for &w in &sizes {
            for &h in &sizes {
                let fit = cover_fit(w, h, 300.0).unwrap();
                assert!(
                    fit.w.min(fit.h) >= 300.0,
                    "{}x{} undercovers: {:?}",
                    w,
                    h,
                    fit
                );
                // Crop is centred
                assert!((fit.x * 2.0 + fit.w - 300.0).abs() < 1e-2);
                assert!((fit.y * 2.0 + fit.h - 300.0).abs() < 1e-2);
            }
        }
    }

    #[test]
    fn test_cover_fit_degenerate() {
        assert!(cover_fit(0, 0, 300.0).is_none());
        assert!(cover_fit(640, 0, 300.0).is_none());
        assert!(cover_fit(0, 480, 300.0).is_none());
        assert!(cover_fit(640, 480, 0.0).is_none());
        assert!(cover_fit(640, 480, f32::NAN).is_none());
    }
}
