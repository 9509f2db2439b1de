// Integration tests for the frame compositor at full output resolution
//
// These render 1920x1080 frames through the software canvas and check the
// published surface pixel by pixel.

use screencam::compositor::{BubbleLayout, Compositor, SoftwareCanvas, SurfaceFeed, TickOutcome};
use screencam::config::CompositorConfig;
use screencam::media::{Color, VideoFrame, VideoTrack};
use std::sync::Arc;

const WIDTH: u32 = 1920;
const HEIGHT: u32 = 1080;

const RED: Color = Color::rgb(255, 0, 0);
const BLUE: Color = Color::rgb(0, 0, 255);

fn compositor() -> (Compositor, SurfaceFeed) {
    let compositor = Compositor::new(&CompositorConfig::default()).unwrap();
    let canvas = SoftwareCanvas::new(WIDTH, HEIGHT);
    let feed = canvas.feed();
    compositor.attach_context(Box::new(canvas));
    (compositor, feed)
}

fn presented(feed: &SurfaceFeed) -> Arc<VideoFrame> {
    feed.latest().expect("a frame should have been presented")
}

fn outside_bubble(x: u32, y: u32) -> bool {
    let layout = BubbleLayout::default();
    let center = layout.bounds(WIDTH, HEIGHT).center();
    let dx = x as f32 + 0.5 - center.x;
    let dy = y as f32 + 0.5 - center.y;
    dx * dx + dy * dy > layout.radius() * layout.radius()
}

#[test]
fn test_background_only_is_stretched_source() {
    let (compositor, feed) = compositor();
    let display = VideoTrack::new("display");
    let source = VideoFrame::from_fn(960, 540, |x, y| Color::rgb((x % 256) as u8, (y % 256) as u8, 7));
    display.push_frame(source.clone());
    compositor.set_background(Some(display));

    assert_eq!(
        compositor.render_once(),
        TickOutcome::Drawn {
            placeholder: false,
            overlay: false
        }
    );

    let frame = presented(&feed);
    assert_eq!((frame.width, frame.height), (WIDTH, HEIGHT));
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            assert_eq!(
                frame.pixel(x, y),
                source.pixel(x / 2, y / 2),
                "pixel ({}, {}) should come from the stretched display",
                x,
                y
            );
        }
    }
}

#[test]
fn test_placeholder_replaces_previous_frame() {
    let (compositor, feed) = compositor();
    let display = VideoTrack::new("display");
    display.push_frame(VideoFrame::solid(WIDTH, HEIGHT, RED));
    compositor.set_background(Some(display.clone()));
    compositor.render_once();
    assert_eq!(presented(&feed).pixel(10, 10), Some(RED));

    // OS revokes the display: the next tick must not leak any red
    display.end();
    assert_eq!(
        compositor.render_once(),
        TickOutcome::Drawn {
            placeholder: true,
            overlay: false
        }
    );

    let frame = presented(&feed);
    let mut label_pixels = 0;
    for pixel in &frame.pixels {
        match *pixel {
            Color::PLACEHOLDER => {}
            Color::WHITE => label_pixels += 1,
            other => panic!("unexpected pixel {:?} in placeholder frame", other),
        }
    }
    assert!(label_pixels > 0, "waiting label should be rendered");
    assert_eq!(frame.pixel(0, 0), Some(Color::PLACEHOLDER));
    assert_eq!(frame.pixel(WIDTH - 1, HEIGHT - 1), Some(Color::PLACEHOLDER));
}

#[test]
fn test_overlay_stays_inside_bubble() {
    let (compositor, feed) = compositor();
    let display = VideoTrack::new("display");
    display.push_frame(VideoFrame::solid(WIDTH, HEIGHT, BLUE));
    let camera = VideoTrack::new("camera");
    camera.push_frame(VideoFrame::solid(640, 480, RED));
    compositor.set_background(Some(display));
    compositor.set_overlay(Some(camera));

    assert_eq!(
        compositor.render_once(),
        TickOutcome::Drawn {
            placeholder: false,
            overlay: true
        }
    );

    let frame = presented(&feed);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            if outside_bubble(x, y) {
                assert_eq!(frame.pixel(x, y), Some(BLUE), "({}, {}) outside bubble", x, y);
            }
        }
    }

    // Centre is camera, the rim is the white border
    assert_eq!(frame.pixel(1720, 880), Some(RED));
    assert_eq!(frame.pixel(1720, 731), Some(Color::WHITE));
    assert_eq!(frame.pixel(1571, 880), Some(Color::WHITE));
}

#[test]
fn test_extreme_aspect_overlay_fills_bubble() {
    let (compositor, feed) = compositor();
    let display = VideoTrack::new("display");
    display.push_frame(VideoFrame::solid(WIDTH, HEIGHT, BLUE));
    let camera = VideoTrack::new("camera");
    camera.push_frame(VideoFrame::solid(4000, 3, RED));
    compositor.set_background(Some(display));
    compositor.set_overlay(Some(camera));
    compositor.render_once();

    let frame = presented(&feed);
    let layout = BubbleLayout::default();
    let center = layout.bounds(WIDTH, HEIGHT).center();
    let inner = layout.radius() - layout.border_width;

    // Every pixel well inside the border comes from the camera
    for y in 730..1030 {
        for x in 1570..1870 {
            let dx = x as f32 + 0.5 - center.x;
            let dy = y as f32 + 0.5 - center.y;
            if dx * dx + dy * dy < inner * inner {
                assert_eq!(frame.pixel(x, y), Some(RED), "({}, {}) undercovered", x, y);
            }
        }
    }
}

#[test]
fn test_degenerate_overlay_is_skipped() {
    let (compositor, feed) = compositor();
    let display = VideoTrack::new("display");
    display.push_frame(VideoFrame::solid(WIDTH, HEIGHT, BLUE));
    let camera = VideoTrack::new("camera");
    camera.push_frame(VideoFrame::solid(0, 480, RED));
    compositor.set_background(Some(display));
    compositor.set_overlay(Some(camera));

    assert_eq!(
        compositor.render_once(),
        TickOutcome::Drawn {
            placeholder: false,
            overlay: false
        }
    );
    assert_eq!(presented(&feed).pixel(1720, 880), Some(BLUE));
}

#[test]
fn test_overlay_removed_after_camera_ends() {
    let (compositor, feed) = compositor();
    let display = VideoTrack::new("display");
    display.push_frame(VideoFrame::solid(WIDTH, HEIGHT, BLUE));
    let camera = VideoTrack::new("camera");
    camera.push_frame(VideoFrame::solid(640, 480, RED));
    compositor.set_background(Some(display));
    compositor.set_overlay(Some(camera.clone()));

    compositor.render_once();
    assert_eq!(presented(&feed).pixel(1720, 880), Some(RED));

    camera.end();
    compositor.render_once();
    assert_eq!(presented(&feed).pixel(1720, 880), Some(BLUE));
    assert_eq!(compositor.frames_drawn(), 2);
}

#[test]
fn test_malformed_frames_do_not_panic() {
    let (compositor, feed) = compositor();
    let display = VideoTrack::new("display");
    display.push_frame(VideoFrame {
        width: WIDTH,
        height: HEIGHT,
        pixels: vec![BLUE; 10],
    });
    let camera = VideoTrack::new("camera");
    camera.push_frame(VideoFrame {
        width: 640,
        height: 480,
        pixels: vec![RED; 10],
    });
    compositor.set_background(Some(display));
    compositor.set_overlay(Some(camera));

    // Pixel buffers shorter than their dimensions count as not ready
    assert_eq!(
        compositor.render_once(),
        TickOutcome::Drawn {
            placeholder: true,
            overlay: false
        }
    );
    assert_eq!(presented(&feed).pixel(1720, 880), Some(Color::PLACEHOLDER));
}
