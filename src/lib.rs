pub mod audio;
pub mod capture;
pub mod compositor;
pub mod config;
pub mod error;
pub mod media;
pub mod recorder;
pub mod session;

pub use audio::{AudioFile, AudioMixer, MixGraph, MixerConfig};
pub use capture::{CaptureBackend, CaptureConstraints, CaptureSource, SourceKind, SyntheticCapture};
pub use compositor::{Compositor, RenderContext, SoftwareCanvas, SurfaceFeed, TickOutcome};
pub use config::Config;
pub use error::{CaptureError, RecorderError};
pub use media::{AudioFrame, AudioTrack, Color, MediaStream, VideoFrame, VideoTrack};
pub use recorder::{
    Artifact, ArtifactHandle, ArtifactStore, Recorder, RecorderState, RecorderStatus,
    WebmEncoderFactory,
};
pub use session::{SessionController, SessionStats};
