pub mod artifact;
pub mod capture;
pub mod encoder;
pub mod pipeline;
pub mod state;
pub mod webm;

pub use artifact::{Artifact, ArtifactHandle, ArtifactStore};
pub use capture::{capture_stream, SurfaceCapture};
pub use encoder::{Encoder, EncoderEvent, EncoderFactory, MimeType};
pub use pipeline::Recorder;
pub use state::{RecorderState, RecorderStatus};
pub use webm::{AudioFormat, WebmEncoder, WebmEncoderFactory};
