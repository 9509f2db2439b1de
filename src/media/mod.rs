pub mod frame;
pub mod stream;
pub mod track;

pub use frame::{AudioFrame, Color, VideoFrame};
pub use stream::MediaStream;
pub use track::{AudioTrack, VideoTrack, VideoTrackState};
