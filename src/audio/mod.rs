pub mod file;
pub mod mixer;

pub use file::AudioFile;
pub use mixer::{AudioMixer, MixGraph, MixerConfig};
