use super::track::{AudioTrack, VideoTrack};

/// A bundle of at most one video track and any number of audio tracks
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    video: Option<VideoTrack>,
    audio: Vec<AudioTrack>,
}

impl MediaStream {
    pub fn new(video: Option<VideoTrack>) -> Self {
        Self {
            video,
            audio: Vec::new(),
        }
    }

    /// Attach an audio track (duplicates by id are ignored)
    pub fn add_track(&mut self, track: AudioTrack) {
        if self.audio.iter().any(|t| t.id() == track.id()) {
            return;
        }
        self.audio.push(track);
    }

    pub fn video_track(&self) -> Option<&VideoTrack> {
        self.video.as_ref()
    }

    pub fn audio_tracks(&self) -> &[AudioTrack] {
        &self.audio
    }

    /// Stop every track in the stream
    pub fn stop(&self) {
        if let Some(video) = &self.video {
            video.end();
        }
        for track in &self.audio {
            track.end();
        }
    }
}
