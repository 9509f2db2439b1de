//! Encoder seam
//!
//! An encoder consumes a `MediaStream` and reports its output as a sequence
//! of events on a channel: zero or more `Data` chunks in temporal order,
//! then exactly one `Stopped` after `stop()` has been requested and every
//! pending chunk has been delivered.

use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::RecorderError;
use crate::media::MediaStream;

/// Output of a running encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// One timeslice worth of encoded bytes (may be empty)
    Data(Vec<u8>),
    /// Final event; no further data follows
    Stopped,
}

/// Incremental media encoder
pub trait Encoder: Send {
    /// Container/codec this encoder produces
    fn mime_type(&self) -> &str;

    /// Begin encoding `stream`, delivering a chunk every `timeslice`
    fn start(
        &mut self,
        stream: MediaStream,
        timeslice: Duration,
    ) -> Result<mpsc::Receiver<EncoderEvent>, RecorderError>;

    /// Request the encoder to flush and stop. No-op when inactive.
    fn stop(&mut self);

    /// False before `start` and after `stop`
    fn is_active(&self) -> bool;
}

/// Constructs encoders for a requested MIME type
pub trait EncoderFactory: Send + Sync {
    /// Fails synchronously when the type is unsupported; no fallback is tried
    fn create(&self, mime_type: &str) -> Result<Box<dyn Encoder>, RecorderError>;
}

/// A parsed `type/subtype;codecs=a,b` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    pub essence: String,
    pub codecs: Vec<String>,
}

impl MimeType {
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(';');
        let essence = parts.next()?.trim().to_ascii_lowercase();
        if !essence.contains('/') {
            return None;
        }

        let mut codecs = Vec::new();
        for param in parts {
            let Some((key, val)) = param.split_once('=') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("codecs") {
                codecs.extend(
                    val.trim()
                        .trim_matches('"')
                        .split(',')
                        .map(|c| c.trim().to_ascii_lowercase())
                        .filter(|c| !c.is_empty()),
                );
            }
        }

        Some(Self { essence, codecs })
    }
}
