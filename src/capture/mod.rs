//! Capture source adapters
//!
//! The core depends only on `CaptureBackend`: acquire a source of a given
//! kind, read its tracks, and observe its termination.

pub mod backend;
pub mod synthetic;

pub use backend::{on_terminated, CaptureBackend, CaptureConstraints, CaptureSource, SourceKind};
pub use synthetic::{SyntheticCapture, SyntheticConfig};
