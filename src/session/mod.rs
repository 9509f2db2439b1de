//! Session management
//!
//! `SessionController` is the user-facing surface of the crate. It owns:
//! - Camera and display acquisition through a `CaptureBackend`
//! - The compositor drawing both feeds onto the output surface
//! - The recorder sampling that surface plus the mixed audio
//! - User-visible error messages and session statistics

mod controller;
mod stats;

pub use controller::SessionController;
pub use stats::SessionStats;
