//! Headless front end for `n3dscap`: audio playback through cpal, a display
//! sink without a window, PNG snapshots and command-line configuration.

pub mod audio;
pub mod config;
pub mod display;
pub mod snapshot;

pub use display::{window_title, HeadlessDisplay};
pub use snapshot::{compose_panels, Snapshot};
