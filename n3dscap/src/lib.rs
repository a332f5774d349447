//! Streams video and audio from New 3DS capture boards.
//!
//! A [`FrameAcquisitionLoop`] drives a [`Capture`] device: every step arms the
//! board, reads one padded bulk transfer, classifies the attempt and hands good
//! frames to a [`VideoSink`] and an [`AudioSink`]. Lost devices are reopened
//! automatically.

pub mod acquisition;
pub mod audio;
pub mod capture;
pub mod error;
pub mod layout;
pub mod rate;
pub mod sink;

pub use acquisition::{CaptureOutcome, FrameAcquisitionLoop, LoopStats, SessionState, StopHandle};
pub use audio::{AudioDispatcher, AudioOutput};
pub use capture::n3ds::parse::{DecodedFrame, FrameDemuxer, PanelCrop, Panels, TransferBuffer};
pub use capture::n3ds::N3dsDevice;
pub use capture::Capture;
pub use error::CaptureError;
pub use layout::{AuxProfiles, CaptureConstants, FrameLayout};
pub use rate::RateTracker;
pub use sink::{AudioSink, NullSink, VideoSink};
