use thiserror::Error;

/// Failures seen while talking to a capture board.
///
/// Only some of these are fatal to a session. Timeouts and short reads are
/// reported through [`CaptureOutcome::Skip`](crate::CaptureOutcome::Skip) and
/// never cause a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("device {0:04x}:{1:04x} not found")]
    DeviceNotFound(u16, u16),

    #[error("could not select configuration {0}: {1}")]
    Configuration(u8, rusb::Error),

    #[error("interface {0} not present on device")]
    InterfaceNotFound(u8),

    #[error("could not claim interface {0}: {1}")]
    InterfaceClaimFailed(u8, rusb::Error),

    #[error("transfer timed out")]
    TransferTimeout,

    #[error("short read: got {got} of {expected} bytes")]
    ShortRead { got: usize, expected: usize },

    #[error("usb transport error: {0}")]
    Transport(#[from] rusb::Error),
}

impl CaptureError {
    /// Errors a session survives without being torn down.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CaptureError::TransferTimeout | CaptureError::ShortRead { .. }
        )
    }
}
