//! Frame geometry and protocol constants for the N3DS capture board.

use std::time::Duration;

pub const VID_3DS: u16 = 0x16D0;
pub const PID_3DS: u16 = 0x06A3;
pub const DEFAULT_CONFIGURATION: u8 = 1;
pub const CAPTURE_INTERFACE: u8 = 0;
pub const EP2_IN: u8 = 0x80 | 2;

pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(30);
pub const EP2_TIMEOUT: Duration = Duration::from_millis(50);

/// Time the board needs after the first arm before data flows.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);
pub const RECONNECT_DELAY: Duration = Duration::from_millis(20);

/// High-speed bulk max packet size.
pub const MAX_PACKET_SIZE: usize = 512;

pub const FRAME_WIDTH: usize = 240;
pub const FRAME_HEIGHT: usize = 720;
pub const BYTES_PER_PIXEL: usize = 3;

pub const AUDIO_DATA_SIZE: usize = 0x88C;
pub const AUDIO_SAMPLE_RATE: u32 = 0x7FD8;
pub const AUDIO_CHANNELS: u16 = 2;

pub const N3DS_DISPLAY1_WIDTH: usize = 400;
pub const N3DS_DISPLAY2_WIDTH: usize = 320;

/// Rounds `len` up to the next multiple of `packet_size`.
///
/// Bulk reads must be sized in whole packets or the host controller reports
/// an overflow when the device sends its final packet.
pub const fn round_up_to_packet_multiple(len: usize, packet_size: usize) -> usize {
    assert!(packet_size > 0);
    len.div_ceil(packet_size) * packet_size
}

/// Shape of one raw frame as the board sends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: usize,
    pub height: usize,
    /// Audio bytes trailing the image. Differs between bitstream revisions.
    pub aux_bytes: usize,
    pub primary_width: usize,
    pub secondary_width: usize,
}

impl FrameLayout {
    pub fn with_aux_bytes(self, aux_bytes: usize) -> Self {
        Self { aux_bytes, ..self }
    }

    pub fn image_bytes(&self) -> usize {
        self.width * self.height * BYTES_PER_PIXEL
    }

    pub fn frame_bytes(&self) -> usize {
        self.image_bytes() + self.aux_bytes
    }

    pub fn transfer_size(&self) -> usize {
        round_up_to_packet_multiple(self.frame_bytes(), MAX_PACKET_SIZE)
    }

    /// Width and height of the image once rotated upright.
    pub fn rotated_size(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            aux_bytes: AUDIO_DATA_SIZE,
            primary_width: N3DS_DISPLAY1_WIDTH,
            secondary_width: N3DS_DISPLAY2_WIDTH,
        }
    }
}

/// Everything needed to find and talk to one board.
#[derive(Debug, Clone)]
pub struct CaptureConstants {
    pub vendor_id: u16,
    pub product_id: u16,
    pub configuration: u8,
    pub interface: u8,
    pub endpoint_in: u8,
    pub control_timeout: Duration,
    pub bulk_timeout: Duration,
    pub settle_delay: Duration,
    pub layout: FrameLayout,
}

impl Default for CaptureConstants {
    fn default() -> Self {
        Self {
            vendor_id: VID_3DS,
            product_id: PID_3DS,
            configuration: DEFAULT_CONFIGURATION,
            interface: CAPTURE_INTERFACE,
            endpoint_in: EP2_IN,
            control_timeout: CONTROL_TIMEOUT,
            bulk_timeout: EP2_TIMEOUT,
            settle_delay: SETTLE_DELAY,
            layout: FrameLayout::default(),
        }
    }
}

/// Audio payload size per bitstream version.
///
/// Firmware revisions changed the number of audio bytes appended to each
/// frame. The table is consulted once per session with the version read from
/// the board; a forced size overrides every lookup.
#[derive(Debug, Clone)]
pub struct AuxProfiles {
    entries: Vec<(u8, usize)>,
    fallback: usize,
    forced: Option<usize>,
}

impl AuxProfiles {
    pub fn new(fallback: usize) -> Self {
        Self {
            entries: Vec::new(),
            fallback,
            forced: None,
        }
    }

    /// Adds or replaces the size used for `version`.
    pub fn insert(&mut self, version: u8, aux_bytes: usize) {
        match self.entries.iter_mut().find(|(v, _)| *v == version) {
            Some(entry) => entry.1 = aux_bytes,
            None => self.entries.push((version, aux_bytes)),
        }
    }

    pub fn force(&mut self, aux_bytes: usize) {
        self.forced = Some(aux_bytes);
    }

    pub fn resolve(&self, version: Option<u8>) -> usize {
        if let Some(forced) = self.forced {
            return forced;
        }

        version
            .and_then(|version| {
                self.entries
                    .iter()
                    .find(|(v, _)| *v == version)
                    .map(|(_, size)| *size)
            })
            .unwrap_or(self.fallback)
    }

    pub fn is_known(&self, version: u8) -> bool {
        self.forced.is_some() || self.entries.iter().any(|(v, _)| *v == version)
    }
}

impl Default for AuxProfiles {
    fn default() -> Self {
        Self::new(AUDIO_DATA_SIZE)
    }
}
