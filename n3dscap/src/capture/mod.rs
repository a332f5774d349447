pub mod n3ds;

use rusb::{Device, DeviceDescriptor, DeviceHandle, UsbContext};

use crate::error::CaptureError;
use crate::layout::FrameLayout;

/// A capture board session the acquisition loop can drive.
///
/// Control and bulk transfers are separate calls because the board may accept
/// the arm command while it still has no frame ready, and the reverse. Each
/// returns the raw rusb result so the caller can classify timeouts.
pub trait Capture {
    /// Finds, configures and arms the board. Returns the layout frames will
    /// have for this session.
    fn open(&mut self) -> Result<FrameLayout, CaptureError>;

    fn arm_capture(&mut self) -> rusb::Result<usize>;

    fn read_raw(&mut self, buffer: &mut [u8]) -> rusb::Result<usize>;

    fn read_config_register(&mut self, address: u8, count: usize) -> Option<Vec<u8>>;

    /// Releases the interface and handle. Calling it again is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Opens the first device matching `vid`/`pid`.
pub fn open_device<T: UsbContext>(
    context: &T,
    vid: u16,
    pid: u16,
) -> Result<(Device<T>, DeviceDescriptor, DeviceHandle<T>), CaptureError> {
    let devices = context.devices()?;

    for device in devices.iter() {
        let device_desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };

        if device_desc.vendor_id() == vid && device_desc.product_id() == pid {
            let handle = device.open()?;
            return Ok((device, device_desc, handle));
        }
    }

    Err(CaptureError::DeviceNotFound(vid, pid))
}
