//! Loopy's N3DS capture board (FX2 + FPGA, vendor protocol on endpoint 2).

use std::thread;

use log::{debug, info, warn};
use rusb::{Context, Device, DeviceHandle, Direction, Recipient, RequestType, UsbContext};

use super::{open_device, Capture};
use crate::error::CaptureError;
use crate::layout::{AuxProfiles, CaptureConstants, FrameLayout};

pub mod parse;

pub const CMDIN_I2C_READ: u8 = 0x21;
pub const CMDOUT_I2C_WRITE: u8 = 0x21;
pub const CMDOUT_CAPTURE_START: u8 = 0x40;

pub const I2CADDR_3DSCONFIG: u16 = 0x14;
pub const N3DSCFG_BITSTREAM_VER: u8 = 1;

/// Largest register block a single I2C read may return.
pub const MAX_CONFIG_READ: usize = 256;

struct Session {
    handle: DeviceHandle<Context>,
    interface: Option<u8>,
}

/// A session with one N3DS capture board.
pub struct N3dsDevice {
    constants: CaptureConstants,
    profiles: AuxProfiles,
    context: Option<Context>,
    session: Option<Session>,
}

impl N3dsDevice {
    pub fn new(constants: CaptureConstants, profiles: AuxProfiles) -> Self {
        Self {
            constants,
            profiles,
            context: None,
            session: None,
        }
    }

    pub fn constants(&self) -> &CaptureConstants {
        &self.constants
    }

    /// Bitstream version byte from the board's config registers.
    pub fn firmware_version(&mut self) -> Option<u8> {
        self.read_config_register(N3DSCFG_BITSTREAM_VER, 1)
            .and_then(|bytes| bytes.first().copied())
    }

    fn context(&mut self) -> Result<&Context, CaptureError> {
        let context = match self.context.take() {
            Some(context) => context,
            None => Context::new()?,
        };
        let context: &Context = self.context.insert(context);
        Ok(context)
    }

    fn vend_out(&self, request: u8, value: u16, data: &[u8]) -> rusb::Result<usize> {
        let session = self.session.as_ref().ok_or(rusb::Error::NoDevice)?;
        let request_type =
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        session.handle.write_control(
            request_type,
            request,
            value,
            0,
            data,
            self.constants.control_timeout,
        )
    }

    fn vend_in(&self, request: u8, value: u16, buf: &mut [u8]) -> rusb::Result<usize> {
        let session = self.session.as_ref().ok_or(rusb::Error::NoDevice)?;
        let request_type =
            rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device);
        session.handle.read_control(
            request_type,
            request,
            value,
            0,
            buf,
            self.constants.control_timeout,
        )
    }

    fn connect(&mut self) -> Result<(), CaptureError> {
        let vid = self.constants.vendor_id;
        let pid = self.constants.product_id;
        let configuration = self.constants.configuration;
        let interface = self.constants.interface;

        let (device, _device_desc, handle) = open_device(self.context()?, vid, pid)?;
        info!("Opened {:04x}:{:04x}", vid, pid);

        // not supported on every platform, the claim below reports real conflicts
        if let Ok(true) = handle.kernel_driver_active(interface) {
            if let Err(err) = handle.detach_kernel_driver(interface) {
                warn!("could not detach kernel driver: {}", err);
            }
        }

        handle
            .set_active_configuration(configuration)
            .map_err(|err| CaptureError::Configuration(configuration, err))?;

        if !has_interface(&device, interface) {
            return Err(CaptureError::InterfaceNotFound(interface));
        }

        handle
            .claim_interface(interface)
            .map_err(|err| CaptureError::InterfaceClaimFailed(interface, err))?;

        self.session = Some(Session {
            handle,
            interface: Some(interface),
        });

        Ok(())
    }

    fn resolve_layout(&mut self) -> FrameLayout {
        let version = self.firmware_version();
        let aux_bytes = self.profiles.resolve(version);

        match version {
            Some(version) if self.profiles.is_known(version) => {
                info!("Bitstream version {}, {} audio bytes per frame", version, aux_bytes)
            }
            Some(version) => warn!(
                "Unknown bitstream version {}, assuming {} audio bytes per frame",
                version, aux_bytes
            ),
            None => warn!(
                "Could not read bitstream version, assuming {} audio bytes per frame",
                aux_bytes
            ),
        }

        self.constants.layout.with_aux_bytes(aux_bytes)
    }
}

/// Checks a register read length against what one I2C read can return.
fn config_read_len(count: usize) -> Option<usize> {
    (1..=MAX_CONFIG_READ).contains(&count).then_some(count)
}

fn has_interface<T: UsbContext>(device: &Device<T>, number: u8) -> bool {
    let config = match device.active_config_descriptor() {
        Ok(config) => config,
        Err(err) => {
            debug!("no active config descriptor: {}", err);
            return false;
        }
    };

    config.interfaces().any(|iface| iface.number() == number)
}

impl Capture for N3dsDevice {
    fn open(&mut self) -> Result<FrameLayout, CaptureError> {
        self.close();

        if let Err(err) = self.connect() {
            self.close();
            return Err(err);
        }

        if let Err(err) = self.arm_capture() {
            self.close();
            return Err(CaptureError::Transport(err));
        }
        thread::sleep(self.constants.settle_delay);

        Ok(self.resolve_layout())
    }

    fn arm_capture(&mut self) -> rusb::Result<usize> {
        self.vend_out(CMDOUT_CAPTURE_START, 0, &[])
    }

    fn read_raw(&mut self, buffer: &mut [u8]) -> rusb::Result<usize> {
        let session = self.session.as_ref().ok_or(rusb::Error::NoDevice)?;
        session
            .handle
            .read_bulk(self.constants.endpoint_in, buffer, self.constants.bulk_timeout)
    }

    fn read_config_register(&mut self, address: u8, count: usize) -> Option<Vec<u8>> {
        let Some(count) = config_read_len(count) else {
            debug!("rejecting config read of {} bytes", count);
            return None;
        };

        if let Err(err) = self.vend_out(CMDOUT_I2C_WRITE, I2CADDR_3DSCONFIG, &[address]) {
            debug!("config address write failed: {}", err);
            return None;
        }

        let mut buf = vec![0u8; count];
        match self.vend_in(CMDIN_I2C_READ, I2CADDR_3DSCONFIG, &mut buf) {
            Ok(read) if read == count => {
                debug!("config register {:#04x}: {}", address, hex::encode(&buf));
                Some(buf)
            }
            Ok(read) => {
                debug!("config read returned {} of {} bytes", read, count);
                None
            }
            Err(err) => {
                debug!("config read failed: {}", err);
                None
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Some(interface) = session.interface.take() {
                // fails harmlessly when the device is already gone
                if let Err(err) = session.handle.release_interface(interface) {
                    debug!("release interface {}: {}", interface, err);
                }
            }
            info!("Closed capture device");
        }
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for N3dsDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl Default for N3dsDevice {
    fn default() -> Self {
        Self::new(CaptureConstants::default(), AuxProfiles::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_read_length_bounds() {
        assert_eq!(config_read_len(0), None);
        assert_eq!(config_read_len(1), Some(1));
        assert_eq!(config_read_len(MAX_CONFIG_READ), Some(256));
        assert_eq!(config_read_len(MAX_CONFIG_READ + 1), None);
    }

    #[test]
    fn closed_device_reads_nothing() {
        let mut device = N3dsDevice::default();
        assert!(!device.is_open());
        assert_eq!(device.read_config_register(N3DSCFG_BITSTREAM_VER, 1), None);
        device.close();
        device.close();
        assert!(!device.is_open());
    }
}
