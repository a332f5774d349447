use bytes::BytesMut;
use image::{imageops, ImageBuffer, Rgb, RgbImage, SubImage};

use crate::layout::FrameLayout;

// One transfer, no headers or sync markers:
//
// | image: 240 x 720 x RGB24, row-major, rotated 90 degrees | audio: s16le stereo | padding |
//
// Rotated upright the image is 720 x 240 with the top screen (400) on the left
// and the bottom screen (320) on the right.

/// Reusable receive buffer padded to whole bulk packets.
pub struct TransferBuffer {
    data: BytesMut,
    layout: FrameLayout,
}

impl TransferBuffer {
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            data: BytesMut::zeroed(layout.transfer_size()),
            layout,
        }
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Resizes for a new session layout. Keeps the allocation when the size
    /// is unchanged.
    pub fn reset(&mut self, layout: FrameLayout) {
        if layout.transfer_size() != self.data.len() {
            self.data = BytesMut::zeroed(layout.transfer_size());
        }
        self.layout = layout;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Image and audio views over one received frame.
#[derive(Debug, Clone, Copy)]
pub struct DecodedFrame<'a> {
    pub image: &'a [u8],
    pub audio: &'a [u8],
}

/// Splits a raw transfer into its image and audio regions.
pub fn split_capture_buffer<'a>(layout: &FrameLayout, data: &'a [u8]) -> DecodedFrame<'a> {
    let frame_bytes = layout.frame_bytes();
    assert!(
        data.len() >= frame_bytes,
        "capture buffer holds {} bytes, frame needs {}",
        data.len(),
        frame_bytes
    );

    let (image, rest) = data[..frame_bytes].split_at(layout.image_bytes());
    DecodedFrame { image, audio: rest }
}

/// A rectangle on the upright frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelCrop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PanelCrop {
    /// Top screen: left edge of the upright frame, full height.
    pub fn primary(layout: &FrameLayout) -> Self {
        let (_, height) = layout.rotated_size();
        Self {
            x: 0,
            y: 0,
            width: layout.primary_width as u32,
            height: height as u32,
        }
    }

    /// Bottom screen, centered in the width left over after the top screen.
    pub fn secondary(layout: &FrameLayout) -> Self {
        let (width, height) = layout.rotated_size();
        let remaining = width.saturating_sub(layout.primary_width);
        let margin = remaining.saturating_sub(layout.secondary_width) / 2;
        Self {
            x: (layout.primary_width + margin) as u32,
            y: 0,
            width: layout.secondary_width.min(remaining) as u32,
            height: height as u32,
        }
    }
}

/// Both screens of one frame, borrowed from the demuxer's rotation buffer.
pub struct Panels<'a> {
    pub primary: SubImage<&'a RgbImage>,
    pub secondary: SubImage<&'a RgbImage>,
    pub primary_crop: PanelCrop,
    pub secondary_crop: PanelCrop,
}

/// Turns raw transfers into upright panel views.
///
/// Holds one upright image that is overwritten for every frame, so no
/// allocation happens after construction.
pub struct FrameDemuxer {
    layout: FrameLayout,
    upright: RgbImage,
    primary: PanelCrop,
    secondary: PanelCrop,
}

impl FrameDemuxer {
    pub fn new(layout: FrameLayout) -> Self {
        let (width, height) = layout.rotated_size();
        Self {
            layout,
            upright: RgbImage::new(width as u32, height as u32),
            primary: PanelCrop::primary(&layout),
            secondary: PanelCrop::secondary(&layout),
        }
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn crops(&self) -> (PanelCrop, PanelCrop) {
        (self.primary, self.secondary)
    }

    pub fn decode<'a>(&self, data: &'a [u8]) -> DecodedFrame<'a> {
        split_capture_buffer(&self.layout, data)
    }

    /// Rotates `image` 90 degrees counter-clockwise and crops both screens.
    ///
    /// Returns `None` when `image` is not exactly one image region.
    pub fn rotate_and_split(&mut self, image: &[u8]) -> Option<Panels<'_>> {
        if image.len() != self.layout.image_bytes() {
            return None;
        }

        let source = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(
            self.layout.width as u32,
            self.layout.height as u32,
            image,
        )?;
        imageops::rotate270_in(&source, &mut self.upright).ok()?;

        let primary = self.primary;
        let secondary = self.secondary;
        Some(Panels {
            primary: imageops::crop_imm(
                &self.upright,
                primary.x,
                primary.y,
                primary.width,
                primary.height,
            ),
            secondary: imageops::crop_imm(
                &self.upright,
                secondary.x,
                secondary.y,
                secondary.width,
                secondary.height,
            ),
            primary_crop: primary,
            secondary_crop: secondary,
        })
    }
}
