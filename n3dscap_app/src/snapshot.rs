use std::path::{Path, PathBuf};

use image::{imageops, GenericImageView, ImageResult, RgbImage};
use log::info;

use n3dscap::Panels;

/// Lays both screens out the way the console does: top screen above, bottom
/// screen centered below it.
pub fn compose_panels(panels: &Panels<'_>) -> RgbImage {
    let (top_width, top_height) = panels.primary.dimensions();
    let (bottom_width, bottom_height) = panels.secondary.dimensions();

    let width = top_width.max(bottom_width);
    let mut canvas = RgbImage::new(width, top_height + bottom_height);

    imageops::replace(
        &mut canvas,
        &*panels.primary,
        ((width - top_width) / 2) as i64,
        0,
    );
    imageops::replace(
        &mut canvas,
        &*panels.secondary,
        ((width - bottom_width) / 2) as i64,
        top_height as i64,
    );

    canvas
}

/// Saves the next presented frame to a file.
#[derive(Debug, Default)]
pub struct Snapshot {
    pending: Option<PathBuf>,
    saved: Option<PathBuf>,
}

impl Snapshot {
    pub fn request(&mut self, path: impl Into<PathBuf>) {
        self.pending = Some(path.into());
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Path of the last image written.
    pub fn saved(&self) -> Option<&Path> {
        self.saved.as_deref()
    }

    /// Writes `panels` if a snapshot was requested.
    pub fn capture(&mut self, panels: &Panels<'_>) -> ImageResult<()> {
        let Some(path) = self.pending.take() else {
            return Ok(());
        };

        compose_panels(panels).save(&path)?;
        info!("Saved snapshot to {}", path.display());
        self.saved = Some(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n3dscap::{FrameDemuxer, FrameLayout};

    fn panels_image(demuxer: &mut FrameDemuxer) -> RgbImage {
        let layout = *demuxer.layout();
        // left half of every source row red, right half blue
        let mut image = Vec::with_capacity(layout.image_bytes());
        for _y in 0..layout.height {
            for x in 0..layout.width {
                if x < layout.width / 2 {
                    image.extend_from_slice(&[255, 0, 0]);
                } else {
                    image.extend_from_slice(&[0, 0, 255]);
                }
            }
        }
        let panels = demuxer.rotate_and_split(&image).unwrap();
        compose_panels(&panels)
    }

    #[test]
    fn composite_stacks_screens() {
        let mut demuxer = FrameDemuxer::new(FrameLayout::default());
        let image = panels_image(&mut demuxer);

        assert_eq!(image.dimensions(), (400, 480));
        // source column 239 is blue and lands on the top row after rotation
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(image.get_pixel(0, 239).0, [255, 0, 0]);
        // bottom screen is inset by 40 on each side
        assert_eq!(image.get_pixel(39, 240).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(40, 240).0, [0, 0, 255]);
        assert_eq!(image.get_pixel(359, 479).0, [255, 0, 0]);
        assert_eq!(image.get_pixel(360, 479).0, [0, 0, 0]);
    }

    #[test]
    fn capture_without_request_does_nothing() {
        let mut demuxer = FrameDemuxer::new(FrameLayout::default());
        let raw = vec![0u8; FrameLayout::default().image_bytes()];
        let panels = demuxer.rotate_and_split(&raw).unwrap();

        let mut snapshot = Snapshot::default();
        snapshot.capture(&panels).unwrap();
        assert!(snapshot.saved().is_none());
    }

    #[test]
    fn capture_writes_png_once() {
        let mut demuxer = FrameDemuxer::new(FrameLayout::default());
        let raw = vec![0x40u8; FrameLayout::default().image_bytes()];
        let panels = demuxer.rotate_and_split(&raw).unwrap();

        let path =
            std::env::temp_dir().join(format!("n3dscap-snapshot-{}.png", std::process::id()));
        let mut snapshot = Snapshot::default();
        snapshot.request(&path);
        assert!(snapshot.is_pending());

        snapshot.capture(&panels).unwrap();
        assert!(!snapshot.is_pending());
        assert_eq!(snapshot.saved(), Some(path.as_path()));

        let written = image::open(&path).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (400, 480));
        assert_eq!(written.get_pixel(200, 100).0, [0x40; 3]);

        std::fs::remove_file(&path).unwrap();
    }
}
