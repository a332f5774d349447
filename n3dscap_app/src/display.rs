use log::{error, info, warn};

use n3dscap::{Panels, StopHandle, VideoSink};

use crate::snapshot::Snapshot;

/// Skipped attempts in a row before the picture counts as lost (about half a
/// second at 60 Hz).
const BLANK_AFTER_SKIPS: u32 = 30;

pub fn window_title(fps: f64) -> String {
    format!("N3DS Capture ({fps:.2} FPS)")
}

/// Video sink for running without a window.
///
/// Tracks whether a picture is being received, keeps the title string a window
/// would show, and writes snapshots on request.
#[derive(Default)]
pub struct HeadlessDisplay {
    title: String,
    presented: u64,
    skipped_in_row: u32,
    blank: bool,
    snapshot: Snapshot,
    stop_after_snapshot: Option<StopHandle>,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self {
            title: window_title(0.0),
            ..Self::default()
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// True while the display would show a blank screen.
    pub fn is_blank(&self) -> bool {
        self.blank
    }

    pub fn snapshot_mut(&mut self) -> &mut Snapshot {
        &mut self.snapshot
    }

    /// Stops the capture loop once the pending snapshot is written.
    pub fn stop_after_snapshot(&mut self, stop: StopHandle) {
        self.stop_after_snapshot = Some(stop);
    }
}

impl VideoSink for HeadlessDisplay {
    fn present(&mut self, panels: &Panels<'_>) {
        self.presented += 1;
        self.skipped_in_row = 0;
        if self.blank {
            info!("Picture restored");
            self.blank = false;
        }

        if self.snapshot.is_pending() {
            if let Err(err) = self.snapshot.capture(panels) {
                error!("could not save snapshot: {}", err);
            }
            if let Some(stop) = self.stop_after_snapshot.take() {
                stop.stop();
            }
        }
    }

    fn skipped(&mut self) {
        self.skipped_in_row = self.skipped_in_row.saturating_add(1);
        if !self.blank && self.skipped_in_row >= BLANK_AFTER_SKIPS {
            warn!("No picture from capture board");
            self.blank = true;
        }
    }

    fn report_rate(&mut self, fps: f64) {
        self.title = window_title(fps);
        info!("{}", self.title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n3dscap::{FrameDemuxer, FrameLayout};

    #[test]
    fn title_format() {
        assert_eq!(window_title(59.8734), "N3DS Capture (59.87 FPS)");
        assert_eq!(HeadlessDisplay::new().title(), "N3DS Capture (0.00 FPS)");
    }

    #[test]
    fn blank_after_sustained_skips() {
        let mut display = HeadlessDisplay::new();
        for _ in 0..BLANK_AFTER_SKIPS - 1 {
            display.skipped();
        }
        assert!(!display.is_blank());
        display.skipped();
        assert!(display.is_blank());

        let mut demuxer = FrameDemuxer::new(FrameLayout::default());
        let raw = vec![0u8; FrameLayout::default().image_bytes()];
        let panels = demuxer.rotate_and_split(&raw).unwrap();
        display.present(&panels);
        assert!(!display.is_blank());
        assert_eq!(display.presented(), 1);
    }

    #[test]
    fn rate_updates_title() {
        let mut display = HeadlessDisplay::new();
        display.report_rate(60.0);
        assert_eq!(display.title(), "N3DS Capture (60.00 FPS)");
    }

    #[test]
    fn snapshot_stops_loop() {
        let mut demuxer = FrameDemuxer::new(FrameLayout::default());
        let raw = vec![0u8; FrameLayout::default().image_bytes()];
        let panels = demuxer.rotate_and_split(&raw).unwrap();

        let path =
            std::env::temp_dir().join(format!("n3dscap-display-{}.png", std::process::id()));
        let stop = StopHandle::default();
        let mut display = HeadlessDisplay::new();
        display.snapshot_mut().request(&path);
        display.stop_after_snapshot(stop.clone());

        display.present(&panels);
        assert!(stop.is_stopped());
        assert_eq!(display.snapshot_mut().saved(), Some(path.as_path()));
        std::fs::remove_file(&path).unwrap();
    }
}
