//! The capture loop: arm, read, classify, forward, reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::capture::n3ds::parse::{FrameDemuxer, TransferBuffer};
use crate::capture::Capture;
use crate::error::CaptureError;
use crate::layout::{FrameLayout, RECONNECT_DELAY};
use crate::rate::{RateTracker, DEFAULT_CADENCE};
use crate::sink::{AudioSink, VideoSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Streaming,
}

/// Result of one capture attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The buffer holds a complete frame.
    Ok,
    /// Nothing usable this cycle; the session is still good.
    Skip(CaptureError),
    /// The session is broken and has to be reopened.
    Error(CaptureError),
}

impl CaptureOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CaptureOutcome::Ok)
    }
}

/// Classifies the arm command's result.
pub fn classify_arm(result: rusb::Result<usize>) -> Option<CaptureOutcome> {
    match result {
        Ok(_) => None,
        Err(rusb::Error::Timeout) => Some(CaptureOutcome::Skip(CaptureError::TransferTimeout)),
        Err(err) => Some(CaptureOutcome::Error(CaptureError::Transport(err))),
    }
}

/// Classifies a bulk read against the expected frame size.
pub fn classify_read(result: rusb::Result<usize>, frame_bytes: usize) -> CaptureOutcome {
    match result {
        Ok(len) if len >= frame_bytes => CaptureOutcome::Ok,
        Ok(len) => CaptureOutcome::Skip(CaptureError::ShortRead {
            got: len,
            expected: frame_bytes,
        }),
        Err(rusb::Error::Timeout) => CaptureOutcome::Skip(CaptureError::TransferTimeout),
        Err(err) => CaptureOutcome::Error(CaptureError::Transport(err)),
    }
}

/// Counters kept across sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub skips: u64,
    pub errors: u64,
    pub reconnects: u64,
}

/// Cloneable flag that ends [`FrameAcquisitionLoop::run`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct FrameAcquisitionLoop<D> {
    device: D,
    state: SessionState,
    buffer: TransferBuffer,
    demuxer: FrameDemuxer,
    rate: RateTracker,
    reconnect_delay: Duration,
    stop: StopHandle,
    stats: LoopStats,
    has_streamed: bool,
}

impl<D: Capture> FrameAcquisitionLoop<D> {
    pub fn new(device: D, layout: FrameLayout) -> Self {
        Self {
            device,
            state: SessionState::Disconnected,
            buffer: TransferBuffer::new(layout),
            demuxer: FrameDemuxer::new(layout),
            rate: RateTracker::new(DEFAULT_CADENCE, Instant::now()),
            reconnect_delay: RECONNECT_DELAY,
            stop: StopHandle::default(),
            stats: LoopStats::default(),
            has_streamed: false,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_rate_cadence(mut self, cadence: Duration) -> Self {
        self.rate = RateTracker::new(cadence, Instant::now());
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn layout(&self) -> &FrameLayout {
        self.buffer.layout()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Frames delivered in the current streaming session.
    pub fn session_frames(&self) -> u64 {
        self.rate.frames()
    }

    /// Opens the device if no session is held.
    pub fn connect(&mut self) -> bool {
        if self.state == SessionState::Streaming {
            return true;
        }

        self.state = SessionState::Connecting;
        match self.device.open() {
            Ok(layout) => {
                if self.has_streamed {
                    self.stats.reconnects += 1;
                }
                self.has_streamed = true;

                self.buffer.reset(layout);
                if *self.demuxer.layout() != layout {
                    self.demuxer = FrameDemuxer::new(layout);
                }
                self.rate.start(Instant::now());
                self.state = SessionState::Streaming;
                info!(
                    "Streaming, {} byte frames in {} byte transfers",
                    layout.frame_bytes(),
                    layout.transfer_size()
                );
                true
            }
            Err(err) => {
                debug!("capture device unavailable: {}", err);
                self.state = SessionState::Disconnected;
                false
            }
        }
    }

    /// Performs one capture attempt into the transfer buffer.
    ///
    /// Transport errors tear the session down before returning.
    pub fn acquire(&mut self) -> CaptureOutcome {
        if self.state != SessionState::Streaming {
            return CaptureOutcome::Error(CaptureError::Transport(rusb::Error::NoDevice));
        }

        let outcome = match classify_arm(self.device.arm_capture()) {
            Some(outcome) => outcome,
            None => {
                let frame_bytes = self.buffer.layout().frame_bytes();
                let result = self.device.read_raw(self.buffer.as_mut_slice());
                classify_read(result, frame_bytes)
            }
        };

        match outcome {
            CaptureOutcome::Ok => {}
            CaptureOutcome::Skip(reason) => {
                trace!("skipped frame: {}", reason);
                self.stats.skips += 1;
            }
            CaptureOutcome::Error(reason) => {
                warn!("capture failed, reconnecting: {}", reason);
                self.stats.errors += 1;
                self.close();
            }
        }

        outcome
    }

    /// Runs one loop iteration.
    ///
    /// Returns `None` when no device could be opened, otherwise the outcome of
    /// the capture attempt.
    pub fn step<V, A>(&mut self, video: &mut V, audio: &mut A) -> Option<CaptureOutcome>
    where
        V: VideoSink + ?Sized,
        A: AudioSink + ?Sized,
    {
        if self.state != SessionState::Streaming && !self.connect() {
            thread::sleep(self.reconnect_delay);
            return None;
        }

        let outcome = self.acquire();
        match outcome {
            CaptureOutcome::Ok => self.forward(video, audio),
            CaptureOutcome::Skip(_) => {
                video.skipped();
                // the average keeps decaying while nothing arrives
                self.report_rate(video);
            }
            CaptureOutcome::Error(_) => video.skipped(),
        }

        Some(outcome)
    }

    /// Steps until the stop handle is set.
    ///
    /// The session stays open; call [`close`](Self::close) once the sinks
    /// have been shut down.
    pub fn run<V, A>(&mut self, video: &mut V, audio: &mut A)
    where
        V: VideoSink + ?Sized,
        A: AudioSink + ?Sized,
    {
        while !self.stop.is_stopped() {
            self.step(video, audio);
        }
        info!(
            "Capture stopped: {} frames, {} skipped, {} errors, {} reconnects",
            self.stats.frames, self.stats.skips, self.stats.errors, self.stats.reconnects
        );
    }

    pub fn close(&mut self) {
        self.device.close();
        self.state = SessionState::Disconnected;
    }

    fn forward<V, A>(&mut self, video: &mut V, audio: &mut A)
    where
        V: VideoSink + ?Sized,
        A: AudioSink + ?Sized,
    {
        let frame = self.demuxer.decode(self.buffer.as_slice());

        match self.demuxer.rotate_and_split(frame.image) {
            Some(panels) => video.present(&panels),
            None => warn!("frame image region has the wrong size"),
        }
        audio.play(frame.audio);

        self.stats.frames += 1;
        self.rate.on_frame();
        self.report_rate(video);
    }

    fn report_rate<V: VideoSink + ?Sized>(&mut self, video: &mut V) {
        if let Some(fps) = self.rate.maybe_report(Instant::now()) {
            debug!("{:.2} FPS", fps);
            video.report_rate(fps);
        }
    }
}
