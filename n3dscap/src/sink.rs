use crate::capture::n3ds::parse::Panels;

/// Receives both screens of every good frame.
///
/// The panels borrow the capture buffer, which is overwritten on the next
/// acquisition. Copy anything needed after `present` returns.
pub trait VideoSink {
    fn present(&mut self, panels: &Panels<'_>);

    /// A capture attempt produced nothing usable.
    fn skipped(&mut self) {}

    /// Average frames per second since streaming started.
    fn report_rate(&mut self, _fps: f64) {}
}

/// Receives the audio region of every good frame.
pub trait AudioSink {
    fn play(&mut self, audio: &[u8]);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl VideoSink for NullSink {
    fn present(&mut self, _panels: &Panels<'_>) {}
}

impl AudioSink for NullSink {
    fn play(&mut self, _audio: &[u8]) {}
}

impl<S: VideoSink + ?Sized> VideoSink for &mut S {
    fn present(&mut self, panels: &Panels<'_>) {
        (**self).present(panels)
    }

    fn skipped(&mut self) {
        (**self).skipped()
    }

    fn report_rate(&mut self, fps: f64) {
        (**self).report_rate(fps)
    }
}

impl<S: AudioSink + ?Sized> AudioSink for &mut S {
    fn play(&mut self, audio: &[u8]) {
        (**self).play(audio)
    }
}

impl<S: AudioSink> AudioSink for Option<S> {
    fn play(&mut self, audio: &[u8]) {
        if let Some(sink) = self {
            sink.play(audio)
        }
    }
}
