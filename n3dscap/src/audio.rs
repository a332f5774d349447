//! Audio hand-off from the acquisition loop to a playback thread.
//!
//! Writes to an audio device can block waiting for buffer space, so they run
//! on their own worker. The loop pushes chunks into a bounded FIFO and never
//! waits on it: when the worker falls behind the chunk is dropped.

use std::io;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use bytes::{Bytes, BytesMut};
use log::{debug, error, warn};

use crate::sink::AudioSink;

/// Frames of audio that may queue up before new chunks are dropped.
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Playback side of the queue. Runs on the worker thread.
pub trait AudioOutput: Send + 'static {
    /// Raw s16le stereo samples from one frame.
    fn write(&mut self, samples: &[u8]);

    /// Called once after the last chunk.
    fn finish(&mut self) {}
}

#[derive(Debug)]
pub enum AudioMessage {
    Chunk(Bytes),
    End,
}

/// Producer end of the audio queue, plus the worker it feeds.
pub struct AudioDispatcher {
    sender: SyncSender<AudioMessage>,
    worker: Option<JoinHandle<()>>,
    scratch: BytesMut,
    dropped: u64,
}

impl AudioDispatcher {
    pub fn spawn<O: AudioOutput>(output: O, depth: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(depth.max(1));
        let worker = thread::Builder::new()
            .name("n3dscap-audio".into())
            .spawn(move || run_worker(receiver, output))?;

        Ok(Self {
            sender,
            worker: Some(worker),
            scratch: BytesMut::new(),
            dropped: 0,
        })
    }

    /// Chunks discarded because the worker was behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Queues the end sentinel and waits for the worker to drain.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        // blocking send keeps the sentinel behind every queued chunk
        if self.sender.send(AudioMessage::End).is_err() {
            debug!("audio worker already gone");
        }

        if worker.join().is_err() {
            error!("audio worker panicked");
        }
    }
}

impl AudioSink for AudioDispatcher {
    fn play(&mut self, audio: &[u8]) {
        if self.worker.is_none() {
            return;
        }

        let chunk = next_chunk(&mut self.scratch, audio);
        match self.sender.try_send(AudioMessage::Chunk(chunk)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!("audio queue full, dropped chunk ({} total)", self.dropped);
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("audio worker stopped, discarding audio");
                self.worker = None;
            }
        }
    }
}

impl Drop for AudioDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Copies `audio` out of `scratch`.
///
/// Once the worker has dropped earlier chunks, their allocation is reused.
fn next_chunk(scratch: &mut BytesMut, audio: &[u8]) -> Bytes {
    scratch.reserve(audio.len());
    scratch.extend_from_slice(audio);
    scratch.split().freeze()
}

fn run_worker<O: AudioOutput>(receiver: Receiver<AudioMessage>, mut output: O) {
    while let Ok(message) = receiver.recv() {
        match message {
            AudioMessage::Chunk(samples) => output.write(&samples),
            AudioMessage::End => break,
        }
    }
    output.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        chunks: Arc<Mutex<Vec<Vec<u8>>>>,
        finished: Arc<Mutex<bool>>,
    }

    impl AudioOutput for Recorder {
        fn write(&mut self, samples: &[u8]) {
            self.chunks.lock().unwrap().push(samples.to_vec());
        }

        fn finish(&mut self) {
            *self.finished.lock().unwrap() = true;
        }
    }

    #[test]
    fn chunks_arrive_in_order_before_shutdown() {
        let recorder = Recorder::default();
        let mut dispatcher = AudioDispatcher::spawn(recorder.clone(), 64).unwrap();

        for i in 0..10u8 {
            dispatcher.play(&[i, i]);
        }
        dispatcher.shutdown();

        let chunks = recorder.chunks.lock().unwrap();
        let expected: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i, i]).collect();
        assert_eq!(*chunks, expected);
        assert!(*recorder.finished.lock().unwrap());
    }

    struct Blocked {
        gate: Arc<Barrier>,
        written: Arc<Mutex<usize>>,
    }

    impl AudioOutput for Blocked {
        fn write(&mut self, _samples: &[u8]) {
            let first = {
                let mut written = self.written.lock().unwrap();
                *written += 1;
                *written == 1
            };
            if first {
                self.gate.wait();
            }
        }
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let gate = Arc::new(Barrier::new(2));
        let written = Arc::new(Mutex::new(0));
        let output = Blocked {
            gate: gate.clone(),
            written: written.clone(),
        };
        let mut dispatcher = AudioDispatcher::spawn(output, 1).unwrap();

        // wait until the worker is stuck in its first write
        dispatcher.play(&[0]);
        while *written.lock().unwrap() == 0 {
            thread::yield_now();
        }

        dispatcher.play(&[1]);
        dispatcher.play(&[2]);
        dispatcher.play(&[3]);
        assert_eq!(dispatcher.dropped(), 2);

        gate.wait();
        dispatcher.shutdown();
        assert_eq!(*written.lock().unwrap(), 2);
    }

    #[test]
    fn drop_joins_worker() {
        let recorder = Recorder::default();
        {
            let mut dispatcher = AudioDispatcher::spawn(recorder.clone(), 4).unwrap();
            dispatcher.play(&[1, 2, 3, 4]);
        }
        assert!(*recorder.finished.lock().unwrap());
        assert_eq!(recorder.chunks.lock().unwrap().len(), 1);
    }

    #[test]
    fn released_chunks_are_reused() {
        let mut scratch = BytesMut::new();
        let first = next_chunk(&mut scratch, &[1; 64]);
        let address = first.as_ptr();
        drop(first);

        let second = next_chunk(&mut scratch, &[2; 64]);
        assert_eq!(second.as_ptr(), address);
        assert_eq!(&second[..], &[2; 64][..]);

        // a chunk still held by the worker is left alone
        let third = next_chunk(&mut scratch, &[3; 64]);
        assert_ne!(third.as_ptr(), second.as_ptr());
        assert_eq!(&second[..], &[2; 64][..]);
    }
}
