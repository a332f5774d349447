use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, info, warn};
use ringbuf::{HeapProducer, HeapRb};
use simple_error::SimpleError;

use n3dscap::layout::{AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};
use n3dscap::AudioOutput;

/// Extra buffering between capture and the output device.
const LATENCY_MS: f32 = 150.0;

/// Converts s16le interleaved capture audio to the output format.
///
/// Resamples by stepping through source frames at `source_rate / output_rate`
/// and maps the two capture channels onto however many the device has.
pub struct PcmConverter {
    step: f64,
    position: f64,
    output_channels: usize,
}

impl PcmConverter {
    pub fn new(source_rate: u32, output_rate: u32, output_channels: usize) -> Self {
        Self {
            step: source_rate as f64 / output_rate.max(1) as f64,
            position: 0.0,
            output_channels: output_channels.max(1),
        }
    }

    pub fn convert(&mut self, samples: &[u8], mut emit: impl FnMut(f32)) {
        let source_channels = AUDIO_CHANNELS as usize;
        let frame_size = 2 * source_channels;
        let frames = samples.len() / frame_size;

        while (self.position as usize) < frames {
            let offset = self.position as usize * frame_size;
            let left = sample_at(samples, offset);
            let right = sample_at(samples, offset + 2);

            match self.output_channels {
                1 => emit((left + right) * 0.5),
                channels => {
                    emit(left);
                    emit(right);
                    for _ in 2..channels {
                        emit(0.0);
                    }
                }
            }

            self.position += self.step;
        }
        // carry the fractional position into the next chunk
        self.position -= frames as f64;
    }
}

fn sample_at(samples: &[u8], offset: usize) -> f32 {
    let value = i16::from_le_bytes([samples[offset], samples[offset + 1]]);
    value as f32 / i16::MAX as f32
}

/// Worker-side half of the cpal output: converts and queues samples.
pub struct RingOutput {
    producer: HeapProducer<f32>,
    converter: PcmConverter,
    overflowed: bool,
}

impl AudioOutput for RingOutput {
    fn write(&mut self, samples: &[u8]) {
        let producer = &mut self.producer;
        let mut overflow = false;
        self.converter.convert(samples, |sample| {
            if producer.push(sample).is_err() {
                overflow = true;
            }
        });

        if overflow && !self.overflowed {
            debug!("audio output is behind, dropping samples");
        }
        self.overflowed = overflow;
    }

    fn finish(&mut self) {
        debug!("audio worker finished");
    }
}

/// Opens the default output device.
///
/// The returned stream must stay alive on the calling thread; the
/// [`RingOutput`] goes to the audio worker.
pub fn open_output() -> Result<(cpal::Stream, RingOutput), SimpleError> {
    let host = cpal::default_host();
    let output_device = host
        .default_output_device()
        .ok_or_else(|| SimpleError::new("no audio output device"))?;

    let config: cpal::StreamConfig = output_device
        .default_output_config()
        .map_err(SimpleError::from)?
        .into();

    let latency_frames = (LATENCY_MS / 1_000.0) * config.sample_rate.0 as f32;
    let latency_samples = latency_frames as usize * config.channels as usize;

    let ring = HeapRb::<f32>::new(latency_samples * 2);
    let (mut producer, mut consumer) = ring.split();

    prefill_silence(&mut producer, latency_samples)?;

    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        for sample in data {
            // underruns play silence, which is also what a disconnect sounds like
            *sample = consumer.pop().unwrap_or(0.0);
        }
    };

    let output_stream = output_device
        .build_output_stream(&config, output_data_fn, err_fn, None)
        .map_err(SimpleError::from)?;
    output_stream.play().map_err(SimpleError::from)?;

    info!(
        "Audio output at {} Hz, {} channels",
        config.sample_rate.0, config.channels
    );

    let converter = PcmConverter::new(
        AUDIO_SAMPLE_RATE,
        config.sample_rate.0,
        config.channels as usize,
    );

    Ok((
        output_stream,
        RingOutput {
            producer,
            converter,
            overflowed: false,
        },
    ))
}

/// Queues `samples` of silence ahead of the first captured audio.
fn prefill_silence(producer: &mut HeapProducer<f32>, samples: usize) -> Result<(), SimpleError> {
    let pushed = producer.push_iter(&mut std::iter::repeat(0.0).take(samples));
    if pushed < samples {
        return Err(SimpleError::new(format!(
            "audio buffer holds {} of {} latency samples",
            pushed, samples
        )));
    }
    Ok(())
}

fn err_fn(err: cpal::StreamError) {
    warn!("an error occurred on the audio stream: {}", err);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(frames: &[(i16, i16)]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|(l, r)| l.to_le_bytes().into_iter().chain(r.to_le_bytes()))
            .collect()
    }

    fn run(converter: &mut PcmConverter, samples: &[u8]) -> Vec<f32> {
        let mut out = Vec::new();
        converter.convert(samples, |s| out.push(s));
        out
    }

    #[test]
    fn same_rate_stereo_passes_through() {
        let mut converter = PcmConverter::new(32728, 32728, 2);
        let out = run(&mut converter, &pcm(&[(i16::MAX, 0), (0, -i16::MAX)]));
        assert_eq!(out, vec![1.0, 0.0, 0.0, -1.0]);
    }

    #[test]
    fn mono_output_averages() {
        let mut converter = PcmConverter::new(48000, 48000, 1);
        let out = run(&mut converter, &pcm(&[(i16::MAX, i16::MAX), (i16::MAX, 0)]));
        assert_eq!(out, vec![1.0, 0.5]);
    }

    #[test]
    fn extra_channels_are_silent() {
        let mut converter = PcmConverter::new(48000, 48000, 4);
        let out = run(&mut converter, &pcm(&[(i16::MAX, i16::MAX)]));
        assert_eq!(out, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn upsampling_produces_more_frames() {
        // one frame of capture audio is 547 stereo samples
        let chunk = pcm(&[(100, 100); 547]);
        let mut converter = PcmConverter::new(32728, 48000, 2);

        let total: usize = (0..60).map(|_| run(&mut converter, &chunk).len()).sum();
        let expected = 547.0 * 60.0 * 48000.0 / 32728.0 * 2.0;
        assert!((total as f64 - expected).abs() <= 4.0, "total={total}");
    }

    #[test]
    fn prefill_fits_latency_buffer() {
        let (mut producer, consumer) = HeapRb::<f32>::new(8).split();
        prefill_silence(&mut producer, 4).unwrap();
        assert_eq!(consumer.len(), 4);
        assert!(consumer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn prefill_larger_than_buffer_fails() {
        let (mut producer, _consumer) = HeapRb::<f32>::new(4).split();
        assert!(prefill_silence(&mut producer, 5).is_err());
    }

    #[test]
    fn trailing_partial_frame_is_ignored() {
        let mut converter = PcmConverter::new(48000, 48000, 2);
        let mut samples = pcm(&[(1, 1)]);
        samples.push(0xFF);
        assert_eq!(run(&mut converter, &samples).len(), 2);
    }
}
