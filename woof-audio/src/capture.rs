use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, Stream, StreamConfig, SupportedBufferSize};
use woof_protocol::AudioFrame;

use crate::error::AudioError;

/// A bounded history of captured frames, shared between the `cpal` callback
/// thread and any reader. Readers only ever get cloned snapshots out; the
/// lock is never held across anything but a `VecDeque` push or copy.
pub struct RingBuffer {
    frames: Mutex<VecDeque<AudioFrame>>,
    capacity: usize,
    sample_rate: u32,
    chunk_size: usize,
}

impl RingBuffer {
    pub fn new(buffer_seconds: f64, sample_rate: u32, chunk_size: usize) -> Self {
        let frame_seconds = chunk_size as f64 / f64::from(sample_rate);
        let capacity = ((buffer_seconds / frame_seconds).ceil() as usize).max(1);
        RingBuffer {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            sample_rate,
            chunk_size,
        }
    }

    pub fn push(&self, frame: AudioFrame) {
        let mut frames = self.frames.lock().unwrap();
        if frames.len() >= self.capacity {
            frames.pop_front();
        }
        frames.push_back(frame);
    }

    /// Most recent `n` frames, oldest first.
    pub fn get_recent_frames(&self, n: usize) -> Vec<AudioFrame> {
        let frames = self.frames.lock().unwrap();
        let start = frames.len().saturating_sub(n);
        frames.iter().skip(start).cloned().collect()
    }

    /// Every frame with `timestamp_micros >= since`.
    pub fn get_frames_since(&self, since: u64) -> Vec<AudioFrame> {
        let frames = self.frames.lock().unwrap();
        frames
            .iter()
            .filter(|f| f.timestamp_micros >= since)
            .cloned()
            .collect()
    }

    /// The buffer concatenated into a single mono `f32` snapshot. `seconds`
    /// limits the result to that many trailing seconds; `None` returns the
    /// whole buffer.
    pub fn get_buffer_as_array(&self, seconds: Option<f64>) -> Vec<f32> {
        let frames = self.frames.lock().unwrap();
        let start = match seconds {
            None => 0,
            Some(secs) => {
                let frame_seconds = self.chunk_size as f64 / f64::from(self.sample_rate);
                let n = ((secs / frame_seconds).ceil() as usize).max(1);
                frames.len().saturating_sub(n)
            }
        };
        frames
            .iter()
            .skip(start)
            .flat_map(|f| f.to_mono_f32())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub struct Capture {
    ring: Arc<RingBuffer>,
    error: Arc<AtomicBool>,
    // kept alive for the duration of capture; dropping stops the stream
    _stream: Stream,
}

fn find_device(
    host: &cpal::Host,
    name_substring: Option<&str>,
) -> Result<cpal::Device, AudioError> {
    let Some(needle) = name_substring else {
        return host.default_input_device().ok_or(AudioError::DeviceNotFound);
    };

    let needle = needle.to_ascii_lowercase();
    host.input_devices()?
        .find(|d| {
            d.name()
                .map(|n| n.to_ascii_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .ok_or(AudioError::DeviceNotFound)
}

fn stream_config_for(
    device: &cpal::Device,
    channels: u16,
    sample_rate: u32,
    chunk_size: usize,
) -> Result<StreamConfig, AudioError> {
    let configs = device.supported_input_configs()?;

    let config = configs
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() == channels)
        .next()
        .ok_or(AudioError::NoSupportedStreamConfig)?;

    let buffer_size = match config.buffer_size() {
        SupportedBufferSize::Range { min, .. } => std::cmp::max(*min, chunk_size as u32),
        SupportedBufferSize::Unknown => chunk_size as u32,
    };

    Ok(StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: BufferSize::Fixed(buffer_size),
    })
}

impl Capture {
    pub fn start(
        device_name: Option<&str>,
        sample_rate: u32,
        channels: u16,
        chunk_size: usize,
        buffer_seconds: f64,
    ) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = find_device(&host, device_name)?;
        let config = stream_config_for(&device, channels, sample_rate, chunk_size)?;

        let ring = Arc::new(RingBuffer::new(buffer_seconds, sample_rate, chunk_size));
        let error = Arc::new(AtomicBool::new(false));

        let stream = {
            let ring = ring.clone();
            let mut initialized_thread = false;

            device.build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if !initialized_thread {
                        woof_util::thread::set_name("woof/capture");
                        initialized_thread = true;
                    }

                    let timestamp_micros = woof_util::time::now_micros();
                    let pcm: Vec<i16> = data
                        .iter()
                        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();

                    ring.push(AudioFrame {
                        timestamp_micros,
                        pcm,
                        channels,
                        sample_rate,
                    });
                },
                {
                    let error = error.clone();
                    move |err| {
                        log::error!("capture stream error: {err:?}");
                        error.store(true, Ordering::Relaxed);
                    }
                },
                None,
            )?
        };

        stream.play()?;

        Ok(Capture {
            ring,
            error,
            _stream: stream,
        })
    }

    pub fn ring_buffer(&self) -> Arc<RingBuffer> {
        self.ring.clone()
    }

    pub fn has_errored(&self) -> bool {
        self.error.load(Ordering::Relaxed)
    }

    /// Dropping the `cpal::Stream` halts callback delivery synchronously;
    /// there is no companion thread to join here, unlike
    /// `DetectionEngine::stop`.
    pub fn stop(self) -> Result<(), AudioError> {
        drop(self._stream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ts: u64, value: i16) -> AudioFrame {
        AudioFrame {
            timestamp_micros: ts,
            pcm: vec![value, value],
            channels: 2,
            sample_rate: 44_100,
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let rb = RingBuffer::new(0.1, 44_100, 4_410);
        assert_eq!(rb.capacity(), 1);
        rb.push(frame(1, 1));
        rb.push(frame(2, 2));
        assert_eq!(rb.len(), 1);
        let recent = rb.get_recent_frames(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].timestamp_micros, 2);
    }

    #[test]
    fn frames_since_filters_by_timestamp() {
        let rb = RingBuffer::new(10.0, 44_100, 4_410);
        for i in 0..5 {
            rb.push(frame(i * 10, i as i16));
        }
        let since = rb.get_frames_since(25);
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].timestamp_micros, 30);
    }
}
