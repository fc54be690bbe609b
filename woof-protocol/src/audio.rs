//! Audio frame: the unit pushed by capture into the ring buffer and read
//! back out by the detection tick and the evidence recorder.

/// A chunk of interleaved 16-bit PCM audio with a capture timestamp.
///
/// Ownership: produced by capture, shared read-only from then on. Readers
/// always get an owned copy (see `woof_audio::capture::RingBuffer`) rather
/// than a reference into live storage.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Microseconds since an arbitrary per-process epoch (see `woof_util::time`).
    pub timestamp_micros: u64,
    /// Interleaved little-endian int16 samples, `channels` per frame.
    pub pcm: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn sample_count(&self) -> usize {
        self.pcm.len() / usize::from(self.channels.max(1))
    }

    pub fn duration_seconds(&self) -> f64 {
        self.sample_count() as f64 / f64::from(self.sample_rate)
    }

    /// Convert to mono float32 in `[-1, 1]`, averaging channels.
    pub fn to_mono_f32(&self) -> Vec<f32> {
        let channels = usize::from(self.channels.max(1));
        if channels == 1 {
            return self.pcm.iter().map(|&s| f32::from(s) / 32768.0).collect();
        }

        self.pcm
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                (sum as f32 / frame.len() as f32) / 32768.0
            })
            .collect()
    }

    /// Reshape interleaved PCM into `(channels, samples)` float32 planes,
    /// the layout the DOA estimator and gate chain operate on.
    pub fn to_channel_planes(&self) -> Vec<Vec<f32>> {
        let channels = usize::from(self.channels.max(1));
        let mut planes = vec![Vec::with_capacity(self.sample_count()); channels];

        for frame in self.pcm.chunks(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planes[ch].push(f32::from(sample) / 32768.0);
            }
        }

        planes
    }
}
