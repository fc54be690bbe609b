//! Bark event: the unit fanned out from the detection tick to the recent-
//! event deque, the evidence recorder, and the fingerprint matcher.

use crate::audio::AudioFrame;

#[derive(Debug, Clone)]
pub struct BarkEvent {
    pub timestamp_micros: u64,
    /// Probability in `[0, 1]` from the zero-shot classifier.
    pub probability: f32,
    pub is_barking: bool,
    pub doa_bartlett: Option<i32>,
    pub doa_capon: Option<i32>,
    pub doa_mem: Option<i32>,
    /// Present only when `is_barking`; consumed by the matcher and not
    /// retained past callback dispatch.
    pub audio_snapshot: Option<AudioFrame>,
    pub sample_rate: u32,
}

impl BarkEvent {
    pub fn doa_degrees(&self, method: DoaMethod) -> Option<i32> {
        match method {
            DoaMethod::Bartlett => self.doa_bartlett,
            DoaMethod::Capon => self.doa_capon,
            DoaMethod::Mem => self.doa_mem,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoaMethod {
    Bartlett,
    Capon,
    Mem,
}
