pub mod capture;
pub mod error;
pub mod resample;

pub use capture::{Capture, RingBuffer};
pub use error::AudioError;
pub use resample::ResampleCache;
