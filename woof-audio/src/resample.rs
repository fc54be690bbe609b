use std::collections::HashMap;
use std::sync::Arc;

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::error::AudioError;

/// Caches the resampled-to-target-rate snapshot across gate evaluations
/// within a single detection tick, since several gates (tagger, CLAP) want
/// audio at the same target sample rate. Cleared at the start of every
/// tick; auto-invalidated if the source rate changes between ticks (e.g.
/// after a device reconfiguration).
pub struct ResampleCache {
    cache: HashMap<u32, Arc<[f32]>>,
    source_rate: Option<u32>,
}

impl ResampleCache {
    pub fn new() -> Self {
        ResampleCache {
            cache: HashMap::new(),
            source_rate: None,
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.source_rate = None;
    }

    pub fn get_resampled(
        &mut self,
        audio: &[f32],
        src: u32,
        tgt: u32,
    ) -> Result<Arc<[f32]>, AudioError> {
        if tgt == src {
            return Ok(Arc::from(audio));
        }

        if self.source_rate != Some(src) {
            self.cache.clear();
            self.source_rate = Some(src);
        }

        if let Some(cached) = self.cache.get(&tgt) {
            return Ok(cached.clone());
        }

        let resampled: Arc<[f32]> = Arc::from(resample(audio, src, tgt)?);
        self.cache.insert(tgt, resampled.clone());
        Ok(resampled)
    }
}

impl Default for ResampleCache {
    fn default() -> Self {
        Self::new()
    }
}

fn resample(audio: &[f32], src: u32, tgt: u32) -> Result<Vec<f32>, AudioError> {
    if audio.is_empty() {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = f64::from(tgt) / f64::from(src);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, audio.len(), 1)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    let output = resampler
        .process(&[audio.to_vec()], None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    Ok(output.into_iter().next().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_resample_when_rates_match() {
        let mut cache = ResampleCache::new();
        let audio = vec![0.1, 0.2, 0.3];
        let out = cache.get_resampled(&audio, 44_100, 44_100).unwrap();
        assert_eq!(&*out, &audio[..]);
    }

    #[test]
    fn cache_hit_returns_same_allocation() {
        let mut cache = ResampleCache::new();
        let audio = vec![0.0f32; 4_410];
        let first = cache.get_resampled(&audio, 44_100, 16_000).unwrap();
        let second = cache.get_resampled(&audio, 44_100, 16_000).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn source_rate_change_clears_cache() {
        let mut cache = ResampleCache::new();
        let audio = vec![0.0f32; 4_410];
        let first = cache.get_resampled(&audio, 44_100, 16_000).unwrap();
        let second = cache.get_resampled(&audio, 48_000, 16_000).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
