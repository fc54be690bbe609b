//! Acoustic feature extraction, carried over from `acoustic_features.py`
//! exactly for the constants (`FFT_SIZE`, `HOP`, `N_MELS`, `N_MFCCS`) and
//! the shape of each feature.

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

pub const FFT_SIZE: usize = 2048;
pub const HOP: usize = 512;
pub const N_MELS: usize = 40;
pub const N_MFCCS: usize = 13;

const PITCH_MIN_HZ: f64 = 100.0;
const PITCH_MAX_HZ: f64 = 2000.0;
const PITCH_SIGNIFICANCE: f64 = 0.2;
const SILENCE_THRESHOLD: f32 = 1e-10;
const ROLLOFF_FRACTION: f64 = 0.85;

#[derive(Debug, Clone)]
pub struct AcousticFeatures {
    pub duration_ms: f64,
    pub pitch_hz: Option<f64>,
    pub spectral_centroid_hz: f64,
    pub spectral_rolloff_hz: f64,
    pub spectral_bandwidth_hz: f64,
    pub zcr: f64,
    pub mfcc_mean: [f32; N_MFCCS],
    pub mfcc_std: [f32; N_MFCCS],
    pub energy_db: f64,
}

impl AcousticFeatures {
    fn silence(duration_ms: f64) -> Self {
        AcousticFeatures {
            duration_ms,
            pitch_hz: None,
            spectral_centroid_hz: 0.0,
            spectral_rolloff_hz: 0.0,
            spectral_bandwidth_hz: 0.0,
            zcr: 0.0,
            mfcc_mean: [0.0; N_MFCCS],
            mfcc_std: [0.0; N_MFCCS],
            energy_db: -100.0,
        }
    }
}

pub fn extract(mono: &[f32], sample_rate: u32) -> AcousticFeatures {
    let duration_ms = mono.len() as f64 * 1000.0 / f64::from(sample_rate);

    let peak = mono.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
    if peak < SILENCE_THRESHOLD {
        return AcousticFeatures::silence(duration_ms);
    }

    let mut padded = mono.to_vec();
    if padded.len() < FFT_SIZE {
        padded.resize(FFT_SIZE, 0.0);
    }

    let pitch_hz = estimate_pitch(mono, sample_rate);
    let zcr = zero_crossing_rate(mono);
    let energy_db = energy_dbfs(mono);

    let mean_spectrum = mean_magnitude_spectrum(&padded);
    let freqs = frequency_bins(sample_rate);
    let spectral_centroid_hz = spectral_centroid(&mean_spectrum, &freqs);
    let spectral_rolloff_hz = spectral_rolloff(&mean_spectrum, &freqs, ROLLOFF_FRACTION);
    let spectral_bandwidth_hz =
        spectral_bandwidth(&mean_spectrum, &freqs, spectral_centroid_hz);

    let filterbank = mel_filterbank(sample_rate);
    let (mfcc_mean, mfcc_std) = mfcc_mean_std(&padded, &filterbank);

    AcousticFeatures {
        duration_ms,
        pitch_hz,
        spectral_centroid_hz,
        spectral_rolloff_hz,
        spectral_bandwidth_hz,
        zcr,
        mfcc_mean,
        mfcc_std,
        energy_db,
    }
}

fn zero_crossing_rate(mono: &[f32]) -> f64 {
    if mono.len() < 2 {
        return 0.0;
    }
    let crossings = mono
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64 / (mono.len() - 1) as f64
}

fn energy_dbfs(mono: &[f32]) -> f64 {
    if mono.is_empty() {
        return -100.0;
    }
    let sum_sq: f64 = mono.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    let rms = (sum_sq / mono.len() as f64).sqrt();
    if rms <= 1e-10 {
        -100.0
    } else {
        (20.0 * rms.log10()).max(-100.0)
    }
}

/// Normalized autocorrelation pitch estimate. `acoustic_features.py` only
/// reaches this path when `librosa`'s pYIN is unavailable, which is the
/// common case in the reference deployment; this port treats it as the
/// sole pitch estimator rather than depending on an optional model.
fn estimate_pitch(mono: &[f32], sample_rate: u32) -> Option<f64> {
    if mono.is_empty() {
        return None;
    }

    let lag_min = (f64::from(sample_rate) / PITCH_MAX_HZ).floor() as usize;
    let lag_max = ((f64::from(sample_rate) / PITCH_MIN_HZ).ceil() as usize).min(mono.len() - 1);
    if lag_min >= lag_max {
        return None;
    }

    let energy0: f64 = mono.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    if energy0 <= 0.0 {
        return None;
    }

    let mut best_lag = 0usize;
    let mut best_val = f64::MIN;
    for lag in lag_min..=lag_max {
        let mut acc = 0.0f64;
        for i in 0..(mono.len() - lag) {
            acc += f64::from(mono[i]) * f64::from(mono[i + lag]);
        }
        if acc > best_val {
            best_val = acc;
            best_lag = lag;
        }
    }

    if best_lag == 0 || best_val < PITCH_SIGNIFICANCE * energy0 {
        return None;
    }

    Some(f64::from(sample_rate) / best_lag as f64)
}

fn hamming_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()
        })
        .collect()
}

fn fft_frames(padded: &[f32]) -> (Vec<Vec<f32>>, Arc<dyn Fft<f32>>) {
    let window = hamming_window(FFT_SIZE);
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);

    let mut frames = Vec::new();
    let mut start = 0;
    while start + FFT_SIZE <= padded.len() {
        let mut buf: Vec<Complex32> = padded[start..start + FFT_SIZE]
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex32::new(s * w, 0.0))
            .collect();
        fft.process(&mut buf);
        let half = FFT_SIZE / 2 + 1;
        frames.push(buf[..half].iter().map(|c| c.norm()).collect());
        start += HOP;
    }

    if frames.is_empty() {
        let mut buf: Vec<Complex32> = padded
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex32::new(s * w, 0.0))
            .collect();
        fft.process(&mut buf);
        let half = FFT_SIZE / 2 + 1;
        frames.push(buf[..half].iter().map(|c| c.norm()).collect());
    }

    (frames, fft)
}

fn mean_magnitude_spectrum(padded: &[f32]) -> Vec<f32> {
    let (frames, _fft) = fft_frames(padded);
    let half = FFT_SIZE / 2 + 1;
    let mut mean = vec![0.0f32; half];
    for frame in &frames {
        for (m, v) in mean.iter_mut().zip(frame.iter()) {
            *m += v;
        }
    }
    let n = frames.len().max(1) as f32;
    for m in mean.iter_mut() {
        *m /= n;
    }
    mean
}

fn frequency_bins(sample_rate: u32) -> Vec<f64> {
    let half = FFT_SIZE / 2 + 1;
    (0..half)
        .map(|k| k as f64 * f64::from(sample_rate) / FFT_SIZE as f64)
        .collect()
}

fn spectral_centroid(spectrum: &[f32], freqs: &[f64]) -> f64 {
    let total: f64 = spectrum.iter().map(|&m| f64::from(m)).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = spectrum
        .iter()
        .zip(freqs.iter())
        .map(|(&m, &f)| f64::from(m) * f)
        .sum();
    weighted / total
}

fn spectral_rolloff(spectrum: &[f32], freqs: &[f64], fraction: f64) -> f64 {
    let total: f64 = spectrum.iter().map(|&m| f64::from(m)).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let target = fraction * total;
    let mut cumulative = 0.0;
    for (&m, &f) in spectrum.iter().zip(freqs.iter()) {
        cumulative += f64::from(m);
        if cumulative >= target {
            return f;
        }
    }
    *freqs.last().unwrap_or(&0.0)
}

fn spectral_bandwidth(spectrum: &[f32], freqs: &[f64], centroid: f64) -> f64 {
    let total: f64 = spectrum.iter().map(|&m| f64::from(m)).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let variance: f64 = spectrum
        .iter()
        .zip(freqs.iter())
        .map(|(&m, &f)| f64::from(m) * (f - centroid).powi(2))
        .sum::<f64>()
        / total;
    variance.sqrt()
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// `N_MELS` triangular filters spanning the FFT's magnitude bins,
/// constructed per `acoustic_features.py`'s mel filterbank.
struct MelFilterbank {
    sample_rate: u32,
    filters: Vec<Vec<f32>>,
}

fn mel_filterbank(sample_rate: u32) -> MelFilterbank {
    let half = FFT_SIZE / 2 + 1;
    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(f64::from(sample_rate) / 2.0);

    let mel_points: Vec<f64> = (0..=N_MELS + 1)
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (N_MELS + 1) as f64)
        .collect();

    let bin_points: Vec<usize> = mel_points
        .iter()
        .map(|&mel| {
            let hz = mel_to_hz(mel);
            ((FFT_SIZE as f64 + 1.0) * hz / f64::from(sample_rate)).floor() as usize
        })
        .map(|b| b.min(half - 1))
        .collect();

    let mut filters = vec![vec![0.0f32; half]; N_MELS];
    for m in 1..=N_MELS {
        let left = bin_points[m - 1];
        let center = bin_points[m];
        let right = bin_points[m + 1];

        for k in left..center {
            if center > left {
                filters[m - 1][k] = (k - left) as f32 / (center - left) as f32;
            }
        }
        for k in center..right {
            if right > center {
                filters[m - 1][k] = (right - k) as f32 / (right - center) as f32;
            }
        }
    }

    MelFilterbank {
        sample_rate,
        filters,
    }
}

fn dct2(log_mel: &[f64], n_out: usize) -> Vec<f32> {
    let m = log_mel.len();
    (0..n_out)
        .map(|k| {
            let sum: f64 = log_mel
                .iter()
                .enumerate()
                .map(|(n, &x)| {
                    x * (std::f64::consts::PI * k as f64 * (n as f64 + 0.5) / m as f64).cos()
                })
                .sum();
            sum as f32
        })
        .collect()
}

fn mfcc_mean_std(
    padded: &[f32],
    filterbank: &MelFilterbank,
) -> ([f32; N_MFCCS], [f32; N_MFCCS]) {
    let (frames, _fft) = fft_frames(padded);
    let _ = filterbank.sample_rate;

    let mut per_frame_mfcc: Vec<[f32; N_MFCCS]> = Vec::with_capacity(frames.len());

    for frame in &frames {
        let log_mel: Vec<f64> = filterbank
            .filters
            .iter()
            .map(|filt| {
                let energy: f32 = filt.iter().zip(frame.iter()).map(|(&w, &m)| w * m).sum();
                f64::from(energy.max(1e-10)).ln()
            })
            .collect();

        let coeffs = dct2(&log_mel, N_MFCCS);
        let mut arr = [0.0f32; N_MFCCS];
        arr.copy_from_slice(&coeffs[..N_MFCCS]);
        per_frame_mfcc.push(arr);
    }

    let n = per_frame_mfcc.len().max(1) as f32;
    let mut mean = [0.0f32; N_MFCCS];
    for frame in &per_frame_mfcc {
        for (m, v) in mean.iter_mut().zip(frame.iter()) {
            *m += v;
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }

    let mut variance = [0.0f32; N_MFCCS];
    for frame in &per_frame_mfcc {
        for ((v, &x), &mu) in variance.iter_mut().zip(frame.iter()).zip(mean.iter()) {
            *v += (x - mu).powi(2);
        }
    }
    let mut std = [0.0f32; N_MFCCS];
    for (s, v) in std.iter_mut().zip(variance.iter()) {
        *s = (*v / n).sqrt();
    }

    (mean, std)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_short_circuits() {
        let f = extract(&[0.0; 4096], 44_100);
        assert_eq!(f.pitch_hz, None);
        assert_eq!(f.energy_db, -100.0);
        assert_eq!(f.mfcc_mean, [0.0; N_MFCCS]);
    }

    #[test]
    fn pure_tone_pitch_is_close_to_true_frequency() {
        let sample_rate = 44_100u32;
        let freq = 440.0f64;
        let samples: Vec<f32> = (0..4096)
            .map(|i| {
                (2.0 * std::f64::consts::PI * freq * i as f64 / f64::from(sample_rate)).sin()
                    as f32
            })
            .collect();
        let f = extract(&samples, sample_rate);
        let pitch = f.pitch_hz.expect("tone should be voiced");
        assert!((pitch - freq).abs() < 5.0, "pitch {pitch} far from {freq}");
    }

    #[test]
    fn zcr_of_alternating_signal_is_near_one() {
        let samples: Vec<f32> = (0..100)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        assert!(zero_crossing_rate(&samples) > 0.9);
    }

    #[test]
    fn duration_scales_with_sample_rate() {
        let f = extract(&[0.5; 44_100], 44_100);
        assert!((f.duration_ms - 1000.0).abs() < 1.0);
    }
}
