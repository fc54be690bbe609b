use super::{time_gate, Gate, GateOutcome, TickContext};
use crate::stats::{GateStats, GateStatsSnapshot};

/// Energy-based voice activity gate. Computes RMS over the tick window and
/// converts to dBFS; silent windows never reach the heavier stages.
pub struct VadGate {
    stats: GateStats,
}

impl VadGate {
    pub fn new() -> Self {
        VadGate {
            stats: GateStats::new("vad_gate"),
        }
    }
}

impl Default for VadGate {
    fn default() -> Self {
        Self::new()
    }
}

pub fn rms_dbfs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return -100.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    if rms <= 1e-10 {
        -100.0
    } else {
        (20.0 * rms.log10()).max(-100.0) as f32
    }
}

impl Gate for VadGate {
    fn name(&self) -> &'static str {
        "vad"
    }

    fn run(&mut self, ctx: &mut TickContext) -> GateOutcome {
        if !ctx.vad_enabled {
            let outcome = time_gate(|| (true, true));
            self.stats.record(true);
            return outcome;
        }

        let outcome = time_gate(|| {
            let db = rms_dbfs(ctx.mono);
            ctx.rms_db = Some(db);
            let passed = db >= ctx.vad_threshold_db && ctx.mono.len() >= ctx.min_samples;
            (passed, false)
        });
        self.stats.record(outcome.passed);
        outcome
    }

    fn stats(&self) -> GateStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_minus_100_dbfs() {
        assert_eq!(rms_dbfs(&[0.0; 100]), -100.0);
    }

    #[test]
    fn full_scale_sine_is_near_zero_dbfs() {
        let samples: Vec<f32> = (0..4410)
            .map(|i| (i as f32 * 0.1).sin())
            .collect();
        let db = rms_dbfs(&samples);
        assert!(db < 0.0 && db > -10.0, "unexpected dbfs {db}");
    }
}
