use super::{time_gate, Gate, GateOutcome, HarmonicSeparator, TickContext};
use crate::stats::{GateStats, GateStatsSnapshot};

/// Harmonic-vs-percussive energy gate, off by default (spec: "optional,
/// off by default at low threshold"). Rejects keyboard-like percussive
/// transients that would otherwise slip past the tagger.
pub struct HarmonicGate {
    separator: Box<dyn HarmonicSeparator>,
    stats: GateStats,
}

impl HarmonicGate {
    pub fn new(separator: Box<dyn HarmonicSeparator>) -> Self {
        HarmonicGate {
            separator,
            stats: GateStats::new("harmonic_gate"),
        }
    }
}

impl Gate for HarmonicGate {
    fn name(&self) -> &'static str {
        "harmonic"
    }

    fn run(&mut self, ctx: &mut TickContext) -> GateOutcome {
        if !ctx.harmonic_enabled {
            let outcome = time_gate(|| (true, true));
            self.stats.record(true);
            return outcome;
        }

        let outcome = time_gate(|| match self.separator.separate(ctx.mono) {
            Ok(split) => {
                let ratio =
                    split.harmonic_energy / (split.percussive_energy + 1e-10);
                ctx.harmonic_ratio = Some(ratio);
                (ratio >= ctx.min_harmonic_ratio, false)
            }
            Err(e) => {
                log::warn!("harmonic separation error, skipping gate: {e}");
                (true, true)
            }
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
    use crate::gates::traits::{HarmonicSplit, NullHarmonicSeparator};

    fn base_ctx(mono: &[f32]) -> TickContext<'_> {
        TickContext {
            mono,
            sample_rate: 44_100,
            mono_16k: mono,
            vad_enabled: true,
            vad_threshold_db: -40.0,
            min_samples: 0,
            tagger_enabled: true,
            tagger_threshold: 0.05,
            min_harmonic_ratio: 0.5,
            harmonic_enabled: true,
            clap_threshold: 0.6,
            bird_veto_threshold: 0.15,
            positive_labels: &[],
            negative_labels: &[],
            bird_labels: &[],
            rms_db: None,
            tagger_scores: None,
            harmonic_ratio: None,
            bark_prob: None,
            is_barking: false,
        }
    }

    #[test]
    fn disabled_gate_is_skipped_and_passes() {
        let mut gate = HarmonicGate::new(Box::new(NullHarmonicSeparator));
        let mut ctx = base_ctx(&[0.0; 10]);
        ctx.harmonic_enabled = false;
        let outcome = gate.run(&mut ctx);
        assert!(outcome.passed && outcome.skipped);
    }

    struct FixedSeparator(f32, f32);
    impl HarmonicSeparator for FixedSeparator {
        fn load(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn separate(&mut self, _mono: &[f32]) -> Result<HarmonicSplit, String> {
            Ok(HarmonicSplit {
                harmonic_energy: self.0,
                percussive_energy: self.1,
            })
        }
    }

    #[test]
    fn rejects_percussive_dominant_audio() {
        let mut gate = HarmonicGate::new(Box::new(FixedSeparator(0.1, 10.0)));
        let mut ctx = base_ctx(&[0.0; 10]);
        let outcome = gate.run(&mut ctx);
        assert!(!outcome.passed);
    }
}
