use super::{time_gate, AudioTagger, Gate, GateOutcome, TaggerScores, TickContext};
use crate::stats::{GateStats, GateStatsSnapshot};

/// 521-class audio tagger gate. Fails open: a model-load or inference
/// error passes the tick through rather than dropping it, since a
/// misbehaving auxiliary classifier should never blind the pipeline to
/// real barks.
pub struct TaggerGate {
    tagger: Box<dyn AudioTagger>,
    stats: GateStats,
    fail_open_count: crate::stats::Counter,
}

impl TaggerGate {
    pub fn new(tagger: Box<dyn AudioTagger>) -> Self {
        TaggerGate {
            tagger,
            stats: GateStats::new("tagger_gate"),
            fail_open_count: crate::stats::Counter::new("tagger_gate_fail_open"),
        }
    }

    pub fn fail_open_count(&self) -> u64 {
        self.fail_open_count.get()
    }
}

impl Gate for TaggerGate {
    fn name(&self) -> &'static str {
        "tagger"
    }

    fn run(&mut self, ctx: &mut TickContext) -> GateOutcome {
        if !ctx.tagger_enabled {
            let outcome = time_gate(|| (true, true));
            self.stats.record(true);
            return outcome;
        }

        let outcome = time_gate(|| match self.tagger.score(ctx.mono_16k) {
            Ok(scores) => {
                let passed = scores.dog_class.max(scores.bark_class) >= ctx.tagger_threshold;
                ctx.tagger_scores = Some(scores);
                (passed, false)
            }
            Err(e) => {
                log::warn!("tagger inference error, failing open: {e}");
                self.fail_open_count.increment();
                ctx.tagger_scores = Some(TaggerScores {
                    dog_class: 0.0,
                    bark_class: 0.0,
                });
                (true, false)
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
    use crate::gates::NullTagger;

    fn ctx<'a>(mono: &'a [f32]) -> TickContext<'a> {
        TickContext {
            mono,
            sample_rate: 16_000,
            mono_16k: mono,
            vad_enabled: true,
            vad_threshold_db: -40.0,
            min_samples: 0,
            tagger_enabled: true,
            tagger_threshold: 0.05,
            min_harmonic_ratio: 0.1,
            harmonic_enabled: false,
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

    struct ErroringTagger;
    impl AudioTagger for ErroringTagger {
        fn load(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn score(&mut self, _mono_16k: &[f32]) -> Result<TaggerScores, String> {
            Err("boom".to_string())
        }
    }

    #[test]
    fn fails_open_on_inference_error() {
        let mut gate = TaggerGate::new(Box::new(ErroringTagger));
        let mut c = ctx(&[0.0; 10]);
        let outcome = gate.run(&mut c);
        assert!(outcome.passed);
        assert_eq!(gate.fail_open_count(), 1);
    }

    #[test]
    fn null_tagger_never_passes_threshold() {
        let mut gate = TaggerGate::new(Box::new(NullTagger));
        let mut c = ctx(&[0.0; 10]);
        let outcome = gate.run(&mut c);
        assert!(!outcome.passed);
    }
}
