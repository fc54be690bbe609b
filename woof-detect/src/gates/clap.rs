use super::{time_gate, Gate, GateOutcome, TickContext, ZeroShotClassifier};
use crate::stats::{GateStats, GateStatsSnapshot};

/// Zero-shot classifier gate. Scores the tick window against a positive
/// label set ("dog barking", ...) and a negative set ("human speech",
/// "silence", ...), including a bird-related subset of the negative set
/// used as an explicit veto. Unlike the tagger/harmonic gates this one
/// never fails open: an inference exception aborts the tick entirely
/// (the classifier is the sole source of `is_barking`, so a silent
/// failure here would mean silently dropping real detections without
/// any way to notice).
pub struct ClapGate {
    classifier: Box<dyn ZeroShotClassifier>,
    stats: GateStats,
}

impl ClapGate {
    pub fn new(classifier: Box<dyn ZeroShotClassifier>) -> Self {
        ClapGate {
            classifier,
            stats: GateStats::new("clap_gate"),
        }
    }
}

fn classify(
    classifier: &mut dyn ZeroShotClassifier,
    ctx: &TickContext,
) -> Result<(f32, bool), String> {
    let all_labels: Vec<&str> = ctx
        .positive_labels
        .iter()
        .chain(ctx.negative_labels.iter())
        .copied()
        .collect();

    let scores = classifier.score_labels(ctx.mono, ctx.sample_rate, &all_labels)?;

    let positive_sum: f32 = scores[..ctx.positive_labels.len()].iter().sum();
    let total_sum: f32 = scores.iter().sum();
    let bark_prob = if total_sum > 0.0 {
        positive_sum / total_sum
    } else {
        0.0
    };

    let mut is_barking = bark_prob >= ctx.clap_threshold;

    if is_barking && !ctx.bird_labels.is_empty() {
        let negative_scores = &scores[ctx.positive_labels.len()..];
        let bird_sum: f32 = ctx
            .negative_labels
            .iter()
            .zip(negative_scores.iter())
            .filter(|(label, _)| ctx.bird_labels.contains(label))
            .map(|(_, score)| *score)
            .sum();

        if bird_sum > ctx.bird_veto_threshold {
            is_barking = false;
        }
    }

    Ok((bark_prob, is_barking))
}

impl Gate for ClapGate {
    fn name(&self) -> &'static str {
        "clap"
    }

    fn run(&mut self, ctx: &mut TickContext) -> GateOutcome {
        let result = classify(self.classifier.as_mut(), ctx);

        let outcome = time_gate(|| match result {
            Ok((bark_prob, is_barking)) => {
                ctx.bark_prob = Some(bark_prob);
                ctx.is_barking = is_barking;
                (true, false)
            }
            Err(e) => {
                log::warn!("classifier inference error, dropping tick: {e}");
                (false, false)
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
    use crate::gates::traits::ZeroShotClassifier;

    fn base_ctx<'a>(
        mono: &'a [f32],
        positive: &'a [&'a str],
        negative: &'a [&'a str],
        bird: &'a [&'a str],
    ) -> TickContext<'a> {
        TickContext {
            mono,
            sample_rate: 48_000,
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
            positive_labels: positive,
            negative_labels: negative,
            bird_labels: bird,
            rms_db: None,
            tagger_scores: None,
            harmonic_ratio: None,
            bark_prob: None,
            is_barking: false,
        }
    }

    struct FixedClassifier(Vec<f32>);
    impl ZeroShotClassifier for FixedClassifier {
        fn load(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn score_labels(
            &mut self,
            _mono: &[f32],
            _sample_rate: u32,
            _labels: &[&str],
        ) -> Result<Vec<f32>, String> {
            Ok(self.0.clone())
        }
        fn embed(&mut self, _mono: &[f32], _sample_rate: u32) -> Result<[f32; 512], String> {
            Ok([0.0; 512])
        }
    }

    #[test]
    fn barks_when_above_threshold() {
        let positive = ["dog barking"];
        let negative = ["human speech", "silence"];
        let mut gate = ClapGate::new(Box::new(FixedClassifier(vec![0.8, 0.1, 0.1])));
        let mut ctx = base_ctx(&[0.0; 10], &positive, &negative, &[]);
        let outcome = gate.run(&mut ctx);
        assert!(outcome.passed);
        assert!(ctx.is_barking);
    }

    #[test]
    fn bird_veto_suppresses_bark_above_threshold() {
        let positive = ["dog barking"];
        let negative = ["bird chirping"];
        let bird = ["bird chirping"];
        // bark_prob = 0.8 / (0.8 + 0.2) = 0.8 >= 0.6, but bird score 0.2 > veto 0.15
        let mut gate = ClapGate::new(Box::new(FixedClassifier(vec![0.8, 0.2])));
        let mut ctx = base_ctx(&[0.0; 10], &positive, &negative, &bird);
        let outcome = gate.run(&mut ctx);
        assert!(outcome.passed);
        assert!(!ctx.is_barking);
    }

    struct ErroringClassifier;
    impl ZeroShotClassifier for ErroringClassifier {
        fn load(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn score_labels(
            &mut self,
            _mono: &[f32],
            _sample_rate: u32,
            _labels: &[&str],
        ) -> Result<Vec<f32>, String> {
            Err("model not loaded".to_string())
        }
        fn embed(&mut self, _mono: &[f32], _sample_rate: u32) -> Result<[f32; 512], String> {
            Err("model not loaded".to_string())
        }
    }

    #[test]
    fn inference_error_drops_the_tick() {
        let positive = ["dog barking"];
        let negative = ["silence"];
        let mut gate = ClapGate::new(Box::new(ErroringClassifier));
        let mut ctx = base_ctx(&[0.0; 10], &positive, &negative, &[]);
        let outcome = gate.run(&mut ctx);
        assert!(!outcome.passed);
    }
}
