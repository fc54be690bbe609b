pub mod clap;
pub mod harmonic;
pub mod tagger;
pub mod traits;
pub mod vad;

use std::time::{Duration, Instant};

pub use traits::{
    AudioTagger, HarmonicSeparator, HarmonicSplit, NullClassifier, NullHarmonicSeparator,
    NullTagger, TaggerScores, ZeroShotClassifier,
};

/// Scratch state threaded through a single tick's gate cascade. Each gate
/// reads what earlier gates produced and writes its own contribution;
/// nothing here is retained between ticks.
pub struct TickContext<'a> {
    pub mono: &'a [f32],
    pub sample_rate: u32,
    /// `mono` resampled to 16 kHz, for gates whose model expects that
    /// rate (currently just the tagger).
    pub mono_16k: &'a [f32],

    pub vad_enabled: bool,
    pub vad_threshold_db: f32,
    pub min_samples: usize,
    pub tagger_enabled: bool,
    pub tagger_threshold: f32,
    pub min_harmonic_ratio: f32,
    pub harmonic_enabled: bool,
    pub clap_threshold: f32,
    pub bird_veto_threshold: f32,
    pub positive_labels: &'a [&'a str],
    pub negative_labels: &'a [&'a str],
    pub bird_labels: &'a [&'a str],

    pub rms_db: Option<f32>,
    pub tagger_scores: Option<TaggerScores>,
    pub harmonic_ratio: Option<f32>,
    pub bark_prob: Option<f32>,
    pub is_barking: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct GateOutcome {
    pub passed: bool,
    pub skipped: bool,
    pub latency: Duration,
}

impl GateOutcome {
    fn timed(start: Instant, passed: bool, skipped: bool) -> Self {
        GateOutcome {
            passed,
            skipped,
            latency: start.elapsed(),
        }
    }
}

pub trait Gate: Send {
    fn name(&self) -> &'static str;
    fn run(&mut self, ctx: &mut TickContext) -> GateOutcome;
    fn stats(&self) -> crate::stats::GateStatsSnapshot;
}

/// Cascades gates in order, stopping at the first non-pass (mirrors the
/// pipeline's per-stage error-swallowing style: a stage that fails just
/// ends the tick early rather than aborting anything).
pub struct GateChain {
    gates: Vec<Box<dyn Gate>>,
}

pub struct ChainResult {
    pub outcomes: Vec<(&'static str, GateOutcome)>,
    pub reached_end: bool,
}

impl GateChain {
    pub fn new(gates: Vec<Box<dyn Gate>>) -> Self {
        GateChain { gates }
    }

    pub fn run_all(&mut self, ctx: &mut TickContext) -> ChainResult {
        let mut outcomes = Vec::with_capacity(self.gates.len());
        let mut reached_end = true;

        for gate in self.gates.iter_mut() {
            let outcome = gate.run(ctx);
            outcomes.push((gate.name(), outcome));

            if !outcome.passed && !outcome.skipped {
                reached_end = false;
                break;
            }
        }

        ChainResult {
            outcomes,
            reached_end,
        }
    }

    pub fn gate_stats(&self) -> Vec<(&'static str, crate::stats::GateStatsSnapshot)> {
        self.gates.iter().map(|g| (g.name(), g.stats())).collect()
    }
}

pub(crate) fn time_gate<F: FnOnce() -> (bool, bool)>(f: F) -> GateOutcome {
    let start = Instant::now();
    let (passed, skipped) = f();
    GateOutcome::timed(start, passed, skipped)
}
