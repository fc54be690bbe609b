//! Capability traits for the black-box ML components the gate chain
//! depends on. No model weights or inference runtimes ship with this
//! crate; callers plug in a real backend. Each trait has a `Null*` test
//! double that never errors, used by the unit tests in this module and
//! available to integrators that want a functioning pipeline with the
//! zero-shot / tagger / harmonic stages inert.

pub struct TaggerScores {
    pub dog_class: f32,
    pub bark_class: f32,
}

pub trait AudioTagger: Send {
    fn load(&mut self) -> Result<(), String>;
    /// `mono_16k` is a ~1s window resampled to 16 kHz mono.
    fn score(&mut self, mono_16k: &[f32]) -> Result<TaggerScores, String>;
}

pub struct NullTagger;

impl AudioTagger for NullTagger {
    fn load(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn score(&mut self, _mono_16k: &[f32]) -> Result<TaggerScores, String> {
        Ok(TaggerScores {
            dog_class: 0.0,
            bark_class: 0.0,
        })
    }
}

pub struct HarmonicSplit {
    pub harmonic_energy: f32,
    pub percussive_energy: f32,
}

pub trait HarmonicSeparator: Send {
    fn load(&mut self) -> Result<(), String>;
    fn separate(&mut self, mono: &[f32]) -> Result<HarmonicSplit, String>;
}

pub struct NullHarmonicSeparator;

impl HarmonicSeparator for NullHarmonicSeparator {
    fn load(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn separate(&mut self, _mono: &[f32]) -> Result<HarmonicSplit, String> {
        Ok(HarmonicSplit {
            harmonic_energy: 1.0,
            percussive_energy: 0.0,
        })
    }
}

pub trait ZeroShotClassifier: Send {
    fn load(&mut self) -> Result<(), String>;
    /// Returns one score per label, same order as `labels`.
    fn score_labels(
        &mut self,
        mono: &[f32],
        sample_rate: u32,
        labels: &[&str],
    ) -> Result<Vec<f32>, String>;

    /// 512-D L2-normalized embedding, used by the fingerprint matcher.
    fn embed(&mut self, mono: &[f32], sample_rate: u32) -> Result<[f32; 512], String>;
}

pub struct NullClassifier;

impl ZeroShotClassifier for NullClassifier {
    fn load(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn score_labels(
        &mut self,
        _mono: &[f32],
        _sample_rate: u32,
        labels: &[&str],
    ) -> Result<Vec<f32>, String> {
        Ok(vec![0.0; labels.len()])
    }

    fn embed(&mut self, _mono: &[f32], _sample_rate: u32) -> Result<[f32; 512], String> {
        let mut e = [0.0f32; 512];
        e[0] = 1.0;
        Ok(e)
    }
}
