//! Per-bark attribution: embed, feature-extract, match against known dogs,
//! and persist — the pipeline named in `fingerprint_matcher.py`.

use chrono::{DateTime, Utc};

use woof_detect::features;
use woof_detect::gates::ZeroShotClassifier;
use woof_protocol::dog::{l2_norm, EMBEDDING_DIM};
use woof_protocol::fingerprint::{BarkFingerprint, FingerprintMatch};

use crate::error::StoreError;
use crate::store::FingerprintStore;

/// `confidence[0] - confidence[1] >= MIN_AUTO_TAG_MARGIN` is required before
/// an ambiguous top match is accepted. Not present in the original Python
/// matcher; added per the attribution spec's explicit margin gate.
pub const MIN_AUTO_TAG_MARGIN: f32 = 0.08;
/// Below this confidence a match is recorded but does not update the dog's
/// centroid — avoids poisoning a profile with a borderline sample.
pub const MIN_CONFIDENCE_FOR_EMBEDDING_UPDATE: f32 = 0.80;

const MATCH_THRESHOLD: f32 = 0.75;
const MATCH_TOP_K: usize = 3;
const RENORMALIZE_TOLERANCE: f32 = 1e-5;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("embedding failed: {0}")]
    Embed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct FingerprintMatcher<'a> {
    store: &'a FingerprintStore,
    classifier: &'a mut dyn ZeroShotClassifier,
}

impl<'a> FingerprintMatcher<'a> {
    pub fn new(store: &'a FingerprintStore, classifier: &'a mut dyn ZeroShotClassifier) -> Self {
        FingerprintMatcher { store, classifier }
    }

    /// Runs the full attribution pipeline for one bark window and persists
    /// the resulting fingerprint (tagged, if a confident match was found).
    /// Embedding/feature-extraction failures propagate — no partial
    /// fingerprint is ever saved.
    pub fn process_bark(
        &mut self,
        mono: &[f32],
        sample_rate: u32,
        detection_probability: f32,
        doa_degrees: Option<i32>,
        evidence_filename: Option<String>,
    ) -> Result<(BarkFingerprint, Vec<FingerprintMatch>), MatchError> {
        let mut embedding = self
            .classifier
            .embed(mono, sample_rate)
            .map_err(MatchError::Embed)?;

        let norm = l2_norm(&embedding);
        if (norm - 1.0).abs() > RENORMALIZE_TOLERANCE {
            renormalize(&mut embedding, norm);
        }

        let acoustic = features::extract(mono, sample_rate);

        let matches =
            self.store
                .find_matches(&embedding, MATCH_THRESHOLD, MATCH_TOP_K, true)?;

        let accepted = accept_top_match(&matches);

        let mut fingerprint = BarkFingerprint::new(detection_probability);
        fingerprint.embedding = Some(embedding);
        fingerprint.doa_degrees = doa_degrees;
        fingerprint.evidence_filename = evidence_filename;
        fingerprint.duration_ms = Some(acoustic.duration_ms);
        fingerprint.pitch_hz = acoustic.pitch_hz;
        fingerprint.spectral_centroid_hz = Some(acoustic.spectral_centroid_hz);
        fingerprint.mfcc_mean = Some(acoustic.mfcc_mean);

        if let Some(best) = accepted {
            fingerprint.dog_id = Some(best.dog_id.clone());
            fingerprint.match_confidence = Some(best.confidence);

            if best.confidence >= MIN_CONFIDENCE_FOR_EMBEDDING_UPDATE {
                self.store
                    .update_dog_stats(&best.dog_id, &embedding, timestamp())?;
            }
        }

        self.store.save_fingerprint(&fingerprint)?;

        Ok((fingerprint, matches))
    }
}

/// The top candidate is accepted only if it clears the confidence threshold
/// (already guaranteed by `find_matches`) by a margin over the runner-up —
/// a single unambiguous candidate has an infinite margin.
fn accept_top_match(matches: &[FingerprintMatch]) -> Option<&FingerprintMatch> {
    match matches {
        [] => None,
        [only] => Some(only),
        [top, runner_up, ..] => {
            if top.confidence - runner_up.confidence >= MIN_AUTO_TAG_MARGIN {
                Some(top)
            } else {
                None
            }
        }
    }
}

fn renormalize(embedding: &mut [f32; EMBEDDING_DIM], norm: f32) {
    if norm > 0.0 {
        for x in embedding.iter_mut() {
            *x /= norm;
        }
    }
}

fn timestamp() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use woof_detect::gates::NullClassifier;

    #[test]
    fn single_unambiguous_match_has_infinite_margin() {
        let matches = vec![FingerprintMatch {
            dog_id: "a".into(),
            dog_name: "Rex".into(),
            confidence: 0.8,
            sample_count: 10,
        }];
        assert!(accept_top_match(&matches).is_some());
    }

    #[test]
    fn close_runner_up_rejects_the_top_match() {
        let matches = vec![
            FingerprintMatch {
                dog_id: "a".into(),
                dog_name: "Rex".into(),
                confidence: 0.82,
                sample_count: 10,
            },
            FingerprintMatch {
                dog_id: "b".into(),
                dog_name: "Fido".into(),
                confidence: 0.80,
                sample_count: 10,
            },
        ];
        assert!(accept_top_match(&matches).is_none());
    }

    #[test]
    fn process_bark_persists_fingerprint_even_with_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = FingerprintStore::new(dir.path().join("fp.db")).unwrap();
        let mut classifier = NullClassifier;
        let mut matcher = FingerprintMatcher::new(&store, &mut classifier);

        let mono = vec![0.1f32; 4096];
        let (fp, matches) = matcher
            .process_bark(&mono, 44_100, 0.9, None, None)
            .unwrap();

        assert!(matches.is_empty());
        assert!(fp.dog_id.is_none());
        assert!(store.get_fingerprint(&fp.id).unwrap().is_some());
    }
}
