//! Bark fingerprint: the per-bark embedding + acoustic feature tuple used
//! for per-individual attribution.

use chrono::{DateTime, Utc};

use crate::dog::{generate_id, EMBEDDING_DIM};

pub const MFCC_DIM: usize = 13;

#[derive(Debug, Clone)]
pub struct BarkFingerprint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub embedding: Option<[f32; EMBEDDING_DIM]>,
    pub dog_id: Option<String>,
    pub match_confidence: Option<f32>,
    pub cluster_id: Option<String>,
    pub evidence_filename: Option<String>,
    pub rejection_reason: Option<String>,
    pub confirmed: Option<bool>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub detection_probability: f32,
    pub doa_degrees: Option<i32>,
    pub duration_ms: Option<f64>,
    pub pitch_hz: Option<f64>,
    pub spectral_centroid_hz: Option<f64>,
    pub mfcc_mean: Option<[f32; MFCC_DIM]>,
}

impl BarkFingerprint {
    pub fn new(detection_probability: f32) -> Self {
        BarkFingerprint {
            id: generate_id(),
            timestamp: Utc::now(),
            embedding: None,
            dog_id: None,
            match_confidence: None,
            cluster_id: None,
            evidence_filename: None,
            rejection_reason: None,
            confirmed: None,
            confirmed_at: None,
            detection_probability,
            doa_degrees: None,
            duration_ms: None,
            pitch_hz: None,
            spectral_centroid_hz: None,
            mfcc_mean: None,
        }
    }

    /// Untagged iff `dog_id` and `rejection_reason` are both absent.
    pub fn is_untagged(&self) -> bool {
        self.dog_id.is_none() && self.rejection_reason.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct FingerprintMatch {
    pub dog_id: String,
    pub dog_name: String,
    pub confidence: f32,
    pub sample_count: u32,
}

/// Confidence tiers are for reporting only; they never gate auto-tagging
/// (see `woof_fingerprint::matcher`'s margin/quality gates for that).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    None,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.90 {
            ConfidenceTier::High
        } else if confidence >= 0.78 {
            ConfidenceTier::Medium
        } else if confidence >= 0.65 {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::None
        }
    }
}
