//! Dog profile: a managed roster entry with an incrementally-learned
//! acoustic centroid embedding.

use chrono::{DateTime, Utc};

pub const EMBEDDING_DIM: usize = 512;

#[derive(Debug, Clone)]
pub struct DogProfile {
    pub id: String,
    pub name: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub min_samples_for_auto_tag: u32,
    /// L2-normalised 512-D centroid embedding, `None` until the first sample.
    pub embedding: Option<[f32; EMBEDDING_DIM]>,
    pub sample_count: u32,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub total_barks: u32,
    pub avg_duration_ms: Option<f64>,
    pub avg_pitch_hz: Option<f64>,
}

impl DogProfile {
    pub fn new(name: impl Into<String>, notes: impl Into<String>) -> Self {
        let now = Utc::now();
        DogProfile {
            id: generate_id(),
            name: name.into(),
            notes: notes.into(),
            created_at: now,
            updated_at: now,
            confirmed: false,
            confirmed_at: None,
            min_samples_for_auto_tag: 5,
            embedding: None,
            sample_count: 0,
            first_seen: None,
            last_seen: None,
            total_barks: 0,
            avg_duration_ms: None,
            avg_pitch_hz: None,
        }
    }

    /// `can_auto_tag <=> confirmed AND sample_count >= min_samples_for_auto_tag`.
    pub fn can_auto_tag(&self) -> bool {
        self.confirmed && self.sample_count >= self.min_samples_for_auto_tag
    }

    /// Weighted running-average centroid update (§4.7 "Incremental update").
    ///
    /// `e' = (e_old * n + e_new * w) / (n + w)`, then re-normalised to the
    /// unit sphere. On the first sample the centroid is just `e_new`.
    pub fn update_embedding(&mut self, new_embedding: &[f32; EMBEDDING_DIM], weight: f32) {
        match &self.embedding {
            None => {
                self.embedding = Some(*new_embedding);
                self.sample_count = 1;
            }
            Some(old) => {
                let n = self.sample_count as f32;
                let total_weight = n + weight;
                let mut merged = [0f32; EMBEDDING_DIM];
                for i in 0..EMBEDDING_DIM {
                    merged[i] = (old[i] * n + new_embedding[i] * weight) / total_weight;
                }
                normalize(&mut merged);
                self.embedding = Some(merged);
                self.sample_count += 1;
            }
        }
    }
}

pub fn normalize(v: &mut [f32; EMBEDDING_DIM]) {
    let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn l2_norm(v: &[f32; EMBEDDING_DIM]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn generate_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 6] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
