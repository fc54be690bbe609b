//! Evidence record: the structured metadata committed alongside each WAV
//! clip, and the index that tracks every clip on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub trigger_probability: f32,
    pub peak_probability: f32,
    pub bark_count_in_clip: u32,
    pub doa_bartlett: Option<i32>,
    pub doa_capon: Option<i32>,
    pub doa_mem: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub hostname: String,
    pub microphone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub filename: String,
    pub timestamp_utc: DateTime<Utc>,
    pub timestamp_local: DateTime<chrono::FixedOffset>,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub detection: DetectionSummary,
    pub device: DeviceSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceIndex {
    pub last_updated: DateTime<Utc>,
    pub count: usize,
    pub entries: Vec<EvidenceRecord>,
}

impl EvidenceIndex {
    pub fn new() -> Self {
        EvidenceIndex {
            last_updated: Utc::now(),
            count: 0,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, record: EvidenceRecord) {
        self.entries.push(record);
        self.count = self.entries.len();
        self.last_updated = Utc::now();
    }

    pub fn remove_by_filename(&mut self, filename: &str) -> Option<EvidenceRecord> {
        let idx = self.entries.iter().position(|e| e.filename == filename)?;
        let removed = self.entries.remove(idx);
        self.count = self.entries.len();
        self.last_updated = Utc::now();
        Some(removed)
    }
}

impl Default for EvidenceIndex {
    fn default() -> Self {
        Self::new()
    }
}
