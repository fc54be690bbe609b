//! Evidence recording: an `IDLE`/`RECORDING` state machine driven by bark
//! events, committed by a periodic (~1 Hz) caller. Grounded on
//! `evidence/storage.py`'s `EvidenceStorage`, minus its `asyncio` plumbing —
//! this crate is synchronous, called from the detection engine's own
//! callback and a dedicated committer thread.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use woof_audio::RingBuffer;
use woof_protocol::config::EvidenceConfig;
use woof_protocol::evidence::{DetectionSummary, DeviceSummary, EvidenceIndex, EvidenceRecord};
use woof_protocol::BarkEvent;

use crate::error::EvidenceError;

const INDEX_FILENAME: &str = "index.json";

type SavedCallback = Box<dyn Fn(&str, DateTime<Utc>, DateTime<Utc>) + Send + Sync>;

#[derive(Clone)]
struct PendingRecording {
    trigger_event: BarkEvent,
    first_bark_micros: u64,
    last_bark_micros: u64,
    peak_probability: f32,
    bark_count: u32,
}

enum RecorderState {
    Idle,
    Recording(PendingRecording),
}

pub struct EvidenceRecorder {
    config: EvidenceConfig,
    ring: Arc<RingBuffer>,
    microphone_name: String,
    state: Mutex<RecorderState>,
    index: Mutex<EvidenceIndex>,
    callbacks: Mutex<Vec<SavedCallback>>,
}

impl EvidenceRecorder {
    pub fn new(
        config: EvidenceConfig,
        ring: Arc<RingBuffer>,
        microphone_name: impl Into<String>,
    ) -> Result<Self, EvidenceError> {
        fs::create_dir_all(&config.directory)?;
        let index = load_index(&config.directory);

        Ok(EvidenceRecorder {
            config,
            ring,
            microphone_name: microphone_name.into(),
            state: Mutex::new(RecorderState::Idle),
            index: Mutex::new(index),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    pub fn register_on_saved(&self, callback: SavedCallback) {
        self.callbacks.lock().unwrap().push(callback);
    }

    /// Feed every bark event here, whether or not `is_barking`. Non-barking
    /// events are ignored; this mirrors `on_bark_event` in the Python source.
    pub fn on_bark_event(&self, event: &BarkEvent) {
        if !event.is_barking {
            return;
        }
        if !self.config.auto_record {
            return;
        }

        let mut state = self.state.lock().unwrap();
        match &mut *state {
            RecorderState::Idle => {
                log::info!("evidence_recording_started");
                *state = RecorderState::Recording(PendingRecording {
                    trigger_event: event.clone(),
                    first_bark_micros: event.timestamp_micros,
                    last_bark_micros: event.timestamp_micros,
                    peak_probability: event.probability,
                    bark_count: 1,
                });
            }
            RecorderState::Recording(pending) => {
                pending.last_bark_micros = event.timestamp_micros;
                pending.peak_probability = pending.peak_probability.max(event.probability);
                pending.bark_count += 1;
            }
        }
    }

    /// Call at roughly 1 Hz. Commits and resets to `IDLE` once the future
    /// context window since the last bark has elapsed.
    pub fn check_and_commit(&self) -> Option<EvidenceRecord> {
        let now_micros = woof_util::time::now_micros();
        let future_window_micros = u64::from(self.config.future_context_seconds) * 1_000_000;

        let pending = {
            let mut state = self.state.lock().unwrap();
            match &*state {
                RecorderState::Idle => return None,
                RecorderState::Recording(pending) => {
                    if now_micros.saturating_sub(pending.last_bark_micros) < future_window_micros
                    {
                        return None;
                    }
                    let pending = pending.clone();
                    *state = RecorderState::Idle;
                    pending
                }
            }
        };

        self.commit(pending)
    }

    fn commit(&self, pending: PendingRecording) -> Option<EvidenceRecord> {
        match self.try_commit(&pending) {
            Ok(record) => {
                self.dispatch_saved(&record, &pending);
                Some(record)
            }
            Err(err) => {
                log::error!("evidence_save_error error={err}");
                None
            }
        }
    }

    fn try_commit(&self, pending: &PendingRecording) -> Result<EvidenceRecord, EvidenceError> {
        let past_window_micros = u64::from(self.config.past_context_seconds) * 1_000_000;
        let window_start = pending
            .trigger_event
            .timestamp_micros
            .saturating_sub(past_window_micros);

        let frames = self.ring.get_frames_since(window_start);
        if frames.is_empty() {
            return Err(EvidenceError::NoAudioData);
        }

        let sample_rate = frames[0].sample_rate;
        let channels = frames[0].channels;
        let pcm: Vec<i16> = frames.iter().flat_map(|f| f.pcm.iter().copied()).collect();

        let sample_count_per_channel = pcm.len() / usize::from(channels.max(1));
        let duration_seconds = sample_count_per_channel as f64 / f64::from(sample_rate);

        let trigger_local = micros_to_local(pending.trigger_event.timestamp_micros);
        let timestamp_stem = trigger_local.format("%Y-%m-%d_%H-%M-%S").to_string();
        let wav_filename = format!("{timestamp_stem}_bark.wav");
        let json_filename = format!("{timestamp_stem}_bark.json");

        write_wav_atomic(
            &self.config.directory.join(&wav_filename),
            &pcm,
            sample_rate,
            channels,
        )?;

        let record = EvidenceRecord {
            filename: wav_filename.clone(),
            timestamp_utc: Utc::now(),
            timestamp_local: chrono::Local::now().fixed_offset(),
            duration_seconds,
            sample_rate,
            channels,
            detection: DetectionSummary {
                trigger_probability: pending.trigger_event.probability,
                peak_probability: pending.peak_probability,
                bark_count_in_clip: pending.bark_count,
                doa_bartlett: pending.trigger_event.doa_bartlett,
                doa_capon: pending.trigger_event.doa_capon,
                doa_mem: pending.trigger_event.doa_mem,
            },
            device: DeviceSummary {
                hostname: woof_util::host::hostname(),
                microphone: Some(self.microphone_name.clone()),
            },
        };

        write_json_atomic(&self.config.directory.join(&json_filename), &record)?;

        {
            let mut index = self.index.lock().unwrap();
            index.push(record.clone());
            save_index(&self.config.directory, &index)?;
        }

        log::info!(
            "evidence_saved filename={} duration={:.1}s barks={} peak_prob={:.3}",
            record.filename,
            duration_seconds,
            pending.bark_count,
            pending.peak_probability,
        );

        Ok(record)
    }

    fn dispatch_saved(&self, record: &EvidenceRecord, pending: &PendingRecording) {
        let first_bark = micros_to_utc(pending.first_bark_micros);
        let last_bark = micros_to_utc(pending.last_bark_micros);

        let callbacks = self.callbacks.lock().unwrap();
        for callback in callbacks.iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&record.filename, first_bark, last_bark)
            }));
            if result.is_err() {
                log::warn!("evidence_callback_error filename={}", record.filename);
            }
        }
    }

    pub fn get_recent(&self, count: usize) -> Vec<EvidenceRecord> {
        let index = self.index.lock().unwrap();
        let mut entries = index.entries.clone();
        entries.sort_by(|a, b| b.timestamp_utc.cmp(&a.timestamp_utc));
        entries.truncate(count);
        entries
    }

    pub fn get_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<EvidenceRecord> {
        let index = self.index.lock().unwrap();
        index
            .entries
            .iter()
            .filter(|e| e.timestamp_utc >= start && e.timestamp_utc <= end)
            .cloned()
            .collect()
    }

    /// Deletes evidence matching `before`/`after` (inclusive/exclusive as in
    /// `EvidenceStorage.purge_evidence`). A file that fails to delete keeps
    /// its index entry rather than losing track of orphaned evidence.
    pub fn purge(
        &self,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Result<usize, EvidenceError> {
        let mut index = self.index.lock().unwrap();
        let mut removed = 0;
        let mut keep = Vec::with_capacity(index.entries.len());

        for entry in index.entries.drain(..) {
            let should_delete = match (before, after) {
                (Some(before), Some(after)) => entry.timestamp_utc >= after && entry.timestamp_utc < before,
                (Some(before), None) => entry.timestamp_utc < before,
                (None, Some(after)) => entry.timestamp_utc >= after,
                (None, None) => false,
            };

            if should_delete && self.delete_files(&entry.filename) {
                removed += 1;
                log::info!("evidence_purged filename={}", entry.filename);
            } else {
                if should_delete {
                    log::warn!("evidence_purge_error filename={}", entry.filename);
                }
                keep.push(entry);
            }
        }

        index.entries = keep;
        index.count = index.entries.len();
        save_index(&self.config.directory, &index)?;

        Ok(removed)
    }

    fn delete_files(&self, wav_filename: &str) -> bool {
        let wav_path = self.config.directory.join(wav_filename);
        let json_path = self
            .config
            .directory
            .join(wav_filename.replace(".wav", ".json"));

        let wav_ok = !wav_path.exists() || fs::remove_file(&wav_path).is_ok();
        let json_ok = !json_path.exists() || fs::remove_file(&json_path).is_ok();
        wav_ok && json_ok
    }
}

fn micros_to_utc(micros: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros as i64).unwrap_or_else(Utc::now)
}

fn micros_to_local(micros: u64) -> chrono::DateTime<chrono::Local> {
    micros_to_utc(micros).with_timezone(&chrono::Local)
}

fn write_wav_atomic(
    path: &Path,
    pcm: &[i16],
    sample_rate: u32,
    channels: u16,
) -> Result<(), EvidenceError> {
    let tmp_path = tmp_path_for(path);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    {
        let mut writer = hound::WavWriter::create(&tmp_path, spec)?;
        for &sample in pcm {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn write_json_atomic(path: &Path, record: &EvidenceRecord) -> Result<(), EvidenceError> {
    let tmp_path = tmp_path_for(path);
    let json = serde_json::to_string_pretty(record)?;
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn save_index(directory: &Path, index: &EvidenceIndex) -> Result<(), EvidenceError> {
    let path = directory.join(INDEX_FILENAME);
    let tmp_path = tmp_path_for(&path);
    let json = serde_json::to_string_pretty(index)?;
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn load_index(directory: &Path) -> EvidenceIndex {
    let path = directory.join(INDEX_FILENAME);
    match fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(index) => index,
            Err(err) => {
                log::warn!("evidence_index_load_error error={err}");
                EvidenceIndex::new()
            }
        },
        Err(_) => EvidenceIndex::new(),
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ts: u64, sample_rate: u32, channels: u16, value: i16) -> woof_protocol::AudioFrame {
        woof_protocol::AudioFrame {
            timestamp_micros: ts,
            pcm: vec![value; usize::from(channels)],
            channels,
            sample_rate,
        }
    }

    fn bark_event(ts: u64, is_barking: bool, probability: f32) -> BarkEvent {
        BarkEvent {
            timestamp_micros: ts,
            probability,
            is_barking,
            doa_bartlett: Some(90),
            doa_capon: Some(90),
            doa_mem: Some(90),
            audio_snapshot: None,
            sample_rate: 44_100,
        }
    }

    fn recorder_with_ring() -> (EvidenceRecorder, tempfile::TempDir, Arc<RingBuffer>) {
        let dir = tempfile::tempdir().unwrap();
        let ring = Arc::new(RingBuffer::new(60.0, 44_100, 4_410));
        let config = EvidenceConfig {
            directory: dir.path().to_path_buf(),
            past_context_seconds: 1,
            future_context_seconds: 1,
            include_metadata: true,
            auto_record: true,
        };
        let recorder = EvidenceRecorder::new(config, ring.clone(), "Test Mic").unwrap();
        (recorder, dir, ring)
    }

    #[test]
    fn idle_until_future_window_expires() {
        let (recorder, _dir, ring) = recorder_with_ring();
        for i in 0..5 {
            ring.push(frame(i * 100_000, 44_100, 2, 1000));
        }

        recorder.on_bark_event(&bark_event(0, true, 0.9));
        assert!(recorder.check_and_commit().is_none());
    }

    #[test]
    fn commits_after_future_window_elapses() {
        let (recorder, _dir, ring) = recorder_with_ring();
        for i in 0..20 {
            ring.push(frame(i * 100_000, 44_100, 2, 1000));
        }

        recorder.on_bark_event(&bark_event(0, true, 0.9));

        // Simulate elapsed time by directly forcing the state machine's
        // clock comparison: push a bark far enough in the past relative to
        // wall-clock "now" that the 1s future window has already elapsed.
        let two_seconds_ago = woof_util::time::now_micros().saturating_sub(2_000_000);
        recorder.on_bark_event(&bark_event(two_seconds_ago, true, 0.95));

        let record = recorder.check_and_commit();
        assert!(record.is_some());
        let record = record.unwrap();
        assert!(record.filename.ends_with("_bark.wav"));
        assert_eq!(record.detection.bark_count_in_clip, 2);

        let index_path = _dir.path().join("index.json");
        assert!(index_path.exists());
    }

    #[test]
    fn non_barking_events_are_ignored() {
        let (recorder, _dir, _ring) = recorder_with_ring();
        recorder.on_bark_event(&bark_event(0, false, 0.1));
        assert!(recorder.check_and_commit().is_none());
    }
}
