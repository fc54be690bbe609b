//! The detection engine's tick loop, run on a dedicated thread in the
//! teacher's `bark/src/receive.rs` style: a `loop { ... }` thread body
//! that never lets an error escape to the caller.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use woof_audio::{RingBuffer, ResampleCache};
use woof_protocol::BarkEvent;

use crate::doa;
use crate::gates::{GateChain, TickContext};
use crate::stats::GateStatsSnapshot;

const RECENT_EVENTS_CAP: usize = 100;
const SNAPSHOT_SECONDS: f64 = 1.0;
const MIN_FILL_RATIO: f64 = 0.5;
/// Rate the tagger model expects its input at (see `AudioTagger::score`).
const TAGGER_SAMPLE_RATE: u32 = 16_000;

pub struct EngineConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_size: usize,
    pub tick_period: Duration,
    pub microphone_name: Option<String>,

    pub vad_enabled: bool,
    pub vad_threshold_db: f32,
    pub min_samples: usize,
    pub tagger_enabled: bool,
    pub tagger_threshold: f32,
    pub min_harmonic_ratio: f32,
    pub harmonic_enabled: bool,
    pub clap_threshold: f32,
    pub bird_veto_threshold: f32,
    pub positive_labels: Vec<String>,
    pub negative_labels: Vec<String>,
    pub bird_labels: Vec<String>,

    pub doa_enabled: bool,
    pub doa_element_spacing: f32,
    pub doa_angle_min: i32,
    pub doa_angle_max: i32,
}

pub struct EngineStatus {
    pub running: bool,
    pub uptime_seconds: f64,
    pub total_barks: u64,
    pub microphone_name: Option<String>,
    pub vad_stats: GateStatsSnapshot,
    pub tagger_stats: GateStatsSnapshot,
}

type Callback = Box<dyn Fn(&BarkEvent) + Send + Sync>;
/// Supplied by the embedding application so the engine need not depend
/// on the notification crate's quiet-hours policy directly.
type ThresholdFn = Box<dyn Fn(f32) -> f32 + Send + Sync>;

pub struct DetectionEngine {
    config: EngineConfig,
    ring: Arc<RingBuffer>,
    gate_chain: Mutex<GateChain>,
    resample_cache: Mutex<ResampleCache>,
    threshold_fn: ThresholdFn,

    running: Arc<AtomicBool>,
    start_time: Mutex<Option<Instant>>,
    total_barks: AtomicU64,
    last_event: Mutex<Option<BarkEvent>>,
    recent_events: Mutex<VecDeque<BarkEvent>>,
    callbacks: Mutex<Vec<Callback>>,

    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DetectionEngine {
    pub fn new(
        config: EngineConfig,
        ring: Arc<RingBuffer>,
        gate_chain: GateChain,
        threshold_fn: ThresholdFn,
    ) -> Arc<Self> {
        Arc::new(DetectionEngine {
            config,
            ring,
            gate_chain: Mutex::new(gate_chain),
            resample_cache: Mutex::new(ResampleCache::new()),
            threshold_fn,
            running: Arc::new(AtomicBool::new(false)),
            start_time: Mutex::new(None),
            total_barks: AtomicU64::new(0),
            last_event: Mutex::new(None),
            recent_events: Mutex::new(VecDeque::with_capacity(RECENT_EVENTS_CAP)),
            callbacks: Mutex::new(Vec::new()),
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }

    pub fn register_callback(&self, callback: Callback) {
        self.callbacks.lock().unwrap().push(callback);
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        *self.start_time.lock().unwrap() = Some(Instant::now());

        let (tx, rx) = mpsc::channel();
        *self.shutdown_tx.lock().unwrap() = Some(tx);

        let engine = self.clone();
        let handle = woof_util::thread::start("woof/detect", move || {
            loop {
                if rx.try_recv().is_ok() {
                    break;
                }

                engine.run_tick();

                std::thread::sleep(engine.config.tick_period);
            }

            engine.running.store(false, Ordering::SeqCst);
        });

        *self.handle.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn run_tick(&self) {
        let needed = ((SNAPSHOT_SECONDS * f64::from(self.config.sample_rate))
            / self.config.chunk_size.max(1) as f64)
            .ceil() as usize;
        let frames = self.ring.get_recent_frames(needed);

        if frames.is_empty() || (frames.len() as f64) < needed as f64 * MIN_FILL_RATIO {
            return;
        }

        let mono: Vec<f32> = frames.iter().flat_map(|f| f.to_mono_f32()).collect();
        let multichannel: Vec<Vec<f32>> = reshape_channels(&frames, self.config.channels);

        let positive_labels: Vec<&str> =
            self.config.positive_labels.iter().map(String::as_str).collect();
        let negative_labels: Vec<&str> =
            self.config.negative_labels.iter().map(String::as_str).collect();
        let bird_labels: Vec<&str> =
            self.config.bird_labels.iter().map(String::as_str).collect();

        let effective_clap_threshold = (self.threshold_fn)(self.config.clap_threshold);

        let mut resample_cache = self.resample_cache.lock().unwrap();
        resample_cache.clear();
        let mono_16k = resample_cache
            .get_resampled(&mono, self.config.sample_rate, TAGGER_SAMPLE_RATE)
            .unwrap_or_else(|e| {
                log::warn!("resample to tagger rate failed, falling back to native rate: {e}");
                std::sync::Arc::from(mono.as_slice())
            });
        drop(resample_cache);

        let mut ctx = TickContext {
            mono: &mono,
            mono_16k: &mono_16k,
            sample_rate: self.config.sample_rate,
            vad_enabled: self.config.vad_enabled,
            vad_threshold_db: self.config.vad_threshold_db,
            min_samples: self.config.min_samples,
            tagger_enabled: self.config.tagger_enabled,
            tagger_threshold: self.config.tagger_threshold,
            min_harmonic_ratio: self.config.min_harmonic_ratio,
            harmonic_enabled: self.config.harmonic_enabled,
            clap_threshold: effective_clap_threshold,
            bird_veto_threshold: self.config.bird_veto_threshold,
            positive_labels: &positive_labels,
            negative_labels: &negative_labels,
            bird_labels: &bird_labels,
            rms_db: None,
            tagger_scores: None,
            harmonic_ratio: None,
            bark_prob: None,
            is_barking: false,
        };

        let result = self.gate_chain.lock().unwrap().run_all(&mut ctx);
        if !result.reached_end {
            return;
        }

        let doa = if self.config.doa_enabled && self.config.channels >= 2 {
            let estimate = doa::estimate(
                &multichannel,
                self.config.doa_element_spacing,
                self.config.doa_angle_min,
                self.config.doa_angle_max,
            );
            (
                Some(estimate.bartlett),
                Some(estimate.capon),
                Some(estimate.mem),
            )
        } else {
            (None, None, None)
        };

        let is_barking = ctx.is_barking;
        let event = BarkEvent {
            timestamp_micros: woof_util::time::now_micros(),
            probability: ctx.bark_prob.unwrap_or(0.0),
            is_barking,
            doa_bartlett: doa.0,
            doa_capon: doa.1,
            doa_mem: doa.2,
            audio_snapshot: if is_barking {
                frames.first().cloned()
            } else {
                None
            },
            sample_rate: self.config.sample_rate,
        };

        if is_barking {
            self.total_barks.fetch_add(1, Ordering::Relaxed);
        }

        *self.last_event.lock().unwrap() = Some(event.clone());
        {
            let mut recent = self.recent_events.lock().unwrap();
            if recent.len() >= RECENT_EVENTS_CAP {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        self.dispatch(&event);
    }

    fn dispatch(&self, event: &BarkEvent) {
        let callbacks = self.callbacks.lock().unwrap();
        for callback in callbacks.iter() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(event)));
            if result.is_err() {
                log::error!("detection callback panicked; continuing");
            }
        }
    }

    pub fn get_status(&self) -> EngineStatus {
        let uptime_seconds = self
            .start_time
            .lock()
            .unwrap()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let stats = self.gate_chain.lock().unwrap().gate_stats();
        let vad_stats = stats
            .iter()
            .find(|(name, _)| *name == "vad")
            .map(|(_, s)| *s)
            .unwrap_or(GateStatsSnapshot {
                passed: 0,
                skipped: 0,
                total: 0,
                skip_rate: 0.0,
            });
        let tagger_stats = stats
            .iter()
            .find(|(name, _)| *name == "tagger")
            .map(|(_, s)| *s)
            .unwrap_or(GateStatsSnapshot {
                passed: 0,
                skipped: 0,
                total: 0,
                skip_rate: 0.0,
            });

        EngineStatus {
            running: self.running.load(Ordering::Relaxed),
            uptime_seconds,
            total_barks: self.total_barks.load(Ordering::Relaxed),
            microphone_name: self.config.microphone_name.clone(),
            vad_stats,
            tagger_stats,
        }
    }

    pub fn get_last_event(&self) -> Option<BarkEvent> {
        self.last_event.lock().unwrap().clone()
    }

    pub fn get_recent_events(&self, n: usize) -> Vec<BarkEvent> {
        let recent = self.recent_events.lock().unwrap();
        let start = recent.len().saturating_sub(n);
        recent.iter().skip(start).cloned().collect()
    }
}

fn reshape_channels(frames: &[woof_protocol::AudioFrame], channels: u16) -> Vec<Vec<f32>> {
    let mut planes = vec![Vec::new(); usize::from(channels.max(1))];
    for frame in frames {
        for (plane, frame_plane) in planes.iter_mut().zip(frame.to_channel_planes()) {
            plane.extend(frame_plane);
        }
    }
    planes
}
