//! Wires the component crates together into one running service, the way
//! `bark/src/main.rs` wires `bark-device`/`bark-core` behind a couple of
//! `Opt` subcommands. Here there is only one mode: capture, detect, record
//! evidence, attribute to a dog, and notify.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use woof_audio::Capture;
use woof_detect::gates::clap::ClapGate;
use woof_detect::gates::harmonic::HarmonicGate;
use woof_detect::gates::tagger::TaggerGate;
use woof_detect::gates::vad::VadGate;
use woof_detect::gates::{NullClassifier, NullHarmonicSeparator, NullTagger};
use woof_detect::{DetectionEngine, EngineConfig, GateChain};
use woof_evidence::EvidenceRecorder;
use woof_fingerprint::{FingerprintMatcher, FingerprintStore};
use woof_notify::NotificationManager;
use woof_protocol::config::Config;
use woof_protocol::event::DoaMethod;
use woof_protocol::BarkEvent;

use crate::error::EngineError;

const POSITIVE_LABELS: &[&str] = &["a dog barking", "a dog howling", "a dog growling"];
const NEGATIVE_LABELS: &[&str] = &[
    "human speech",
    "silence",
    "music",
    "a bird chirping",
    "a cat meowing",
    "traffic noise",
];
const BIRD_LABELS: &[&str] = &["a bird chirping"];

/// Demonstration-grade classifier fan-out: `ClapGate` and the fingerprint
/// matcher each need their own `&mut dyn ZeroShotClassifier`. No model
/// backend ships with this crate, so both get a `NullClassifier` here; an
/// integrator supplying a real backend would construct and share one
/// loaded model between the two instead.
pub struct Engine {
    config: Config,
    capture: Capture,
    detection: Arc<DetectionEngine>,
    evidence: Arc<EvidenceRecorder>,
    store: Arc<FingerprintStore>,
    notify: Arc<NotificationManager>,
    committer_running: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self, EngineError> {
        config.validate()?;

        let capture = Capture::start(
            config.audio.device_name.as_deref(),
            config.audio.sample_rate,
            config.audio.channels,
            config.audio.chunk_size,
            30.0,
        )?;
        let ring = capture.ring_buffer();

        let db_path = config.evidence.directory.join("fingerprints.db");
        let store = Arc::new(FingerprintStore::new(&db_path)?);

        let evidence = Arc::new(EvidenceRecorder::new(
            config.evidence.clone(),
            ring.clone(),
            config
                .audio
                .device_name
                .clone()
                .unwrap_or_else(|| "default".to_string()),
        )?);

        let notify = Arc::new(NotificationManager::new(config.webhook.clone())?);

        let engine_config = EngineConfig {
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels,
            chunk_size: config.audio.chunk_size,
            tick_period: Duration::from_millis(200),
            microphone_name: config.audio.device_name.clone(),

            vad_enabled: config.model.vad_enabled,
            vad_threshold_db: config.model.vad_threshold_db,
            min_samples: (config.audio.sample_rate / 2) as usize,
            tagger_enabled: config.model.tagger_enabled,
            tagger_threshold: config.model.tagger_threshold,
            min_harmonic_ratio: config.model.min_harmonic_ratio,
            harmonic_enabled: false,
            clap_threshold: config.model.clap_threshold,
            bird_veto_threshold: config.model.bird_veto_threshold,
            positive_labels: POSITIVE_LABELS.iter().map(|s| s.to_string()).collect(),
            negative_labels: NEGATIVE_LABELS.iter().map(|s| s.to_string()).collect(),
            bird_labels: BIRD_LABELS.iter().map(|s| s.to_string()).collect(),

            doa_enabled: config.doa.enabled,
            doa_element_spacing: config.doa.element_spacing,
            doa_angle_min: config.doa.angle_min,
            doa_angle_max: config.doa.angle_max,
        };

        let gate_chain = GateChain::new(vec![
            Box::new(VadGate::new()),
            Box::new(TaggerGate::new(Box::new(NullTagger))),
            Box::new(HarmonicGate::new(Box::new(NullHarmonicSeparator))),
            Box::new(ClapGate::new(Box::new(NullClassifier))),
        ]);

        let quiet_hours = config.quiet_hours.clone();
        let threshold_fn: Box<dyn Fn(f32) -> f32 + Send + Sync> =
            Box::new(move |default| woof_notify::quiet_hours::get_threshold(&quiet_hours, default));

        let detection = DetectionEngine::new(engine_config, ring, gate_chain, threshold_fn);

        let evidence_for_callback = evidence.clone();
        let store_for_callback = store.clone();
        let notify_for_callback = notify.clone();
        let quiet_hours_notifications = config.quiet_hours.clone();
        let notification_enabled = config.notification.enabled;
        let classifier_for_matching: Arc<Mutex<NullClassifier>> =
            Arc::new(Mutex::new(NullClassifier));

        detection.register_callback(Box::new(move |event: &BarkEvent| {
            evidence_for_callback.on_bark_event(event);

            if !event.is_barking {
                return;
            }
            let Some(snapshot) = &event.audio_snapshot else {
                return;
            };

            let mono = snapshot.to_mono_f32();
            let mut classifier = classifier_for_matching.lock().unwrap();
            let mut matcher = FingerprintMatcher::new(&store_for_callback, &mut *classifier);
            match matcher.process_bark(
                &mono,
                snapshot.sample_rate,
                event.probability,
                event.doa_degrees(DoaMethod::Bartlett),
                None,
            ) {
                Ok((fingerprint, matches)) => {
                    if let Some(best) = matches.first() {
                        log::info!(
                            "bark_identified dog_id={} confidence={:.3}",
                            best.dog_id,
                            best.confidence
                        );
                    }

                    if notification_enabled {
                        let now = woof_util::time::now_utc();
                        let dog_name = fingerprint
                            .dog_id
                            .as_ref()
                            .and_then(|id| store_for_callback.get_dog(id).ok().flatten())
                            .map(|dog| dog.name);
                        let suppressed_by_quiet_hours = woof_notify::quiet_hours::is_active(
                            &quiet_hours_notifications,
                            now,
                        ) && !quiet_hours_notifications.notifications;
                        if !suppressed_by_quiet_hours {
                            notify_for_callback.notify(
                                now,
                                event.probability,
                                event.doa_degrees(DoaMethod::Bartlett).map(|d| d as f32),
                                fingerprint.dog_id.clone(),
                                dog_name,
                                fingerprint.match_confidence,
                                None,
                            );
                        }
                    }
                }
                Err(err) => {
                    log::warn!("fingerprint_processing_error error={err}");
                }
            }
        }));

        Ok(Engine {
            config,
            capture,
            detection,
            evidence,
            store,
            notify,
            committer_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Starts the detection tick thread and a ~1 Hz evidence committer
    /// thread, then blocks forever: a single long-running loop with no
    /// return short of a fatal error.
    pub fn run(self: Arc<Self>) -> Result<(), EngineError> {
        self.detection.start();

        self.committer_running.store(true, Ordering::SeqCst);
        let evidence = self.evidence.clone();
        let running = self.committer_running.clone();
        woof_util::thread::start("woof/committer", move || {
            while running.load(Ordering::Relaxed) {
                evidence.check_and_commit();
                std::thread::sleep(Duration::from_secs(1));
            }
        });

        log::info!(
            "woofalytics_started sample_rate={} channels={}",
            self.config.audio.sample_rate,
            self.config.audio.channels
        );

        loop {
            std::thread::sleep(Duration::from_secs(1));
            if self.capture.has_errored() {
                log::error!("capture stream reported a fatal error, stopping");
                break;
            }
        }

        self.detection.stop();
        self.committer_running.store(false, Ordering::SeqCst);

        Ok(())
    }

    pub fn store(&self) -> &Arc<FingerprintStore> {
        &self.store
    }

    pub fn notify(&self) -> &Arc<NotificationManager> {
        &self.notify
    }
}
