//! Coordinates debouncing and webhook delivery off the detection hot path.
//!
//! Grounded on `NotificationManager` in the original Python
//! `events/manager.py`, which hands each notification to a
//! `ThreadPoolExecutor(max_workers=2)` so a slow or stuck webhook can never
//! stall bark detection. This generalizes the single named worker thread
//! pattern (`woof_util::thread::start`) used elsewhere in this workspace
//! into a small fixed pool fed by a bounded channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use woof_protocol::config::WebhookConfig;

use crate::debouncer::{Debouncer, DebouncerStats};
use crate::event::NotificationEvent;
use crate::webhook::{WebhookNotifier, WebhookStats};
use crate::NotifyError;

const WORKER_COUNT: usize = 2;
const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct ManagerStats {
    pub events_received: u64,
    pub notifications_sent: u64,
    pub debouncer: DebouncerStats,
    pub webhook: WebhookStats,
}

pub struct NotificationManager {
    sender: SyncSender<NotificationEvent>,
    debouncer: Arc<Debouncer>,
    webhook: Arc<WebhookNotifier>,
    events_received: Arc<AtomicU64>,
    notifications_sent: Arc<AtomicU64>,
}

impl NotificationManager {
    pub fn new(config: WebhookConfig) -> Result<Self, NotifyError> {
        let debounce_seconds = config.debounce_seconds;
        let debouncer = Arc::new(Debouncer::new(debounce_seconds));
        let webhook = Arc::new(WebhookNotifier::new(config)?);
        let events_received = Arc::new(AtomicU64::new(0));
        let notifications_sent = Arc::new(AtomicU64::new(0));

        let (sender, receiver) = sync_channel(QUEUE_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));

        const WORKER_NAMES: [&str; WORKER_COUNT] = ["woof-notify-0", "woof-notify-1"];
        for name in WORKER_NAMES {
            let receiver = Arc::clone(&receiver);
            let debouncer = Arc::clone(&debouncer);
            let webhook = Arc::clone(&webhook);
            let notifications_sent = Arc::clone(&notifications_sent);
            woof_util::thread::start(name, move || {
                run_worker(receiver, debouncer, webhook, notifications_sent);
            });
        }

        Ok(NotificationManager {
            sender,
            debouncer,
            webhook,
            events_received,
            notifications_sent,
        })
    }

    /// Non-blocking: a full queue drops the event rather than stalling the
    /// caller, which normally sits on the detection hot path.
    pub fn notify(
        &self,
        timestamp: DateTime<Utc>,
        probability: f32,
        doa_degrees: Option<f32>,
        dog_id: Option<String>,
        dog_name: Option<String>,
        match_confidence: Option<f32>,
        evidence_filename: Option<String>,
    ) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        let event = NotificationEvent {
            timestamp,
            probability,
            doa_degrees,
            dog_id,
            dog_name,
            match_confidence,
            evidence_filename,
        };
        if self.sender.try_send(event).is_err() {
            log::warn!("notification_queue_full dropping_event");
        }
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            debouncer: self.debouncer.stats(),
            webhook: self.webhook.stats(),
        }
    }
}

fn run_worker(
    receiver: Arc<Mutex<Receiver<NotificationEvent>>>,
    debouncer: Arc<Debouncer>,
    webhook: Arc<WebhookNotifier>,
    notifications_sent: Arc<AtomicU64>,
) {
    loop {
        let event = {
            let receiver = receiver.lock().unwrap();
            receiver.recv()
        };
        let event = match event {
            Ok(event) => event,
            Err(_) => return,
        };

        if !debouncer.should_notify(event.dog_id.as_deref(), event.timestamp) {
            continue;
        }

        if webhook.notify(&event) {
            notifications_sent.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_increments_events_received_immediately() {
        let manager = NotificationManager::new(WebhookConfig::default()).unwrap();
        manager.notify(Utc::now(), 0.8, None, None, None, None, None);
        // Worker dispatch happens on a background thread; only the
        // synchronous counter is guaranteed observable right away.
        assert_eq!(manager.stats().events_received, 1);
    }
}
