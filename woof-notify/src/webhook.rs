//! Outbound webhook delivery for IFTTT Maker Webhooks and arbitrary custom
//! endpoints. Grounded on `WebhookNotifier` in the original Python
//! `events/webhook.py`: same retry/backoff shape, same two delivery targets.
//!
//! SSRF protection (rejecting loopback/private/reserved custom URLs) is
//! enforced once, at config-validation time, by
//! `woof_protocol::config::WebhookConfig::validate` — this module trusts
//! that a `WebhookConfig` reaching it already passed that check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use reqwest::blocking::Client;
use woof_protocol::config::WebhookConfig;

use crate::event::NotificationEvent;
use crate::NotifyError;

const IFTTT_URL_BASE: &str = "https://maker.ifttt.com/trigger";

#[derive(Debug, Clone, Copy)]
pub struct WebhookStats {
    pub sent: u64,
    pub errors: u64,
    pub ifttt_configured: bool,
    pub custom_url_configured: bool,
}

pub struct WebhookNotifier {
    config: WebhookConfig,
    client: Client,
    sent: AtomicU64,
    errors: AtomicU64,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs_f32(config.timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(WebhookNotifier {
            config,
            client,
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    /// Delivers `event` to every configured target. Returns `true` if at
    /// least one configured target accepted the delivery.
    pub fn notify(&self, event: &NotificationEvent) -> bool {
        let mut any_ok = false;

        if !self.config.ifttt_key.is_empty() {
            any_ok |= self.send_with_retry("ifttt", || self.send_ifttt(event));
        }

        if let Some(url) = self.config.custom_url.clone() {
            any_ok |= self.send_with_retry("custom", || self.send_custom(&url, event));
        }

        any_ok
    }

    fn send_ifttt(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let url = format!(
            "{IFTTT_URL_BASE}/{}/with/key/{}",
            self.config.ifttt_event, self.config.ifttt_key
        );
        self.client
            .post(&url)
            .json(&event.to_ifttt_values())
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn send_custom(&self, url: &str, event: &NotificationEvent) -> Result<(), NotifyError> {
        let mut request = self.client.post(url).json(&event.to_webhook_payload());
        if !self.config.custom_auth_token.is_empty() {
            request = request.bearer_auth(&self.config.custom_auth_token);
        }
        for (name, value) in &self.config.custom_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request.send()?.error_for_status()?;
        Ok(())
    }

    /// Exponential backoff with jitter: `min(2^attempt, 10) + U(0, 0.3*base)`
    /// seconds between attempts. Never retries a 4xx response.
    fn send_with_retry(&self, label: &str, send: impl Fn() -> Result<(), NotifyError>) -> bool {
        for attempt in 0..=self.config.retry_count {
            match send() {
                Ok(()) => {
                    self.sent.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(err) => {
                    let is_client_error = err
                        .status()
                        .map(|s| s.is_client_error())
                        .unwrap_or(false);
                    if is_client_error || attempt == self.config.retry_count {
                        log::warn!("webhook_delivery_failed target={label} error={err}");
                        self.errors.fetch_add(1, Ordering::Relaxed);
                        return false;
                    }
                    let base = 2f64.powi(attempt as i32).min(10.0);
                    let jitter = rand::thread_rng().gen_range(0.0..(0.3 * base));
                    log::debug!(
                        "webhook_retry target={label} attempt={attempt} backoff={:.2}s",
                        base + jitter
                    );
                    std::thread::sleep(Duration::from_secs_f64(base + jitter));
                }
            }
        }
        false
    }

    pub fn stats(&self) -> WebhookStats {
        WebhookStats {
            sent: self.sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            ifttt_configured: !self.config.ifttt_key.is_empty(),
            custom_url_configured: self.config.custom_url.is_some(),
        }
    }
}

impl NotifyError {
    fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            NotifyError::Http(err) => err.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_reflect_which_targets_are_configured() {
        let mut config = WebhookConfig::default();
        config.ifttt_key = "key".to_string();
        let notifier = WebhookNotifier::new(config).unwrap();
        let stats = notifier.stats();
        assert!(stats.ifttt_configured);
        assert!(!stats.custom_url_configured);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn notify_with_nothing_configured_reports_no_delivery() {
        let config = WebhookConfig::default();
        let notifier = WebhookNotifier::new(config).unwrap();
        let event = NotificationEvent {
            timestamp: chrono::Utc::now(),
            probability: 0.5,
            doa_degrees: None,
            dog_id: None,
            dog_name: None,
            match_confidence: None,
            evidence_filename: None,
        };
        assert!(!notifier.notify(&event));
    }
}
