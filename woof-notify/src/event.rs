//! The payload a bark attribution turns into before it reaches a webhook.
//! Mirrors `NotificationEvent` in the original Python `events/models.py`.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub timestamp: DateTime<Utc>,
    pub probability: f32,
    pub doa_degrees: Option<f32>,
    pub dog_id: Option<String>,
    pub dog_name: Option<String>,
    pub match_confidence: Option<f32>,
    pub evidence_filename: Option<String>,
}

impl NotificationEvent {
    pub fn to_ifttt_values(&self) -> Value {
        json!({
            "value1": self.dog_name.clone().unwrap_or_else(|| "Unknown Dog".to_string()),
            "value2": self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            "value3": format!("{}% confidence", (self.probability * 100.0).round() as i64),
        })
    }

    pub fn to_webhook_payload(&self) -> Value {
        json!({
            "event": "bark_detected",
            "timestamp": self.timestamp.to_rfc3339(),
            "dog": {
                "id": self.dog_id,
                "name": self.dog_name,
                "confidence": self.match_confidence,
            },
            "detection": {
                "probability": self.probability,
                "direction_degrees": self.doa_degrees,
            },
            "evidence_file": self.evidence_filename,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> NotificationEvent {
        NotificationEvent {
            timestamp: Utc::now(),
            probability: 0.873,
            doa_degrees: Some(42.0),
            dog_id: Some("dog-1".to_string()),
            dog_name: Some("Rex".to_string()),
            match_confidence: Some(0.91),
            evidence_filename: Some("2026-01-11_22-00-00.wav".to_string()),
        }
    }

    #[test]
    fn ifttt_values_round_confidence_to_a_percent() {
        let values = sample_event().to_ifttt_values();
        assert_eq!(values["value3"], "87% confidence");
        assert_eq!(values["value1"], "Rex");
    }

    #[test]
    fn unknown_dog_falls_back_to_placeholder_name() {
        let mut event = sample_event();
        event.dog_name = None;
        let values = event.to_ifttt_values();
        assert_eq!(values["value1"], "Unknown Dog");
    }

    #[test]
    fn webhook_payload_carries_detection_and_dog_fields() {
        let payload = sample_event().to_webhook_payload();
        assert_eq!(payload["event"], "bark_detected");
        assert_eq!(payload["dog"]["name"], "Rex");
        assert_eq!(payload["detection"]["direction_degrees"], 42.0);
    }
}
