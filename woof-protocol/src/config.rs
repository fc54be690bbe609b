//! The core's external configuration surface (spec §6). Constructed by
//! value by the embedding application; no YAML/TOML parsing lives here
//! (that belongs to an external collaborator per spec §1's non-goals).

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub device_name: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_size: usize,
    pub volume_percent: u8,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            device_name: None,
            sample_rate: 44_100,
            channels: 2,
            chunk_size: 441,
            volume_percent: 75,
        }
    }
}

impl AudioConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        range_u32("audio.sample_rate", self.sample_rate, 8_000, 192_000)?;
        range_u16("audio.channels", self.channels, 1, 8)?;
        range_usize("audio.chunk_size", self.chunk_size, 64, 4096)?;
        range_u8("audio.volume_percent", self.volume_percent, 0, 100)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub clap_threshold: f32,
    pub bird_veto_threshold: f32,
    pub min_harmonic_ratio: f32,
    pub vad_enabled: bool,
    pub vad_threshold_db: f32,
    pub tagger_enabled: bool,
    pub tagger_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            clap_threshold: 0.6,
            bird_veto_threshold: 0.15,
            min_harmonic_ratio: 0.1,
            vad_enabled: true,
            vad_threshold_db: -40.0,
            tagger_enabled: true,
            tagger_threshold: 0.05,
        }
    }
}

impl ModelConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        range_f32("model.clap_threshold", self.clap_threshold, 0.0, 1.0)?;
        range_f32(
            "model.bird_veto_threshold",
            self.bird_veto_threshold,
            0.0,
            1.0,
        )?;
        range_f32(
            "model.min_harmonic_ratio",
            self.min_harmonic_ratio,
            0.0,
            1.0,
        )?;
        range_f32("model.vad_threshold_db", self.vad_threshold_db, -80.0, 0.0)?;
        range_f32("model.tagger_threshold", self.tagger_threshold, 0.0, 1.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoaMethod {
    Bartlett,
    Capon,
    Mem,
}

#[derive(Debug, Clone)]
pub struct DoaConfig {
    pub enabled: bool,
    pub element_spacing: f32,
    pub num_elements: u32,
    pub angle_min: i32,
    pub angle_max: i32,
    pub method: DoaMethod,
}

impl Default for DoaConfig {
    fn default() -> Self {
        DoaConfig {
            enabled: true,
            element_spacing: 0.1,
            num_elements: 2,
            angle_min: 0,
            angle_max: 180,
            method: DoaMethod::Bartlett,
        }
    }
}

impl DoaConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        range_f32("doa.element_spacing", self.element_spacing, 0.01, 1.0)?;
        if self.num_elements < 2 {
            return Err(ConfigError::InsufficientArrayElements(self.num_elements));
        }
        if self.angle_min > self.angle_max {
            return Err(ConfigError::InvalidAngleRange(self.angle_min, self.angle_max));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EvidenceConfig {
    pub directory: std::path::PathBuf,
    pub past_context_seconds: u32,
    pub future_context_seconds: u32,
    pub include_metadata: bool,
    pub auto_record: bool,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        EvidenceConfig {
            directory: std::path::PathBuf::from("./evidence"),
            past_context_seconds: 15,
            future_context_seconds: 15,
            include_metadata: true,
            auto_record: true,
        }
    }
}

impl EvidenceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        range_u32(
            "evidence.past_context_seconds",
            self.past_context_seconds,
            1,
            60,
        )?;
        range_u32(
            "evidence.future_context_seconds",
            self.future_context_seconds,
            1,
            60,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub ifttt_event: String,
    /// Secret: IFTTT Maker Webhooks API key.
    pub ifttt_key: String,
    pub custom_url: Option<String>,
    pub custom_headers: HashMap<String, String>,
    /// Secret: bearer token for the custom webhook.
    pub custom_auth_token: String,
    pub timeout_seconds: f32,
    pub retry_count: u32,
    pub debounce_seconds: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            enabled: false,
            ifttt_event: "woof".to_string(),
            ifttt_key: String::new(),
            custom_url: None,
            custom_headers: HashMap::new(),
            custom_auth_token: String::new(),
            timeout_seconds: 10.0,
            retry_count: 2,
            debounce_seconds: 300,
        }
    }
}

const BLOCKED_WEBHOOK_HOSTS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "0.0.0.0",
    "metadata.google",
    "169.254.169.254",
];

impl WebhookConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        range_f32("webhook.timeout_seconds", self.timeout_seconds, 1.0, 30.0)?;
        range_u32("webhook.retry_count", self.retry_count, 0, 5)?;
        range_u32(
            "webhook.debounce_seconds",
            self.debounce_seconds,
            60,
            3600,
        )?;

        if let Some(url) = &self.custom_url {
            validate_webhook_url(url)?;
        }

        Ok(())
    }
}

/// SSRF guard, applied at config load time so a bad webhook target never
/// reaches the runtime HTTP client (spec §4.10, §7 "SSRF guard violation").
fn validate_webhook_url(raw: &str) -> Result<(), ConfigError> {
    let parsed =
        url::Url::parse(raw).map_err(|_| ConfigError::WebhookInvalidUrl(raw.to_string()))?;

    if parsed.scheme() != "https" {
        return Err(ConfigError::WebhookNotHttps(raw.to_string()));
    }

    let Some(host) = parsed.host_str() else {
        return Err(ConfigError::WebhookInvalidUrl(raw.to_string()));
    };

    if BLOCKED_WEBHOOK_HOSTS.contains(&host.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::WebhookBlockedHost(host.to_string()));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_loopback_or_reserved(ip) {
            return Err(ConfigError::WebhookPrivateAddress(raw.to_string()));
        }
    }

    Ok(())
}

/// `std` only stabilises `is_private`/`is_loopback` for `Ipv4Addr`, and has
/// no `is_reserved` at all on stable; this replicates the IPv4 reserved
/// block list `ipaddress.IPv4Address.is_reserved` uses in the original
/// Python implementation, plus the obvious IPv6 loopback/link-local/ULA
/// ranges.
pub fn is_private_loopback_or_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_loopback_or_reserved_v4(v4),
        IpAddr::V6(v6) => is_private_loopback_or_reserved_v6(v6),
    }
}

fn is_private_loopback_or_reserved_v4(ip: Ipv4Addr) -> bool {
    if ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified() {
        return true;
    }
    let octets = ip.octets();
    matches!(
        octets,
        // 0.0.0.0/8
        [0, ..]
        // 100.64.0.0/10 (CGNAT)
        | [100, 64..=127, ..]
        // 192.0.0.0/24, 192.0.2.0/24 (TEST-NET-1)
        | [192, 0, 0 | 2, ..]
        // 198.18.0.0/15, 198.51.100.0/24 (TEST-NET-2)
        | [198, 18 | 19, ..]
        | [198, 51, 100, ..]
        // 203.0.113.0/24 (TEST-NET-3)
        | [203, 0, 113, ..]
        // 224.0.0.0/4 (multicast) .. 255.255.255.255/32 (broadcast)
        | [224..=255, ..]
    )
}

fn is_private_loopback_or_reserved_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_loopback_or_reserved_v4(v4);
    }
    let segments = ip.segments();
    // fc00::/7 (unique local), fe80::/10 (link-local)
    (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80
}

#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct QuietHoursConfig {
    pub enabled: bool,
    pub start_hhmm: String,
    pub end_hhmm: String,
    pub threshold: f32,
    pub notifications: bool,
    pub timezone: String,
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        QuietHoursConfig {
            enabled: false,
            start_hhmm: "22:00".to_string(),
            end_hhmm: "06:00".to_string(),
            threshold: 0.9,
            notifications: false,
            timezone: "UTC".to_string(),
        }
    }
}

impl QuietHoursConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        range_f32("quiet_hours.threshold", self.threshold, 0.0, 1.0)?;
        parse_hhmm(&self.start_hhmm)?;
        parse_hhmm(&self.end_hhmm)?;
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))?;
        Ok(())
    }
}

pub fn parse_hhmm(s: &str) -> Result<(u32, u32), ConfigError> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| ConfigError::InvalidTimeString(s.to_string()))?;
    let h: u32 = h
        .parse()
        .map_err(|_| ConfigError::InvalidTimeString(s.to_string()))?;
    let m: u32 = m
        .parse()
        .map_err(|_| ConfigError::InvalidTimeString(s.to_string()))?;
    if h > 23 || m > 59 {
        return Err(ConfigError::InvalidTimeString(s.to_string()));
    }
    Ok((h, m))
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub audio: AudioConfig,
    pub model: ModelConfig,
    pub doa: DoaConfig,
    pub evidence: EvidenceConfig,
    pub webhook: WebhookConfig,
    pub notification: NotificationConfig,
    pub quiet_hours: QuietHoursConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        self.model.validate()?;
        self.doa.validate()?;
        self.evidence.validate()?;
        self.webhook.validate()?;
        self.quiet_hours.validate()?;
        Ok(())
    }
}

fn range_f32(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            min: min as f64,
            max: max as f64,
            value: value as f64,
        });
    }
    Ok(())
}

fn range_u32(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            min: min as f64,
            max: max as f64,
            value: value as f64,
        });
    }
    Ok(())
}

fn range_u16(field: &'static str, value: u16, min: u16, max: u16) -> Result<(), ConfigError> {
    range_u32(field, u32::from(value), u32::from(min), u32::from(max))
}

fn range_u8(field: &'static str, value: u8, min: u8, max: u8) -> Result<(), ConfigError> {
    range_u32(field, u32::from(value), u32::from(min), u32::from(max))
}

fn range_usize(field: &'static str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    range_u32(field, value as u32, min as u32, max as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().expect("defaults must validate");
    }

    #[test]
    fn rejects_http_webhook_url() {
        let mut cfg = WebhookConfig::default();
        cfg.custom_url = Some("http://example.com/hook".to_string());
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::WebhookNotHttps(_))
        ));
    }

    #[test]
    fn rejects_private_ip_webhook_url() {
        let mut cfg = WebhookConfig::default();
        cfg.custom_url = Some("https://10.0.0.5/hook".to_string());
        cfg.timeout_seconds = 10.0;
        cfg.debounce_seconds = 300;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::WebhookPrivateAddress(_))
        ));
    }

    #[test]
    fn rejects_metadata_host() {
        let mut cfg = WebhookConfig::default();
        cfg.custom_url = Some("https://169.254.169.254/latest/meta-data".to_string());
        cfg.timeout_seconds = 10.0;
        cfg.debounce_seconds = 300;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::WebhookPrivateAddress(_))
        ));
    }

    #[test]
    fn accepts_public_https_url() {
        let mut cfg = WebhookConfig::default();
        cfg.custom_url = Some("https://hooks.example.com/in".to_string());
        cfg.timeout_seconds = 10.0;
        cfg.debounce_seconds = 300;
        cfg.validate().expect("public https url should validate");
    }

    #[test]
    fn parses_quiet_hours_time() {
        assert_eq!(parse_hhmm("22:00").unwrap(), (22, 0));
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("bogus").is_err());
    }
}
