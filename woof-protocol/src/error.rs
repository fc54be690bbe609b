//! Shared error types. Component-specific errors live in their own crates;
//! this module holds only the config-validation error every crate's
//! `Config` sub-struct contributes to.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("invalid time string {0:?}, expected HH:MM")]
    InvalidTimeString(String),
    #[error("invalid IANA timezone {0:?}")]
    InvalidTimezone(String),
    #[error("webhook custom_url must use HTTPS: {0:?}")]
    WebhookNotHttps(String),
    #[error("webhook custom_url resolves to a private, loopback, or reserved address: {0:?}")]
    WebhookPrivateAddress(String),
    #[error("webhook custom_url points at a blocked host: {0:?}")]
    WebhookBlockedHost(String),
    #[error("webhook custom_url is not a valid URL: {0:?}")]
    WebhookInvalidUrl(String),
    #[error("doa.num_elements must be >= 2, got {0}")]
    InsufficientArrayElements(u32),
    #[error("doa.angle_min ({0}) must be <= doa.angle_max ({1})")]
    InvalidAngleRange(i32, i32),
}
