use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] woof_protocol::error::ConfigError),
    #[error("audio error: {0}")]
    Audio(#[from] woof_audio::AudioError),
    #[error("evidence error: {0}")]
    Evidence(#[from] woof_evidence::EvidenceError),
    #[error("fingerprint store error: {0}")]
    Store(#[from] woof_fingerprint::StoreError),
    #[error("notification error: {0}")]
    Notify(#[from] woof_notify::NotifyError),
}
