use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
    #[error("no audio buffered for the trigger window")]
    NoAudioData,
}
