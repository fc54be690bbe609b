use derive_more::From;

#[derive(Debug, From)]
pub enum AudioError {
    DeviceNotFound,
    EnumerateDevices(cpal::DevicesError),
    EnumerateStreamConfigs(cpal::SupportedStreamConfigsError),
    NoSupportedStreamConfig,
    BuildStream(cpal::BuildStreamError),
    StartStream(cpal::PlayStreamError),
    JoinTimedOut,
    Resample(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::DeviceNotFound => write!(f, "no matching input device found"),
            AudioError::EnumerateDevices(e) => write!(f, "failed to enumerate devices: {e}"),
            AudioError::EnumerateStreamConfigs(e) => {
                write!(f, "failed to enumerate stream configs: {e}")
            }
            AudioError::NoSupportedStreamConfig => {
                write!(f, "no supported stream config for device")
            }
            AudioError::BuildStream(e) => write!(f, "failed to build stream: {e}"),
            AudioError::StartStream(e) => write!(f, "failed to start stream: {e}"),
            AudioError::JoinTimedOut => write!(f, "capture thread did not stop within timeout"),
            AudioError::Resample(msg) => write!(f, "resample failed: {msg}"),
        }
    }
}

impl std::error::Error for AudioError {}
