use thiserror::Error;

/// Trip tracker error types
///
/// None of these are fatal to a trip: the session logs them and keeps going.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Location service is not supported")]
    CapabilityUnavailable,

    #[error("Location acquisition failed: {0}")]
    AcquisitionFailed(String),

    #[error("Reading accuracy {accuracy:.1}m exceeds threshold {threshold:.1}m")]
    AccuracyInsufficient { accuracy: f64, threshold: f64 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Io(err.to_string())
    }
}

impl TrackerError {
    /// Message shown on the output surface for errors the user should see.
    pub fn user_message(&self) -> String {
        match self {
            TrackerError::CapabilityUnavailable => {
                "Error: Your device doesn't support geolocation.".to_string()
            }
            TrackerError::AcquisitionFailed(_) => {
                "Error: The Geolocation service failed.".to_string()
            }
            other => format!("Error: {}", other),
        }
    }
}
