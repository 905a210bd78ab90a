use thiserror::Error;

use crate::landmarks::Modality;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The capture device produced nothing this cycle.
    #[error("capture unavailable this cycle")]
    CaptureUnavailable,

    #[error("{modality} frame is missing landmark {index} (only {available} present)")]
    MissingLandmark {
        modality: Modality,
        index: usize,
        available: usize,
    },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("actuator failed: {0}")]
    ActuatorFailure(String),

    #[error("notification failed: {0}")]
    NotificationFailure(String),

    #[error("landmark source failed: {0}")]
    Source(#[from] std::io::Error),
}

impl SessionError {
    /// Fatal errors end the session; everything else costs at most one frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingLandmark { .. } | Self::Source(_))
    }
}
