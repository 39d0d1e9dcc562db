use thiserror::Error;

/// Typed failure from a remote provider.
#[derive(Debug, Error)]
pub enum ProviderFailure {
    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        /// Raw response body, when the provider returned one.
        payload: Option<serde_json::Value>,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no external link to look up")]
    Unlinked,
}

impl ProviderFailure {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            payload: None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Pretty-printed raw payload for a detail view.
    pub fn payload_detail(&self) -> Option<String> {
        match self {
            Self::Api {
                payload: Some(payload),
                ..
            } => serde_json::to_string_pretty(payload).ok(),
            _ => None,
        }
    }
}
