use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParcellError {
    // Transport errors
    #[error("Request failed: {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    // Caller-side processing errors
    #[error("Callback failed for {slot}: {message}")]
    Callback { slot: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParcellError {
    /// Shorthand for a callback rejecting a payload it could not handle.
    pub fn callback(slot: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Callback {
            slot: slot.into(),
            message: message.into(),
        }
    }

    pub fn transport(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParcellError>;
