use thiserror::Error;

/// Failure of a single model query.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Connection, timeout or other transport failure. Retried.
    #[error("request failed: {0}")]
    Transport(String),
    /// Non-success HTTP status. Retried.
    #[error("endpoint returned {status}: {body}")]
    Http { status: u16, body: String },
    /// Response body did not have the chat-completions shape. Retried.
    #[error("could not decode response: {0}")]
    Decode(String),
    /// All attempts for one prompt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<ModelError> },
    /// Replay input has no response recorded for this prompt.
    #[error("no recorded response for prompt {0:?}")]
    ReplayMissingData(String),
    /// Replay input records that this prompt failed in the original run.
    #[error("prompt failed in the recorded run")]
    RecordedFailure,
}

impl ModelError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Transport(_) | ModelError::Http { .. } | ModelError::Decode(_)
        )
    }

    pub fn is_replay_missing(&self) -> bool {
        matches!(self, ModelError::ReplayMissingData(_))
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ModelError::Decode(e.to_string())
        } else {
            ModelError::Transport(e.to_string())
        }
    }
}

/// Failure reading or writing run artifacts.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StateError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn json(path: impl AsRef<std::path::Path>, source: serde_json::Error) -> Self {
        StateError::Json {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
