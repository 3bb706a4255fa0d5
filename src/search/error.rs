use std::time::Duration;

/// A search request that did not produce a result page.
///
/// Cloneable so the controller can keep it around for the error panel.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error("Search failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Search request failed: {0}")]
    Transport(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed search response: {0}")]
    Decode(String),
}

impl SearchError {
    /// HTTP status, when the backend answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            SearchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human readable reason, suitable for the error panel
    pub fn message(&self) -> String {
        match self {
            SearchError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Timeouts are mapped by the client, which knows its configured duration.
impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SearchError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => SearchError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Decode(err.to_string())
    }
}
