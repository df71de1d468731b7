use serde::{Deserialize, Serialize};

/// One typed envelope from the gateway's newline-delimited stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        #[serde(default)]
        supports_reasoning: bool,
    },
    Delta {
        content: String,
    },
    Reasoning {
        content: String,
    },
    Complete,
    Error {
        message: String,
    },
}

impl StreamEvent {
    /// Returns true when no further events may follow on this stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error { .. })
    }
}
