use serde::Deserialize;
use tracing::debug;

/// Semantic event carried by one frame.
///
/// `Chunk` and `Complete` carry the *whole* document produced so far, not a
/// delta. Consumers replace their buffer with it; applying frame `n + 1` after
/// frame `n` never needs reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Full accumulated content so far.
    Chunk { full_content: String },
    /// Final content; terminal success.
    Complete { full_content: String },
    /// Producer-reported terminal failure.
    Error { message: String },
    /// Any payload shape this consumer does not know. Ignored.
    Unrecognized,
}

impl StreamEvent {
    /// Classifies a parsed payload. Never fails.
    pub fn interpret(payload: &serde_json::Value) -> Self {
        match WireEvent::deserialize(payload) {
            Ok(WireEvent::Chunk { full_content }) => StreamEvent::Chunk { full_content },
            Ok(WireEvent::Complete { full_content }) => StreamEvent::Complete { full_content },
            Ok(WireEvent::Error { message }) => StreamEvent::Error { message },
            Err(e) => {
                let kind = payload
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("<none>");
                debug!(kind, error = %e, "ignoring unrecognized frame payload");
                StreamEvent::Unrecognized
            }
        }
    }

    /// True for `Complete` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEvent {
    Chunk {
        #[serde(rename = "fullContent")]
        full_content: String,
    },
    Complete {
        #[serde(rename = "fullContent")]
        full_content: String,
    },
    Error {
        message: String,
    },
}
