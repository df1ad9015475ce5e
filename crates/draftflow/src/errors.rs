use crate::session::SessionStatus;

/// Errors raised while opening or reading the producer stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent (DNS, connect, TLS, etc.).
    #[error("request failed: {message}")]
    Request { message: String },
    /// The producer answered with a non-success status.
    #[error("producer responded with status {status}: {body}")]
    Status { status: u16, body: String },
    /// The producer answered successfully but without a body to stream.
    #[error("producer response has no body")]
    MissingBody,
    /// Reading the response body failed mid-stream.
    #[error("stream read failed: {message}")]
    Read { message: String },
}

impl TransportError {
    /// Creates a request-level error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a read-level error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }
}

/// Terminal failure recorded in a session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionFailure {
    /// The stream could not be opened.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The stream broke after it was opened.
    #[error("stream interrupted: {message}")]
    Read { message: String },
    /// The producer sent an explicit `error` frame; shown verbatim.
    #[error("{message}")]
    Producer { message: String },
    /// No bytes arrived within the configured idle window.
    #[error("no data received for {seconds}s")]
    IdleTimeout { seconds: u64 },
    /// The caller aborted the session.
    #[error("generation cancelled")]
    Cancelled,
}

impl From<TransportError> for SessionFailure {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Read { message } => SessionFailure::Read { message },
            other => SessionFailure::Transport {
                message: other.to_string(),
            },
        }
    }
}

/// Misuse of the session API. Stream outcomes are never reported this way;
/// they land in the session snapshot instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// `start` was called on a session that is not fresh.
    #[error("session cannot start from {status:?}; create a new session")]
    AlreadyStarted { status: SessionStatus },
    /// The request is incomplete for its mode.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Errors returned by the refinement cycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    /// A refinement session is still running.
    #[error("a refinement is already in flight")]
    SessionInFlight,
    /// `wait` was called with nothing to wait for.
    #[error("no refinement is in flight")]
    NoActiveSession,
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The spawned session task panicked or was torn down by the runtime.
    #[error("refinement task ended abnormally: {0}")]
    TaskFailed(String),
}

/// Configuration could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}
