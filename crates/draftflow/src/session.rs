use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::watch;
use tracing::{Instrument as _, debug, info, info_span, warn};

use crate::config::SessionOptions;
use crate::errors::{SessionError, SessionFailure};
use crate::event::StreamEvent;
use crate::frame::FrameParser;
use crate::progress::ProgressEstimator;
use crate::request::GenerationRequest;
use crate::transport::{ByteStream, GenerationTransport};

/// Lifecycle of a generation session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created, not started (or reset for disposal).
    #[default]
    Idle,
    /// Stream requested or being read.
    InFlight,
    /// A `complete` frame arrived.
    Complete,
    /// Transport failure, read failure, producer `error` frame, timeout or
    /// cancellation.
    Failed,
    /// The stream ended without any terminal frame.
    Stopped,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Complete | SessionStatus::Failed | SessionStatus::Stopped
        )
    }
}

/// Observable state of a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// Latest full snapshot sent by the producer.
    pub accumulated_content: String,
    /// 0..=95 while in flight, exactly 100 once complete.
    pub progress_percent: u8,
    /// Human-readable failure message, set only when `Failed`.
    pub last_error: Option<String>,
    /// Typed failure behind `last_error`.
    pub failure: Option<SessionFailure>,
}

impl SessionSnapshot {
    fn begin(&mut self) {
        *self = SessionSnapshot {
            status: SessionStatus::InFlight,
            ..SessionSnapshot::default()
        };
    }

    /// Applies one interpreted frame. Returns true once the session is
    /// terminal; frames arriving after that are ignored.
    pub(crate) fn apply(&mut self, estimator: &ProgressEstimator, event: StreamEvent) -> bool {
        if self.status.is_terminal() {
            return true;
        }
        match event {
            StreamEvent::Chunk { full_content } => {
                let len = full_content.chars().count();
                let current = self.accumulated_content.chars().count();
                if len < current {
                    warn!(len, current, "ignoring chunk shorter than accumulated content");
                    return false;
                }
                self.progress_percent = self.progress_percent.max(estimator.estimate(len));
                self.accumulated_content = full_content;
                debug!(len, progress = self.progress_percent, "chunk applied");
                false
            }
            StreamEvent::Complete { full_content } => {
                self.accumulated_content = full_content;
                self.progress_percent = 100;
                self.status = SessionStatus::Complete;
                true
            }
            StreamEvent::Error { message } => {
                self.fail(SessionFailure::Producer { message });
                true
            }
            StreamEvent::Unrecognized => false,
        }
    }

    fn fail(&mut self, failure: SessionFailure) {
        self.status = SessionStatus::Failed;
        self.last_error = Some(failure.to_string());
        self.failure = Some(failure);
    }

    fn stop(&mut self) {
        if !self.status.is_terminal() {
            self.status = SessionStatus::Stopped;
        }
    }
}

/// Cancels a running session from outside the task that drives it.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation. The session ends `Failed` with
    /// `SessionFailure::Cancelled` at its next suspension point and drops the
    /// transport stream. No effect on a session that is already terminal.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// One streaming generation or refinement operation.
///
/// A session is single-use: `start` succeeds once, and `reset` only returns
/// the state to `Idle` so the value can be released.
pub struct GenerationSession {
    id: uuid::Uuid,
    transport: Arc<dyn GenerationTransport>,
    options: SessionOptions,
    estimator: ProgressEstimator,
    state: watch::Sender<SessionSnapshot>,
    abort_tx: watch::Sender<bool>,
    started: bool,
}

impl GenerationSession {
    pub fn new(transport: Arc<dyn GenerationTransport>, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self::with_state(transport, options, state)
    }

    /// Builds a session that publishes into an existing channel. Subscribers
    /// of that channel see the new session from `Idle` onward.
    pub(crate) fn with_state(
        transport: Arc<dyn GenerationTransport>,
        options: SessionOptions,
        state: watch::Sender<SessionSnapshot>,
    ) -> Self {
        state.send_replace(SessionSnapshot::default());
        let (abort_tx, _) = watch::channel(false);
        Self {
            id: uuid::Uuid::new_v4(),
            transport,
            estimator: options.estimator(),
            options,
            state,
            abort_tx,
            started: false,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    /// Opens the stream and consumes it until a terminal state.
    ///
    /// Stream outcomes (including transport failures) are reported through
    /// the returned snapshot, never as `Err`. `Err` means the call itself was
    /// invalid: the session was already used, or the request is incomplete.
    pub async fn start(
        &mut self,
        request: GenerationRequest,
    ) -> Result<SessionSnapshot, SessionError> {
        let status = self.status();
        if self.started || status != SessionStatus::Idle {
            return Err(SessionError::AlreadyStarted { status });
        }
        request.validate()?;
        self.started = true;

        let span = info_span!("generation_session", session_id = %self.id, mode = ?request.mode());
        self.drive(request).instrument(span).await;
        Ok(self.snapshot())
    }

    /// Returns the state to `Idle` for disposal. The session still cannot be
    /// started again.
    pub fn reset(&mut self) {
        self.state.send_replace(SessionSnapshot::default());
    }

    async fn drive(&self, request: GenerationRequest) {
        let mut abort_rx = self.abort_tx.subscribe();
        self.state.send_modify(SessionSnapshot::begin);
        info!(subject = request.subject_name(), "generation started");

        let opened = tokio::select! {
            biased;
            _ = aborted(&mut abort_rx) => Err(SessionFailure::Cancelled),
            opened = open_stream(self.transport.as_ref(), &request, self.options.idle_timeout) => opened,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(failure) => {
                warn!(error = %failure, "generation stream could not be opened");
                self.state.send_modify(|s| s.fail(failure));
                return;
            }
        };

        self.read_loop(stream, &mut abort_rx).await;

        let snapshot = self.state.borrow();
        match snapshot.status {
            SessionStatus::Stopped => warn!(
                len = snapshot.accumulated_content.len(),
                "stream ended without a terminal frame"
            ),
            SessionStatus::Failed => warn!(
                error = snapshot.last_error.as_deref().unwrap_or_default(),
                "generation failed"
            ),
            status => info!(
                ?status,
                len = snapshot.accumulated_content.len(),
                "generation finished"
            ),
        }
    }

    async fn read_loop(&self, mut stream: ByteStream, abort_rx: &mut watch::Receiver<bool>) {
        let mut parser = FrameParser::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = aborted(&mut *abort_rx) => Err(SessionFailure::Cancelled),
                next = read_next(&mut stream, self.options.idle_timeout) => next,
            };
            match next {
                Ok(Some(chunk)) => {
                    for payload in parser.feed_bytes(&chunk) {
                        if self.apply(StreamEvent::interpret(&payload)) {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    if let Some(payload) = parser.finish()
                        && self.apply(StreamEvent::interpret(&payload))
                    {
                        return;
                    }
                    self.state.send_modify(SessionSnapshot::stop);
                    return;
                }
                Err(failure) => {
                    self.state.send_modify(|s| s.fail(failure));
                    return;
                }
            }
        }
    }

    fn apply(&self, event: StreamEvent) -> bool {
        let mut terminal = false;
        self.state
            .send_modify(|s| terminal = s.apply(&self.estimator, event));
        terminal
    }
}

/// Opens the response stream. With an idle window set, waiting for the
/// response headers counts against it too.
async fn open_stream(
    transport: &dyn GenerationTransport,
    request: &GenerationRequest,
    idle_timeout: Option<Duration>,
) -> Result<ByteStream, SessionFailure> {
    let opened = match idle_timeout {
        Some(window) => tokio::time::timeout(window, transport.open(request))
            .await
            .map_err(|_| idle_elapsed(window))?,
        None => transport.open(request).await,
    };
    opened.map_err(SessionFailure::from)
}

async fn read_next(
    stream: &mut ByteStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<bytes::Bytes>, SessionFailure> {
    let next = match idle_timeout {
        Some(window) => tokio::time::timeout(window, stream.next())
            .await
            .map_err(|_| idle_elapsed(window))?,
        None => stream.next().await,
    };
    next.transpose().map_err(SessionFailure::from)
}

fn idle_elapsed(window: Duration) -> SessionFailure {
    SessionFailure::IdleTimeout {
        seconds: window.as_secs(),
    }
}

/// Resolves once cancellation has been requested.
async fn aborted(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use crate::transport::ReplayTransport;

    fn chunk(text: &str) -> StreamEvent {
        StreamEvent::Chunk {
            full_content: text.into(),
        }
    }

    fn in_flight() -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::default();
        snapshot.begin();
        snapshot
    }

    fn session(transport: ReplayTransport) -> GenerationSession {
        GenerationSession::new(Arc::new(transport), SessionOptions::default())
    }

    #[test]
    fn content_and_progress_never_shrink_in_flight() {
        let estimator = ProgressEstimator::new(20);
        let mut snapshot = in_flight();
        let mut last_len = 0;
        let mut last_progress = 0;
        for event in [
            chunk("Hello"),
            chunk("Hello world"),
            chunk("Hello"),
            StreamEvent::Unrecognized,
            chunk("Hello world, this is long"),
        ] {
            assert!(!snapshot.apply(&estimator, event));
            assert!(snapshot.accumulated_content.len() >= last_len);
            assert!(snapshot.progress_percent >= last_progress);
            assert!(snapshot.progress_percent < 100);
            last_len = snapshot.accumulated_content.len();
            last_progress = snapshot.progress_percent;
        }
        assert_eq!(snapshot.accumulated_content, "Hello world, this is long");
        assert_eq!(snapshot.progress_percent, 95);
    }

    #[test]
    fn error_frame_leaves_content_untouched() {
        let estimator = ProgressEstimator::default();
        let mut snapshot = in_flight();
        snapshot.apply(&estimator, chunk("partial"));
        assert!(snapshot.apply(
            &estimator,
            StreamEvent::Error {
                message: "rate limited".into()
            }
        ));
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert_eq!(snapshot.last_error.as_deref(), Some("rate limited"));
        assert_eq!(snapshot.accumulated_content, "partial");
    }

    #[test]
    fn frames_after_terminal_are_ignored() {
        let estimator = ProgressEstimator::default();
        let mut snapshot = in_flight();
        snapshot.apply(
            &estimator,
            StreamEvent::Complete {
                full_content: "done".into(),
            },
        );
        assert!(snapshot.apply(&estimator, chunk("done and then some")));
        assert_eq!(snapshot.accumulated_content, "done");
        assert_eq!(snapshot.progress_percent, 100);
    }

    #[tokio::test]
    async fn silent_end_of_stream_is_stopped_not_failed() {
        let transport = ReplayTransport::new()
            .push_body("data: {\"type\":\"chunk\",\"fullContent\":\"half\"}\n", 7);
        let mut session = session(transport);
        let snapshot = session
            .start(GenerationRequest::generate("doc", "desc"))
            .await
            .expect("start");
        assert_eq!(snapshot.status, SessionStatus::Stopped);
        assert_eq!(snapshot.accumulated_content, "half");
        assert_eq!(snapshot.last_error, None);
        assert!(snapshot.progress_percent < 100);
    }

    #[tokio::test]
    async fn transport_failure_fails_without_reading() {
        let transport = ReplayTransport::new().push_error(TransportError::Status {
            status: 503,
            body: "overloaded".into(),
        });
        let mut session = session(transport);
        let snapshot = session
            .start(GenerationRequest::generate("doc", "desc"))
            .await
            .expect("start");
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert!(matches!(
            snapshot.failure,
            Some(SessionFailure::Transport { ref message }) if message.contains("503")
        ));
        assert_eq!(snapshot.accumulated_content, "");
    }

    #[tokio::test]
    async fn missing_body_is_a_transport_failure() {
        let transport = ReplayTransport::new().push_error(TransportError::MissingBody);
        let mut session = session(transport);
        let snapshot = session
            .start(GenerationRequest::generate("doc", "desc"))
            .await
            .expect("start");
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("transport failure: producer response has no body")
        );
    }

    #[tokio::test]
    async fn read_error_mid_stream_fails_session() {
        let transport = ReplayTransport::new().push_stream(vec![
            Ok(bytes::Bytes::from_static(
                b"data: {\"type\":\"chunk\",\"fullContent\":\"a\"}\n",
            )),
            Err(TransportError::read("connection reset")),
        ]);
        let mut session = session(transport);
        let snapshot = session
            .start(GenerationRequest::generate("doc", "desc"))
            .await
            .expect("start");
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert_eq!(snapshot.accumulated_content, "a");
        assert!(matches!(snapshot.failure, Some(SessionFailure::Read { .. })));
    }

    #[tokio::test]
    async fn session_cannot_be_started_twice() {
        let transport = ReplayTransport::new()
            .push_body("data: {\"type\":\"complete\",\"fullContent\":\"x\"}\n", 64)
            .push_body("data: {\"type\":\"complete\",\"fullContent\":\"y\"}\n", 64);
        let mut session = session(transport);
        session
            .start(GenerationRequest::generate("doc", "desc"))
            .await
            .expect("first start");
        let err = session
            .start(GenerationRequest::generate("doc", "desc"))
            .await
            .expect_err("second start");
        assert_eq!(
            err,
            SessionError::AlreadyStarted {
                status: SessionStatus::Complete
            }
        );

        session.reset();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(matches!(
            session
                .start(GenerationRequest::generate("doc", "desc"))
                .await,
            Err(SessionError::AlreadyStarted {
                status: SessionStatus::Idle
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_fails_a_stalled_stream() {
        let transport = ReplayTransport::new()
            .push_stalled(vec!["data: {\"type\":\"chunk\",\"fullContent\":\"so far\"}\n"]);
        let mut session = GenerationSession::new(
            Arc::new(transport),
            SessionOptions::default().idle_timeout(Duration::from_secs(30)),
        );
        let snapshot = session
            .start(GenerationRequest::generate("doc", "desc"))
            .await
            .expect("start");
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert_eq!(
            snapshot.failure,
            Some(SessionFailure::IdleTimeout { seconds: 30 })
        );
        assert_eq!(snapshot.accumulated_content, "so far");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_covers_waiting_for_response_headers() {
        let transport = Arc::new(ReplayTransport::new().push_unanswered());
        let mut session = GenerationSession::new(
            transport.clone(),
            SessionOptions::default().idle_timeout(Duration::from_secs(30)),
        );
        let snapshot = tokio::time::timeout(
            Duration::from_secs(3600),
            session.start(GenerationRequest::generate("doc", "desc")),
        )
        .await
        .expect("session gave up before the outer deadline")
        .expect("start");
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert_eq!(
            snapshot.failure,
            Some(SessionFailure::IdleTimeout { seconds: 30 })
        );
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn abort_cancels_an_unanswered_request() {
        let mut session = session(ReplayTransport::new().push_unanswered());
        let abort = session.abort_handle();
        let mut updates = session.subscribe();

        let driver = tokio::spawn(async move {
            session
                .start(GenerationRequest::generate("doc", "desc"))
                .await
        });
        updates
            .wait_for(|s| s.status == SessionStatus::InFlight)
            .await
            .expect("in flight");
        abort.abort();

        let snapshot = driver.await.expect("join").expect("start");
        assert_eq!(snapshot.failure, Some(SessionFailure::Cancelled));
    }

    #[tokio::test]
    async fn abort_cancels_a_stalled_stream() {
        let transport = ReplayTransport::new()
            .push_stalled(vec!["data: {\"type\":\"chunk\",\"fullContent\":\"so far\"}\n"]);
        let mut session = session(transport);
        let abort = session.abort_handle();
        let mut updates = session.subscribe();

        let driver = tokio::spawn(async move {
            session
                .start(GenerationRequest::generate("doc", "desc"))
                .await
        });
        updates
            .wait_for(|s| s.accumulated_content == "so far")
            .await
            .expect("chunk observed");
        abort.abort();

        let snapshot = driver.await.expect("join").expect("start");
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert_eq!(snapshot.failure, Some(SessionFailure::Cancelled));
    }
}
