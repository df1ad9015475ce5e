//! Human-in-the-loop refinement over repeated generation sessions.
//!
//! A cycle keeps three texts apart: the original (never modified, used as
//! the left side of the comparison), the latest machine output, and an
//! optional manual override typed by the human. Whichever of the last two is
//! current seeds the next round, so a "refine again" never drops human edits.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionOptions;
use crate::errors::{CycleError, SessionError};
use crate::presenter::{DiffPresenter, SilentPresenter};
use crate::request::GenerationRequest;
use crate::session::{AbortHandle, GenerationSession, SessionSnapshot, SessionStatus};
use crate::transport::GenerationTransport;

/// Result of one refinement round, as seen by the human.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefinementOutcome {
    /// The producer finished; this is the new machine content.
    Completed { content: String },
    /// The round failed. The previous state is kept.
    Failed { message: String },
    /// The stream ended without a terminal frame. The previous state is kept.
    Stopped { message: String },
}

struct ActiveRefinement {
    task: JoinHandle<Result<SessionSnapshot, SessionError>>,
    abort: AbortHandle,
}

/// Accept / reject / refine-again workflow for one document.
///
/// Sessions are spawned onto the ambient tokio runtime, so the cycle must be
/// driven from within one. At most one session runs at a time.
pub struct RefinementCycle {
    transport: Arc<dyn GenerationTransport>,
    options: SessionOptions,
    presenter: Box<dyn DiffPresenter>,
    subject_name: String,
    subject_description: String,
    original_content: String,
    latest_machine_content: String,
    manual_override: Option<String>,
    has_manual_edits: bool,
    last_error: Option<String>,
    rounds: u32,
    state: watch::Sender<SessionSnapshot>,
    active: Option<ActiveRefinement>,
}

impl RefinementCycle {
    /// Starts a cycle over `original`. Until a round completes, the original
    /// is also the latest machine content.
    pub fn new(transport: Arc<dyn GenerationTransport>, original: impl Into<String>) -> Self {
        let original_content = original.into();
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            transport,
            options: SessionOptions::default(),
            presenter: Box::new(SilentPresenter),
            subject_name: String::new(),
            subject_description: String::new(),
            latest_machine_content: original_content.clone(),
            original_content,
            manual_override: None,
            has_manual_edits: false,
            last_error: None,
            rounds: 0,
            state,
            active: None,
        }
    }

    /// Name and description forwarded with every refinement request.
    pub fn subject(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.subject_name = name.into();
        self.subject_description = description.into();
        self
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn presenter(mut self, presenter: Box<dyn DiffPresenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn original_content(&self) -> &str {
        &self.original_content
    }

    pub fn latest_machine_content(&self) -> &str {
        &self.latest_machine_content
    }

    pub fn manual_override(&self) -> Option<&str> {
        self.manual_override.as_deref()
    }

    pub fn has_manual_edits(&self) -> bool {
        self.has_manual_edits
    }

    /// Message of the most recent failed or stopped round, cleared when the
    /// next round starts.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Number of rounds that completed.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn is_in_flight(&self) -> bool {
        self.active.is_some()
    }

    /// The human's edit when there is one, otherwise the machine output.
    pub fn current_best(&self) -> &str {
        match (&self.manual_override, self.has_manual_edits) {
            (Some(edit), true) => edit,
            _ => &self.latest_machine_content,
        }
    }

    /// Progress of whichever session is running (or ran last).
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Spawns a refine session over `content`. Use [`RefinementCycle::wait`]
    /// to collect the result.
    pub fn begin_refinement(
        &mut self,
        content: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Result<(), CycleError> {
        if self.active.is_some() {
            return Err(CycleError::SessionInFlight);
        }
        let request = GenerationRequest::refine(
            self.subject_name.clone(),
            self.subject_description.clone(),
            content,
            instructions,
        )?;

        let mut session = GenerationSession::with_state(
            self.transport.clone(),
            self.options.clone(),
            self.state.clone(),
        );
        let abort = session.abort_handle();
        debug!(session_id = %session.id(), round = self.rounds + 1, "spawning refinement session");
        let task = tokio::spawn(async move { session.start(request).await });

        self.last_error = None;
        self.active = Some(ActiveRefinement { task, abort });
        Ok(())
    }

    /// Refines the effective base content: the manual edit if the human made
    /// one, otherwise the latest machine output.
    pub fn refine_again(&mut self, instructions: impl Into<String>) -> Result<(), CycleError> {
        let base = self.current_best().to_string();
        self.begin_refinement(base, instructions)
    }

    /// Waits for the running session and folds its result into the cycle.
    ///
    /// Cancel-safe: dropping the future leaves the session running and a
    /// later `wait` picks it up.
    pub async fn wait(&mut self) -> Result<RefinementOutcome, CycleError> {
        let Some(active) = self.active.as_mut() else {
            return Err(CycleError::NoActiveSession);
        };
        let joined = (&mut active.task).await;
        self.active = None;
        let snapshot = joined.map_err(|e| CycleError::TaskFailed(e.to_string()))??;
        Ok(self.conclude(snapshot))
    }

    /// `begin_refinement` followed by `wait`.
    pub async fn refine(
        &mut self,
        content: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Result<RefinementOutcome, CycleError> {
        self.begin_refinement(content, instructions)?;
        self.wait().await
    }

    /// Records text the human typed into the current-best side.
    pub fn record_manual_edit(&mut self, text: impl Into<String>) -> Result<(), CycleError> {
        if self.active.is_some() {
            return Err(CycleError::SessionInFlight);
        }
        let text = text.into();
        self.has_manual_edits = text != self.latest_machine_content;
        self.manual_override = Some(text);
        Ok(())
    }

    /// Ends the cycle and returns the text to save. A running session is
    /// aborted and its output ignored.
    pub fn accept(mut self) -> String {
        self.abort_active();
        let accepted = self.current_best().to_string();
        info!(rounds = self.rounds, edited = self.has_manual_edits, "refinement accepted");
        accepted
    }

    /// Ends the cycle without saving and hands back the untouched original.
    pub fn reject(mut self) -> String {
        self.abort_active();
        info!(rounds = self.rounds, "refinement rejected");
        self.original_content
    }

    fn abort_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.abort.abort();
        }
    }

    fn conclude(&mut self, snapshot: SessionSnapshot) -> RefinementOutcome {
        match snapshot.status {
            SessionStatus::Complete => {
                self.rounds += 1;
                self.latest_machine_content = snapshot.accumulated_content;
                self.manual_override = None;
                self.has_manual_edits = false;
                info!(round = self.rounds, len = self.latest_machine_content.len(), "refinement completed");
                self.presenter
                    .present(&self.original_content, &self.latest_machine_content);
                RefinementOutcome::Completed {
                    content: self.latest_machine_content.clone(),
                }
            }
            SessionStatus::Stopped => {
                let message = "refinement stream ended before completing".to_string();
                self.record_failure(&message);
                RefinementOutcome::Stopped { message }
            }
            SessionStatus::Failed => {
                let message = snapshot
                    .last_error
                    .unwrap_or_else(|| "refinement failed".to_string());
                self.record_failure(&message);
                RefinementOutcome::Failed { message }
            }
            status @ (SessionStatus::Idle | SessionStatus::InFlight) => {
                let message = format!("refinement session ended while {status:?}");
                self.record_failure(&message);
                RefinementOutcome::Failed { message }
            }
        }
    }

    fn record_failure(&mut self, message: &str) {
        warn!(error = message, "refinement round did not complete");
        self.presenter.show_error(message);
        self.last_error = Some(message.to_string());
    }
}
