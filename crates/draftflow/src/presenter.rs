/// Boundary to whatever renders the side-by-side comparison (editor widget,
/// terminal, web view).
///
/// The cycle pushes the immutable original and the current best text after
/// every completed refinement. Edits the human makes on the current-best side
/// come back through [`RefinementCycle::record_manual_edit`].
///
/// [`RefinementCycle::record_manual_edit`]: crate::refinement::RefinementCycle::record_manual_edit
pub trait DiffPresenter: Send {
    fn present(&mut self, original: &str, current_best: &str);

    fn show_error(&mut self, message: &str);
}

/// Presenter that discards everything; for headless callers that read the
/// cycle state directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPresenter;

impl DiffPresenter for SilentPresenter {
    fn present(&mut self, _original: &str, _current_best: &str) {}

    fn show_error(&mut self, _message: &str) {}
}
