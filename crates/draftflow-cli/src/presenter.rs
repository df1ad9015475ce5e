use draftflow::DiffPresenter;

/// Prints the original and current-best texts one after the other.
pub struct TerminalPresenter;

impl DiffPresenter for TerminalPresenter {
    fn present(&mut self, original: &str, current_best: &str) {
        println!("===== original =====");
        println!("{original}");
        println!("===== refined =====");
        println!("{current_best}");
    }

    fn show_error(&mut self, message: &str) {
        eprintln!("refinement failed: {message}");
    }
}
