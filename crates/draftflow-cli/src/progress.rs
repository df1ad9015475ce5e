use std::io::Write as _;

use draftflow::{SessionSnapshot, SessionStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Prints session progress to stderr until the session is terminal or its
/// channel closes.
pub fn spawn_reporter(mut updates: watch::Receiver<SessionSnapshot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_percent = None;
        loop {
            let (status, percent) = {
                let snapshot = updates.borrow_and_update();
                (snapshot.status, snapshot.progress_percent)
            };
            if status != SessionStatus::Idle && last_percent != Some(percent) {
                eprint!("\rgenerating... {percent:>3}%");
                let _ = std::io::stderr().flush();
                last_percent = Some(percent);
            }
            if status.is_terminal() {
                eprintln!();
                return;
            }
            if updates.changed().await.is_err() {
                eprintln!();
                return;
            }
        }
    })
}
