//! Client engine for streamed document generation and iterative refinement.
//!
//! The producer answers each request with newline-delimited `data: <json>`
//! frames. Every `chunk` frame carries the whole document so far, a
//! `complete` frame carries the final text, and an `error` frame ends the
//! stream with a message.
//!
//! # Refining a document
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use draftflow::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::from_env()?);
//! let mut cycle = RefinementCycle::new(transport, "Original draft")
//!     .subject("release-notes", "Notes for the 2.0 release");
//!
//! cycle.refine("Original draft", "make it shorter").await?;
//! cycle.record_manual_edit("Shorter draft, hand-tuned")?;
//! cycle.refine_again("add an example")?;
//! cycle.wait().await?;
//!
//! let final_text = cycle.accept();
//! println!("{final_text}");
//! # Ok(())
//! # }
//! ```

/// Builder-style configuration loaded from the environment.
pub mod config;
/// Error types.
pub mod errors;
/// Frame payload classification.
pub mod event;
/// Line framing of the raw byte stream.
pub mod frame;
/// Process-wide `tracing` subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Diff presentation boundary.
pub mod presenter;
/// Length-based progress heuristic.
pub mod progress;
/// Accept / reject / refine-again workflow.
pub mod refinement;
/// Generation request input.
pub mod request;
/// Single streaming operation and its state machine.
pub mod session;
/// Producer transports.
pub mod transport;

pub use config::{ProducerConfig, SessionOptions};
pub use errors::{ConfigError, CycleError, SessionError, SessionFailure, TransportError};
pub use event::StreamEvent;
pub use frame::FrameParser;
pub use presenter::{DiffPresenter, SilentPresenter};
pub use progress::ProgressEstimator;
pub use refinement::{RefinementCycle, RefinementOutcome};
pub use request::{GenerationMode, GenerationRequest};
pub use session::{AbortHandle, GenerationSession, SessionSnapshot, SessionStatus};
pub use transport::{ByteStream, GenerationTransport, HttpTransport, ReplayTransport};
