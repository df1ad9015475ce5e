//! Common imports for driving sessions and refinement cycles.
pub use crate::{
    AbortHandle, CycleError, DiffPresenter, GenerationMode, GenerationRequest, GenerationSession,
    GenerationTransport, HttpTransport, ProducerConfig, RefinementCycle, RefinementOutcome,
    SessionFailure, SessionOptions, SessionSnapshot, SessionStatus,
};
