//! Seam between a session and whatever produces the event stream.

mod http;
mod replay;

use std::pin::Pin;

pub use http::HttpTransport;
pub use replay::ReplayTransport;

use crate::errors::TransportError;
use crate::request::GenerationRequest;

/// Raw response body as a stream of byte chunks.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// Opens the producer stream for one request.
///
/// Implementations must report every pre-stream failure (send error,
/// non-success status, absent body) as `Err`; the session never enters its
/// read loop in that case.
#[async_trait::async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn open(&self, request: &GenerationRequest) -> Result<ByteStream, TransportError>;
}
