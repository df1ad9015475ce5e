use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;
use futures::StreamExt as _;
use futures::stream;

use crate::errors::TransportError;
use crate::request::GenerationRequest;

use super::{ByteStream, GenerationTransport};

enum Scripted {
    Items(Vec<Result<Bytes, TransportError>>),
    Stalled(Vec<Bytes>),
    Refused(TransportError),
    Unanswered,
}

/// Transport that plays back pre-recorded responses, one per `open` call,
/// and records every request it receives.
///
/// Used for offline runs of captured streams and for tests.
#[derive(Default)]
pub struct ReplayTransport {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ReplayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response delivered in the given chunks.
    pub fn push_chunks<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Bytes>,
    {
        let items = chunks.into_iter().map(|c| Ok(c.into())).collect();
        self.push(Scripted::Items(items))
    }

    /// Queues a response body cut into chunks of `chunk_size` bytes. The cut
    /// points ignore line and UTF-8 boundaries on purpose.
    pub fn push_body(self, body: &str, chunk_size: usize) -> Self {
        let chunks: Vec<Bytes> = body
            .as_bytes()
            .chunks(chunk_size.max(1))
            .map(Bytes::copy_from_slice)
            .collect();
        self.push_chunks(chunks)
    }

    /// Queues a response built from explicit items, including read errors.
    pub fn push_stream(self, items: Vec<Result<Bytes, TransportError>>) -> Self {
        self.push(Scripted::Items(items))
    }

    /// Queues a response that delivers `chunks` and then never ends.
    pub fn push_stalled<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Bytes>,
    {
        self.push(Scripted::Stalled(
            chunks.into_iter().map(Into::into).collect(),
        ))
    }

    /// Queues a failure to open the stream.
    pub fn push_error(self, error: TransportError) -> Self {
        self.push(Scripted::Refused(error))
    }

    /// Queues a producer that accepts the request but never sends response
    /// headers: `open` stays pending.
    pub fn push_unanswered(self) -> Self {
        self.push(Scripted::Unanswered)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn push(self, response: Scripted) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
        self
    }
}

#[async_trait::async_trait]
impl GenerationTransport for ReplayTransport {
    async fn open(&self, request: &GenerationRequest) -> Result<ByteStream, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self
            .responses
            .lock()
            .map_err(|_| TransportError::request("replay script poisoned"))?
            .pop_front();
        match next {
            Some(Scripted::Items(items)) => Ok(Box::pin(paced(items))),
            Some(Scripted::Stalled(chunks)) => {
                let head = paced(chunks.into_iter().map(Ok).collect());
                Ok(Box::pin(head.chain(stream::pending())))
            }
            Some(Scripted::Refused(error)) => Err(error),
            Some(Scripted::Unanswered) => std::future::pending().await,
            None => Err(TransportError::request("no scripted response left")),
        }
    }
}

/// Yields to the scheduler before each item, the way a socket read would.
fn paced(
    items: Vec<Result<Bytes, TransportError>>,
) -> impl futures::Stream<Item = Result<Bytes, TransportError>> + Send + 'static {
    stream::iter(items).then(|item| async move {
        tokio::task::yield_now().await;
        item
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_back_in_order_and_records_requests() {
        let transport = ReplayTransport::new()
            .push_body("abcdef", 4)
            .push_error(TransportError::MissingBody);
        let request = GenerationRequest::generate("doc", "desc");

        let chunks: Vec<_> = transport
            .open(&request)
            .await
            .expect("first response")
            .collect()
            .await;
        assert_eq!(
            chunks,
            vec![Ok(Bytes::from_static(b"abcd")), Ok(Bytes::from_static(b"ef"))]
        );
        assert!(matches!(
            transport.open(&request).await,
            Err(TransportError::MissingBody)
        ));
        assert!(matches!(
            transport.open(&request).await,
            Err(TransportError::Request { .. })
        ));
        assert_eq!(transport.requests().len(), 3);
    }
}
