use futures::StreamExt as _;
use tracing::debug;

use crate::config::ProducerConfig;
use crate::errors::{ConfigError, TransportError};
use crate::request::GenerationRequest;

use super::{ByteStream, GenerationTransport};

/// `reqwest`-backed transport posting to the producer endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ProducerConfig,
}

impl HttpTransport {
    /// Creates a transport from explicit configuration.
    pub fn new(config: ProducerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "http client",
                message: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Creates a transport using `ProducerConfig::from_env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ProducerConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl GenerationTransport for HttpTransport {
    async fn open(&self, request: &GenerationRequest) -> Result<ByteStream, TransportError> {
        debug!(endpoint = %self.config.endpoint, mode = ?request.mode(), "opening generation stream");

        let mut http_req = self
            .client
            .post(&self.config.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.to_wire());
        if let Some(token) = self.config.api_token.as_deref() {
            http_req = http_req.bearer_auth(token);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| TransportError::request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if response.content_length() == Some(0) {
            return Err(TransportError::MissingBody);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::read(e.to_string())));
        Ok(Box::pin(stream))
    }
}
