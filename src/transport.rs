//! Chat back-end connection.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use log::{error, info};
use reqwest::Client;

use crate::types::{ChatRequest, PilotError};

/// Raw response body chunks, in arrival order.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, PilotError>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends one turn and returns the streamed reply body.
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, PilotError>;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, PilotError> {
        (**self).open(request).await
    }
}

/// `POST {api_url}/chat` with a JSON body; the reply streams as plain text.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/chat", api_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, PilotError> {
        info!(
            "POST {} ({} history messages)",
            self.endpoint,
            request.history.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Chat request failed: {}", e);
                PilotError::TransportError(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Chat back-end answered {}", status);
            return Err(PilotError::TransportError(format!(
                "HTTP error! status: {}",
                status.as_u16()
            )));
        }

        let stream = response.bytes_stream().map(|item| {
            item.map(|bytes| bytes.to_vec())
                .map_err(|e| PilotError::TransportError(e.to_string()))
        });
        Ok(stream.boxed())
    }
}
