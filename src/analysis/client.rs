use crate::analysis::prompt::build_prompt;
use crate::batch::Batch;
use crate::config::types::ServiceSettings;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("analysis service returned error status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("analysis stream failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Body of a streaming chat-completions request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

impl AnalysisRequest {
    pub fn for_batch(model: &str, prompt: &str, batch: &Batch) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: build_prompt(prompt, batch.texts()),
            }],
            stream: true,
        }
    }

    /// Text of the single user message
    pub fn content(&self) -> &str {
        self.messages
            .first()
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }
}

/// Raw response body chunks, in arrival order
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ServiceError>> + Send>>;

/// Transport to the analysis service.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Send the request and return the response body as a chunk stream.
    /// Fails before any chunk is produced on connect errors and non-success statuses.
    async fn open_stream(&self, request: &AnalysisRequest) -> Result<ChunkStream, ServiceError>;
}

/// Chat-completions endpoint reached over HTTP.
#[derive(Debug)]
pub struct HttpAnalysisService {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpAnalysisService {
    pub fn new(settings: &ServiceSettings) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            url: settings.url.clone(),
            api_key: settings.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn open_stream(&self, request: &AnalysisRequest) -> Result<ChunkStream, ServiceError> {
        debug!(url = %self.url, model = %request.model, "Opening analysis stream");

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::Status {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ServiceError::from));

        Ok(Box::pin(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::LogLine;

    fn batch(lines: &[&str]) -> Batch {
        Batch {
            number: 1,
            overlap: 0,
            lines: lines
                .iter()
                .enumerate()
                .map(|(i, text)| LogLine {
                    seq: i as u64 + 1,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let request = AnalysisRequest::for_batch("gpt-test", "PROMPT", &batch(&["one", "two"]));
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-test",
                "messages": [{"role": "user", "content": "PROMPT\none\ntwo"}],
                "stream": true
            })
        );
        assert_eq!(request.content(), "PROMPT\none\ntwo");
    }

    #[test]
    fn test_status_error_message() {
        let err = ServiceError::Status {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "analysis service returned error status 429: rate limited"
        );
    }
}
