//! Scripted analysis service shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use logsift::analysis::{AnalysisRequest, AnalysisService, ChunkStream, ServiceError};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One canned reply
pub enum Script {
    /// Stream these body chunks, then end
    Chunks(Vec<Vec<u8>>),
    /// Stream these chunks, then fail the stream
    FailMidStream(Vec<Vec<u8>>),
    /// Reject the request with this status
    Refuse(u16),
}

/// Replays scripts in order and records every request.
/// Once the scripts run out, every reply is "ALL CLEAR".
pub struct ScriptedService {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl ScriptedService {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisService for ScriptedService {
    async fn open_stream(&self, request: &AnalysisRequest) -> Result<ChunkStream, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Chunks(sse_chunks(&["ALL CLEAR"], 16)));

        match script {
            Script::Chunks(chunks) => Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok::<Vec<u8>, ServiceError>)))),
            Script::FailMidStream(chunks) => {
                let items = chunks
                    .into_iter()
                    .map(Ok::<Vec<u8>, ServiceError>)
                    .chain(std::iter::once(Err(ServiceError::Transport(
                        "connection reset by peer".to_string(),
                    ))));
                Ok(Box::pin(stream::iter(items)))
            }
            Script::Refuse(status) => Err(ServiceError::Status {
                status,
                message: "service unavailable".to_string(),
            }),
        }
    }
}

/// Encode text pieces as a `data:` framed body ending in `[DONE]`, cut into
/// chunks of `chunk_size` bytes regardless of frame boundaries.
pub fn sse_chunks(pieces: &[&str], chunk_size: usize) -> Vec<Vec<u8>> {
    let mut body = String::new();
    for piece in pieces {
        let envelope = serde_json::json!({"choices": [{"delta": {"content": piece}}]});
        body.push_str(&format!("data: {}\n\n", envelope));
    }
    body.push_str("data: [DONE]\n\n");

    body.as_bytes()
        .chunks(chunk_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

pub fn write_lines(path: &std::path::Path, count: usize) {
    use std::io::Write;

    let mut file = std::fs::File::create(path).unwrap();
    for i in 1..=count {
        writeln!(file, "line {}", i).unwrap();
    }
}
