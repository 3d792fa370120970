use serde::Deserialize;
use thiserror::Error;

/// Payload that ends the content of a streamed response
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed stream envelope ({source}): {payload}")]
    Envelope {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("incomplete data left at end of stream ({source}): {payload}")]
    Residual {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A piece of response text, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamToken(pub String);

impl StreamToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental decoder for a `data: {...}` line-delimited response body.
///
/// Chunks may split or merge frames anywhere, including inside a multi-byte
/// character, so the pending tail is kept as bytes until its newline arrives.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return whatever complete frames it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamToken, DecodeError>> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }

        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(item) = self.decode_line(&line[..pos]) {
                out.push(item);
            }
            if self.finished {
                self.pending.clear();
                break;
            }
        }

        out
    }

    /// Give a trailing frame without newline one last chance at end of stream.
    pub fn finish(&mut self) -> Option<Result<StreamToken, DecodeError>> {
        if self.finished {
            return None;
        }

        let rest = std::mem::take(&mut self.pending);
        let item = self.decode_line(&rest);
        self.finished = true;

        item.map(|result| {
            result.map_err(|e| match e {
                DecodeError::Envelope { payload, source } => {
                    DecodeError::Residual { payload, source }
                }
                residual => residual,
            })
        })
    }

    /// Whether the end marker (or `finish`) has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<Result<StreamToken, DecodeError>> {
        let text = String::from_utf8_lossy(raw);
        let payload = text.trim().strip_prefix("data:")?.trim_start();

        if payload == DONE_MARKER {
            self.finished = true;
            return None;
        }

        let envelope: Envelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(source) => {
                return Some(Err(DecodeError::Envelope {
                    payload: payload.to_string(),
                    source,
                }))
            }
        };

        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map(|content| Ok(StreamToken(content)))
    }
}
