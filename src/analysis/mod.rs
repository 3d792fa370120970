pub mod client;
pub mod extract;
pub mod finding;
pub mod prompt;
pub mod stream;

pub use client::{
    AnalysisRequest, AnalysisService, ChatMessage, ChunkStream, HttpAnalysisService, ServiceError,
};
pub use extract::{extract_findings, recover_findings, FragmentError};
pub use finding::{ExtractionResult, Finding, Severity};
pub use prompt::{build_prompt, DEFAULT_PROMPT};
pub use stream::{DecodeError, StreamDecoder, StreamToken};
