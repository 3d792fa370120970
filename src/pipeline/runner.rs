use crate::batch::{dispatch, Batch, BatchFlow, BatchHandler, LineBatcher, StopReason};
use crate::pipeline::orchestrator::{BatchOrchestrator, BatchOutcome, OrchestratorError};
use crate::source::{FileReader, SourceError};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that stop the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input error: {0}")]
    Source(#[from] SourceError),

    #[error("batch {batch} failed: {source}")]
    Batch {
        batch: u64,
        #[source]
        source: OrchestratorError,
    },
}

#[async_trait]
impl BatchHandler for BatchOrchestrator {
    type Error = PipelineError;

    async fn handle(&mut self, batch: Batch) -> Result<BatchFlow, PipelineError> {
        match self.process(&batch).await {
            Ok(BatchOutcome::PromptPreviewed) => Ok(BatchFlow::Stop),
            Ok(_) => Ok(BatchFlow::Continue),
            Err(source) => Err(PipelineError::Batch {
                batch: batch.number,
                source,
            }),
        }
    }
}

/// Read a file to the end, handing each batch to `handler` as soon as it is cut.
///
/// The residual buffer is flushed at end of input.
pub async fn run_file<H>(
    path: &Path,
    batcher: &mut LineBatcher,
    handler: &mut H,
) -> Result<StopReason, H::Error>
where
    H: BatchHandler,
    H::Error: From<SourceError>,
{
    let mut reader = FileReader::open(path).await?;
    info!(path = %path.display(), "Reading input file");

    while let Some(line) = reader.next_line().await? {
        if let Some(batch) = batcher.push_line(line) {
            if let Some(reason) = dispatch(batcher, handler, batch).await? {
                return Ok(reason);
            }
        }
    }

    debug!(
        lines = reader.lines_read(),
        buffered = batcher.buffered(),
        "Reached end of input"
    );

    while let Some(batch) = batcher.finish() {
        if let Some(reason) = dispatch(batcher, handler, batch).await? {
            return Ok(reason);
        }
    }

    Ok(StopReason::EndOfInput)
}
