pub mod batcher;
pub mod types;

pub use batcher::LineBatcher;
pub use types::{Batch, LogLine};

use async_trait::async_trait;

/// What the driving loop should do after a batch was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFlow {
    Continue,
    Stop,
}

/// Why a driving loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Finite input was read to the end and flushed
    EndOfInput,
    /// The configured batch cap was reached
    MaxBatches,
    /// The handler asked to stop
    Halted,
}

/// Receives batches from the finite reader or the tail watcher.
///
/// Handlers are awaited to completion before the driving loop reads more input,
/// so at most one batch is in flight at any time.
#[async_trait]
pub trait BatchHandler: Send {
    type Error: Send;

    async fn handle(&mut self, batch: Batch) -> Result<BatchFlow, Self::Error>;
}

/// Hand one batch to the handler and decide whether the driving loop should stop.
pub(crate) async fn dispatch<H>(
    batcher: &LineBatcher,
    handler: &mut H,
    batch: Batch,
) -> Result<Option<StopReason>, H::Error>
where
    H: BatchHandler,
{
    if handler.handle(batch).await? == BatchFlow::Stop {
        return Ok(Some(StopReason::Halted));
    }
    if batcher.is_exhausted() {
        return Ok(Some(StopReason::MaxBatches));
    }
    Ok(None)
}
