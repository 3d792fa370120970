pub mod orchestrator;
pub mod runner;
pub mod sink;

pub use orchestrator::{BatchOrchestrator, BatchOutcome, OrchestratorError};
pub use runner::{run_file, PipelineError};
pub use sink::{FindingSink, ResponseLog, SinkError};
