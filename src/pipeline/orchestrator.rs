use crate::analysis::{
    extract_findings, AnalysisRequest, AnalysisService, DecodeError, ExtractionResult,
    ServiceError, StreamDecoder, StreamToken, DEFAULT_PROMPT,
};
use crate::batch::Batch;
use crate::pipeline::sink::{FindingSink, ResponseLog, SinkError};
use console::{style, Term};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Output(#[from] SinkError),
}

/// What happened to one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Findings were written to the sink
    Findings(usize),
    /// The service reported nothing worth flagging
    AllClear,
    /// The prompt was printed instead of being sent
    PromptPreviewed,
}

/// Drives one batch at a time through the analysis service.
///
/// For each batch: build the request, stream the reply through a `StreamDecoder`,
/// mirror decoded text into the response log, then recover findings and write them
/// to the sink.
pub struct BatchOrchestrator {
    service: Arc<dyn AnalysisService>,
    model: String,
    prompt: String,
    sink: FindingSink,
    response_log: Option<ResponseLog>,
    progress: bool,
    preview_prompt: bool,
}

impl BatchOrchestrator {
    pub fn new(service: Arc<dyn AnalysisService>, model: impl Into<String>, sink: FindingSink) -> Self {
        Self {
            service,
            model: model.into(),
            prompt: DEFAULT_PROMPT.to_string(),
            sink,
            response_log: None,
            progress: true,
            preview_prompt: false,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_response_log(mut self, log: ResponseLog) -> Self {
        self.response_log = Some(log);
        self
    }

    /// Print a dot per received chunk
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Print the first request's prompt and stop instead of calling the service
    pub fn with_prompt_preview(mut self, preview: bool) -> Self {
        self.preview_prompt = preview;
        self
    }

    pub async fn process(&mut self, batch: &Batch) -> Result<BatchOutcome, OrchestratorError> {
        let request = AnalysisRequest::for_batch(&self.model, &self.prompt, batch);

        if self.preview_prompt {
            println!("{}", style("PROMPT").bold());
            println!("{}", request.content());
            return Ok(BatchOutcome::PromptPreviewed);
        }

        let (first, last) = batch.seq_range().unwrap_or_default();
        info!(
            batch = batch.number,
            lines = batch.len(),
            overlap = batch.overlap,
            first,
            last,
            "Sending batch"
        );
        println!(
            "{}",
            style(format!(
                "Batch {}: lines {}-{} ({} lines)",
                batch.number,
                first,
                last,
                batch.len()
            ))
            .cyan()
        );

        let text = self.collect_response(batch.number, &request).await?;

        match extract_findings(&text) {
            ExtractionResult::AllClear => {
                info!(batch = batch.number, "Batch is all clear");
                println!("{}", style("ALL CLEAR").green().bold());
                println!("{}", style(&text).dim());
                Ok(BatchOutcome::AllClear)
            }
            ExtractionResult::Findings(findings) => {
                self.sink.write(&findings).await?;
                info!(batch = batch.number, findings = findings.len(), "Batch processed");
                println!(
                    "{}",
                    style(format!(
                        "Batch {} processed: {} finding(s)",
                        batch.number,
                        findings.len()
                    ))
                    .yellow()
                );
                Ok(BatchOutcome::Findings(findings.len()))
            }
        }
    }

    async fn collect_response(
        &mut self,
        batch: u64,
        request: &AnalysisRequest,
    ) -> Result<String, OrchestratorError> {
        let mut chunks = self.service.open_stream(request).await?;

        if let Some(log) = self.response_log.as_mut() {
            log.begin_batch().await?;
        }

        let mut decoder = StreamDecoder::new();
        let mut text = String::new();
        let mut chunk_count = 0usize;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            chunk_count += 1;

            if self.progress {
                Term::stdout().write_str(".").ok();
            }

            for item in decoder.push(&chunk) {
                self.accept(batch, item, &mut text).await?;
            }

            if decoder.is_finished() {
                break;
            }
        }

        if let Some(item) = decoder.finish() {
            self.accept(batch, item, &mut text).await?;
        }

        if self.progress && chunk_count > 0 {
            Term::stdout().write_line("").ok();
        }

        if let Some(log) = self.response_log.as_mut() {
            log.end_batch().await?;
        }

        debug!(batch, chunks = chunk_count, chars = text.len(), "Response complete");
        Ok(text)
    }

    async fn accept(
        &mut self,
        batch: u64,
        item: Result<StreamToken, DecodeError>,
        text: &mut String,
    ) -> Result<(), OrchestratorError> {
        match item {
            Ok(token) => {
                if let Some(log) = self.response_log.as_mut() {
                    log.append(token.as_str()).await?;
                }
                text.push_str(token.as_str());
            }
            Err(e) => warn!(batch, error = %e, "Skipping malformed stream frame"),
        }
        Ok(())
    }
}
