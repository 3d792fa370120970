use crate::analysis::{HttpAnalysisService, ServiceError, DEFAULT_PROMPT};
use crate::batch::{LineBatcher, StopReason};
use crate::config::{
    load_config, resolve_config_path, validate_config, Config, ConfigError, ReadStart,
    ServiceSettings,
};
use crate::pipeline::{
    run_file, BatchOrchestrator, FindingSink, PipelineError, ResponseLog, SinkError,
};
use crate::source::{SourceError, TailWatcher};
use clap::Args;
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("analysis service error: {0}")]
    Service(#[from] ServiceError),

    #[error("output error: {0}")]
    Output(#[from] SinkError),

    #[error("input error: {0}")]
    Source(#[from] SourceError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),
}

/// Flags for analysing a log file. Each one overrides the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Log file to analyse
    pub input: Option<PathBuf>,

    /// Lines per batch
    #[arg(short = 'b', long = "batchsize")]
    pub batch_size: Option<usize>,

    /// Lines repeated from the end of the previous batch
    #[arg(short = 'w', long)]
    pub window: Option<usize>,

    /// Append findings to this JSONL file instead of printing them
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Keep watching the file for appended lines
    #[arg(short = 't', long)]
    pub tail: bool,

    /// Seconds without a full batch before buffered lines are sent anyway (tail mode)
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,

    /// Stop after this many batches
    #[arg(short = 'm', long = "maxbatches")]
    pub max_batches: Option<usize>,

    /// Append raw service responses to this file
    #[arg(short = 'l', long = "llmlog")]
    pub llm_log: Option<PathBuf>,

    /// Print the prompt of the first batch and exit without calling the service
    #[arg(short = 'p', long)]
    pub prompt: bool,

    /// In tail mode, analyse the existing content too
    #[arg(long)]
    pub from_beginning: bool,

    /// How often the file is checked for growth in tail mode, in milliseconds
    #[arg(long)]
    pub poll_ms: Option<u64>,
}

impl RunArgs {
    /// Apply command line overrides on top of file and environment settings
    pub fn apply(&self, config: &mut Config) {
        if let Some(size) = self.batch_size {
            config.batch.size = size;
        }
        if let Some(window) = self.window {
            config.batch.window = window;
        }
        if let Some(max) = self.max_batches {
            config.batch.max_batches = Some(max);
        }
        if self.tail {
            config.tail.enabled = true;
        }
        if let Some(secs) = self.timeout {
            config.tail.timeout = Some(Duration::from_secs(secs));
        }
        if self.from_beginning {
            config.tail.read_start = ReadStart::Beginning;
        }
        if let Some(ms) = self.poll_ms {
            config.tail.poll_interval = Duration::from_millis(ms);
        }
        if let Some(path) = &self.output {
            config.output.findings = Some(path.clone());
        }
        if let Some(path) = &self.llm_log {
            config.output.llm_log = Some(path.clone());
        }
    }
}

struct Prepared {
    config: Config,
    input: PathBuf,
    service: ServiceSettings,
}

pub async fn run(config_path: Option<PathBuf>, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let prepared = match prepare(config_path.as_deref(), &args) {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            eprintln!("\nRun 'logsift --help' for usage, or 'logsift config init' to create a config file.");
            std::process::exit(1);
        }
    };

    run_pipeline(prepared, args.prompt).await.map_err(|e| e.into())
}

/// Layer file, environment and flags into a validated config
fn prepare(config_path: Option<&Path>, args: &RunArgs) -> Result<Prepared, ConfigError> {
    let mut config = match resolve_config_path(config_path) {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            load_config(&path)?
        }
        None => Config::default(),
    };

    config.service.fill_from_env();
    args.apply(&mut config);
    validate_config(&config)?;

    let input = args.input.clone().ok_or(ConfigError::MissingInput)?;

    // A prompt preview never reaches the service
    let service = if args.prompt {
        config.service.resolve().unwrap_or_default()
    } else {
        config.service.resolve()?
    };

    Ok(Prepared {
        config,
        input,
        service,
    })
}

async fn run_pipeline(prepared: Prepared, preview: bool) -> Result<(), RunError> {
    let Prepared {
        config,
        input,
        service,
    } = prepared;

    let findings_path = config.output.findings.as_deref().filter(|_| !preview);
    let sink = FindingSink::open(findings_path).await?;

    let client = Arc::new(HttpAnalysisService::new(&service)?);
    let mut orchestrator = BatchOrchestrator::new(client, service.model.clone(), sink)
        .with_progress(config.output.progress)
        .with_prompt_preview(preview);

    if let Some(path) = config.output.llm_log.as_deref().filter(|_| !preview) {
        orchestrator = orchestrator.with_response_log(ResponseLog::open(path).await?);
    }

    let mut batcher = LineBatcher::from_config(&config.batch);

    let reason = if config.tail.enabled {
        let timeout = config.tail.timeout.ok_or_else(|| {
            ConfigError::Validation("tail mode requires a timeout".to_string())
        })?;
        let mut watcher = TailWatcher::open(
            &input,
            config.tail.read_start,
            timeout,
            config.tail.poll_interval,
        )
        .await?;

        tokio::select! {
            result = watcher.run(&mut batcher, &mut orchestrator) => result?,
            _ = signal::ctrl_c() => {
                warn!("Interrupted; buffered lines were not analysed");
                StopReason::Halted
            }
        }
    } else {
        run_file(&input, &mut batcher, &mut orchestrator).await?
    };

    // Input too short for a batch: show the bare prompt
    if preview && batcher.emitted() == 0 {
        println!("{}", style("PROMPT").bold());
        println!("{}", DEFAULT_PROMPT);
    }

    info!(batches = batcher.emitted(), reason = ?reason, "Finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_flags_override_config() {
        let cli = TestCli::parse_from([
            "logsift", "-b", "100", "-w", "20", "-t", "-T", "30", "-m", "4", "-o",
            "/tmp/out.jsonl", "--from-beginning", "--poll-ms", "250", "app.log",
        ]);

        let mut config = Config::default();
        cli.run.apply(&mut config);

        assert_eq!(cli.run.input, Some(PathBuf::from("app.log")));
        assert_eq!(config.batch.size, 100);
        assert_eq!(config.batch.window, 20);
        assert_eq!(config.batch.max_batches, Some(4));
        assert!(config.tail.enabled);
        assert_eq!(config.tail.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.tail.read_start, ReadStart::Beginning);
        assert_eq!(config.tail.poll_interval, Duration::from_millis(250));
        assert_eq!(config.output.findings, Some(PathBuf::from("/tmp/out.jsonl")));
    }

    #[test]
    fn test_unset_flags_leave_config_alone() {
        let cli = TestCli::parse_from(["logsift", "app.log"]);
        let mut config = Config::default();
        config.batch.size = 300;
        cli.run.apply(&mut config);

        assert_eq!(config.batch.size, 300);
        assert!(!config.tail.enabled);
        assert!(config.output.llm_log.is_none());
    }

    #[test]
    fn test_missing_input_rejected() {
        let args = RunArgs {
            prompt: true,
            ..Default::default()
        };
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("config.yml");
        std::fs::write(&config_path, "").unwrap();

        match prepare(Some(&config_path), &args) {
            Err(ConfigError::MissingInput) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected missing input"),
        }
    }

    #[test]
    fn test_window_flag_validated() {
        let args = RunArgs {
            input: Some(PathBuf::from("app.log")),
            batch_size: Some(10),
            window: Some(10),
            prompt: true,
            ..Default::default()
        };
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("config.yml");
        std::fs::write(&config_path, "").unwrap();

        assert!(matches!(
            prepare(Some(&config_path), &args),
            Err(ConfigError::ValidationList(_))
        ));
    }
}
