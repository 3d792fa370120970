use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, ENV_VAR};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no input file given; pass the path of the log file to analyze")]
    MissingInput,
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string)
}

/// Parse config text: expand `$env{VAR}` references, deserialize, expand `~` in paths.
///
/// Validation is separate because command line overrides are applied in between.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml)?;

    // An empty file is a valid config made of defaults
    let mut config: Config = if yaml.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml)?
    };

    expand_paths(&mut config);
    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded_vars: Vec<String> = ENV_VAR
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with the actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn expand_paths(config: &mut Config) {
    if let Some(path) = config.output.findings.as_mut() {
        *path = expand_tilde(path);
    }
    if let Some(path) = config.output.llm_log.as_mut() {
        *path = expand_tilde(path);
    }
}

impl ServiceConfig {
    /// Fill unset fields from `API_URL`, `MODEL` and `API_KEY` via `lookup`.
    pub fn fill_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.url.is_none() {
            self.url = non_empty("API_URL");
        }
        if self.model.is_none() {
            self.model = non_empty("MODEL");
        }
        if self.api_key.is_none() {
            self.api_key = non_empty("API_KEY");
        }
    }

    /// Fill unset fields from the process environment
    pub fn fill_from_env(&mut self) {
        self.fill_from(|key| std::env::var(key).ok());
    }

    /// Require every field to be present
    pub fn resolve(&self) -> Result<ServiceSettings, ConfigError> {
        let mut errors = Vec::new();

        let url = self.url.clone().filter(|v| !v.trim().is_empty());
        let model = self.model.clone().filter(|v| !v.trim().is_empty());
        let api_key = self.api_key.clone().filter(|v| !v.trim().is_empty());

        if url.is_none() {
            errors.push("service.url is not set (or set API_URL in the environment)".to_string());
        }
        if model.is_none() {
            errors.push("service.model is not set (or set MODEL in the environment)".to_string());
        }
        if api_key.is_none() {
            errors.push(
                "service.api_key is not set (or set API_KEY in the environment or .env file)"
                    .to_string(),
            );
        }

        match (url, model, api_key) {
            (Some(url), Some(model), Some(api_key)) => Ok(ServiceSettings {
                url,
                model,
                api_key,
            }),
            _ => Err(ConfigError::ValidationList(errors)),
        }
    }
}

/// Checks batching and tail settings. Service settings are checked by `ServiceConfig::resolve`.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.batch.size == 0 {
        errors.push("batch.size must be greater than zero".to_string());
    }

    if config.batch.window >= config.batch.size {
        errors.push(format!(
            "batch.window ({}) must be smaller than batch.size ({})",
            config.batch.window, config.batch.size
        ));
    }

    if config.batch.max_batches == Some(0) {
        errors.push("batch.max_batches must be greater than zero when set".to_string());
    }

    if config.tail.enabled {
        match config.tail.timeout {
            None => errors.push("tail mode requires a timeout (--timeout or tail.timeout)".to_string()),
            Some(timeout) if timeout.is_zero() => {
                errors.push("tail.timeout must be greater than zero".to_string())
            }
            Some(_) => {}
        }

        if config.tail.poll_interval.is_zero() {
            errors.push("tail.poll_interval must be greater than zero".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
