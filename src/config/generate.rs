pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGSIFT CONFIGURATION
# =============================================================================
# Logsift sends overlapping batches of log lines to a chat-completions style
# analysis service and collects the findings it reports.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logsift/config.yml
#   3. /etc/logsift/config.yml
#
# Command line flags override values from this file. Values can reference
# environment variables with $env{NAME}.

# =============================================================================
# ANALYSIS SERVICE
# =============================================================================
# Any field left out here is read from the environment (or a .env file):
#   API_URL, MODEL, API_KEY

service:
  url: https://api.openai.com/v1/chat/completions
  model: gpt-4o-mini
  # api_key: $env{OPENAI_API_KEY}

# =============================================================================
# BATCHING
# =============================================================================

batch:
  # Lines per request
  size: 200
  # Lines repeated from the end of the previous batch; must be smaller than size
  window: 50
  # Stop after this many batches (omit for no limit)
  # max_batches: 10

# =============================================================================
# CONTINUOUS MODE
# =============================================================================
# With tail enabled the input file is watched for appended lines. A batch is
# sent as soon as enough lines arrive, or after `timeout` of inactivity.

tail:
  enabled: false
  timeout: 60s
  # How often the file size is checked
  poll_interval: 1s
  # Where to start: 'end' (only new lines) or 'beginning'
  read_start: end

# =============================================================================
# OUTPUT
# =============================================================================

output:
  # JSONL file receiving one finding per line (printed to the console if unset)
  # findings: ~/logsift/findings.jsonl
  # Raw service responses, for troubleshooting
  # llm_log: ~/logsift/responses.log
  # Print a dot per received chunk while a batch streams
  progress: true
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, validate_config};
    use std::time::Duration;

    #[test]
    fn test_generated_config_is_valid() {
        let config = parse_config(&generate_starter_config()).expect("starter config parses");
        validate_config(&config).expect("starter config validates");

        assert_eq!(config.batch.size, 200);
        assert_eq!(config.batch.window, 50);
        assert_eq!(config.tail.timeout, Some(Duration::from_secs(60)));
        assert!(config.service.api_key.is_none());
        assert!(config.output.findings.is_none());
    }
}
