use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TileWalkError};

/// Top-level tilewalk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Run loop limits and policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum tile executions per run before it is failed.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Wall-clock limit per run in seconds (0 = unlimited).
    #[serde(default)]
    pub max_duration_secs: u64,
    /// Mark a run Failed instead of Completed when a tile ends it because
    /// of an error (e.g. a failed API call).
    #[serde(default)]
    pub fail_on_tile_error: bool,
    /// Capacity of the event bus broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_duration_secs: 0,
            fail_on_tile_error: false,
            event_capacity: default_event_capacity(),
        }
    }
}

/// Outbound HTTP settings for APICall tiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// How long a UserInteraction tile waits for its answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_prompt_timeout")]
    pub timeout_secs: u64,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_prompt_timeout(),
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_max_steps() -> usize { 1000 }
fn default_event_capacity() -> usize { 256 }
fn default_http_timeout() -> u64 { 30 }
fn default_prompt_timeout() -> u64 { 300 }
fn default_user_agent() -> String { format!("tilewalk/{}", env!("CARGO_PKG_VERSION")) }
fn default_log_filter() -> String { "tilewalk=info,warn".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TileWalkError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| TileWalkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_steps == 0 {
            return Err(TileWalkError::Config(
                "engine.max_steps must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_step_budget_is_rejected() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.engine.max_steps = 0;
        match config.validate() {
            Err(TileWalkError::Config(msg)) => assert!(msg.contains("max_steps")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TILEWALK_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_TILEWALK_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_TILEWALK_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_TILEWALK_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_TILEWALK_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.max_steps, 1000);
        assert_eq!(config.engine.max_duration_secs, 0);
        assert!(!config.engine.fail_on_tile_error);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.http.user_agent.starts_with("tilewalk/"));
        assert_eq!(config.prompt.timeout_secs, 300);
        assert_eq!(config.log.filter, "tilewalk=info,warn");
    }

    #[test]
    fn test_partial_sections() {
        let toml_str = r#"
[engine]
max_steps = 50
fail_on_tile_error = true

[http]
timeout_secs = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.max_steps, 50);
        assert!(config.engine.fail_on_tile_error);
        assert_eq!(config.engine.event_capacity, 256);
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.prompt.timeout_secs, 300);
    }
}
