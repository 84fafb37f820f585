use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: Option<LlmConfig>,
    pub tagging: TaggingConfig,
    pub watcher: WatcherConfig,
    pub synthesis: SynthesisConfig,
    pub recall: RecallConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
    pub busy_timeout_ms: u64,
    pub journal_mode: String,
    pub synchronous: String,
}

impl DatabaseConfig {
    /// Local file database with default pragmas.
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            url: path.into(),
            auth_token: None,
            local_path: None,
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
        }
    }
}

/// LLM configuration for the extraction capability
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Transport-level retries inside the API client. Tagging has its own budget.
    pub max_retries: u32,
}

/// Retry, timeout and concurrency policy for background note tagging.
#[derive(Debug, Clone, Deserialize)]
pub struct TaggingConfig {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub call_timeout_secs: u64,
    pub queue_capacity: usize,
    pub max_concurrent: usize,
    /// When set, failed notes are re-queued by the watcher once their
    /// failure is older than this many seconds.
    pub retry_failed_after_secs: Option<u64>,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 200,
            max_backoff_ms: 5000,
            call_timeout_secs: 30,
            queue_capacity: 256,
            max_concurrent: 4,
            retry_failed_after_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    pub poll_interval_secs: u64,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    pub refresh_interval_secs: u64,
    pub rules: RuleThresholds,
}

/// Thresholds consumed by the recommendation rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuleThresholds {
    pub min_coping_mentions: usize,
    pub recurring_theme_sessions: usize,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            min_coping_mentions: 2,
            recurring_theme_sessions: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecallConfig {
    pub max_query_len: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self { max_query_len: 256 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:tessera.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
                busy_timeout_ms: parse_env_or("DATABASE_BUSY_TIMEOUT_MS", 5000),
                journal_mode: env::var("DATABASE_JOURNAL_MODE")
                    .unwrap_or_else(|_| "WAL".to_string()),
                synchronous: env::var("DATABASE_SYNCHRONOUS")
                    .unwrap_or_else(|_| "NORMAL".to_string()),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 1),
            }),
            tagging: TaggingConfig {
                max_retries: parse_env_or("TAGGING_MAX_RETRIES", 3),
                base_backoff_ms: parse_env_or("TAGGING_BASE_BACKOFF_MS", 200),
                max_backoff_ms: parse_env_or("TAGGING_MAX_BACKOFF_MS", 5000),
                call_timeout_secs: parse_env_or("TAGGING_CALL_TIMEOUT_SECS", 30),
                queue_capacity: parse_env_or("TAGGING_QUEUE_CAPACITY", 256),
                max_concurrent: parse_env_or("TAGGING_MAX_CONCURRENT", 4),
                retry_failed_after_secs: parse_env_opt("TAGGING_RETRY_FAILED_AFTER_SECS"),
            },
            watcher: WatcherConfig {
                poll_interval_secs: parse_env_or("NOTE_POLL_INTERVAL_SECS", 10),
                batch_size: parse_env_or("NOTE_POLL_BATCH_SIZE", 50),
            },
            synthesis: SynthesisConfig {
                refresh_interval_secs: parse_env_or("SYNTHESIS_REFRESH_INTERVAL_SECS", 3600),
                rules: RuleThresholds {
                    min_coping_mentions: parse_env_or("REC_MIN_COPING_MENTIONS", 2),
                    recurring_theme_sessions: parse_env_or("REC_RECURRING_THEME_SESSIONS", 3),
                },
            },
            recall: RecallConfig {
                max_query_len: parse_env_or("RECALL_MAX_QUERY_LEN", 256),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to treating the whole string as a local model
    ("local", model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_tagging_config_defaults() {
        for var in [
            "TAGGING_MAX_RETRIES",
            "TAGGING_BASE_BACKOFF_MS",
            "TAGGING_CALL_TIMEOUT_SECS",
            "TAGGING_RETRY_FAILED_AFTER_SECS",
        ] {
            std::env::remove_var(var);
        }

        let config = Config::default();
        assert_eq!(config.tagging.max_retries, 3);
        assert_eq!(config.tagging.base_backoff_ms, 200);
        assert_eq!(config.tagging.call_timeout_secs, 30);
        assert!(config.tagging.retry_failed_after_secs.is_none());
    }

    #[test]
    #[serial]
    fn test_tagging_config_from_env() {
        std::env::set_var("TAGGING_MAX_RETRIES", "5");
        std::env::set_var("TAGGING_RETRY_FAILED_AFTER_SECS", "600");

        let config = Config::default();
        assert_eq!(config.tagging.max_retries, 5);
        assert_eq!(config.tagging.retry_failed_after_secs, Some(600));

        std::env::remove_var("TAGGING_MAX_RETRIES");
        std::env::remove_var("TAGGING_RETRY_FAILED_AFTER_SECS");
    }

    #[test]
    #[serial]
    fn test_invalid_value_falls_back_to_default() {
        std::env::set_var("REC_MIN_COPING_MENTIONS", "lots");
        let config = Config::default();
        assert_eq!(config.synthesis.rules.min_coping_mentions, 2);
        std::env::remove_var("REC_MIN_COPING_MENTIONS");
    }

    #[test]
    #[serial]
    fn test_llm_config_present_only_with_model() {
        std::env::remove_var("LLM_MODEL");
        assert!(Config::default().llm.is_none());

        std::env::set_var("LLM_MODEL", "openai/gpt-4o-mini");
        let llm = Config::default().llm.expect("llm config");
        assert_eq!(llm.model, "openai/gpt-4o-mini");
        assert_eq!(llm.timeout_secs, 30);
        std::env::remove_var("LLM_MODEL");
    }

    #[test]
    fn test_parse_llm_provider_model() {
        assert_eq!(parse_llm_provider_model("ollama/llama3.2"), ("ollama", "llama3.2"));
        assert_eq!(
            parse_llm_provider_model("openrouter/anthropic/claude-3.5-sonnet"),
            ("openrouter", "anthropic/claude-3.5-sonnet")
        );
        assert_eq!(
            parse_llm_provider_model("unknown/model-name"),
            ("local", "unknown/model-name")
        );
    }

    #[test]
    fn test_rule_threshold_defaults() {
        let rules = RuleThresholds::default();
        assert_eq!(rules.min_coping_mentions, 2);
        assert_eq!(rules.recurring_theme_sessions, 3);
    }
}
