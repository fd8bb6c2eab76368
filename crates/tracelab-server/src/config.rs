//! Server configuration read from `TRACELAB_*` environment variables.
//!
//! | Variable                    | Default |
//! |-----------------------------|---------|
//! | `TRACELAB_PORT`             | 3000    |
//! | `TRACELAB_RUN_TIMEOUT_MS`   | 2000    |
//! | `TRACELAB_TRACE_TIMEOUT_MS` | 2000    |
//! | `TRACELAB_EVENT_BUDGET`     | 300     |
//! | `TRACELAB_MAX_DEPTH`        | 256     |
//! | `TRACELAB_LLM_PROVIDER`     | unset   |
//! | `TRACELAB_LLM_BASE_URL`     | unset   |
//! | `TRACELAB_LLM_API_KEY`      | unset   |
//! | `TRACELAB_LLM_MODEL`        | unset   |
//!
//! Unparseable numbers fall back to the default with a warning.

use std::str::FromStr;
use std::time::Duration;

use tracelab_check::interpreter::InterpreterConfig;
use tracelab_check::tracer::TraceConfig;

/// Connection settings for the explanation provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmConfig {
    /// `openrouter` or `openai_compatible`; `None` disables explanations.
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Wall-clock bound on one sandboxed run.
    pub run_timeout: Duration,
    /// Wall-clock bound on one traced run.
    pub trace_timeout: Duration,
    pub event_budget: usize,
    pub max_depth: usize,
    pub llm: LlmConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 3000,
            run_timeout: Duration::from_millis(2000),
            trace_timeout: Duration::from_millis(2000),
            event_budget: 300,
            max_depth: 256,
            llm: LlmConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = ServerConfig::default();

        ServerConfig {
            port: parse_or(get("TRACELAB_PORT"), "TRACELAB_PORT", defaults.port),
            run_timeout: Duration::from_millis(parse_or(
                get("TRACELAB_RUN_TIMEOUT_MS"),
                "TRACELAB_RUN_TIMEOUT_MS",
                defaults.run_timeout.as_millis() as u64,
            )),
            trace_timeout: Duration::from_millis(parse_or(
                get("TRACELAB_TRACE_TIMEOUT_MS"),
                "TRACELAB_TRACE_TIMEOUT_MS",
                defaults.trace_timeout.as_millis() as u64,
            )),
            event_budget: parse_or(
                get("TRACELAB_EVENT_BUDGET"),
                "TRACELAB_EVENT_BUDGET",
                defaults.event_budget,
            ),
            max_depth: parse_or(
                get("TRACELAB_MAX_DEPTH"),
                "TRACELAB_MAX_DEPTH",
                defaults.max_depth,
            ),
            llm: LlmConfig {
                provider: get("TRACELAB_LLM_PROVIDER"),
                base_url: get("TRACELAB_LLM_BASE_URL"),
                api_key: get("TRACELAB_LLM_API_KEY"),
                model: get("TRACELAB_LLM_MODEL"),
            },
        }
    }

    /// Tracer settings derived from the server limits.
    pub fn trace_config(&self) -> TraceConfig {
        TraceConfig {
            event_budget: self.event_budget,
            interpreter: InterpreterConfig {
                max_recursion_depth: self.max_depth,
                time_limit: Some(self.trace_timeout),
                ..InterpreterConfig::default()
            },
        }
    }
}

fn parse_or<T: FromStr + Copy>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        None => default,
        Some(text) => text.parse().unwrap_or_else(|_| {
            tracing::warn!("ignoring invalid {}={:?}", key, text);
            default
        }),
    }
}
