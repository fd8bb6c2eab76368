//! Natural-language explanations from an OpenAI-compatible chat provider.
//!
//! The pipeline only sees the [`Explainer`] trait. Failures there degrade to
//! an absent explanation; they never fail a submission.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use tracelab_check::Issue;

use crate::config::LlmConfig;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Summaries longer than this are cut before being put in a prompt.
const MAX_SUMMARY_CHARS: usize = 12_000;

#[derive(Debug, thiserror::Error)]
pub enum ExplainError {
    #[error("explanation provider not configured")]
    NotConfigured,

    #[error("unsupported provider '{0}': use openrouter or openai_compatible")]
    UnsupportedProvider(String),

    #[error("openai_compatible provider requires TRACELAB_LLM_BASE_URL")]
    MissingBaseUrl,

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider request failed ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("provider response parse failed: {0}")]
    Parse(String),

    #[error("provider response missing assistant content")]
    EmptyContent,
}

/// Turns a prompt into prose.
#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(&self, prompt: &str) -> Result<String, ExplainError>;
}

/// Used when no provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledExplainer;

#[async_trait]
impl Explainer for DisabledExplainer {
    async fn explain(&self, _prompt: &str) -> Result<String, ExplainError> {
        Err(ExplainError::NotConfigured)
    }
}

/// Chat-completions client for `openrouter` and `openai_compatible`
/// providers.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleExplainer {
    client: reqwest::Client,
    openrouter: bool,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleExplainer {
    pub fn new(llm: &LlmConfig) -> Result<Self, ExplainError> {
        let provider = llm.provider.as_deref().ok_or(ExplainError::NotConfigured)?;
        let base_url = match provider {
            "openrouter" => llm
                .base_url
                .clone()
                .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string()),
            "openai_compatible" => llm.base_url.clone().ok_or(ExplainError::MissingBaseUrl)?,
            other => return Err(ExplainError::UnsupportedProvider(other.to_string())),
        };

        Ok(OpenAiCompatibleExplainer {
            client: reqwest::Client::new(),
            openrouter: provider == "openrouter",
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: llm.api_key.clone().unwrap_or_default(),
            model: llm.model.clone().unwrap_or_default(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Explainer for OpenAiCompatibleExplainer {
    async fn explain(&self, prompt: &str) -> Result<String, ExplainError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        if self.openrouter {
            req = req
                .header("HTTP-Referer", "https://localhost:3000")
                .header("X-Title", "tracelab");
        }

        let response = req
            .send()
            .await
            .map_err(|err| ExplainError::Request(err.to_string()))?;
        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|err| ExplainError::Request(err.to_string()))?;

        if !status.is_success() {
            return Err(ExplainError::Status {
                status: status.as_u16(),
                body: body_text,
            });
        }

        parse_content(&body_text)
    }
}

fn parse_content(body: &str) -> Result<String, ExplainError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|err| ExplainError::Parse(err.to_string()))?;
    parsed
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_deref())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(ExplainError::EmptyContent)
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// The explainer for a configuration: a provider client, or
/// [`DisabledExplainer`] when no provider is set or it is misconfigured.
pub fn explainer_from_config(llm: &LlmConfig) -> Arc<dyn Explainer> {
    if llm.provider.is_none() {
        return Arc::new(DisabledExplainer);
    }
    match OpenAiCompatibleExplainer::new(llm) {
        Ok(explainer) => {
            tracing::info!("explanations via {}", explainer.endpoint());
            Arc::new(explainer)
        }
        Err(err) => {
            tracing::warn!("explanations disabled: {}", err);
            Arc::new(DisabledExplainer)
        }
    }
}

/// Prompt asking for a walkthrough of a submission and its analysis.
pub fn explain_prompt(source: &str, summary: &JsonValue, concise: bool) -> String {
    let style = if concise {
        "Answer in at most five short sentences."
    } else {
        "Walk through the execution step by step, then summarize the complexity."
    };
    format!(
        "You are tutoring a student on algorithms.\n\
         Explain what the following program does and how it behaves when run, \
         using the analysis below (topic, trace artifacts, detected issues).\n\
         {style}\n\n\
         Program:\n```\n{source}\n```\n\n\
         Analysis (JSON):\n{analysis}\n",
        style = style,
        source = source,
        analysis = clip(&summary.to_string(), MAX_SUMMARY_CHARS),
    )
}

/// Prompt asking for a corrected program.
pub fn fix_prompt(source: &str, issues: &[Issue]) -> String {
    let listed = if issues.is_empty() {
        "- none detected; look for logic errors".to_string()
    } else {
        issues
            .iter()
            .map(|issue| format!("- [{:?}] {}: {}", issue.severity, issue.kind, issue.detail))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Fix the following program. Keep its structure and names, change only \
         what is needed, and reply with the corrected program in a single code \
         block followed by one sentence per change.\n\n\
         Program:\n```\n{}\n```\n\nSuspected issues:\n{}\n",
        source, listed
    )
}

/// Extracts the first fenced code block from a reply, if any.
pub fn extract_code_block(reply: &str) -> Option<String> {
    let start = reply.find("```")?;
    let after_fence = &reply[start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim_end().to_string())
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracelab_check::Severity;

    fn llm(provider: Option<&str>, base_url: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: provider.map(str::to_string),
            base_url: base_url.map(str::to_string),
            api_key: Some("k".into()),
            model: Some("m".into()),
        }
    }

    #[test]
    fn provider_endpoints() {
        let openrouter = OpenAiCompatibleExplainer::new(&llm(Some("openrouter"), None)).unwrap();
        assert_eq!(openrouter.endpoint(), "https://openrouter.ai/api/v1/chat/completions");

        let local =
            OpenAiCompatibleExplainer::new(&llm(Some("openai_compatible"), Some("http://h/v1/")))
                .unwrap();
        assert_eq!(local.endpoint(), "http://h/v1/chat/completions");

        assert!(matches!(
            OpenAiCompatibleExplainer::new(&llm(Some("openai_compatible"), None)),
            Err(ExplainError::MissingBaseUrl)
        ));
        assert!(matches!(
            OpenAiCompatibleExplainer::new(&llm(Some("acme"), None)),
            Err(ExplainError::UnsupportedProvider(p)) if p == "acme"
        ));
    }

    #[tokio::test]
    async fn disabled_explainer_always_errors() {
        let explainer = explainer_from_config(&LlmConfig::default());
        let err = explainer.explain("anything").await.unwrap_err();
        assert_eq!(err.to_string(), "explanation provider not configured");
    }

    #[test]
    fn parses_assistant_content() {
        let body = r#"{"choices":[{"message":{"content":"  It sums a list.\n"}}]}"#;
        assert_eq!(parse_content(body).unwrap(), "It sums a list.");
        assert!(matches!(
            parse_content(r#"{"choices":[{"message":{"content":"   "}}]}"#),
            Err(ExplainError::EmptyContent)
        ));
        assert!(matches!(parse_content("nope"), Err(ExplainError::Parse(_))));
    }

    #[test]
    fn prompts_carry_source_and_findings() {
        let prompt = explain_prompt("print(1)", &json!({"topic": "array"}), true);
        assert!(prompt.contains("print(1)"));
        assert!(prompt.contains("\"topic\":\"array\""));
        assert!(prompt.contains("five short sentences"));

        let issues = vec![Issue {
            kind: "infinite_loop".into(),
            detail: "Possible infinite loop: while loop without break.".into(),
            severity: Severity::High,
        }];
        let prompt = fix_prompt("while True:\n    pass", &issues);
        assert!(prompt.contains("[High] infinite_loop"));
    }

    #[test]
    fn long_summaries_are_clipped() {
        let clipped = clip(&"é".repeat(20), 5);
        assert_eq!(clipped, "ééééé...");
        assert_eq!(clip("short", 10), "short");
    }

    #[test]
    fn code_block_extraction() {
        let reply = "Here you go:\n```python\ndef f(n):\n    return n\n```\nRenamed nothing.";
        assert_eq!(
            extract_code_block(reply).as_deref(),
            Some("def f(n):\n    return n")
        );
        assert_eq!(extract_code_block("no code"), None);
    }
}
