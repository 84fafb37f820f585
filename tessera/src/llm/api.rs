use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};

use crate::{
    config::{parse_llm_provider_model, LlmConfig},
    error::{Result, TesseraError},
    llm::provider::CompletionOptions,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";

#[derive(Debug, Clone)]
struct ApiConfig {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

/// OpenAI-compatible chat client returning parsed JSON.
#[derive(Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    config: ApiConfig,
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_config = ApiConfig::from_llm_config(config);

        let (provider, _) = parse_llm_provider_model(&config.model);
        let needs_api_key = !matches!(
            provider.to_lowercase().as_str(),
            "ollama" | "local" | "lmstudio"
        );

        if needs_api_key && api_config.api_key.is_none() {
            return Err(TesseraError::Llm(
                "API key required for this provider".to_string(),
            ));
        }

        let openai_config = OpenAIConfig::new()
            .with_api_base(api_config.base_url.clone())
            .with_api_key(api_config.api_key.clone().unwrap_or_default());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_config.timeout_secs))
            .build()
            .map_err(|error| {
                TesseraError::Llm(format!("Failed to create LLM HTTP client: {error}"))
            })?;

        // async-openai retries 5xx internally; cap it at our own timeout so the
        // tagging retry budget stays the only long-running loop.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(api_config.timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            config: api_config,
        })
    }

    /// Run a completion and parse the reply as JSON.
    ///
    /// Transient failures are retried up to `max_retries` times. Throttling
    /// and rejected credentials are returned immediately.
    pub async fn complete_json(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<Value> {
        if prompt.trim().is_empty() {
            return Err(TesseraError::Validation("Prompt cannot be empty".to_string()));
        }

        let mut attempt = 0;
        loop {
            let request = self.build_request(prompt, system_prompt, options)?;

            let error = match self.client.chat().create(request).await {
                Ok(response) => {
                    let content = Self::first_message(response)?;
                    tracing::debug!(response_len = content.len(), "LLM JSON response received");
                    return parse_json_content(&content);
                }
                Err(error) => error,
            };

            let (error, retry) = classify(error);
            if !retry || attempt >= self.config.max_retries {
                return Err(error);
            }

            attempt += 1;
            tracing::debug!(attempt, error = %error, "Retrying LLM request");
            tokio::time::sleep(Duration::from_millis(100 * 2_u64.pow(attempt - 1))).await;
        }
    }

    fn build_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<CreateChatCompletionRequest> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();

        if let Some(system_prompt) = system_prompt.filter(|value| !value.trim().is_empty()) {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|error| {
                        TesseraError::Validation(format!("Invalid system prompt: {error}"))
                    })?
                    .into(),
            );
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|error| {
                    TesseraError::Validation(format!("Invalid user prompt: {error}"))
                })?
                .into(),
        );

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.config.model.clone()).messages(messages);

        if let Some(options) = options {
            if let Some(temperature) = options.temperature {
                request.temperature(temperature);
            }
            if let Some(max_tokens) = options.max_tokens {
                request.max_tokens(max_tokens);
            }
        }

        request.build().map_err(|error| {
            TesseraError::Validation(format!("Invalid LLM completion request: {error}"))
        })
    }

    fn first_message(response: CreateChatCompletionResponse) -> Result<String> {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| TesseraError::Llm("LLM reply had no message content".to_string()))
    }
}

/// Map a failed request to a crate error, and say whether another attempt
/// may succeed. Only connection failures, 5xx statuses and untyped API errors
/// are worth retrying.
fn classify(error: OpenAIError) -> (TesseraError, bool) {
    match error {
        OpenAIError::Reqwest(e) => match e.status() {
            Some(StatusCode::TOO_MANY_REQUESTS) => {
                (TesseraError::LlmRateLimit { retry_after: None }, false)
            }
            status => {
                let retry = status.map_or(true, |s| s.is_server_error());
                (TesseraError::Llm(format!("LLM request failed: {e}")), retry)
            }
        },
        OpenAIError::ApiError(api_error) if is_throttled(&api_error) => {
            (TesseraError::LlmRateLimit { retry_after: None }, false)
        }
        OpenAIError::ApiError(api_error) => {
            let retry = api_error.r#type.is_none() && api_error.code.is_none();
            (TesseraError::Llm(format!("LLM API error: {api_error}")), retry)
        }
        OpenAIError::InvalidArgument(message) => (TesseraError::Validation(message), false),
        other => (TesseraError::Llm(other.to_string()), false),
    }
}

fn is_throttled(api_error: &ApiError) -> bool {
    let code = api_error.code.as_deref().unwrap_or_default();
    code.contains("rate_limit")
        || code == "insufficient_quota"
        || api_error.message.to_lowercase().contains("rate limit")
}

/// Parse model output as JSON, tolerating a surrounding markdown code fence.
fn parse_json_content(content: &str) -> Result<Value> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            response_len = content.len(),
            response_preview = %content.chars().take(100).collect::<String>(),
            error = %e,
            "Failed to parse JSON response"
        );
        TesseraError::Llm(format!("Failed to parse JSON response: {e}"))
    })
}

impl ApiConfig {
    fn from_llm_config(config: &LlmConfig) -> Self {
        let (provider, model) = parse_llm_provider_model(&config.model);

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        let normalized_model = if provider.eq_ignore_ascii_case("local") {
            config.model.clone()
        } else {
            model.to_string()
        };

        Self {
            base_url,
            api_key: config.api_key.clone(),
            model: normalized_model,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openrouter" => OPENROUTER_BASE_URL,
        "ollama" => OLLAMA_BASE_URL,
        "lmstudio" => LMSTUDIO_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_llm_config() -> LlmConfig {
        LlmConfig {
            model: "ollama/llama3".to_string(),
            api_key: None,
            base_url: None,
            timeout_secs: 30,
            max_retries: 0,
        }
    }

    #[test]
    fn test_request_carries_system_prompt_first() {
        let client = LlmApiClient::new(&test_llm_config()).expect("client should be created");

        let request = client
            .build_request("note text", Some("You are a clinical annotator"), None)
            .expect("request should build");

        assert_eq!(request.model, "llama3");
        assert_eq!(request.messages.len(), 2);
        assert!(matches!(
            request.messages[0],
            ChatCompletionRequestMessage::System(_)
        ));
        assert!(request.response_format.is_none());
    }

    #[test]
    fn test_hosted_provider_requires_api_key() {
        let mut config = test_llm_config();
        config.model = "openai/gpt-4o-mini".to_string();
        assert!(LlmApiClient::new(&config).is_err());

        config.api_key = Some("sk-test".to_string());
        assert!(LlmApiClient::new(&config).is_ok());
    }

    #[test]
    fn test_parse_json_content_strips_code_fence() {
        let fenced = "```json\n{\"emotions\": [\"calm\"]}\n```";
        let value = parse_json_content(fenced).unwrap();
        assert_eq!(value["emotions"][0], "calm");

        let plain = "[{\"type\": \"milestone\"}]";
        assert!(parse_json_content(plain).unwrap().is_array());

        assert!(parse_json_content("not json").is_err());
    }

    fn api_error(message: &str, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: code.map(|_| "invalid_request_error".to_string()),
            param: None,
            code: code.map(str::to_string),
        })
    }

    #[test]
    fn test_classify_retries_only_transient_failures() {
        let (error, retry) = classify(api_error("Rate limit reached", Some("rate_limit_exceeded")));
        assert!(matches!(error, TesseraError::LlmRateLimit { .. }));
        assert!(!retry);

        let (error, retry) = classify(api_error("Incorrect API key", Some("invalid_api_key")));
        assert!(matches!(error, TesseraError::Llm(_)));
        assert!(!retry);

        let (_, retry) = classify(api_error("upstream hiccup", None));
        assert!(retry);

        let (error, retry) = classify(OpenAIError::InvalidArgument("bad".to_string()));
        assert!(matches!(error, TesseraError::Validation(_)));
        assert!(!retry);
    }

    #[test]
    fn test_default_base_urls() {
        assert_eq!(default_base_url("ollama"), OLLAMA_BASE_URL);
        assert_eq!(default_base_url("OpenRouter"), OPENROUTER_BASE_URL);
        assert_eq!(default_base_url("local"), OPENAI_BASE_URL);
    }
}
