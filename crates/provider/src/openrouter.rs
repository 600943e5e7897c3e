//! OpenRouter-compatible chat-completions engine
//!
//! Sends the prompt as a single user message to `{base_url}/chat/completions`
//! with the pooled API key as a Bearer token. Any OpenAI-compatible endpoint
//! works.

use crate::{EngineError, Result, TextEngine, TextRequest, classify_status};
use key_pool::Credential;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Public OpenRouter API base.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

pub struct OpenRouterEngine {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenRouterEngine {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    async fn complete(&self, request: &TextRequest, credential: &Credential) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
        });

        debug!(credential = credential.name(), model = %request.model, "sending chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.secret())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("request to {url} failed: {e}")))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| EngineError::Unavailable(format!("reading response body: {e}")))?;

        if !(200..300).contains(&status) {
            let err = classify_status(status, &text);
            warn!(
                credential = credential.name(),
                status,
                error_type = err.label(),
                "chat completion failed"
            );
            return Err(err);
        }

        let completion: ChatCompletion = serde_json::from_str(&text)
            .map_err(|e| EngineError::Internal(format!("unexpected response body: {e}")))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EngineError::Internal("response contained no message content".into()))
    }
}

impl TextEngine for OpenRouterEngine {
    fn id(&self) -> &str {
        "openrouter"
    }

    fn generate<'a>(
        &'a self,
        request: &'a TextRequest,
        credential: &'a Credential,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.complete(request, credential))
    }
}
