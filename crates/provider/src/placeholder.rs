//! Offline engines with deterministic output.
//!
//! Used for local development and tests: no network, but the same credential
//! contract as real providers.

use crate::{EngineError, ImageEngine, Result, TextEngine, TextRequest};
use key_pool::Credential;
use std::future::Future;
use std::pin::Pin;

/// Default base for placeholder image URLs.
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://fakeimg.pl/600x400/";

/// Echoes the model, prompt and temperature back as the "generated" text.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderTextEngine;

impl PlaceholderTextEngine {
    pub fn new() -> Self {
        Self
    }
}

impl TextEngine for PlaceholderTextEngine {
    fn id(&self) -> &str {
        "placeholder"
    }

    fn generate<'a>(
        &'a self,
        request: &'a TextRequest,
        _credential: &'a Credential,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        let text = format!(
            "[Text generated by model '{}']\nPrompt: {}\nTemperature: {}",
            request.model, request.prompt, request.temperature
        );
        Box::pin(async move { Ok(text) })
    }
}

/// Returns one placeholder image URL with the prompt as its caption.
///
/// Requires a paired credential, like the cookie-authenticated image provider
/// it stands in for.
#[derive(Debug, Clone)]
pub struct PlaceholderImageEngine {
    base_url: String,
}

impl PlaceholderImageEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for PlaceholderImageEngine {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_BASE_URL)
    }
}

impl ImageEngine for PlaceholderImageEngine {
    fn id(&self) -> &str {
        "placeholder"
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        credential: &'a Credential,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(async move {
            if credential.secondary_secret().is_none() {
                return Err(EngineError::Unauthorized(format!(
                    "{} is not a cookie pair",
                    credential.name()
                )));
            }
            if prompt.trim().is_empty() {
                return Ok(Vec::new());
            }
            let caption = prompt.replace(' ', "+");
            Ok(vec![format!("{}?text={caption}", self.base_url)])
        })
    }
}
