//! Text-generation providers and the ordered fallback chain

use super::{build_http_client, TextGenerator};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Returned by the chain when no provider produced text
pub const UNAVAILABLE_RESPONSE: &str = "Unable to process with LLM";

/// Ordered list of text generators; the first success wins
pub struct FallbackChain {
    providers: Vec<Arc<dyn TextGenerator>>,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn TextGenerator>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Try each provider in order. Never fails: exhausting the chain yields
    /// [`UNAVAILABLE_RESPONSE`].
    pub async fn generate(&self, prompt: &str, system: &str) -> String {
        for provider in &self.providers {
            let start = Instant::now();
            match provider.generate(prompt, system).await {
                Ok(text) => {
                    metrics::record_provider_call(provider.name(), start.elapsed().as_secs_f64(), true);
                    return text;
                }
                Err(e) => {
                    metrics::record_provider_call(provider.name(), start.elapsed().as_secs_f64(), false);
                    tracing::warn!(provider = provider.name(), error = %e, "Text generation failed, trying next provider");
                }
            }
        }
        UNAVAILABLE_RESPONSE.to_string()
    }
}

/// Chat-completions client for OpenAI-compatible APIs (Groq, OpenAI, vLLM)
pub struct OpenAiCompatibleClient {
    name: String,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        name: impl Into<String>,
        endpoint: String,
        api_key: String,
        model: String,
        temperature: f32,
        max_tokens: usize,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            endpoint,
            api_key,
            model,
            temperature,
            max_tokens,
            client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleClient {
    async fn generate(&self, prompt: &str, system: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage { role: "system", content: system });
        }
        messages.push(ChatMessage { role: "user", content: prompt });

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self.client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::provider(&self.name, format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::provider(&self.name, format!("API error {}: {}", status, body)));
        }

        let chat_response: ChatResponse = response.json().await
            .map_err(|e| AppError::provider(&self.name, format!("failed to parse response: {}", e)))?;

        chat_response.choices.into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::provider(&self.name, "empty response"))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
pub(crate) struct GeminiRequest<'a> {
    pub contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
pub(crate) struct GeminiContent<'a> {
    pub parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub(crate) enum GeminiPart<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize)]
pub(crate) struct GenerationConfig {
    pub temperature: f32,
}

#[derive(Deserialize)]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate
    pub(crate) fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

/// POST a generateContent request and return the candidate text
pub(crate) async fn call_gemini(
    client: &reqwest::Client,
    base_url: &str,
    model: &str,
    api_key: &str,
    request: &GeminiRequest<'_>,
) -> Result<String> {
    let url = format!("{}/{}:generateContent", base_url.trim_end_matches('/'), model);

    let response = client
        .post(&url)
        .header("x-goog-api-key", api_key)
        .json(request)
        .send()
        .await
        .map_err(|e| AppError::provider("gemini", format!("request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::provider("gemini", format!("API error {}: {}", status, body)));
    }

    let body: GeminiResponse = response.json().await
        .map_err(|e| AppError::provider("gemini", format!("failed to parse response: {}", e)))?;

    body.text().ok_or_else(|| AppError::provider("gemini", "empty response"))
}

impl GeminiClient {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            base_url,
            api_key,
            model,
            temperature,
            client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, system: &str) -> Result<String> {
        // Gemini takes the system text inline ahead of the prompt
        let full_prompt = if system.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{}", system, prompt)
        };

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart::Text { text: &full_prompt }],
            }],
            generation_config: Some(GenerationConfig { temperature: self.temperature }),
        };

        call_gemini(&self.client, &self.base_url, &self.model, &self.api_key, &request).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
