//! Google Generative Language `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{classify_failure, http_client, transport};
use crate::error::ProviderError;
use crate::llm::LanguageModel;
use crate::vision::{ImageInput, VisionBackend};

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    variants: Vec<String>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(name: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(name, timeout)?,
            name: name.to_string(),
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            variants: Vec::new(),
            max_tokens: 500,
            temperature: 0.0,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_variants(mut self, variants: Vec<String>) -> Self {
        self.variants = variants;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn generate(&self, model: &str, body: Value) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(&self.name, model, status.as_u16(), &body));
        }

        let generated: GenerateResponse = response.json().await.map_err(|e| transport(&self.name, e))?;
        candidate_text(generated).ok_or_else(|| ProviderError::EmptyResponse(self.name.clone()))
    }
}

/// Text parts of the first candidate, concatenated.
fn candidate_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn text_request(system: &str, prompt: &str, max_tokens: u32, temperature: f32) -> Value {
    json!({
        "systemInstruction": {"parts": [{"text": system}]},
        "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        "generationConfig": {"temperature": temperature, "maxOutputTokens": max_tokens},
    })
}

fn image_request(image: &ImageInput, instruction: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {"text": instruction},
                {"inline_data": {"mime_type": image.format.mime_type(), "data": image.base64()}},
            ],
        }],
        "generationConfig": {"temperature": 0.0},
    })
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn id(&self) -> &str {
        &self.name
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let body = text_request(system, prompt, self.max_tokens, self.temperature);
        self.generate(&self.model, body).await
    }
}

#[async_trait]
impl VisionBackend for GeminiClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn variants(&self) -> Vec<String> {
        if self.variants.is_empty() {
            vec![self.model.clone()]
        } else {
            self.variants.clone()
        }
    }

    async fn read_image(&self, variant: &str, image: &ImageInput, instruction: &str) -> Result<String, ProviderError> {
        self.generate(variant, image_request(image, instruction)).await
    }
}
