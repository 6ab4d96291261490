//! OpenAI-compatible `/chat/completions` client.
//!
//! Works with any server speaking the OpenAI chat protocol (Hugging Face
//! router, Groq, OpenAI itself).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{classify_failure, http_client, transport};
use crate::error::ProviderError;
use crate::llm::LanguageModel;
use crate::vision::{ImageInput, VisionBackend};

/// Chat completion client.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    variants: Vec<String>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(name: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(name, timeout)?,
            name: name.to_string(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            variants: Vec::new(),
            max_tokens: 500,
            temperature: 0.0,
        })
    }

    /// Set a custom base URL (router, proxy, self-hosted server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Model variants tried when reading images, fastest first.
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

    async fn chat(&self, model: &str, messages: Vec<ChatMessage>, max_tokens: u32) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model,
            messages,
            temperature: self.temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(&self.name, model, status.as_u16(), &body));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| transport(&self.name, e))?;
        first_choice_text(chat).ok_or_else(|| ProviderError::EmptyResponse(self.name.clone()))
    }
}

fn first_choice_text(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn id(&self) -> &str {
        &self.name
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let messages = vec![
            ChatMessage {
                role: "system",
                content: Value::String(system.to_string()),
            },
            ChatMessage {
                role: "user",
                content: Value::String(prompt.to_string()),
            },
        ];
        self.chat(&self.model, messages, self.max_tokens).await
    }
}

#[async_trait]
impl VisionBackend for OpenAiClient {
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
        let messages = vec![ChatMessage {
            role: "user",
            content: json!([
                {"type": "text", "text": instruction},
                {"type": "image_url", "image_url": {"url": image.data_uri()}},
            ]),
        }];
        self.chat(variant, messages, self.max_tokens.max(2_000)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "  {\"a\": 1}  "}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(response), Some("{\"a\": 1}".to_string()));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(first_choice_text(empty), None);
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "llama3-8b-8192",
            messages: vec![ChatMessage {
                role: "user",
                content: Value::String("hi".into()),
            }],
            temperature: 0.0,
            max_tokens: 500,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "llama3-8b-8192");
        assert_eq!(value["messages"][0]["content"], "hi");
        assert_eq!(value["max_tokens"], 500);
    }

    #[test]
    fn test_vision_variants_default_to_model() {
        let client = OpenAiClient::new("openai", "key", Duration::from_secs(5))
            .unwrap()
            .with_model("gpt-4o-mini");
        assert_eq!(client.variants(), vec!["gpt-4o-mini".to_string()]);
    }
}
