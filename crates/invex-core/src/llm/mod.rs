//! Text language-model access: provider trait, fallback registry and
//! response recovery.

pub mod json;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::models::config::{ProviderKind, ProvidersConfig};
use crate::providers::{GeminiClient, OpenAiClient};

pub use json::{coerce_object, unwrap_to_object};

/// A text completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier reported alongside completions.
    fn id(&self) -> &str;

    /// Complete `prompt` under the given system instruction.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError>;
}

/// Text returned by the first provider that answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub provider: String,
}

type ModelFactory = Box<dyn Fn() -> Result<Arc<dyn LanguageModel>, ProviderError> + Send + Sync>;

/// Lazily built provider handle. Initialization runs at most once; a failed
/// initialization is cached so the provider is skipped from then on.
struct ProviderSlot {
    name: String,
    factory: ModelFactory,
    handle: OnceLock<Option<Arc<dyn LanguageModel>>>,
}

impl ProviderSlot {
    fn get(&self) -> Option<Arc<dyn LanguageModel>> {
        self.handle
            .get_or_init(|| match (self.factory)() {
                Ok(model) => {
                    debug!(provider = %self.name, "initialized provider");
                    Some(model)
                }
                Err(e) => {
                    warn!(provider = %self.name, error = %e, "provider unavailable");
                    None
                }
            })
            .clone()
    }
}

/// Ordered provider chain used with fallback semantics: a failing provider
/// hands the call to the next one, it is never retried.
pub struct ProviderRegistry {
    slots: Vec<ProviderSlot>,
    call_delay: Duration,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            call_delay: Duration::ZERO,
        }
    }

    /// Build the chain described by configuration. Clients are created on
    /// first use, reading their API key from the environment.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut registry = Self::new().with_call_delay(Duration::from_millis(config.call_delay_ms));

        for provider in &config.chain {
            let provider = provider.clone();
            let timeout = Duration::from_secs(config.timeout_secs);
            let max_tokens = config.max_tokens;
            let temperature = config.temperature;
            let name = provider.name.clone();

            registry = registry.register(name, move || {
                let api_key = std::env::var(&provider.api_key_env).map_err(|_| {
                    ProviderError::NotConfigured(format!("{} ({} not set)", provider.name, provider.api_key_env))
                })?;
                let model: Arc<dyn LanguageModel> = match provider.kind {
                    ProviderKind::OpenaiCompatible => Arc::new(
                        OpenAiClient::new(&provider.name, api_key, timeout)?
                            .with_base_url(&provider.base_url)
                            .with_model(&provider.model)
                            .with_max_tokens(max_tokens)
                            .with_temperature(temperature),
                    ),
                    ProviderKind::Gemini => Arc::new(
                        GeminiClient::new(&provider.name, api_key, timeout)?
                            .with_base_url(&provider.base_url)
                            .with_model(&provider.model)
                            .with_max_tokens(max_tokens)
                            .with_temperature(temperature),
                    ),
                };
                Ok(model)
            });
        }

        registry
    }

    /// Fixed pause before every call.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Append a lazily initialized provider.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn LanguageModel>, ProviderError> + Send + Sync + 'static,
    {
        self.slots.push(ProviderSlot {
            name: name.into(),
            factory: Box::new(factory),
            handle: OnceLock::new(),
        });
        self
    }

    /// Append an already constructed provider.
    pub fn with_model(self, model: Arc<dyn LanguageModel>) -> Self {
        let name = model.id().to_string();
        self.register(name, move || Ok(Arc::clone(&model)))
    }

    /// Provider names in priority order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Call providers in priority order and return the first non-empty answer.
    pub async fn call(&self, system: &str, prompt: &str) -> Result<Completion, ProviderError> {
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }

        let mut failures = Vec::new();
        for slot in &self.slots {
            let Some(model) = slot.get() else {
                failures.push(format!("{}: not configured", slot.name));
                continue;
            };

            match model.complete(system, prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(provider = %model.id(), chars = text.len(), "completion received");
                    return Ok(Completion {
                        text,
                        provider: model.id().to_string(),
                    });
                }
                Ok(_) => {
                    warn!(provider = %model.id(), "empty completion, falling back");
                    failures.push(format!("{}: empty response", model.id()));
                }
                Err(e) => {
                    warn!(provider = %model.id(), error = %e, "provider failed, falling back");
                    failures.push(format!("{}: {}", model.id(), e));
                }
            }
        }

        Err(ProviderError::Exhausted(failures))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLanguageModel;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_falls_back_in_priority_order() {
        let first = Arc::new(MockLanguageModel::new("primary").fail_always());
        let second = Arc::new(MockLanguageModel::new("secondary").reply("{\"vendor_name\": \"Acme\"}"));
        let third = Arc::new(MockLanguageModel::new("tertiary").reply("unused"));

        let registry = ProviderRegistry::new()
            .with_model(first.clone())
            .with_model(second.clone())
            .with_model(third.clone());

        let completion = registry.call("system", "prompt").await.unwrap();

        assert_eq!(completion.provider, "secondary");
        assert_eq!(first.call_count(), 1);
        assert_eq!(second.call_count(), 1);
        assert_eq!(third.call_count(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_lists_every_provider() {
        let registry = ProviderRegistry::new()
            .with_model(Arc::new(MockLanguageModel::new("a").fail_always()))
            .register("b", || Err(ProviderError::NotConfigured("b".into())));

        let err = registry.call("system", "prompt").await.unwrap_err();
        match err {
            ProviderError::Exhausted(failures) => {
                assert_eq!(failures.len(), 2);
                assert!(failures[1].starts_with("b: not configured"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_factory_runs_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let registry = ProviderRegistry::new().register("lazy", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockLanguageModel::new("lazy").reply("{}")) as Arc<dyn LanguageModel>)
        });

        assert_eq!(builds.load(Ordering::SeqCst), 0);
        registry.call("s", "p").await.unwrap();
        registry.call("s", "p").await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_config_keeps_priority() {
        let registry = ProviderRegistry::from_config(&ProvidersConfig::default());
        assert_eq!(
            registry.provider_names(),
            vec!["hf-router", "groq", "gemini-flash", "gemini-pro"]
        );
    }
}
