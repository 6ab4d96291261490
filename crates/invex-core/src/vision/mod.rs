//! Vision OCR chain for image documents.
//!
//! Tiers are tried in order and each tier tries its model variants in order.
//! A rate-limited variant gets a bounded number of retries with a linearly
//! growing wait; a variant the provider does not serve is skipped at once.
//! The last tier is normally the local OCR engine, which needs no network.

#[cfg(feature = "native")]
mod local;

#[cfg(feature = "native")]
pub use local::LocalOcrBackend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::models::config::{ProviderKind, VisionConfig};
use crate::models::document::ImageFormat;
use crate::providers::{GeminiClient, OpenAiClient};

/// Image bytes handed to a vision backend.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub name: String,
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

impl ImageInput {
    pub fn new(name: impl Into<String>, data: Vec<u8>, format: ImageFormat) -> Self {
        Self {
            name: name.into(),
            data,
            format,
        }
    }

    pub fn base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    /// `data:` URI for OpenAI-style image parts.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.base64())
    }
}

/// A backend able to read text out of an image.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Model variants to try, in order.
    fn variants(&self) -> Vec<String>;

    async fn read_image(&self, variant: &str, image: &ImageInput, instruction: &str) -> Result<String, ProviderError>;
}

/// Text read from an image and who read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionText {
    pub text: String,
    pub backend: String,
    pub variant: String,
}

/// Ordered vision tiers with rate-limit and cooldown policy.
pub struct VisionChain {
    tiers: Vec<Arc<dyn VisionBackend>>,
    instruction: String,
    rate_limit_backoff: Duration,
    max_rate_limit_retries: u32,
    cooldown: Duration,
    last_image: Mutex<Option<Instant>>,
}

impl VisionChain {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            tiers: Vec::new(),
            instruction: instruction.into(),
            rate_limit_backoff: Duration::from_secs(10),
            max_rate_limit_retries: 1,
            cooldown: Duration::ZERO,
            last_image: Mutex::new(None),
        }
    }

    /// Build remote tiers from configuration, then the local floor.
    ///
    /// Remote tiers whose API key is missing are left out.
    pub fn from_config(config: &VisionConfig, timeout: Duration) -> Self {
        let mut chain = Self::new(config.instruction.clone())
            .with_rate_limit_backoff(Duration::from_millis(config.rate_limit_backoff_ms))
            .with_max_rate_limit_retries(config.max_rate_limit_retries)
            .with_cooldown(Duration::from_millis(config.image_cooldown_ms));

        for tier in &config.tiers {
            let Ok(api_key) = std::env::var(&tier.api_key_env) else {
                warn!(tier = %tier.name, env = %tier.api_key_env, "vision tier disabled, API key not set");
                continue;
            };
            let backend: Result<Arc<dyn VisionBackend>, ProviderError> = match tier.kind {
                ProviderKind::Gemini => GeminiClient::new(&tier.name, api_key, timeout).map(|c| {
                    Arc::new(c.with_base_url(&tier.base_url).with_variants(tier.variants.clone()))
                        as Arc<dyn VisionBackend>
                }),
                ProviderKind::OpenaiCompatible => OpenAiClient::new(&tier.name, api_key, timeout).map(|c| {
                    Arc::new(c.with_base_url(&tier.base_url).with_variants(tier.variants.clone()))
                        as Arc<dyn VisionBackend>
                }),
            };
            match backend {
                Ok(backend) => chain = chain.with_tier(backend),
                Err(e) => warn!(tier = %tier.name, error = %e, "vision tier disabled"),
            }
        }

        #[cfg(feature = "native")]
        if config.local.enabled {
            chain = chain.with_tier(Arc::new(LocalOcrBackend::new(
                config.local.model_dir.clone(),
                config.local.keep_unk,
            )));
        }

        chain
    }

    pub fn with_tier(mut self, backend: Arc<dyn VisionBackend>) -> Self {
        self.tiers.push(backend);
        self
    }

    /// Base wait after a rate-limit response; multiplied by the retry number.
    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn with_max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    /// Minimum gap between two images read through this chain.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.iter().map(|t| t.name().to_string()).collect()
    }

    async fn wait_for_cooldown(&self) {
        let mut last = self.last_image.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.cooldown {
                let wait = self.cooldown - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "image cooldown");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Read text from an image, escalating through every tier.
    pub async fn read(&self, image: &ImageInput) -> Result<VisionText, ProviderError> {
        self.wait_for_cooldown().await;

        let mut failures = Vec::new();
        for tier in &self.tiers {
            for variant in tier.variants() {
                let mut retries = 0;
                loop {
                    match tier.read_image(&variant, image, &self.instruction).await {
                        Ok(text) if !text.trim().is_empty() => {
                            info!(
                                image = %image.name,
                                backend = %tier.name(),
                                variant = %variant,
                                chars = text.len(),
                                "vision text extracted"
                            );
                            return Ok(VisionText {
                                text,
                                backend: tier.name().to_string(),
                                variant,
                            });
                        }
                        Ok(_) => {
                            debug!(backend = %tier.name(), variant = %variant, "vision returned no text");
                            failures.push(format!("{}/{}: empty", tier.name(), variant));
                            break;
                        }
                        Err(ProviderError::RateLimited { .. }) if retries < self.max_rate_limit_retries => {
                            retries += 1;
                            let wait = self.rate_limit_backoff * retries;
                            warn!(
                                backend = %tier.name(),
                                variant = %variant,
                                wait_ms = wait.as_millis() as u64,
                                "vision rate limited, backing off"
                            );
                            tokio::time::sleep(wait).await;
                        }
                        Err(e @ ProviderError::UnsupportedModel { .. }) => {
                            debug!(backend = %tier.name(), variant = %variant, "model unsupported, skipping");
                            failures.push(format!("{}/{}: {}", tier.name(), variant, e));
                            break;
                        }
                        Err(e) => {
                            warn!(backend = %tier.name(), variant = %variant, error = %e, "vision variant failed");
                            failures.push(format!("{}/{}: {}", tier.name(), variant, e));
                            break;
                        }
                    }
                }
            }
        }

        Err(ProviderError::Exhausted(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockVision, VisionReply};
    use pretty_assertions::assert_eq;

    fn image() -> ImageInput {
        ImageInput::new("receipt.jpg", vec![0xff, 0xd8], ImageFormat::Jpeg)
    }

    #[test]
    fn test_data_uri() {
        assert_eq!(image().data_uri(), "data:image/jpeg;base64,/9g=");
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalates_through_variants_and_tiers() {
        let primary = Arc::new(
            MockVision::new("gemini", &["flash", "pro"])
                .on("flash", VisionReply::Unsupported)
                .on("pro", VisionReply::Fail),
        );
        let secondary = Arc::new(MockVision::new("openai", &["gpt-4o-mini"]).on("gpt-4o-mini", VisionReply::Empty));
        let local = Arc::new(MockVision::new("local", &["local"]).on("local", VisionReply::Text("TOTAL 12.00".into())));

        let chain = VisionChain::new("read")
            .with_tier(primary.clone())
            .with_tier(secondary.clone())
            .with_tier(local.clone());

        let read = chain.read(&image()).await.unwrap();

        assert_eq!(read.backend, "local");
        assert_eq!(read.text, "TOTAL 12.00");
        assert_eq!(primary.calls(), vec!["flash", "pro"]);
        assert_eq!(secondary.calls(), vec!["gpt-4o-mini"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_same_variant_once() {
        let primary = Arc::new(
            MockVision::new("gemini", &["flash", "pro"])
                .on("flash", VisionReply::RateLimited)
                .on("pro", VisionReply::Text("ok".into())),
        );
        let chain = VisionChain::new("read")
            .with_rate_limit_backoff(Duration::from_secs(10))
            .with_max_rate_limit_retries(1)
            .with_tier(primary.clone());

        let started = Instant::now();
        let read = chain.read(&image()).await.unwrap();

        assert_eq!(read.variant, "pro");
        assert_eq!(primary.calls(), vec!["flash", "flash", "pro"]);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_model_skips_without_backoff() {
        let primary = Arc::new(
            MockVision::new("gemini", &["flash", "pro"])
                .on("flash", VisionReply::Unsupported)
                .on("pro", VisionReply::Text("ok".into())),
        );
        let chain = VisionChain::new("read")
            .with_rate_limit_backoff(Duration::from_secs(10))
            .with_tier(primary.clone());

        let started = Instant::now();
        chain.read(&image()).await.unwrap();

        assert_eq!(primary.calls(), vec!["flash", "pro"]);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_between_images() {
        let tier = Arc::new(MockVision::new("local", &["local"]).on("local", VisionReply::Text("x".into())));
        let chain = VisionChain::new("read")
            .with_cooldown(Duration::from_secs(2))
            .with_tier(tier);

        let started = Instant::now();
        chain.read(&image()).await.unwrap();
        chain.read(&image()).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_all_tiers_failing_is_exhaustion() {
        let chain = VisionChain::new("read")
            .with_tier(Arc::new(MockVision::new("gemini", &["flash"]).on("flash", VisionReply::Fail)));

        let err = chain.read(&image()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted(ref f) if f.len() == 1));
    }
}
