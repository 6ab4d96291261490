//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the invex pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvexConfig {
    /// Batch orchestration and gate settings.
    pub pipeline: PipelineConfig,

    /// Text language-model providers, in priority order.
    pub providers: ProvidersConfig,

    /// Vision OCR chain.
    pub vision: VisionConfig,

    /// Retry policy for file-source calls.
    pub retry: RetryConfig,

    /// Record store.
    pub storage: StorageConfig,
}

impl InvexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

/// Which signals make a record worth persisting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptancePolicy {
    /// Amount, vendor or date: any one suffices.
    #[default]
    AnySignal,
    /// Only a positive amount counts.
    AmountRequired,
}

/// Pipeline orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tenant that owns stored records.
    pub tenant_id: String,

    /// Documents per batch.
    pub batch_size: usize,

    /// Run documents of a batch concurrently.
    pub concurrent: bool,

    /// Upper bound on characters of text sent to a model.
    pub max_prompt_chars: usize,

    /// Skip documents whose text has no plausible total line.
    pub skip_without_total_hint: bool,

    /// Acceptance rule of the validation gate.
    pub acceptance: AcceptancePolicy,

    /// Destination folder for accepted files.
    pub valid_destination: String,

    /// Destination folder for rejected or failed files.
    pub invalid_destination: String,

    /// Where inputs of a failed batch are dumped.
    pub failed_batch_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tenant_id: "default".to_string(),
            batch_size: 20,
            concurrent: false,
            max_prompt_chars: 12_000,
            skip_without_total_hint: false,
            acceptance: AcceptancePolicy::AnySignal,
            valid_destination: "scanned_docs".to_string(),
            invalid_destination: "invalid_docs".to_string(),
            failed_batch_path: PathBuf::from("failed_batch.json"),
        }
    }
}

/// Wire protocol of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `/chat/completions` compatible endpoint.
    OpenaiCompatible,
    /// Google Generative Language `generateContent`.
    Gemini,
}

/// One text provider in the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Identifier reported with every completion.
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl ProviderConfig {
    fn new(name: &str, kind: ProviderKind, base_url: &str, model: &str, api_key_env: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
        }
    }
}

/// Text provider chain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Fixed delay before every model call, in milliseconds.
    pub call_delay_ms: u64,

    /// Completion token cap.
    pub max_tokens: u32,

    pub temperature: f32,

    /// HTTP timeout in seconds.
    pub timeout_secs: u64,

    /// Providers in priority order.
    pub chain: Vec<ProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            call_delay_ms: 1_000,
            max_tokens: 500,
            temperature: 0.0,
            timeout_secs: 60,
            chain: vec![
                ProviderConfig::new(
                    "hf-router",
                    ProviderKind::OpenaiCompatible,
                    "https://router.huggingface.co/v1",
                    "meta-llama/Meta-Llama-3-8B-Instruct",
                    "HF_TOKEN",
                ),
                ProviderConfig::new(
                    "groq",
                    ProviderKind::OpenaiCompatible,
                    "https://api.groq.com/openai/v1",
                    "llama3-8b-8192",
                    "GROQ_API_KEY",
                ),
                ProviderConfig::new(
                    "gemini-flash",
                    ProviderKind::Gemini,
                    "https://generativelanguage.googleapis.com/v1beta",
                    "gemini-1.5-flash",
                    "GEMINI_API_KEY",
                ),
                ProviderConfig::new(
                    "gemini-pro",
                    ProviderKind::Gemini,
                    "https://generativelanguage.googleapis.com/v1beta",
                    "gemini-1.5-pro",
                    "GEMINI_API_KEY",
                ),
            ],
        }
    }
}

/// One remote vision tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionTierConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    /// Model variants, fastest first.
    pub variants: Vec<String>,
    pub api_key_env: String,
}

/// Local OCR floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalOcrConfig {
    pub enabled: bool,

    /// Directory holding det.onnx, latin_rec.onnx and latin_dict.txt.
    pub model_dir: PathBuf,

    /// Keep `[UNK]` tokens in recognized text.
    pub keep_unk: bool,
}

impl Default for LocalOcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: PathBuf::from("models"),
            keep_unk: false,
        }
    }
}

/// Vision chain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Remote tiers in escalation order.
    pub tiers: Vec<VisionTierConfig>,

    /// Wait after a rate-limit response, in milliseconds.
    pub rate_limit_backoff_ms: u64,

    /// Retries of the same variant after rate limiting.
    pub max_rate_limit_retries: u32,

    /// Minimum gap between consecutive images, in milliseconds.
    pub image_cooldown_ms: u64,

    /// Instruction sent with every image.
    pub instruction: String,

    pub local: LocalOcrConfig,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                VisionTierConfig {
                    name: "gemini".to_string(),
                    kind: ProviderKind::Gemini,
                    base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                    variants: vec!["gemini-1.5-flash".to_string(), "gemini-1.5-pro".to_string()],
                    api_key_env: "GEMINI_API_KEY".to_string(),
                },
                VisionTierConfig {
                    name: "openai".to_string(),
                    kind: ProviderKind::OpenaiCompatible,
                    base_url: "https://api.openai.com/v1".to_string(),
                    variants: vec!["gpt-4o-mini".to_string()],
                    api_key_env: "OPENAI_API_KEY".to_string(),
                },
            ],
            rate_limit_backoff_ms: 10_000,
            max_rate_limit_retries: 1,
            image_cooldown_ms: 2_000,
            instruction: "Extract all text from this invoice or receipt image. \
                          Preserve labels and values. Return the complete text content."
                .to_string(),
            local: LocalOcrConfig::default(),
        }
    }
}

/// Backoff policy for file-source calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Delay before every attempt, in milliseconds.
    pub pre_delay_ms: u64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            pre_delay_ms: 400,
            retryable_statuses: vec![403, 429, 500, 503],
        }
    }
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("invoices.db"),
        }
    }
}
