//! HTTP clients for hosted model providers.
//!
//! Each client implements both [`crate::llm::LanguageModel`] and
//! [`crate::vision::VisionBackend`].

mod gemini;
mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use std::time::Duration;

use crate::error::ProviderError;

pub(crate) fn http_client(provider: &str, timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Transport {
            provider: provider.to_string(),
            message: e.to_string(),
        })
}

/// Map a non-success response onto the provider error taxonomy.
pub(crate) fn classify_failure(provider: &str, model: &str, status: u16, body: &str) -> ProviderError {
    let lower = body.to_ascii_lowercase();

    if status == 429 || lower.contains("resource_exhausted") || lower.contains("rate limit") {
        return ProviderError::RateLimited {
            provider: provider.to_string(),
        };
    }

    let unsupported = status == 404
        || ((status == 400 || status == 422)
            && ["not found", "not supported", "does not exist", "model_not_found", "decommissioned"]
                .iter()
                .any(|needle| lower.contains(needle)));
    if unsupported {
        return ProviderError::UnsupportedModel {
            provider: provider.to_string(),
            model: model.to_string(),
        };
    }

    ProviderError::Http {
        provider: provider.to_string(),
        status,
        body: body.chars().take(300).collect(),
    }
}

pub(crate) fn transport(provider: &str, error: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        provider: provider.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("gemini", "m", 429, ""),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_failure("gemini", "m", 400, "{\"status\": \"RESOURCE_EXHAUSTED\"}"),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_failure("openai", "gpt-x", 404, "no such model"),
            ProviderError::UnsupportedModel { .. }
        ));
        assert!(matches!(
            classify_failure("groq", "llama", 400, "The model `llama` has been decommissioned"),
            ProviderError::UnsupportedModel { .. }
        ));
        assert!(matches!(
            classify_failure("groq", "llama", 500, "oops"),
            ProviderError::Http { status: 500, .. }
        ));
    }
}
