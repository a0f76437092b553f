//! Vision recognition: page image → raw pattern records.
//!
//! The driver only sees the [`PatternRecognizer`] trait. [`VisionRecognizer`]
//! sends the page to a vision LLM with the extraction prompt from
//! [`crate::prompts`] and decodes the answer with
//! [`crate::pipeline::response`].
//!
//! ## Retry strategy
//!
//! Failed API calls (429, 5xx, timeouts) are retried with exponential
//! backoff: `retry_backoff_ms * 2^(retry - 1)`, saturating at `u64::MAX`.
//! An answer that arrives but does not decode is not retried; it becomes the
//! page's error marker.

use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::error::{ExtractError, PageError};
use crate::model::RawRecord;
use crate::pipeline::{encode, response};
use crate::prompts::{DEFAULT_SYSTEM_PROMPT, PAGE_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Turns a page image into the records printed on it.
#[async_trait]
pub trait PatternRecognizer: Send + Sync {
    /// Recognise every pattern grid in `png`, the rendered image of `page`.
    async fn recognize(&self, page: usize, png: &[u8]) -> Result<Vec<RawRecord>, PageError>;
}

/// Recognizer backed by a vision LLM provider.
pub struct VisionRecognizer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl VisionRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Build a recognizer from the provider the config (or environment) selects.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

#[async_trait]
impl PatternRecognizer for VisionRecognizer {
    async fn recognize(&self, page: usize, png: &[u8]) -> Result<Vec<RawRecord>, PageError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user_with_images(PAGE_INSTRUCTION, vec![encode::to_image_data(png)]),
        ];

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    page, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&self.options)).await {
                Ok(resp) => {
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {:?}",
                        page,
                        resp.prompt_tokens,
                        resp.completion_tokens,
                        start.elapsed()
                    );
                    return response::decode_response(&resp.content).map_err(|e| {
                        PageError::InvalidResponse {
                            page,
                            detail: e.to_string(),
                        }
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    warn!("Page {}: attempt {} failed: {}", page, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(PageError::RecognitionFailed {
            page,
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. a pre-built provider in `config.provider`
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`])
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set
/// 4. Gemini when `GEMINI_API_KEY` is set
/// 5. whatever [`ProviderFactory::from_env`] detects
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be detected from the environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or ANTHROPIC_API_KEY.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`,
/// saturating at `u64::MAX`.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[test]
    fn backoff_doubles_per_retry() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 4), 4000);
    }

    #[test]
    fn backoff_saturates_for_large_retry_counts() {
        assert_eq!(backoff_ms(500, 64), u64::MAX);
        assert_eq!(backoff_ms(500, 100), u64::MAX);
        assert_eq!(backoff_ms(0, 100), 0);
    }
}
