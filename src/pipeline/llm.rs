//! VLM interaction: send one page image plus the prompt, get text back.
//!
//! [`Analyzer`] is the seam to the inference service; the dispatcher only
//! ever talks to this trait. [`LlmAnalyzer`] is the production
//! implementation over any `edgequake_llm` provider.
//!
//! There is no retry loop here: a failed call surfaces once as a
//! [`UnitError`] and the dispatcher records it as a failed unit.

use crate::config::ReportConfig;
use crate::error::UnitError;
use crate::pipeline::encode::encode_image;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use tracing::debug;

/// Text returned for one page image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl AnalysisReply {
    /// A reply without token accounting.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Inference service: extract text from one image given a prompt.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, image: &[u8], prompt: &str) -> Result<AnalysisReply, UnitError>;
}

/// [`Analyzer`] backed by an `edgequake_llm` vision provider.
pub struct LlmAnalyzer {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmAnalyzer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ReportConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    /// The prompt and the image travel in a single user turn, which is what
    /// small local vision models handle best.
    async fn analyze(&self, image: &[u8], prompt: &str) -> Result<AnalysisReply, UnitError> {
        let image_data = encode_image(image)?;
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image_data])];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| UnitError::Call(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        Ok(AnalysisReply {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the report config.
fn build_options(config: &ReportConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
