//! Oracle backed by an edgequake-llm provider.
//!
//! Useful when the caller already runs OpenAI, Anthropic, Gemini or a local
//! Ollama model through edgequake-llm. A pre-built provider can be wrapped
//! with [`LlmOracle::new`]; [`LlmOracle::from_provider_name`] builds one via
//! `ProviderFactory` at construction time.

use super::{
    DocumentUnderstander, FieldReconciler, ImageSource, OracleReply, ReasoningRequest,
    VisionRequest,
};
use crate::error::{FormFillError, OracleError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// One edgequake-llm provider/model pair.
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl LlmOracle {
    /// Wrap an already configured provider. `label` names it in logs.
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Instantiate a named provider ("openai", "anthropic", …) with `model`.
    pub fn from_provider_name(provider_name: &str, model: &str) -> Result<Self, FormFillError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            FormFillError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, model))
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: usize,
    ) -> Result<OracleReply, OracleError> {
        let options = build_options(temperature, max_tokens);
        let response = self
            .provider
            .chat(messages, Some(&options))
            .await
            .map_err(|e| OracleError::Transport {
                oracle: self.label.clone(),
                message: format!("{e}"),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(OracleError::EmptyReply {
                oracle: self.label.clone(),
            });
        }

        Ok(OracleReply {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

#[async_trait]
impl DocumentUnderstander for LlmOracle {
    fn name(&self) -> &str {
        &self.label
    }

    async fn understand(&self, request: &VisionRequest) -> Result<OracleReply, OracleError> {
        let messages = vec![ChatMessage::user_with_images(
            &request.prompt,
            vec![image_data(&request.image)],
        )];
        self.chat(&messages, request.temperature, request.max_tokens)
            .await
    }
}

#[async_trait]
impl FieldReconciler for LlmOracle {
    fn name(&self) -> &str {
        &self.label
    }

    async fn reconcile(&self, request: &ReasoningRequest) -> Result<OracleReply, OracleError> {
        let messages = vec![
            ChatMessage::system(&request.system),
            ChatMessage::user(&request.user),
        ];
        self.chat(&messages, request.temperature, request.max_tokens)
            .await
    }
}

/// Map our image part onto the provider's attachment type.
fn image_data(source: &ImageSource) -> ImageData {
    match source {
        ImageSource::Url(url) => ImageData::from_url(url.as_str()),
        ImageSource::Inline { mime_type, base64 } => {
            ImageData::new(base64.clone(), mime_type.as_str()).with_detail("high")
        }
    }
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}
