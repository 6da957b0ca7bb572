//! Capability interfaces for the two external oracles.
//!
//! The pipeline never talks to a concrete LLM client. It holds an
//! `Arc<dyn DocumentUnderstander>` for the vision call and an
//! `Arc<dyn FieldReconciler>` for the reasoning call, so tests (or an offline
//! rule-based implementation) can stand in for the real services without
//! touching prompt building, reply parsing or degradation.
//!
//! Two backends ship with the crate:
//!
//! * [`llm::LlmOracle`] — any edgequake-llm provider (OpenAI, Anthropic,
//!   Gemini, Ollama, …).
//! * [`http::HttpOracle`] — a plain OpenAI-compatible `chat/completions`
//!   endpoint (the Qwen / DashScope default) driven entirely by an explicit
//!   [`OracleConfig`].

pub mod http;
pub mod llm;

use crate::config::{OracleBackend, OracleConfig};
use crate::error::{FormFillError, OracleError};
use async_trait::async_trait;
use std::sync::Arc;

/// The image part of a vision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote document, passed through to the oracle unchanged.
    Url(String),
    /// Local document embedded as base64.
    Inline { mime_type: String, base64: String },
}

impl ImageSource {
    /// The URL form expected by chat APIs: the remote URL or a
    /// `data:<mime>;base64,<payload>` URI.
    pub fn to_api_url(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::Inline { mime_type, base64 } => format!("data:{mime_type};base64,{base64}"),
        }
    }
}

/// One vision round trip: instruction text plus one image.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    pub image: ImageSource,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// One reasoning round trip: system instruction plus user message.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Free-text reply of an oracle call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleReply {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl OracleReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Vision oracle: reads a document image and answers in free text.
#[async_trait]
pub trait DocumentUnderstander: Send + Sync {
    /// Label used in logs and error messages (usually the model id).
    fn name(&self) -> &str;

    async fn understand(&self, request: &VisionRequest) -> Result<OracleReply, OracleError>;
}

/// Reasoning oracle: proposes a field mapping in free text (JSON expected).
#[async_trait]
pub trait FieldReconciler: Send + Sync {
    fn name(&self) -> &str;

    async fn reconcile(&self, request: &ReasoningRequest) -> Result<OracleReply, OracleError>;
}

/// Both oracles, ready to hand to [`crate::autofill::AutoFiller`].
#[derive(Clone)]
pub struct Oracles {
    pub understander: Arc<dyn DocumentUnderstander>,
    pub reconciler: Arc<dyn FieldReconciler>,
}

impl Oracles {
    pub fn new(
        understander: Arc<dyn DocumentUnderstander>,
        reconciler: Arc<dyn FieldReconciler>,
    ) -> Self {
        Self {
            understander,
            reconciler,
        }
    }

    /// Construct the configured backend for both models.
    pub fn from_config(config: &OracleConfig) -> Result<Self, FormFillError> {
        match &config.backend {
            OracleBackend::OpenAiCompatible => {
                let vision = http::HttpOracle::new(config, &config.vision_model)?;
                let reasoning = http::HttpOracle::new(config, &config.reasoning_model)?;
                Ok(Self::new(Arc::new(vision), Arc::new(reasoning)))
            }
            OracleBackend::Provider(name) => {
                let vision = llm::LlmOracle::from_provider_name(name, &config.vision_model)?;
                let reasoning = llm::LlmOracle::from_provider_name(name, &config.reasoning_model)?;
                Ok(Self::new(Arc::new(vision), Arc::new(reasoning)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_image_becomes_data_uri() {
        let img = ImageSource::Inline {
            mime_type: "image/png".into(),
            base64: "AAAA".into(),
        };
        assert_eq!(img.to_api_url(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn url_image_passes_through() {
        let img = ImageSource::Url("https://example.test/id.jpg?x=1".into());
        assert_eq!(img.to_api_url(), "https://example.test/id.jpg?x=1");
    }

    #[test]
    fn openai_compatible_backend_requires_key() {
        let err = Oracles::from_config(&OracleConfig::default()).err().unwrap();
        assert!(matches!(err, FormFillError::ProviderNotConfigured { .. }));
    }

    #[test]
    fn openai_compatible_backend_builds_with_key() {
        let cfg = OracleConfig::openai_compatible("https://example.test/v1", "sk-test");
        let oracles = Oracles::from_config(&cfg).unwrap();
        assert_eq!(oracles.understander.name(), "qwen-vl-max");
        assert_eq!(oracles.reconciler.name(), "qwen-plus");
    }
}
