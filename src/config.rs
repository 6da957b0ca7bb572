//! Configuration types for document-to-form auto-filling.
//!
//! Two structs split the knobs by who owns them:
//!
//! * [`FormFillConfig`] — pipeline behaviour (sampling, timeouts, variant
//!   replication, where named templates live). Built via
//!   [`FormFillConfigBuilder`].
//! * [`OracleConfig`] — how to reach the vision and reasoning oracles
//!   (endpoint, API key, model names). It is handed to an oracle backend at
//!   construction time; nothing inside the pipeline reads environment
//!   variables.

use crate::error::FormFillError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default OpenAI-compatible endpoint (Qwen / DashScope international).
pub const DEFAULT_ENDPOINT: &str = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1";

/// Default vision model used by the Field Extractor.
pub const DEFAULT_VISION_MODEL: &str = "qwen-vl-max";

/// Default reasoning model used by the Reconciliation Engine.
pub const DEFAULT_REASONING_MODEL: &str = "qwen-plus";

/// Configuration for an auto-fill run.
///
/// Built via [`FormFillConfig::builder()`] or using [`FormFillConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_formfill::FormFillConfig;
///
/// let config = FormFillConfig::builder()
///     .temperature(0.0)
///     .api_timeout_secs(30)
///     .forms_dir("./forms")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct FormFillConfig {
    /// Sampling temperature for both oracle calls. Default: 0.1.
    ///
    /// Extraction and reconciliation are transcription tasks; a low
    /// temperature keeps repeated runs on the same document reproducible.
    pub temperature: f32,

    /// Maximum tokens each oracle reply may contain. Default: 2048.
    pub max_tokens: usize,

    /// Per-oracle-call timeout in seconds. Default: 60.
    ///
    /// A timed-out extraction surfaces as an `ExtractionError`; a timed-out
    /// reconciliation degrades to "every field missing".
    pub api_timeout_secs: u64,

    /// Download timeout for URL templates in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Custom extraction prompt. If None, uses the built-in default.
    pub extraction_prompt: Option<String>,

    /// Copy a base field's value into its `_2`, `_3`, … variants after
    /// reconciliation when the oracle left them empty. Default: true.
    pub replicate_numbered_variants: bool,

    /// Directory that named form templates are resolved against.
    pub forms_dir: Option<PathBuf>,

    /// Optional stage-event callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FormFillConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2048,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            extraction_prompt: None,
            replicate_numbered_variants: true,
            forms_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FormFillConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormFillConfig")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("extraction_prompt", &self.extraction_prompt.as_ref().map(|p| p.len()))
            .field("replicate_numbered_variants", &self.replicate_numbered_variants)
            .field("forms_dir", &self.forms_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AutoFillProgressCallback>"),
            )
            .finish()
    }
}

impl FormFillConfig {
    /// Create a new builder for `FormFillConfig`.
    pub fn builder() -> FormFillConfigBuilder {
        FormFillConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`FormFillConfig`].
#[derive(Debug)]
pub struct FormFillConfigBuilder {
    config: FormFillConfig,
}

impl FormFillConfigBuilder {
    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn replicate_numbered_variants(mut self, v: bool) -> Self {
        self.config.replicate_numbered_variants = v;
        self
    }

    pub fn forms_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.forms_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FormFillConfig, FormFillError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(FormFillError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(FormFillError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(FormFillError::InvalidConfig(
                "download_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let Some(ref prompt) = c.extraction_prompt {
            if prompt.trim().is_empty() {
                return Err(FormFillError::InvalidConfig(
                    "extraction_prompt must not be blank".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Oracle configuration ─────────────────────────────────────────────────

/// Which client talks to the oracles.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OracleBackend {
    /// Direct `POST {endpoint}/chat/completions` with a bearer API key.
    #[default]
    OpenAiCompatible,
    /// A named edgequake-llm provider ("openai", "anthropic", "gemini", …).
    Provider(String),
}

/// Explicit oracle connection settings.
///
/// The API key is never printed by `Debug`.
#[derive(Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub backend: OracleBackend,
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub endpoint: String,
    pub api_key: Option<String>,
    pub vision_model: String,
    pub reasoning_model: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            reasoning_model: DEFAULT_REASONING_MODEL.to_string(),
        }
    }
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("backend", &self.backend)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("vision_model", &self.vision_model)
            .field("reasoning_model", &self.reasoning_model)
            .finish()
    }
}

impl OracleConfig {
    /// Settings for an OpenAI-compatible endpoint with the given key.
    pub fn openai_compatible(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }

    pub fn with_reasoning_model(mut self, model: impl Into<String>) -> Self {
        self.reasoning_model = model.into();
        self
    }

    /// `{endpoint}/chat/completions`, tolerating a trailing slash.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = FormFillConfig::default();
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.max_tokens, 2048);
        assert!(c.replicate_numbered_variants);
        assert!(c.forms_dir.is_none());
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = FormFillConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = FormFillConfig::builder().api_timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("api_timeout_secs"));
        let err = FormFillConfig::builder()
            .download_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("download_timeout_secs"));
    }

    #[test]
    fn builder_rejects_blank_prompt() {
        assert!(FormFillConfig::builder()
            .extraction_prompt("   ")
            .build()
            .is_err());
    }

    #[test]
    fn oracle_debug_redacts_key() {
        let c = OracleConfig::openai_compatible("https://example.test/v1", "sk-secret");
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn chat_completions_url_trims_slash() {
        let c = OracleConfig::openai_compatible("https://example.test/v1/", "k");
        assert_eq!(c.chat_completions_url(), "https://example.test/v1/chat/completions");
    }
}
