//! OpenAI-compatible `chat/completions` oracle over reqwest.
//!
//! Everything the client needs (endpoint, key, model) comes from the
//! [`OracleConfig`] it is built with.

use super::{
    DocumentUnderstander, FieldReconciler, ImageSource, OracleReply, ReasoningRequest,
    VisionRequest,
};
use crate::config::OracleConfig;
use crate::error::{FormFillError, OracleError};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// TCP connection timeout. The total call budget is enforced by the pipeline.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body kept in an [`OracleError::Api`].
const MAX_ERROR_BODY: usize = 500;

/// One model behind an OpenAI-compatible endpoint.
pub struct HttpOracle {
    http: HttpClient,
    url: String,
    api_key: String,
    model: String,
}

impl HttpOracle {
    pub fn new(config: &OracleConfig, model: &str) -> Result<Self, FormFillError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| FormFillError::ProviderNotConfigured {
                provider: config.endpoint.clone(),
                hint: "No API key configured for the OpenAI-compatible endpoint.\n\
                       Pass --api-key or set FORMFILL_API_KEY."
                    .to_string(),
            })?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FormFillError::ProviderNotConfigured {
                provider: config.endpoint.clone(),
                hint: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            url: config.chat_completions_url(),
            api_key,
            model: model.to_string(),
        })
    }

    async fn complete(&self, body: &ChatCompletionRequest<'_>) -> Result<OracleReply, OracleError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| OracleError::Transport {
                oracle: self.model.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| text.is_char_boundary(i))
                    .unwrap_or(0);
                text.truncate(cut);
            }
            return Err(OracleError::Api {
                oracle: self.model.clone(),
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| OracleError::Transport {
                oracle: self.model.clone(),
                message: format!("malformed completion body: {e}"),
            })?;

        reply_from_response(&self.model, parsed)
    }
}

#[async_trait]
impl DocumentUnderstander for HttpOracle {
    fn name(&self) -> &str {
        &self.model
    }

    async fn understand(&self, request: &VisionRequest) -> Result<OracleReply, OracleError> {
        let image_url = request.image.to_api_url();
        debug!(
            "{}: vision request, image {} ({} chars)",
            self.model,
            match request.image {
                ImageSource::Url(_) => "url",
                ImageSource::Inline { .. } => "inline",
            },
            image_url.len()
        );
        let body = vision_body(&self.model, request, &image_url);
        self.complete(&body).await
    }
}

#[async_trait]
impl FieldReconciler for HttpOracle {
    fn name(&self) -> &str {
        &self.model
    }

    async fn reconcile(&self, request: &ReasoningRequest) -> Result<OracleReply, OracleError> {
        let body = reasoning_body(&self.model, request);
        self.complete(&body).await
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: WireContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct WireImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn vision_body<'a>(
    model: &'a str,
    request: &'a VisionRequest,
    image_url: &'a str,
) -> ChatCompletionRequest<'a> {
    ChatCompletionRequest {
        model,
        messages: vec![WireMessage {
            role: "user",
            content: WireContent::Parts(vec![
                WirePart::Text {
                    text: &request.prompt,
                },
                WirePart::ImageUrl {
                    image_url: WireImageUrl { url: image_url },
                },
            ]),
        }],
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

fn reasoning_body<'a>(model: &'a str, request: &'a ReasoningRequest) -> ChatCompletionRequest<'a> {
    ChatCompletionRequest {
        model,
        messages: vec![
            WireMessage {
                role: "system",
                content: WireContent::Text(&request.system),
            },
            WireMessage {
                role: "user",
                content: WireContent::Text(&request.user),
            },
        ],
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

fn reply_from_response(
    model: &str,
    response: ChatCompletionResponse,
) -> Result<OracleReply, OracleError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| OracleError::EmptyReply {
            oracle: model.to_string(),
        })?;
    let (input_tokens, output_tokens) = response
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));
    Ok(OracleReply {
        content,
        input_tokens,
        output_tokens,
    })
}
