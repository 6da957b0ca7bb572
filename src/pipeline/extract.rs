//! Field Extractor: one vision-oracle call per document.
//!
//! Never fails on an unreadable *reply*: if no JSON object can be recovered,
//! the reply text is kept under [`RAW_TEXT_KEY`](crate::model::RAW_TEXT_KEY)
//! so downstream stages still have something to work with. Only a missing
//! document, an oracle failure or a timeout produce an [`ExtractionError`].

use crate::config::FormFillConfig;
use crate::error::{ExtractionError, OracleError};
use crate::model::ExtractedFieldSet;
use crate::oracle::{DocumentUnderstander, VisionRequest};
use crate::pipeline::input::{resolve_document, DocumentSource};
use crate::pipeline::reply::extract_json_object;
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extracted fields plus the token usage of the call.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub fields: ExtractedFieldSet,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Read `source` with the vision oracle and normalise its reply.
pub async fn extract_fields(
    understander: &dyn DocumentUnderstander,
    source: &DocumentSource,
    config: &FormFillConfig,
) -> Result<Extraction, ExtractionError> {
    let label = source.label();
    let image = resolve_document(source).await?;

    let request = VisionRequest {
        prompt: config
            .extraction_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_EXTRACTION_PROMPT.to_string()),
        image,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    debug!("Extracting fields from '{}' via {}", label, understander.name());
    let timeout = Duration::from_secs(config.api_timeout_secs);
    let reply = match tokio::time::timeout(timeout, understander.understand(&request)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => return Err(ExtractionError::new(&label, e.to_string())),
        Err(_) => {
            let timeout = OracleError::Timeout {
                oracle: understander.name().to_string(),
                secs: config.api_timeout_secs,
            };
            return Err(ExtractionError::new(&label, timeout.to_string()));
        }
    };

    let fields = parse_extraction_reply(&reply.content);
    if fields.is_raw_text() {
        warn!("No JSON object in extraction reply for '{label}', keeping raw text");
    } else {
        info!(
            "Extracted {} fields ({} with values) from '{}'",
            fields.len(),
            fields.present_count(),
            label
        );
    }

    Ok(Extraction {
        fields,
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
    })
}

/// Fenced JSON, then raw JSON, then the `raw_text` fallback.
pub fn parse_extraction_reply(reply: &str) -> ExtractedFieldSet {
    match extract_json_object(reply) {
        Ok(object) => ExtractedFieldSet::from_json_object(&object),
        Err(e) => {
            debug!("Extraction reply not usable as JSON: {e}");
            ExtractedFieldSet::raw_text(reply.trim())
        }
    }
}
