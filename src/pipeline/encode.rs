//! Image encoding: raw document bytes → base64 payload for the vision oracle.
//!
//! Chat APIs accept local images as `data:<mime>;base64,<payload>` URIs
//! embedded in the JSON request body. The photo is sent as-is; re-encoding
//! would only add artefacts to small print on ID cards.

use crate::oracle::ImageSource;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Wrap the document bytes as an inline image with an explicit MIME type.
pub fn encode_document(bytes: &[u8], mime_type: &str) -> ImageSource {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded document {} bytes → {} bytes base64 ({mime_type})", bytes.len(), b64.len());

    ImageSource::Inline {
        mime_type: mime_type.to_string(),
        base64: b64,
    }
}
