//! Error types for the edgequake-formfill library.
//!
//! Three layers of failure exist in the pipeline and each gets its own type:
//!
//! * [`FormFillError`] — **Fatal**: the operation cannot produce a filled
//!   document (template unreadable, extraction failed, render failed).
//!   Returned as `Err(FormFillError)` from the [`crate::autofill`] entry points.
//!
//! * [`ExtractionError`] — the Field Extractor's failure value. The extractor
//!   returns it inside a `Result` rather than logging and carrying on, and the
//!   orchestrator turns it into [`FormFillError::Extraction`] because there is
//!   nothing to reconcile without extracted data.
//!
//! * [`OracleError`] / [`ParseError`] — **Non-fatal**: a single oracle round
//!   trip failed or its reply held no usable JSON. The extractor maps these to
//!   an `ExtractionError` (or a `raw_text` fallback); the reconciliation engine
//!   maps them to a degraded [`crate::model::MappingPlan`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-formfill library.
#[derive(Debug, Error)]
pub enum FormFillError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// A named form resource tried to escape the forms directory, or no
    /// forms directory is configured.
    #[error("Invalid form template name '{name}': {reason}")]
    InvalidTemplateName { name: String, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The template was read, but is not a PDF.
    #[error("Form template '{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The document could not be turned into extracted fields.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The template cannot be parsed as a fillable form.
    #[error("Cannot read form fields of '{template}': {detail}")]
    SchemaRead { template: String, detail: String },

    /// The template is structurally corrupt or rendering the filled copy failed.
    #[error("Failed to fill form '{template}': {detail}")]
    Fill { template: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the filled PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured oracle backend cannot be constructed (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The Field Extractor could not produce a field set for a document.
///
/// `document` is the path or URL as given by the caller so an operator can
/// tell which upload failed.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("Extraction failed for '{document}': {message}")]
pub struct ExtractionError {
    pub document: String,
    pub message: String,
}

impl ExtractionError {
    pub fn new(document: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            message: message.into(),
        }
    }
}

/// A single oracle round trip failed.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum OracleError {
    /// Connection, TLS or provider-side failure before a reply arrived.
    #[error("oracle '{oracle}' transport failure: {message}")]
    Transport { oracle: String, message: String },

    /// The endpoint answered with a non-success HTTP status.
    #[error("oracle '{oracle}' returned HTTP {status}: {body}")]
    Api {
        oracle: String,
        status: u16,
        body: String,
    },

    /// The call did not finish within `api_timeout_secs`.
    #[error("oracle '{oracle}' timed out after {secs}s")]
    Timeout { oracle: String, secs: u64 },

    /// The reply carried no text content.
    #[error("oracle '{oracle}' returned an empty reply")]
    EmptyReply { oracle: String },
}

/// An oracle reply did not contain the structured JSON we asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("reply is empty")]
    Empty,

    #[error("reply JSON is not an object")]
    NotAnObject,

    #[error("reply is not valid JSON: {detail}")]
    Invalid { detail: String },
}
