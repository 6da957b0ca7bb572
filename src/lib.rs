//! # edgequake-formfill
//!
//! Fill arbitrary PDF forms from a photographed identity document.
//!
//! ## Why this crate?
//!
//! Government and enterprise forms all ask for the same facts (name, date of
//! birth, address) under wildly different field names: `first_name`,
//! `FirstName_2`, `applicant.given`. Exact-match lookup cannot bridge that
//! vocabulary, so this crate asks a vision model to read the document and a
//! reasoning model to decide which value goes where, then fills the form
//! deterministically and reports every field it could not fill.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ID photo ──▶ Extract (vision oracle) ───┐
//!                                         ├─▶ Reconcile (reasoning oracle) ─▶ Fill
//! PDF form ──▶ Inspect (AcroForm fields) ─┘
//! ```
//!
//! Extraction and inspection run concurrently. A reconciliation that fails
//! or returns garbage degrades to "every field missing" instead of an error,
//! so callers always get a document plus an honest gap report, and can close
//! the gaps with [`AutoFiller::complete_fill`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_formfill::{AutoFiller, DocumentSource, FormFillConfig, OracleConfig, TemplateSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let oracle = OracleConfig::openai_compatible(
//!         edgequake_formfill::config::DEFAULT_ENDPOINT,
//!         std::env::var("FORMFILL_API_KEY")?,
//!     );
//!     let filler = AutoFiller::from_config(&oracle, FormFillConfig::default())?;
//!
//!     let output = filler
//!         .auto_fill(
//!             &DocumentSource::parse("id_card.jpg"),
//!             &TemplateSource::parse("clearance_form.pdf"),
//!         )
//!         .await?;
//!
//!     output.document.write_to("filled.pdf").await?;
//!     println!("{}", output.report.message());
//!     for field in &output.report.missing_fields {
//!         println!("needs manual input: {field}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `formfill` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-formfill = { version = "0.1", default-features = false }
//! ```
//!
//! ## Oracles
//!
//! The pipeline only sees the [`DocumentUnderstander`] and
//! [`FieldReconciler`] traits. Two backends ship with the crate: a plain
//! OpenAI-compatible endpoint (Qwen on DashScope by default) and any
//! edgequake-llm provider. Tests substitute scripted implementations.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod autofill;
pub mod config;
pub mod error;
pub mod model;
pub mod oracle;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use autofill::AutoFiller;
pub use config::{FormFillConfig, FormFillConfigBuilder, OracleBackend, OracleConfig};
pub use error::{ExtractionError, FormFillError, OracleError, ParseError};
pub use model::{
    AutoFillOutput, AutoFillReport, AutoFillStats, ExtractedFieldSet, FieldKind, FieldValue,
    FilledDocument, FilledFormResult, FormField, FormSchema, MappingEntry, MappingPlan,
};
pub use oracle::{
    DocumentUnderstander, FieldReconciler, ImageSource, OracleReply, Oracles, ReasoningRequest,
    VisionRequest,
};
pub use pipeline::input::{DocumentSource, TemplateSource};
pub use pipeline::reply::parse_structured_reply;
pub use progress::{AutoFillProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
