//! Form Schema Inspector: list the fillable fields of a template.
//!
//! Deterministic and local: the same template always yields the same names
//! in the same order, each name once.

use crate::error::FormFillError;
use crate::model::{FormField, FormSchema};
use crate::pipeline::acroform::collect_fields;
use crate::pipeline::input::LoadedTemplate;
use lopdf::Document;
use tracing::{debug, info};

/// Parse `template` off the async runtime and return its schema.
pub async fn inspect_schema(template: &LoadedTemplate) -> Result<FormSchema, FormFillError> {
    let template = template.clone();
    tokio::task::spawn_blocking(move || read_schema(&template.bytes, &template.name))
        .await
        .map_err(|e| FormFillError::Internal(format!("Schema task panicked: {e}")))?
}

/// Read the schema from PDF bytes.
///
/// Fails with [`FormFillError::SchemaRead`] when the bytes are not a PDF,
/// the PDF has no AcroForm, or the AcroForm has no fillable fields.
pub fn read_schema(bytes: &[u8], template: &str) -> Result<FormSchema, FormFillError> {
    let schema_err = |detail: String| FormFillError::SchemaRead {
        template: template.to_string(),
        detail,
    };

    let doc = Document::load_mem(bytes).map_err(|e| schema_err(format!("cannot parse PDF: {e}")))?;
    let fields = collect_fields(&doc).map_err(schema_err)?;
    debug!("{} terminal fields in '{}'", fields.len(), template);

    let schema = FormSchema::new(fields.into_iter().map(|f| FormField {
        name: f.name,
        kind: f.kind,
    }));
    if schema.is_empty() {
        return Err(schema_err("form has no fillable fields".to_string()));
    }

    info!("Template '{}' has {} fillable fields", template, schema.len());
    Ok(schema)
}
