//! Data model shared by every pipeline stage.
//!
//! All values here are created fresh for one pipeline invocation and never
//! shared across invocations.

use crate::error::FormFillError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Key used when an extraction reply held no JSON at all.
pub const RAW_TEXT_KEY: &str = "raw_text";

// ── Extracted data ───────────────────────────────────────────────────────

/// Flat, ordered mapping of semantic field name → value (`None` = not present).
///
/// Values are always strings or null; nested objects from the oracle are
/// flattened into `parent_child` keys by [`ExtractedFieldSet::from_json_object`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedFieldSet {
    fields: Map<String, Value>,
}

impl ExtractedFieldSet {
    /// Normalise an oracle JSON object into a flat string/null field set.
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let mut fields = Map::new();
        for (key, value) in object {
            flatten_into(&mut fields, key.trim(), value);
        }
        Self { fields }
    }

    /// The degenerate single-key set used when no JSON could be parsed.
    pub fn raw_text(text: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(RAW_TEXT_KEY.to_string(), Value::String(text.to_string()));
        Self { fields }
    }

    /// Build from `(name, value)` pairs in order.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.map(Value::String).unwrap_or(Value::Null)))
            .collect();
        Self { fields }
    }

    /// True when this set is the `raw_text` fallback rather than structured data.
    pub fn is_raw_text(&self) -> bool {
        self.fields.len() == 1 && self.fields.contains_key(RAW_TEXT_KEY)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields carrying a value.
    pub fn present_count(&self) -> usize {
        self.fields.values().filter(|v| !v.is_null()).count()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.fields
    }
}

fn flatten_into(out: &mut Map<String, Value>, key: &str, value: &Value) {
    if key.is_empty() {
        return;
    }
    match value {
        Value::Object(inner) => {
            for (k, v) in inner {
                flatten_into(out, &format!("{key}_{}", k.trim()), v);
            }
        }
        Value::Array(items) => {
            let joined: Vec<String> = items.iter().filter_map(coerce_value).collect();
            let v = if joined.is_empty() {
                Value::Null
            } else {
                Value::String(joined.join(", "))
            };
            out.insert(key.to_string(), v);
        }
        other => {
            let v = coerce_value(other).map(Value::String).unwrap_or(Value::Null);
            out.insert(key.to_string(), v);
        }
    }
}

/// String representation of a JSON value, or `None` for null, empty,
/// whitespace-only and `false` values.
pub fn coerce_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("true".to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

// ── Form schema ──────────────────────────────────────────────────────────

/// What kind of widget a form field is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    CheckBox,
    Radio,
    Choice,
}

/// One fillable field of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Fully qualified AcroForm name (`parent.child`).
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered, de-duplicated fillable fields of one PDF template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSchema {
    fields: Vec<FormField>,
}

impl FormSchema {
    /// Build a schema, keeping the first occurrence of each name.
    pub fn new(fields: impl IntoIterator<Item = FormField>) -> Self {
        let mut out: Vec<FormField> = Vec::new();
        for field in fields {
            if !out.iter().any(|f| f.name == field.name) {
                out.push(field);
            }
        }
        Self { fields: out }
    }

    /// A schema of text fields, mostly for tests and manual callers.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(|n| FormField {
            name: n.into(),
            kind: FieldKind::Text,
        }))
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ── Mapping plan ─────────────────────────────────────────────────────────

/// A `(field, value)` pair inside a split or merge entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field: String,
    pub value: String,
}

impl FieldValue {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A single reconciliation decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingEntry {
    /// One extracted value answers one form field.
    SingleToSingle {
        source_field: String,
        target_field: String,
        value: String,
    },
    /// One extracted value fans out: name splitting or variant replication.
    SingleToMultiple {
        source_field: String,
        value: String,
        targets: Vec<FieldValue>,
    },
    /// Several extracted values merge into one form field.
    MultipleToSingle {
        sources: Vec<FieldValue>,
        target_field: String,
        value: String,
    },
}

impl MappingEntry {
    /// Every `(target_field, value)` this entry assigns, in order.
    pub fn targets(&self) -> Vec<(&str, &str)> {
        match self {
            MappingEntry::SingleToSingle {
                target_field, value, ..
            }
            | MappingEntry::MultipleToSingle {
                target_field, value, ..
            } => vec![(target_field.as_str(), value.as_str())],
            MappingEntry::SingleToMultiple { targets, .. } => targets
                .iter()
                .map(|t| (t.field.as_str(), t.value.as_str()))
                .collect(),
        }
    }

    /// Names of the extracted fields this entry draws from.
    pub fn sources(&self) -> Vec<&str> {
        match self {
            MappingEntry::SingleToSingle { source_field, .. }
            | MappingEntry::SingleToMultiple { source_field, .. } => vec![source_field.as_str()],
            MappingEntry::MultipleToSingle { sources, .. } => {
                sources.iter().map(|s| s.field.as_str()).collect()
            }
        }
    }
}

/// The reconciliation's fill decisions plus the projections derived from them.
///
/// Only [`MappingPlan::from_entries`] and [`MappingPlan::degraded`] build a
/// plan, so `filled_fields` and `missing_fields` always agree with `mappings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingPlan {
    pub mappings: Vec<MappingEntry>,
    pub filled_fields: BTreeMap<String, String>,
    pub missing_fields: Vec<String>,
    /// Why the oracle's reply was not used, when it wasn't.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl MappingPlan {
    /// Derive both projections from `mappings`. The first entry to target a
    /// field decides its value; missing fields follow schema order.
    pub fn from_entries(mappings: Vec<MappingEntry>, schema: &FormSchema) -> Self {
        let mut filled_fields = BTreeMap::new();
        for entry in &mappings {
            for (target, value) in entry.targets() {
                filled_fields
                    .entry(target.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        let missing_fields = schema
            .fields()
            .iter()
            .filter(|f| !filled_fields.contains_key(&f.name))
            .map(|f| f.name.clone())
            .collect();
        Self {
            mappings,
            filled_fields,
            missing_fields,
            degraded: None,
        }
    }

    /// Every form field missing, nothing filled.
    pub fn degraded(schema: &FormSchema, reason: impl Into<String>) -> Self {
        Self {
            mappings: Vec::new(),
            filled_fields: BTreeMap::new(),
            missing_fields: schema.names(),
            degraded: Some(reason.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// `filled ∪ missing == schema` and `filled ∩ missing == ∅`.
    pub fn is_consistent_with(&self, schema: &FormSchema) -> bool {
        let disjoint = self
            .missing_fields
            .iter()
            .all(|m| !self.filled_fields.contains_key(m));
        let covered = schema
            .fields()
            .iter()
            .all(|f| self.filled_fields.contains_key(&f.name) || self.missing_fields.contains(&f.name));
        let no_strangers = self.filled_fields.keys().all(|k| schema.contains(k))
            && self.missing_fields.iter().all(|m| schema.contains(m));
        disjoint && covered && no_strangers
    }
}

// ── Filled document ──────────────────────────────────────────────────────

/// The rendered filled PDF, held in memory until the caller stores it.
#[derive(Clone, PartialEq, Eq)]
pub struct FilledDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for FilledDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilledDocument")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl FilledDocument {
    pub const MEDIA_TYPE: &'static str = "application/pdf";

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the PDF to `path` atomically.
    ///
    /// The bytes go to a temp file in the same directory which is renamed
    /// over `path`; on any failure the temp file is removed on drop.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<(), FormFillError> {
        let path = path.as_ref().to_path_buf();
        let bytes = self.bytes.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| FormFillError::Internal(format!("Write task panicked: {e}")))?
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FormFillError> {
    let io_err = |source: std::io::Error| FormFillError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(io_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Outcome of one Form Filler call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledFormResult {
    pub document: FilledDocument,
    /// Values actually written into the template.
    pub filled_fields: BTreeMap<String, String>,
    /// Values for names the template does not have, or that no option accepts.
    pub dropped_fields: BTreeMap<String, String>,
}

// ── Auto-fill output ─────────────────────────────────────────────────────

/// Timing and token usage of one auto-fill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFillStats {
    pub extraction_ms: u64,
    pub inspection_ms: u64,
    pub reconciliation_ms: u64,
    pub fill_ms: u64,
    pub total_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// JSON-serialisable report of an auto-fill run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoFillReport {
    pub template: String,
    pub document: String,
    pub extracted_data: ExtractedFieldSet,
    pub mappings: Vec<MappingEntry>,
    pub filled_fields: BTreeMap<String, String>,
    pub missing_fields: Vec<String>,
    /// Plan values the template itself rejected.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dropped_fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
    pub stats: AutoFillStats,
}

impl AutoFillReport {
    /// Human-readable one-line summary.
    pub fn message(&self) -> String {
        format!(
            "PDF filled with {} fields. {} fields need manual input.",
            self.filled_fields.len(),
            self.missing_fields.len()
        )
    }
}

/// Filled document plus report.
#[derive(Debug, Clone)]
pub struct AutoFillOutput {
    pub document: FilledDocument,
    pub report: AutoFillReport,
}
