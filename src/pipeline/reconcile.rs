//! Reconciliation Engine: map extracted fields onto a form's field names.
//!
//! Matching is delegated to the reasoning oracle; this module owns the
//! deterministic part around it:
//!
//! 1. build the prompt from the extracted set and the ordered field list,
//! 2. parse the reply into mapping entries, accepting the kind-tagged shape
//!    the prompt asks for and the older `type`/`form_mapping` shape,
//! 3. drop targets outside the schema and empty values,
//! 4. turn bare `filled_fields` values into entries so the plan stays the
//!    single source of truth,
//! 5. give numbered variants their base's value (`age` → `age_2`) unless
//!    the variant has its own extracted value,
//! 6. derive `filled_fields` / `missing_fields` from the entries.
//!
//! Any oracle failure, timeout or unusable reply yields
//! [`MappingPlan::degraded`]: nothing filled, every field missing, and the
//! reason recorded. A partial plan is never built from a broken reply.

use crate::config::FormFillConfig;
use crate::error::{OracleError, ParseError};
use crate::model::{
    coerce_value, ExtractedFieldSet, FieldValue, FormSchema, MappingEntry, MappingPlan,
};
use crate::oracle::{FieldReconciler, ReasoningRequest};
use crate::pipeline::reply::parse_structured_reply;
use crate::prompts::{reconciliation_prompt, RECONCILIATION_SYSTEM_PROMPT};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

static RE_NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)_(\d+)$").unwrap());

/// Mapping plan plus the token usage of the call.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub plan: MappingPlan,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The three keys the reasoning oracle must return.
#[derive(Debug, Deserialize)]
struct RawPlan {
    mappings: Vec<Value>,
    #[serde(alias = "filledFields")]
    filled_fields: Map<String, Value>,
    #[serde(alias = "missingFields")]
    missing_fields: Vec<Value>,
}

/// Produce a mapping plan for `schema`. Never fails; see the module docs.
pub async fn reconcile_fields(
    reconciler: &dyn FieldReconciler,
    extracted: &ExtractedFieldSet,
    schema: &FormSchema,
    config: &FormFillConfig,
) -> Reconciliation {
    if schema.is_empty() {
        return Reconciliation::default();
    }
    if extracted.present_count() == 0 {
        info!("No extracted values to reconcile; all {} fields missing", schema.len());
        return Reconciliation {
            plan: MappingPlan::from_entries(Vec::new(), schema),
            ..Default::default()
        };
    }

    let request = ReasoningRequest {
        system: RECONCILIATION_SYSTEM_PROMPT.to_string(),
        user: reconciliation_prompt(extracted, &schema.names()),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    debug!(
        "Reconciling {} extracted fields against {} form fields via {}",
        extracted.len(),
        schema.len(),
        reconciler.name()
    );
    let timeout = Duration::from_secs(config.api_timeout_secs);
    let reply = match tokio::time::timeout(timeout, reconciler.reconcile(&request)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => return degrade(schema, e.to_string()),
        Err(_) => {
            let e = OracleError::Timeout {
                oracle: reconciler.name().to_string(),
                secs: config.api_timeout_secs,
            };
            return degrade(schema, e.to_string());
        }
    };

    let plan = match plan_from_reply(&reply.content, extracted, schema, config) {
        Ok(plan) => plan,
        Err(e) => degrade(schema, format!("unusable reconciliation reply: {e}")).plan,
    };

    if !plan.is_degraded() {
        info!(
            "Reconciled {} of {} form fields ({} mapping entries)",
            plan.filled_fields.len(),
            schema.len(),
            plan.mappings.len()
        );
    }

    Reconciliation {
        plan,
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
    }
}

fn degrade(schema: &FormSchema, reason: String) -> Reconciliation {
    warn!("Reconciliation degraded, reporting every field missing: {reason}");
    Reconciliation {
        plan: MappingPlan::degraded(schema, reason),
        ..Default::default()
    }
}

/// Deterministic post-processing of one reasoning reply.
pub fn plan_from_reply(
    reply: &str,
    extracted: &ExtractedFieldSet,
    schema: &FormSchema,
    config: &FormFillConfig,
) -> Result<MappingPlan, ParseError> {
    let raw: RawPlan = parse_structured_reply(reply)?;
    debug!(
        "Reply proposes {} mappings, {} filled, {} missing",
        raw.mappings.len(),
        raw.filled_fields.len(),
        raw.missing_fields.len()
    );

    let mut entries: Vec<MappingEntry> = raw
        .mappings
        .iter()
        .filter_map(convert_entry)
        .filter_map(|e| restrict_to_schema(e, schema))
        .collect();

    let covered: HashSet<String> = entries
        .iter()
        .flat_map(|e| e.targets().into_iter().map(|(t, _)| t.to_string()))
        .collect();
    for (target, value) in &raw.filled_fields {
        if covered.contains(target) {
            continue;
        }
        let Some(value) = coerce_value(value) else {
            continue;
        };
        if !schema.contains(target) {
            warn!("Reconciliation filled unknown form field '{target}', ignoring it");
            continue;
        }
        let source_field = extracted
            .iter()
            .find(|(_, v)| *v == Some(value.as_str()))
            .map(|(k, _)| k.to_string())
            .unwrap_or_else(|| target.clone());
        entries.push(MappingEntry::SingleToSingle {
            source_field,
            target_field: target.clone(),
            value,
        });
    }

    let mut plan = MappingPlan::from_entries(entries, schema);
    if config.replicate_numbered_variants {
        let extra = numbered_variant_entries(&plan.filled_fields, extracted, schema);
        if !extra.is_empty() {
            let replaced: HashSet<String> = extra
                .iter()
                .flat_map(|e| e.targets().into_iter().map(|(t, _)| t.to_string()))
                .collect();
            let mut mappings: Vec<MappingEntry> = plan
                .mappings
                .into_iter()
                .filter_map(|e| retain_targets(e, |t| !replaced.contains(t)))
                .collect();
            mappings.extend(extra);
            plan = MappingPlan::from_entries(mappings, schema);
        }
    }
    Ok(plan)
}

// ── Reply entries ────────────────────────────────────────────────────────

/// Lower-case a kind tag and drop separators: `single_to_single`,
/// `SingleToSingle` and `single-to-single` all match.
fn kind_key(tag: &str) -> String {
    tag.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k).and_then(coerce_value))
}

const FIELD_KEYS: [&str; 5] = [
    "field",
    "target_field",
    "source_field",
    "targetField",
    "sourceField",
];

/// `[{field, value}]` pairs, skipping malformed and empty ones.
fn pairs(value: Option<&Value>) -> Vec<FieldValue> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let obj = item.as_object()?;
                    let field = text(obj, &FIELD_KEYS)?;
                    let value = text(obj, &["value"])?;
                    Some(FieldValue::new(field, value))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn convert_entry(value: &Value) -> Option<MappingEntry> {
    let obj = value.as_object()?;
    if obj.contains_key("form_mapping") {
        return convert_legacy(obj);
    }
    let kind = obj.get("kind").and_then(Value::as_str).map(kind_key);
    let entry = match kind.as_deref() {
        Some("singletosingle") => MappingEntry::SingleToSingle {
            source_field: text(obj, &["source_field", "sourceField"])?,
            target_field: text(obj, &["target_field", "targetField"])?,
            value: text(obj, &["value"])?,
        },
        Some("singletomultiple") => MappingEntry::SingleToMultiple {
            source_field: text(obj, &["source_field", "sourceField"])?,
            value: text(obj, &["value"]).unwrap_or_default(),
            targets: pairs(obj.get("targets")),
        },
        Some("multipletosingle") => MappingEntry::MultipleToSingle {
            sources: pairs(obj.get("sources")),
            target_field: text(obj, &["target_field", "targetField"])?,
            value: text(obj, &["value"])?,
        },
        other => {
            debug!("Skipping mapping entry of unknown kind {other:?}");
            return None;
        }
    };
    Some(entry)
}

/// `{type, field|fields, value, form_mapping: {type, field|fields}}`.
fn convert_legacy(obj: &Map<String, Value>) -> Option<MappingEntry> {
    let form = obj.get("form_mapping")?.as_object()?;
    let source_multiple = obj.get("type").and_then(Value::as_str) == Some("multiple");
    let target_multiple = form.get("type").and_then(Value::as_str) == Some("multiple");

    match (source_multiple, target_multiple) {
        (false, false) => {
            let value = text(form, &["value"]).or_else(|| text(obj, &["value"]))?;
            Some(MappingEntry::SingleToSingle {
                source_field: text(obj, &["field"])?,
                target_field: text(form, &["field"])?,
                value,
            })
        }
        (false, true) => Some(MappingEntry::SingleToMultiple {
            source_field: text(obj, &["field"])?,
            value: text(obj, &["value"]).unwrap_or_default(),
            targets: pairs(form.get("fields")),
        }),
        (true, false) => {
            let sources = pairs(obj.get("fields"));
            let value = text(form, &["value"]).or_else(|| {
                let joined: Vec<&str> = sources.iter().map(|s| s.value.as_str()).collect();
                (!joined.is_empty()).then(|| joined.join(", "))
            })?;
            Some(MappingEntry::MultipleToSingle {
                sources,
                target_field: text(form, &["field"])?,
                value,
            })
        }
        (true, true) => {
            warn!("Skipping many-to-many mapping entry");
            None
        }
    }
}

/// Keep only targets the form has. Entries left with no target are dropped.
fn restrict_to_schema(entry: MappingEntry, schema: &FormSchema) -> Option<MappingEntry> {
    retain_targets(entry, |field| {
        let ok = schema.contains(field);
        if !ok {
            warn!("Reconciliation targeted unknown form field '{field}', dropping it");
        }
        ok
    })
}

/// Keep the targets `keep` accepts; `None` when none are left.
fn retain_targets(entry: MappingEntry, mut keep: impl FnMut(&str) -> bool) -> Option<MappingEntry> {
    match entry {
        MappingEntry::SingleToMultiple {
            source_field,
            value,
            targets,
        } => {
            let targets: Vec<FieldValue> = targets.into_iter().filter(|t| keep(&t.field)).collect();
            (!targets.is_empty()).then_some(MappingEntry::SingleToMultiple {
                source_field,
                value,
                targets,
            })
        }
        other => {
            let kept = other.targets().first().is_some_and(|(t, _)| keep(t));
            kept.then_some(other)
        }
    }
}

// ── Numbered variants ────────────────────────────────────────────────────

fn loose(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Entries that give every `base_N` field (N ≥ 2) the value of its filled base.
///
/// The base is `base` itself when the form has it, otherwise a filled field
/// spelled the same up to case and underscores (`firstname_2` → `first_name`).
/// A variant with its own extracted value keeps the oracle's value, or gets
/// the extracted one when the oracle left it empty. Any other variant value
/// that differs from the base is replaced.
pub fn numbered_variant_entries(
    filled: &BTreeMap<String, String>,
    extracted: &ExtractedFieldSet,
    schema: &FormSchema,
) -> Vec<MappingEntry> {
    let mut own_values = Vec::new();
    let mut by_base: BTreeMap<String, Vec<FieldValue>> = BTreeMap::new();
    let mut base_order: Vec<String> = Vec::new();

    for field in schema.fields() {
        let name = &field.name;
        let Some(caps) = RE_NUMBERED.captures(name) else {
            continue;
        };
        let stem = &caps[1];
        let n: u32 = caps[2].parse().unwrap_or(0);
        if n < 2 {
            continue;
        }

        if let Some(own) = extracted.get(name).filter(|v| !v.trim().is_empty()) {
            if !filled.contains_key(name) {
                own_values.push(MappingEntry::SingleToSingle {
                    source_field: name.clone(),
                    target_field: name.clone(),
                    value: own.trim().to_string(),
                });
            }
            continue;
        }

        let base = if filled.contains_key(stem) {
            Some(stem.to_string())
        } else {
            let key = loose(stem);
            schema
                .fields()
                .iter()
                .map(|f| &f.name)
                .find(|f| filled.contains_key(*f) && loose(f) == key)
                .cloned()
        };
        let Some(base) = base else {
            continue;
        };
        let Some(value) = filled.get(&base) else {
            continue;
        };
        match filled.get(name) {
            Some(current) if current == value => continue,
            Some(current) => {
                debug!("Replacing '{current}' in numbered variant '{name}' with the value of '{base}'")
            }
            None => debug!("Replicating '{base}' into numbered variant '{name}'"),
        }
        if !by_base.contains_key(&base) {
            base_order.push(base.clone());
        }
        by_base
            .entry(base)
            .or_default()
            .push(FieldValue::new(name.clone(), value.clone()));
    }

    let mut out = own_values;
    for base in base_order {
        let Some(targets) = by_base.remove(&base) else {
            continue;
        };
        let value = filled.get(&base).cloned().unwrap_or_default();
        out.push(MappingEntry::SingleToMultiple {
            source_field: base,
            value,
            targets,
        });
    }
    out
}
