//! Prompts for the vision (extraction) and reasoning (reconciliation) oracles.
//!
//! Callers can override the extraction prompt via
//! [`crate::config::FormFillConfig::extraction_prompt`]; the reconciliation
//! prompt is fixed because the engine's post-processing depends on the reply
//! shape it asks for.

use crate::model::ExtractedFieldSet;

/// Default instruction sent with the document image.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are reading a photographed identity or civil-registry document.

Extract every piece of personal information visible on the document and return it as a single JSON object.

Always include these keys:
- "full_name"
- "id_number"
- "date_of_birth" (ISO format YYYY-MM-DD when the date is legible)
- "address"
- "sex"

Also include any other relevant fields you can read (for example "nationality", "place_of_birth", "civil_status", "expiry_date", "issuing_authority"), using lower_snake_case keys.

Rules:
- Use null for any field that is not present or not legible.
- Copy values exactly as printed; do not guess or invent data.
- Output ONLY the JSON object, without commentary."#;

/// System message for the reconciliation call.
pub const RECONCILIATION_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that outputs valid JSON only.";

/// Build the user message for the reconciliation call.
///
/// Embeds the full extracted field set and the ordered form field list as
/// pretty-printed JSON so the oracle sees exact names.
pub fn reconciliation_prompt(extracted: &ExtractedFieldSet, form_fields: &[String]) -> String {
    let extracted_json =
        serde_json::to_string_pretty(extracted.as_json()).unwrap_or_else(|_| "{}".to_string());
    let fields_json = serde_json::to_string_pretty(form_fields).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are an intelligent form-filling assistant. Given data extracted from a document and the list of fillable field names of a PDF form, decide which value goes into which form field.

EXTRACTED DATA:
{extracted_json}

PDF FORM FIELDS:
{fields_json}

INSTRUCTIONS:
1. Map extracted data to form fields by meaning, not by exact name.
2. SPLIT: if one extracted value answers several form fields (e.g. "full_name" -> "first_name" + "last_name"), split it.
3. MERGE: if several extracted values together answer one form field (e.g. "street" + "city" -> "complete_address"), combine them.
4. NUMBERED VARIANTS: a form field named like a base field plus a suffix _2, _3, ... (e.g. "age_2") must receive the same value as its base field ("age") whenever the base field is filled. A suffixed field may also match a base name spelled differently (e.g. "firstname_2" takes the value of "first_name").
5. Only leave a form field missing when there is genuinely no relevant extracted data.
6. Use only form field names from the list above, spelled exactly.

Return ONE JSON object with exactly three keys:
- "mappings": array of mapping objects, each one of:
    {{"kind": "single_to_single", "source_field": "<extracted>", "target_field": "<form field>", "value": "<value>"}}
    {{"kind": "single_to_multiple", "source_field": "<extracted>", "value": "<extracted value>", "targets": [{{"field": "<form field>", "value": "<value>"}}]}}
    {{"kind": "multiple_to_single", "sources": [{{"field": "<extracted>", "value": "<value>"}}], "target_field": "<form field>", "value": "<combined value>"}}
- "filled_fields": flat object of form field -> value for every field you filled
- "missing_fields": array of form field names you could not fill

EXAMPLE OUTPUT:
{{
  "mappings": [
    {{"kind": "single_to_multiple", "source_field": "full_name", "value": "John Doe",
      "targets": [{{"field": "first_name", "value": "John"}}, {{"field": "last_name", "value": "Doe"}}]}},
    {{"kind": "single_to_multiple", "source_field": "age", "value": "30",
      "targets": [{{"field": "age", "value": "30"}}, {{"field": "age_2", "value": "30"}}]}},
    {{"kind": "multiple_to_single", "sources": [{{"field": "street", "value": "123 Main St"}}, {{"field": "city", "value": "Anytown"}}],
      "target_field": "complete_address", "value": "123 Main St, Anytown"}}
  ],
  "filled_fields": {{"first_name": "John", "last_name": "Doe", "age": "30", "age_2": "30", "complete_address": "123 Main St, Anytown"}},
  "missing_fields": ["zip_code"]
}}

Return ONLY the JSON object, no explanations."#
    )
}
