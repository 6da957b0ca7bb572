//! Form Filler: write values into a copy of the template.
//!
//! The template bytes are never modified; a new PDF is serialised from the
//! parsed document. Names the template lacks are returned as dropped rather
//! than failing the call, and a PDF without an AcroForm drops every name.
//! Only a template that cannot be parsed or
//! re-serialised is an error.
//!
//! Text and choice fields get a `/V` text string and lose their cached
//! appearance; check boxes and radio groups switch `/V` and `/AS` between
//! their on-state and `/Off`. `/NeedAppearances` is set so viewers redraw.

use crate::error::FormFillError;
use crate::model::{FieldKind, FilledDocument, FilledFormResult};
use crate::pipeline::acroform::{
    collect_fields, decode_text, encode_text, has_acroform, set_need_appearances, TerminalField,
};
use crate::pipeline::input::LoadedTemplate;
use lopdf::{Document, Object};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const CHECKED_WORDS: &[&str] = &["yes", "true", "on", "1", "x", "checked"];

/// Fill `template` with `values` off the async runtime.
pub async fn fill_form(
    template: &LoadedTemplate,
    values: &BTreeMap<String, String>,
) -> Result<FilledFormResult, FormFillError> {
    let template = template.clone();
    let values = values.clone();
    tokio::task::spawn_blocking(move || fill_template(&template, &values))
        .await
        .map_err(|e| FormFillError::Internal(format!("Fill task panicked: {e}")))?
}

/// Synchronous core of [`fill_form`].
pub fn fill_template(
    template: &LoadedTemplate,
    values: &BTreeMap<String, String>,
) -> Result<FilledFormResult, FormFillError> {
    let fill_err = |detail: String| FormFillError::Fill {
        template: template.name.clone(),
        detail,
    };

    let mut doc = Document::load_mem(&template.bytes)
        .map_err(|e| fill_err(format!("cannot parse PDF: {e}")))?;
    let has_form = has_acroform(&doc).map_err(fill_err)?;
    let fields = if has_form {
        collect_fields(&doc).map_err(fill_err)?
    } else {
        warn!("Template '{}' has no AcroForm", template.name);
        Vec::new()
    };

    let mut filled = BTreeMap::new();
    let mut dropped = BTreeMap::new();

    for (name, value) in values {
        let value = value.trim();
        if value.is_empty() {
            debug!("Skipping empty value for '{name}'");
            continue;
        }
        let Some(field) = fields.iter().find(|f| &f.name == name) else {
            warn!("Form '{}' has no field '{}', dropping value", template.name, name);
            dropped.insert(name.clone(), value.to_string());
            continue;
        };
        if apply_value(&mut doc, field, value) {
            filled.insert(name.clone(), value.to_string());
        } else {
            warn!(
                "Value '{}' is not an option of radio group '{}', dropping it",
                value, name
            );
            dropped.insert(name.clone(), value.to_string());
        }
    }

    if has_form {
        set_need_appearances(&mut doc).map_err(fill_err)?;
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| fill_err(format!("cannot write filled PDF: {e}")))?;

    info!(
        "Filled {} fields of '{}' ({} dropped)",
        filled.len(),
        template.name,
        dropped.len()
    );

    Ok(FilledFormResult {
        document: FilledDocument {
            file_name: template.filled_file_name(),
            bytes,
        },
        filled_fields: filled,
        dropped_fields: dropped,
    })
}

/// Returns false when the value cannot be represented by the field.
fn apply_value(doc: &mut Document, field: &TerminalField, value: &str) -> bool {
    match field.kind {
        FieldKind::Text | FieldKind::Choice => {
            set_entry(doc, field.id, "V", encode_text(value));
            for widget in &field.widgets {
                if let Ok(dict) = doc.get_dictionary_mut(widget.id) {
                    dict.remove(b"AP");
                }
            }
            true
        }
        FieldKind::CheckBox => {
            let on = field
                .widgets
                .iter()
                .find_map(|w| w.on_state.clone())
                .unwrap_or_else(|| b"Yes".to_vec());
            let checked = CHECKED_WORDS.contains(&value.to_ascii_lowercase().as_str())
                || value.as_bytes() == on.as_slice();
            let state = if checked { on } else { b"Off".to_vec() };
            set_entry(doc, field.id, "V", Object::Name(state.clone()));
            for widget in &field.widgets {
                let shown = match &widget.on_state {
                    Some(s) if checked && *s == state => state.clone(),
                    None if checked => state.clone(),
                    _ => b"Off".to_vec(),
                };
                set_entry(doc, widget.id, "AS", Object::Name(shown));
            }
            true
        }
        FieldKind::Radio => {
            let Some(chosen) = field
                .widgets
                .iter()
                .filter_map(|w| w.on_state.as_ref())
                .find(|s| decode_text(s).eq_ignore_ascii_case(value))
                .cloned()
            else {
                return false;
            };
            set_entry(doc, field.id, "V", Object::Name(chosen.clone()));
            for widget in &field.widgets {
                let shown = if widget.on_state.as_ref() == Some(&chosen) {
                    chosen.clone()
                } else {
                    b"Off".to_vec()
                };
                set_entry(doc, widget.id, "AS", Object::Name(shown));
            }
            true
        }
    }
}

fn set_entry(doc: &mut Document, id: lopdf::ObjectId, key: &str, value: Object) {
    if let Ok(dict) = doc.get_dictionary_mut(id) {
        dict.set(key, value);
    }
}

/// Current `/V` of every field that has one, by qualified name.
///
/// Check boxes and radio groups report their state name.
pub fn read_values(bytes: &[u8]) -> Result<BTreeMap<String, String>, FormFillError> {
    let doc = Document::load_mem(bytes).map_err(|e| FormFillError::SchemaRead {
        template: "filled document".to_string(),
        detail: e.to_string(),
    })?;
    let fields = collect_fields(&doc).map_err(|detail| FormFillError::SchemaRead {
        template: "filled document".to_string(),
        detail,
    })?;

    let mut out = BTreeMap::new();
    for field in fields {
        let Ok(v) = doc.get_dictionary(field.id).and_then(|d| d.get(b"V")) else {
            continue;
        };
        let text = match v {
            Object::String(bytes, _) => decode_text(bytes),
            Object::Name(name) => decode_text(name),
            _ => continue,
        };
        out.insert(field.name, text);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{
        build_form, checkbox, flat_pdf, parent, radio, text_field, text_form,
    };

    fn template(bytes: Vec<u8>) -> LoadedTemplate {
        LoadedTemplate {
            name: "clearance.pdf".into(),
            bytes,
        }
    }

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn fills_known_and_drops_unknown() {
        let t = template(text_form(&["first_name", "last_name", "sex"]));
        let result = fill_template(
            &t,
            &values(&[("first_name", "Juan"), ("unknown_field", "x"), ("sex", "M")]),
        )
        .unwrap();

        assert_eq!(result.document.file_name, "filled_clearance.pdf");
        assert_eq!(result.filled_fields.len(), 2);
        assert_eq!(result.dropped_fields, values(&[("unknown_field", "x")]));

        let read = read_values(&result.document.bytes).unwrap();
        assert_eq!(read, values(&[("first_name", "Juan"), ("sex", "M")]));
    }

    #[test]
    fn template_bytes_are_untouched() {
        let original = text_form(&["a"]);
        let t = template(original.clone());
        fill_template(&t, &values(&[("a", "1")])).unwrap();
        assert_eq!(t.bytes, original);
    }

    #[test]
    fn refilling_is_idempotent() {
        let t = template(text_form(&["first_name", "age"]));
        let v = values(&[("first_name", "Juan"), ("age", "34")]);
        let once = fill_template(&t, &v).unwrap();
        let twice = fill_template(&template(once.document.bytes.clone()), &v).unwrap();
        assert_eq!(
            read_values(&once.document.bytes).unwrap(),
            read_values(&twice.document.bytes).unwrap()
        );
    }

    #[test]
    fn empty_values_are_skipped() {
        let t = template(text_form(&["a", "b"]));
        let result = fill_template(&t, &values(&[("a", "  "), ("b", "ok")])).unwrap();
        assert_eq!(result.filled_fields, values(&[("b", "ok")]));
        assert!(result.dropped_fields.is_empty());
    }

    #[test]
    fn non_ascii_and_nested_names() {
        let t = template(build_form(|doc| {
            let city = text_field(doc, "city");
            vec![parent(doc, "address", vec![city])]
        }));
        let result = fill_template(&t, &values(&[("address.city", "Parañaque")])).unwrap();
        let read = read_values(&result.document.bytes).unwrap();
        assert_eq!(read.get("address.city").map(String::as_str), Some("Parañaque"));
    }

    #[test]
    fn checkbox_and_radio_states() {
        let t = template(build_form(|doc| {
            vec![
                checkbox(doc, "agree", "Yes"),
                checkbox(doc, "married", "On"),
                radio(doc, "sex", &["M", "F"]),
                radio(doc, "blood", &["A", "B"]),
            ]
        }));
        let result = fill_template(
            &t,
            &values(&[
                ("agree", "true"),
                ("married", "no"),
                ("sex", "f"),
                ("blood", "O"),
            ]),
        )
        .unwrap();

        let read = read_values(&result.document.bytes).unwrap();
        assert_eq!(read.get("agree").map(String::as_str), Some("Yes"));
        assert_eq!(read.get("married").map(String::as_str), Some("Off"));
        assert_eq!(read.get("sex").map(String::as_str), Some("F"));
        assert_eq!(result.dropped_fields, values(&[("blood", "O")]));
    }

    #[test]
    fn form_without_acroform_drops_everything() {
        let t = template(flat_pdf());
        let result = fill_template(&t, &values(&[("name", "Juan"), ("age", "34")])).unwrap();
        assert!(result.filled_fields.is_empty());
        assert_eq!(result.dropped_fields, values(&[("name", "Juan"), ("age", "34")]));
        assert!(result.document.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn corrupt_template_is_fill_error() {
        let t = template(b"%PDF-1.4\ngarbage".to_vec());
        assert!(matches!(
            fill_template(&t, &values(&[("a", "1")])),
            Err(FormFillError::Fill { .. })
        ));
    }
}
