//! AcroForm traversal shared by the schema inspector and the filler.
//!
//! Walks `Catalog → AcroForm → Fields → Kids…` and reports every terminal
//! field with its fully qualified name (`parent.child`), its kind, and the
//! widget annotations that display it. Names and field types are inherited
//! down the tree; `Kids` without a `/T` are widgets of their parent field.
//!
//! Signature fields and push buttons are skipped: neither can hold a value
//! a document could supply.

use crate::model::FieldKind;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::HashSet;

/// `Ff` bit 16: radio button group.
const FF_RADIO: i64 = 1 << 15;
/// `Ff` bit 17: push button.
const FF_PUSHBUTTON: i64 = 1 << 16;

const MAX_DEPTH: usize = 32;

/// One widget annotation of a terminal field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Widget {
    pub id: ObjectId,
    /// Non-`Off` appearance state name, for check boxes and radio buttons.
    pub on_state: Option<Vec<u8>>,
}

/// A field that carries a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TerminalField {
    pub name: String,
    pub id: ObjectId,
    pub kind: FieldKind,
    pub widgets: Vec<Widget>,
}

#[derive(Debug, Clone, Default)]
struct Inherited {
    name: String,
    field_type: Option<Vec<u8>>,
    flags: i64,
}

/// Every fillable terminal field, in document order.
pub(crate) fn collect_fields(doc: &Document) -> Result<Vec<TerminalField>, String> {
    let form = acroform(doc)?;
    let roots = form
        .get(b"Fields")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
        .ok_or_else(|| "AcroForm has no Fields array".to_string())?;

    let mut out = Vec::new();
    let mut visited = HashSet::new();
    for root in roots {
        if let Ok(id) = root.as_reference() {
            walk(doc, id, &Inherited::default(), &mut visited, &mut out, 0);
        }
    }
    Ok(out)
}

fn walk(
    doc: &Document,
    id: ObjectId,
    parent: &Inherited,
    visited: &mut HashSet<ObjectId>,
    out: &mut Vec<TerminalField>,
    depth: usize,
) {
    if depth > MAX_DEPTH || !visited.insert(id) {
        return;
    }
    let Ok(dict) = doc.get_dictionary(id) else {
        return;
    };

    let mut here = parent.clone();
    if let Some(partial) = dict.get(b"T").ok().and_then(|o| o.as_str().ok()) {
        let partial = decode_text(partial);
        here.name = if parent.name.is_empty() {
            partial
        } else {
            format!("{}.{}", parent.name, partial)
        };
    }
    if let Ok(ft) = dict.get(b"FT").and_then(Object::as_name) {
        here.field_type = Some(ft.to_vec());
    }
    if let Ok(ff) = dict.get(b"Ff").and_then(Object::as_i64) {
        here.flags = ff;
    }

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
        .map(|arr| arr.iter().filter_map(|k| k.as_reference().ok()).collect())
        .unwrap_or_default();

    let has_field_kids = kids.iter().any(|k| {
        doc.get_dictionary(*k)
            .map(|d| d.has(b"T"))
            .unwrap_or(false)
    });
    if has_field_kids {
        for kid in kids {
            walk(doc, kid, &here, visited, out, depth + 1);
        }
        return;
    }

    let Some(kind) = field_kind(here.field_type.as_deref(), here.flags) else {
        return;
    };
    if here.name.is_empty() {
        return;
    }

    let widget_ids = if kids.is_empty() { vec![id] } else { kids };
    let widgets = widget_ids
        .into_iter()
        .map(|w| Widget {
            id: w,
            on_state: on_state(doc, w),
        })
        .collect();

    out.push(TerminalField {
        name: here.name,
        id,
        kind,
        widgets,
    });
}

fn field_kind(field_type: Option<&[u8]>, flags: i64) -> Option<FieldKind> {
    match field_type? {
        b"Tx" => Some(FieldKind::Text),
        b"Ch" => Some(FieldKind::Choice),
        b"Btn" if flags & FF_PUSHBUTTON != 0 => None,
        b"Btn" if flags & FF_RADIO != 0 => Some(FieldKind::Radio),
        b"Btn" => Some(FieldKind::CheckBox),
        _ => None,
    }
}

fn on_state(doc: &Document, widget: ObjectId) -> Option<Vec<u8>> {
    let dict = doc.get_dictionary(widget).ok()?;
    let ap = resolve(doc, dict.get(b"AP").ok()?)?.as_dict().ok()?;
    let normal = resolve(doc, ap.get(b"N").ok()?)?.as_dict().ok()?;
    normal
        .iter()
        .map(|(k, _)| k)
        .find(|k| k.as_slice() != b"Off")
        .cloned()
}

fn catalog(doc: &Document) -> Result<&Dictionary, String> {
    doc.trailer
        .get(b"Root")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
        .ok_or_else(|| "document has no catalog".to_string())
}

fn acroform(doc: &Document) -> Result<&Dictionary, String> {
    let entry = catalog(doc)?
        .get(b"AcroForm")
        .map_err(|_| "document has no AcroForm (not a fillable form)".to_string())?;
    resolve(doc, entry)
        .and_then(|o| o.as_dict().ok())
        .ok_or_else(|| "AcroForm entry is not a dictionary".to_string())
}

/// Whether the catalog has an `/AcroForm` entry at all.
pub(crate) fn has_acroform(doc: &Document) -> Result<bool, String> {
    Ok(catalog(doc)?.has(b"AcroForm"))
}

/// Ask viewers to regenerate field appearances from the new values.
pub(crate) fn set_need_appearances(doc: &mut Document) -> Result<(), String> {
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| "document catalog is not an indirect object".to_string())?;
    let form_ref = doc
        .get_dictionary(root_id)
        .map_err(|e| format!("cannot read catalog: {e}"))?
        .get(b"AcroForm")
        .ok()
        .and_then(|o| o.as_reference().ok());

    let form = match form_ref {
        Some(id) => doc.get_dictionary_mut(id),
        None => doc
            .get_dictionary_mut(root_id)
            .and_then(|c| c.get_mut(b"AcroForm"))
            .and_then(Object::as_dict_mut),
    }
    .map_err(|e| format!("cannot update AcroForm: {e}"))?;

    form.set("NeedAppearances", Object::Boolean(true));
    Ok(())
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, else UTF-8, else Latin-1.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Encode a value as a PDF text string; non-ASCII goes out as UTF-16BE.
pub(crate) fn encode_text(value: &str) -> Object {
    if value.is_ascii() {
        return Object::String(value.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{
        build_form, checkbox, parent, push_button, radio, signature, text_field,
    };

    fn names(bytes: &[u8]) -> Vec<(String, FieldKind)> {
        let doc = Document::load_mem(bytes).unwrap();
        collect_fields(&doc)
            .unwrap()
            .into_iter()
            .map(|f| (f.name, f.kind))
            .collect()
    }

    #[test]
    fn flat_and_nested_names() {
        let pdf = build_form(|doc| {
            let first = text_field(doc, "first_name");
            let city = text_field(doc, "city");
            let zip = text_field(doc, "zip");
            let addr = parent(doc, "address", vec![city, zip]);
            vec![first, addr]
        });
        assert_eq!(
            names(&pdf),
            vec![
                ("first_name".to_string(), FieldKind::Text),
                ("address.city".to_string(), FieldKind::Text),
                ("address.zip".to_string(), FieldKind::Text),
            ]
        );
    }

    #[test]
    fn buttons_are_classified_and_signatures_skipped() {
        let pdf = build_form(|doc| {
            vec![
                checkbox(doc, "agree", "Yes"),
                radio(doc, "sex", &["M", "F"]),
                push_button(doc, "submit"),
                signature(doc, "signed_by"),
            ]
        });
        assert_eq!(
            names(&pdf),
            vec![
                ("agree".to_string(), FieldKind::CheckBox),
                ("sex".to_string(), FieldKind::Radio),
            ]
        );
    }

    #[test]
    fn widgets_carry_on_states() {
        let pdf = build_form(|doc| vec![radio(doc, "sex", &["M", "F"])]);
        let doc = Document::load_mem(&pdf).unwrap();
        let fields = collect_fields(&doc).unwrap();
        let states: Vec<Option<Vec<u8>>> =
            fields[0].widgets.iter().map(|w| w.on_state.clone()).collect();
        assert_eq!(states, vec![Some(b"M".to_vec()), Some(b"F".to_vec())]);
    }

    #[test]
    fn text_round_trip_through_pdf_strings() {
        for value in ["Juan Dela Cruz", "Peña, José"] {
            let Object::String(bytes, _) = encode_text(value) else {
                panic!("not a string");
            };
            assert_eq!(decode_text(&bytes), value);
        }
    }

    #[test]
    fn document_without_form_is_an_error() {
        let mut doc = Document::with_version("1.5");
        let catalog = doc.add_object(lopdf::dictionary! { "Type" => "Catalog" });
        doc.trailer.set("Root", catalog);
        assert!(collect_fields(&doc).unwrap_err().contains("no AcroForm"));
    }
}
