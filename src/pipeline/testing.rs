//! In-memory AcroForm fixtures for unit tests.

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Build a one-page PDF whose AcroForm `Fields` are the ids `fields` returns.
pub(crate) fn build_form(fields: impl FnOnce(&mut Document) -> Vec<ObjectId>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let roots = fields(&mut doc);

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1_i64,
        }),
    );
    let acroform_id = doc.add_object(dictionary! {
        "Fields" => roots.into_iter().map(Object::Reference).collect::<Vec<_>>(),
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acroform_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("failed to save test PDF");
    buf
}

/// A valid PDF with a catalog but no AcroForm.
pub(crate) fn flat_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog" });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("failed to save test PDF");
    buf
}

pub(crate) fn text_field(doc: &mut Document, name: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => Object::string_literal(name),
        "Rect" => vec![0.into(), 0.into(), 100.into(), 20.into()],
    })
}

pub(crate) fn parent(doc: &mut Document, name: &str, kids: Vec<ObjectId>) -> ObjectId {
    let id = doc.add_object(dictionary! {
        "T" => Object::string_literal(name),
        "Kids" => kids.iter().copied().map(Object::Reference).collect::<Vec<_>>(),
    });
    for kid in kids {
        if let Ok(d) = doc.get_dictionary_mut(kid) {
            d.set("Parent", id);
        }
    }
    id
}

fn appearance(doc: &mut Document, on: &str) -> Object {
    let on_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
    let off_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
    let mut normal = lopdf::Dictionary::new();
    normal.set(on, on_id);
    normal.set("Off", off_id);
    Object::Dictionary(dictionary! { "N" => Object::Dictionary(normal) })
}

pub(crate) fn checkbox(doc: &mut Document, name: &str, on: &str) -> ObjectId {
    let ap = appearance(doc, on);
    doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Btn",
        "T" => Object::string_literal(name),
        "AS" => "Off",
        "AP" => ap,
    })
}

pub(crate) fn radio(doc: &mut Document, name: &str, options: &[&str]) -> ObjectId {
    let mut kids = Vec::new();
    for option in options {
        let ap = appearance(doc, option);
        kids.push(doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "AS" => "Off",
            "AP" => ap,
        }));
    }
    let id = doc.add_object(dictionary! {
        "FT" => "Btn",
        "Ff" => 1_i64 << 15,
        "T" => Object::string_literal(name),
        "Kids" => kids.iter().copied().map(Object::Reference).collect::<Vec<_>>(),
    });
    for kid in kids {
        if let Ok(d) = doc.get_dictionary_mut(kid) {
            d.set("Parent", id);
        }
    }
    id
}

pub(crate) fn push_button(doc: &mut Document, name: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "FT" => "Btn",
        "Ff" => 1_i64 << 16,
        "T" => Object::string_literal(name),
    })
}

pub(crate) fn signature(doc: &mut Document, name: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "FT" => "Sig",
        "T" => Object::string_literal(name),
    })
}

/// A form of plain text fields, in order.
pub(crate) fn text_form(names: &[&str]) -> Vec<u8> {
    build_form(|doc| names.iter().map(|n| text_field(doc, n)).collect())
}
