//! End-to-end pipeline tests with scripted oracles and in-memory forms.
//!
//! No network access or API key is needed: the vision and reasoning oracles
//! are test doubles that return canned replies, and every template is a
//! small AcroForm built with lopdf.

use async_trait::async_trait;
use edgequake_formfill::pipeline::fill::read_values;
use edgequake_formfill::{
    AutoFillProgressCallback, AutoFiller, DocumentSource, DocumentUnderstander, FieldReconciler,
    FormFillConfig, FormFillError, OracleError, OracleReply, Oracles, ReasoningRequest, Stage,
    TemplateSource, VisionRequest,
};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn form_pdf(names: &[&str]) -> Vec<u8> {
    form_pdf_with(|doc| names.iter().map(|name| text_field(doc, name)).collect())
}

fn text_field(doc: &mut Document, name: &str) -> Object {
    doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => Object::string_literal(name),
        "Rect" => vec![0.into(), 0.into(), 100.into(), 20.into()],
    })
    .into()
}

/// A radio group with one widget per option.
fn radio_field(doc: &mut Document, name: &str, options: &[&str]) -> Object {
    let kids: Vec<Object> = options
        .iter()
        .map(|option| {
            let on = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            let off = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            let mut normal = Dictionary::new();
            normal.set(*option, on);
            normal.set("Off", off);
            doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "AS" => "Off",
                "AP" => dictionary! { "N" => normal },
            })
            .into()
        })
        .collect();
    let id = doc.add_object(dictionary! {
        "FT" => "Btn",
        "Ff" => 1_i64 << 15,
        "T" => Object::string_literal(name),
        "Kids" => kids.clone(),
    });
    for kid in kids {
        if let Ok(kid) = kid.as_reference() {
            if let Ok(d) = doc.get_dictionary_mut(kid) {
                d.set("Parent", id);
            }
        }
    }
    id.into()
}

fn form_pdf_with(fields: impl FnOnce(&mut Document) -> Vec<Object>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let fields = fields(&mut doc);
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
    let acroform_id = doc.add_object(dictionary! { "Fields" => fields });
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

fn upload(names: &[&str]) -> TemplateSource {
    TemplateSource::Upload {
        file_name: "clearance.pdf".into(),
        bytes: form_pdf(names),
    }
}

fn id_card() -> DocumentSource {
    DocumentSource::Url("https://cdn.example/id_card.jpg".into())
}

struct ScriptedVision {
    reply: Result<String, OracleError>,
    calls: AtomicUsize,
}

impl ScriptedVision {
    fn replying(value: Value) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(format!("```json\n{value}\n```")),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err(OracleError::Api {
                oracle: "vision".into(),
                status: 401,
                body: "invalid api key".into(),
            }),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DocumentUnderstander for ScriptedVision {
    fn name(&self) -> &str {
        "scripted-vision"
    }

    async fn understand(&self, _: &VisionRequest) -> Result<OracleReply, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map(|content| OracleReply {
            content,
            input_tokens: 1200,
            output_tokens: 80,
        })
    }
}

struct ScriptedReasoning {
    reply: Result<String, OracleError>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedReasoning {
    fn replying(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl FieldReconciler for ScriptedReasoning {
    fn name(&self) -> &str {
        "scripted-reasoning"
    }

    async fn reconcile(&self, request: &ReasoningRequest) -> Result<OracleReply, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.user.clone());
        self.reply.clone().map(|content| OracleReply {
            content,
            input_tokens: 600,
            output_tokens: 150,
        })
    }
}

fn filler(vision: Arc<ScriptedVision>, reasoning: Arc<ScriptedReasoning>) -> AutoFiller {
    AutoFiller::new(Oracles::new(vision, reasoning), FormFillConfig::default())
}

fn juan_extraction() -> Value {
    json!({
        "full_name": "Juan Dela Cruz",
        "id_number": null,
        "address": "123 Mabuhay St"
    })
}

fn juan_mapping() -> String {
    json!({
        "mappings": [
            {"kind": "single_to_multiple", "source_field": "full_name", "value": "Juan Dela Cruz",
             "targets": [{"field": "first_name", "value": "Juan"}, {"field": "last_name", "value": "Dela Cruz"}]},
            {"kind": "single_to_single", "source_field": "address",
             "target_field": "complete_address", "value": "123 Mabuhay St"}
        ],
        "filled_fields": {"first_name": "Juan", "last_name": "Dela Cruz", "complete_address": "123 Mabuhay St"},
        "missing_fields": ["zip_code"]
    })
    .to_string()
}

const JUAN_FORM: &[&str] = &["first_name", "last_name", "complete_address", "zip_code"];

// ── Auto-fill ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn auto_fill_juan_dela_cruz() {
    let vision = ScriptedVision::replying(juan_extraction());
    let reasoning = ScriptedReasoning::replying(juan_mapping());
    let out = filler(vision.clone(), reasoning.clone())
        .auto_fill(&id_card(), &upload(JUAN_FORM))
        .await
        .unwrap();

    let report = &out.report;
    assert_eq!(report.filled_fields["first_name"], "Juan");
    assert_eq!(report.filled_fields["last_name"], "Dela Cruz");
    assert_eq!(report.filled_fields["complete_address"], "123 Mabuhay St");
    assert_eq!(report.missing_fields, vec!["zip_code"]);
    assert_eq!(report.extracted_data.get("full_name"), Some("Juan Dela Cruz"));
    assert!(report.degraded.is_none());
    assert_eq!(
        report.message(),
        "PDF filled with 3 fields. 1 fields need manual input."
    );
    assert_eq!(report.stats.input_tokens, 1800);
    assert_eq!(report.stats.output_tokens, 230);

    assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    assert_eq!(reasoning.calls.load(Ordering::SeqCst), 1);
    let prompt = &reasoning.prompts.lock().unwrap()[0];
    assert!(prompt.contains("\"zip_code\""));
    assert!(prompt.contains("Juan Dela Cruz"));

    assert_eq!(out.document.file_name, "filled_clearance.pdf");
    let written = read_values(&out.document.bytes).unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(written["last_name"], "Dela Cruz");
}

#[tokio::test]
async fn completeness_and_disjointness_hold() {
    let out = filler(
        ScriptedVision::replying(juan_extraction()),
        ScriptedReasoning::replying(juan_mapping()),
    )
    .auto_fill(&id_card(), &upload(JUAN_FORM))
    .await
    .unwrap();

    let report = out.report;
    for name in JUAN_FORM {
        let filled = report.filled_fields.contains_key(*name);
        let missing = report.missing_fields.iter().any(|m| m == name);
        assert!(filled ^ missing, "{name} must be exactly one of filled/missing");
    }
    assert_eq!(
        report.filled_fields.len() + report.missing_fields.len(),
        JUAN_FORM.len()
    );
}

#[tokio::test]
async fn unparseable_mapping_still_returns_a_document() {
    let out = filler(
        ScriptedVision::replying(juan_extraction()),
        ScriptedReasoning::replying("I'm sorry, I can only answer in prose."),
    )
    .auto_fill(&id_card(), &upload(JUAN_FORM))
    .await
    .unwrap();

    assert!(out.report.filled_fields.is_empty());
    assert!(out.report.mappings.is_empty());
    assert_eq!(out.report.missing_fields, JUAN_FORM);
    assert!(out.report.degraded.is_some());
    assert!(read_values(&out.document.bytes).unwrap().is_empty());
}

#[tokio::test]
async fn extraction_failure_fails_fast() {
    let reasoning = ScriptedReasoning::replying(juan_mapping());
    let err = filler(ScriptedVision::failing(), reasoning.clone())
        .auto_fill(&id_card(), &upload(JUAN_FORM))
        .await
        .unwrap_err();

    match err {
        FormFillError::Extraction(e) => {
            assert_eq!(e.document, "https://cdn.example/id_card.jpg");
            assert!(e.message.contains("401"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(reasoning.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn template_without_form_is_schema_error() {
    let mut doc = Document::with_version("1.5");
    let catalog = doc.add_object(dictionary! { "Type" => "Catalog" });
    doc.trailer.set("Root", catalog);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();

    let err = filler(
        ScriptedVision::replying(juan_extraction()),
        ScriptedReasoning::replying(juan_mapping()),
    )
    .auto_fill(
        &id_card(),
        &TemplateSource::Upload {
            file_name: "flat.pdf".into(),
            bytes,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FormFillError::SchemaRead { .. }));
}

#[tokio::test]
async fn numbered_variants_are_replicated() {
    let vision = ScriptedVision::replying(json!({"full_name": "Juan Dela Cruz", "age": "34"}));
    // The oracle ignores the numbered-variant instruction entirely.
    let reasoning = ScriptedReasoning::replying(
        json!({
            "mappings": [
                {"kind": "single_to_single", "source_field": "age", "target_field": "age", "value": "34"}
            ],
            "filled_fields": {"age": "34"},
            "missing_fields": ["age_2", "age_3"]
        })
        .to_string(),
    );
    let out = filler(vision, reasoning)
        .auto_fill(&id_card(), &upload(&["age", "age_2", "age_3"]))
        .await
        .unwrap();

    assert_eq!(out.report.filled_fields["age_2"], "34");
    assert_eq!(out.report.filled_fields["age_3"], "34");
    assert!(out.report.missing_fields.is_empty());
}

#[tokio::test]
async fn values_the_template_refuses_are_reported_missing() {
    let vision = ScriptedVision::replying(json!({"full_name": "Juan", "blood_type": "O"}));
    let reasoning = ScriptedReasoning::replying(
        json!({
            "mappings": [
                {"kind": "single_to_single", "source_field": "full_name", "target_field": "name", "value": "Juan"},
                {"kind": "single_to_single", "source_field": "blood_type", "target_field": "blood", "value": "O"}
            ],
            "filled_fields": {"name": "Juan", "blood": "O"},
            "missing_fields": []
        })
        .to_string(),
    );
    let template = TemplateSource::Upload {
        file_name: "medical.pdf".into(),
        bytes: form_pdf_with(|doc| {
            vec![text_field(doc, "name"), radio_field(doc, "blood", &["A", "B"])]
        }),
    };
    let out = filler(vision, reasoning)
        .auto_fill(&id_card(), &template)
        .await
        .unwrap();

    let report = &out.report;
    assert_eq!(report.filled_fields.len(), 1);
    assert_eq!(report.filled_fields["name"], "Juan");
    assert_eq!(report.missing_fields, vec!["blood"]);
    assert_eq!(report.dropped_fields["blood"], "O");
    assert_eq!(
        report.message(),
        "PDF filled with 1 fields. 1 fields need manual input."
    );
}

#[tokio::test]
async fn progress_events_cover_every_stage() {
    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl AutoFillProgressCallback for Events {
        fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
            self.0.lock().unwrap().push(stage.to_string());
        }
        fn on_degraded(&self, _reason: &str) {
            self.0.lock().unwrap().push("degraded".into());
        }
    }

    let events = Arc::new(Events::default());
    let config = FormFillConfig::builder()
        .progress_callback(events.clone())
        .build()
        .unwrap();
    let filler = AutoFiller::new(
        Oracles::new(
            ScriptedVision::replying(juan_extraction()),
            ScriptedReasoning::replying("not json"),
        ),
        config,
    );
    filler
        .auto_fill(&id_card(), &upload(JUAN_FORM))
        .await
        .unwrap();

    let mut seen = events.0.lock().unwrap().clone();
    // extract and inspect run concurrently
    seen[..2].sort();
    assert_eq!(seen, vec!["extract", "inspect", "degraded", "reconcile", "fill"]);
}

#[tokio::test]
async fn auto_fill_to_file_writes_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("filled.pdf");
    let report = filler(
        ScriptedVision::replying(juan_extraction()),
        ScriptedReasoning::replying(juan_mapping()),
    )
    .auto_fill_to_file(&id_card(), &upload(JUAN_FORM), &path)
    .await
    .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(read_values(&bytes).unwrap(), report.filled_fields);
}

// ── Complete-fill and field listing ─────────────────────────────────────────

fn offline() -> AutoFiller {
    filler(
        ScriptedVision::failing(),
        ScriptedReasoning::replying("unused"),
    )
}

#[tokio::test]
async fn complete_fill_drops_unknown_fields() {
    let mut values = Map::new();
    values.insert("unknown_field".into(), json!("x"));
    let result = offline()
        .complete_fill(&upload(&["name"]), &values)
        .await
        .unwrap();

    assert!(result.filled_fields.is_empty());
    assert_eq!(result.dropped_fields.len(), 1);
    assert_eq!(result.dropped_fields["unknown_field"], "x");
}

#[tokio::test]
async fn complete_fill_coerces_and_skips_falsy_values() {
    let mut values = Map::new();
    values.insert("zip_code".into(), json!(1100));
    values.insert("first_name".into(), json!(""));
    values.insert("last_name".into(), Value::Null);
    values.insert("complete_address".into(), json!(false));
    let result = offline()
        .complete_fill(&upload(JUAN_FORM), &values)
        .await
        .unwrap();

    assert_eq!(result.filled_fields.len(), 1);
    assert_eq!(result.filled_fields["zip_code"], "1100");
    assert!(result.dropped_fields.is_empty());
}

#[tokio::test]
async fn complete_fill_is_idempotent() {
    let mut values = Map::new();
    values.insert("first_name".into(), json!("Juan"));
    values.insert("nickname".into(), json!("JDC"));
    let template = upload(JUAN_FORM);

    let a = offline().complete_fill(&template, &values).await.unwrap();
    let b = offline().complete_fill(&template, &values).await.unwrap();
    assert_eq!(a.filled_fields, b.filled_fields);
    assert_eq!(a.dropped_fields, b.dropped_fields);
    assert_eq!(
        read_values(&a.document.bytes).unwrap(),
        read_values(&b.document.bytes).unwrap()
    );
}

#[tokio::test]
async fn list_fields_is_stable_and_unique() {
    let template = upload(&["first_name", "age", "first_name", "age_2"]);
    let first = offline().list_fields(&template).await.unwrap();
    let second = offline().list_fields(&template).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.names(), vec!["first_name", "age", "age_2"]);
}

#[tokio::test]
async fn named_templates_resolve_inside_forms_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("clearance.pdf"), form_pdf(&["name"])).unwrap();
    let config = FormFillConfig::builder()
        .forms_dir(dir.path())
        .build()
        .unwrap();
    let filler = AutoFiller::new(
        Oracles::new(
            ScriptedVision::failing(),
            ScriptedReasoning::replying("unused"),
        ),
        config,
    );

    let schema = filler
        .list_fields(&TemplateSource::Named("clearance.pdf".into()))
        .await
        .unwrap();
    assert_eq!(schema.names(), vec!["name"]);

    let err = filler
        .list_fields(&TemplateSource::Named("../clearance.pdf".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, FormFillError::InvalidTemplateName { .. }));
}
