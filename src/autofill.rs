//! Pipeline Orchestrator: the auto-fill and complete-fill entry points.
//!
//! [`AutoFiller::auto_fill`] runs the whole pipeline: extraction and schema
//! inspection concurrently (they share no data), then reconciliation, then
//! the filler on the plan's `filled_fields`. A degraded reconciliation still
//! produces a document, unfilled, with every field reported missing.
//!
//! [`AutoFiller::complete_fill`] is the recovery path for those missing
//! fields: the caller supplies values and the filler runs directly.
//!
//! Everything a run allocates (decoded image, template bytes, the filled
//! PDF) lives in memory and is dropped when the call returns, on every path.

use crate::config::{FormFillConfig, OracleConfig};
use crate::error::FormFillError;
use crate::model::{
    coerce_value, AutoFillOutput, AutoFillReport, AutoFillStats, ExtractedFieldSet,
    FilledFormResult, FormSchema,
};
use crate::oracle::Oracles;
use crate::pipeline::extract::{extract_fields, Extraction};
use crate::pipeline::fill::fill_form;
use crate::pipeline::input::{load_template, DocumentSource, LoadedTemplate, TemplateSource};
use crate::pipeline::reconcile::reconcile_fields;
use crate::pipeline::schema::inspect_schema;
use crate::progress::Stage;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs the pipeline with one pair of oracles and one configuration.
///
/// Holds no per-request state, so one instance can serve concurrent calls.
#[derive(Clone)]
pub struct AutoFiller {
    oracles: Oracles,
    config: FormFillConfig,
}

impl std::fmt::Debug for AutoFiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoFiller")
            .field("understander", &self.oracles.understander.name())
            .field("reconciler", &self.oracles.reconciler.name())
            .field("config", &self.config)
            .finish()
    }
}

impl AutoFiller {
    pub fn new(oracles: Oracles, config: FormFillConfig) -> Self {
        Self { oracles, config }
    }

    /// Build both oracles from `oracle_config`.
    pub fn from_config(
        oracle_config: &OracleConfig,
        config: FormFillConfig,
    ) -> Result<Self, FormFillError> {
        Ok(Self::new(Oracles::from_config(oracle_config)?, config))
    }

    pub fn config(&self) -> &FormFillConfig {
        &self.config
    }

    /// Extract, inspect, reconcile and fill.
    ///
    /// # Errors
    /// Fails fast when extraction fails (nothing to reconcile), when the
    /// template cannot be loaded or read as a form, and when filling fails.
    /// A failed or unparseable reconciliation is not an error: the report
    /// then has `degraded` set, no filled fields, and every field missing.
    pub async fn auto_fill(
        &self,
        document: &DocumentSource,
        template: &TemplateSource,
    ) -> Result<AutoFillOutput, FormFillError> {
        let total_start = Instant::now();
        info!(
            "Starting auto-fill: document '{}', template '{}'",
            document.label(),
            template.label()
        );

        // ── Step 1+2: Extract and inspect concurrently ──────────────────────
        let extraction = async {
            self.stage_start(Stage::Extract);
            let start = Instant::now();
            let result =
                extract_fields(self.oracles.understander.as_ref(), document, &self.config).await;
            let ms = start.elapsed().as_millis() as u64;
            if result.is_ok() {
                self.stage_complete(Stage::Extract, ms);
            }
            (result, ms)
        };
        let inspection = async {
            self.stage_start(Stage::Inspect);
            let start = Instant::now();
            let result = match self.load(template).await {
                Ok(loaded) => inspect_schema(&loaded).await.map(|schema| (loaded, schema)),
                Err(e) => Err(e),
            };
            let ms = start.elapsed().as_millis() as u64;
            if result.is_ok() {
                self.stage_complete(Stage::Inspect, ms);
            }
            (result, ms)
        };
        let ((extracted, extraction_ms), (inspected, inspection_ms)) =
            tokio::join!(extraction, inspection);

        let Extraction {
            fields: extracted,
            input_tokens: extract_in,
            output_tokens: extract_out,
        } = extracted?;
        let (loaded, schema) = inspected?;
        debug!(
            "{} extracted fields, {} form fields",
            extracted.len(),
            schema.len()
        );

        // ── Step 3: Reconcile ────────────────────────────────────────────────
        self.stage_start(Stage::Reconcile);
        let start = Instant::now();
        let reconciliation = reconcile_fields(
            self.oracles.reconciler.as_ref(),
            &extracted,
            &schema,
            &self.config,
        )
        .await;
        let reconciliation_ms = start.elapsed().as_millis() as u64;
        let plan = reconciliation.plan;
        if let Some(reason) = &plan.degraded {
            if let Some(cb) = &self.config.progress_callback {
                cb.on_degraded(reason);
            }
        }
        self.stage_complete(Stage::Reconcile, reconciliation_ms);

        // ── Step 4: Fill ─────────────────────────────────────────────────────
        self.stage_start(Stage::Fill);
        let start = Instant::now();
        let filled = fill_form(&loaded, &plan.filled_fields).await?;
        let fill_ms = start.elapsed().as_millis() as u64;
        self.stage_complete(Stage::Fill, fill_ms);

        if !filled.dropped_fields.is_empty() {
            warn!(
                "Template rejected {} planned values: {:?}",
                filled.dropped_fields.len(),
                filled.dropped_fields.keys().collect::<Vec<_>>()
            );
        }

        // Anything the template refused is still empty in the output.
        let missing_fields: Vec<String> = schema
            .names()
            .into_iter()
            .filter(|name| !filled.filled_fields.contains_key(name))
            .collect();

        let stats = AutoFillStats {
            extraction_ms,
            inspection_ms,
            reconciliation_ms,
            fill_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
            input_tokens: extract_in + reconciliation.input_tokens,
            output_tokens: extract_out + reconciliation.output_tokens,
        };

        let report = AutoFillReport {
            template: loaded.name.clone(),
            document: document.label(),
            extracted_data: extracted,
            mappings: plan.mappings,
            filled_fields: filled.filled_fields,
            missing_fields,
            dropped_fields: filled.dropped_fields,
            degraded: plan.degraded,
            stats,
        };

        info!("{} ({}ms total)", report.message(), report.stats.total_ms);

        Ok(AutoFillOutput {
            document: filled.document,
            report,
        })
    }

    /// Run [`auto_fill`](Self::auto_fill) and write the PDF to `output_path`.
    pub async fn auto_fill_to_file(
        &self,
        document: &DocumentSource,
        template: &TemplateSource,
        output_path: impl AsRef<Path>,
    ) -> Result<AutoFillReport, FormFillError> {
        let output = self.auto_fill(document, template).await?;
        output.document.write_to(output_path).await?;
        Ok(output.report)
    }

    /// Synchronous wrapper around [`auto_fill`](Self::auto_fill).
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn auto_fill_sync(
        &self,
        document: &DocumentSource,
        template: &TemplateSource,
    ) -> Result<AutoFillOutput, FormFillError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| FormFillError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.auto_fill(document, template))
    }

    /// Fill `template` with caller-supplied values, skipping extraction and
    /// reconciliation.
    ///
    /// Values are coerced to strings; null, `false` and blank values count as
    /// not provided. Names the template lacks come back in `dropped_fields`.
    pub async fn complete_fill(
        &self,
        template: &TemplateSource,
        values: &Map<String, Value>,
    ) -> Result<FilledFormResult, FormFillError> {
        let loaded = self.load(template).await?;
        let values: BTreeMap<String, String> = values
            .iter()
            .filter_map(|(k, v)| coerce_value(v).map(|v| (k.clone(), v)))
            .collect();
        info!(
            "Completing '{}' with {} manual values",
            loaded.name,
            values.len()
        );
        fill_form(&loaded, &values).await
    }

    /// The template's fillable fields, without touching any oracle.
    pub async fn list_fields(&self, template: &TemplateSource) -> Result<FormSchema, FormFillError> {
        let loaded = self.load(template).await?;
        inspect_schema(&loaded).await
    }

    /// Run only the Field Extractor.
    pub async fn extract(&self, document: &DocumentSource) -> Result<ExtractedFieldSet, FormFillError> {
        let extraction =
            extract_fields(self.oracles.understander.as_ref(), document, &self.config).await?;
        Ok(extraction.fields)
    }

    async fn load(&self, template: &TemplateSource) -> Result<LoadedTemplate, FormFillError> {
        load_template(
            template,
            self.config.forms_dir.as_deref(),
            self.config.download_timeout_secs,
        )
        .await
    }

    fn stage_start(&self, stage: Stage) {
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage_start(stage);
        }
    }

    fn stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage_complete(stage, elapsed_ms);
        }
    }
}
