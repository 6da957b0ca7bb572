//! CLI binary for edgequake-formfill.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `FormFillConfig` / `OracleConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_formfill::config::{DEFAULT_ENDPOINT, DEFAULT_REASONING_MODEL, DEFAULT_VISION_MODEL};
use edgequake_formfill::{
    AutoFillProgressCallback, AutoFiller, DocumentSource, FormFillConfig, OracleBackend,
    OracleConfig, ProgressCallback, Stage, TemplateSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per finished stage. Extraction and inspection
/// run concurrently, so their lines may come in either order.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Auto-fill");
        bar.set_message("starting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Extract => "reading document",
        Stage::Inspect => "reading form fields",
        Stage::Reconcile => "matching fields",
        Stage::Fill => "filling form",
    }
}

impl AutoFillProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{}…", stage_label(stage)));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<20} {}",
            green("✓"),
            stage_label(stage),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_degraded(&self, reason: &str) {
        let msg = if reason.chars().count() > 80 {
            format!("{}…", reason.chars().take(79).collect::<String>())
        } else {
            reason.to_string()
        };
        self.bar
            .println(format!("  {} matching degraded: {}", yellow("⚠"), msg));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List the fillable fields of a form (no API key needed)
  formfill fields clearance_form.pdf

  # Read an ID photo and fill the form
  formfill auto id_card.jpg clearance_form.pdf -o filled.pdf

  # Same, with a form from the forms directory and a JSON report
  formfill --forms-dir ./forms auto id_card.jpg clearance_form.pdf --named -o filled.pdf --json

  # Fill the fields auto-fill reported missing
  formfill complete clearance_form.pdf -o filled.pdf --set zip_code=1100 --set age_2=34

  # Only extract fields from a document
  formfill extract https://example.com/id_card.png

ENVIRONMENT VARIABLES:
  FORMFILL_API_KEY          API key for the OpenAI-compatible endpoint
  FORMFILL_ENDPOINT         Endpoint base URL (default: DashScope international)
  FORMFILL_PROVIDER         Use an edgequake-llm provider instead (openai, anthropic, gemini, ollama)
  FORMFILL_VISION_MODEL     Vision model (default: qwen-vl-max)
  FORMFILL_REASONING_MODEL  Reasoning model (default: qwen-plus)
  FORMFILL_FORMS_DIR        Directory for --named templates
"#;

/// Fill PDF forms from a photographed ID using vision and reasoning LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "formfill",
    version,
    about = "Fill PDF forms from a photographed ID using vision and reasoning LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    oracle: OracleArgs,

    /// Directory that --named templates are resolved against.
    #[arg(long, global = true, env = "FORMFILL_FORMS_DIR")]
    forms_dir: Option<PathBuf>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "FORMFILL_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max tokens per oracle reply.
    #[arg(long, global = true, env = "FORMFILL_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Per-oracle-call timeout in seconds.
    #[arg(long, global = true, env = "FORMFILL_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout for URL templates in seconds.
    #[arg(long, global = true, env = "FORMFILL_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Do not copy base values into empty `_2`, `_3`, … fields.
    #[arg(long, global = true)]
    no_variant_replication: bool,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, global = true, env = "FORMFILL_EXTRACTION_PROMPT")]
    extraction_prompt: Option<PathBuf>,

    /// Output structured JSON instead of a human summary.
    #[arg(long, global = true, env = "FORMFILL_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FORMFILL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FORMFILL_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct OracleArgs {
    /// OpenAI-compatible endpoint base URL.
    #[arg(long, global = true, env = "FORMFILL_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// API key for the endpoint.
    #[arg(long, global = true, env = "FORMFILL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ollama, …)
    /// instead of the OpenAI-compatible endpoint.
    #[arg(long, global = true, env = "FORMFILL_PROVIDER")]
    provider: Option<String>,

    /// Vision model that reads the document.
    #[arg(long, global = true, env = "FORMFILL_VISION_MODEL", default_value = DEFAULT_VISION_MODEL)]
    vision_model: String,

    /// Reasoning model that maps fields.
    #[arg(long, global = true, env = "FORMFILL_REASONING_MODEL", default_value = DEFAULT_REASONING_MODEL)]
    reasoning_model: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a form's fillable fields.
    Fields {
        /// Local PDF path or HTTP/HTTPS URL (or a name with --named).
        template: String,

        /// Resolve TEMPLATE inside --forms-dir.
        #[arg(long)]
        named: bool,
    },

    /// Extract fields from a document image.
    Extract {
        /// Local image path or HTTP/HTTPS URL.
        document: String,
    },

    /// Extract, match and fill in one go.
    Auto {
        /// Local image path or HTTP/HTTPS URL.
        document: String,

        /// Local PDF path or HTTP/HTTPS URL (or a name with --named).
        template: String,

        /// Resolve TEMPLATE inside --forms-dir.
        #[arg(long)]
        named: bool,

        /// Where to write the filled PDF.
        #[arg(short, long)]
        output: PathBuf,

        /// Disable the progress spinner.
        #[arg(long, env = "FORMFILL_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Fill a form with values you supply.
    Complete {
        /// Local PDF path or HTTP/HTTPS URL (or a name with --named).
        template: String,

        /// Resolve TEMPLATE inside --forms-dir.
        #[arg(long)]
        named: bool,

        /// Where to write the filled PDF.
        #[arg(short, long)]
        output: PathBuf,

        /// A field value as NAME=VALUE. Repeatable.
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// JSON file with a flat object of field values.
        #[arg(long)]
        values: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback that matters; keep INFO logs out of
    // its way unless asked for.
    let spinner = matches!(cli.command, Command::Auto { no_progress: false, .. })
        && !cli.quiet
        && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Fields { template, named } => {
            let config = build_config(&cli, None).await?;
            // Listing fields needs no oracle; build the filler offline.
            let filler = AutoFiller::new(offline_oracles(), config);
            let schema = filler
                .list_fields(&template_source(template, *named))
                .await
                .context("Failed to read form fields")?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&schema).context("Failed to serialise fields")?
                );
            } else {
                for field in schema.fields() {
                    println!("{:<40} {}", field.name, dim(&format!("{:?}", field.kind)));
                }
                if !cli.quiet {
                    eprintln!("{} fillable fields", bold(&schema.len().to_string()));
                }
            }
        }

        Command::Extract { document } => {
            let config = build_config(&cli, None).await?;
            let filler = AutoFiller::from_config(&oracle_config(&cli.oracle), config)
                .context("Failed to set up oracles")?;
            let fields = filler
                .extract(&DocumentSource::parse(document))
                .await
                .context("Extraction failed")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&fields).context("Failed to serialise fields")?
            );
        }

        Command::Auto {
            document,
            template,
            named,
            output,
            ..
        } => {
            let progress = spinner.then(CliProgressCallback::new);
            let config = build_config(
                &cli,
                progress
                    .clone()
                    .map(|cb| cb as Arc<dyn AutoFillProgressCallback>),
            )
            .await?;
            let filler = AutoFiller::from_config(&oracle_config(&cli.oracle), config)
                .context("Failed to set up oracles")?;

            let result = filler
                .auto_fill_to_file(
                    &DocumentSource::parse(document),
                    &template_source(template, *named),
                    output,
                )
                .await;
            if let Some(cb) = &progress {
                cb.finish();
            }
            let report = result.context("Auto-fill failed")?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else if !cli.quiet {
                let mark = if report.missing_fields.is_empty() {
                    green("✔")
                } else {
                    yellow("⚠")
                };
                eprintln!(
                    "{}  {}  →  {}",
                    mark,
                    report.message(),
                    bold(&output.display().to_string())
                );
                for field in &report.missing_fields {
                    eprintln!("   {} {}", dim("missing:"), field);
                }
                if let Some(reason) = &report.degraded {
                    eprintln!("   {} {}", yellow("degraded:"), reason);
                }
                eprintln!(
                    "   {} tokens in  /  {} tokens out  —  {}ms total",
                    dim(&report.stats.input_tokens.to_string()),
                    dim(&report.stats.output_tokens.to_string()),
                    report.stats.total_ms,
                );
            }
        }

        Command::Complete {
            template,
            named,
            output,
            set,
            values,
        } => {
            let config = build_config(&cli, None).await?;
            let filler = AutoFiller::new(offline_oracles(), config);
            let values = collect_values(set, values.as_ref()).await?;

            let result = filler
                .complete_fill(&template_source(template, *named), &values)
                .await
                .context("Fill failed")?;
            result
                .document
                .write_to(output)
                .await
                .context("Failed to write filled PDF")?;

            if cli.json {
                let summary = serde_json::json!({
                    "file_name": result.document.file_name,
                    "filled_fields": result.filled_fields,
                    "dropped_fields": result.dropped_fields,
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summary).context("Failed to serialise result")?
                );
            } else if !cli.quiet {
                eprintln!(
                    "{}  {} fields filled  →  {}",
                    green("✔"),
                    result.filled_fields.len(),
                    bold(&output.display().to_string())
                );
                for name in result.dropped_fields.keys() {
                    eprintln!("   {} {}", yellow("not in form:"), name);
                }
            }
        }
    }

    Ok(())
}

fn template_source(input: &str, named: bool) -> TemplateSource {
    if named {
        TemplateSource::Named(input.to_string())
    } else {
        TemplateSource::parse(input)
    }
}

fn oracle_config(args: &OracleArgs) -> OracleConfig {
    let backend = match &args.provider {
        Some(name) => OracleBackend::Provider(name.clone()),
        None => OracleBackend::OpenAiCompatible,
    };
    OracleConfig {
        backend,
        endpoint: args.endpoint.clone(),
        api_key: args.api_key.clone(),
        vision_model: args.vision_model.clone(),
        reasoning_model: args.reasoning_model.clone(),
    }
}

/// Oracles for subcommands that never call them.
fn offline_oracles() -> edgequake_formfill::Oracles {
    let unused = Arc::new(offline::Unavailable);
    edgequake_formfill::Oracles::new(unused.clone(), unused)
}

mod offline {
    use async_trait::async_trait;
    use edgequake_formfill::{
        DocumentUnderstander, FieldReconciler, OracleError, OracleReply, ReasoningRequest,
        VisionRequest,
    };

    pub struct Unavailable;

    fn unavailable() -> OracleError {
        OracleError::Transport {
            oracle: "offline".to_string(),
            message: "no oracle configured for this command".to_string(),
        }
    }

    #[async_trait]
    impl DocumentUnderstander for Unavailable {
        fn name(&self) -> &str {
            "offline"
        }

        async fn understand(&self, _: &VisionRequest) -> Result<OracleReply, OracleError> {
            Err(unavailable())
        }
    }

    #[async_trait]
    impl FieldReconciler for Unavailable {
        fn name(&self) -> &str {
            "offline"
        }

        async fn reconcile(&self, _: &ReasoningRequest) -> Result<OracleReply, OracleError> {
            Err(unavailable())
        }
    }
}

/// Merge `--values` (file) and `--set` (flags, which win) into one map.
async fn collect_values(set: &[String], file: Option<&PathBuf>) -> Result<Map<String, Value>> {
    let mut values = Map::new();
    if let Some(path) = file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read values from {:?}", path))?;
        let parsed: Value = serde_json::from_str(&text)
            .with_context(|| format!("Values file {:?} is not valid JSON", path))?;
        match parsed {
            Value::Object(map) => values.extend(map),
            _ => anyhow::bail!("Values file {:?} must contain a JSON object", path),
        }
    }
    for pair in set {
        let (name, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid --set '{pair}': expected NAME=VALUE"))?;
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Invalid --set '{pair}': field name is empty");
        }
        values.insert(name.to_string(), Value::String(value.to_string()));
    }
    Ok(values)
}

/// Map CLI args to `FormFillConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<FormFillConfig> {
    let mut builder = FormFillConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .replicate_numbered_variants(!cli.no_variant_replication);

    if let Some(ref path) = cli.extraction_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read extraction prompt from {:?}", path))?;
        builder = builder.extraction_prompt(prompt);
    }
    if let Some(ref dir) = cli.forms_dir {
        builder = builder.forms_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
