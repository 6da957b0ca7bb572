//! Input resolution for documents and form templates.
//!
//! Documents are only ever read, never stored: a remote URL is handed to the
//! vision oracle unchanged, local files and uploads are embedded as base64.
//!
//! Templates are loaded fully into memory (lopdf parses from a byte slice),
//! so no temporary file outlives a request. A template can be a local path,
//! an HTTP(S) URL, an upload, or a name inside the configured forms
//! directory. Every template is checked for the `%PDF` magic before use.

use crate::error::{ExtractionError, FormFillError};
use crate::oracle::ImageSource;
use crate::pipeline::encode::encode_document;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fallback MIME type for unknown image extensions.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// A document to extract fields from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Url(String),
    /// Uploaded bytes; `file_name` selects the MIME type.
    Upload { file_name: String, bytes: Vec<u8> },
}

impl DocumentSource {
    /// Interpret a CLI-style string as a URL or a local path.
    pub fn parse(input: &str) -> Self {
        if is_url(input) {
            DocumentSource::Url(input.to_string())
        } else {
            DocumentSource::Path(PathBuf::from(input))
        }
    }

    /// How this document is named in logs, errors and reports.
    pub fn label(&self) -> String {
        match self {
            DocumentSource::Path(p) => p.display().to_string(),
            DocumentSource::Url(u) => u.clone(),
            DocumentSource::Upload { file_name, .. } => file_name.clone(),
        }
    }
}

/// A PDF form template.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    Path(PathBuf),
    Url(String),
    Upload { file_name: String, bytes: Vec<u8> },
    /// A file name resolved against `FormFillConfig::forms_dir`.
    Named(String),
}

impl TemplateSource {
    pub fn parse(input: &str) -> Self {
        if is_url(input) {
            TemplateSource::Url(input.to_string())
        } else {
            TemplateSource::Path(PathBuf::from(input))
        }
    }

    pub fn label(&self) -> String {
        match self {
            TemplateSource::Path(p) => p.display().to_string(),
            TemplateSource::Url(u) => u.clone(),
            TemplateSource::Upload { file_name, .. } => file_name.clone(),
            TemplateSource::Named(n) => n.clone(),
        }
    }
}

/// Template bytes plus the label used in errors.
#[derive(Clone)]
pub struct LoadedTemplate {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for LoadedTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedTemplate")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl LoadedTemplate {
    /// Base file name for the filled copy, e.g. `filled_clearance.pdf`.
    pub fn filled_file_name(&self) -> String {
        let base = Path::new(&self.name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "form.pdf".to_string());
        format!("filled_{base}")
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// MIME type for a document file name, from its extension.
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => DEFAULT_IMAGE_MIME,
    }
}

// ── Documents ────────────────────────────────────────────────────────────

/// Turn a document source into the image part of a vision request.
///
/// A missing or unreadable local file yields an [`ExtractionError`] value.
pub async fn resolve_document(source: &DocumentSource) -> Result<ImageSource, ExtractionError> {
    match source {
        DocumentSource::Url(url) => {
            debug!("Document is remote, passing URL through: {url}");
            Ok(ImageSource::Url(url.clone()))
        }
        DocumentSource::Upload { file_name, bytes } => {
            if bytes.is_empty() {
                return Err(ExtractionError::new(file_name, "uploaded document is empty"));
            }
            Ok(encode_document(bytes, mime_for_name(file_name)))
        }
        DocumentSource::Path(path) => {
            let label = path.display().to_string();
            if !path.is_file() {
                return Err(ExtractionError::new(&label, "file not found"));
            }
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ExtractionError::new(&label, format!("cannot read file: {e}")))?;
            if bytes.is_empty() {
                return Err(ExtractionError::new(&label, "file is empty"));
            }
            let name = path.to_string_lossy();
            Ok(encode_document(&bytes, mime_for_name(&name)))
        }
    }
}

// ── Templates ────────────────────────────────────────────────────────────

/// Load a template into memory and verify it looks like a PDF.
pub async fn load_template(
    source: &TemplateSource,
    forms_dir: Option<&Path>,
    download_timeout_secs: u64,
) -> Result<LoadedTemplate, FormFillError> {
    let template = match source {
        TemplateSource::Path(path) => LoadedTemplate {
            name: path.display().to_string(),
            bytes: read_local(path).await?,
        },
        TemplateSource::Named(name) => {
            let path = resolve_named(name, forms_dir)?;
            LoadedTemplate {
                name: name.clone(),
                bytes: read_local(&path).await?,
            }
        }
        TemplateSource::Upload { file_name, bytes } => LoadedTemplate {
            name: file_name.clone(),
            bytes: bytes.clone(),
        },
        TemplateSource::Url(url) => LoadedTemplate {
            name: url.clone(),
            bytes: download_url(url, download_timeout_secs).await?,
        },
    };

    check_pdf_magic(&template)?;
    debug!("Loaded template '{}' ({} bytes)", template.name, template.bytes.len());
    Ok(template)
}

/// Resolve a named form inside `forms_dir`, refusing anything that could
/// step outside it.
pub fn resolve_named(name: &str, forms_dir: Option<&Path>) -> Result<PathBuf, FormFillError> {
    let invalid = |reason: &str| FormFillError::InvalidTemplateName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let dir = forms_dir.ok_or_else(|| invalid("no forms directory is configured"))?;
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name.contains("..")
    {
        return Err(invalid("must be a plain file name inside the forms directory"));
    }
    Ok(dir.join(name))
}

async fn read_local(path: &Path) -> Result<Vec<u8>, FormFillError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(FormFillError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(FormFillError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

fn check_pdf_magic(template: &LoadedTemplate) -> Result<(), FormFillError> {
    if template.bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = template.bytes.len().min(4);
    magic[..n].copy_from_slice(&template.bytes[..n]);
    Err(FormFillError::NotAPdf {
        name: template.name.clone(),
        magic,
    })
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, FormFillError> {
    info!("Downloading form template from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| FormFillError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            FormFillError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            FormFillError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(FormFillError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| FormFillError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
