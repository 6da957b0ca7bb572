//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn AutoFillProgressCallback>`] via
//! [`crate::config::FormFillConfigBuilder::progress_callback`] to hear about
//! each stage of an auto-fill run as it starts and finishes. The CLI uses it
//! to drive its spinner; a server could forward the events to a websocket.
//!
//! # Example
//!
//! ```rust
//! use edgequake_formfill::{AutoFillProgressCallback, FormFillConfig, Stage};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl AutoFillProgressCallback for Log {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         eprintln!("{stage} done in {elapsed_ms}ms");
//!     }
//! }
//!
//! let config = FormFillConfig::builder()
//!     .progress_callback(Arc::new(Log) as Arc<dyn AutoFillProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One step of the auto-fill pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Extract,
    Inspect,
    Reconcile,
    Fill,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Inspect => "inspect",
            Stage::Reconcile => "reconcile",
            Stage::Fill => "fill",
        };
        f.write_str(name)
    }
}

/// Called by the orchestrator as it moves through the pipeline.
///
/// Extraction and inspection run concurrently, so their events may
/// interleave. All methods default to no-ops.
pub trait AutoFillProgressCallback: Send + Sync {
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Reconciliation fell back to "every field missing".
    fn on_degraded(&self, reason: &str) {
        let _ = reason;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AutoFillProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FormFillConfig`].
pub type ProgressCallback = Arc<dyn AutoFillProgressCallback>;
