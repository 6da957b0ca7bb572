//! Pipeline stages for document-to-form auto-fill.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own with in-memory forms and scripted oracles.
//!
//! ## Data Flow
//!
//! ```text
//! document ─▶ input ─▶ encode ─▶ extract ──┐
//!                                          ├─▶ reconcile ─▶ fill
//! template ─▶ input ─────────▶ schema ─────┘
//! ```
//!
//! 1. [`input`]     — resolve document and template references (path, URL,
//!    upload, named form)
//! 2. [`encode`]    — base64-wrap local document images for the vision call
//! 3. [`extract`]   — the Field Extractor; one vision-oracle call
//! 4. [`schema`]    — the Form Schema Inspector; runs in `spawn_blocking`
//!    because lopdf parsing is CPU-bound
//! 5. [`reconcile`] — the Reconciliation Engine; one reasoning-oracle call
//!    plus deterministic post-processing
//! 6. [`fill`]      — the Form Filler; writes a new PDF, never the template
//!
//! [`reply`] holds the JSON-in-free-text parser both oracle stages share, and
//! [`acroform`] the field-tree walk the inspector and filler share.

pub(crate) mod acroform;
pub mod encode;
pub mod extract;
pub mod fill;
pub mod input;
pub mod reconcile;
pub mod reply;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;
