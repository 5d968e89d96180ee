//! # AMP markup sanitizer
//!
//! Rewrites an HTML document tree in place so that it fits a constrained
//! AMP-style dialect, and records every change as a validation error a
//! reviewer can later accept or reject.
//!
//! ## Features
//! - Arena document tree addressed by stable [`NodeId`] handles
//! - Media, layout, script and style sanitizers run in a fixed order
//! - Observe-only mode that reports without touching the tree
//! - Error ledger that reconciles repeated runs by content identity
//! - Hoisted inline styles and required extension scripts, deduplicated
//!
//! ## Example
//! ```ignore
//! use amp_sanitizer::{Document, ErrorContext, Pipeline, PipelineConfig};
//!
//! let mut doc = Document::from_yaml(r#"
//! tag: body
//! children:
//!   - tag: img
//!     attrs: { src: "http://example.com/photo.jpg", width: "600px" }
//! "#).expect("Failed to build document");
//!
//! let mut pipeline = Pipeline::new(&PipelineConfig::default()).expect("Invalid config");
//! let outcome = pipeline.run(&mut doc, ErrorContext::default(), None);
//! for error in &outcome.errors {
//!     println!("{}", error);
//! }
//! ```

pub mod attributes;
pub mod config;
pub mod dimension;
pub mod dom;
pub mod error;
pub mod layout;
pub mod ledger;
pub mod pipeline;
pub mod review;
pub mod sanitizer;
pub mod stylesheet;
pub mod validation;

// --- Core types ---
pub use config::{ArgMap, ConfigValue, PipelineConfig, SanitizerArgs};
pub use dom::{Attributes, Document, NodeId, NodeKind, NodeSpec};
pub use error::{SanitizerError, SanitizerResult};
pub use ledger::{ErrorLedger, LedgerEntry};
pub use pipeline::{Pipeline, SanitizeOutcome};

// --- Sanitizers ---
pub use sanitizer::{
    LayoutSanitizer, MediaSanitizer, Reporter, Sanitizer, SanitizerBase, ScriptSanitizer,
    StyleSanitizer, Verdict,
};

// --- Utilities ---
pub use attributes::{add_or_append_attribute, maybe_enforce_https_src};
pub use dimension::{sanitize_dimension, Axis};
pub use layout::{
    set_attachment_layout_attributes, set_layout, AttachmentMetadata, Layout, MediaDimensions,
    StaticAttachmentMetadata, FALLBACK_HEIGHT,
};
pub use stylesheet::{Scripts, StyleMap, Stylesheet, Stylesheets};

// --- Validation ---
pub use validation::{
    CallbackSink, ErrorCode, ErrorContext, ErrorStatus, ValidationError, ValidationErrorSink,
};
