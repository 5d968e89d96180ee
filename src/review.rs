//! Labels a review screen shows for each recorded validation error.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::ledger::ErrorLedger;
use crate::validation::{ErrorCode, ErrorStatus, SourceFrame, ValidationError};

pub const UNKNOWN_SOURCE: &str = "Unknown";
pub const OUTSIDE_CONTENT: &str = "Outside post content";

/// Which plugin or theme registered each block type.
#[derive(Debug, Clone, Default)]
pub struct BlockSourceRegistry {
    sources: HashMap<String, SourceFrame>,
}

impl BlockSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, block_name: impl Into<String>, source: SourceFrame) {
        self.sources.insert(block_name.into(), source);
    }

    pub fn get(&self, block_name: &str) -> Option<&SourceFrame> {
        self.sources.get(block_name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl FromIterator<(String, SourceFrame)> for BlockSourceRegistry {
    fn from_iter<I: IntoIterator<Item = (String, SourceFrame)>>(iter: I) -> Self {
        Self {
            sources: iter.into_iter().collect(),
        }
    }
}

fn frame_label(frame: &SourceFrame) -> String {
    format!("{}: {}", frame.kind.label(), frame.name)
}

/// Who is responsible for the markup.
///
/// A registered block source wins; otherwise the distinct frames of the
/// recorded source trace, in order; otherwise [`UNKNOWN_SOURCE`].
pub fn source_label(error: &ValidationError, registry: &BlockSourceRegistry) -> String {
    if let Some(frame) = error
        .block_type
        .as_ref()
        .and_then(|block| registry.get(&block.name))
    {
        return frame_label(frame);
    }

    let mut labels: Vec<String> = Vec::new();
    for label in error.sources.iter().map(frame_label) {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    if labels.is_empty() {
        UNKNOWN_SOURCE.to_string()
    } else {
        labels.join(", ")
    }
}

pub fn disposition_label(status: ErrorStatus) -> &'static str {
    if status.is_accepted() {
        "Removed"
    } else {
        "Kept"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockLabel {
    Block(String),
    OutsideContent,
}

impl fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockLabel::Block(title) => f.write_str(title),
            BlockLabel::OutsideContent => f.write_str(OUTSIDE_CONTENT),
        }
    }
}

/// Block the error came from. Markup without an editor client id is
/// treated as generated outside the post content.
pub fn block_label(error: &ValidationError) -> BlockLabel {
    if error.client_id.is_none() {
        return BlockLabel::OutsideContent;
    }
    let title = error
        .block_type
        .as_ref()
        .map(|block| {
            if block.title.trim().is_empty() {
                block.name.clone()
            } else {
                block.title.clone()
            }
        })
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
    BlockLabel::Block(title)
}

/// One line of the review table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRow {
    pub id: String,
    pub code: ErrorCode,
    pub node_name: String,
    pub attribute: Option<String>,
    pub source: String,
    pub block: BlockLabel,
    pub disposition: &'static str,
    pub status: ErrorStatus,
    pub status_code: u8,
    pub occurrences: u32,
}

pub fn review_rows(ledger: &ErrorLedger, registry: &BlockSourceRegistry) -> Vec<ReviewRow> {
    ledger
        .iter()
        .map(|(id, entry)| ReviewRow {
            id: id.to_string(),
            code: entry.error.code,
            node_name: entry.error.node.node_name.clone(),
            attribute: entry.error.node.attribute.clone(),
            source: source_label(&entry.error, registry),
            block: block_label(&entry.error),
            disposition: disposition_label(entry.status()),
            status: entry.status(),
            status_code: entry.status().code(),
            occurrences: entry.occurrences,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::validation::{BlockType, ErrorContext, NodeRef, SourceKind, ValidationErrorSink};
    use pretty_assertions::assert_eq;

    fn error(context: ErrorContext) -> ValidationError {
        let doc = Document::from_yaml("tag: script").unwrap();
        let script = doc.document_element().unwrap();
        ValidationError::new(ErrorCode::DisallowedTag, NodeRef::capture(&doc, script, None))
            .with_context(&context)
    }

    fn gallery() -> BlockType {
        BlockType {
            name: "acme/gallery".to_string(),
            title: "Gallery".to_string(),
        }
    }

    #[test]
    fn test_source_label_precedence() {
        let registry: BlockSourceRegistry = [(
            "acme/gallery".to_string(),
            SourceFrame::new(SourceKind::Plugin, "acme-blocks"),
        )]
        .into_iter()
        .collect();

        let traced = ErrorContext {
            sources: vec![
                SourceFrame::new(SourceKind::Theme, "twentyten"),
                SourceFrame::new(SourceKind::Plugin, "seo"),
                SourceFrame::new(SourceKind::Theme, "twentyten"),
            ],
            ..Default::default()
        };
        assert_eq!(source_label(&error(traced.clone()), &registry), "Theme: twentyten, Plugin: seo");

        let registered = ErrorContext {
            block_type: Some(gallery()),
            ..traced
        };
        assert_eq!(source_label(&error(registered), &registry), "Plugin: acme-blocks");

        assert_eq!(source_label(&error(ErrorContext::default()), &registry), UNKNOWN_SOURCE);
    }

    #[test]
    fn test_disposition_label() {
        assert_eq!(disposition_label(ErrorStatus::NEW_ACCEPTED), "Removed");
        assert_eq!(disposition_label(ErrorStatus::ACK_ACCEPTED), "Removed");
        assert_eq!(disposition_label(ErrorStatus::NEW_REJECTED), "Kept");
        assert_eq!(disposition_label(ErrorStatus::ACK_REJECTED), "Kept");
    }

    #[test]
    fn test_block_label_requires_client_id() {
        let without_client = ErrorContext {
            block_type: Some(gallery()),
            ..Default::default()
        };
        assert_eq!(block_label(&error(without_client)), BlockLabel::OutsideContent);

        let with_client = ErrorContext {
            block_type: Some(gallery()),
            client_id: Some("c1".to_string()),
            ..Default::default()
        };
        assert_eq!(block_label(&error(with_client)), BlockLabel::Block("Gallery".to_string()));
        assert_eq!(BlockLabel::OutsideContent.to_string(), OUTSIDE_CONTENT);
    }

    #[test]
    fn test_review_rows_from_ledger() {
        let mut ledger = ErrorLedger::new();
        ledger.report(&error(ErrorContext::default()));
        let rows = review_rows(&ledger, &BlockSourceRegistry::new());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].node_name, "script");
        assert_eq!(rows[0].disposition, "Removed");
        assert_eq!(rows[0].status_code, 1);
        assert_eq!(rows[0].block, BlockLabel::OutsideContent);
    }
}
