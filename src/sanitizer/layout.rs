//! Layout attributes for sized `amp-*` elements.

use std::sync::Arc;

use super::{
    filter_data_amp_attributes, get_data_amp_attributes, DataAmpAttributes, Reporter, Sanitizer,
    SanitizerBase,
};
use crate::config::ArgMap;
use crate::dom::{Document, NodeId};
use crate::error::SanitizerResult;
use crate::layout::{set_attachment_layout_attributes, set_layout, AttachmentMetadata, Layout};
use crate::validation::ErrorCode;

pub const NAME: &str = "layout";

/// Elements that always go through layout resolution.
const SIZED_ELEMENTS: &[&str] = &["amp-img", "amp-anim", "amp-iframe", "amp-video"];

pub struct LayoutSanitizer {
    base: SanitizerBase,
    metadata: Arc<dyn AttachmentMetadata>,
}

impl LayoutSanitizer {
    pub fn new(overrides: &ArgMap, metadata: Arc<dyn AttachmentMetadata>) -> SanitizerResult<Self> {
        Ok(Self {
            base: SanitizerBase::new(NAME, Vec::new(), overrides)?,
            metadata,
        })
    }

    /// A `figure` only carries hints for its child, never a layout of its own.
    /// Media an observe-only run left unconverted is matched by the name the
    /// conversion would have given it.
    fn is_candidate(doc: &Document, reporter: &Reporter<'_>, node: NodeId) -> bool {
        match reporter.effective_name(doc, node) {
            Some(name) if SIZED_ELEMENTS.contains(&name) => true,
            Some("figure") | None => false,
            Some(_) => doc.has_attribute(node, "data-amp-layout"),
        }
    }

    /// Report `name` on `node` when it holds something other than a known layout.
    fn check_layout_value(
        &self,
        doc: &mut Document,
        reporter: &mut Reporter<'_>,
        node: NodeId,
        name: &str,
    ) {
        let invalid = doc
            .get_attribute(node, name)
            .is_some_and(|value| Layout::parse(value).is_none());
        if invalid {
            self.base
                .remove_invalid_attribute(doc, reporter, node, name, ErrorCode::InvalidLayout);
        }
    }

    fn resolve(&self, doc: &mut Document, node: NodeId) {
        let Some(mut attrs) = doc.attributes(node).cloned() else {
            return;
        };
        let current = attrs.get("layout").and_then(Layout::parse);

        let own = DataAmpAttributes {
            layout: attrs.remove("data-amp-layout").filter(|v| Layout::parse(v).is_some()),
            noloading: attrs.remove("data-amp-noloading").is_some(),
        };
        let mut inherited = get_data_amp_attributes(doc, node);
        inherited.layout = inherited.layout.filter(|v| Layout::parse(v).is_some());

        let chosen = own
            .layout
            .as_deref()
            .or(inherited.layout.as_deref())
            .and_then(Layout::parse);

        attrs = filter_data_amp_attributes(attrs, &inherited);
        attrs = filter_data_amp_attributes(attrs, &own);

        // Dimension recovery and wrapper styling run once: for an editor-chosen
        // layout the element does not carry yet, or for an element without any.
        let needs_attachment_layout = match chosen {
            Some(layout) => current != Some(layout),
            None => !attrs.contains("layout"),
        };
        if needs_attachment_layout {
            attrs = set_attachment_layout_attributes(doc, node, attrs, chosen, self.metadata.as_ref());
        }
        attrs = set_layout(attrs);
        doc.write_attributes(node, &attrs);
    }
}

impl Sanitizer for LayoutSanitizer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn base(&self) -> &SanitizerBase {
        &self.base
    }

    fn sanitize(&mut self, doc: &mut Document, reporter: &mut Reporter<'_>) {
        let mut resolved = 0usize;
        let mut checked_figures: Vec<NodeId> = Vec::new();
        for node in self.base.traversal(doc) {
            if self.base.is_removed(doc, reporter, node) || !Self::is_candidate(doc, reporter, node) {
                continue;
            }

            self.check_layout_value(doc, reporter, node, "data-amp-layout");
            self.check_layout_value(doc, reporter, node, "layout");
            if let Some(figure) = doc
                .parent(node)
                .filter(|&p| doc.element_name(p) == Some("figure"))
            {
                if !checked_figures.contains(&figure) {
                    checked_figures.push(figure);
                    self.check_layout_value(doc, reporter, figure, "data-amp-layout");
                }
            }

            if self.base.is_observe_only() {
                continue;
            }
            self.resolve(doc, node);
            resolved += 1;
        }
        log::debug!("{}: resolved {} element(s)", NAME, resolved);
    }
}
