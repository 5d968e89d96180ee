//! Layout resolution for sized media elements.
//!
//! Every sized element must leave the layout pass with either an explicit
//! width and height, or a `fixed-height` layout carrying only a height. When
//! dimensions are missing they can be recovered from attachment metadata;
//! the chosen layout also decides how the wrapping parent is styled.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::dom::{Attributes, Document, NodeId};

/// Height used when an element has no usable height.
pub const FALLBACK_HEIGHT: u32 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    Fixed,
    FixedHeight,
    Responsive,
    Fill,
    FlexItem,
    Intrinsic,
    Nodisplay,
    Container,
}

impl Layout {
    pub const ALL: [Layout; 8] = [
        Layout::Fixed,
        Layout::FixedHeight,
        Layout::Responsive,
        Layout::Fill,
        Layout::FlexItem,
        Layout::Intrinsic,
        Layout::Nodisplay,
        Layout::Container,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Layout::Fixed => "fixed",
            Layout::FixedHeight => "fixed-height",
            Layout::Responsive => "responsive",
            Layout::Fill => "fill",
            Layout::FlexItem => "flex-item",
            Layout::Intrinsic => "intrinsic",
            Layout::Nodisplay => "nodisplay",
            Layout::Container => "container",
        }
    }

    /// Case-insensitive parse of an attribute value.
    pub fn parse(value: &str) -> Option<Layout> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDimensions {
    pub width: u32,
    pub height: u32,
}

/// Read-only lookup of stored media dimensions by file name (no extension).
///
/// A miss or a failing backend returns `None`; callers carry on with
/// whatever dimensions they already have.
pub trait AttachmentMetadata {
    fn dimensions(&self, filename: &str) -> Option<MediaDimensions>;
}

/// Lookup that never knows anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAttachmentMetadata;

impl AttachmentMetadata for NoAttachmentMetadata {
    fn dimensions(&self, _filename: &str) -> Option<MediaDimensions> {
        None
    }
}

/// In-memory table, typically loaded from the pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAttachmentMetadata {
    entries: HashMap<String, MediaDimensions>,
}

impl StaticAttachmentMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: impl Into<String>, dimensions: MediaDimensions) {
        self.entries.insert(filename.into(), dimensions);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, MediaDimensions)> for StaticAttachmentMetadata {
    fn from_iter<I: IntoIterator<Item = (String, MediaDimensions)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl AttachmentMetadata for StaticAttachmentMetadata {
    fn dimensions(&self, filename: &str) -> Option<MediaDimensions> {
        self.entries.get(filename).copied()
    }
}

/// File name of a source URL with query, fragment and extension stripped.
pub fn attachment_filename(src: &str) -> Option<String> {
    let path = src.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Choose a layout from the width/height attributes.
///
/// An explicit layout other than `flex-item` is left alone. Otherwise a
/// missing height drops the width and falls back to [`FALLBACK_HEIGHT`], and
/// a missing width turns the layout into `fixed-height`.
pub fn set_layout(mut attrs: Attributes) -> Attributes {
    if let Some(layout) = attrs.get("layout") {
        if Layout::parse(layout) != Some(Layout::FlexItem) {
            return attrs;
        }
    }

    if attrs.is_blank("height") {
        attrs.remove("width");
        attrs.set("height", FALLBACK_HEIGHT.to_string());
    }
    if attrs.is_blank("width") {
        attrs.set("layout", Layout::FixedHeight.as_str());
    }
    attrs
}

fn ensure_height(attrs: &mut Attributes) -> String {
    if attrs.is_blank("height") {
        attrs.set("height", FALLBACK_HEIGHT.to_string());
    }
    attrs.get("height").unwrap_or_default().to_string()
}

/// Apply an editor-chosen layout to an element and its wrapping parent.
///
/// Missing dimensions are first recovered from `metadata` using the file
/// name of the `src` attribute. The returned attributes belong to `node`;
/// the parent's `style` is written directly into the tree.
pub fn set_attachment_layout_attributes(
    doc: &mut Document,
    node: NodeId,
    mut attrs: Attributes,
    layout: Option<Layout>,
    metadata: &dyn AttachmentMetadata,
) -> Attributes {
    if attrs.is_blank("width") || attrs.is_blank("height") {
        let found = attrs
            .get("src")
            .and_then(attachment_filename)
            .and_then(|name| {
                let dims = metadata.dimensions(&name);
                if dims.is_none() {
                    log::debug!("no attachment metadata for '{}'", name);
                }
                dims
            });
        if let Some(dims) = found {
            attrs.set("width", dims.width.to_string());
            attrs.set("height", dims.height.to_string());
        }
    }

    let parent = doc.parent(node).filter(|&p| doc.is_element(p));

    match layout {
        Some(Layout::FixedHeight) => {
            let height = ensure_height(&mut attrs);
            attrs.set("width", "auto");
            if let Some(parent) = parent {
                doc.set_attribute(parent, "style", format!("height: {}px; width: auto;", height));
            }
        }
        Some(Layout::Fill) => {
            let height = ensure_height(&mut attrs);
            if let Some(parent) = parent {
                doc.set_attribute(
                    parent,
                    "style",
                    format!("position:relative; width:100%; height:{}px;", height),
                );
            }
            attrs.remove("width");
            attrs.remove("height");
        }
        Some(Layout::Responsive) => {
            if let Some(parent) = parent {
                doc.set_attribute(parent, "style", "position:relative; width:100%; height:auto");
            }
        }
        Some(Layout::Fixed) => {
            ensure_height(&mut attrs);
        }
        _ => {}
    }

    attrs
}
