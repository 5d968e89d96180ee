//! Validation error records and their review status.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::dom::{Document, NodeId, NodeKind};

/// Rule that a node or attribute violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DisallowedTag,
    DisallowedAttr,
    MissingMandatoryAttr,
    InvalidUrlProtocol,
    InvalidLayout,
    CssDisallowedProperty,
    CssImportantQualifier,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::DisallowedTag => "DISALLOWED_TAG",
            ErrorCode::DisallowedAttr => "DISALLOWED_ATTR",
            ErrorCode::MissingMandatoryAttr => "MISSING_MANDATORY_ATTR",
            ErrorCode::InvalidUrlProtocol => "INVALID_URL_PROTOCOL",
            ErrorCode::InvalidLayout => "INVALID_LAYOUT",
            ErrorCode::CssDisallowedProperty => "CSS_DISALLOWED_PROPERTY",
            ErrorCode::CssImportantQualifier => "CSS_IMPORTANT_QUALIFIER",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acknowledgement {
    New,
    Acknowledged,
}

/// `Accepted` means the markup was removed, `Rejected` that it was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Accepted,
    Rejected,
}

impl Disposition {
    pub fn toggled(self) -> Disposition {
        match self {
            Disposition::Accepted => Disposition::Rejected,
            Disposition::Rejected => Disposition::Accepted,
        }
    }
}

/// Review status: acknowledgement × disposition.
///
/// Acknowledgement only ever moves from `New` to `Acknowledged`; the
/// disposition can be toggled at either level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorStatus {
    pub acknowledgement: Acknowledgement,
    pub disposition: Disposition,
}

impl ErrorStatus {
    pub const NEW_REJECTED: ErrorStatus = ErrorStatus::new(Acknowledgement::New, Disposition::Rejected);
    pub const NEW_ACCEPTED: ErrorStatus = ErrorStatus::new(Acknowledgement::New, Disposition::Accepted);
    pub const ACK_REJECTED: ErrorStatus =
        ErrorStatus::new(Acknowledgement::Acknowledged, Disposition::Rejected);
    pub const ACK_ACCEPTED: ErrorStatus =
        ErrorStatus::new(Acknowledgement::Acknowledged, Disposition::Accepted);

    pub const fn new(acknowledgement: Acknowledgement, disposition: Disposition) -> Self {
        Self {
            acknowledgement,
            disposition,
        }
    }

    /// Status of a freshly detected error.
    pub fn initial(removed: bool) -> Self {
        if removed {
            Self::NEW_ACCEPTED
        } else {
            Self::NEW_REJECTED
        }
    }

    pub fn acknowledge(self) -> Self {
        Self::new(Acknowledgement::Acknowledged, self.disposition)
    }

    pub fn override_disposition(self) -> Self {
        Self::new(self.acknowledgement, self.disposition.toggled())
    }

    pub fn is_acknowledged(self) -> bool {
        self.acknowledgement == Acknowledgement::Acknowledged
    }

    pub fn is_accepted(self) -> bool {
        self.disposition == Disposition::Accepted
    }

    /// Stable numeric code: 0 new+rejected, 1 new+accepted,
    /// 2 acknowledged+rejected, 3 acknowledged+accepted.
    pub fn code(self) -> u8 {
        let ack = if self.is_acknowledged() { 2 } else { 0 };
        let acc = if self.is_accepted() { 1 } else { 0 };
        ack + acc
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NEW_REJECTED),
            1 => Some(Self::NEW_ACCEPTED),
            2 => Some(Self::ACK_REJECTED),
            3 => Some(Self::ACK_ACCEPTED),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ack = match self.acknowledgement {
            Acknowledgement::New => "new",
            Acknowledgement::Acknowledged => "acknowledged",
        };
        let disp = match self.disposition {
            Disposition::Accepted => "accepted",
            Disposition::Rejected => "rejected",
        };
        write!(f, "{}+{}", ack, disp)
    }
}

/// What kind of code produced the offending markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Core,
    Plugin,
    MuPlugin,
    Theme,
    Embed,
    Block,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Core => "Core",
            SourceKind::Plugin => "Plugin",
            SourceKind::MuPlugin => "Must-use plugin",
            SourceKind::Theme => "Theme",
            SourceKind::Embed => "Embed",
            SourceKind::Block => "Block",
        }
    }
}

/// One frame of the call stack that produced the markup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFrame {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl SourceFrame {
    pub fn new(kind: SourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            file: None,
            line: None,
            function: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockType {
    pub name: String,
    pub title: String,
}

/// Provenance attached to every error reported during a pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Where in the tree a violation was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub node_id: NodeId,
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    /// Offending attribute, when the violation is attribute-level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Attributes of the element when the violation was found
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_attributes: Vec<(String, String)>,
}

impl NodeRef {
    pub fn capture(doc: &Document, node: NodeId, attribute: Option<&str>) -> Self {
        Self {
            node_id: node,
            node_name: match doc.kind(node) {
                NodeKind::Element { name, .. } => name.clone(),
                NodeKind::Text(_) => "#text".to_string(),
                NodeKind::Document => "#document".to_string(),
            },
            parent_name: doc
                .parent(node)
                .and_then(|p| doc.element_name(p))
                .map(str::to_string),
            attribute: attribute.map(str::to_string),
            node_attributes: doc
                .attributes(node)
                .map(|a| a.to_vec())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub node: NodeRef,
    /// Extra detail such as a CSS property name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub status: ErrorStatus,
}

impl ValidationError {
    pub fn new(code: ErrorCode, node: NodeRef) -> Self {
        Self {
            code,
            node,
            detail: None,
            sources: Vec::new(),
            block_type: None,
            client_id: None,
            status: ErrorStatus::NEW_ACCEPTED,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_context(mut self, context: &ErrorContext) -> Self {
        self.sources = context.sources.clone();
        self.block_type = context.block_type.clone();
        self.client_id = context.client_id.clone();
        self
    }

    /// Content identity, independent of arena handles and review status.
    ///
    /// Two reports of the same rule on the same markup share an identity,
    /// even across re-parsed documents.
    pub fn identity(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.code.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.node.node_name.as_bytes());
        hasher.update([0]);
        hasher.update(self.node.parent_name.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.node.attribute.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.detail.as_deref().unwrap_or_default().as_bytes());
        // Attribute-level errors only depend on the offending attribute so
        // that earlier removals on the same element do not change them.
        let attributes = self
            .node
            .node_attributes
            .iter()
            .filter(|(k, _)| self.node.attribute.as_ref().map_or(true, |a| a == k));
        for (k, v) in attributes {
            hasher.update([0]);
            hasher.update(k.as_bytes());
            hasher.update([b'=']);
            hasher.update(v.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on <{}>", self.code, self.node.node_name)?;
        if let Some(attr) = &self.node.attribute {
            write!(f, " [{}]", attr)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        write!(f, " [{}]", self.status)
    }
}

/// Receiver of validation errors.
///
/// A sink may answer with a stored review status for an error it already
/// knows; the pass then follows that status instead of its default.
pub trait ValidationErrorSink {
    fn report(&mut self, error: &ValidationError) -> Option<ErrorStatus>;
}

impl ValidationErrorSink for Vec<ValidationError> {
    fn report(&mut self, error: &ValidationError) -> Option<ErrorStatus> {
        self.push(error.clone());
        None
    }
}

/// Adapts a closure into a sink.
pub struct CallbackSink<F>(pub F);

impl<F> ValidationErrorSink for CallbackSink<F>
where
    F: FnMut(&ValidationError) -> Option<ErrorStatus>,
{
    fn report(&mut self, error: &ValidationError) -> Option<ErrorStatus> {
        (self.0)(error)
    }
}
