//! Sanitizer trait and the helpers every variant shares.
//!
//! A sanitizer owns its merged arguments and nothing else. It gets the tree
//! as `&mut Document` for the length of one [`Sanitizer::sanitize`] call and
//! reports every violation through a [`Reporter`]. Whether the offending
//! markup is actually removed depends on observe-only mode and on any
//! review status the sink hands back.

pub mod layout;
pub mod media;
pub mod scripts;
pub mod styles;

use std::collections::BTreeMap;

use crate::attributes;
use crate::config::{
    general_defaults, ArgMap, ConfigValue, SanitizerArgs, CONTENT_MAX_WIDTH,
    DISABLE_INVALID_REMOVAL, REQUIRE_HTTPS_SRC, USE_DOCUMENT_ELEMENT,
};
use crate::dimension::{self, Axis};
use crate::dom::{Attributes, Document, NodeId};
use crate::error::SanitizerResult;
use crate::stylesheet::{self, StyleMap, Stylesheet};
use crate::validation::{
    ErrorCode, ErrorContext, ErrorStatus, NodeRef, ValidationError, ValidationErrorSink,
};

pub use layout::LayoutSanitizer;
pub use media::MediaSanitizer;
pub use scripts::ScriptSanitizer;
pub use styles::StyleSanitizer;

/// One markup family's rule set.
pub trait Sanitizer {
    fn name(&self) -> &'static str;

    fn base(&self) -> &SanitizerBase;

    /// Walk the root subtree once, in document order.
    fn sanitize(&mut self, doc: &mut Document, reporter: &mut Reporter<'_>);

    fn args(&self) -> &SanitizerArgs {
        self.base().args()
    }

    /// Selector → declarations collected during the last pass.
    fn get_styles(&self) -> StyleMap {
        StyleMap::new()
    }

    fn get_stylesheets(&self) -> Vec<Stylesheet> {
        stylesheet::render_stylesheets(&self.get_styles())
    }

    /// Component name → script URL required by the sanitized markup.
    fn get_scripts(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

// ─── Reporting ───────────────────────────────────────────────────────────────

/// What a pass does with the markup behind a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Remove,
    /// Kept because a stored review status says so.
    Keep,
    /// Kept only because the pass is observe-only.
    Observe,
}

/// Edits an observe-only pass would have made.
///
/// Later passes consult these so that they see the tree a removing run
/// would have left behind, without the tree being touched.
#[derive(Debug, Default)]
struct ObservedEdits {
    removed: FlaggedSubtrees,
    removed_attributes: Vec<(NodeId, String)>,
    renamed: Vec<(NodeId, &'static str)>,
}

/// Channel between a pass and whoever consumes its validation errors.
///
/// Every reported error is kept in [`Reporter::emitted`] and, when a sink is
/// attached, forwarded to it.
pub struct Reporter<'a> {
    sink: Option<&'a mut dyn ValidationErrorSink>,
    context: ErrorContext,
    emitted: Vec<ValidationError>,
    observed: ObservedEdits,
}

impl<'a> Reporter<'a> {
    pub fn new(context: ErrorContext) -> Self {
        Self {
            sink: None,
            context,
            emitted: Vec::new(),
            observed: ObservedEdits::default(),
        }
    }

    pub fn with_sink(sink: &'a mut dyn ValidationErrorSink, context: ErrorContext) -> Self {
        Self {
            sink: Some(sink),
            context,
            emitted: Vec::new(),
            observed: ObservedEdits::default(),
        }
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn set_context(&mut self, context: ErrorContext) {
        self.context = context;
    }

    /// Record an error and decide what happens to the offending markup.
    ///
    /// The default status is accepted unless the pass is observe-only. A
    /// status stored by the sink replaces it.
    pub fn report(&mut self, error: ValidationError, observe_only: bool) -> Verdict {
        let mut error = error.with_context(&self.context);
        if let Some(name) = self.observed_name(error.node.node_id) {
            error.node.node_name = name.to_string();
        }
        error.status = ErrorStatus::initial(!observe_only);

        let stored = match self.sink.as_mut() {
            Some(sink) => sink.report(&error),
            None => None,
        };
        if let Some(stored) = stored {
            error.status = stored;
        }
        self.emitted.push(error);

        match stored {
            Some(status) if !status.is_accepted() => Verdict::Keep,
            _ if observe_only => Verdict::Observe,
            _ => Verdict::Remove,
        }
    }

    pub fn emitted(&self) -> &[ValidationError] {
        &self.emitted
    }

    pub fn take_emitted(&mut self) -> Vec<ValidationError> {
        std::mem::take(&mut self.emitted)
    }

    /// Note a subtree an observe-only pass would have removed.
    pub fn observe_removal(&mut self, node: NodeId) {
        self.observed.removed.flag(node);
    }

    pub fn observe_attribute_removal(&mut self, element: NodeId, name: &str) {
        self.observed
            .removed_attributes
            .push((element, name.to_string()));
    }

    /// Note an element an observe-only pass would have renamed.
    pub fn observe_rename(&mut self, node: NodeId, name: &'static str) {
        self.observed.renamed.retain(|(n, _)| *n != node);
        self.observed.renamed.push((node, name));
    }

    /// True when an earlier observe-only report stands in for removing `node`
    /// or one of its ancestors.
    pub fn is_observed_removed(&self, doc: &Document, node: NodeId) -> bool {
        self.observed.removed.covers(doc, node)
    }

    pub fn is_observed_attribute_removed(&self, element: NodeId, name: &str) -> bool {
        self.observed
            .removed_attributes
            .iter()
            .any(|(n, a)| *n == element && a == name)
    }

    fn observed_name(&self, node: NodeId) -> Option<&'static str> {
        self.observed
            .renamed
            .iter()
            .find(|(n, _)| *n == node)
            .map(|(_, name)| *name)
    }

    /// Element name as a removing run would see it at this point.
    pub fn effective_name<'d>(&self, doc: &'d Document, node: NodeId) -> Option<&'d str> {
        let name = doc.element_name(node)?;
        Some(self.observed_name(node).unwrap_or(name))
    }
}

// ─── Shared base ─────────────────────────────────────────────────────────────

/// Arguments and helpers shared by every sanitizer variant.
#[derive(Debug, Clone)]
pub struct SanitizerBase {
    args: SanitizerArgs,
}

impl SanitizerBase {
    /// Merge `overrides` over the general defaults plus `defaults`.
    pub fn new(
        sanitizer: &str,
        defaults: Vec<(&'static str, ConfigValue)>,
        overrides: &ArgMap,
    ) -> SanitizerResult<Self> {
        let mut declared = general_defaults();
        declared.extend(defaults);
        let args = SanitizerArgs::merge(sanitizer, declared, overrides)?;
        args.validate_general()?;
        Ok(Self { args })
    }

    pub fn args(&self) -> &SanitizerArgs {
        &self.args
    }

    // General arguments are type-checked in `new`, so these cannot fail.

    pub fn is_observe_only(&self) -> bool {
        self.args.get_bool(DISABLE_INVALID_REMOVAL).unwrap_or(false)
    }

    pub fn require_https_src(&self) -> bool {
        self.args.get_bool(REQUIRE_HTTPS_SRC).unwrap_or(false)
    }

    pub fn content_max_width(&self) -> Option<f64> {
        self.args.get_f64(CONTENT_MAX_WIDTH).ok().flatten()
    }

    /// Traversal boundary: the document element, or `body` when available.
    pub fn root_element(&self, doc: &Document) -> Option<NodeId> {
        let document_element = doc.document_element()?;
        if self.args.get_bool(USE_DOCUMENT_ELEMENT).unwrap_or(false) {
            return Some(document_element);
        }
        doc.find_first_element(document_element, "body")
            .or(Some(document_element))
    }

    /// Root subtree in document order, snapshotted before the pass mutates it.
    pub fn traversal(&self, doc: &Document) -> Vec<NodeId> {
        self.root_element(doc)
            .map(|root| doc.descendants(root))
            .unwrap_or_default()
    }

    pub fn sanitize_dimension(&self, value: Option<&str>, axis: Axis) -> Option<f64> {
        dimension::sanitize_dimension(value, axis, self.content_max_width())
    }

    pub fn maybe_enforce_https_src(&self, url: &str, force: bool) -> String {
        attributes::maybe_enforce_https_src(url, force, self.require_https_src())
    }

    /// Report `error`; true when the caller should go ahead with the removal.
    pub fn should_remove(&self, reporter: &mut Reporter<'_>, error: ValidationError) -> bool {
        reporter.report(error, self.is_observe_only()) == Verdict::Remove
    }

    /// True when `node` is gone, for real or in an observe-only run.
    pub fn is_removed(&self, doc: &Document, reporter: &Reporter<'_>, node: NodeId) -> bool {
        !doc.is_attached(node) || reporter.is_observed_removed(doc, node)
    }

    /// Report `error` against `node` and detach the node unless it must be kept.
    pub fn remove_reported_node(
        &self,
        doc: &mut Document,
        reporter: &mut Reporter<'_>,
        node: NodeId,
        error: ValidationError,
    ) -> bool {
        let code = error.code;
        match reporter.report(error, self.is_observe_only()) {
            Verdict::Remove => {
                log::debug!(
                    "{}: removing <{}> ({})",
                    self.args.sanitizer(),
                    doc.element_name(node).unwrap_or("#text"),
                    code
                );
                doc.detach(node)
            }
            Verdict::Observe => {
                reporter.observe_removal(node);
                false
            }
            Verdict::Keep => false,
        }
    }

    /// Report an invalid node and detach it unless it must be kept.
    pub fn remove_invalid_child(
        &self,
        doc: &mut Document,
        reporter: &mut Reporter<'_>,
        node: NodeId,
        code: ErrorCode,
    ) -> bool {
        let error = ValidationError::new(code, NodeRef::capture(doc, node, None));
        self.remove_reported_node(doc, reporter, node, error)
    }

    /// Report an invalid attribute and remove it unless it must be kept.
    /// An attribute an earlier observe-only pass already reported counts as
    /// removed and is not reported again.
    pub fn remove_invalid_attribute(
        &self,
        doc: &mut Document,
        reporter: &mut Reporter<'_>,
        element: NodeId,
        name: &str,
        code: ErrorCode,
    ) -> bool {
        if reporter.is_observed_attribute_removed(element, name) {
            return false;
        }
        let error = ValidationError::new(code, NodeRef::capture(doc, element, Some(name)));
        match reporter.report(error, self.is_observe_only()) {
            Verdict::Remove => {
                log::debug!(
                    "{}: removing [{}] from <{}> ({})",
                    self.args.sanitizer(),
                    name,
                    doc.element_name(element).unwrap_or_default(),
                    code
                );
                doc.remove_attribute(element, name).is_some()
            }
            Verdict::Observe => {
                reporter.observe_attribute_removal(element, name);
                false
            }
            Verdict::Keep => false,
        }
    }
}

/// Nodes a pass has already reported at element level.
///
/// Their descendants are skipped for the rest of the pass whether or not the
/// flagged node was actually removed, so observe-only runs report exactly
/// what a removing run would.
#[derive(Debug, Default)]
pub struct FlaggedSubtrees(Vec<NodeId>);

impl FlaggedSubtrees {
    pub fn flag(&mut self, node: NodeId) {
        self.0.push(node);
    }

    pub fn covers(&self, doc: &Document, node: NodeId) -> bool {
        self.0.iter().any(|&f| doc.is_inclusive_ancestor(f, node))
    }
}

// ─── data-amp-* channel ──────────────────────────────────────────────────────

/// Layout hints an editor puts on a wrapping `figure`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataAmpAttributes {
    pub layout: Option<String>,
    pub noloading: bool,
}

impl DataAmpAttributes {
    pub fn is_empty(&self) -> bool {
        self.layout.is_none() && !self.noloading
    }
}

/// Read `data-amp-layout` / `data-amp-noloading` from a `figure` parent.
/// Any other parent yields an empty set.
pub fn get_data_amp_attributes(doc: &Document, node: NodeId) -> DataAmpAttributes {
    let Some(parent) = doc.parent(node) else {
        return DataAmpAttributes::default();
    };
    if doc.element_name(parent) != Some("figure") {
        return DataAmpAttributes::default();
    }
    DataAmpAttributes {
        layout: doc
            .get_attribute(parent, "data-amp-layout")
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string),
        noloading: doc.has_attribute(parent, "data-amp-noloading"),
    }
}

/// Fold data-amp hints into the element's own `layout` / `noloading`.
pub fn filter_data_amp_attributes(mut attrs: Attributes, data: &DataAmpAttributes) -> Attributes {
    if let Some(layout) = &data.layout {
        attrs.set("layout", layout.clone());
    }
    if data.noloading {
        attrs.set("noloading", "");
    }
    attrs
}

/// Write hints back as `data-amp-*` attributes on `node`.
pub fn set_data_amp_attributes(doc: &mut Document, node: NodeId, data: &DataAmpAttributes) {
    if let Some(layout) = &data.layout {
        doc.set_attribute(node, "data-amp-layout", layout.clone());
    }
    if data.noloading {
        doc.set_attribute(node, "data-amp-noloading", "");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Disposition;
    use pretty_assertions::assert_eq;

    fn base(overrides: &[(&str, ConfigValue)]) -> SanitizerBase {
        let overrides: ArgMap = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        SanitizerBase::new("test", vec![], &overrides).unwrap()
    }

    fn doc_with_body() -> (Document, NodeId, NodeId) {
        let doc = Document::from_yaml(
            r#"
tag: html
children:
  - tag: head
  - tag: body
    children:
      - tag: figure
        attrs: { data-amp-layout: fill, data-amp-noloading: "" }
        children:
          - tag: img
            attrs: { src: "a.png" }
"#,
        )
        .unwrap();
        let body = doc.find_first_element(Document::DOCUMENT, "body").unwrap();
        let img = doc.find_first_element(body, "img").unwrap();
        (doc, body, img)
    }

    #[test]
    fn test_root_element_selection() {
        let (doc, body, _) = doc_with_body();
        assert_eq!(base(&[]).root_element(&doc), Some(body));
        let html = doc.document_element();
        assert_eq!(
            base(&[(USE_DOCUMENT_ELEMENT, ConfigValue::Bool(true))]).root_element(&doc),
            html
        );
    }

    #[test]
    fn test_root_element_without_body_falls_back() {
        let doc = Document::from_yaml("tag: div").unwrap();
        assert_eq!(base(&[]).root_element(&doc), doc.document_element());
    }

    #[test]
    fn test_remove_invalid_child_detaches_and_reports() {
        let (mut doc, _, img) = doc_with_body();
        let mut reporter = Reporter::new(ErrorContext::default());
        assert!(base(&[]).remove_invalid_child(&mut doc, &mut reporter, img, ErrorCode::DisallowedTag));
        assert!(!doc.is_attached(img));
        assert_eq!(reporter.emitted().len(), 1);
        assert_eq!(reporter.emitted()[0].status, ErrorStatus::NEW_ACCEPTED);
    }

    #[test]
    fn test_observe_only_reports_but_keeps() {
        let (mut doc, _, img) = doc_with_body();
        let before = doc.clone();
        let mut reporter = Reporter::new(ErrorContext::default());
        let observer = base(&[(DISABLE_INVALID_REMOVAL, ConfigValue::Bool(true))]);
        assert!(!observer.remove_invalid_child(&mut doc, &mut reporter, img, ErrorCode::DisallowedTag));
        assert!(!observer.remove_invalid_attribute(&mut doc, &mut reporter, img, "src", ErrorCode::DisallowedAttr));
        assert_eq!(doc, before);
        assert_eq!(reporter.emitted().len(), 2);
        assert!(reporter
            .emitted()
            .iter()
            .all(|e| e.status == ErrorStatus::NEW_REJECTED));
    }

    #[test]
    fn test_sink_status_overrides_default() {
        let (mut doc, _, img) = doc_with_body();
        let mut keep_everything = crate::validation::CallbackSink(|_: &ValidationError| {
            Some(ErrorStatus::ACK_REJECTED)
        });
        let mut reporter = Reporter::with_sink(&mut keep_everything, ErrorContext::default());
        assert!(!base(&[]).remove_invalid_attribute(&mut doc, &mut reporter, img, "src", ErrorCode::DisallowedAttr));
        assert_eq!(doc.get_attribute(img, "src"), Some("a.png"));
        assert_eq!(reporter.emitted()[0].status.disposition, Disposition::Rejected);
    }

    #[test]
    fn test_reporter_attaches_context() {
        let (mut doc, _, img) = doc_with_body();
        let context = ErrorContext {
            client_id: Some("abc".to_string()),
            ..Default::default()
        };
        let mut reporter = Reporter::new(context);
        base(&[]).remove_invalid_attribute(&mut doc, &mut reporter, img, "src", ErrorCode::DisallowedAttr);
        assert_eq!(reporter.emitted()[0].client_id.as_deref(), Some("abc"));
        assert_eq!(reporter.emitted()[0].node.attribute.as_deref(), Some("src"));
    }

    #[test]
    fn test_observed_edits_carry_across_passes() {
        let (mut doc, body, img) = doc_with_body();
        let figure = doc.parent(img).unwrap();
        let observer = base(&[(DISABLE_INVALID_REMOVAL, ConfigValue::Bool(true))]);
        let mut reporter = Reporter::new(ErrorContext::default());

        observer.remove_invalid_attribute(&mut doc, &mut reporter, img, "src", ErrorCode::DisallowedAttr);
        // A later pass sees the attribute as already gone.
        assert!(!observer.remove_invalid_attribute(&mut doc, &mut reporter, img, "src", ErrorCode::InvalidUrlProtocol));
        assert_eq!(reporter.emitted().len(), 1);

        observer.remove_invalid_child(&mut doc, &mut reporter, figure, ErrorCode::DisallowedTag);
        assert!(doc.is_attached(img));
        assert!(observer.is_removed(&doc, &reporter, img));
        assert!(!observer.is_removed(&doc, &reporter, body));

        reporter.observe_rename(img, "amp-img");
        assert_eq!(reporter.effective_name(&doc, img), Some("amp-img"));
        assert_eq!(reporter.effective_name(&doc, figure), Some("figure"));
        observer.remove_invalid_attribute(&mut doc, &mut reporter, img, "alt", ErrorCode::DisallowedAttr);
        assert_eq!(reporter.emitted()[2].node.node_name, "amp-img");
    }

    #[test]
    fn test_verdicts() {
        let (doc, _, img) = doc_with_body();
        let error = || ValidationError::new(ErrorCode::DisallowedTag, NodeRef::capture(&doc, img, None));

        let mut reporter = Reporter::new(ErrorContext::default());
        assert_eq!(reporter.report(error(), false), Verdict::Remove);
        assert_eq!(reporter.report(error(), true), Verdict::Observe);

        let mut rejected = crate::validation::CallbackSink(|_: &ValidationError| {
            Some(ErrorStatus::NEW_REJECTED)
        });
        let mut reporter = Reporter::with_sink(&mut rejected, ErrorContext::default());
        assert_eq!(reporter.report(error(), false), Verdict::Keep);
        assert_eq!(reporter.report(error(), true), Verdict::Keep);
    }

    #[test]
    fn test_data_amp_attributes_from_figure() {
        let (doc, body, img) = doc_with_body();
        let data = get_data_amp_attributes(&doc, img);
        assert_eq!(
            data,
            DataAmpAttributes {
                layout: Some("fill".to_string()),
                noloading: true,
            }
        );
        let figure = doc.parent(img).unwrap();
        assert!(get_data_amp_attributes(&doc, figure).is_empty());
        assert!(get_data_amp_attributes(&doc, body).is_empty());

        let folded = filter_data_amp_attributes(doc.attributes(img).unwrap().clone(), &data);
        assert_eq!(folded.get("layout"), Some("fill"));
        assert_eq!(folded.get("noloading"), Some(""));
    }

    #[test]
    fn test_set_data_amp_attributes_round_trips() {
        let mut doc = Document::new();
        let figure = doc.create_element("figure");
        let img = doc.create_element("amp-img");
        doc.append_child(Document::DOCUMENT, figure).unwrap();
        doc.append_child(figure, img).unwrap();
        let data = DataAmpAttributes {
            layout: Some("responsive".to_string()),
            noloading: false,
        };
        set_data_amp_attributes(&mut doc, figure, &data);
        assert_eq!(doc.get_attribute(figure, "data-amp-layout"), Some("responsive"));
        assert!(!doc.has_attribute(figure, "data-amp-noloading"));
        assert_eq!(get_data_amp_attributes(&doc, img), data);
    }
}
