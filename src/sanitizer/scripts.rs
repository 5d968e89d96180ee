//! Script elements, event handlers and `javascript:` URLs.

use std::collections::BTreeMap;

use super::{FlaggedSubtrees, Reporter, Sanitizer, SanitizerBase};
use crate::config::{ArgMap, ConfigValue};
use crate::dom::{Document, NodeId};
use crate::error::SanitizerResult;
use crate::validation::ErrorCode;

pub const NAME: &str = "scripts";
pub const UNWRAP_NOSCRIPTS: &str = "unwrap_noscripts";

pub const AMP_CDN: &str = "https://cdn.ampproject.org/";

const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction"];

pub fn default_args() -> Vec<(&'static str, ConfigValue)> {
    vec![(UNWRAP_NOSCRIPTS, ConfigValue::Bool(true))]
}

fn is_event_handler(attribute: &str) -> bool {
    attribute.len() > 2 && attribute.starts_with("on")
}

/// `javascript:` after dropping whitespace and control characters, which
/// browsers ignore inside a scheme.
fn is_javascript_url(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .take("javascript:".len())
        .collect();
    compact.eq_ignore_ascii_case("javascript:")
}

pub struct ScriptSanitizer {
    base: SanitizerBase,
    unwrap_noscripts: bool,
    scripts: BTreeMap<String, String>,
}

impl ScriptSanitizer {
    pub fn new(overrides: &ArgMap) -> SanitizerResult<Self> {
        let base = SanitizerBase::new(NAME, default_args(), overrides)?;
        let unwrap_noscripts = base.args().get_bool(UNWRAP_NOSCRIPTS)?;
        Ok(Self {
            base,
            unwrap_noscripts,
            scripts: BTreeMap::new(),
        })
    }

    fn is_allowed_script(doc: &Document, node: NodeId) -> bool {
        if let Some(src) = doc.get_attribute(node, "src") {
            return src.trim().starts_with(AMP_CDN);
        }
        doc.get_attribute(node, "type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
    }

    fn record_extension(&mut self, doc: &Document, node: NodeId) {
        let component = doc
            .get_attribute(node, "custom-element")
            .or_else(|| doc.get_attribute(node, "custom-template"));
        if let (Some(component), Some(src)) = (component, doc.get_attribute(node, "src")) {
            self.scripts
                .insert(component.trim().to_string(), src.trim().to_string());
        }
    }

    fn strip_unsafe_attributes(&self, doc: &mut Document, reporter: &mut Reporter<'_>, node: NodeId) {
        let Some(attrs) = doc.attributes(node) else {
            return;
        };
        let offending: Vec<(String, ErrorCode)> = attrs
            .iter()
            .filter_map(|(name, value)| {
                if is_event_handler(name) {
                    Some((name.to_string(), ErrorCode::DisallowedAttr))
                } else if URL_ATTRIBUTES.contains(&name) && is_javascript_url(value) {
                    Some((name.to_string(), ErrorCode::InvalidUrlProtocol))
                } else {
                    None
                }
            })
            .collect();
        for (name, code) in offending {
            self.base
                .remove_invalid_attribute(doc, reporter, node, &name, code);
        }
    }
}

impl Sanitizer for ScriptSanitizer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn base(&self) -> &SanitizerBase {
        &self.base
    }

    fn sanitize(&mut self, doc: &mut Document, reporter: &mut Reporter<'_>) {
        self.scripts.clear();
        let mut flagged = FlaggedSubtrees::default();

        for node in self.base.traversal(doc) {
            if self.base.is_removed(doc, reporter, node) || flagged.covers(doc, node) {
                continue;
            }
            let Some(name) = doc.element_name(node).map(str::to_string) else {
                continue;
            };

            if name == "script" {
                if !Self::is_allowed_script(doc, node) {
                    flagged.flag(node);
                    self.base
                        .remove_invalid_child(doc, reporter, node, ErrorCode::DisallowedTag);
                    continue;
                }
                self.record_extension(doc, node);
            }

            self.strip_unsafe_attributes(doc, reporter, node);

            if name == "noscript" && self.unwrap_noscripts && !self.base.is_observe_only() {
                doc.replace_with_children(node);
            }
        }
    }

    fn get_scripts(&self) -> BTreeMap<String, String> {
        self.scripts.clone()
    }
}
