//! Inline `style` attributes.
//!
//! Declarations are parsed, screened for script-capable properties and
//! `!important`, then either written back or hoisted into a generated class
//! whose rule is exposed through [`Sanitizer::get_styles`].

use regex::Regex;
use std::sync::OnceLock;

use super::{Reporter, Sanitizer, SanitizerBase};
use crate::attributes::{add_or_append_attribute, has_token};
use crate::config::{ArgMap, ConfigValue};
use crate::dom::{Document, NodeId};
use crate::error::SanitizerResult;
use crate::stylesheet::{content_hash, StyleMap};
use crate::validation::{ErrorCode, NodeRef, ValidationError};

pub const NAME: &str = "styles";
pub const HOIST_INLINE_STYLES: &str = "hoist_inline_styles";
pub const INLINE_CLASS_PREFIX: &str = "amp-wp-inline";
pub const INLINE_CLASS_PREFIX_KEY: &str = "inline_class_prefix";

const DISALLOWED_PROPERTIES: &[&str] = &["behavior", "-moz-binding"];

pub fn default_args() -> Vec<(&'static str, ConfigValue)> {
    vec![
        (HOIST_INLINE_STYLES, ConfigValue::Bool(true)),
        (INLINE_CLASS_PREFIX_KEY, ConfigValue::Text(INLINE_CLASS_PREFIX.to_string())),
    ]
}

fn important_regex() -> &'static Regex {
    static IMPORTANT_REGEX: OnceLock<Regex> = OnceLock::new();
    IMPORTANT_REGEX.get_or_init(|| Regex::new(r"(?i)\s*!\s*important\b").unwrap())
}

fn expression_regex() -> &'static Regex {
    static EXPRESSION_REGEX: OnceLock<Regex> = OnceLock::new();
    EXPRESSION_REGEX.get_or_init(|| Regex::new(r"(?i)expression\s*\(").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

impl Declaration {
    pub fn render(&self) -> String {
        format!("{}:{}", self.property, self.value)
    }

    fn is_disallowed(&self) -> bool {
        DISALLOWED_PROPERTIES.contains(&self.property.as_str())
            || expression_regex().is_match(&self.value)
    }

    fn is_important(&self) -> bool {
        important_regex().is_match(&self.value)
    }

    fn without_important(&self) -> Declaration {
        Declaration {
            property: self.property.clone(),
            value: important_regex().replace_all(&self.value, "").trim().to_string(),
        }
    }
}

/// Split on `;` outside of parentheses and quoted strings, so that
/// `url(data:...;base64,...)` and `content: ";"` stay whole.
fn split_declarations(style: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in style.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                chunks.push(&style[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    chunks.push(&style[start..]);
    chunks
}

/// Split a `style` attribute into declarations. Fragments without a colon or
/// with an empty property are dropped.
pub fn parse_declarations(style: &str) -> Vec<Declaration> {
    split_declarations(style)
        .into_iter()
        .filter_map(|chunk| {
            let (property, value) = chunk.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            Some(Declaration {
                property,
                value: value.to_string(),
            })
        })
        .collect()
}

pub struct StyleSanitizer {
    base: SanitizerBase,
    hoist: bool,
    class_prefix: String,
    styles: StyleMap,
}

impl StyleSanitizer {
    pub fn new(overrides: &ArgMap) -> SanitizerResult<Self> {
        let base = SanitizerBase::new(NAME, default_args(), overrides)?;
        let hoist = base.args().get_bool(HOIST_INLINE_STYLES)?;
        let class_prefix = base.args().get_str(INLINE_CLASS_PREFIX_KEY)?.to_string();
        Ok(Self {
            base,
            hoist,
            class_prefix,
            styles: StyleMap::new(),
        })
    }

    /// Class name derived from the declaration set.
    pub fn class_for(&self, declarations: &[String]) -> String {
        let hash = content_hash(&declarations.join(";"));
        format!("{}-{}", self.class_prefix, &hash[..7])
    }

    fn screen(
        &self,
        doc: &Document,
        reporter: &mut Reporter<'_>,
        node: NodeId,
        declarations: Vec<Declaration>,
    ) -> Vec<Declaration> {
        let mut kept = Vec::with_capacity(declarations.len());
        for declaration in declarations {
            if declaration.is_disallowed() {
                let error = ValidationError::new(
                    ErrorCode::CssDisallowedProperty,
                    NodeRef::capture(doc, node, Some("style")),
                )
                .with_detail(declaration.render());
                if !self.base.should_remove(reporter, error) {
                    kept.push(declaration);
                }
                continue;
            }
            if declaration.is_important() {
                let error = ValidationError::new(
                    ErrorCode::CssImportantQualifier,
                    NodeRef::capture(doc, node, Some("style")),
                )
                .with_detail(declaration.render());
                if self.base.should_remove(reporter, error) {
                    kept.push(declaration.without_important());
                    continue;
                }
            }
            kept.push(declaration);
        }
        kept
    }

    fn apply(&mut self, doc: &mut Document, node: NodeId, original: &str, declarations: Vec<String>) {
        if declarations.is_empty() {
            doc.remove_attribute(node, "style");
            return;
        }
        if !self.hoist {
            let rendered = declarations.join("; ");
            if rendered != original {
                doc.set_attribute(node, "style", rendered);
            }
            return;
        }

        let class = self.class_for(&declarations);
        self.styles
            .entry(format!(".{}", class))
            .or_insert(declarations);
        if let Some(attrs) = doc.attributes_mut(node) {
            if !has_token(attrs, "class", &class) {
                add_or_append_attribute(attrs, "class", &class, " ");
            }
            attrs.remove("style");
        }
    }
}

impl Sanitizer for StyleSanitizer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn base(&self) -> &SanitizerBase {
        &self.base
    }

    fn sanitize(&mut self, doc: &mut Document, reporter: &mut Reporter<'_>) {
        self.styles.clear();
        for node in self.base.traversal(doc) {
            if self.base.is_removed(doc, reporter, node) {
                continue;
            }
            let Some(style) = doc.get_attribute(node, "style").map(str::to_string) else {
                continue;
            };
            if reporter.is_observed_attribute_removed(node, "style") {
                continue;
            }
            let declarations = self.screen(doc, reporter, node, parse_declarations(&style));
            if self.base.is_observe_only() {
                continue;
            }
            let rendered = declarations.iter().map(Declaration::render).collect();
            self.apply(doc, node, &style, rendered);
        }
        log::debug!("{}: {} hoisted rule(s)", NAME, self.styles.len());
    }

    fn get_styles(&self) -> StyleMap {
        self.styles.clone()
    }
}
