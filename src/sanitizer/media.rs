//! Media embeds: images, frames, video and audio.
//!
//! Plugin-style embeds (`embed`, `object`, `applet`) are dropped outright.
//! The remaining media elements must carry a usable source; they are then
//! stripped down to a per-element attribute allowlist, given normalized
//! dimensions and converted to their `amp-*` counterpart.

use std::collections::BTreeMap;

use super::{FlaggedSubtrees, Reporter, Sanitizer, SanitizerBase};
use crate::config::{ArgMap, ConfigValue};
use crate::dimension::{format_dimension, Axis};
use crate::dom::{Document, NodeId};
use crate::error::SanitizerResult;
use crate::validation::{ErrorCode, NodeRef, ValidationError};

pub const NAME: &str = "media";
pub const FORCE_HTTPS_IFRAMES: &str = "force_https_iframes";

const DISALLOWED_EMBEDS: &[&str] = &["embed", "object", "applet"];

const COMMON_ATTRS: &[&str] = &[
    "id", "class", "style", "title", "lang", "dir", "hidden", "tabindex", "layout", "noloading",
    "width", "height", "src",
];

const IMG_ATTRS: &[&str] = &[
    "alt", "srcset", "sizes", "attribution", "crossorigin", "referrerpolicy", "decoding",
];

const IFRAME_ATTRS: &[&str] = &[
    "allow", "allowfullscreen", "allowtransparency", "frameborder", "name", "referrerpolicy",
    "resizable", "sandbox", "scrolling",
];

const VIDEO_ATTRS: &[&str] = &[
    "autoplay", "controls", "crossorigin", "loop", "muted", "playsinline", "poster", "preload",
    "artwork", "artist", "album", "dock", "rotate-to-fullscreen",
];

const AUDIO_ATTRS: &[&str] = &[
    "autoplay", "controls", "loop", "muted", "preload", "artwork", "artist", "album",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Img,
    Iframe,
    Video,
    Audio,
}

impl MediaKind {
    fn from_tag(name: &str) -> Option<Self> {
        match name {
            "img" => Some(MediaKind::Img),
            "iframe" => Some(MediaKind::Iframe),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    fn amp_tag(self) -> &'static str {
        match self {
            MediaKind::Img => "amp-img",
            MediaKind::Iframe => "amp-iframe",
            MediaKind::Video => "amp-video",
            MediaKind::Audio => "amp-audio",
        }
    }

    fn allowed_attrs(self) -> &'static [&'static str] {
        match self {
            MediaKind::Img => IMG_ATTRS,
            MediaKind::Iframe => IFRAME_ATTRS,
            MediaKind::Video => VIDEO_ATTRS,
            MediaKind::Audio => AUDIO_ATTRS,
        }
    }

    fn is_allowed(self, attribute: &str) -> bool {
        attribute.starts_with("data-")
            || attribute.starts_with("aria-")
            || COMMON_ATTRS.contains(&attribute)
            || self.allowed_attrs().contains(&attribute)
    }

    /// `source` children stand in for `src` on timed media.
    fn accepts_source_children(self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Audio)
    }
}

/// Extension script URL for an `amp-*` component; `amp-img` is built in.
pub fn extension_script_url(component: &str) -> Option<String> {
    match component {
        "amp-iframe" | "amp-video" | "amp-audio" => Some(format!(
            "https://cdn.ampproject.org/v0/{}-0.1.js",
            component
        )),
        _ => None,
    }
}

pub fn default_args() -> Vec<(&'static str, ConfigValue)> {
    vec![(FORCE_HTTPS_IFRAMES, ConfigValue::Bool(true))]
}

pub struct MediaSanitizer {
    base: SanitizerBase,
    force_https_iframes: bool,
    scripts: BTreeMap<String, String>,
}

impl MediaSanitizer {
    pub fn new(overrides: &ArgMap) -> SanitizerResult<Self> {
        let base = SanitizerBase::new(NAME, default_args(), overrides)?;
        let force_https_iframes = base.args().get_bool(FORCE_HTTPS_IFRAMES)?;
        Ok(Self {
            base,
            force_https_iframes,
            scripts: BTreeMap::new(),
        })
    }

    fn has_source_child(doc: &Document, node: NodeId) -> bool {
        doc.children(node).iter().any(|&child| {
            doc.element_name(child) == Some("source") && !attribute_is_blank(doc, child, "src")
        })
    }

    /// Returns false when the element was reported and must not be converted.
    fn check_source(
        &self,
        doc: &mut Document,
        reporter: &mut Reporter<'_>,
        node: NodeId,
        kind: MediaKind,
    ) -> bool {
        if attribute_is_blank(doc, node, "src") {
            if kind.accepts_source_children() && Self::has_source_child(doc, node) {
                return true;
            }
            self.base
                .remove_invalid_child(doc, reporter, node, ErrorCode::MissingMandatoryAttr);
            return false;
        }

        let src = doc.get_attribute(node, "src").unwrap_or_default().to_string();
        let force = kind == MediaKind::Iframe && self.force_https_iframes;
        let enforced = self.base.maybe_enforce_https_src(&src, force);
        if enforced.is_empty() {
            let error = ValidationError::new(
                ErrorCode::InvalidUrlProtocol,
                NodeRef::capture(doc, node, Some("src")),
            )
            .with_detail(src);
            self.base.remove_reported_node(doc, reporter, node, error);
            return false;
        }
        if enforced != src && !self.base.is_observe_only() {
            doc.set_attribute(node, "src", enforced);
        }
        true
    }

    fn strip_disallowed_attributes(
        &self,
        doc: &mut Document,
        reporter: &mut Reporter<'_>,
        node: NodeId,
        kind: MediaKind,
    ) {
        let names = doc.attributes(node).map(|a| a.names()).unwrap_or_default();
        for name in names.iter().filter(|n| !kind.is_allowed(n)) {
            self.base
                .remove_invalid_attribute(doc, reporter, node, name, ErrorCode::DisallowedAttr);
        }
    }

    fn normalize_dimensions(&self, doc: &mut Document, node: NodeId) {
        for axis in [Axis::Width, Axis::Height] {
            let Some(raw) = doc.get_attribute(node, axis.attribute()) else {
                continue;
            };
            match self.base.sanitize_dimension(Some(raw), axis) {
                Some(px) => {
                    let formatted = format_dimension(px);
                    if formatted != raw {
                        doc.set_attribute(node, axis.attribute(), formatted);
                    }
                }
                None => {
                    doc.remove_attribute(node, axis.attribute());
                }
            }
        }
    }

    /// Secure the `src` of a `source`/`track` child. An insecure source that
    /// cannot be upgraded is dropped.
    fn enforce_child_source(&self, doc: &mut Document, reporter: &mut Reporter<'_>, node: NodeId) {
        let Some(src) = doc.get_attribute(node, "src").map(str::to_string) else {
            return;
        };
        if src.trim().is_empty() {
            return;
        }
        let enforced = self.base.maybe_enforce_https_src(&src, false);
        if enforced.is_empty() {
            let error = ValidationError::new(
                ErrorCode::InvalidUrlProtocol,
                NodeRef::capture(doc, node, Some("src")),
            )
            .with_detail(src);
            self.base.remove_reported_node(doc, reporter, node, error);
        } else if enforced != src && !self.base.is_observe_only() {
            doc.set_attribute(node, "src", enforced);
        }
    }

    fn record_script(&mut self, component: &str) {
        if let Some(url) = extension_script_url(component) {
            self.scripts.insert(component.to_string(), url);
        }
    }
}

fn attribute_is_blank(doc: &Document, node: NodeId, name: &str) -> bool {
    doc.attributes(node).map_or(true, |a| a.is_blank(name))
}

impl Sanitizer for MediaSanitizer {
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

            if DISALLOWED_EMBEDS.contains(&name.as_str()) {
                flagged.flag(node);
                self.base
                    .remove_invalid_child(doc, reporter, node, ErrorCode::DisallowedTag);
                continue;
            }

            if name == "source" || name == "track" {
                self.enforce_child_source(doc, reporter, node);
                continue;
            }

            // Already converted by an earlier run.
            if name.starts_with("amp-") {
                self.record_script(&name);
                continue;
            }

            let Some(kind) = MediaKind::from_tag(&name) else {
                continue;
            };
            if !self.check_source(doc, reporter, node, kind) {
                flagged.flag(node);
                continue;
            }
            self.strip_disallowed_attributes(doc, reporter, node, kind);

            if self.base.is_observe_only() {
                reporter.observe_rename(node, kind.amp_tag());
                continue;
            }
            // Media fed by `source` children keeps no blank `src`.
            if attribute_is_blank(doc, node, "src") {
                doc.remove_attribute(node, "src");
            }
            self.normalize_dimensions(doc, node);
            doc.rename_element(node, kind.amp_tag());
            self.record_script(kind.amp_tag());
        }

        log::debug!(
            "{}: {} extension script(s) required",
            NAME,
            self.scripts.len()
        );
    }

    fn get_scripts(&self) -> BTreeMap<String, String> {
        self.scripts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONTENT_MAX_WIDTH, DISABLE_INVALID_REMOVAL, REQUIRE_HTTPS_SRC};
    use crate::error::SanitizerError;
    use crate::validation::{ErrorContext, ErrorStatus};
    use pretty_assertions::assert_eq;

    fn sanitizer(overrides: &[(&str, ConfigValue)]) -> MediaSanitizer {
        let overrides: ArgMap = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        MediaSanitizer::new(&overrides).unwrap()
    }

    fn body(children: &str) -> Document {
        Document::from_yaml(&format!("tag: body\nchildren:\n{}", children)).unwrap()
    }

    fn run(s: &mut MediaSanitizer, doc: &mut Document) -> Vec<ValidationError> {
        let mut reporter = Reporter::new(ErrorContext::default());
        s.sanitize(doc, &mut reporter);
        reporter.take_emitted()
    }

    fn codes(errors: &[ValidationError]) -> Vec<ErrorCode> {
        errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_unknown_key_fails_construction() {
        let overrides: ArgMap = [("force_https_video".to_string(), ConfigValue::Bool(true))]
            .into_iter()
            .collect();
        assert!(matches!(
            MediaSanitizer::new(&overrides),
            Err(SanitizerError::UnknownArg { .. })
        ));
    }

    #[test]
    fn test_declared_keys_are_retrievable() {
        let s = sanitizer(&[]);
        for key in [
            FORCE_HTTPS_IFRAMES,
            CONTENT_MAX_WIDTH,
            REQUIRE_HTTPS_SRC,
            DISABLE_INVALID_REMOVAL,
        ] {
            assert!(s.args().get(key).is_ok(), "{} missing", key);
        }
    }

    #[test]
    fn test_disallowed_embeds_removed() {
        let mut doc = body(
            r#"
  - tag: object
    children:
      - tag: embed
        attrs: { src: "x.swf" }
  - tag: p
"#,
        );
        let errors = run(&mut sanitizer(&[]), &mut doc);
        // The nested embed goes with its object and is not reported twice.
        assert_eq!(codes(&errors), vec![ErrorCode::DisallowedTag]);
        assert_eq!(errors[0].node.node_name, "object");
        let root = doc.document_element().unwrap();
        assert_eq!(doc.children(root).len(), 1);
    }

    #[test]
    fn test_img_converted_and_normalized() {
        let mut doc = body(
            r#"
  - tag: img
    attrs: { src: "https://x/a.png", width: "50%", height: "120px", alt: "a", onerror: "x()", data-id: "7" }
"#,
        );
        let mut s = sanitizer(&[(CONTENT_MAX_WIDTH, ConfigValue::Number(600.0))]);
        let errors = run(&mut s, &mut doc);
        assert_eq!(codes(&errors), vec![ErrorCode::DisallowedAttr]);
        assert_eq!(errors[0].node.attribute.as_deref(), Some("onerror"));

        let img = doc.find_first_element(Document::DOCUMENT, "amp-img").unwrap();
        let attrs = doc.attributes(img).unwrap().to_vec();
        let expected: Vec<(String, String)> = [
            ("src", "https://x/a.png"),
            ("width", "300"),
            ("height", "120"),
            ("alt", "a"),
            ("data-id", "7"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(attrs, expected);
        assert!(s.get_scripts().is_empty());
    }

    #[test]
    fn test_unusable_dimension_dropped() {
        let mut doc = body(
            r#"
  - tag: img
    attrs: { src: "a.png", width: "auto", height: "10" }
"#,
        );
        run(&mut sanitizer(&[]), &mut doc);
        let img = doc.find_first_element(Document::DOCUMENT, "amp-img").unwrap();
        assert!(!doc.has_attribute(img, "width"));
        assert_eq!(doc.get_attribute(img, "height"), Some("10"));
    }

    #[test]
    fn test_missing_src_removes_element() {
        let mut doc = body(
            r#"
  - tag: img
    attrs: { alt: "nothing", onclick: "x()" }
  - tag: video
    children:
      - tag: source
        attrs: { src: "https://x/v.mp4" }
"#,
        );
        let mut s = sanitizer(&[]);
        let errors = run(&mut s, &mut doc);
        // Only the element-level error; attributes of a removed element are not inspected.
        assert_eq!(codes(&errors), vec![ErrorCode::MissingMandatoryAttr]);
        assert!(doc.find_first_element(Document::DOCUMENT, "img").is_none());
        assert!(doc.find_first_element(Document::DOCUMENT, "amp-video").is_some());
        assert_eq!(
            s.get_scripts().get("amp-video").map(String::as_str),
            Some("https://cdn.ampproject.org/v0/amp-video-0.1.js")
        );
    }

    #[test]
    fn test_blank_src_dropped_when_sources_carry_media() {
        let mut doc = body(
            r#"
  - tag: video
    attrs: { src: "", controls: "" }
    children:
      - tag: source
        attrs: { src: "https://x/v.mp4" }
"#,
        );
        assert!(run(&mut sanitizer(&[]), &mut doc).is_empty());
        let video = doc.find_first_element(Document::DOCUMENT, "amp-video").unwrap();
        assert!(!doc.has_attribute(video, "src"));
        assert_eq!(doc.get_attribute(video, "controls"), Some(""));
    }

    #[test]
    fn test_observe_only_records_conversion() {
        let mut doc = body(
            r#"
  - tag: img
    attrs: { src: "https://x/a.png" }
"#,
        );
        let mut s = sanitizer(&[(DISABLE_INVALID_REMOVAL, ConfigValue::Bool(true))]);
        let mut reporter = Reporter::new(ErrorContext::default());
        s.sanitize(&mut doc, &mut reporter);
        let img = doc.find_first_element(Document::DOCUMENT, "img").unwrap();
        assert_eq!(reporter.effective_name(&doc, img), Some("amp-img"));
    }

    #[test]
    fn test_iframe_src_forced_to_https() {
        let mut doc = body(
            r#"
  - tag: iframe
    attrs: { src: "http://player.example/embed", frameborder: "0" }
"#,
        );
        let mut s = sanitizer(&[]);
        assert!(run(&mut s, &mut doc).is_empty());
        let frame = doc.find_first_element(Document::DOCUMENT, "amp-iframe").unwrap();
        assert_eq!(doc.get_attribute(frame, "src"), Some("https://player.example/embed"));
        assert!(s.get_scripts().contains_key("amp-iframe"));
    }

    #[test]
    fn test_iframe_left_insecure_when_not_forced() {
        let mut doc = body(
            r#"
  - tag: iframe
    attrs: { src: "http://player.example/embed" }
"#,
        );
        run(&mut sanitizer(&[(FORCE_HTTPS_IFRAMES, ConfigValue::Bool(false))]), &mut doc);
        let frame = doc.find_first_element(Document::DOCUMENT, "amp-iframe").unwrap();
        assert_eq!(doc.get_attribute(frame, "src"), Some("http://player.example/embed"));
    }

    #[test]
    fn test_required_https_removes_insecure_media() {
        let mut doc = body(
            r#"
  - tag: img
    attrs: { src: "http://x/a.png" }
  - tag: audio
    attrs: { src: "https://x/a.mp3" }
    children:
      - tag: track
        attrs: { src: "http://x/captions.vtt" }
"#,
        );
        let errors = run(&mut sanitizer(&[(REQUIRE_HTTPS_SRC, ConfigValue::Bool(true))]), &mut doc);
        assert_eq!(
            codes(&errors),
            vec![ErrorCode::InvalidUrlProtocol, ErrorCode::InvalidUrlProtocol]
        );
        assert_eq!(errors[0].detail.as_deref(), Some("http://x/a.png"));
        assert!(doc.find_first_element(Document::DOCUMENT, "img").is_none());
        assert!(doc.find_first_element(Document::DOCUMENT, "track").is_none());
        assert!(doc.find_first_element(Document::DOCUMENT, "amp-audio").is_some());
    }

    #[test]
    fn test_second_pass_is_silent() {
        let mut doc = body(
            r#"
  - tag: img
    attrs: { src: "a.png", width: "10px", style: "x", onload: "y" }
  - tag: iframe
    attrs: { src: "http://e/x" }
  - tag: object
"#,
        );
        let mut s = sanitizer(&[]);
        assert_eq!(run(&mut s, &mut doc).len(), 2);
        let after_first = doc.clone();
        assert!(run(&mut s, &mut doc).is_empty());
        assert_eq!(doc, after_first);
        assert!(s.get_scripts().contains_key("amp-iframe"));
    }

    #[test]
    fn test_observe_only_leaves_tree_identical() {
        let yaml = r#"
  - tag: img
    attrs: { src: "http://x/a.png", width: "10px", onload: "y" }
  - tag: embed
  - tag: iframe
"#;
        let mut removing = body(yaml);
        let expected = codes(&run(&mut sanitizer(&[]), &mut removing));

        let mut observed = body(yaml);
        let before = observed.clone();
        let errors = run(
            &mut sanitizer(&[(DISABLE_INVALID_REMOVAL, ConfigValue::Bool(true))]),
            &mut observed,
        );
        assert_eq!(observed, before);
        assert_eq!(codes(&errors), expected);
        assert!(errors.iter().all(|e| e.status == ErrorStatus::NEW_REJECTED));
    }
}
