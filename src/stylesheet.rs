//! CSS rules and extension scripts collected while sanitizing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// Selector → declarations, in the order they were collected.
pub type StyleMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stylesheet {
    pub hash: String,
    pub css: String,
}

impl Stylesheet {
    pub fn new(css: impl Into<String>) -> Self {
        let css = css.into();
        Self {
            hash: content_hash(&css),
            css,
        }
    }
}

/// Lowercase hex SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `selector { p1; p2; }`. Trailing semicolons on declarations are normalized.
pub fn render_rule(selector: &str, declarations: &[String]) -> String {
    let mut css = format!("{} {{", selector.trim());
    for declaration in declarations {
        let declaration = declaration.trim().trim_end_matches(';').trim();
        if declaration.is_empty() {
            continue;
        }
        css.push(' ');
        css.push_str(declaration);
        css.push(';');
    }
    css.push_str(" }");
    css
}

pub fn render_stylesheets(styles: &StyleMap) -> Vec<Stylesheet> {
    let mut sheets = Stylesheets::new();
    sheets.add_styles(styles);
    sheets.into_entries()
}

/// Ordered, hash-deduplicated set of rendered rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheets {
    entries: Vec<Stylesheet>,
    seen: HashSet<String>,
}

impl Stylesheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when an identical rule was already present.
    pub fn add(&mut self, sheet: Stylesheet) -> bool {
        if !self.seen.insert(sheet.hash.clone()) {
            return false;
        }
        self.entries.push(sheet);
        true
    }

    pub fn add_styles(&mut self, styles: &StyleMap) {
        for (selector, declarations) in styles {
            self.add(Stylesheet::new(render_rule(selector, declarations)));
        }
    }

    pub fn extend(&mut self, sheets: impl IntoIterator<Item = Stylesheet>) {
        for sheet in sheets {
            self.add(sheet);
        }
    }

    pub fn entries(&self) -> &[Stylesheet] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Stylesheet> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All rules joined by newlines.
    pub fn to_css(&self) -> String {
        self.entries
            .iter()
            .map(|s| s.css.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Component name → script URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scripts(BTreeMap<String, String>);

impl Scripts {
    pub fn new() -> Self {
        Self::default()
    }

    /// First URL recorded for a component wins.
    pub fn merge(&mut self, scripts: BTreeMap<String, String>) {
        for (component, url) in scripts {
            self.0.entry(component).or_insert(url);
        }
    }

    pub fn get(&self, component: &str) -> Option<&str> {
        self.0.get(component).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn styles(selector: &str, decls: &[&str]) -> StyleMap {
        let mut map = StyleMap::new();
        map.insert(selector.to_string(), decls.iter().map(|d| d.to_string()).collect());
        map
    }

    #[test]
    fn test_render_rule() {
        let decls = vec!["color:red".to_string(), "width: auto;".to_string(), " ".to_string()];
        assert_eq!(render_rule(".x", &decls), ".x { color:red; width: auto; }");
        assert_eq!(render_rule(".empty", &[]), ".empty { }");
    }

    #[test]
    fn test_identical_rules_collapse() {
        let mut sheets = Stylesheets::new();
        sheets.add_styles(&styles(".x", &["color:red"]));
        sheets.add_styles(&styles(".x", &["color:red"]));
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets.entries()[0].css, ".x { color:red; }");
        assert_eq!(sheets.entries()[0].hash, content_hash(".x { color:red; }"));
    }

    #[test]
    fn test_insertion_order_kept() {
        let mut sheets = Stylesheets::new();
        sheets.add(Stylesheet::new(".b { color:blue; }"));
        sheets.add(Stylesheet::new(".a { color:red; }"));
        assert!(!sheets.add(Stylesheet::new(".b { color:blue; }")));
        assert_eq!(sheets.to_css(), ".b { color:blue; }\n.a { color:red; }");
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        let hash = content_hash("");
        assert_eq!(hash.len(), 64);
        assert!(hash.starts_with("e3b0c442"));
    }

    #[test]
    fn test_scripts_merge_keeps_first() {
        let mut scripts = Scripts::new();
        scripts.merge(BTreeMap::from([("amp-video".to_string(), "https://a/v.js".to_string())]));
        scripts.merge(BTreeMap::from([
            ("amp-video".to_string(), "https://b/v.js".to_string()),
            ("amp-audio".to_string(), "https://a/a.js".to_string()),
        ]));
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts.get("amp-video"), Some("https://a/v.js"));
        let names: Vec<&str> = scripts.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["amp-audio", "amp-video"]);
    }
}
